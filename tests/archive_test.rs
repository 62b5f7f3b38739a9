use std::fs::{self, File};
use std::io::Read;

use chrono::DateTime;
use epubkit::archive::{read_documents, read_entry};
use epubkit::epub::container;
use epubkit::{CreateOptions, Error, FixedEnvironment, Project};
use tempfile::TempDir;
use zip::{CompressionMethod, ZipArchive};

fn env() -> FixedEnvironment {
    let time = DateTime::parse_from_rfc3339("2011-03-01T09:15:00+00:00").unwrap();
    FixedEnvironment::new("build-host", time)
}

#[test]
fn test_compile_project() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("book");
    let mut project = Project::create(
        &root,
        CreateOptions::default()
            .with_title("Compiled")
            .with_placeholder_page(true),
        env(),
    )
    .unwrap();

    fs::write(root.join("content/ch1.html"), "<html/>").unwrap();
    project
        .register_content("ch1", "content/ch1.html", true, None)
        .unwrap();
    project
        .register_navigation_entry("ch1", "Chapter 1", "content/ch1.html", None)
        .unwrap();

    let output = dir.path().join("book.epub");
    project.compile(&output).unwrap();

    let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
    let names: Vec<String> = zip.file_names().map(str::to_string).collect();
    assert!(names.contains(&"META-INF/container.xml".to_string()));
    assert!(names.contains(&"metadata.opf".to_string()));
    assert!(names.contains(&"toc.ncx".to_string()));
    assert!(names.contains(&"content/title.html".to_string()));
    assert!(names.contains(&"content/ch1.html".to_string()));

    let mut first = zip.by_index(0).unwrap();
    assert_eq!(first.name(), "mimetype");
    assert_eq!(first.compression(), CompressionMethod::Stored);
    let mut mimetype = String::new();
    first.read_to_string(&mut mimetype).unwrap();
    assert_eq!(mimetype, container::MIMETYPE);
    drop(first);

    let (package, navigation) = read_documents(&output).unwrap();
    assert_eq!(package, *project.package());
    assert_eq!(navigation, *project.navigation());
    assert_eq!(navigation.title(), "Compiled");
    assert_eq!(navigation.navigation_map().len(), 2);
}

#[test]
fn test_compile_skips_missing_content() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("book");
    let mut project = Project::create(&root, CreateOptions::default(), env()).unwrap();
    project
        .register_content("ghost", "content/ghost.html", true, None)
        .unwrap();

    let output = dir.path().join("book.epub");
    project.compile(&output).unwrap();

    assert!(matches!(
        read_entry(&output, "content/ghost.html"),
        Err(Error::NotFound(_))
    ));
    assert!(read_entry(&output, "metadata.opf").is_ok());
}

#[test]
fn test_read_entry_from_missing_archive() {
    let dir = TempDir::new().unwrap();
    assert!(read_entry(&dir.path().join("none.epub"), "mimetype").is_err());
}
