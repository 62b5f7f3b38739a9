//! Thin zip wrapper: read single entries from a packaged `.epub`, and
//! assemble a project directory into one.

use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;

use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::epub::container::{self, CONTAINER_PATH, MIMETYPE, MIMETYPE_PATH};
use crate::epub::{NavigationDocument, PackageDocument, resolve_href};
use crate::error::{Error, Result};
use crate::util::decode_document;

/// Read one entry of a zip archive on disk.
pub fn read_entry(archive: &Path, name: &str) -> Result<Vec<u8>> {
    if !archive.is_file() {
        return Err(Error::NotFound(archive.display().to_string()));
    }
    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(Error::NotFound(format!("{name} in {}", archive.display())));
        }
        Err(err) => return Err(err.into()),
    };
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}

/// Load the package and navigation documents of a packaged `.epub`.
pub fn read_documents(archive: &Path) -> Result<(PackageDocument, NavigationDocument)> {
    let package_path = container::locate(archive)?;
    let package_bytes = read_entry(archive, &package_path)?;
    let package = PackageDocument::parse(&decode_document(&package_bytes))?;

    let navigation_path = resolve_href(&package_path, package.locate_toc_target()?);
    let navigation_bytes = read_entry(archive, &navigation_path)?;
    let navigation = NavigationDocument::parse(&decode_document(&navigation_bytes))?;

    Ok((package, navigation))
}

/// Zip up a project directory.
///
/// Writes `mimetype` first and uncompressed, then the pointer document, the
/// package document, and each of `hrefs` (manifest hrefs, resolved against
/// the package document). Hrefs with no file behind them are skipped.
pub fn write_archive<W: Write + Seek>(
    root: &Path,
    package_path: &str,
    hrefs: &[&str],
    writer: W,
) -> Result<()> {
    let mut zip = ZipWriter::new(writer);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MIMETYPE_PATH, stored)?;
    // No trailing newline inside the archive, unlike the on-disk marker.
    zip.write_all(MIMETYPE.as_bytes())?;

    let mut written = vec![MIMETYPE_PATH.to_string()];
    for name in [CONTAINER_PATH, package_path] {
        zip.start_file(name, deflated)?;
        zip.write_all(&fs::read(root.join(name))?)?;
        written.push(name.to_string());
    }

    for href in hrefs {
        let name = resolve_href(package_path, href);
        if written.contains(&name) {
            continue;
        }
        let source = root.join(&name);
        if !source.is_file() {
            warn!(href = %href, path = %source.display(), "manifest item has no file; skipping");
            continue;
        }
        zip.start_file(name.as_str(), deflated)?;
        zip.write_all(&fs::read(&source)?)?;
        written.push(name);
    }

    zip.finish()?;
    debug!(entries = written.len(), "wrote archive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn project_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        container::create(dir.path(), "metadata.opf").unwrap();
        fs::write(dir.path().join("metadata.opf"), "<package/>").unwrap();
        fs::create_dir_all(dir.path().join("content")).unwrap();
        fs::write(dir.path().join("content/a.html"), "<html/>").unwrap();
        dir
    }

    #[test]
    fn test_write_archive_puts_mimetype_first_and_stored() {
        let dir = project_dir();
        let mut buf = Cursor::new(Vec::new());
        write_archive(
            dir.path(),
            "metadata.opf",
            &["content/a.html", "content/missing.html"],
            &mut buf,
        )
        .unwrap();

        let mut zip = ZipArchive::new(Cursor::new(buf.into_inner())).unwrap();
        let first = zip.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        drop(first);

        let names: Vec<_> = zip.file_names().map(str::to_string).collect();
        assert!(names.contains(&"META-INF/container.xml".to_string()));
        assert!(names.contains(&"metadata.opf".to_string()));
        assert!(names.contains(&"content/a.html".to_string()));
        assert!(!names.contains(&"content/missing.html".to_string()));

        let mut mimetype = String::new();
        zip.by_name("mimetype")
            .unwrap()
            .read_to_string(&mut mimetype)
            .unwrap();
        assert_eq!(mimetype, "application/epub+zip");
    }

    #[test]
    fn test_read_entry_missing() {
        let dir = project_dir();
        let out = dir.path().join("book.epub");
        write_archive(dir.path(), "metadata.opf", &[], File::create(&out).unwrap()).unwrap();

        assert_eq!(read_entry(&out, "metadata.opf").unwrap(), b"<package/>");
        assert!(matches!(read_entry(&out, "nope.txt"), Err(Error::NotFound(_))));
        assert!(matches!(
            read_entry(&dir.path().join("absent.epub"), "mimetype"),
            Err(Error::NotFound(_))
        ));
    }
}
