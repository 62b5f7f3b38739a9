//! An EPUB project directory, coordinating the package and navigation
//! documents so that shared fields stay in agreement.
//!
//! # Example
//!
//! ```no_run
//! use epubkit::{CreateOptions, Project, SystemEnvironment};
//!
//! let mut project = Project::create(
//!     "my-book",
//!     CreateOptions::default().with_placeholder_page(true),
//!     SystemEnvironment,
//! )?;
//! project.set_title("My Book");
//! project.register_content("ch1", "content/ch1.html", true, None)?;
//! project.register_navigation_entry("ch1", "Chapter 1", "content/ch1.html", None)?;
//! project.save()?;
//! # Ok::<(), epubkit::Error>(())
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::archive;
use crate::env::{Environment, SystemEnvironment};
use crate::epub::container::{self, CONTAINER_PATH};
use crate::epub::navigation::{NavigationDocument, NavigationPoint};
use crate::epub::package::{DEFAULT_TOC_ID, PackageDocument};
use crate::epub::resolve_href;
use crate::error::{Error, Result};
use crate::storage::AtomicWriter;
use crate::template;
use crate::util::decode_document;

pub const DEFAULT_PACKAGE_PATH: &str = "metadata.opf";
pub const DEFAULT_NAVIGATION_HREF: &str = "toc.ncx";
pub const DEFAULT_CONTENT_DIR: &str = "content";
pub const DEFAULT_TITLE: &str = "TITLE";
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Manifest id and file name of the placeholder page.
pub const PLACEHOLDER_ID: &str = "title";
const PLACEHOLDER_FILE: &str = "title.html";

/// Head entries every new navigation document starts with.
const NAVIGATION_DEFAULTS: &[(&str, &str)] = &[
    ("dtb:depth", "1"),
    ("dtb:totalPageCount", "0"),
    ("dtb:maxPageNumber", "0"),
];

/// Settings for [`Project::create`].
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub title: String,
    pub language: String,
    /// Write `content/title.html` and register it in both documents.
    pub placeholder_page: bool,
    /// Package document location, relative to the project root.
    pub package_path: String,
    /// Navigation document href, relative to the package document.
    pub navigation_href: String,
    /// Manifest id of the navigation document.
    pub navigation_id: String,
    /// Content directory, relative to the package document.
    pub content_dir: String,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            placeholder_page: false,
            package_path: DEFAULT_PACKAGE_PATH.to_string(),
            navigation_href: DEFAULT_NAVIGATION_HREF.to_string(),
            navigation_id: DEFAULT_TOC_ID.to_string(),
            content_dir: DEFAULT_CONTENT_DIR.to_string(),
        }
    }
}

impl CreateOptions {
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_placeholder_page(mut self, placeholder_page: bool) -> Self {
        self.placeholder_page = placeholder_page;
        self
    }

    pub fn with_package_path(mut self, package_path: impl Into<String>) -> Self {
        self.package_path = package_path.into();
        self
    }

    pub fn with_navigation(mut self, id: impl Into<String>, href: impl Into<String>) -> Self {
        self.navigation_id = id.into();
        self.navigation_href = href.into();
        self
    }

    pub fn with_content_dir(mut self, content_dir: impl Into<String>) -> Self {
        self.content_dir = content_dir.into();
        self
    }
}

/// A project directory with its package and navigation documents in memory.
///
/// Title and identifier live in both documents; change them only through
/// [`Project::set_title`] and [`Project::set_identifier`] so both copies move
/// together.
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    package_path: String,
    navigation_path: String,
    package: PackageDocument,
    navigation: NavigationDocument,
    title: String,
    identifier: String,
    env: Box<dyn Environment>,
}

impl Project {
    /// Open an existing project directory.
    pub fn open(location: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_env(location, SystemEnvironment)
    }

    /// Open an existing project directory, using `env` for backup stamps.
    pub fn open_with_env(
        location: impl AsRef<Path>,
        env: impl Environment + 'static,
    ) -> Result<Self> {
        let root = location.as_ref();
        if !root.exists() {
            return Err(Error::NotFound(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a directory",
                root.display()
            )));
        }

        let package_path = container::locate(root)?;
        let package = PackageDocument::parse(&read_document(&root.join(&package_path))?)?;

        let navigation_path = resolve_href(&package_path, package.locate_toc_target()?);
        debug!(package = %package_path, navigation = %navigation_path, "resolved project documents");
        let navigation =
            NavigationDocument::parse(&read_document(&root.join(&navigation_path))?)?;

        let title = package.title().to_string();
        let identifier = package.identifier().to_string();
        info!(root = %root.display(), title = %title, "opened project");

        Ok(Self {
            root: root.to_path_buf(),
            package_path,
            navigation_path,
            package,
            navigation,
            title,
            identifier,
            env: Box::new(env),
        })
    }

    /// Create a new project at `location`.
    ///
    /// Both documents are built in memory before anything touches the disk,
    /// so bad options leave `location` as it was. Then the `mimetype` marker,
    /// the pointer document and the content directory are written; the
    /// package and navigation documents are written by [`Project::save`].
    /// Fails with [`Error::InvalidInput`] if `location` already holds a
    /// project.
    pub fn create(
        location: impl AsRef<Path>,
        options: CreateOptions,
        env: impl Environment + 'static,
    ) -> Result<Self> {
        let root = location.as_ref();
        if root.join(CONTAINER_PATH).exists() {
            return Err(Error::InvalidInput(format!(
                "'{}' already contains a project",
                root.display()
            )));
        }
        if root.exists() && !root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "'{}' is not a directory",
                root.display()
            )));
        }
        if options.package_path.trim_matches('/').is_empty() {
            return Err(Error::InvalidInput(
                "package document path is empty".to_string(),
            ));
        }

        let mut navigation = NavigationDocument::new();
        for (name, content) in NAVIGATION_DEFAULTS {
            navigation.add_metadata(*name, *content);
        }

        let mut package = PackageDocument::new();
        package.set_language(options.language.as_str());
        package.set_toc(options.navigation_id.as_str());
        package.add_manifest_item(
            options.navigation_id.as_str(),
            options.navigation_href.as_str(),
            None,
        )?;

        let navigation_path = resolve_href(&options.package_path, &options.navigation_href);
        let mut project = Self {
            root: root.to_path_buf(),
            package_path: options.package_path.clone(),
            navigation_path,
            package,
            navigation,
            title: String::new(),
            identifier: String::new(),
            env: Box::new(env),
        };
        let identifier = project.env.generate_identifier();
        project.set_identifier(identifier);
        project.set_title(options.title.as_str());

        let placeholder_href = placeholder_href(&options.content_dir);
        if options.placeholder_page {
            project.register_content(PLACEHOLDER_ID, placeholder_href.as_str(), true, None)?;
            let title = project.title.clone();
            project.register_navigation_entry(
                PLACEHOLDER_ID,
                title,
                placeholder_href.as_str(),
                None,
            )?;
        }

        fs::create_dir_all(root)?;
        container::create(root, &project.package_path)?;
        fs::create_dir_all(project.resolve(&options.content_dir))?;
        if options.placeholder_page {
            fs::write(
                project.resolve(&placeholder_href),
                template::placeholder_page(&project.title),
            )?;
        }

        info!(root = %root.display(), identifier = %project.identifier, "created project");
        Ok(project)
    }

    /// Open the project at `location`, or create one there if none exists.
    pub fn open_or_create(
        location: impl AsRef<Path>,
        options: CreateOptions,
        env: impl Environment + 'static,
    ) -> Result<Self> {
        let root = location.as_ref();
        if root.join(CONTAINER_PATH).exists() {
            Self::open_with_env(root, env)
        } else {
            Self::create(root, options, env)
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Package document location, relative to the project root.
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// Navigation document location, relative to the project root.
    pub fn navigation_path(&self) -> &str {
        &self.navigation_path
    }

    pub fn package(&self) -> &PackageDocument {
        &self.package
    }

    pub fn navigation(&self) -> &NavigationDocument {
        &self.navigation
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn language(&self) -> &str {
        self.package.language()
    }

    /// Set the title in both documents.
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.package.set_title(self.title.as_str());
        self.navigation.set_title(self.title.as_str());
    }

    /// Set the unique identifier in both documents.
    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = identifier.into();
        self.package.set_identifier(self.identifier.as_str());
        self.navigation.set_identifier(self.identifier.as_str());
    }

    /// Set the language. Only the package document carries one.
    pub fn set_language(&mut self, language: impl Into<String>) {
        self.package.set_language(language);
    }

    /// Add a `creator` to the package metadata.
    pub fn add_creator(&mut self, name: impl Into<String>, role: &str) {
        self.package.add_creator(name, role);
    }

    /// Add a manifest item and, optionally, a spine reference to it.
    pub fn register_content(
        &mut self,
        id: impl Into<String>,
        href: impl Into<String>,
        add_to_spine: bool,
        media_type: Option<&str>,
    ) -> Result<()> {
        let id = id.into();
        self.package
            .add_manifest_item(id.as_str(), href, media_type)?;
        if add_to_spine {
            self.package.add_spine_itemref(id);
        }
        Ok(())
    }

    /// Remove a manifest item and every spine reference to it.
    pub fn unregister_content(&mut self, id: &str) -> bool {
        let removed = self.package.remove_manifest_item(id).is_some();
        self.package.remove_spine_itemref(id);
        removed
    }

    /// Add a top-level navigation point, appended or at `play_order`.
    pub fn register_navigation_entry(
        &mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        href: impl Into<String>,
        play_order: Option<usize>,
    ) -> Result<&NavigationPoint> {
        match play_order {
            Some(order) => self
                .navigation
                .insert_navigation_point(id, label, href, order),
            None => Ok(self.navigation.add_navigation_point(id, label, href)),
        }
    }

    pub fn register_guide_reference(
        &mut self,
        kind: impl Into<String>,
        title: impl Into<String>,
        href: impl Into<String>,
    ) {
        self.package.add_guide_reference(kind, title, href);
    }

    /// Problems with references between the documents: spine idrefs and the
    /// toc id that name no manifest item, and navigation targets that point
    /// at no manifest href. Nothing is fixed automatically.
    pub fn dangling_references(&self) -> Vec<String> {
        let mut problems = self.package.dangling_references();

        fn check(point: &NavigationPoint, package: &PackageDocument, problems: &mut Vec<String>) {
            let target = point.content.split('#').next().unwrap_or_default();
            if !package.manifest().iter().any(|item| item.href == target) {
                problems.push(format!(
                    "navigation point '{}' targets '{}', which is not in the manifest",
                    point.id, point.content
                ));
            }
            for child in &point.children {
                check(child, package, problems);
            }
        }
        for point in self.navigation.navigation_map() {
            check(point, &self.package, &mut problems);
        }
        problems
    }

    /// Write both documents.
    ///
    /// Both are staged to temporaries before either live file is replaced, so
    /// a write failure leaves the previous pair intact. A crash between the
    /// two final renames can still leave them out of step.
    pub fn save(&self) -> Result<()> {
        let writer = AtomicWriter::new(self.env.as_ref());

        let package_file = self.root.join(&self.package_path);
        let navigation_file = self.root.join(&self.navigation_path);
        for file in [&package_file, &navigation_file] {
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let package = writer.stage(&package_file, &self.package.serialize())?;
        let navigation = writer.stage(&navigation_file, &self.navigation.serialize())?;
        writer.commit(package)?;
        writer.commit(navigation)?;

        info!(root = %self.root.display(), "saved project");
        Ok(())
    }

    /// Save, then package the project as an `.epub` archive at `output`.
    pub fn compile(&self, output: impl AsRef<Path>) -> Result<()> {
        self.save()?;
        let hrefs: Vec<&str> = self
            .package
            .manifest()
            .iter()
            .map(|item| item.href.as_str())
            .collect();
        archive::write_archive(
            &self.root,
            &self.package_path,
            &hrefs,
            File::create(output.as_ref())?,
        )?;
        info!(output = %output.as_ref().display(), "compiled project");
        Ok(())
    }

    /// Absolute path of an href relative to the package document.
    fn resolve(&self, href: &str) -> PathBuf {
        self.root.join(resolve_href(&self.package_path, href))
    }
}

/// Href of the placeholder page, relative to the package document.
fn placeholder_href(content_dir: &str) -> String {
    match content_dir.trim_end_matches('/') {
        "" => PLACEHOLDER_FILE.to_string(),
        dir => format!("{dir}/{PLACEHOLDER_FILE}"),
    }
}

/// Read and decode a document, mapping a missing file to [`Error::NotFound`].
fn read_document(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    Ok(decode_document(&fs::read(path)?).into_owned())
}
