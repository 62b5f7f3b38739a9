//! # epubkit
//!
//! Read, edit and write the metadata side of an EPUB 2 project: the OPF
//! package document, the NCX navigation document, and the
//! `META-INF/container.xml` pointer that ties them to a directory.
//!
//! ## Features
//!
//! - Lenient parsing of package and navigation documents
//! - Deterministic serialization (stable output for unchanged models)
//! - Title and identifier kept in sync across both documents
//! - Backup-and-replace saves, never truncating a live file in place
//! - Packaging a project directory into an `.epub` archive
//!
//! ## Quick Start
//!
//! ```no_run
//! use epubkit::{CreateOptions, Project, SystemEnvironment};
//!
//! // Start a new project with a title page
//! let mut project = Project::create(
//!     "my-book",
//!     CreateOptions::default().with_title("My Book").with_placeholder_page(true),
//!     SystemEnvironment,
//! )?;
//! project.add_creator("Jane Doe", "author");
//! project.save()?;
//!
//! // Reopen it later and package it
//! let project = Project::open("my-book")?;
//! project.compile("my-book.epub")?;
//! # Ok::<(), epubkit::Error>(())
//! ```
//!
//! ## Working with Documents
//!
//! The document models can be used on their own:
//!
//! ```
//! use epubkit::{NavigationDocument, PackageDocument};
//!
//! let mut package = PackageDocument::new();
//! package.set_title("My Book");
//! package.add_manifest_item("ch1", "ch1.html", None).unwrap();
//! package.add_spine_itemref("ch1");
//! let xml = package.serialize();
//! assert_eq!(PackageDocument::parse(&xml).unwrap(), package);
//!
//! let mut navigation = NavigationDocument::new();
//! navigation.add_navigation_point("ch1", "Chapter 1", "ch1.html");
//! assert_eq!(navigation.navigation_map()[0].play_order, 1);
//! ```

pub mod archive;
pub mod env;
pub mod epub;
pub mod error;
pub mod project;
pub mod storage;
pub mod template;
pub(crate) mod util;

pub use env::{Environment, FixedEnvironment, SystemEnvironment};
pub use epub::{
    DeprecatedMeta, DublinCore, GuideReference, ManifestItem, NavigationDocument, NavigationMeta,
    NavigationPoint, PackageDocument, SpineItemRef,
};
pub use error::{Error, Result};
pub use project::{CreateOptions, Project};
pub use storage::AtomicWriter;
