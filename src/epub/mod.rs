//! EPUB 2 metadata documents: the container pointer, the OPF package
//! document, and the NCX navigation document.

pub mod container;
pub mod media_type;
pub mod navigation;
pub mod package;

pub use navigation::{NavigationDocument, NavigationMeta, NavigationPoint};
pub use package::{
    DeprecatedMeta, DublinCore, GuideReference, ManifestItem, PackageDocument, SpineItemRef,
};

use percent_encoding::percent_decode_str;

/// Resolve a manifest href against the package document's location.
///
/// Both paths use `/` separators and are relative to the project (or
/// archive) root. The href is percent-decoded, any fragment is dropped, and
/// `.`/`..` segments are folded.
///
/// ```
/// use epubkit::epub::resolve_href;
///
/// assert_eq!(resolve_href("OEBPS/content.opf", "toc.ncx"), "OEBPS/toc.ncx");
/// assert_eq!(resolve_href("OEBPS/content.opf", "../a%20b.html#x"), "a b.html");
/// assert_eq!(resolve_href("metadata.opf", "content/title.html"), "content/title.html");
/// ```
pub fn resolve_href(package_path: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or_default();
    let decoded = percent_decode_str(href).decode_utf8_lossy();

    let base = package_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or_default();

    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(decoded.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
