//! File suffix to media type resolution for manifest items.

use crate::error::{Error, Result};

/// Known file suffixes and the media types they stand for.
///
/// Lookups are exact: callers may pass a bare suffix (`"html"`) or a full
/// media type, and anything not listed passes through unchanged.
pub const MEDIA_TYPES: &[(&str, &str)] = &[
    ("html", "application/xhtml+xml"),
    ("htm", "application/xhtml+xml"),
    ("xhtml", "application/xhtml+xml"),
    ("xml", "application/xhtml+xml"),
    ("gif", "image/gif"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("css", "text/css"),
    ("ncx", "application/x-dtbncx+xml"),
    ("otf", "application/vnd.ms-opentype"),
    ("ttf", "application/x-font-ttf"),
];

/// Look up a suffix in [`MEDIA_TYPES`].
pub fn lookup(suffix: &str) -> Option<&'static str> {
    MEDIA_TYPES
        .iter()
        .find(|(key, _)| *key == suffix)
        .map(|(_, media_type)| *media_type)
}

/// Resolve the media type of a manifest item.
///
/// An explicit type wins over the href: it is mapped through the suffix table
/// and returned verbatim when unknown. Without one, the href's extension is
/// used the same way. An href with no extension is rejected.
///
/// ```
/// use epubkit::epub::media_type::resolve;
///
/// assert_eq!(resolve(None, "cover.jpg").unwrap(), "image/jpeg");
/// assert_eq!(resolve(Some("html"), "style.css").unwrap(), "application/xhtml+xml");
/// assert_eq!(resolve(None, "data.unknownext").unwrap(), "unknownext");
/// ```
pub fn resolve(explicit: Option<&str>, href: &str) -> Result<String> {
    let key = match explicit {
        Some(media_type) => media_type,
        None => extension(href).ok_or_else(|| {
            Error::InvalidInput(format!(
                "no media type given and '{href}' has no file extension"
            ))
        })?,
    };
    Ok(lookup(key).unwrap_or(key).to_string())
}

/// The text after the last `.` of the final path segment, if non-empty.
fn extension(href: &str) -> Option<&str> {
    let file = href.rsplit('/').next().unwrap_or(href);
    match file.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}
