//! The container pointer document (`META-INF/container.xml`) and the
//! `mimetype` marker file.

use std::fs;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::archive;
use crate::error::{Error, Result};
use crate::util::{attributes, decode_document, escape_xml, local_name};

/// Location of the pointer document, relative to the project root.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Name of the marker file at the project root.
pub const MIMETYPE_PATH: &str = "mimetype";

/// Exact content of the marker file, without the trailing newline.
pub const MIMETYPE: &str = "application/epub+zip";

/// Media type that the pointer document records for the package document.
pub const PACKAGE_MEDIA_TYPE: &str = "application/oebps-package+xml";

const CONTAINER_NS: &str = "urn:oasis:names:tc:opendocument:xmlns:container";

/// Find the package document's path for a project directory or a packaged
/// `.epub` file.
///
/// The returned path is relative to the project (or archive) root.
pub fn locate(location: &Path) -> Result<String> {
    let bytes = if location.is_dir() {
        let pointer = location.join(CONTAINER_PATH);
        if !pointer.is_file() {
            return Err(Error::NotFound(pointer.display().to_string()));
        }
        fs::read(&pointer)?
    } else {
        archive::read_entry(location, CONTAINER_PATH)?
    };

    let path = parse_container_xml(&bytes)?;
    debug!(location = %location.display(), package = %path, "located package document");
    Ok(path)
}

/// Write the pointer document and the `mimetype` marker under `base`.
///
/// Creates `base/META-INF` if needed. `package_path` is relative to `base`.
pub fn create(base: &Path, package_path: &str) -> Result<()> {
    fs::create_dir_all(base.join("META-INF"))?;
    fs::write(base.join(CONTAINER_PATH), container_xml(package_path))?;
    fs::write(base.join(MIMETYPE_PATH), format!("{MIMETYPE}\n"))?;
    debug!(base = %base.display(), package = %package_path, "created container files");
    Ok(())
}

/// Render the pointer document naming `package_path`.
pub fn container_xml(package_path: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="{CONTAINER_NS}">
  <rootfiles>
    <rootfile full-path="{}" media-type="{PACKAGE_MEDIA_TYPE}"/>
  </rootfiles>
</container>
"#,
        escape_xml(package_path)
    )
}

/// Parse a pointer document and return the `full-path` of its `rootfile`.
pub fn parse_container_xml(bytes: &[u8]) -> Result<String> {
    let content = decode_document(bytes);
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attributes(&e)?.remove("full-path") {
                    return Ok(path);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Err(Error::NotFound(format!(
        "no rootfile with a full-path attribute in {CONTAINER_PATH}"
    )))
}
