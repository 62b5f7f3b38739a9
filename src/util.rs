//! Text decoding and small XML helpers shared by the document parsers.

use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::events::BytesStart;

use crate::error::{Error, Result};

// ============================================================================
// Text Decoding
// ============================================================================

/// Decode a document's raw bytes into a string.
///
/// UTF-8 is tried first (a BOM is handled by `encoding_rs`). If the bytes are
/// not valid UTF-8, the encoding named in the XML declaration is used, and
/// Windows-1252 is the last resort for old hand-edited files.
pub fn decode_document(bytes: &[u8]) -> Cow<'_, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = extract_xml_encoding(bytes)
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Extract the encoding name from an XML declaration.
///
/// Only the first 100 bytes are inspected.
fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    let quote = *after_enc.first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

// ============================================================================
// XML Helpers
// ============================================================================

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
pub fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Resolve an XML entity reference (without the surrounding `&` and `;`).
pub fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }

    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()?
    } else {
        entity.strip_prefix('#')?.parse::<u32>().ok()?
    };
    char::from_u32(code).map(|c| c.to_string())
}

/// Escape text for use in element content or a double-quoted attribute.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Collect the attributes of an element as `qualified name -> unescaped value`.
///
/// Namespace declarations (`xmlns`, `xmlns:*`) are skipped.
pub fn attributes(element: &BytesStart<'_>) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for attr in element.attributes() {
        let attr = attr.map_err(|e| Error::MalformedDocument(e.to_string()))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let key = String::from_utf8_lossy(key).into_owned();
        let raw = String::from_utf8_lossy(attr.value.as_ref());
        let value = quick_xml::escape::unescape(&raw)
            .map_err(|e| Error::MalformedDocument(format!("attribute '{key}': {e}")))?
            .into_owned();
        out.insert(key, value);
    }
    Ok(out)
}

/// Render `key="value"` pairs in ascending key order, each preceded by a space.
pub fn render_attributes(attributes: &BTreeMap<String, String>) -> String {
    attributes
        .iter()
        .map(|(key, value)| format!(" {}=\"{}\"", key, escape_xml(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name() {
        assert_eq!(local_name(b"title"), b"title");
        assert_eq!(local_name(b"dc:title"), b"title");
        assert_eq!(local_name(b"opf:meta"), b"meta");
        assert_eq!(local_name(b""), b"");
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp"), Some("&".to_string()));
        assert_eq!(resolve_entity("#65"), Some("A".to_string()));
        assert_eq!(resolve_entity("#x2019"), Some("\u{2019}".to_string()));
        assert_eq!(resolve_entity("nbsp"), None);
        assert_eq!(resolve_entity("#xZZ"), None);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("A & B <c>"), "A &amp; B &lt;c&gt;");
        assert_eq!(escape_xml("say \"hi\""), "say &quot;hi&quot;");
    }

    #[test]
    fn test_decode_document_utf8_with_bom() {
        let bytes = [0xEF, 0xBB, 0xBF, b'<', b'a', b'/', b'>'];
        assert_eq!(decode_document(&bytes), "<a/>");
    }

    #[test]
    fn test_decode_document_declared_latin1() {
        let mut bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><t>caf".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</t>");
        assert!(decode_document(&bytes).contains("caf\u{e9}"));
    }

    #[test]
    fn test_attributes_skip_namespace_declarations() {
        let element = BytesStart::from_content(
            r#"dc:creator xmlns:dc="http://purl.org/dc/elements/1.1/" opf:role="aut" id="a&amp;b""#,
            10,
        );
        let attrs = attributes(&element).unwrap();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["opf:role"], "aut");
        assert_eq!(attrs["id"], "a&b");
    }

    #[test]
    fn test_render_attributes_sorted() {
        let mut attrs = BTreeMap::new();
        attrs.insert("z".to_string(), "1".to_string());
        attrs.insert("a".to_string(), "<2>".to_string());
        assert_eq!(render_attributes(&attrs), r#" a="&lt;2&gt;" z="1""#);
    }
}
