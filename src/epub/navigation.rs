//! The NCX navigation document: head metadata, document title, and the
//! hierarchical navigation map.
//!
//! Play orders are only kept contiguous among top-level points. Nested
//! points keep whatever play order they were parsed or built with.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::warn;

use crate::error::{Error, Result};
use crate::util::{attributes, escape_xml, local_name, resolve_entity};

const NCX_NS: &str = "http://www.daisy.org/z3986/2005/ncx/";

/// Head metadata name that mirrors the package's unique identifier.
pub const UID_META: &str = "dtb:uid";

/// A `<meta name="..." content="..."/>` entry of the NCX head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationMeta {
    pub name: String,
    pub content: String,
}

impl NavigationMeta {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    fn render(&self) -> String {
        format!(
            "<meta name=\"{}\" content=\"{}\"/>",
            escape_xml(&self.name),
            escape_xml(&self.content)
        )
    }
}

/// A `<navPoint>` and the points nested inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationPoint {
    pub id: String,
    pub play_order: usize,
    pub label: String,
    /// The `src` of the point's `<content>` element.
    pub content: String,
    pub children: Vec<NavigationPoint>,
}

impl NavigationPoint {
    pub fn new(
        id: impl Into<String>,
        play_order: usize,
        label: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            play_order,
            label: label.into(),
            content: content.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: NavigationPoint) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first search of this point and its descendants.
    pub fn find(&self, id: &str) -> Option<&NavigationPoint> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    fn write(&self, out: &mut String, indent: usize) {
        let pad = "  ".repeat(indent);
        out.push_str(&format!(
            "{pad}<navPoint id=\"{}\" playOrder=\"{}\">\n",
            escape_xml(&self.id),
            self.play_order
        ));
        out.push_str(&format!(
            "{pad}  <navLabel>\n{pad}    <text>{}</text>\n{pad}  </navLabel>\n",
            escape_xml(&self.label)
        ));
        out.push_str(&format!(
            "{pad}  <content src=\"{}\"/>\n",
            escape_xml(&self.content)
        ));
        for child in &self.children {
            child.write(out, indent + 1);
        }
        out.push_str(&format!("{pad}</navPoint>\n"));
    }
}

/// In-memory model of an NCX document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationDocument {
    uid: NavigationMeta,
    metadata: BTreeMap<String, NavigationMeta>,
    title: String,
    map: Vec<NavigationPoint>,
}

impl Default for NavigationDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationDocument {
    /// An empty document: blank identifier, no metadata, no title, no points.
    pub fn new() -> Self {
        Self {
            uid: NavigationMeta::new(UID_META, ""),
            metadata: BTreeMap::new(),
            title: String::new(),
            map: Vec::new(),
        }
    }

    /// Content of the `dtb:uid` head entry.
    pub fn identifier(&self) -> &str {
        &self.uid.content
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.uid.content = identifier.into();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Head metadata other than `dtb:uid`, keyed by name.
    pub fn metadata(&self) -> &BTreeMap<String, NavigationMeta> {
        &self.metadata
    }

    pub fn metadata_entry(&self, name: &str) -> Option<&NavigationMeta> {
        self.metadata.get(name)
    }

    /// Set a head entry. A `dtb:uid` name updates the identifier instead.
    pub fn add_metadata(&mut self, name: impl Into<String>, content: impl Into<String>) {
        let meta = NavigationMeta::new(name, content);
        if meta.name == UID_META {
            self.uid.content = meta.content;
        } else {
            self.metadata.insert(meta.name.clone(), meta);
        }
    }

    pub fn remove_metadata(&mut self, name: &str) -> Option<NavigationMeta> {
        self.metadata.remove(name)
    }

    /// Top-level navigation points in order.
    pub fn navigation_map(&self) -> &[NavigationPoint] {
        &self.map
    }

    /// Mutable access to the top-level points, for editing their subtrees.
    pub fn navigation_map_mut(&mut self) -> &mut [NavigationPoint] {
        &mut self.map
    }

    /// Find a point anywhere in the tree by id.
    pub fn find(&self, id: &str) -> Option<&NavigationPoint> {
        self.map.iter().find_map(|point| point.find(id))
    }

    /// Append a top-level point with the next play order.
    pub fn add_navigation_point(
        &mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        content: impl Into<String>,
    ) -> &NavigationPoint {
        let play_order = self.map.len() + 1;
        self.map
            .push(NavigationPoint::new(id, play_order, label, content));
        &self.map[play_order - 1]
    }

    /// Insert a top-level point at `play_order` (1-based, at most `len + 1`).
    ///
    /// Every top-level point from that position on moves down one play order.
    /// Nested points are left alone.
    pub fn insert_navigation_point(
        &mut self,
        id: impl Into<String>,
        label: impl Into<String>,
        content: impl Into<String>,
        play_order: usize,
    ) -> Result<&NavigationPoint> {
        let bound = self.map.len() + 1;
        if play_order == 0 || play_order > bound {
            return Err(Error::OutOfRange {
                value: play_order,
                bound,
            });
        }

        let index = play_order - 1;
        for point in &mut self.map[index..] {
            point.play_order += 1;
        }
        self.map
            .insert(index, NavigationPoint::new(id, play_order, label, content));
        Ok(&self.map[index])
    }

    /// Parse an NCX document.
    ///
    /// Fails with [`Error::MalformedDocument`] if the root is not `ncx`, the
    /// `docTitle/text` is missing, or any navigation point lacks a
    /// `navLabel/text` or a `content` with `src`.
    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);

        let mut doc = Self::new();
        let mut title: Option<String> = None;
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut stack: Vec<PointBuilder> = Vec::new();
        let mut text: Option<(TextTarget, String)> = None;

        loop {
            let event = reader.read_event()?;
            let empty = matches!(event, Event::Empty(_));
            match event {
                Event::Start(e) | Event::Empty(e) => {
                    let local = local_name(e.name().as_ref()).to_vec();
                    if path.is_empty() && local != b"ncx" {
                        return Err(Error::MalformedDocument(format!(
                            "root element is '{}', expected 'ncx'",
                            String::from_utf8_lossy(&local)
                        )));
                    }

                    let parent = path.last().map(Vec::as_slice);
                    let grandparent = path.len().checked_sub(2).map(|i| path[i].as_slice());
                    match (local.as_slice(), parent) {
                        (b"meta", Some(b"head")) if path.len() == 2 => doc.read_meta(&e)?,
                        (b"navPoint", Some(b"navMap" | b"navPoint")) => {
                            stack.push(PointBuilder::new(&e)?)
                        }
                        (b"content", Some(b"navPoint")) => {
                            if let Some(point) = stack.last_mut()
                                && point.content.is_none()
                            {
                                point.content = attributes(&e)?.remove("src");
                            }
                        }
                        (b"text", Some(b"navLabel")) if matches!(grandparent, Some(b"navPoint")) => {
                            text = Some((TextTarget::Label, String::new()))
                        }
                        (b"text", Some(b"docTitle")) if path.len() == 2 => {
                            text = Some((TextTarget::Title, String::new()))
                        }
                        _ => {}
                    }

                    if empty {
                        finish_element(&local, &mut text, &mut title, &mut stack, &mut doc.map)?;
                    } else {
                        path.push(local);
                    }
                }
                Event::Text(e) => {
                    if let Some((_, buf)) = text.as_mut() {
                        buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::CData(e) => {
                    if let Some((_, buf)) = text.as_mut() {
                        buf.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::GeneralRef(e) => {
                    if let Some((_, buf)) = text.as_mut() {
                        let entity = String::from_utf8_lossy(e.as_ref());
                        if let Some(resolved) = resolve_entity(&entity) {
                            buf.push_str(&resolved);
                        }
                    }
                }
                Event::End(_) => {
                    if let Some(local) = path.pop() {
                        finish_element(&local, &mut text, &mut title, &mut stack, &mut doc.map)?;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        doc.title = title.ok_or_else(|| {
            Error::MalformedDocument("navigation document has no docTitle/text".to_string())
        })?;
        Ok(doc)
    }

    fn read_meta(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let mut attrs = attributes(e)?;
        let name = attrs.remove("name").unwrap_or_default();
        let content = attrs.remove("content").unwrap_or_default();
        self.add_metadata(name, content);
        Ok(())
    }

    /// Render the document as NCX XML.
    pub fn serialize(&self) -> String {
        let mut ncx = String::new();

        ncx.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        ncx.push_str(
            "<!DOCTYPE ncx PUBLIC \"-//NISO//DTD ncx 2005-1//EN\" \"http://www.daisy.org/z3986/2005/ncx-2005-1.dtd\">\n",
        );
        ncx.push_str(&format!("<ncx xmlns=\"{NCX_NS}\" version=\"2005-1\">\n"));

        ncx.push_str("  <head>\n");
        ncx.push_str(&format!("    {}\n", self.uid.render()));
        for meta in self.metadata.values() {
            ncx.push_str(&format!("    {}\n", meta.render()));
        }
        ncx.push_str("  </head>\n");

        ncx.push_str(&format!(
            "  <docTitle>\n    <text>{}</text>\n  </docTitle>\n",
            escape_xml(&self.title)
        ));

        ncx.push_str("  <navMap>\n");
        for point in &self.map {
            point.write(&mut ncx, 2);
        }
        ncx.push_str("  </navMap>\n</ncx>\n");
        ncx
    }
}

#[derive(Debug, Clone, Copy)]
enum TextTarget {
    Label,
    Title,
}

struct PointBuilder {
    id: String,
    play_order: usize,
    label: Option<String>,
    content: Option<String>,
    children: Vec<NavigationPoint>,
}

impl PointBuilder {
    fn new(e: &BytesStart<'_>) -> Result<Self> {
        let mut attrs = attributes(e)?;
        let id = attrs.remove("id").unwrap_or_default();
        let play_order = match attrs.get("playOrder").map(|v| v.trim().parse::<usize>()) {
            Some(Ok(order)) => order,
            _ => {
                warn!(id = %id, "navPoint has no numeric playOrder; using 0");
                0
            }
        };
        Ok(Self {
            id,
            play_order,
            label: None,
            content: None,
            children: Vec::new(),
        })
    }

    fn build(self) -> Result<NavigationPoint> {
        let label = self.label.ok_or_else(|| {
            Error::MalformedDocument(format!("navPoint '{}' has no navLabel/text", self.id))
        })?;
        let content = self.content.ok_or_else(|| {
            Error::MalformedDocument(format!("navPoint '{}' has no content src", self.id))
        })?;
        Ok(NavigationPoint {
            id: self.id,
            play_order: self.play_order,
            label,
            content,
            children: self.children,
        })
    }
}

/// Close an element: commit collected text or a finished navigation point.
fn finish_element(
    local: &[u8],
    text: &mut Option<(TextTarget, String)>,
    title: &mut Option<String>,
    stack: &mut Vec<PointBuilder>,
    map: &mut Vec<NavigationPoint>,
) -> Result<()> {
    match local {
        b"text" => {
            if let Some((target, value)) = text.take() {
                match target {
                    TextTarget::Title => {
                        title.get_or_insert(value);
                    }
                    TextTarget::Label => {
                        if let Some(point) = stack.last_mut() {
                            point.label.get_or_insert(value);
                        }
                    }
                }
            }
        }
        b"navPoint" => {
            if let Some(builder) = stack.pop() {
                let point = builder.build()?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(point),
                    None => map.push(point),
                }
            }
        }
        _ => {}
    }
    Ok(())
}
