//! The OPF package document: dublin-core metadata, deprecated `meta`
//! entries, manifest, spine, and guide.
//!
//! Parsing is lenient about everything except the two structural anchors
//! (`package` root and its `metadata` section). Serialization is
//! deterministic: manifest items are sorted by id and guide references by
//! type, everything else keeps insertion order.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::warn;

use super::media_type;
use crate::error::{Error, Result};
use crate::util::{attributes, escape_xml, local_name, render_attributes, resolve_entity};

const OPF_NS: &str = "http://www.idpf.org/2007/opf";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

/// Default `id` attribute of the unique identifier entry.
pub const DEFAULT_IDENTIFIER_ID: &str = "bookid";

/// Default manifest id of the navigation document.
pub const DEFAULT_TOC_ID: &str = "toc";

/// Long contributor role names and their MARC relator codes.
pub const MARC_RELATORS: &[(&str, &str)] = &[
    ("adapter", "adp"),
    ("annotator", "ann"),
    ("arranger", "arr"),
    ("artist", "art"),
    ("associated name", "asn"),
    ("author", "aut"),
    ("author in quotations", "aqt"),
    ("author of afterword", "aft"),
    ("author of introduction", "aui"),
    ("bibliographic antecedent", "ant"),
    ("book producer", "bkp"),
    ("collaborator", "clb"),
    ("commentator", "cmm"),
    ("designer", "dsr"),
    ("editor", "edt"),
    ("illustrator", "ill"),
    ("lyricist", "lyr"),
    ("metadata contact", "mdc"),
    ("musician", "mus"),
    ("narrator", "nrt"),
    ("other", "oth"),
    ("photographer", "pht"),
    ("printer", "prt"),
    ("redactor", "red"),
    ("reviewer", "rev"),
    ("sponsor", "spn"),
    ("thesis advisor", "ths"),
    ("transcriber", "trc"),
    ("translator", "trl"),
];

/// Guide reference types defined by OPF 2.0.
pub const REFERENCE_TYPES: &[&str] = &[
    "cover",
    "title-page",
    "toc",
    "index",
    "glossary",
    "acknowledgements",
    "bibliography",
    "colophon",
    "copyright-page",
    "dedication",
    "epigraph",
    "foreword",
    "loi",
    "lot",
    "notes",
    "preface",
    "text",
];

/// Map a long role name ("editor") to its MARC relator code ("edt").
pub fn marc_relator(role: &str) -> Option<&'static str> {
    MARC_RELATORS
        .iter()
        .find(|(long, _)| *long == role)
        .map(|(_, code)| *code)
}

/// A dublin-core metadata element, such as
/// `<dc:creator opf:role="aut">Jane Doe</dc:creator>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DublinCore {
    /// Element name without the `dc:` prefix.
    pub name: String,
    pub value: String,
    attributes: BTreeMap<String, String>,
}

impl DublinCore {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Build an entry from a raw attribute map.
    ///
    /// `dc:` prefixes are dropped from keys, and the reserved `name` and
    /// `content` keys are discarded.
    pub fn with_attributes(
        name: impl Into<String>,
        value: impl Into<String>,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        let attributes = attributes
            .into_iter()
            .map(|(key, value)| match key.strip_prefix("dc:") {
                Some(local) => (local.to_string(), value),
                None => (key, value),
            })
            .filter(|(key, _)| !is_reserved(key))
            .collect();
        Self {
            name: name.into(),
            value: value.into(),
            attributes,
        }
    }

    /// Set one attribute; reserved keys are ignored.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !is_reserved(&key) {
            self.attributes.insert(key, value.into());
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    fn render(&self) -> String {
        format!(
            "<dc:{name}{attrs}>{value}</dc:{name}>",
            name = self.name,
            attrs = render_attributes(&self.attributes),
            value = escape_xml(&self.value)
        )
    }
}

/// A deprecated `<meta name="..." content="..."/>` metadata element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeprecatedMeta {
    pub name: String,
    pub value: String,
    attributes: BTreeMap<String, String>,
}

impl DeprecatedMeta {
    /// `name`/`content` keys in `attributes` are discarded; they are carried
    /// by the dedicated fields.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        attributes: BTreeMap<String, String>,
    ) -> Self {
        let attributes = attributes
            .into_iter()
            .filter(|(key, _)| !is_reserved(key))
            .collect();
        Self {
            name: name.into(),
            value: value.into(),
            attributes,
        }
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    fn render(&self) -> String {
        format!(
            "<meta name=\"{}\" content=\"{}\"{}/>",
            escape_xml(&self.name),
            escape_xml(&self.value),
            render_attributes(&self.attributes)
        )
    }
}

fn is_reserved(key: &str) -> bool {
    key == "name" || key == "content"
}

/// A manifest `<item>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
}

impl ManifestItem {
    /// Create an item, resolving the media type via [`media_type::resolve`].
    pub fn new(
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: Option<&str>,
    ) -> Result<Self> {
        let href = href.into();
        let media_type = media_type::resolve(media_type, &href)?;
        Ok(Self {
            id: id.into(),
            href,
            media_type,
        })
    }
}

/// A spine `<itemref>`. The same idref may appear more than once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItemRef {
    pub idref: String,
}

impl SpineItemRef {
    pub fn new(idref: impl Into<String>) -> Self {
        Self {
            idref: idref.into(),
        }
    }
}

/// A guide `<reference>`, unique by type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuideReference {
    pub kind: String,
    pub title: String,
    pub href: String,
}

impl GuideReference {
    pub fn new(kind: impl Into<String>, title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            title: title.into(),
            href: href.into(),
        }
    }

    /// Whether the type is one of [`REFERENCE_TYPES`] or an `other.` extension.
    pub fn is_standard_type(&self) -> bool {
        REFERENCE_TYPES.contains(&self.kind.as_str()) || self.kind.starts_with("other.")
    }
}

/// In-memory model of an OPF 2.0 package document.
///
/// Cross references (spine idrefs, the toc id, the unique identifier's `id`
/// attribute) are not validated; callers that need consistency check it
/// themselves.
#[derive(Debug, Clone)]
pub struct PackageDocument {
    title: DublinCore,
    language: DublinCore,
    identifier: DublinCore,
    other: Vec<DublinCore>,
    meta: Vec<DeprecatedMeta>,
    manifest: Vec<ManifestItem>,
    spine: Vec<SpineItemRef>,
    guide: Vec<GuideReference>,
    toc: Option<String>,
}

impl Default for PackageDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for PackageDocument {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.language == other.language
            && self.identifier == other.identifier
            && self.other == other.other
            && self.meta == other.meta
            && self.sorted_manifest() == other.sorted_manifest()
            && self.spine == other.spine
            && self.sorted_guide() == other.sorted_guide()
            && self.toc == other.toc
    }
}

impl PackageDocument {
    /// An empty document with scratch defaults.
    pub fn new() -> Self {
        Self {
            title: DublinCore::new("title", ""),
            language: DublinCore::new("language", ""),
            identifier: DublinCore::new("identifier", "")
                .with_attribute("id", DEFAULT_IDENTIFIER_ID),
            other: Vec::new(),
            meta: Vec::new(),
            manifest: Vec::new(),
            spine: Vec::new(),
            guide: Vec::new(),
            toc: Some(DEFAULT_TOC_ID.to_string()),
        }
    }

    // ------------------------------------------------------------------------
    // Dublin core
    // ------------------------------------------------------------------------

    pub fn title(&self) -> &str {
        &self.title.value
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title.value = title.into();
    }

    pub fn language(&self) -> &str {
        &self.language.value
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language.value = language.into();
    }

    /// Value of the unique identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier.value
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier.value = identifier.into();
    }

    /// The entry the package root's `unique-identifier` attribute points at.
    pub fn unique_identifier(&self) -> &DublinCore {
        &self.identifier
    }

    pub fn unique_identifier_mut(&mut self) -> &mut DublinCore {
        &mut self.identifier
    }

    /// Dublin-core entries other than the title, language, and unique
    /// identifier, in insertion order.
    pub fn other_dublin_core(&self) -> &[DublinCore] {
        &self.other
    }

    /// All dublin-core entries with the given name.
    ///
    /// For `"identifier"` the unique identifier comes first, followed by any
    /// other identifier entries.
    pub fn dublin_core(&self, name: &str) -> Vec<&DublinCore> {
        match name {
            "title" => vec![&self.title],
            "language" => vec![&self.language],
            _ => {
                let mut entries: Vec<&DublinCore> = Vec::new();
                if name == "identifier" {
                    entries.push(&self.identifier);
                }
                entries.extend(self.other.iter().filter(|entry| entry.name == name));
                entries
            }
        }
    }

    /// Append a dublin-core entry to the "other" list.
    ///
    /// This never replaces the title, language or unique identifier; use
    /// their setters for that. An extra `title` added here is serialized
    /// after the main one and parses back into the "other" list.
    pub fn add_dublin_core(&mut self, entry: DublinCore) {
        self.other.push(entry);
    }

    /// Add a `creator` entry. `role` may be a MARC code or a long role name.
    pub fn add_creator(&mut self, name: impl Into<String>, role: &str) {
        let code = marc_relator(role).unwrap_or(role);
        self.other
            .push(DublinCore::new("creator", name).with_attribute("opf:role", code));
    }

    // ------------------------------------------------------------------------
    // Deprecated meta
    // ------------------------------------------------------------------------

    pub fn deprecated_meta(&self, name: &str) -> Vec<&DeprecatedMeta> {
        self.meta.iter().filter(|entry| entry.name == name).collect()
    }

    pub fn all_deprecated_meta(&self) -> &[DeprecatedMeta] {
        &self.meta
    }

    pub fn add_deprecated_meta(&mut self, entry: DeprecatedMeta) {
        self.meta.push(entry);
    }

    // ------------------------------------------------------------------------
    // Manifest
    // ------------------------------------------------------------------------

    /// Manifest items in insertion order.
    pub fn manifest(&self) -> &[ManifestItem] {
        &self.manifest
    }

    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Add an item, replacing any existing item with the same id in place.
    pub fn add_manifest_item(
        &mut self,
        id: impl Into<String>,
        href: impl Into<String>,
        media_type: Option<&str>,
    ) -> Result<&ManifestItem> {
        let item = ManifestItem::new(id, href, media_type)?;
        Ok(self.insert_manifest_item(item))
    }

    fn insert_manifest_item(&mut self, item: ManifestItem) -> &ManifestItem {
        let index = match self.manifest.iter().position(|existing| existing.id == item.id) {
            Some(index) => {
                self.manifest[index] = item;
                index
            }
            None => {
                self.manifest.push(item);
                self.manifest.len() - 1
            }
        };
        &self.manifest[index]
    }

    pub fn remove_manifest_item(&mut self, id: &str) -> Option<ManifestItem> {
        let index = self.manifest.iter().position(|item| item.id == id)?;
        Some(self.manifest.remove(index))
    }

    fn sorted_manifest(&self) -> Vec<&ManifestItem> {
        let mut items: Vec<&ManifestItem> = self.manifest.iter().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }

    // ------------------------------------------------------------------------
    // Spine
    // ------------------------------------------------------------------------

    pub fn spine(&self) -> &[SpineItemRef] {
        &self.spine
    }

    pub fn add_spine_itemref(&mut self, idref: impl Into<String>) {
        self.spine.push(SpineItemRef::new(idref));
    }

    /// Insert an itemref at a zero-based position (`index <= len`).
    pub fn insert_spine_itemref(&mut self, index: usize, idref: impl Into<String>) -> Result<()> {
        if index > self.spine.len() {
            return Err(Error::InvalidInput(format!(
                "spine position {index} is past the end (length {})",
                self.spine.len()
            )));
        }
        self.spine.insert(index, SpineItemRef::new(idref));
        Ok(())
    }

    /// Remove every itemref pointing at `idref`; returns how many were removed.
    pub fn remove_spine_itemref(&mut self, idref: &str) -> usize {
        let before = self.spine.len();
        self.spine.retain(|item| item.idref != idref);
        before - self.spine.len()
    }

    // ------------------------------------------------------------------------
    // Guide
    // ------------------------------------------------------------------------

    /// Guide references in insertion order.
    pub fn guide(&self) -> &[GuideReference] {
        &self.guide
    }

    pub fn guide_reference(&self, kind: &str) -> Option<&GuideReference> {
        self.guide.iter().find(|reference| reference.kind == kind)
    }

    /// Add a reference, replacing any existing reference of the same type.
    pub fn add_guide_reference(
        &mut self,
        kind: impl Into<String>,
        title: impl Into<String>,
        href: impl Into<String>,
    ) {
        self.insert_guide_reference(GuideReference::new(kind, title, href));
    }

    fn insert_guide_reference(&mut self, reference: GuideReference) {
        if !reference.is_standard_type() {
            warn!(kind = %reference.kind, "non-standard guide reference type");
        }
        match self.guide.iter_mut().find(|existing| existing.kind == reference.kind) {
            Some(existing) => *existing = reference,
            None => self.guide.push(reference),
        }
    }

    pub fn remove_guide_reference(&mut self, kind: &str) -> Option<GuideReference> {
        let index = self.guide.iter().position(|reference| reference.kind == kind)?;
        Some(self.guide.remove(index))
    }

    fn sorted_guide(&self) -> Vec<&GuideReference> {
        let mut references: Vec<&GuideReference> = self.guide.iter().collect();
        references.sort_by(|a, b| a.kind.cmp(&b.kind));
        references
    }

    // ------------------------------------------------------------------------
    // Navigation document pointer
    // ------------------------------------------------------------------------

    /// Manifest id of the navigation document (the spine's `toc` attribute).
    pub fn toc(&self) -> Option<&str> {
        self.toc.as_deref()
    }

    pub fn set_toc(&mut self, toc: impl Into<String>) {
        self.toc = Some(toc.into());
    }

    /// Href of the manifest item named by `toc`.
    pub fn locate_toc_target(&self) -> Result<&str> {
        let toc = self.toc.as_deref().unwrap_or_default();
        self.manifest_item(toc)
            .map(|item| item.href.as_str())
            .ok_or_else(|| Error::DanglingReference(toc.to_string()))
    }

    /// Spine idrefs and the toc id that name no manifest item, one message
    /// per problem.
    pub fn dangling_references(&self) -> Vec<String> {
        let mut problems: Vec<String> = self
            .spine
            .iter()
            .filter(|itemref| self.manifest_item(&itemref.idref).is_none())
            .map(|itemref| format!("spine itemref '{}' names no manifest item", itemref.idref))
            .collect();
        if let Some(toc) = self.toc.as_deref()
            && self.manifest_item(toc).is_none()
        {
            problems.push(format!("toc '{toc}' names no manifest item"));
        }
        problems
    }

    // ------------------------------------------------------------------------
    // Parsing
    // ------------------------------------------------------------------------

    /// Parse a package document.
    ///
    /// Fails with [`Error::MalformedDocument`] if the root is not `package` or
    /// it has no `metadata` child.
    pub fn parse(content: &str) -> Result<Self> {
        let mut reader = Reader::from_str(content);

        let mut doc = Self::new();
        doc.toc = None;

        // Local names of the currently open elements, root first.
        let mut path: Vec<Vec<u8>> = Vec::new();
        let mut seen_root = false;
        let mut seen_metadata = false;
        let mut pending: Option<PendingEntry> = None;
        let mut seen = SeenSlots::default();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let local = local_name(e.name().as_ref()).to_vec();
                    if !seen_root {
                        check_root(&local)?;
                        seen_root = true;
                    } else if path.len() == 1 && local == b"metadata" {
                        seen_metadata = true;
                    } else if path.len() == 2 && path[1] == b"metadata" {
                        pending = Some(PendingEntry::new(&e, &local)?);
                    } else if path.len() == 1 && local == b"spine" {
                        doc.read_spine_attributes(&e)?;
                    }
                    path.push(local);
                }
                Event::Empty(e) => {
                    let local = local_name(e.name().as_ref()).to_vec();
                    if !seen_root {
                        check_root(&local)?;
                        seen_root = true;
                    } else if path.len() == 1 {
                        match local.as_slice() {
                            b"metadata" => seen_metadata = true,
                            b"spine" => doc.read_spine_attributes(&e)?,
                            _ => {}
                        }
                    } else if path.len() == 2 {
                        match (path[1].as_slice(), local.as_slice()) {
                            (b"metadata", _) => {
                                doc.push_metadata(PendingEntry::new(&e, &local)?, &mut seen)
                            }
                            (b"manifest", b"item") => doc.read_manifest_item(&e)?,
                            (b"spine", b"itemref") => {
                                if let Some(idref) = attributes(&e)?.remove("idref") {
                                    doc.spine.push(SpineItemRef::new(idref));
                                }
                            }
                            (b"guide", b"reference") => doc.read_guide_reference(&e)?,
                            _ => {}
                        }
                    }
                }
                Event::Text(e) => {
                    if let Some(entry) = pending.as_mut() {
                        entry.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::CData(e) => {
                    if let Some(entry) = pending.as_mut() {
                        entry.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                    }
                }
                Event::GeneralRef(e) => {
                    if let Some(entry) = pending.as_mut() {
                        let entity = String::from_utf8_lossy(e.as_ref());
                        if let Some(resolved) = resolve_entity(&entity) {
                            entry.text.push_str(&resolved);
                        }
                    }
                }
                Event::End(_) => {
                    if path.len() == 3
                        && path[1] == b"metadata"
                        && let Some(entry) = pending.take()
                    {
                        doc.push_metadata(entry, &mut seen);
                    }
                    path.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(Error::MalformedDocument(
                "missing package root element".to_string(),
            ));
        }
        if !seen_metadata {
            return Err(Error::MalformedDocument(
                "package has no metadata section".to_string(),
            ));
        }
        Ok(doc)
    }

    fn push_metadata(&mut self, entry: PendingEntry, seen: &mut SeenSlots) {
        let PendingEntry {
            local,
            text,
            mut attributes,
        } = entry;
        if local == "meta" {
            let name = attributes.remove("name").unwrap_or_default();
            let content = attributes.remove("content").unwrap_or_default();
            self.meta.push(DeprecatedMeta::new(name, content, attributes));
            return;
        }

        // The first title, language and id-carrying identifier fill the
        // slots; repeats are kept as ordinary entries.
        let entry = DublinCore::with_attributes(local, text, attributes);
        if entry.name == "title" && !seen.title {
            seen.title = true;
            self.title = entry;
        } else if entry.name == "language" && !seen.language {
            seen.language = true;
            self.language = entry;
        } else if entry.name == "identifier"
            && entry.attribute("id").is_some()
            && !seen.identifier
        {
            seen.identifier = true;
            self.identifier = entry;
        } else {
            self.other.push(entry);
        }
    }

    fn read_spine_attributes(&mut self, e: &BytesStart<'_>) -> Result<()> {
        if let Some(toc) = attributes(e)?.remove("toc") {
            self.toc = Some(toc);
        }
        Ok(())
    }

    fn read_manifest_item(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let mut attrs = attributes(e)?;
        let Some(id) = attrs.remove("id") else {
            warn!("skipping manifest item without an id");
            return Ok(());
        };
        let href = attrs.remove("href").unwrap_or_default();
        let item = ManifestItem::new(id, href, attrs.get("media-type").map(String::as_str))?;
        self.insert_manifest_item(item);
        Ok(())
    }

    fn read_guide_reference(&mut self, e: &BytesStart<'_>) -> Result<()> {
        let mut attrs = attributes(e)?;
        let Some(kind) = attrs.remove("type") else {
            warn!("skipping guide reference without a type");
            return Ok(());
        };
        self.insert_guide_reference(GuideReference {
            kind,
            title: attrs.remove("title").unwrap_or_default(),
            href: attrs.remove("href").unwrap_or_default(),
        });
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// Render the document as OPF 2.0 XML.
    pub fn serialize(&self) -> String {
        let mut opf = String::new();

        opf.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        opf.push_str(&format!(
            "<package xmlns=\"{OPF_NS}\" version=\"2.0\" unique-identifier=\"{}\">\n",
            escape_xml(self.identifier.attribute("id").unwrap_or_default())
        ));
        opf.push_str(&format!(
            "  <metadata xmlns:dc=\"{DC_NS}\" xmlns:opf=\"{OPF_NS}\">\n"
        ));
        for entry in [&self.title, &self.language, &self.identifier]
            .into_iter()
            .chain(&self.other)
        {
            opf.push_str(&format!("    {}\n", entry.render()));
        }
        for entry in &self.meta {
            opf.push_str(&format!("    {}\n", entry.render()));
        }
        opf.push_str("  </metadata>\n");

        opf.push_str("  <manifest>\n");
        for item in self.sorted_manifest() {
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
                escape_xml(&item.id),
                escape_xml(&item.href),
                escape_xml(&item.media_type)
            ));
        }
        opf.push_str("  </manifest>\n");

        match &self.toc {
            Some(toc) => opf.push_str(&format!("  <spine toc=\"{}\">\n", escape_xml(toc))),
            None => opf.push_str("  <spine>\n"),
        }
        for item in &self.spine {
            opf.push_str(&format!(
                "    <itemref idref=\"{}\"/>\n",
                escape_xml(&item.idref)
            ));
        }
        opf.push_str("  </spine>\n");

        if !self.guide.is_empty() {
            opf.push_str("  <guide>\n");
            for reference in self.sorted_guide() {
                opf.push_str(&format!(
                    "    <reference type=\"{}\" title=\"{}\" href=\"{}\"/>\n",
                    escape_xml(&reference.kind),
                    escape_xml(&reference.title),
                    escape_xml(&reference.href)
                ));
            }
            opf.push_str("  </guide>\n");
        }

        opf.push_str("</package>\n");
        opf
    }
}

/// A metadata child whose text is still being collected.
struct PendingEntry {
    local: String,
    text: String,
    attributes: BTreeMap<String, String>,
}

impl PendingEntry {
    fn new(e: &BytesStart<'_>, local: &[u8]) -> Result<Self> {
        Ok(Self {
            local: String::from_utf8_lossy(local).into_owned(),
            text: String::new(),
            attributes: attributes(e)?,
        })
    }
}

/// Which distinguished metadata slots a parse has already filled.
#[derive(Default)]
struct SeenSlots {
    title: bool,
    language: bool,
    identifier: bool,
}

fn check_root(local: &[u8]) -> Result<()> {
    if local == b"package" {
        Ok(())
    } else {
        Err(Error::MalformedDocument(format!(
            "root element is '{}', expected 'package'",
            String::from_utf8_lossy(local)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE_OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>Spontaneous Derivation</dc:title>
    <dc:creator opf:file-as="Doe, John" opf:role="aut">John Doe</dc:creator>
    <dc:language>en-US</dc:language>
    <dc:identifier id="BookId">urn:uuid:1234</dc:identifier>
    <dc:identifier opf:scheme="ISBN">978-0-00-000000-0</dc:identifier>
    <dc:rights>Tom &amp; Jerry</dc:rights>
    <meta name="cover" content="cover-image" scheme="x"/>
  </metadata>
  <manifest>
    <item id="title" href="content/title.html" media-type="application/xhtml+xml"/>
    <item id="toc" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="cover-image" href="images/cover.jpg"/>
  </manifest>
  <spine toc="toc">
    <itemref idref="title"/>
    <itemref idref="title"/>
  </spine>
  <guide>
    <reference type="toc" title="Table of Contents" href="content/toc.html"/>
  </guide>
</package>"#;

    #[test]
    fn test_parse_metadata() {
        let doc = PackageDocument::parse(SAMPLE_OPF).unwrap();

        assert_eq!(doc.title(), "Spontaneous Derivation");
        assert_eq!(doc.language(), "en-US");
        assert_eq!(doc.identifier(), "urn:uuid:1234");
        assert_eq!(doc.unique_identifier().attribute("id"), Some("BookId"));

        let creators = doc.dublin_core("creator");
        assert_eq!(creators.len(), 1);
        assert_eq!(creators[0].value, "John Doe");
        assert_eq!(creators[0].attribute("opf:role"), Some("aut"));
        assert_eq!(creators[0].attribute("opf:file-as"), Some("Doe, John"));

        assert_eq!(doc.dublin_core("rights")[0].value, "Tom & Jerry");
    }

    #[test]
    fn test_identifier_lookup_puts_unique_identifier_first() {
        let doc = PackageDocument::parse(SAMPLE_OPF).unwrap();
        let identifiers = doc.dublin_core("identifier");
        assert_eq!(identifiers.len(), 2);
        assert_eq!(identifiers[0].value, "urn:uuid:1234");
        assert_eq!(identifiers[1].value, "978-0-00-000000-0");
        assert_eq!(identifiers[1].attribute("opf:scheme"), Some("ISBN"));
    }

    #[test]
    fn test_parse_deprecated_meta() {
        let doc = PackageDocument::parse(SAMPLE_OPF).unwrap();
        let cover = doc.deprecated_meta("cover");
        assert_eq!(cover.len(), 1);
        assert_eq!(cover[0].value, "cover-image");
        assert_eq!(cover[0].attributes().get("scheme").map(String::as_str), Some("x"));
        assert!(!cover[0].attributes().contains_key("name"));
        assert!(doc.deprecated_meta("price").is_empty());
    }

    #[test]
    fn test_parse_manifest_spine_guide() {
        let doc = PackageDocument::parse(SAMPLE_OPF).unwrap();

        assert_eq!(doc.manifest().len(), 3);
        assert_eq!(
            doc.manifest_item("cover-image").unwrap().media_type,
            "image/jpeg"
        );
        assert_eq!(doc.spine().len(), 2);
        assert_eq!(doc.toc(), Some("toc"));
        assert_eq!(doc.locate_toc_target().unwrap(), "toc.ncx");
        assert_eq!(
            doc.guide_reference("toc").unwrap().title,
            "Table of Contents"
        );
    }

    #[test]
    fn test_parse_missing_metadata_is_malformed() {
        let opf = r#"<package xmlns="http://www.idpf.org/2007/opf"><manifest/></package>"#;
        assert!(matches!(
            PackageDocument::parse(opf),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_parse_wrong_root_is_malformed() {
        assert!(matches!(
            PackageDocument::parse("<ncx><metadata/></ncx>"),
            Err(Error::MalformedDocument(_))
        ));
        assert!(matches!(
            PackageDocument::parse(""),
            Err(Error::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_locate_toc_target_dangling() {
        let mut doc = PackageDocument::new();
        doc.set_toc("ncx");
        assert!(matches!(
            doc.locate_toc_target(),
            Err(Error::DanglingReference(id)) if id == "ncx"
        ));
    }

    #[test]
    fn test_dublin_core_attributes_drop_reserved_and_dc_prefix() {
        let mut attrs = BTreeMap::new();
        attrs.insert("name".to_string(), "x".to_string());
        attrs.insert("content".to_string(), "y".to_string());
        attrs.insert("dc:lang".to_string(), "en".to_string());
        let entry = DublinCore::with_attributes("subject", "Fiction", attrs);
        assert_eq!(entry.attributes().len(), 1);
        assert_eq!(entry.attribute("lang"), Some("en"));
    }

    #[test]
    fn test_add_creator_maps_role() {
        let mut doc = PackageDocument::new();
        doc.add_creator("Jane Roe", "editor");
        doc.add_creator("John Doe", "aut");
        let creators = doc.dublin_core("creator");
        assert_eq!(creators[0].attribute("opf:role"), Some("edt"));
        assert_eq!(creators[1].attribute("opf:role"), Some("aut"));
    }

    #[test]
    fn test_manifest_replaces_by_id() {
        let mut doc = PackageDocument::new();
        doc.add_manifest_item("a", "a.html", None).unwrap();
        doc.add_manifest_item("b", "b.html", None).unwrap();
        doc.add_manifest_item("a", "a2.png", None).unwrap();
        assert_eq!(doc.manifest().len(), 2);
        assert_eq!(doc.manifest()[0].href, "a2.png");
        assert_eq!(doc.manifest()[0].media_type, "image/png");
        assert_eq!(doc.remove_manifest_item("a").unwrap().id, "a");
        assert!(doc.remove_manifest_item("a").is_none());
    }

    #[test]
    fn test_manifest_item_without_extension_is_invalid() {
        let mut doc = PackageDocument::new();
        assert!(matches!(
            doc.add_manifest_item("x", "noext", None),
            Err(Error::InvalidInput(_))
        ));
        assert!(doc.manifest().is_empty());
    }

    #[test]
    fn test_spine_editing() {
        let mut doc = PackageDocument::new();
        doc.add_spine_itemref("a");
        doc.add_spine_itemref("b");
        doc.add_spine_itemref("a");
        doc.insert_spine_itemref(1, "c").unwrap();
        let ids: Vec<_> = doc.spine().iter().map(|s| s.idref.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b", "a"]);

        assert!(doc.insert_spine_itemref(9, "z").is_err());
        assert_eq!(doc.remove_spine_itemref("a"), 2);
        assert_eq!(doc.spine().len(), 2);
    }

    #[test]
    fn test_guide_unique_by_type() {
        let mut doc = PackageDocument::new();
        doc.add_guide_reference("cover", "Cover", "cover.html");
        doc.add_guide_reference("cover", "Front Cover", "front.html");
        assert_eq!(doc.guide().len(), 1);
        assert_eq!(doc.guide_reference("cover").unwrap().href, "front.html");
        assert!(doc.remove_guide_reference("cover").is_some());
        assert!(doc.guide().is_empty());
    }

    #[test]
    fn test_serialize_order() {
        let mut doc = PackageDocument::new();
        doc.set_title("T");
        doc.set_language("en");
        doc.set_identifier("id-1");
        doc.add_dublin_core(DublinCore::new("rights", "PD"));
        doc.add_deprecated_meta(DeprecatedMeta::new("cover", "img", BTreeMap::new()));
        for id in ["b", "a", "c"] {
            doc.add_manifest_item(id, format!("{id}.html"), None).unwrap();
        }
        for kind in ["toc", "cover", "text"] {
            doc.add_guide_reference(kind, kind, format!("{kind}.html"));
        }

        let xml = doc.serialize();
        assert!(xml.contains(r#"unique-identifier="bookid""#));

        let title = xml.find("<dc:title>T</dc:title>").unwrap();
        let language = xml.find("<dc:language>en</dc:language>").unwrap();
        let identifier = xml.find(r#"<dc:identifier id="bookid">id-1</dc:identifier>"#).unwrap();
        let rights = xml.find("<dc:rights>PD</dc:rights>").unwrap();
        let meta = xml.find(r#"<meta name="cover" content="img"/>"#).unwrap();
        assert!(title < language && language < identifier && identifier < rights && rights < meta);

        let a = xml.find(r#"<item id="a""#).unwrap();
        let b = xml.find(r#"<item id="b""#).unwrap();
        let c = xml.find(r#"<item id="c""#).unwrap();
        assert!(a < b && b < c);

        let cover = xml.find(r#"type="cover""#).unwrap();
        let text = xml.find(r#"type="text""#).unwrap();
        let toc = xml.find(r#"type="toc""#).unwrap();
        assert!(cover < text && text < toc);
        assert!(xml.contains(r#"<spine toc="toc">"#));
    }

    #[test]
    fn test_round_trip() {
        let doc = PackageDocument::parse(SAMPLE_OPF).unwrap();
        let reparsed = PackageDocument::parse(&doc.serialize()).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn test_serialize_escapes_values() {
        let mut doc = PackageDocument::new();
        doc.set_title("Pride & <Prejudice>");
        let xml = doc.serialize();
        assert!(xml.contains("<dc:title>Pride &amp; &lt;Prejudice&gt;</dc:title>"));
        let reparsed = PackageDocument::parse(&xml).unwrap();
        assert_eq!(reparsed.title(), "Pride & <Prejudice>");
    }

    #[test]
    fn test_dangling_references() {
        let mut doc = PackageDocument::new();
        assert_eq!(doc.dangling_references().len(), 1);

        doc.add_manifest_item("toc", "toc.ncx", None).unwrap();
        doc.add_manifest_item("ch1", "ch1.html", None).unwrap();
        doc.add_spine_itemref("ch1");
        assert!(doc.dangling_references().is_empty());

        doc.add_spine_itemref("missing");
        assert_eq!(
            doc.dangling_references(),
            ["spine itemref 'missing' names no manifest item"]
        );
    }

    #[test]
    fn test_extra_title_stays_out_of_the_title_slot() {
        let mut doc = PackageDocument::new();
        doc.set_title("Main");
        doc.add_dublin_core(DublinCore::new("title", "Subtitle"));
        doc.add_dublin_core(DublinCore::new("language", "fr"));
        doc.add_dublin_core(DublinCore::new("identifier", "isbn").with_attribute("id", "alt"));

        let reparsed = PackageDocument::parse(&doc.serialize()).unwrap();
        assert_eq!(reparsed.title(), "Main");
        assert_eq!(reparsed.language(), "");
        assert_eq!(reparsed.identifier(), "");
        assert_eq!(reparsed.other_dublin_core().len(), 3);
        assert_eq!(reparsed.other_dublin_core()[0].value, "Subtitle");
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn test_parse_keeps_first_title() {
        let opf = r#"<package><metadata>
            <dc:title>First</dc:title>
            <dc:title>Second</dc:title>
        </metadata></package>"#;
        let doc = PackageDocument::parse(opf).unwrap();
        assert_eq!(doc.title(), "First");
        assert_eq!(doc.other_dublin_core()[0].name, "title");
        assert_eq!(doc.other_dublin_core()[0].value, "Second");
    }

    #[test]
    fn test_padded_values_survive_round_trip() {
        let mut doc = PackageDocument::new();
        doc.set_title("  Padded Title ");
        doc.add_dublin_core(DublinCore::new("subject", " x "));
        let reparsed = PackageDocument::parse(&doc.serialize()).unwrap();
        assert_eq!(reparsed.title(), "  Padded Title ");
        assert_eq!(reparsed.dublin_core("subject")[0].value, " x ");
    }

    fn text() -> impl Strategy<Value = String> {
        "[ ]{0,2}[A-Za-z0-9&<>'\"]{0,10}[ ]{0,2}"
    }

    proptest! {
        #[test]
        fn prop_built_document_round_trips(
            title in text(),
            language in text(),
            identifier in text(),
            others in proptest::collection::vec(
                (
                    prop::sample::select(vec!["title", "language", "identifier", "creator", "subject", "rights"]),
                    text(),
                    proptest::option::of("[a-z]{1,6}"),
                ),
                0..6,
            ),
            metas in proptest::collection::vec(("[a-z:]{1,8}", text()), 0..3),
            items in proptest::collection::vec(("[a-z]{1,6}", "[a-z/]{1,8}\\.(html|png|css)"), 0..6),
            spine in proptest::collection::vec("[a-z]{1,6}", 0..6),
            guide in proptest::collection::vec(
                (prop::sample::select(REFERENCE_TYPES.to_vec()), text(), "[a-z]{1,8}\\.html"),
                0..4,
            ),
        ) {
            let mut doc = PackageDocument::new();
            doc.set_title(title);
            doc.set_language(language);
            doc.set_identifier(identifier);
            for (name, value, id) in others {
                let mut entry = DublinCore::new(name, value);
                if let Some(id) = id {
                    entry.set_attribute("id", id);
                }
                doc.add_dublin_core(entry);
            }
            for (name, value) in metas {
                doc.add_deprecated_meta(DeprecatedMeta::new(name, value, BTreeMap::new()));
            }
            for (id, href) in items {
                doc.add_manifest_item(id, href, None).unwrap();
            }
            for idref in spine {
                doc.add_spine_itemref(idref);
            }
            for (kind, title, href) in guide {
                doc.add_guide_reference(kind, title, href);
            }

            let reparsed = PackageDocument::parse(&doc.serialize()).unwrap();
            prop_assert_eq!(&reparsed, &doc);
            prop_assert_eq!(reparsed.title(), doc.title());
            prop_assert_eq!(reparsed.other_dublin_core(), doc.other_dublin_core());
        }
    }
}
