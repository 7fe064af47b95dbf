//! The document: an object registry with a catalog, a page tree and the
//! trailer's info dictionary on top.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use tracing::{debug, warn};

use crate::copy::{copy_object, CopyHistory, CopyOptions, ObjectCopier};
use crate::error::{PdfError, Result};
use crate::geometry::Rectangle;
use crate::objects::{
    Array, Dictionary, DocumentId, Name, Object, ObjectId, PdfString, Reference, Stream,
};
use crate::parser::{ParseOptions, PdfReader};
use crate::registry::ObjectRegistry;
use crate::resources::{ResourceCategory, ResourceDictionary};
use crate::writer::{PdfWriter, WriterConfig};

/// Page attributes a page may take from an ancestor in the page tree.
const INHERITABLE_PAGE_KEYS: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// A copied page: in its claimed target slot, or a repeat still to register.
enum PageCopy {
    Placed(Reference),
    Repeat(Object),
}

/// Page keys that tie a page to the rest of its source document. Annotations
/// are copied in a separate pass once every page has its target slot.
const PAGE_COPY_EXCLUDED_KEYS: [&str; 4] = ["Parent", "Annots", "StructParents", "B"];

/// Document information written as the trailer's `/Info` dictionary.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    /// Software that created the original content
    pub creator: Option<String>,
    /// Software that produced the PDF
    pub producer: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
    pub modification_date: Option<DateTime<Utc>>,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            title: None,
            author: None,
            subject: None,
            keywords: None,
            creator: Some("pdf_kernel".to_string()),
            producer: Some(format!("pdf_kernel v{}", crate::VERSION)),
            creation_date: Some(now),
            modification_date: Some(now),
        }
    }
}

impl DocumentInfo {
    /// Info with every field unset.
    pub fn empty() -> Self {
        Self {
            title: None,
            author: None,
            subject: None,
            keywords: None,
            creator: None,
            producer: None,
            creation_date: None,
            modification_date: None,
        }
    }

    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new();
        self.apply_to(&mut dict);
        dict
    }

    /// Reads the standard entries; unknown keys and unparsable dates are ignored.
    pub fn from_dictionary(dict: &Dictionary) -> Self {
        let text = |key: &str| dict.get(key).and_then(Object::as_string).map(PdfString::to_text);
        let date = |key: &str| text(key).as_deref().and_then(parse_pdf_date);
        Self {
            title: text("Title"),
            author: text("Author"),
            subject: text("Subject"),
            keywords: text("Keywords"),
            creator: text("Creator"),
            producer: text("Producer"),
            creation_date: date("CreationDate"),
            modification_date: date("ModDate"),
        }
    }

    /// Writes the set fields into `dict`, leaving other entries alone.
    fn apply_to(&self, dict: &mut Dictionary) {
        let texts = [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Subject", &self.subject),
            ("Keywords", &self.keywords),
            ("Creator", &self.creator),
            ("Producer", &self.producer),
        ];
        for (key, value) in texts {
            if let Some(value) = value {
                dict.set(key, PdfString::from_text(value));
            }
        }
        if let Some(date) = self.creation_date {
            dict.set("CreationDate", PdfString::new(format_pdf_date(date)));
        }
        if let Some(date) = self.modification_date {
            dict.set("ModDate", PdfString::new(format_pdf_date(date)));
        }
    }
}

/// A PDF document held as an object graph.
///
/// Every indirect object lives in the document's [`ObjectRegistry`]. Objects
/// read from a file stay deferred until first resolved.
///
/// # Example
///
/// ```rust
/// use pdf_kernel::{Document, ExtGState, Rectangle};
///
/// let mut doc = Document::new();
/// let page = doc.add_new_page(Rectangle::a4()).unwrap();
/// let gs = doc.register(ExtGState::new().with_alpha(0.5)).unwrap();
///
/// let first = doc.add_ext_gstate(&page, gs).unwrap();
/// let again = doc.add_ext_gstate(&page, gs).unwrap();
/// assert_eq!(first, again);
/// assert_eq!(first.as_str(), Some("Gs1"));
/// ```
pub struct Document {
    registry: ObjectRegistry,
    catalog: Reference,
    info: Option<Reference>,
    metadata: DocumentInfo,
    version: String,
    /// First element of the trailer `/ID` read from the source file
    file_id: Option<Vec<u8>>,
    copy_history: CopyHistory,
}

impl Document {
    /// Creates a document with an empty page tree.
    pub fn new() -> Self {
        let mut registry = ObjectRegistry::new();
        let catalog = Self::bootstrap(&mut registry);
        Self {
            registry,
            catalog,
            info: None,
            metadata: DocumentInfo::default(),
            version: "1.7".to_string(),
            file_id: None,
            copy_history: CopyHistory::new(),
        }
    }

    /// Pages root at 1 0 R, catalog at 2 0 R.
    fn bootstrap(registry: &mut ObjectRegistry) -> Reference {
        let pages_id = ObjectId::new(1, 0);
        let catalog_id = ObjectId::new(2, 0);

        let mut pages = Dictionary::new();
        pages.set("Type", Name::from("Pages"));
        pages.set("Kids", Array::new());
        pages.set("Count", 0);
        registry.insert_loaded(pages_id, Object::Dictionary(pages));
        let pages = registry.reference(pages_id);

        let mut catalog = Dictionary::new();
        catalog.set("Type", Name::from("Catalog"));
        catalog.set("Pages", pages);
        registry.insert_loaded(catalog_id, Object::Dictionary(catalog));
        registry.reference(catalog_id)
    }

    /// Opens and indexes a PDF file. Object bodies are parsed on first use.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ParseOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: ParseOptions) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::from_bytes(data, options)
    }

    /// Indexes a PDF held in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>, options: ParseOptions) -> Result<Self> {
        PdfReader::new(data.into(), options)?.into_document()
    }

    /// Assembles a document around a registry filled by the reader.
    pub(crate) fn from_parts(
        registry: ObjectRegistry,
        catalog: Reference,
        info: Option<Reference>,
        version: String,
        file_id: Option<Vec<u8>>,
    ) -> Result<Self> {
        let metadata = match info.map(|reference| registry.resolve_reference(&reference)) {
            Some(Ok(Object::Dictionary(dict))) => DocumentInfo::from_dictionary(dict),
            Some(Ok(other)) => {
                warn!("/Info is a {}, ignoring it", other.type_name());
                DocumentInfo::empty()
            }
            Some(Err(error)) => {
                warn!("/Info could not be read: {}", error);
                DocumentInfo::empty()
            }
            None => DocumentInfo::empty(),
        };
        Ok(Self {
            registry,
            catalog,
            info,
            metadata,
            version,
            file_id,
            copy_history: CopyHistory::new(),
        })
    }

    pub fn id(&self) -> DocumentId {
        self.registry.owner()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn catalog(&self) -> Reference {
        self.catalog
    }

    /// The `/Info` object, once the document has been read or saved.
    pub fn info_reference(&self) -> Option<Reference> {
        self.info
    }

    pub(crate) fn file_id(&self) -> Option<&[u8]> {
        self.file_id.as_deref()
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.registry
    }

    /// Makes `value` indirect in this document.
    pub fn register(&mut self, value: impl Into<Object>) -> Result<Reference> {
        self.registry.register(value.into())
    }

    pub fn resolve(&self, reference: &Reference) -> Result<&Object> {
        self.registry.resolve_reference(reference)
    }

    pub fn resolve_mut(&mut self, reference: &Reference) -> Result<&mut Object> {
        self.registry.check_owner(reference)?;
        self.registry.resolve_mut(reference.id())
    }

    /// Frees an indirect object. The catalog and the page tree root cannot be freed.
    pub fn free(&mut self, reference: &Reference) -> Result<()> {
        self.registry.check_owner(reference)?;
        if *reference == self.catalog {
            return Err(PdfError::InvalidStructure(
                "the catalog cannot be freed".to_string(),
            ));
        }
        if *reference == self.pages_root()? {
            return Err(PdfError::InvalidStructure(
                "the page tree root cannot be freed".to_string(),
            ));
        }
        if Some(*reference) == self.info {
            self.info = None;
        }
        self.registry.free(reference.id())
    }

    // Info dictionary

    pub fn info(&self) -> &DocumentInfo {
        &self.metadata
    }

    pub fn set_info(&mut self, info: DocumentInfo) {
        self.metadata = info;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.metadata.title = Some(title.into());
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.metadata.author = Some(author.into());
    }

    pub fn set_subject(&mut self, subject: impl Into<String>) {
        self.metadata.subject = Some(subject.into());
    }

    pub fn set_keywords(&mut self, keywords: impl Into<String>) {
        self.metadata.keywords = Some(keywords.into());
    }

    pub fn set_creator(&mut self, creator: impl Into<String>) {
        self.metadata.creator = Some(creator.into());
    }

    pub fn set_producer(&mut self, producer: impl Into<String>) {
        self.metadata.producer = Some(producer.into());
    }

    pub fn set_creation_date(&mut self, date: DateTime<Utc>) {
        self.metadata.creation_date = Some(date);
    }

    pub fn set_modification_date(&mut self, date: DateTime<Utc>) {
        self.metadata.modification_date = Some(date);
    }

    /// Sets the modification date to the current time.
    pub fn update_modification_date(&mut self) {
        self.metadata.modification_date = Some(Utc::now());
    }

    /// Stores the current info into the `/Info` object, registering one if
    /// the document has none yet. Custom keys already present are kept.
    fn sync_info(&mut self) -> Result<()> {
        let existing = self.info.filter(|reference| self.registry.contains(reference.id()));
        match existing {
            Some(reference) => {
                let object = self.registry.resolve_mut(reference.id())?;
                if let Some(dict) = object.as_dict_mut() {
                    self.metadata.apply_to(dict);
                } else {
                    *object = Object::Dictionary(self.metadata.to_dictionary());
                }
            }
            None => {
                let reference = self
                    .registry
                    .register(Object::Dictionary(self.metadata.to_dictionary()))?;
                self.info = Some(reference);
            }
        }
        Ok(())
    }

    // Page tree

    /// Root node of the page tree.
    pub fn pages_root(&self) -> Result<Reference> {
        self.dict_of(&self.catalog)?
            .get_reference("Pages")
            .ok_or_else(|| {
                PdfError::InvalidStructure("catalog has no /Pages reference".to_string())
            })
    }

    /// Leaf pages in document order.
    pub fn pages(&self) -> Result<Vec<Reference>> {
        let root = self.pages_root()?;
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            if !visited.insert(node.id()) {
                return Err(PdfError::InvalidStructure(format!(
                    "page tree visits {node} twice"
                )));
            }
            let dict = self.dict_of(&node)?;
            if is_pages_node(dict) {
                if let Some(kids) = dict.get_array("Kids") {
                    stack.extend(kids.iter().rev().filter_map(Object::as_reference));
                }
            } else {
                pages.push(node);
            }
        }
        Ok(pages)
    }

    pub fn page_count(&self) -> Result<usize> {
        Ok(self.pages()?.len())
    }

    /// Page at zero-based `index`.
    pub fn page(&self, index: usize) -> Result<Reference> {
        self.pages()?
            .get(index)
            .copied()
            .ok_or(PdfError::InvalidPageNumber(index))
    }

    /// Appends an empty page with the given media box.
    pub fn add_new_page(&mut self, media_box: Rectangle) -> Result<Reference> {
        let root = self.pages_root()?;
        let mut page = Dictionary::new();
        page.set("Type", Name::from("Page"));
        page.set("Parent", root);
        page.set("MediaBox", media_box);
        page.set("Resources", Dictionary::new());

        let page = self.registry.register(Object::Dictionary(page))?;
        self.append_kid(root, page)?;
        debug!("added page {} under {}", page, root);
        Ok(page)
    }

    /// Registers `content` as a content stream and appends it to the page's
    /// `/Contents`.
    pub fn add_page_content(&mut self, page: &Reference, content: Vec<u8>) -> Result<Reference> {
        self.dict_of(page)?;
        let stream = self.registry.register(Object::Stream(Stream::new(content)))?;
        let dict = self.dict_of_mut(page)?;
        let contents = match dict.remove("Contents") {
            None | Some(Object::Null) => Object::Reference(stream),
            Some(Object::Array(mut array)) => {
                array.push(stream);
                Object::Array(array)
            }
            Some(existing) => Object::Array(vec![existing, Object::Reference(stream)].into()),
        };
        dict.set("Contents", contents);
        Ok(stream)
    }

    /// Looks `key` up on the page, then on its ancestors.
    pub fn inherited_attribute(&self, page: &Reference, key: &str) -> Result<Option<Object>> {
        let mut current = *page;
        let mut visited = HashSet::new();
        loop {
            if !visited.insert(current.id()) {
                return Err(PdfError::InvalidStructure(format!(
                    "/Parent chain of {page} loops at {current}"
                )));
            }
            let dict = self.dict_of(&current)?;
            if let Some(value) = dict.get(key) {
                return Ok(Some(value.clone()));
            }
            match dict.get_reference("Parent") {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }

    pub fn page_media_box(&self, page: &Reference) -> Result<Option<Rectangle>> {
        let Some(value) = self.inherited_attribute(page, "MediaBox")? else {
            return Ok(None);
        };
        Ok(self
            .registry
            .resolve_deep(&value)?
            .as_array()
            .and_then(Rectangle::from_array))
    }

    fn append_kid(&mut self, parent: Reference, kid: Reference) -> Result<()> {
        let node = self.dict_of_mut(&parent)?;
        if !matches!(node.get("Kids"), Some(Object::Array(_))) {
            node.set("Kids", Array::new());
        }
        if let Some(Object::Array(kids)) = node.get_mut("Kids") {
            kids.push(kid);
        }
        let count = node.get_integer("Count").unwrap_or(0);
        node.set("Count", count + 1);
        Ok(())
    }

    /// The page dictionary with inherited attributes copied in.
    fn flattened_page(&self, page: &Reference) -> Result<Dictionary> {
        let mut dict = self.dict_of(page)?.clone();
        for key in INHERITABLE_PAGE_KEYS {
            if dict.contains_key(key) {
                continue;
            }
            if let Some(value) = self.inherited_attribute(page, key)? {
                dict.set(key, value);
            }
        }
        Ok(dict)
    }

    // Resources

    /// The resources in effect for `page`, inherited ones included.
    pub fn page_resources(&self, page: &Reference) -> Result<ResourceDictionary> {
        let Some(value) = self.inherited_attribute(page, "Resources")? else {
            return Ok(ResourceDictionary::new());
        };
        let dict = self.registry.resolve_deep(&value)?.as_dict().ok_or_else(|| {
            PdfError::InvalidStructure(format!("/Resources of {page} is not a dictionary"))
        })?;
        ResourceDictionary::load(dict, &self.registry)
    }

    /// Stores `resources` for `page`. An indirect `/Resources` object on the
    /// page itself is replaced in place; otherwise the page gets its own
    /// direct dictionary and inherited resources are left untouched.
    pub fn set_page_resources(
        &mut self,
        page: &Reference,
        resources: &ResourceDictionary,
    ) -> Result<()> {
        let dictionary = resources.as_dictionary().clone();
        let own = match self.dict_of(page)?.get("Resources") {
            Some(Object::Reference(own)) => Some(*own),
            _ => None,
        };
        match own {
            Some(own) => {
                self.registry.check_owner(&own)?;
                self.registry.replace(own.id(), Object::Dictionary(dictionary))?;
            }
            None => self.dict_of_mut(page)?.set("Resources", dictionary),
        }
        Ok(())
    }

    /// Adds `object` to the page's resources under `category` and returns
    /// its name. Re-adding the same indirect object returns the same name.
    pub fn add_resource(
        &mut self,
        page: &Reference,
        category: ResourceCategory,
        object: impl Into<Object>,
    ) -> Result<Name> {
        let mut resources = self.page_resources(page)?;
        let name = resources.add_resource(&mut self.registry, category, object.into())?;
        self.set_page_resources(page, &resources)?;
        Ok(name)
    }

    pub fn add_ext_gstate(&mut self, page: &Reference, ext_gstate: impl Into<Object>) -> Result<Name> {
        self.add_resource(page, ResourceCategory::ExtGState, ext_gstate)
    }

    // Copying between documents

    /// Copies `root`, which must belong to this document, into `target`.
    pub fn copy_to(
        &self,
        root: &Object,
        target: &mut Document,
        options: &CopyOptions,
    ) -> Result<Object> {
        copy_object(
            &self.registry,
            root,
            &mut target.registry,
            &mut target.copy_history,
            options,
        )
    }

    /// Appends copies of the `source` pages at `indices` to this document.
    ///
    /// Inherited attributes are materialized on each copy and objects shared
    /// between the copied pages stay shared. Annotations are copied after
    /// every page is in place; references to pages or page tree nodes that
    /// are not part of the copy become `null`. Every page is validated
    /// before anything is written, so a dangling reference leaves this
    /// document unchanged.
    pub fn copy_pages_from(&mut self, source: &Document, indices: &[usize]) -> Result<Vec<Reference>> {
        let source_pages = source.pages()?;
        let mut prepared = Vec::with_capacity(indices.len());
        for &index in indices {
            let page = *source_pages
                .get(index)
                .ok_or(PdfError::InvalidPageNumber(index))?;
            let value = source.flattened_page(&page)?;
            let annotations = value.get("Annots").cloned();
            prepared.push((page, Object::Dictionary(value), annotations));
        }
        let tree_nodes = source.page_tree_nodes(&source_pages);

        let root = self.pages_root()?;
        let excluded = PAGE_COPY_EXCLUDED_KEYS.map(Name::from);
        let (copied, annotations) = {
            let mut copier = ObjectCopier::new(
                &source.registry,
                &mut self.registry,
                &mut self.copy_history,
                true,
            );
            for node in &tree_nodes {
                copier.detach(*node);
            }
            for (page, value, annotations) in &prepared {
                copier.check_copy_as(*page, value, &excluded)?;
                if let Some(annotations) = annotations {
                    copier.check(annotations, &[])?;
                }
            }

            // Claim every page first so links between copied pages land on
            // the copies
            for (page, value, _) in &prepared {
                copier.claim(*page, value)?;
            }
            let mut seen = HashSet::new();
            let mut copied = Vec::with_capacity(prepared.len());
            for (page, value, _) in &prepared {
                if seen.insert(*page) {
                    copied.push(PageCopy::Placed(copier.copy_as(*page, value, &excluded)?));
                } else {
                    // A page listed twice gets a second, annotation-free copy
                    copied.push(PageCopy::Repeat(copier.copy(value, &excluded)?));
                }
            }
            let mut annotations = Vec::new();
            for ((_, _, source_annotations), page) in prepared.iter().zip(&copied) {
                if let (Some(source_annotations), PageCopy::Placed(page)) = (source_annotations, page) {
                    annotations.push((*page, copier.copy(source_annotations, &[])?));
                }
            }
            (copied, annotations)
        };

        let copied = copied
            .into_iter()
            .map(|page| match page {
                PageCopy::Placed(page) => Ok(page),
                PageCopy::Repeat(value) => self.registry.register(value),
            })
            .collect::<Result<Vec<_>>>()?;
        for page in &copied {
            self.dict_of_mut(page)?.set("Parent", root);
            self.append_kid(root, *page)?;
        }
        for (page, annotations) in annotations {
            self.dict_of_mut(&page)?.set("Annots", annotations);
        }
        debug!(
            "copied {} pages from document {} into {}",
            copied.len(),
            source.id(),
            self.id()
        );
        Ok(copied)
    }

    /// The pages in `pages` together with every page tree node above them.
    fn page_tree_nodes(&self, pages: &[Reference]) -> HashSet<Reference> {
        let mut nodes = HashSet::new();
        for page in pages {
            let mut current = *page;
            while nodes.insert(current) {
                let parent = self
                    .registry
                    .resolve_reference(&current)
                    .ok()
                    .and_then(Object::as_dict)
                    .and_then(|dict| dict.get_reference("Parent"));
                match parent {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
        nodes
    }

    /// Appends copies of every page of `source`.
    pub fn append_document(&mut self, source: &Document) -> Result<Vec<Reference>> {
        let indices: Vec<usize> = (0..source.page_count()?).collect();
        self.copy_pages_from(source, &indices)
    }

    // Saving

    /// Saves the document to a file, updating the modification date.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.save_with_config(path, WriterConfig::default())
    }

    pub fn save_with_config(&mut self, path: impl AsRef<Path>, config: WriterConfig) -> Result<()> {
        let file = BufWriter::new(File::create(path.as_ref())?);
        self.write_to_with_config(file, config)
    }

    pub fn write_to<W: Write>(&mut self, writer: W) -> Result<()> {
        self.write_to_with_config(writer, WriterConfig::default())
    }

    pub fn write_to_with_config<W: Write>(&mut self, writer: W, config: WriterConfig) -> Result<()> {
        self.update_modification_date();
        if config.write_info {
            self.sync_info()?;
        }
        PdfWriter::with_config(writer, config).write_document(self)
    }

    /// Serializes the document into a byte vector.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.write_to(&mut buffer)?;
        Ok(buffer)
    }

    fn dict_of(&self, reference: &Reference) -> Result<&Dictionary> {
        self.registry
            .resolve_reference(reference)?
            .as_dict()
            .ok_or_else(|| PdfError::InvalidStructure(format!("{reference} is not a dictionary")))
    }

    fn dict_of_mut(&mut self, reference: &Reference) -> Result<&mut Dictionary> {
        self.registry.check_owner(reference)?;
        self.registry
            .resolve_mut(reference.id())?
            .as_dict_mut()
            .ok_or_else(|| PdfError::InvalidStructure(format!("{reference} is not a dictionary")))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id())
            .field("version", &self.version)
            .field("catalog", &self.catalog)
            .field("objects", &self.registry.len())
            .finish()
    }
}

fn is_pages_node(dict: &Dictionary) -> bool {
    dict.has_type("Pages") || (!dict.has_type("Page") && dict.contains_key("Kids"))
}

/// `D:YYYYMMDDHHmmSS+00'00`
fn format_pdf_date(date: DateTime<Utc>) -> String {
    format!("{}+00'00", date.format("D:%Y%m%d%H%M%S"))
}

/// Parses a PDF date string. Only the year is mandatory; missing fields
/// default to their earliest value and a missing offset means UTC.
fn parse_pdf_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    let text = text.strip_prefix("D:").unwrap_or(text);
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() < 4 {
        return None;
    }
    let field = |start: usize, default: u32| -> Option<u32> {
        match digits.get(start..start + 2) {
            Some(value) => value.parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = digits[..4].parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, field(4, 1)?, field(6, 1)?)?.and_hms_opt(
        field(8, 0)?,
        field(10, 0)?,
        field(12, 0)?,
    )?;

    let rest = &text[digits.len()..];
    let offset_seconds = match rest.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let offset_digits: String = rest[1..]
                .chars()
                .filter(char::is_ascii_digit)
                .take(4)
                .collect();
            let hours: i32 = offset_digits.get(..2)?.parse().ok()?;
            let minutes: i32 = offset_digits.get(2..4).unwrap_or("0").parse().ok()?;
            let seconds = hours * 3600 + minutes * 60;
            if sign == '-' {
                -seconds
            } else {
                seconds
            }
        }
        _ => 0,
    };
    let offset = FixedOffset::east_opt(offset_seconds)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|date| date.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::ExtGState;

    fn gs(alpha: f64) -> Object {
        ExtGState::new().with_alpha(alpha).into()
    }

    #[test]
    fn test_new_document_structure() {
        let doc = Document::new();
        let catalog = doc.resolve(&doc.catalog()).unwrap().as_dict().unwrap();
        assert!(catalog.has_type("Catalog"));
        let root = doc.pages_root().unwrap();
        assert!(doc.resolve(&root).unwrap().as_dict().unwrap().has_type("Pages"));
        assert_eq!(doc.page_count().unwrap(), 0);
        assert_eq!(doc.version(), "1.7");
        assert!(doc.info_reference().is_none());
    }

    #[test]
    fn test_add_pages_updates_tree() {
        let mut doc = Document::new();
        let first = doc.add_new_page(Rectangle::a4()).unwrap();
        let second = doc.add_new_page(Rectangle::letter()).unwrap();

        assert_eq!(doc.pages().unwrap(), vec![first, second]);
        assert_eq!(doc.page(1).unwrap(), second);
        let root = doc.pages_root().unwrap();
        let root_dict = doc.resolve(&root).unwrap().as_dict().unwrap();
        assert_eq!(root_dict.get_integer("Count"), Some(2));
        assert_eq!(
            doc.page_media_box(&second).unwrap(),
            Some(Rectangle::letter())
        );
    }

    #[test]
    fn test_page_out_of_range() {
        let mut doc = Document::new();
        doc.add_new_page(Rectangle::a4()).unwrap();
        assert!(matches!(doc.page(3), Err(PdfError::InvalidPageNumber(3))));
    }

    #[test]
    fn test_nested_page_tree_order() {
        let mut doc = Document::new();
        let root = doc.pages_root().unwrap();
        let leaf = |doc: &mut Document, parent: Reference| {
            let mut page = Dictionary::new();
            page.set("Type", Name::from("Page"));
            page.set("Parent", parent);
            doc.register(page).unwrap()
        };

        let mut middle = Dictionary::new();
        middle.set("Type", Name::from("Pages"));
        middle.set("Parent", root);
        let middle = doc.register(middle).unwrap();
        let a = leaf(&mut doc, middle);
        let b = leaf(&mut doc, middle);
        let c = leaf(&mut doc, root);
        doc.resolve_mut(&middle)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Kids", vec![Object::from(a), Object::from(b)]);
        doc.resolve_mut(&root)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Kids", vec![Object::from(middle), Object::from(c)]);

        assert_eq!(doc.pages().unwrap(), vec![a, b, c]);
    }

    #[test]
    fn test_page_tree_loop_is_an_error() {
        let mut doc = Document::new();
        let root = doc.pages_root().unwrap();
        doc.resolve_mut(&root)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Kids", vec![Object::from(root)]);
        assert!(matches!(doc.pages(), Err(PdfError::InvalidStructure(_))));
    }

    #[test]
    fn test_free_protects_catalog_and_root() {
        let mut doc = Document::new();
        let catalog = doc.catalog();
        let root = doc.pages_root().unwrap();
        assert!(doc.free(&catalog).is_err());
        assert!(doc.free(&root).is_err());

        let extra = doc.register(Object::Integer(1)).unwrap();
        doc.free(&extra).unwrap();
        assert!(matches!(
            doc.resolve(&extra),
            Err(PdfError::DanglingReference(_))
        ));
    }

    #[test]
    fn test_inherited_attributes() {
        let mut doc = Document::new();
        let page = doc.add_new_page(Rectangle::a4()).unwrap();
        let root = doc.pages_root().unwrap();
        doc.resolve_mut(&root)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Rotate", 90);

        assert_eq!(
            doc.inherited_attribute(&page, "Rotate").unwrap(),
            Some(Object::Integer(90))
        );
        assert_eq!(doc.inherited_attribute(&page, "CropBox").unwrap(), None);
    }

    #[test]
    fn test_add_ext_gstate_names() {
        let mut doc = Document::new();
        let page = doc.add_new_page(Rectangle::a4()).unwrap();
        let first = doc.register(gs(0.3)).unwrap();
        let second = doc.register(gs(0.6)).unwrap();

        assert_eq!(doc.add_ext_gstate(&page, first).unwrap(), "Gs1");
        assert_eq!(doc.add_ext_gstate(&page, second).unwrap(), "Gs2");
        assert_eq!(doc.add_ext_gstate(&page, first).unwrap(), "Gs1");
        // a direct value is registered and named afresh
        assert_eq!(doc.add_ext_gstate(&page, gs(0.3)).unwrap(), "Gs3");

        let names = doc.page_resources(&page).unwrap().resource_names();
        assert_eq!(names, vec![Name::from("Gs1"), Name::from("Gs2"), Name::from("Gs3")]);
    }

    #[test]
    fn test_indirect_resources_are_updated_in_place() {
        let mut doc = Document::new();
        let page = doc.add_new_page(Rectangle::a4()).unwrap();
        let shared = doc.register(Dictionary::new()).unwrap();
        doc.resolve_mut(&page)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Resources", shared);

        let font = doc.register(Dictionary::new()).unwrap();
        assert_eq!(
            doc.add_resource(&page, ResourceCategory::Font, font).unwrap(),
            "F1"
        );
        let stored = doc.resolve(&shared).unwrap().as_dict().unwrap();
        assert_eq!(
            stored.get_dict("Font").unwrap().get_reference("F1"),
            Some(font)
        );
    }

    #[test]
    fn test_inherited_resources_are_not_touched() {
        let mut doc = Document::new();
        let page = doc.add_new_page(Rectangle::a4()).unwrap();
        let root = doc.pages_root().unwrap();
        let inherited = doc.register(gs(0.5)).unwrap();
        let mut resources = Dictionary::new();
        let mut ext = Dictionary::new();
        ext.set("Gs1", inherited);
        resources.set("ExtGState", ext);
        doc.resolve_mut(&root)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Resources", resources.clone());
        doc.resolve_mut(&page).unwrap().as_dict_mut().unwrap().remove("Resources");

        assert_eq!(doc.add_ext_gstate(&page, gs(0.7)).unwrap(), "Gs2");
        let root_dict = doc.resolve(&root).unwrap().as_dict().unwrap();
        assert_eq!(root_dict.get_dict("Resources"), Some(&resources));
        let names = doc.page_resources(&page).unwrap().resource_names();
        assert_eq!(names, vec![Name::from("Gs1"), Name::from("Gs2")]);
    }

    #[test]
    fn test_add_page_content() {
        let mut doc = Document::new();
        let page = doc.add_new_page(Rectangle::a4()).unwrap();
        let first = doc.add_page_content(&page, b"q Q".to_vec()).unwrap();
        assert_eq!(
            doc.resolve(&page).unwrap().as_dict().unwrap().get_reference("Contents"),
            Some(first)
        );
        let second = doc.add_page_content(&page, b"0 g".to_vec()).unwrap();
        let contents = doc
            .resolve(&page)
            .unwrap()
            .as_dict()
            .unwrap()
            .get_array("Contents")
            .unwrap()
            .clone();
        assert_eq!(
            contents.as_slice(),
            &[Object::from(first), Object::from(second)]
        );
    }

    #[test]
    fn test_copy_pages_between_documents() {
        let mut source = Document::new();
        let root = source.pages_root().unwrap();
        let first = source.add_new_page(Rectangle::a4()).unwrap();
        let second = source.add_new_page(Rectangle::a4()).unwrap();
        let shared = source.register(gs(0.5)).unwrap();
        source.add_ext_gstate(&first, shared).unwrap();
        source.add_ext_gstate(&second, shared).unwrap();
        source
            .resolve_mut(&root)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("Rotate", 180);

        let mut target = Document::new();
        let copied = target.copy_pages_from(&source, &[0, 1]).unwrap();
        assert_eq!(copied.len(), 2);
        assert_eq!(target.pages().unwrap(), copied);

        let target_root = target.pages_root().unwrap();
        for page in &copied {
            let dict = target.resolve(page).unwrap().as_dict().unwrap();
            assert_eq!(dict.get_reference("Parent"), Some(target_root));
            assert_eq!(dict.get_integer("Rotate"), Some(180));
        }
        let gs_of = |page: &Reference| {
            target
                .page_resources(page)
                .unwrap()
                .get_reference(ResourceCategory::ExtGState, "Gs1")
                .unwrap()
        };
        assert_eq!(gs_of(&copied[0]), gs_of(&copied[1]));
        assert_eq!(gs_of(&copied[0]).owner(), target.id());
    }

    #[test]
    fn test_copy_pages_rejects_dangling_without_changes() {
        let mut source = Document::new();
        source.add_new_page(Rectangle::a4()).unwrap();
        let bad = source.add_new_page(Rectangle::a4()).unwrap();
        let doomed = source.register(gs(0.1)).unwrap();
        source.add_ext_gstate(&bad, doomed).unwrap();
        source.free(&doomed).unwrap();

        let mut target = Document::new();
        let before = target.registry().len();
        let result = target.copy_pages_from(&source, &[0, 1]);
        assert!(matches!(result, Err(PdfError::DanglingReference(_))));
        assert_eq!(target.registry().len(), before);
        assert_eq!(target.page_count().unwrap(), 0);
    }

    #[test]
    fn test_copy_to_reuses_history() {
        let mut source = Document::new();
        let shared = source.register(gs(0.4)).unwrap();
        let mut target = Document::new();

        let options = CopyOptions::new();
        let first = source.copy_to(&shared.into(), &mut target, &options).unwrap();
        let second = source.copy_to(&shared.into(), &mut target, &options).unwrap();
        assert_eq!(first, second);

        let options = CopyOptions::new().allow_duplicating(true);
        let third = source.copy_to(&shared.into(), &mut target, &options).unwrap();
        assert_ne!(first, third);
    }

    #[test]
    fn test_info_defaults_and_setters() {
        let mut doc = Document::new();
        assert_eq!(doc.info().creator.as_deref(), Some("pdf_kernel"));
        assert!(doc.info().creation_date.is_some());

        doc.set_title("Quarterly report");
        doc.set_author("Finance");
        assert_eq!(doc.info().title.as_deref(), Some("Quarterly report"));
        assert_eq!(doc.info().author.as_deref(), Some("Finance"));
    }

    #[test]
    fn test_sync_info_keeps_custom_keys() {
        let mut doc = Document::new();
        let mut info = Dictionary::new();
        info.set("Department", PdfString::from("Ops"));
        let info_ref = doc.register(info).unwrap();
        doc.info = Some(info_ref);
        doc.set_title("Runbook");
        doc.sync_info().unwrap();

        let stored = doc.resolve(&info_ref).unwrap().as_dict().unwrap();
        assert!(stored.contains_key("Department"));
        assert_eq!(
            stored.get("Title").and_then(Object::as_string).map(PdfString::to_text),
            Some("Runbook".to_string())
        );
    }

    #[test]
    fn test_info_dictionary_roundtrip() {
        use chrono::TimeZone;
        let date = Utc.with_ymd_and_hms(2023, 6, 15, 18, 30, 0).unwrap();
        let info = DocumentInfo {
            title: Some("Título".to_string()),
            creation_date: Some(date),
            ..DocumentInfo::empty()
        };
        let dict = info.to_dictionary();
        assert_eq!(DocumentInfo::from_dictionary(&dict), info);
    }

    #[test]
    fn test_pdf_date_format_and_parse() {
        use chrono::TimeZone;
        let date = Utc.with_ymd_and_hms(2024, 2, 29, 7, 5, 9).unwrap();
        assert_eq!(format_pdf_date(date), "D:20240229070509+00'00");
        assert_eq!(parse_pdf_date("D:20240229070509+00'00"), Some(date));
        assert_eq!(parse_pdf_date("D:20240229090509+02'00"), Some(date));
        assert_eq!(parse_pdf_date("D:20240229020509-05'00"), Some(date));
        assert_eq!(
            parse_pdf_date("D:2024"),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_pdf_date("yesterday"), None);
        assert_eq!(parse_pdf_date("D:20241399"), None);
    }

    #[test]
    fn test_foreign_reference_is_rejected() {
        let mut doc = Document::new();
        let mut other = Document::new();
        let theirs = other.register(Object::Integer(5)).unwrap();
        assert!(matches!(
            doc.resolve_mut(&theirs),
            Err(PdfError::ForeignObject { .. })
        ));
        assert!(matches!(doc.free(&theirs), Err(PdfError::ForeignObject { .. })));
    }
}
