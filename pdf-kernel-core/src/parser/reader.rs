//! High-level PDF Reader API
//!
//! Reads the header and cross-reference data of a file up front and turns
//! everything else into deferred registry slots. Objects are parsed the
//! first time something resolves them.

use super::lexer::find_bytes;
use super::object_stream::ObjectStream;
use super::objects::ObjectParser;
use super::xref::{scan_objects, XRefEntry, XRefTable};
use super::{ParseError, ParseOptions, ParseResult};
use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, DocumentId, Object, ObjectId, Reference};
use crate::registry::{ObjectLoader, ObjectLocation, ObjectRegistry};
use std::cell::{OnceCell, RefCell};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// How far into the file a lenient reader looks for `%PDF-`.
const HEADER_SEARCH_LIMIT: usize = 1024;

/// PDF Reader for reading PDF documents
pub struct PdfReader {
    data: Vec<u8>,
    options: ParseOptions,
    registry: ObjectRegistry,
    version: String,
    xref: XRefTable,
}

impl PdfReader {
    pub fn new(data: Vec<u8>, options: ParseOptions) -> ParseResult<Self> {
        let version = parse_header(&data, options)?;
        // Created first so every reference parsed from now on is bound to it
        let registry = ObjectRegistry::new();
        let xref = XRefTable::read(&data, registry.owner(), options)?;

        if xref.trailer().contains_key("Encrypt") {
            return Err(ParseError::EncryptionNotSupported);
        }

        debug!(
            "opened PDF {} with {} xref entries ({} bytes)",
            version,
            xref.len(),
            data.len()
        );
        Ok(Self {
            data,
            options,
            registry,
            version,
            xref,
        })
    }

    /// Version from the `%PDF-x.y` header.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn trailer(&self) -> &Dictionary {
        self.xref.trailer()
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    /// Hands every object to a new document as a deferred slot.
    pub fn into_document(self) -> Result<Document> {
        let Self {
            data,
            options,
            mut registry,
            mut version,
            xref,
        } = self;
        let owner = registry.owner();

        for (number, entry) in xref.entries() {
            if number == 0 {
                continue;
            }
            match entry {
                XRefEntry::InUse { offset, generation } => registry.insert_deferred(
                    ObjectId::new(number, generation),
                    ObjectLocation::Offset(offset),
                ),
                XRefEntry::Compressed { stream, index } => registry.insert_deferred(
                    ObjectId::new(number, 0),
                    ObjectLocation::InStream { stream, index },
                ),
                XRefEntry::Free { generation, .. } => registry.insert_free(number, generation),
            }
        }

        let trailer = xref.into_trailer();
        if let Some(size) = trailer
            .get_integer("Size")
            .and_then(|size| u32::try_from(size).ok())
        {
            if size > registry.size() {
                registry.insert_free(size - 1, 0);
            }
        }
        registry.rebuild_free_chain();
        registry.set_loader(Box::new(SourceLoader::new(data, owner, options)));

        let root = trailer
            .get_reference("Root")
            .ok_or_else(|| ParseError::MissingKey("Root".to_string()))?;
        if !registry.contains(root.id()) {
            return Err(ParseError::InvalidReference(root.number(), root.generation()).into());
        }

        if let Ok(Object::Dictionary(catalog)) = registry.resolve(root.id()) {
            if let Some(declared) = catalog.get_name("Version").and_then(|name| name.as_str()) {
                if declared > version.as_str() {
                    version = declared.to_string();
                }
            }
        }

        let info = trailer
            .get_reference("Info")
            .filter(|info| registry.contains(info.id()));
        let file_id = trailer
            .get_array("ID")
            .and_then(|id| id.get(0))
            .and_then(Object::as_string)
            .map(|first| first.as_bytes().to_vec());

        Document::from_parts(registry, root, info, version, file_id)
    }
}

fn parse_header(data: &[u8], options: ParseOptions) -> ParseResult<String> {
    let start = if options.strict {
        if !data.starts_with(b"%PDF-") {
            return Err(ParseError::InvalidHeader);
        }
        0
    } else {
        let window = &data[..data.len().min(HEADER_SEARCH_LIMIT)];
        let start = find_bytes(window, b"%PDF-").ok_or(ParseError::InvalidHeader)?;
        if start > 0 {
            warn!("PDF header found at offset {}", start);
        }
        start
    };

    let version: String = data[start + 5..]
        .iter()
        .take_while(|byte| byte.is_ascii_digit() || **byte == b'.')
        .map(|byte| *byte as char)
        .collect();
    if version.is_empty() {
        return Err(ParseError::InvalidHeader);
    }
    Ok(version)
}

/// Parses deferred objects straight out of the source bytes.
struct SourceLoader {
    data: Vec<u8>,
    owner: DocumentId,
    options: ParseOptions,
    object_streams: RefCell<HashMap<u32, ObjectStream>>,
    /// Object headers found by scanning, built on the first bad offset.
    recovered: OnceCell<BTreeMap<u32, (u16, u64)>>,
}

impl SourceLoader {
    fn new(data: Vec<u8>, owner: DocumentId, options: ParseOptions) -> Self {
        Self {
            data,
            owner,
            options,
            object_streams: RefCell::new(HashMap::new()),
            recovered: OnceCell::new(),
        }
    }

    fn parse_at(&self, offset: usize, registry: &ObjectRegistry) -> ParseResult<(ObjectId, Object)> {
        let owner = self.owner;
        let resolve_length = |reference: Reference| -> Option<usize> {
            if reference.owner() != owner {
                return None;
            }
            let length = registry.resolve(reference.id()).ok()?.as_integer()?;
            usize::try_from(length).ok()
        };
        ObjectParser::at(&self.data, offset, self.owner, self.options)
            .with_length_resolver(&resolve_length)
            .parse_indirect_object()
    }

    fn load_at_offset(&self, id: ObjectId, offset: u64, registry: &ObjectRegistry) -> Result<Object> {
        let position = usize::try_from(offset).unwrap_or(usize::MAX);
        match self.parse_at(position, registry) {
            Ok((found, object)) if found == id => return Ok(object),
            Ok((found, _)) if self.options.strict => {
                return Err(ParseError::SyntaxError {
                    position,
                    message: format!("expected object {id}, found {found}"),
                }
                .into())
            }
            Err(error) if self.options.strict => return Err(error.into()),
            Ok((found, _)) => warn!("xref offset of {} leads to object {}", id, found),
            Err(error) => warn!("object {} unreadable at offset {}: {}", id, offset, error),
        }

        let recovered = self.recovered.get_or_init(|| scan_objects(&self.data));
        match recovered.get(&id.number()) {
            Some((generation, found_offset))
                if *generation == id.generation() && *found_offset != offset =>
            {
                let (found, object) = self.parse_at(*found_offset as usize, registry)?;
                if found == id {
                    debug!("object {} recovered at offset {}", id, found_offset);
                    return Ok(object);
                }
                Err(ParseError::InvalidReference(id.number(), id.generation()).into())
            }
            _ => Err(ParseError::InvalidReference(id.number(), id.generation()).into()),
        }
    }

    fn load_from_stream(
        &self,
        id: ObjectId,
        stream: u32,
        index: u32,
        registry: &ObjectRegistry,
    ) -> Result<Object> {
        // The container may itself need loading, so no borrow is held here
        let cached = self.object_streams.borrow().contains_key(&stream);
        if !cached {
            let parsed = match registry.resolve(ObjectId::new(stream, 0))? {
                Object::Stream(container) => ObjectStream::parse(container, self.options)?,
                other => {
                    return Err(PdfError::InvalidStructure(format!(
                        "object {} should be an object stream, found {}",
                        stream,
                        other.type_name()
                    )))
                }
            };
            self.object_streams.borrow_mut().insert(stream, parsed);
        }

        let streams = self.object_streams.borrow();
        let objects = streams.get(&stream).ok_or_else(|| {
            PdfError::InvalidStructure(format!("object stream {stream} is not available"))
        })?;
        let (number, object) = objects.get(index as usize, self.owner, self.options)?;
        if number == id.number() {
            return Ok(object);
        }
        if !self.options.strict {
            if let Some(actual) = objects.find(id.number()) {
                warn!(
                    "object {} is entry {} of stream {}, not {}",
                    id, actual, stream, index
                );
                return Ok(objects.get(actual, self.owner, self.options)?.1);
            }
        }
        Err(ParseError::InvalidReference(id.number(), id.generation()).into())
    }
}

impl ObjectLoader for SourceLoader {
    fn load(
        &self,
        id: ObjectId,
        location: ObjectLocation,
        registry: &ObjectRegistry,
    ) -> Result<Object> {
        match location {
            ObjectLocation::Offset(offset) => self.load_at_offset(id, offset, registry),
            ObjectLocation::InStream { stream, index } => {
                self.load_from_stream(id, stream, index, registry)
            }
        }
    }
}
