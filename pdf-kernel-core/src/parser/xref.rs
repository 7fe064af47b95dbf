//! Cross-reference table reader
//!
//! Locates every indirect object of a file. Handles classic `xref` tables,
//! cross-reference streams (PDF 1.5), hybrid files carrying `/XRefStm`, and
//! chains of incremental updates linked through `/Prev`. When the table is
//! unusable and the options allow it, the file is scanned for `N G obj`
//! headers instead.

use super::lexer::{is_delimiter, is_whitespace, rfind_bytes, Lexer, Token};
use super::object_stream::ObjectStream;
use super::objects::ObjectParser;
use super::{ParseError, ParseOptions, ParseResult};
use crate::objects::{Dictionary, DocumentId, Object, ObjectId, Reference};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// One row of the cross-reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Unused number; `generation` is what the next occupant gets.
    Free { next: u32, generation: u16 },
    /// Object stored at a byte offset of the file.
    InUse { offset: u64, generation: u16 },
    /// Object stored as entry `index` of object stream `stream`.
    Compressed { stream: u32, index: u32 },
}

/// Merged view of every cross-reference section of a file.
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dictionary,
}

impl XRefTable {
    /// Reads the table that `startxref` points at, following `/Prev` links.
    pub fn read(data: &[u8], owner: DocumentId, options: ParseOptions) -> ParseResult<Self> {
        match Self::read_chain(data, owner, options) {
            Ok(table) => Ok(table),
            Err(error) if !options.strict => {
                warn!("cross-reference table unusable ({}), scanning file", error);
                Self::recover(data, owner, options)
            }
            Err(error) => Err(error),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (u32, XRefEntry)> + '_ {
        self.entries.iter().map(|(number, entry)| (*number, *entry))
    }

    pub fn get(&self, number: u32) -> Option<XRefEntry> {
        self.entries.get(&number).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    pub fn into_trailer(self) -> Dictionary {
        self.trailer
    }

    fn read_chain(data: &[u8], owner: DocumentId, options: ParseOptions) -> ParseResult<Self> {
        let mut table = Self::default();
        let mut visited = HashSet::new();
        let mut next = Some(find_startxref(data)?);

        while let Some(offset) = next {
            if !visited.insert(offset) {
                warn!("cross-reference chain loops back to offset {}", offset);
                break;
            }
            let section = read_section(data, offset, owner, options)?;
            next = section
                .trailer
                .get_integer("Prev")
                .and_then(|prev| u64::try_from(prev).ok());
            debug!(
                "read xref section at {} with {} entries",
                offset,
                section.entries.len()
            );
            table.merge_older(section);
        }

        if !table.trailer.contains_key("Root") {
            return Err(ParseError::InvalidTrailer);
        }
        Ok(table)
    }

    /// Folds in a section that an already merged one supersedes.
    fn merge_older(&mut self, older: Self) {
        for (number, entry) in older.entries {
            self.entries.entry(number).or_insert(entry);
        }
        for (key, value) in older.trailer.entries() {
            if !self.trailer.contains_name(key) {
                self.trailer.set(key, value.clone());
            }
        }
    }

    /// Rebuilds the table by scanning the whole file for object headers.
    pub fn recover(data: &[u8], owner: DocumentId, options: ParseOptions) -> ParseResult<Self> {
        let scanned = scan_objects(data);
        let mut entries: BTreeMap<u32, XRefEntry> = scanned
            .iter()
            .map(|(number, (generation, offset))| {
                (
                    *number,
                    XRefEntry::InUse {
                        offset: *offset,
                        generation: *generation,
                    },
                )
            })
            .collect();

        let mut catalog = None;
        let mut compressed = Vec::new();
        for (number, (generation, offset)) in &scanned {
            let position = *offset as usize;
            let Ok((id, object)) =
                ObjectParser::at(data, position, owner, options).parse_indirect_object()
            else {
                continue;
            };
            match &object {
                Object::Dictionary(dict) if dict.has_type("Catalog") => {
                    catalog = Some(ObjectId::new(*number, *generation));
                }
                Object::Stream(stream) if stream.dictionary().has_type("ObjStm") => {
                    if let Ok(objects) = ObjectStream::parse(stream, options) {
                        compressed.push((id.number(), objects));
                    }
                }
                _ => {}
            }
        }

        for (stream, objects) in &compressed {
            for (index, number) in objects.object_numbers().enumerate() {
                entries.entry(number).or_insert(XRefEntry::Compressed {
                    stream: *stream,
                    index: index as u32,
                });
            }
        }

        let mut trailer = last_trailer(data, owner, options).unwrap_or_default();
        if !trailer.contains_key("Root") {
            let root = match catalog {
                Some(id) => id,
                None => find_compressed_catalog(&compressed, owner, options)
                    .ok_or_else(|| ParseError::MissingKey("Root".to_string()))?,
            };
            trailer.set("Root", Reference::new(root, owner));
        }
        trailer.remove("Prev");
        trailer.remove("XRefStm");
        let size = entries.keys().next_back().map_or(1, |last| last + 1);
        trailer.set("Size", i64::from(size));

        debug!("recovered {} objects by scanning", entries.len());
        Ok(Self { entries, trailer })
    }
}

fn find_startxref(data: &[u8]) -> ParseResult<u64> {
    let position = rfind_bytes(data, b"startxref").ok_or(ParseError::InvalidXRef)?;
    let mut lexer = Lexer::at(data, position + b"startxref".len());
    match lexer.next_token()? {
        Token::Integer(offset) if offset >= 0 && (offset as usize) < data.len() => {
            Ok(offset as u64)
        }
        _ => Err(ParseError::InvalidXRef),
    }
}

fn read_section(
    data: &[u8],
    offset: u64,
    owner: DocumentId,
    options: ParseOptions,
) -> ParseResult<XRefTable> {
    let position = usize::try_from(offset).map_err(|_| ParseError::InvalidXRef)?;
    if position >= data.len() {
        return Err(ParseError::InvalidXRef);
    }

    let mut parser = ObjectParser::at(data, position, owner, options);
    match parser.lexer().next_token()? {
        Token::Xref => {
            let mut section = read_classic(&mut parser)?;
            if let Some(stream_offset) = section
                .trailer
                .get_integer("XRefStm")
                .and_then(|value| u64::try_from(value).ok())
            {
                let hybrid = read_stream(data, stream_offset, owner, options)?;
                for (number, entry) in hybrid.entries {
                    let replace = !matches!(
                        section.entries.get(&number),
                        Some(XRefEntry::InUse { .. } | XRefEntry::Compressed { .. })
                    );
                    if replace {
                        section.entries.insert(number, entry);
                    }
                }
            }
            Ok(section)
        }
        Token::Integer(_) => read_stream(data, offset, owner, options),
        other => Err(ParseError::UnexpectedToken {
            expected: "'xref' or an xref stream".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

fn read_classic(parser: &mut ObjectParser<'_>) -> ParseResult<XRefTable> {
    let mut entries = BTreeMap::new();
    loop {
        match parser.lexer().next_token()? {
            Token::Integer(start) => {
                let count = expect_integer(parser.lexer())?;
                let start = u32::try_from(start).map_err(|_| ParseError::InvalidXRef)?;
                let count = u32::try_from(count).map_err(|_| ParseError::InvalidXRef)?;
                for number in start..start.saturating_add(count) {
                    let entry = read_classic_entry(parser.lexer())?;
                    entries.insert(number, entry);
                }
            }
            Token::Trailer => break,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "xref subsection or 'trailer'".to_string(),
                    found: format!("{other:?}"),
                })
            }
        }
    }

    let trailer = match parser.parse_object()? {
        Object::Dictionary(dict) => dict,
        _ => return Err(ParseError::InvalidTrailer),
    };
    Ok(XRefTable { entries, trailer })
}

fn read_classic_entry(lexer: &mut Lexer<'_>) -> ParseResult<XRefEntry> {
    let offset = expect_integer(lexer)?;
    let generation = expect_integer(lexer)?;
    let generation = u16::try_from(generation).map_err(|_| ParseError::InvalidXRef)?;
    lexer.skip_whitespace();
    match lexer.read_word() {
        b"n" => Ok(XRefEntry::InUse {
            offset: u64::try_from(offset).map_err(|_| ParseError::InvalidXRef)?,
            generation,
        }),
        b"f" => Ok(XRefEntry::Free {
            next: u32::try_from(offset).map_err(|_| ParseError::InvalidXRef)?,
            generation,
        }),
        other => Err(ParseError::SyntaxError {
            position: lexer.position(),
            message: format!(
                "Invalid xref entry type '{}'",
                String::from_utf8_lossy(other)
            ),
        }),
    }
}

fn expect_integer(lexer: &mut Lexer<'_>) -> ParseResult<i64> {
    match lexer.next_token()? {
        Token::Integer(value) => Ok(value),
        other => Err(ParseError::UnexpectedToken {
            expected: "integer".to_string(),
            found: format!("{other:?}"),
        }),
    }
}

fn read_stream(
    data: &[u8],
    offset: u64,
    owner: DocumentId,
    options: ParseOptions,
) -> ParseResult<XRefTable> {
    let position = usize::try_from(offset).map_err(|_| ParseError::InvalidXRef)?;
    let (_, object) = ObjectParser::at(data, position, owner, options).parse_indirect_object()?;
    let stream = match object {
        Object::Stream(stream) => stream,
        _ => return Err(ParseError::InvalidXRef),
    };
    let dict = stream.dictionary();
    if !dict.has_type("XRef") {
        if options.strict {
            return Err(ParseError::InvalidXRef);
        }
        warn!("xref stream at {} lacks /Type /XRef", offset);
    }

    let widths = dict
        .get_array("W")
        .ok_or_else(|| ParseError::MissingKey("W".to_string()))?
        .iter()
        .map(|width| {
            width
                .as_integer()
                .and_then(|w| usize::try_from(w).ok())
                .filter(|w| *w <= 8)
                .ok_or(ParseError::InvalidXRef)
        })
        .collect::<ParseResult<Vec<_>>>()?;
    if widths.len() != 3 {
        return Err(ParseError::InvalidXRef);
    }

    let size = dict
        .get_integer("Size")
        .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;
    let index = match dict.get_array("Index") {
        Some(index) => index
            .iter()
            .map(|value| value.as_integer().ok_or(ParseError::InvalidXRef))
            .collect::<ParseResult<Vec<_>>>()?,
        None => vec![0, size],
    };
    if index.len() % 2 != 0 {
        return Err(ParseError::InvalidXRef);
    }

    let rows = stream
        .decoded_data()
        .map_err(|error| ParseError::StreamDecodeError(error.to_string()))?;
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(ParseError::InvalidXRef);
    }

    let mut entries = BTreeMap::new();
    let mut chunks = rows.chunks_exact(row_len);
    for pair in index.chunks(2) {
        let start = u32::try_from(pair[0]).map_err(|_| ParseError::InvalidXRef)?;
        let count = u32::try_from(pair[1]).map_err(|_| ParseError::InvalidXRef)?;
        for number in start..start.saturating_add(count) {
            let Some(row) = chunks.next() else {
                warn!("xref stream ends before object {}", number);
                break;
            };
            let (kind, rest) = row.split_at(widths[0]);
            let (second, third) = rest.split_at(widths[1]);
            let kind = if widths[0] == 0 { 1 } else { read_field(kind) };
            let second = read_field(second);
            let third = read_field(third);
            let entry = match kind {
                0 => XRefEntry::Free {
                    next: second as u32,
                    generation: third as u16,
                },
                1 => XRefEntry::InUse {
                    offset: second,
                    generation: third as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: second as u32,
                    index: third as u32,
                },
                // Unknown types are reserved and read as null references
                _ => continue,
            };
            entries.insert(number, entry);
        }
    }

    let mut trailer = dict.clone();
    for key in ["Type", "W", "Index", "Length", "Filter", "DecodeParms"] {
        trailer.remove(key);
    }
    Ok(XRefTable { entries, trailer })
}

fn read_field(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |value, byte| (value << 8) | u64::from(*byte))
}

/// Finds every `N G obj` header in `data`. Later headers for the same
/// number win, matching how incremental updates append new versions.
pub(crate) fn scan_objects(data: &[u8]) -> BTreeMap<u32, (u16, u64)> {
    let mut found = BTreeMap::new();
    let mut search = 0;
    while let Some(index) = super::lexer::find_bytes(&data[search..], b"obj") {
        let keyword = search + index;
        search = keyword + 3;
        if data.get(search).is_some_and(|ch| ch.is_ascii_alphanumeric()) {
            continue;
        }
        if let Some((number, generation, start)) = object_header_before(data, keyword) {
            found.insert(number, (generation, start as u64));
        }
    }
    found
}

/// Walks back from an `obj` keyword over `N G ` and returns the header.
fn object_header_before(data: &[u8], keyword: usize) -> Option<(u32, u16, usize)> {
    let mut cursor = keyword;
    while cursor > 0 && is_whitespace(data[cursor - 1]) {
        cursor -= 1;
    }
    let generation_end = cursor;
    while cursor > 0 && data[cursor - 1].is_ascii_digit() {
        cursor -= 1;
    }
    let generation_start = cursor;
    if generation_start == generation_end {
        return None;
    }
    let gap_end = cursor;
    while cursor > 0 && is_whitespace(data[cursor - 1]) {
        cursor -= 1;
    }
    if cursor == gap_end {
        return None;
    }
    let number_end = cursor;
    while cursor > 0 && data[cursor - 1].is_ascii_digit() {
        cursor -= 1;
    }
    if cursor == number_end {
        return None;
    }
    if cursor > 0 && !is_whitespace(data[cursor - 1]) && !is_delimiter(data[cursor - 1]) {
        return None;
    }

    let number = std::str::from_utf8(&data[cursor..number_end])
        .ok()?
        .parse::<u32>()
        .ok()?;
    let generation = std::str::from_utf8(&data[generation_start..generation_end])
        .ok()?
        .parse::<u16>()
        .ok()?;
    (number > 0).then_some((number, generation, cursor))
}

fn last_trailer(data: &[u8], owner: DocumentId, options: ParseOptions) -> Option<Dictionary> {
    let position = rfind_bytes(data, b"trailer")?;
    let mut parser = ObjectParser::at(data, position + b"trailer".len(), owner, options);
    match parser.parse_object() {
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    }
}

fn find_compressed_catalog(
    streams: &[(u32, ObjectStream)],
    owner: DocumentId,
    options: ParseOptions,
) -> Option<ObjectId> {
    streams.iter().find_map(|(_, objects)| {
        (0..objects.len()).find_map(|index| match objects.get(index, owner, options) {
            Ok((number, Object::Dictionary(dict))) if dict.has_type("Catalog") => {
                Some(ObjectId::new(number, 0))
            }
            _ => None,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{Name, Stream};

    /// Builds a file from object bodies, with a correct classic table.
    fn classic_file(objects: &[&str], trailer_extra: &str) -> Vec<u8> {
        let mut data = b"%PDF-1.7\n".to_vec();
        let mut offsets = Vec::new();
        for (index, body) in objects.iter().enumerate() {
            offsets.push(data.len());
            data.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", index + 1, body).as_bytes());
        }
        let xref = data.len();
        data.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
        data.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets {
            data.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        data.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R{} >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                trailer_extra,
                xref
            )
            .as_bytes(),
        );
        data
    }

    #[test]
    fn test_read_classic_table() {
        let data = classic_file(
            &["<< /Type /Catalog /Pages 2 0 R >>", "<< /Type /Pages /Kids [] /Count 0 >>"],
            "",
        );
        let table = XRefTable::read(&data, DocumentId::next(), ParseOptions::strict()).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get(0),
            Some(XRefEntry::Free {
                next: 0,
                generation: 65535
            })
        );
        assert_eq!(
            table.get(1),
            Some(XRefEntry::InUse {
                offset: 9,
                generation: 0
            })
        );
        assert_eq!(table.trailer().get_integer("Size"), Some(3));
        assert_eq!(table.trailer().get_reference("Root").unwrap().number(), 1);
    }

    #[test]
    fn test_prev_chain_newest_wins() {
        let mut data = classic_file(&["<< /Type /Catalog >>", "(old)"], "");
        let first_xref = rfind_bytes(&data, b"xref\n0").unwrap();

        let updated = data.len();
        data.extend_from_slice(b"2 0 obj\n(new)\nendobj\n");
        let xref = data.len();
        data.extend_from_slice(
            format!(
                "xref\n2 1\n{updated:010} 00000 n \ntrailer\n<< /Size 3 /Prev {first_xref} >>\nstartxref\n{xref}\n%%EOF\n"
            )
            .as_bytes(),
        );

        let table = XRefTable::read(&data, DocumentId::next(), ParseOptions::strict()).unwrap();
        assert_eq!(
            table.get(2),
            Some(XRefEntry::InUse {
                offset: updated as u64,
                generation: 0
            })
        );
        // Root only appears in the older trailer
        assert!(table.trailer().contains_key("Root"));
        assert!(matches!(table.get(1), Some(XRefEntry::InUse { .. })));
    }

    #[test]
    fn test_read_xref_stream() {
        let mut data = b"%PDF-1.7\n".to_vec();
        let catalog = data.len();
        data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");

        let mut rows = Vec::new();
        rows.extend_from_slice(&[0, 0, 0, 0xff]);
        rows.extend_from_slice(&[1, 0, catalog as u8, 0]);
        rows.extend_from_slice(&[2, 0, 5, 3]);
        let mut dict = Dictionary::new();
        dict.set("Type", Name::from("XRef"));
        dict.set("Size", 3);
        dict.set(
            "W",
            vec![Object::Integer(1), Object::Integer(2), Object::Integer(1)],
        );
        let owner = DocumentId::next();
        dict.set("Root", Reference::new(ObjectId::new(1, 0), owner));
        let stream = Stream::with_dictionary(dict, rows);

        let xref = data.len();
        data.extend_from_slice(b"9 0 obj\n");
        stream.write_content(&mut data);
        data.extend_from_slice(format!("\nendobj\nstartxref\n{xref}\n%%EOF\n").as_bytes());

        let table = XRefTable::read(&data, owner, ParseOptions::strict()).unwrap();
        assert_eq!(
            table.get(1),
            Some(XRefEntry::InUse {
                offset: catalog as u64,
                generation: 0
            })
        );
        assert_eq!(
            table.get(2),
            Some(XRefEntry::Compressed {
                stream: 5,
                index: 3
            })
        );
        assert!(!table.trailer().contains_key("W"));
        assert!(table.trailer().contains_key("Root"));
    }

    #[test]
    fn test_broken_table_is_recovered() {
        let mut data = classic_file(&["<< /Type /Catalog >>", "42"], "");
        let position = rfind_bytes(&data, b"startxref").unwrap();
        data.truncate(position);
        data.extend_from_slice(b"startxref\n3\n%%EOF\n");

        let table = XRefTable::read(&data, DocumentId::next(), ParseOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.trailer().get_reference("Root").unwrap().number(), 1);
        assert_eq!(table.trailer().get_integer("Size"), Some(3));
    }

    #[test]
    fn test_broken_table_fails_in_strict_mode() {
        let mut data = classic_file(&["<< /Type /Catalog >>"], "");
        let position = rfind_bytes(&data, b"startxref").unwrap();
        data.truncate(position);
        data.extend_from_slice(b"startxref\n3\n%%EOF\n");

        assert!(XRefTable::read(&data, DocumentId::next(), ParseOptions::strict()).is_err());
    }

    #[test]
    fn test_recover_without_trailer_finds_catalog() {
        let data = b"%PDF-1.4\n1 0 obj\n(text)\nendobj\n2 0 obj\n<< /Type /Catalog >>\nendobj\n";
        let table = XRefTable::recover(data, DocumentId::next(), ParseOptions::default()).unwrap();
        assert_eq!(table.trailer().get_reference("Root").unwrap().number(), 2);
    }

    #[test]
    fn test_scan_objects_ignores_endobj_and_text() {
        let data = b"1 0 obj\n(10 0 objection)\nendobj\n 12 3 obj null endobj";
        let found = scan_objects(data);
        assert_eq!(found.len(), 2);
        assert_eq!(found[&1], (0, 0));
        assert_eq!(found[&12].0, 3);
    }
}
