//! Serialization of a document's registry to PDF bytes.
//!
//! Live objects are written in ascending object number, followed by a
//! classic cross-reference table in which free entries form the linked
//! chain the registry will hand out next.

use crate::document::Document;
use crate::error::Result;
use crate::objects::{Dictionary, Object, ObjectId, PdfString};
use crate::registry::{ObjectRegistry, MAX_GENERATION};
use chrono::Utc;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use tracing::debug;

/// Output settings for [`PdfWriter`].
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Flate-compress streams that carry no filter yet
    pub compress_streams: bool,
    /// Header version; the document's own version when `None`
    pub pdf_version: Option<String>,
    /// Refresh and reference the `/Info` dictionary in the trailer
    pub write_info: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compress_streams: false,
            pdf_version: None,
            write_info: true,
        }
    }
}

pub struct PdfWriter<W: Write> {
    writer: W,
    config: WriterConfig,
    xref_positions: HashMap<u32, (u16, u64)>,
    current_position: u64,
}

impl<W: Write> PdfWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_config(writer, WriterConfig::default())
    }

    pub fn with_config(writer: W, config: WriterConfig) -> Self {
        Self {
            writer,
            config,
            xref_positions: HashMap::new(),
            current_position: 0,
        }
    }

    /// Writes every live object of `document`, the xref table and the trailer.
    ///
    /// Fails with a foreign-object error if any object holds a reference
    /// into another document; nothing after the header is meaningful then.
    pub fn write_document(&mut self, document: &Document) -> Result<()> {
        let version = self
            .config
            .pdf_version
            .clone()
            .unwrap_or_else(|| document.version().to_string());
        self.write_header(&version)?;

        let registry = document.registry();
        for id in registry.iter_live() {
            let object = registry.resolve(id)?;
            registry.check_references(object)?;
            self.write_object(id, object)?;
        }

        let xref_position = self.current_position;
        self.write_xref(registry)?;
        self.write_trailer(document, xref_position)?;
        self.writer.flush()?;

        debug!(
            "wrote document {} with {} objects ({} bytes)",
            document.id(),
            self.xref_positions.len(),
            self.current_position
        );
        Ok(())
    }

    fn write_header(&mut self, version: &str) -> Result<()> {
        self.write_bytes(format!("%PDF-{version}\n").as_bytes())?;
        // Binary comment to ensure file is treated as binary
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])
    }

    fn write_object(&mut self, id: ObjectId, object: &Object) -> Result<()> {
        self.xref_positions
            .insert(id.number(), (id.generation(), self.current_position));

        let object = self.prepare(object)?;
        let mut buffer = format!("{} {} obj\n", id.number(), id.generation()).into_bytes();
        object.write_content(&mut buffer);
        buffer.extend_from_slice(b"\nendobj\n");
        self.write_bytes(&buffer)
    }

    /// Applies write-time stream compression.
    fn prepare<'o>(&self, object: &'o Object) -> Result<Cow<'o, Object>> {
        match object {
            #[cfg(feature = "compression")]
            Object::Stream(stream) if self.config.compress_streams && !stream.is_filtered() => {
                let mut stream = stream.clone();
                stream.compress_flate()?;
                Ok(Cow::Owned(Object::Stream(stream)))
            }
            _ => Ok(Cow::Borrowed(object)),
        }
    }

    fn write_xref(&mut self, registry: &ObjectRegistry) -> Result<()> {
        let size = registry.size();
        let chain = registry.free_chain();
        let mut next_free: HashMap<u32, u32> = chain
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .collect();
        if let Some(&last) = chain.last() {
            next_free.insert(last, 0);
        }
        let free_generations: HashMap<u32, u16> = registry.free_entries().into_iter().collect();

        let mut table = format!("xref\n0 {size}\n").into_bytes();
        let head = chain.first().copied().unwrap_or(0);
        table.extend_from_slice(format!("{head:010} {MAX_GENERATION:05} f \n").as_bytes());

        for number in 1..size {
            let entry = match self.xref_positions.get(&number) {
                Some((generation, position)) => format!("{position:010} {generation:05} n \n"),
                None => {
                    let next = next_free.get(&number).copied().unwrap_or(0);
                    let generation = free_generations.get(&number).copied().unwrap_or(0);
                    format!("{next:010} {generation:05} f \n")
                }
            };
            table.extend_from_slice(entry.as_bytes());
        }
        self.write_bytes(&table)
    }

    fn write_trailer(&mut self, document: &Document, xref_position: u64) -> Result<()> {
        let registry = document.registry();
        let mut trailer = Dictionary::new();
        trailer.set("Size", registry.size() as i64);
        trailer.set("Root", document.catalog());
        if self.config.write_info {
            if let Some(info) = document.info_reference() {
                if registry.contains(info.id()) {
                    trailer.set("Info", info);
                }
            }
        }

        let instance_id = instance_id(document);
        let permanent_id = document
            .file_id()
            .map(<[u8]>::to_vec)
            .unwrap_or_else(|| instance_id.clone());
        trailer.set(
            "ID",
            vec![
                Object::String(PdfString::hex(permanent_id)),
                Object::String(PdfString::hex(instance_id)),
            ],
        );

        let mut buffer = b"trailer\n".to_vec();
        trailer.write_content(&mut buffer);
        buffer.extend_from_slice(format!("\nstartxref\n{xref_position}\n%%EOF\n").as_bytes());
        self.write_bytes(&buffer)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }
}

/// Hash of the document identity, its size and the current time.
fn instance_id(document: &Document) -> Vec<u8> {
    let seed = format!(
        "{}-{}-{}",
        document.id(),
        document.registry().len(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    md5::compute(seed.as_bytes()).0.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rectangle;
    use crate::objects::{Array, Stream};
    use std::io::{self, ErrorKind};

    fn write(document: &mut Document, config: WriterConfig) -> String {
        let mut buffer = Vec::new();
        document.write_to_with_config(&mut buffer, config).unwrap();
        String::from_utf8_lossy(&buffer).into_owned()
    }

    #[test]
    fn test_header_and_trailer() {
        let mut doc = Document::new();
        let output = write(&mut doc, WriterConfig::default());

        assert!(output.starts_with("%PDF-1.7\n%"));
        assert!(output.contains("trailer\n<<\n/Size 4\n/Root 2 0 R\n/Info 3 0 R\n/ID [<"));
        assert!(output.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_version_override() {
        let mut doc = Document::new();
        let config = WriterConfig {
            pdf_version: Some("2.0".to_string()),
            ..WriterConfig::default()
        };
        assert!(write(&mut doc, config).starts_with("%PDF-2.0\n"));
    }

    #[test]
    fn test_objects_in_ascending_order() {
        let mut doc = Document::new();
        doc.add_new_page(Rectangle::a4()).unwrap();
        let output = write(&mut doc, WriterConfig::default());

        let positions: Vec<usize> = (1..=4)
            .map(|number| output.find(&format!("\n{number} 0 obj\n")).unwrap())
            .collect();
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let mut doc = Document::new();
        doc.add_new_page(Rectangle::a4()).unwrap();
        let mut buffer = Vec::new();
        doc.write_to(&mut buffer).unwrap();
        let output = String::from_utf8_lossy(&buffer).into_owned();

        let xref = output.rfind("xref\n").unwrap();
        let lines: Vec<&str> = output[xref..].lines().skip(2).take(5).collect();
        assert_eq!(lines[0], "0000000000 65535 f ");
        for (number, line) in lines.iter().enumerate().skip(1) {
            let offset: usize = line[..10].parse().unwrap();
            assert!(buffer[offset..].starts_with(format!("{number} 0 obj").as_bytes()));
        }
    }

    #[test]
    fn test_free_entries_form_a_chain() {
        let mut doc = Document::new();
        let a = doc.register(Object::Integer(1)).unwrap();
        let b = doc.register(Object::Integer(2)).unwrap();
        doc.register(Object::Integer(3)).unwrap();
        doc.free(&b).unwrap();
        doc.free(&a).unwrap();
        let config = WriterConfig {
            write_info: false,
            ..WriterConfig::default()
        };
        let output = write(&mut doc, config);

        let xref = output.rfind("xref\n").unwrap();
        let lines: Vec<&str> = output[xref..].lines().collect();
        assert_eq!(lines[1], "0 6");
        assert_eq!(lines[2], "0000000003 65535 f ");
        assert_eq!(lines[5], "0000000004 00001 f ");
        assert_eq!(lines[6], "0000000000 00001 f ");
        assert!(!output.contains("/Info"));
    }

    #[test]
    fn test_foreign_reference_fails_write() {
        let mut doc = Document::new();
        let mut other = Document::new();
        let theirs = other.register(Object::Integer(9)).unwrap();
        let ours = doc.register(Object::Array(Array::new())).unwrap();
        // Mutable access bypasses the check made on registration
        if let Some(array) = doc.resolve_mut(&ours).unwrap().as_array_mut() {
            array.push(Object::Reference(theirs));
        }

        let mut buffer = Vec::new();
        let result = doc.write_to(&mut buffer);
        assert!(matches!(
            result,
            Err(crate::error::PdfError::ForeignObject { .. })
        ));
    }

    #[test]
    fn test_stream_written_with_length() {
        let mut doc = Document::new();
        doc.register(Stream::new(b"BT ET".to_vec())).unwrap();
        let output = write(&mut doc, WriterConfig::default());
        assert!(output.contains("/Length 5\n>>\nstream\nBT ET\nendstream\nendobj\n"));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_compress_streams_on_write() {
        let mut doc = Document::new();
        let payload = b"0 0 m 100 100 l S\n".repeat(20);
        let reference = doc.register(Stream::new(payload.clone())).unwrap();
        let config = WriterConfig {
            compress_streams: true,
            ..WriterConfig::default()
        };
        let output = write(&mut doc, config);

        assert!(output.contains("/Filter /FlateDecode"));
        // the in-memory stream is untouched
        let stream = doc.resolve(&reference).unwrap().as_stream().unwrap();
        assert!(!stream.is_filtered());
        assert_eq!(stream.data(), payload.as_slice());
    }

    struct FailingWriter {
        fail_after: usize,
        written: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written >= self.fail_after {
                return Err(io::Error::new(ErrorKind::PermissionDenied, "Simulated write error"));
            }
            self.written += buf.len();
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_is_reported() {
        let doc = Document::new();
        let mut writer = PdfWriter::new(FailingWriter {
            fail_after: 5,
            written: 0,
        });
        assert!(matches!(
            writer.write_document(&doc),
            Err(crate::error::PdfError::Io(_))
        ));
    }
}
