use std::fmt;

/// How a string was (or should be) spelled in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    #[default]
    Literal,
    Hex,
}

/// A PDF string: arbitrary bytes plus a hint for how to write them.
///
/// Equality looks only at the bytes; `(AB)` and `<4142>` are the same string.
#[derive(Debug, Clone, Default)]
pub struct PdfString {
    bytes: Vec<u8>,
    encoding: StringEncoding,
}

impl PdfString {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            encoding: StringEncoding::Literal,
        }
    }

    pub fn hex(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            encoding: StringEncoding::Hex,
        }
    }

    /// Encodes text for use in the document information dictionary and
    /// similar places: ASCII stays as is, anything else becomes UTF-16BE
    /// with a byte order mark.
    pub fn from_text(text: &str) -> Self {
        if text.is_ascii() {
            return Self::new(text.as_bytes());
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn encoding(&self) -> StringEncoding {
        self.encoding
    }

    pub fn set_encoding(&mut self, encoding: StringEncoding) {
        self.encoding = encoding;
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decodes text strings: UTF-16BE when a byte order mark is present,
    /// otherwise each byte maps to the code point of the same value.
    pub fn to_text(&self) -> String {
        if self.bytes.starts_with(&[0xFE, 0xFF]) {
            let units: Vec<u16> = self.bytes[2..]
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], *pair.get(1).unwrap_or(&0)]))
                .collect();
            return String::from_utf16_lossy(&units);
        }
        if let Some(utf8) = self.bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
            return String::from_utf8_lossy(utf8).into_owned();
        }
        self.bytes.iter().map(|&b| b as char).collect()
    }

    pub fn write_content(&self, out: &mut Vec<u8>) {
        match self.encoding {
            StringEncoding::Hex => {
                out.push(b'<');
                out.extend_from_slice(hex::encode_upper(&self.bytes).as_bytes());
                out.push(b'>');
            }
            StringEncoding::Literal => {
                out.push(b'(');
                for &byte in &self.bytes {
                    match byte {
                        b'(' | b')' | b'\\' => {
                            out.push(b'\\');
                            out.push(byte);
                        }
                        b'\n' => out.extend_from_slice(b"\\n"),
                        b'\r' => out.extend_from_slice(b"\\r"),
                        b'\t' => out.extend_from_slice(b"\\t"),
                        0x08 => out.extend_from_slice(b"\\b"),
                        0x0C => out.extend_from_slice(b"\\f"),
                        b if b < 0x20 => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
                        b => out.push(b),
                    }
                }
                out.push(b')');
            }
        }
    }
}

impl PartialEq for PdfString {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for PdfString {}

impl fmt::Display for PdfString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl From<&str> for PdfString {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for PdfString {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl From<Vec<u8>> for PdfString {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}
