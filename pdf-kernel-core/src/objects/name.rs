use std::borrow::Borrow;
use std::fmt;

/// A PDF name. The value holds the decoded bytes; `#XX` escaping is applied
/// only when the name is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Vec<u8>);

impl Name {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Name(bytes.into())
    }

    /// Decodes the escaped form found in a file (without the leading `/`).
    /// A `#` not followed by two hex digits is kept literally.
    pub fn from_escaped(escaped: &[u8]) -> Self {
        let mut decoded = Vec::with_capacity(escaped.len());
        let mut i = 0;
        while i < escaped.len() {
            let byte = escaped[i];
            if byte == b'#' {
                if let (Some(high), Some(low)) = (
                    escaped.get(i + 1).and_then(|b| hex_value(*b)),
                    escaped.get(i + 2).and_then(|b| hex_value(*b)),
                ) {
                    decoded.push((high << 4) | low);
                    i += 3;
                    continue;
                }
            }
            decoded.push(byte);
            i += 1;
        }
        Name(decoded)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The escaped byte form, without the leading `/`.
    pub fn escaped(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.0.len());
        for &byte in &self.0 {
            if needs_escape(byte) {
                out.push(b'#');
                out.extend_from_slice(format!("{byte:02X}").as_bytes());
            } else {
                out.push(byte);
            }
        }
        out
    }

    pub fn write_content(&self, out: &mut Vec<u8>) {
        out.push(b'/');
        out.extend_from_slice(&self.escaped());
    }
}

fn needs_escape(byte: u8) -> bool {
    !(b'!'..=b'~').contains(&byte)
        || matches!(
            byte,
            b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'#'
        )
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl Borrow<[u8]> for Name {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name(value.as_bytes().to_vec())
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name(value.into_bytes())
    }
}

impl From<&[u8]> for Name {
    fn from(value: &[u8]) -> Self {
        Name(value.to_vec())
    }
}

impl From<&Name> for Name {
    fn from(value: &Name) -> Self {
        value.clone()
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}
