use crate::error::Result;
use crate::objects::{Dictionary, Name, Object};

/// Whether the stream bytes are still encoded by the filters named in the
/// dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Bytes exactly as stored in the file (or as given by the caller).
    #[default]
    Raw,
    /// Filters have been applied in reverse and removed from the dictionary.
    Decoded,
}

#[derive(Debug, Clone)]
pub struct Stream {
    dictionary: Dictionary,
    data: Vec<u8>,
    state: StreamState,
}

impl Stream {
    pub fn new(data: Vec<u8>) -> Self {
        let mut dictionary = Dictionary::new();
        dictionary.set("Length", data.len() as i64);

        Self {
            dictionary,
            data,
            state: StreamState::Raw,
        }
    }

    pub fn with_dictionary(dictionary: Dictionary, data: Vec<u8>) -> Self {
        let mut dict = dictionary;
        dict.set("Length", data.len() as i64);

        Self {
            dictionary: dict,
            data,
            state: StreamState::Raw,
        }
    }

    /// Builds a stream without touching `/Length`; used by the parser and by
    /// the copier, which keep the dictionary as found.
    pub(crate) fn from_parts(dictionary: Dictionary, data: Vec<u8>, state: StreamState) -> Self {
        Self {
            dictionary,
            data,
            state,
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_filtered(&self) -> bool {
        self.dictionary.contains_key("Filter")
    }

    pub fn set_filter(&mut self, filter: &str) {
        self.dictionary.set("Filter", Object::Name(Name::from(filter)));
    }

    pub fn set_decode_params(&mut self, params: Dictionary) {
        self.dictionary.set("DecodeParms", params);
    }

    /// Returns the bytes with every filter undone, leaving the stream as is.
    pub fn decoded_data(&self) -> Result<Vec<u8>> {
        if self.state == StreamState::Decoded || !self.is_filtered() {
            return Ok(self.data.clone());
        }
        crate::compression::decode_stream(&self.data, &self.dictionary)
    }

    /// Replaces the stored bytes with their decoded form and drops the
    /// filter entries.
    pub fn decode(&mut self) -> Result<()> {
        if self.state == StreamState::Decoded {
            return Ok(());
        }
        self.data = self.decoded_data()?;
        self.dictionary.remove("Filter");
        self.dictionary.remove("DecodeParms");
        self.dictionary.set("Length", self.data.len() as i64);
        self.state = StreamState::Decoded;
        Ok(())
    }

    #[cfg(feature = "compression")]
    pub fn compress_flate(&mut self) -> Result<()> {
        self.data = crate::compression::compress(&self.data)?;
        self.dictionary.set("Length", self.data.len() as i64);
        self.set_filter("FlateDecode");
        self.state = StreamState::Raw;

        Ok(())
    }

    /// Writes the dictionary with a `/Length` matching the stored bytes,
    /// followed by the stream body.
    pub fn write_content(&self, out: &mut Vec<u8>) {
        let mut dictionary = self.dictionary.clone();
        dictionary.set("Length", self.data.len() as i64);
        dictionary.write_content(out);
        out.extend_from_slice(b"\nstream\n");
        out.extend_from_slice(&self.data);
        out.extend_from_slice(b"\nendstream");
    }
}

impl PartialEq for Stream {
    fn eq(&self, other: &Self) -> bool {
        self.dictionary == other.dictionary && self.data == other.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_new() {
        let data = vec![1, 2, 3, 4, 5];
        let stream = Stream::new(data.clone());

        assert_eq!(stream.data(), &data);
        assert_eq!(stream.dictionary().get("Length"), Some(&Object::Integer(5)));
        assert_eq!(stream.state(), StreamState::Raw);
        assert!(!stream.is_filtered());
    }

    #[test]
    fn test_stream_with_dictionary_overrides_length() {
        let mut dict = Dictionary::new();
        dict.set("Type", Name::from("XObject"));
        dict.set("Length", 999);

        let stream = Stream::with_dictionary(dict, vec![0; 10]);
        assert_eq!(stream.dictionary().get_integer("Length"), Some(10));
        assert!(stream.dictionary().has_type("XObject"));
    }

    #[test]
    fn test_write_content_fixes_length() {
        let mut stream = Stream::new(b"q Q".to_vec());
        stream.data_mut().extend_from_slice(b" BT ET");

        let mut out = Vec::new();
        stream.write_content(&mut out);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "<<\n/Length 9\n>>\nstream\nq Q BT ET\nendstream"
        );
    }

    #[test]
    fn test_unfiltered_decoded_data_is_identity() {
        let stream = Stream::new(b"plain".to_vec());
        assert_eq!(stream.decoded_data().unwrap(), b"plain");
    }

    #[test]
    fn test_ascii_hex_decode() {
        let mut stream = Stream::new(b"48656C6C6F>".to_vec());
        stream.set_filter("ASCIIHexDecode");

        let mut decoded = stream.clone();
        decoded.decode().unwrap();
        assert_eq!(decoded.data(), b"Hello");
        assert_eq!(decoded.state(), StreamState::Decoded);
        assert!(!decoded.is_filtered());
        assert_eq!(decoded.dictionary().get_integer("Length"), Some(5));
    }

    #[cfg(feature = "compression")]
    #[test]
    fn test_compress_then_decode() {
        let original = b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET".repeat(10);
        let mut stream = Stream::new(original.clone());
        stream.compress_flate().unwrap();

        assert!(stream.is_filtered());
        assert_ne!(stream.data(), original.as_slice());
        assert_eq!(stream.decoded_data().unwrap(), original);
    }

    #[test]
    fn test_equality_ignores_state() {
        let a = Stream::from_parts(Dictionary::new(), b"x".to_vec(), StreamState::Raw);
        let b = Stream::from_parts(Dictionary::new(), b"x".to_vec(), StreamState::Decoded);
        assert_eq!(a, b);
    }
}
