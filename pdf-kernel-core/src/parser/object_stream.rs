//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+)

use super::lexer::{Lexer, Token};
use super::objects::ObjectParser;
use super::{ParseError, ParseOptions, ParseResult};
use crate::objects::{DocumentId, Object, Stream};
use tracing::warn;

/// The decoded body of an object stream plus its offset table.
#[derive(Debug)]
pub struct ObjectStream {
    /// (object number, offset relative to `first`) per entry
    offsets: Vec<(u32, usize)>,
    first: usize,
    data: Vec<u8>,
}

impl ObjectStream {
    pub fn parse(stream: &Stream, options: ParseOptions) -> ParseResult<Self> {
        let dict = stream.dictionary();
        if !dict.has_type("ObjStm") {
            if options.strict {
                return Err(ParseError::SyntaxError {
                    position: 0,
                    message: "Object stream without /Type /ObjStm".to_string(),
                });
            }
            warn!("object stream without /Type /ObjStm");
        }

        let count = dict
            .get_integer("N")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?;
        let first = dict
            .get_integer("First")
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?;

        let data = stream
            .decoded_data()
            .map_err(|error| ParseError::StreamDecodeError(error.to_string()))?;
        if first > data.len() {
            return Err(ParseError::SyntaxError {
                position: first,
                message: "Object stream /First lies past its data".to_string(),
            });
        }

        let mut lexer = Lexer::new(&data[..first]);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            let number = read_header_integer(&mut lexer)?;
            let offset = read_header_integer(&mut lexer)?;
            let number = u32::try_from(number).map_err(|_| ParseError::InvalidXRef)?;
            let offset = usize::try_from(offset).map_err(|_| ParseError::InvalidXRef)?;
            offsets.push((number, offset));
        }

        Ok(Self {
            offsets,
            first,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.offsets.iter().map(|(number, _)| *number)
    }

    /// Index of the entry holding object `number`.
    pub fn find(&self, number: u32) -> Option<usize> {
        self.offsets.iter().position(|(n, _)| *n == number)
    }

    /// Parses entry `index`, returning its object number and value.
    pub fn get(
        &self,
        index: usize,
        owner: DocumentId,
        options: ParseOptions,
    ) -> ParseResult<(u32, Object)> {
        let (number, offset) = *self.offsets.get(index).ok_or_else(|| ParseError::SyntaxError {
            position: 0,
            message: format!("Object stream has no entry {index}"),
        })?;
        let position = self.first.saturating_add(offset);
        let object = ObjectParser::at(&self.data, position, owner, options).parse_object()?;
        Ok((number, object))
    }
}

fn read_header_integer(lexer: &mut Lexer<'_>) -> ParseResult<i64> {
    match lexer.next_token()? {
        Token::Integer(value) => Ok(value),
        other => Err(ParseError::UnexpectedToken {
            expected: "integer in object stream header".to_string(),
            found: format!("{other:?}"),
        }),
    }
}
