//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3.
//! References are bound to the document whose registry will hold them.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseOptions, ParseResult};
use crate::objects::{
    Array, Dictionary, DocumentId, Object, ObjectId, PdfString, Reference, Stream, StreamState,
};
use tracing::warn;

/// Looks up the value of an indirect `/Length`.
pub type LengthResolver<'r> = &'r dyn Fn(Reference) -> Option<usize>;

pub struct ObjectParser<'a> {
    lexer: Lexer<'a>,
    owner: DocumentId,
    options: ParseOptions,
    length_resolver: Option<LengthResolver<'a>>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8], owner: DocumentId, options: ParseOptions) -> Self {
        Self::at(data, 0, owner, options)
    }

    /// A parser positioned at byte `position`.
    pub fn at(data: &'a [u8], position: usize, owner: DocumentId, options: ParseOptions) -> Self {
        Self {
            lexer: Lexer::at(data, position),
            owner,
            options,
            length_resolver: None,
        }
    }

    pub fn with_length_resolver(mut self, resolver: LengthResolver<'a>) -> Self {
        self.length_resolver = Some(resolver);
        self
    }

    pub(crate) fn lexer(&mut self) -> &mut Lexer<'a> {
        &mut self.lexer
    }

    pub fn position(&self) -> usize {
        self.lexer.position()
    }

    /// Parses one direct value.
    pub fn parse_object(&mut self) -> ParseResult<Object> {
        let token = self.lexer.next_token()?;
        self.parse_from_token(token, 0)
    }

    /// Parses `N G obj ... endobj`, including a stream body.
    pub fn parse_indirect_object(&mut self) -> ParseResult<(ObjectId, Object)> {
        let number = self.expect_integer("object number")?;
        let generation = self.expect_integer("generation number")?;
        let id = object_id(number, generation).ok_or_else(|| ParseError::SyntaxError {
            position: self.lexer.position(),
            message: format!("Invalid object identifier {number} {generation}"),
        })?;
        self.lexer.expect_keyword(Token::Obj)?;

        let value = self.parse_object()?;
        let value = match self.lexer.next_token()? {
            Token::Stream => match value {
                Object::Dictionary(dict) => Object::Stream(self.parse_stream_body(dict)?),
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "dictionary before 'stream'".to_string(),
                        found: other.type_name().to_string(),
                    })
                }
            },
            token => {
                self.lexer.push_token(token);
                value
            }
        };

        match self.lexer.next_token()? {
            Token::EndObj => {}
            found if !self.options.strict => {
                warn!("object {} is missing 'endobj', found {:?}", id, found);
            }
            found => {
                return Err(ParseError::UnexpectedToken {
                    expected: "keyword 'endobj'".to_string(),
                    found: format!("{found:?}"),
                })
            }
        }
        Ok((id, value))
    }

    fn parse_from_token(&mut self, token: Token, depth: usize) -> ParseResult<Object> {
        match token {
            Token::Null => Ok(Object::Null),
            Token::Boolean(b) => Ok(Object::Boolean(b)),
            Token::Integer(i) => self.parse_integer_or_reference(i),
            Token::Real(r) => Ok(Object::Real(r)),
            Token::String(s) => Ok(Object::String(PdfString::new(s))),
            Token::HexString(s) => Ok(Object::String(PdfString::hex(s))),
            Token::Name(n) => Ok(Object::Name(n)),
            Token::ArrayStart => self.parse_array(depth + 1),
            Token::DictStart => self.parse_dictionary(depth + 1).map(Object::Dictionary),
            other => Err(ParseError::UnexpectedToken {
                expected: "PDF object".to_string(),
                found: format!("{other:?}"),
            }),
        }
    }

    /// `N G R` is a reference; anything else puts the lookahead back.
    fn parse_integer_or_reference(&mut self, first: i64) -> ParseResult<Object> {
        let second = self.lexer.next_token()?;
        let Token::Integer(generation) = second else {
            self.lexer.push_token(second);
            return Ok(Object::Integer(first));
        };
        let third = self.lexer.next_token()?;
        if third != Token::R {
            self.lexer.push_token(third);
            self.lexer.push_token(Token::Integer(generation));
            return Ok(Object::Integer(first));
        }

        match object_id(first, generation) {
            Some(id) => Ok(Object::Reference(Reference::new(id, self.owner))),
            None if self.options.strict => Err(ParseError::SyntaxError {
                position: self.lexer.position(),
                message: format!("Invalid reference {first} {generation} R"),
            }),
            None => {
                warn!("invalid reference {} {} R read as null", first, generation);
                Ok(Object::Null)
            }
        }
    }

    fn check_depth(&self, depth: usize) -> ParseResult<()> {
        if depth > self.options.max_object_depth {
            return Err(ParseError::SyntaxError {
                position: self.lexer.position(),
                message: format!(
                    "Objects nested deeper than {}",
                    self.options.max_object_depth
                ),
            });
        }
        Ok(())
    }

    fn parse_array(&mut self, depth: usize) -> ParseResult<Object> {
        self.check_depth(depth)?;
        let mut array = Array::new();
        loop {
            match self.lexer.next_token()? {
                Token::ArrayEnd => return Ok(Object::Array(array)),
                Token::Eof => {
                    return Err(ParseError::SyntaxError {
                        position: self.lexer.position(),
                        message: "Unterminated array".to_string(),
                    })
                }
                token => array.push(self.parse_from_token(token, depth)?),
            }
        }
    }

    fn parse_dictionary(&mut self, depth: usize) -> ParseResult<Dictionary> {
        self.check_depth(depth)?;
        let mut dict = Dictionary::new();
        loop {
            let key = match self.lexer.next_token()? {
                Token::DictEnd => return Ok(dict),
                Token::Name(name) => name,
                Token::Eof => {
                    return Err(ParseError::SyntaxError {
                        position: self.lexer.position(),
                        message: "Unterminated dictionary".to_string(),
                    })
                }
                other if self.options.lenient_syntax => {
                    warn!("skipping non-name dictionary key {:?}", other);
                    continue;
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "name as dictionary key".to_string(),
                        found: format!("{other:?}"),
                    })
                }
            };

            let token = self.lexer.next_token()?;
            if token == Token::DictEnd && self.options.lenient_syntax {
                warn!("dictionary key /{} has no value", key);
                dict.set(key, Object::Null);
                return Ok(dict);
            }
            let value = self.parse_from_token(token, depth)?;
            // a null value is equivalent to an absent entry
            if !value.is_null() {
                dict.set(key, value);
            }
        }
    }

    /// Reads the bytes after `stream` up to `endstream`.
    fn parse_stream_body(&mut self, dict: Dictionary) -> ParseResult<Stream> {
        // `stream` must be followed by CRLF or LF; a lone CR is tolerated
        self.lexer.read_newline().or_else(|error| {
            if self.options.strict {
                Err(error)
            } else {
                self.lexer.skip_whitespace();
                Ok(())
            }
        })?;
        let start = self.lexer.position();

        let declared = self.declared_length(&dict);
        let data = match declared.and_then(|length| self.body_with_length(start, length)) {
            Some(data) => data,
            None if self.options.strict => {
                return Err(ParseError::SyntaxError {
                    position: start,
                    message: "Stream /Length does not match 'endstream'".to_string(),
                })
            }
            None => {
                warn!(
                    "stream at {} has a bad /Length {:?}, scanning for 'endstream'",
                    start, declared
                );
                self.body_by_scanning(start)?
            }
        };

        self.lexer.expect_keyword(Token::EndStream)?;
        let mut dict = dict;
        if declared != Some(data.len()) {
            dict.set("Length", data.len());
        }
        Ok(Stream::from_parts(dict, data, StreamState::Raw))
    }

    fn declared_length(&self, dict: &Dictionary) -> Option<usize> {
        match dict.get("Length")? {
            Object::Integer(length) => usize::try_from(*length).ok(),
            Object::Reference(reference) => self.length_resolver.and_then(|resolve| resolve(*reference)),
            _ => None,
        }
    }

    /// Takes `length` bytes when `endstream` follows them.
    fn body_with_length(&mut self, start: usize, length: usize) -> Option<Vec<u8>> {
        let data = self.lexer.data();
        let end = start.checked_add(length).filter(|end| *end <= data.len())?;
        let mut lookahead = Lexer::at(data, end);
        if lookahead.next_token().ok()? != Token::EndStream {
            return None;
        }
        self.lexer.seek(end);
        Some(data[start..end].to_vec())
    }

    fn body_by_scanning(&mut self, start: usize) -> ParseResult<Vec<u8>> {
        let data = self.lexer.data();
        let end = self
            .lexer
            .find_ahead(b"endstream")
            .ok_or_else(|| ParseError::SyntaxError {
                position: start,
                message: "Stream without 'endstream'".to_string(),
            })?;
        let mut body_end = end;
        if body_end > start && data[body_end - 1] == b'\n' {
            body_end -= 1;
        }
        if body_end > start && data[body_end - 1] == b'\r' {
            body_end -= 1;
        }
        self.lexer.seek(end);
        Ok(data[start..body_end].to_vec())
    }

    fn expect_integer(&mut self, what: &str) -> ParseResult<i64> {
        match self.lexer.next_token()? {
            Token::Integer(value) => Ok(value),
            other => Err(ParseError::UnexpectedToken {
                expected: what.to_string(),
                found: format!("{other:?}"),
            }),
        }
    }
}

/// Object numbers start at 1; generations fit in 16 bits.
pub(crate) fn object_id(number: i64, generation: i64) -> Option<ObjectId> {
    let number = u32::try_from(number).ok().filter(|number| *number > 0)?;
    let generation = u16::try_from(generation).ok()?;
    Some(ObjectId::new(number, generation))
}
