//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2. The lexer
//! works over an in-memory byte slice so callers can jump to any offset
//! named by the cross-reference table.

use super::{ParseError, ParseResult};
use crate::objects::Name;

/// PDF Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Boolean(bool),
    Integer(i64),
    Real(f64),

    /// Literal string, escapes already applied
    String(Vec<u8>),

    /// Hexadecimal string, decoded
    HexString(Vec<u8>),

    /// Name with `#xx` escapes decoded
    Name(Name),

    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,

    Stream,
    EndStream,
    Obj,
    EndObj,

    /// The `R` of an indirect reference
    R,
    Null,

    Xref,
    Trailer,
    StartXRef,

    /// Comment text without the leading `%`
    Comment(Vec<u8>),

    Eof,
}

/// PDF Lexer for tokenizing PDF content
pub struct Lexer<'a> {
    data: &'a [u8],
    position: usize,
    token_buffer: Vec<Token>,
}

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\0' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delimiter(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

impl<'a> Lexer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::at(data, 0)
    }

    /// A lexer starting at byte `position`.
    pub fn at(data: &'a [u8], position: usize) -> Self {
        Self {
            data,
            position: position.min(data.len()),
            token_buffer: Vec::new(),
        }
    }

    /// Get the next token, skipping comments
    pub fn next_token(&mut self) -> ParseResult<Token> {
        loop {
            match self.next_raw_token()? {
                Token::Comment(_) => continue,
                token => return Ok(token),
            }
        }
    }

    /// Get the next token, comments included
    pub fn next_raw_token(&mut self) -> ParseResult<Token> {
        // Check if we have a pushed-back token
        if let Some(token) = self.token_buffer.pop() {
            return Ok(token);
        }

        self.skip_whitespace();

        let ch = match self.peek_char() {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'%' => Ok(self.read_comment()),
            b'/' => Ok(self.read_name()),
            b'(' => self.read_literal_string(),
            b'<' => self.read_angle_bracket(),
            b'>' => {
                self.consume_char();
                if self.peek_char() == Some(b'>') {
                    self.consume_char();
                    Ok(Token::DictEnd)
                } else {
                    Err(self.syntax_error("Expected '>' after '>'"))
                }
            }
            b'[' => {
                self.consume_char();
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.consume_char();
                Ok(Token::ArrayEnd)
            }
            b'+' | b'-' | b'0'..=b'9' | b'.' => self.read_number(),
            _ if ch.is_ascii_alphabetic() => self.read_keyword(),
            _ => Err(self.syntax_error(&format!("Unexpected character: {}", ch as char))),
        }
    }

    /// Push back a token to be returned by the next call to next_token
    pub fn push_token(&mut self, token: Token) {
        self.token_buffer.push(token);
    }

    /// Current byte offset. Pushed-back tokens are not accounted for.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Moves to `position` and drops pushed-back tokens.
    pub fn seek(&mut self, position: usize) {
        self.position = position.min(self.data.len());
        self.token_buffer.clear();
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_eof(&self) -> bool {
        self.token_buffer.is_empty() && self.position >= self.data.len()
    }

    fn peek_char(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    fn consume_char(&mut self) -> Option<u8> {
        let ch = self.peek_char();
        if ch.is_some() {
            self.position += 1;
        }
        ch
    }

    /// Skip whitespace and return the number of bytes skipped
    pub(crate) fn skip_whitespace(&mut self) -> usize {
        let start = self.position;
        while self.peek_char().is_some_and(is_whitespace) {
            self.position += 1;
        }
        self.position - start
    }

    fn syntax_error(&self, message: &str) -> ParseError {
        ParseError::SyntaxError {
            position: self.position,
            message: message.to_string(),
        }
    }

    fn read_comment(&mut self) -> Token {
        self.consume_char(); // consume '%'
        let start = self.position;
        while self.peek_char().is_some_and(|ch| ch != b'\n' && ch != b'\r') {
            self.position += 1;
        }
        Token::Comment(self.data[start..self.position].to_vec())
    }

    fn read_name(&mut self) -> Token {
        self.consume_char(); // consume '/'
        let raw = self.read_word();
        Token::Name(Name::from_escaped(raw))
    }

    fn read_literal_string(&mut self) -> ParseResult<Token> {
        self.consume_char(); // consume '('
        let mut string = Vec::new();
        let mut paren_depth = 1;

        while paren_depth > 0 {
            let ch = self
                .consume_char()
                .ok_or_else(|| self.syntax_error("Unterminated string"))?;

            match ch {
                b'\\' => {
                    let escaped = self
                        .consume_char()
                        .ok_or_else(|| self.syntax_error("Unterminated string"))?;
                    match escaped {
                        b'n' => string.push(b'\n'),
                        b'r' => string.push(b'\r'),
                        b't' => string.push(b'\t'),
                        b'b' => string.push(b'\x08'),
                        b'f' => string.push(b'\x0C'),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match self.peek_char() {
                                    Some(next @ b'0'..=b'7') => {
                                        self.consume_char();
                                        value = value * 8 + u32::from(next - b'0');
                                    }
                                    _ => break,
                                }
                            }
                            // high-order overflow is ignored
                            string.push((value & 0xFF) as u8);
                        }
                        // line continuation
                        b'\r' => {
                            if self.peek_char() == Some(b'\n') {
                                self.consume_char();
                            }
                        }
                        b'\n' => {}
                        // \( \) \\ and unknown escapes stand for the byte itself
                        other => string.push(other),
                    }
                }
                b'(' => {
                    string.push(ch);
                    paren_depth += 1;
                }
                b')' => {
                    paren_depth -= 1;
                    if paren_depth > 0 {
                        string.push(ch);
                    }
                }
                b'\r' => {
                    if self.peek_char() == Some(b'\n') {
                        self.consume_char();
                    }
                    string.push(b'\n');
                }
                _ => string.push(ch),
            }
        }

        Ok(Token::String(string))
    }

    /// Read angle bracket tokens (hex strings or dict markers)
    fn read_angle_bracket(&mut self) -> ParseResult<Token> {
        self.consume_char(); // consume '<'

        if self.peek_char() == Some(b'<') {
            self.consume_char();
            return Ok(Token::DictStart);
        }

        let mut digits = Vec::new();
        loop {
            let ch = self
                .consume_char()
                .ok_or_else(|| self.syntax_error("Unterminated hex string"))?;
            if ch == b'>' {
                break;
            }
            if ch.is_ascii_hexdigit() {
                digits.push(ch);
            } else if !is_whitespace(ch) {
                return Err(self.syntax_error("Invalid character in hex string"));
            }
        }

        // Pad with 0 if odd number of digits
        if digits.len() % 2 != 0 {
            digits.push(b'0');
        }
        let bytes = hex::decode(&digits).map_err(|_| self.syntax_error("Invalid hex string"))?;
        Ok(Token::HexString(bytes))
    }

    /// Read a number (integer or real)
    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let mut has_dot = false;
        let mut has_digit = false;

        if matches!(self.peek_char(), Some(b'+' | b'-')) {
            self.consume_char();
        }
        while let Some(ch) = self.peek_char() {
            match ch {
                b'0'..=b'9' => has_digit = true,
                b'.' if !has_dot => has_dot = true,
                _ => break,
            }
            self.consume_char();
        }

        // Scientific notation is not PDF syntax but some producers write it
        if has_digit && matches!(self.peek_char(), Some(b'e' | b'E')) {
            let mark = self.position;
            self.consume_char();
            if matches!(self.peek_char(), Some(b'+' | b'-')) {
                self.consume_char();
            }
            if self.peek_char().is_some_and(|ch| ch.is_ascii_digit()) {
                while self.peek_char().is_some_and(|ch| ch.is_ascii_digit()) {
                    self.consume_char();
                }
                has_dot = true;
            } else {
                self.position = mark;
            }
        }

        let text = String::from_utf8_lossy(&self.data[start..self.position]);
        if !has_digit {
            return Err(ParseError::SyntaxError {
                position: start,
                message: format!("Invalid number: '{text}'"),
            });
        }

        if has_dot {
            text.parse::<f64>()
                .map(Token::Real)
                .map_err(|_| ParseError::SyntaxError {
                    position: start,
                    message: format!("Invalid real number: '{text}'"),
                })
        } else {
            match text.parse::<i64>() {
                Ok(value) => Ok(Token::Integer(value)),
                // integers beyond i64 degrade to reals
                Err(_) => text
                    .parse::<f64>()
                    .map(Token::Real)
                    .map_err(|_| ParseError::SyntaxError {
                        position: start,
                        message: format!("Invalid integer: '{text}'"),
                    }),
            }
        }
    }

    fn read_keyword(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let word = self.read_word();
        match word {
            b"true" => Ok(Token::Boolean(true)),
            b"false" => Ok(Token::Boolean(false)),
            b"null" => Ok(Token::Null),
            b"R" => Ok(Token::R),
            b"obj" => Ok(Token::Obj),
            b"endobj" => Ok(Token::EndObj),
            b"stream" => Ok(Token::Stream),
            b"endstream" => Ok(Token::EndStream),
            b"xref" => Ok(Token::Xref),
            b"trailer" => Ok(Token::Trailer),
            b"startxref" => Ok(Token::StartXRef),
            _ => Err(ParseError::SyntaxError {
                position: start,
                message: format!("Unknown keyword: {}", String::from_utf8_lossy(word)),
            }),
        }
    }

    /// Read a word (sequence of non-delimiter characters)
    pub(crate) fn read_word(&mut self) -> &'a [u8] {
        let start = self.position;
        while self
            .peek_char()
            .is_some_and(|ch| !is_whitespace(ch) && !is_delimiter(ch))
        {
            self.position += 1;
        }
        let data = self.data;
        &data[start..self.position]
    }

    /// Read a newline sequence (CR, LF, or CRLF)
    pub fn read_newline(&mut self) -> ParseResult<()> {
        match self.peek_char() {
            Some(b'\r') => {
                self.consume_char();
                if self.peek_char() == Some(b'\n') {
                    self.consume_char();
                }
                Ok(())
            }
            Some(b'\n') => {
                self.consume_char();
                Ok(())
            }
            _ => Err(self.syntax_error("Expected newline")),
        }
    }

    /// Read exactly n bytes
    pub fn read_bytes(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.syntax_error(&format!("Expected {n} more bytes")))?;
        let data = self.data;
        let bytes = &data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Offset of the next occurrence of `sequence` at or after the current position.
    pub fn find_ahead(&self, sequence: &[u8]) -> Option<usize> {
        find_bytes(&self.data[self.position..], sequence).map(|index| self.position + index)
    }

    /// Expect a specific keyword token
    pub fn expect_keyword(&mut self, expected: Token) -> ParseResult<()> {
        let token = self.next_token()?;
        if token == expected {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("{expected:?}"),
                found: format!("{token:?}"),
            })
        }
    }
}

pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

pub(crate) fn rfind_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .rposition(|window| window == needle)
}
