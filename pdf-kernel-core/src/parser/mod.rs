//! PDF Parser Module
//!
//! Reads the byte form of a PDF: the lexer splits bytes into tokens, the
//! object parser builds [`Object`](crate::objects::Object) values from them,
//! and the xref reader locates every object so the [`PdfReader`] can hand
//! the registry deferred slots that parse on first use.

pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod reader;
pub mod xref;

pub use self::lexer::{Lexer, Token};
pub use self::objects::ObjectParser;
pub use self::reader::PdfReader;
pub use self::xref::{XRefEntry, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref table")]
    InvalidXRef,

    #[error("Invalid trailer")]
    InvalidTrailer,

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Encryption not supported")]
    EncryptionNotSupported,
}

/// How forgiving the reader is with malformed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fail on the first structural problem instead of recovering
    pub strict: bool,
    /// Skip malformed dictionary entries and tolerate missing keywords
    pub lenient_syntax: bool,
    /// Deepest array/dictionary nesting accepted in one object
    pub max_object_depth: usize,
}

impl ParseOptions {
    pub fn strict() -> Self {
        Self {
            strict: true,
            lenient_syntax: false,
            max_object_depth: 256,
        }
    }

    /// Recovers from broken xref tables and stream lengths where possible.
    pub fn lenient() -> Self {
        Self {
            strict: false,
            lenient_syntax: true,
            max_object_depth: 512,
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            lenient_syntax: false,
            max_object_depth: 256,
        }
    }
}
