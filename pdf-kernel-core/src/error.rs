use crate::objects::{DocumentId, ObjectId};
use crate::parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    /// The identifier names a freed slot or a slot that never existed.
    #[error("Dangling reference: {0}")]
    DanglingReference(ObjectId),

    /// The value already owns a registry slot.
    #[error("Object {0} is already indirect")]
    AlreadyIndirect(ObjectId),

    /// A reference owned by one document was used where another document was expected.
    #[error("Object {id} belongs to document {found}, expected document {expected}")]
    ForeignObject {
        id: ObjectId,
        expected: DocumentId,
        found: DocumentId,
    },

    #[error("Circular reference while loading object {0}")]
    CircularReference(ObjectId),

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("Invalid page number: {0}")]
    InvalidPageNumber(usize),
}

pub type Result<T> = std::result::Result<T, PdfError>;
