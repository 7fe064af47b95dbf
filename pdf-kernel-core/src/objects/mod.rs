//! PDF primitive values and the identifiers that tie them to a document.

mod array;
mod dictionary;
mod name;
mod primitive;
mod reference;
mod stream;
mod string;

pub use array::Array;
pub use dictionary::Dictionary;
pub use name::Name;
pub use primitive::Object;
pub use reference::{DocumentId, ObjectId, Reference};
pub use stream::{Stream, StreamState};
pub use string::{PdfString, StringEncoding};
