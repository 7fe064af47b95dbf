//! # pdf_kernel
//!
//! The object layer of a PDF library: the document model, the registry of
//! indirect objects, a cross-document copier and a per-page resource
//! manager, plus a reader and writer for the file format.
//!
//! ## Features
//!
//! - **Object model**: null, booleans, numbers, strings, names, arrays,
//!   dictionaries, streams and references bound to their document
//! - **Registry**: numbered slots with free-list reuse and generation
//!   tracking, loaded lazily from the source file
//! - **Copying**: deep copies between documents that keep shared structure
//!   and cycles intact
//! - **Resources**: stable names for fonts, graphics states and other page
//!   resources, reusing the name already given to an object
//! - **Reading and writing**: classic and stream cross-reference tables,
//!   object streams, incremental updates and broken-file recovery
//!
//! ## Quick Start
//!
//! ```rust
//! use pdf_kernel::{Document, ExtGState, Rectangle, Result};
//!
//! # fn main() -> Result<()> {
//! let mut doc = Document::new();
//! doc.set_title("My PDF");
//!
//! let page = doc.add_new_page(Rectangle::a4())?;
//! let name = doc.add_ext_gstate(&page, ExtGState::new().with_alpha(0.5))?;
//! assert_eq!(name.as_str(), Some("Gs1"));
//!
//! let bytes = doc.to_bytes()?;
//! assert!(bytes.starts_with(b"%PDF-1.7"));
//! # Ok(())
//! # }
//! ```
//!
//! ### Merging documents
//!
//! ```rust,no_run
//! use pdf_kernel::Document;
//!
//! # fn main() -> pdf_kernel::Result<()> {
//! let mut merged = Document::open("first.pdf")?;
//! let second = Document::open("second.pdf")?;
//! merged.append_document(&second)?;
//! merged.save("merged.pdf")?;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod copy;
pub mod document;
pub mod error;
pub mod geometry;
pub mod graphics;
pub mod objects;
pub mod parser;
pub mod registry;
pub mod resources;
pub mod writer;

// Re-export commonly used types
pub use copy::{CopyOptions, ObjectCopier};
pub use document::{Document, DocumentInfo};
pub use error::{PdfError, Result};
pub use geometry::{Point, Rectangle};
pub use graphics::ExtGState;
pub use objects::{Array, Dictionary, Name, Object, ObjectId, PdfString, Reference, Stream};
pub use parser::{ParseError, ParseOptions};
pub use registry::ObjectRegistry;
pub use resources::{ResourceCategory, ResourceDictionary};
pub use writer::WriterConfig;

/// Current version of pdf_kernel
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
