use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Object number plus generation, as written in `12 0 R`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    number: u32,
    generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// Process-unique identity of a document.
///
/// Every registry draws a fresh value on creation, so two documents never
/// share one even when they are loaded from the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    pub(crate) fn next() -> Self {
        static NEXT_DOCUMENT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_DOCUMENT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handle to an indirect object: the slot identifier plus the document
/// whose registry owns the slot.
///
/// Two references are equal exactly when both the owner and the identifier
/// match; a reference never compares equal to the object it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reference {
    id: ObjectId,
    owner: DocumentId,
}

impl Reference {
    pub(crate) fn new(id: ObjectId, owner: DocumentId) -> Self {
        Self { id, owner }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn owner(&self) -> DocumentId {
        self.owner
    }

    pub fn number(&self) -> u32 {
        self.id.number()
    }

    pub fn generation(&self) -> u16 {
        self.id.generation()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
