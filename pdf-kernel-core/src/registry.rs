//! Per-document table of indirect objects.
//!
//! Every indirect object lives in a numbered slot. A slot is either live
//! (loaded, or deferred until first access) or free. Freeing a slot bumps
//! its generation so that stale references to the old occupant resolve to
//! an error instead of silently reaching the new one.
//!
//! ```rust
//! use pdf_kernel::objects::{Dictionary, Object};
//! use pdf_kernel::registry::ObjectRegistry;
//!
//! let mut registry = ObjectRegistry::new();
//! let reference = registry.register(Object::Dictionary(Dictionary::new())).unwrap();
//! assert!(registry.resolve(reference.id()).unwrap().as_dict().is_some());
//!
//! registry.free(reference.id()).unwrap();
//! assert!(registry.resolve(reference.id()).is_err());
//! ```

use crate::error::{PdfError, Result};
use crate::objects::{DocumentId, Object, ObjectId, Reference};
use std::cell::{OnceCell, RefCell};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, trace};

/// Highest generation a slot can carry. A number whose generation reaches
/// it is never handed out again.
pub const MAX_GENERATION: u16 = u16::MAX;

/// Where the bytes of a not-yet-loaded object live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectLocation {
    /// Byte offset of `N G obj` in the source.
    Offset(u64),
    /// Entry `index` of the object stream with object number `stream`.
    InStream { stream: u32, index: u32 },
}

/// Produces the value of a deferred slot on first access.
///
/// The registry is passed back so a loader can resolve what it needs along
/// the way, such as an indirect `/Length` or the object stream holding the
/// requested object.
pub trait ObjectLoader: Send {
    fn load(&self, id: ObjectId, location: ObjectLocation, registry: &ObjectRegistry)
        -> Result<Object>;
}

enum SlotState {
    Deferred {
        location: ObjectLocation,
        cell: OnceCell<Object>,
    },
    Loaded(Object),
    Free {
        next_free: Option<u32>,
    },
}

struct Slot {
    generation: u16,
    state: SlotState,
}

impl Slot {
    fn free(generation: u16) -> Self {
        Self {
            generation,
            state: SlotState::Free { next_free: None },
        }
    }

    fn is_live(&self) -> bool {
        !matches!(self.state, SlotState::Free { .. })
    }
}

pub struct ObjectRegistry {
    owner: DocumentId,
    /// Indexed by object number. Slot 0 is the permanent head of the free
    /// list and never holds an object.
    slots: Vec<Slot>,
    free_head: Option<u32>,
    loader: Option<Box<dyn ObjectLoader>>,
    loading: RefCell<HashSet<u32>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self {
            owner: DocumentId::next(),
            slots: vec![Slot::free(MAX_GENERATION)],
            free_head: None,
            loader: None,
            loading: RefCell::new(HashSet::new()),
        }
    }

    pub fn owner(&self) -> DocumentId {
        self.owner
    }

    /// Wraps an identifier of this registry into a reference.
    pub fn reference(&self, id: ObjectId) -> Reference {
        Reference::new(id, self.owner)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One past the highest object number ever used; the xref `/Size`.
    pub fn size(&self) -> u32 {
        self.slots.len() as u32
    }

    /// True when `id` names a live slot with a matching generation.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.live_slot(id).is_some()
    }

    /// True when the slot holds its value in memory. Deferred slots become
    /// loaded on first resolution.
    pub fn is_loaded(&self, id: ObjectId) -> bool {
        match self.live_slot(id).map(|slot| &slot.state) {
            Some(SlotState::Loaded(_)) => true,
            Some(SlotState::Deferred { cell, .. }) => cell.get().is_some(),
            _ => false,
        }
    }

    /// Stores a direct value in a fresh slot and returns its reference.
    ///
    /// Reuses the lowest-numbered free slot first, with the generation
    /// bumped when that slot was freed.
    ///
    /// A value that is itself a reference is rejected, as is a value holding
    /// a reference owned by another document at any depth.
    pub fn register(&mut self, value: Object) -> Result<Reference> {
        if let Object::Reference(existing) = &value {
            return Err(PdfError::AlreadyIndirect(existing.id()));
        }
        self.check_references(&value)?;

        let id = match self.free_head {
            Some(number) => {
                let slot = &mut self.slots[number as usize];
                self.free_head = match slot.state {
                    SlotState::Free { next_free } => next_free,
                    _ => None,
                };
                slot.state = SlotState::Loaded(value);
                ObjectId::new(number, slot.generation)
            }
            None => {
                let number = u32::try_from(self.slots.len()).map_err(|_| {
                    PdfError::InvalidStructure("object number space exhausted".to_string())
                })?;
                self.slots.push(Slot {
                    generation: 0,
                    state: SlotState::Loaded(value),
                });
                ObjectId::new(number, 0)
            }
        };

        debug!("registered object {}", id);
        Ok(Reference::new(id, self.owner))
    }

    /// Returns the value behind `id`, loading it on first access.
    ///
    /// Repeated calls hand back the same value; the first completed load
    /// is the one every caller sees.
    pub fn resolve(&self, id: ObjectId) -> Result<&Object> {
        let slot = self
            .live_slot(id)
            .ok_or(PdfError::DanglingReference(id))?;

        match &slot.state {
            SlotState::Loaded(object) => Ok(object),
            SlotState::Deferred { location, cell } => {
                if let Some(object) = cell.get() {
                    return Ok(object);
                }
                let object = self.load(id, *location)?;
                // A nested load of the same slot may have won the race; keep it.
                let _ = cell.set(object);
                cell.get().ok_or(PdfError::DanglingReference(id))
            }
            SlotState::Free { .. } => Err(PdfError::DanglingReference(id)),
        }
    }

    /// Like [`resolve`](Self::resolve), but also checks that the reference
    /// belongs to this registry.
    pub fn resolve_reference(&self, reference: &Reference) -> Result<&Object> {
        self.check_owner(reference)?;
        self.resolve(reference.id())
    }

    /// Follows references until a direct value is reached.
    pub fn resolve_deep<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        let mut current = object;
        let mut seen = HashSet::new();
        while let Object::Reference(reference) = current {
            if !seen.insert(reference.id()) {
                return Err(PdfError::CircularReference(reference.id()));
            }
            current = self.resolve_reference(reference)?;
        }
        Ok(current)
    }

    pub fn resolve_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.materialize(id)?;
        match self.live_slot_mut(id).map(|slot| &mut slot.state) {
            Some(SlotState::Loaded(object)) => Ok(object),
            _ => Err(PdfError::DanglingReference(id)),
        }
    }

    /// Swaps the value of a live slot, returning the previous value.
    pub fn replace(&mut self, id: ObjectId, value: Object) -> Result<Object> {
        if let Object::Reference(existing) = &value {
            return Err(PdfError::AlreadyIndirect(existing.id()));
        }
        self.check_references(&value)?;
        let slot = self.resolve_mut(id)?;
        Ok(std::mem::replace(slot, value))
    }

    /// Releases a slot. The number goes back on the free list with its
    /// generation bumped; once the generation reaches [`MAX_GENERATION`]
    /// the number is retired instead.
    pub fn free(&mut self, id: ObjectId) -> Result<()> {
        let slot = self
            .live_slot_mut(id)
            .ok_or(PdfError::DanglingReference(id))?;

        slot.generation = slot.generation.saturating_add(1);
        slot.state = SlotState::Free { next_free: None };
        if slot.generation == MAX_GENERATION {
            debug!("freed object {}; number retired", id);
        } else {
            debug!("freed object {}", id);
        }

        self.sort_free_list();
        Ok(())
    }

    /// Identifiers of all live slots, ascending by object number.
    pub fn iter_live(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_live())
            .map(|(number, slot)| ObjectId::new(number as u32, slot.generation))
    }

    /// Free object numbers with the generation the next occupant will get,
    /// ascending, excluding slot 0.
    pub fn free_entries(&self) -> Vec<(u32, u16)> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, slot)| !slot.is_live())
            .map(|(number, slot)| (number as u32, slot.generation))
            .collect()
    }

    /// The chain of numbers `register` will hand out next, in order.
    pub fn free_chain(&self) -> Vec<u32> {
        let mut chain = Vec::new();
        let mut next = self.free_head;
        while let Some(number) = next {
            chain.push(number);
            next = match self.slots.get(number as usize).map(|slot| &slot.state) {
                Some(SlotState::Free { next_free }) => *next_free,
                _ => None,
            };
        }
        chain
    }

    /// Rejects any reference, at any depth of a direct value, that another
    /// document owns.
    pub(crate) fn check_references(&self, object: &Object) -> Result<()> {
        let mut stack = vec![object];
        while let Some(current) = stack.pop() {
            match current {
                Object::Reference(reference) => self.check_owner(reference)?,
                Object::Array(array) => stack.extend(array.iter()),
                Object::Dictionary(dict) => stack.extend(dict.values()),
                Object::Stream(stream) => stack.extend(stream.dictionary().values()),
                _ => {}
            }
        }
        Ok(())
    }

    pub(crate) fn check_owner(&self, reference: &Reference) -> Result<()> {
        if reference.owner() != self.owner {
            return Err(PdfError::ForeignObject {
                id: reference.id(),
                expected: self.owner,
                found: reference.owner(),
            });
        }
        Ok(())
    }

    pub(crate) fn set_loader(&mut self, loader: Box<dyn ObjectLoader>) {
        self.loader = Some(loader);
    }

    /// Declares a live slot whose value is read from the source on demand.
    pub(crate) fn insert_deferred(&mut self, id: ObjectId, location: ObjectLocation) {
        self.ensure_slot(id.number());
        self.slots[id.number() as usize] = Slot {
            generation: id.generation(),
            state: SlotState::Deferred {
                location,
                cell: OnceCell::new(),
            },
        };
    }

    /// Places an already materialized value at a known identifier.
    pub(crate) fn insert_loaded(&mut self, id: ObjectId, value: Object) {
        self.ensure_slot(id.number());
        self.slots[id.number() as usize] = Slot {
            generation: id.generation(),
            state: SlotState::Loaded(value),
        };
    }

    /// Declares a free slot whose next occupant gets `generation`.
    pub(crate) fn insert_free(&mut self, number: u32, generation: u16) {
        self.ensure_slot(number);
        self.slots[number as usize] = Slot::free(generation);
    }

    /// Links every reusable free slot into the free list, lowest first.
    pub(crate) fn rebuild_free_chain(&mut self) {
        self.slots[0] = Slot::free(MAX_GENERATION);
        self.sort_free_list();
    }

    fn sort_free_list(&mut self) {
        let reusable: Vec<u32> = self
            .slots
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, slot)| !slot.is_live() && slot.generation < MAX_GENERATION)
            .map(|(number, _)| number as u32)
            .collect();

        for pair in reusable.windows(2) {
            self.slots[pair[0] as usize].state = SlotState::Free {
                next_free: Some(pair[1]),
            };
        }
        if let Some(&last) = reusable.last() {
            self.slots[last as usize].state = SlotState::Free { next_free: None };
        }
        self.free_head = reusable.first().copied();
    }

    fn ensure_slot(&mut self, number: u32) {
        let wanted = number as usize + 1;
        if self.slots.len() < wanted {
            self.slots.resize_with(wanted, || Slot::free(0));
        }
    }

    fn live_slot(&self, id: ObjectId) -> Option<&Slot> {
        if id.number() == 0 {
            return None;
        }
        self.slots
            .get(id.number() as usize)
            .filter(|slot| slot.is_live() && slot.generation == id.generation())
    }

    fn live_slot_mut(&mut self, id: ObjectId) -> Option<&mut Slot> {
        if id.number() == 0 {
            return None;
        }
        self.slots
            .get_mut(id.number() as usize)
            .filter(|slot| slot.is_live() && slot.generation == id.generation())
    }

    /// Turns a deferred slot into a loaded one so it can be mutated.
    fn materialize(&mut self, id: ObjectId) -> Result<()> {
        self.resolve(id)?;
        let slot = self
            .live_slot_mut(id)
            .ok_or(PdfError::DanglingReference(id))?;
        let value = match &mut slot.state {
            SlotState::Deferred { cell, .. } => cell.take(),
            _ => return Ok(()),
        };
        slot.state = SlotState::Loaded(value.ok_or(PdfError::DanglingReference(id))?);
        Ok(())
    }

    fn load(&self, id: ObjectId, location: ObjectLocation) -> Result<Object> {
        let loader = self.loader.as_ref().ok_or_else(|| {
            PdfError::InvalidStructure(format!("no source available to load object {id}"))
        })?;

        if !self.loading.borrow_mut().insert(id.number()) {
            return Err(PdfError::CircularReference(id));
        }
        trace!("loading object {} from {:?}", id, location);
        let result = loader.load(id, location, self);
        self.loading.borrow_mut().remove(&id.number());

        let object = result?;
        if let Object::Reference(target) = &object {
            self.check_owner(target)?;
        }
        Ok(object)
    }
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("owner", &self.owner)
            .field("size", &self.slots.len())
            .field("live", &self.len())
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}
