//! Deep copy of object graphs between documents.
//!
//! A copy walks the graph reachable from a root value. Every indirect object
//! met along the way gets a slot in the target before its children are
//! visited, so cycles and shared sub-objects map onto the same target
//! reference. Claimed slots are filled from a worklist, so the depth of the
//! object graph never reaches the call stack. Nothing is written to the target until the whole source graph
//! has been checked for dangling and foreign references.

use crate::error::{PdfError, Result};
use crate::objects::{Array, Dictionary, DocumentId, Name, Object, ObjectId, Reference, Stream};
use crate::registry::ObjectRegistry;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Source object to target object, kept by the target document across
/// copies so repeated copies of the same object can be shared.
pub type CopyHistory = HashMap<(DocumentId, ObjectId), ObjectId>;

#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Copy every indirect object again even if an earlier copy into the
    /// same target already produced it.
    pub allow_duplicating: bool,
    /// Keys dropped from the root dictionary (not from nested ones).
    pub excluded_keys: Vec<Name>,
}

impl CopyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_duplicating(mut self, allow: bool) -> Self {
        self.allow_duplicating = allow;
        self
    }

    pub fn exclude_key(mut self, key: impl Into<Name>) -> Self {
        self.excluded_keys.push(key.into());
        self
    }
}

/// One copy operation (possibly spanning several roots) from a source
/// registry into a target registry.
pub struct ObjectCopier<'a> {
    source: &'a ObjectRegistry,
    target: &'a mut ObjectRegistry,
    history: &'a mut CopyHistory,
    memo: HashMap<(DocumentId, ObjectId), Reference>,
    /// Source objects whose references copy as `null`
    detached: HashSet<(DocumentId, ObjectId)>,
    /// Target slots claimed but not filled yet, with their source value
    pending: Vec<(&'a Object, Reference)>,
    allow_duplicating: bool,
}

impl<'a> ObjectCopier<'a> {
    pub fn new(
        source: &'a ObjectRegistry,
        target: &'a mut ObjectRegistry,
        history: &'a mut CopyHistory,
        allow_duplicating: bool,
    ) -> Self {
        Self {
            source,
            target,
            history,
            memo: HashMap::new(),
            detached: HashSet::new(),
            pending: Vec::new(),
            allow_duplicating,
        }
    }

    /// Copies `root` with its reachable graph, returning the equivalent value
    /// in the target. Direct roots come back direct; a reference root comes
    /// back as a reference into the target.
    pub fn copy(&mut self, root: &Object, excluded_keys: &[Name]) -> Result<Object> {
        self.check(root, excluded_keys)?;
        let copied = self.copy_root(root, excluded_keys)?;
        self.fill_pending()?;
        Ok(copied)
    }

    /// Makes references to `reference` copy as `null` instead of pulling the
    /// object into the target. Objects already mapped are not affected.
    pub fn detach(&mut self, reference: Reference) {
        self.detached.insert((reference.owner(), reference.id()));
    }

    /// Takes a blank target slot standing for `source_ref`, so references to
    /// it from anything copied later land on that slot. Returns the existing
    /// slot when `source_ref` is already mapped.
    pub fn claim(&mut self, source_ref: Reference, value: &Object) -> Result<Reference> {
        self.check_source(&source_ref)?;
        let key = (source_ref.owner(), source_ref.id());
        if let Some(existing) = self.memo.get(&key) {
            return Ok(*existing);
        }
        let target_ref = self.target.register(value.new_blank_like())?;
        self.memo.insert(key, target_ref);
        Ok(target_ref)
    }

    /// Copies `value` into the target slot that stands for the source object
    /// `source_ref`, claiming it first if needed. References back to
    /// `source_ref` anywhere in the graph map onto that slot.
    ///
    /// Used for page copies, where `value` is the page dictionary with its
    /// inherited attributes already filled in.
    pub fn copy_as(
        &mut self,
        source_ref: Reference,
        value: &Object,
        excluded_keys: &[Name],
    ) -> Result<Reference> {
        self.check_copy_as(source_ref, value, excluded_keys)?;

        let target_ref = self.claim(source_ref, value)?;
        let copied = self.copy_root(value, excluded_keys)?;
        self.fill_pending()?;
        self.target.replace(target_ref.id(), copied)?;
        debug!("copied {} as {}", source_ref, target_ref);
        Ok(target_ref)
    }

    /// Runs the validation half of [`copy`](Self::copy) alone.
    pub(crate) fn check(&self, root: &Object, excluded_keys: &[Name]) -> Result<()> {
        self.validate(root, excluded_keys, HashSet::new())
    }

    /// Runs the validation half of [`copy_as`](Self::copy_as) alone, so a
    /// caller copying several roots can reject the batch before any of them
    /// lands in the target.
    pub(crate) fn check_copy_as(
        &self,
        source_ref: Reference,
        value: &Object,
        excluded_keys: &[Name],
    ) -> Result<()> {
        self.check_source(&source_ref)?;
        self.validate(value, excluded_keys, HashSet::from([source_ref.id()]))
    }

    /// Number of indirect objects mapped so far by this copier.
    pub fn mapped_count(&self) -> usize {
        self.memo.len()
    }

    /// Walks the source graph without touching the target. Fails on the
    /// first dangling or foreign reference.
    fn validate(
        &self,
        root: &Object,
        excluded_keys: &[Name],
        mut visited: HashSet<ObjectId>,
    ) -> Result<()> {
        let source: &ObjectRegistry = self.source;
        let mut stack: Vec<&Object> = Vec::new();

        match root {
            Object::Dictionary(dict) => stack.extend(
                dict.iter()
                    .filter(|(key, _)| !excluded_keys.contains(*key))
                    .map(|(_, value)| value),
            ),
            other => stack.push(other),
        }

        while let Some(object) = stack.pop() {
            match object {
                Object::Reference(reference) => {
                    self.check_source(reference)?;
                    let key = (reference.owner(), reference.id());
                    if self.memo.contains_key(&key)
                        || self.detached.contains(&key)
                        || self.reusable_copy(reference).is_some()
                        || !visited.insert(reference.id())
                    {
                        continue;
                    }
                    let value = source.resolve(reference.id())?;
                    if value.is_reference() {
                        // Chains of references must end in a direct value
                        source.resolve_deep(value)?;
                    }
                    stack.push(value);
                }
                Object::Array(array) => stack.extend(array.iter()),
                Object::Dictionary(dict) => stack.extend(dict.values()),
                Object::Stream(stream) => stack.extend(stream.dictionary().values()),
                _ => {}
            }
        }
        Ok(())
    }

    fn copy_root(&mut self, root: &Object, excluded_keys: &[Name]) -> Result<Object> {
        match root {
            Object::Dictionary(dict) => Ok(Object::Dictionary(
                self.copy_dictionary(dict, excluded_keys)?,
            )),
            other => self.copy_value(other),
        }
    }

    /// Fills every claimed slot. Copying a slot's value only claims the
    /// indirect objects it points at, so the work stays on this loop rather
    /// than on the call stack however long a chain of objects gets.
    fn fill_pending(&mut self) -> Result<()> {
        while let Some((value, target_ref)) = self.pending.pop() {
            let copied = self.copy_value(value)?;
            self.target.replace(target_ref.id(), copied)?;
        }
        Ok(())
    }

    /// Copies the direct structure of `value`. Indirect objects it meets are
    /// mapped to target slots but not filled here.
    fn copy_value(&mut self, value: &Object) -> Result<Object> {
        match value {
            Object::Reference(reference) => self.map_reference(*reference),
            Object::Array(array) => {
                let mut copied = Array::with_capacity(array.len());
                for element in array.iter() {
                    copied.push(self.copy_value(element)?);
                }
                Ok(Object::Array(copied))
            }
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.copy_dictionary(dict, &[])?)),
            Object::Stream(stream) => {
                let dictionary = self.copy_dictionary(stream.dictionary(), &[])?;
                Ok(Object::Stream(Stream::from_parts(
                    dictionary,
                    stream.data().to_vec(),
                    stream.state(),
                )))
            }
            scalar => Ok(scalar.clone()),
        }
    }

    fn copy_dictionary(&mut self, dict: &Dictionary, excluded_keys: &[Name]) -> Result<Dictionary> {
        let mut copied = Dictionary::with_capacity(dict.len());
        for (key, value) in dict.iter() {
            if excluded_keys.contains(key) {
                continue;
            }
            copied.set(key.clone(), self.copy_value(value)?);
        }
        Ok(copied)
    }

    /// The target value standing for `reference`: an existing mapping, an
    /// earlier copy, `null` for a detached object, or a freshly claimed slot
    /// queued for filling.
    fn map_reference(&mut self, reference: Reference) -> Result<Object> {
        let source: &'a ObjectRegistry = self.source;
        // An indirect object whose value is itself a reference stands for
        // the object at the end of the chain.
        let mut aliases = Vec::new();
        let mut current = reference;

        let mapped = loop {
            let key = (current.owner(), current.id());
            if let Some(existing) = self.memo.get(&key) {
                break Object::Reference(*existing);
            }
            if self.detached.contains(&key) {
                trace!("dropping detached {}", current);
                break Object::Null;
            }
            if let Some(existing) = self.reusable_copy(&current) {
                trace!("reusing earlier copy {} for {}", existing, current);
                self.memo.insert(key, existing);
                break Object::Reference(existing);
            }

            let value = source.resolve(current.id())?;
            if let Object::Reference(inner) = value {
                if aliases.contains(&key) {
                    return Err(PdfError::CircularReference(current.id()));
                }
                aliases.push(key);
                current = *inner;
                continue;
            }

            let target_ref = self.target.register(value.new_blank_like())?;
            self.memo.insert(key, target_ref);
            self.history.insert(key, target_ref.id());
            self.pending.push((value, target_ref));
            trace!("mapped {} to {}", current, target_ref);
            break Object::Reference(target_ref);
        };

        if let Object::Reference(target_ref) = mapped {
            for key in aliases {
                self.memo.insert(key, target_ref);
            }
        }
        Ok(mapped)
    }

    /// A copy of `reference` made by an earlier operation, if duplication is
    /// off and that copy is still alive in the target.
    fn reusable_copy(&self, reference: &Reference) -> Option<Reference> {
        if self.allow_duplicating {
            return None;
        }
        self.history
            .get(&(reference.owner(), reference.id()))
            .filter(|id| self.target.contains(**id))
            .map(|id| self.target.reference(*id))
    }

    fn check_source(&self, reference: &Reference) -> Result<()> {
        self.source.check_owner(reference)
    }
}

impl std::fmt::Debug for ObjectCopier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCopier")
            .field("source", &self.source.owner())
            .field("target", &self.target.owner())
            .field("mapped", &self.memo.len())
            .field("detached", &self.detached.len())
            .field("allow_duplicating", &self.allow_duplicating)
            .finish()
    }
}

/// Copies `root` and its reachable graph from `source` into `target`.
pub fn copy_object(
    source: &ObjectRegistry,
    root: &Object,
    target: &mut ObjectRegistry,
    history: &mut CopyHistory,
    options: &CopyOptions,
) -> Result<Object> {
    let mut copier = ObjectCopier::new(source, target, history, options.allow_duplicating);
    copier.copy(root, &options.excluded_keys)
}
