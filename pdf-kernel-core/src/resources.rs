//! Page resource dictionaries and the short names content streams use to
//! refer to them.
//!
//! A [`ResourceDictionary`] is a detached, editable copy of a `/Resources`
//! dictionary. Adding a resource either returns the name already bound to
//! that exact indirect object or invents a fresh one from the category's
//! prefix (`Gs1`, `F3`, `Im2`, ...). Identity, not content, decides: two
//! equal dictionaries registered separately get two names.

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Name, Object, Reference};
use crate::registry::ObjectRegistry;
use std::collections::HashMap;
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    ExtGState,
    Font,
    /// Image XObjects
    Image,
    /// Form XObjects
    Form,
    ColorSpace,
    Pattern,
    Shading,
    Properties,
}

impl ResourceCategory {
    pub const ALL: [ResourceCategory; 8] = [
        ResourceCategory::ExtGState,
        ResourceCategory::Font,
        ResourceCategory::Image,
        ResourceCategory::Form,
        ResourceCategory::ColorSpace,
        ResourceCategory::Pattern,
        ResourceCategory::Shading,
        ResourceCategory::Properties,
    ];

    /// The key of the sub-dictionary inside `/Resources`.
    pub fn dictionary_key(&self) -> &'static str {
        match self {
            ResourceCategory::ExtGState => "ExtGState",
            ResourceCategory::Font => "Font",
            ResourceCategory::Image | ResourceCategory::Form => "XObject",
            ResourceCategory::ColorSpace => "ColorSpace",
            ResourceCategory::Pattern => "Pattern",
            ResourceCategory::Shading => "Shading",
            ResourceCategory::Properties => "Properties",
        }
    }

    pub fn name_prefix(&self) -> &'static str {
        match self {
            ResourceCategory::ExtGState => "Gs",
            ResourceCategory::Font => "F",
            ResourceCategory::Image => "Im",
            ResourceCategory::Form => "Fm",
            ResourceCategory::ColorSpace => "Cs",
            ResourceCategory::Pattern => "P",
            ResourceCategory::Shading => "Sh",
            ResourceCategory::Properties => "Pr",
        }
    }

    fn is_category_key(key: &Name) -> bool {
        Self::ALL.iter().any(|category| key == category.dictionary_key())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceDictionary {
    dictionary: Dictionary,
    /// Next number to try, per name prefix.
    counters: HashMap<&'static str, u32>,
    /// Reverse index per category key: indirect object to its first name.
    names_by_reference: HashMap<&'static str, HashMap<Reference, Name>>,
}

impl ResourceDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads an existing `/Resources` dictionary. Category sub-dictionaries
    /// stored as indirect objects are inlined; numbering continues above
    /// the highest existing suffix of each prefix.
    pub fn load(dictionary: &Dictionary, registry: &ObjectRegistry) -> Result<Self> {
        let mut resources = Self::new();
        for (key, value) in dictionary.iter() {
            let value = match value {
                Object::Reference(reference) if ResourceCategory::is_category_key(key) => {
                    registry.resolve_reference(reference)?.clone()
                }
                other => other.clone(),
            };
            resources.dictionary.set(key.clone(), value);
        }
        resources.index_existing_names();
        Ok(resources)
    }

    /// Returns the name under which `resource` is available, adding it if
    /// needed. A direct value is registered in `registry` first; an indirect
    /// one must already live there.
    pub fn add_resource(
        &mut self,
        registry: &mut ObjectRegistry,
        category: ResourceCategory,
        resource: Object,
    ) -> Result<Name> {
        let key = category.dictionary_key();
        if let Some(existing) = self.dictionary.get(key) {
            if !matches!(existing, Object::Dictionary(_)) {
                return Err(PdfError::InvalidStructure(format!(
                    "/Resources /{key} is a {}, not a dictionary",
                    existing.type_name()
                )));
            }
        }

        let reference = match resource {
            Object::Reference(reference) => {
                registry.check_owner(&reference)?;
                if !registry.contains(reference.id()) {
                    return Err(PdfError::DanglingReference(reference.id()));
                }
                if let Some(name) = self.name_of(category, &reference) {
                    return Ok(name.clone());
                }
                reference
            }
            direct => registry.register(direct)?,
        };

        let name = self.next_name(category);
        if !self.dictionary.contains_key(key) {
            self.dictionary.set(key, Dictionary::new());
        }
        if let Some(entries) = self.dictionary.get_dict_mut(key) {
            entries.set(name.clone(), Object::Reference(reference));
        }
        self.names_by_reference
            .entry(key)
            .or_default()
            .insert(reference, name.clone());

        trace!("bound {} to /{} {}", reference, key, name);
        Ok(name)
    }

    pub fn add_ext_gstate(
        &mut self,
        registry: &mut ObjectRegistry,
        state: impl Into<Object>,
    ) -> Result<Name> {
        self.add_resource(registry, ResourceCategory::ExtGState, state.into())
    }

    pub fn add_font(&mut self, registry: &mut ObjectRegistry, font: impl Into<Object>) -> Result<Name> {
        self.add_resource(registry, ResourceCategory::Font, font.into())
    }

    pub fn add_image(
        &mut self,
        registry: &mut ObjectRegistry,
        image: impl Into<Object>,
    ) -> Result<Name> {
        self.add_resource(registry, ResourceCategory::Image, image.into())
    }

    pub fn add_form(&mut self, registry: &mut ObjectRegistry, form: impl Into<Object>) -> Result<Name> {
        self.add_resource(registry, ResourceCategory::Form, form.into())
    }

    /// The name currently bound to `reference` in the category's
    /// sub-dictionary.
    pub fn name_of(&self, category: ResourceCategory, reference: &Reference) -> Option<&Name> {
        self.names_by_reference
            .get(category.dictionary_key())
            .and_then(|names| names.get(reference))
    }

    /// The value bound to `name`, usually a reference.
    pub fn get(&self, category: ResourceCategory, name: &str) -> Option<&Object> {
        self.dictionary
            .get_dict(category.dictionary_key())
            .and_then(|entries| entries.get(name))
    }

    pub fn get_reference(&self, category: ResourceCategory, name: &str) -> Option<Reference> {
        self.get(category, name).and_then(Object::as_reference)
    }

    /// All resource names, grouped by category in dictionary order.
    pub fn resource_names(&self) -> Vec<Name> {
        self.dictionary
            .iter()
            .filter(|(key, _)| ResourceCategory::is_category_key(key))
            .filter_map(|(_, value)| value.as_dict())
            .flat_map(|entries| entries.keys().cloned())
            .collect()
    }

    /// Names in one category. Images and forms share `/XObject`, so both
    /// report the same list.
    pub fn resource_names_in(&self, category: ResourceCategory) -> Vec<Name> {
        self.dictionary
            .get_dict(category.dictionary_key())
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_names().is_empty()
    }

    pub fn as_dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn into_dictionary(self) -> Dictionary {
        self.dictionary
    }

    fn next_name(&mut self, category: ResourceCategory) -> Name {
        let prefix = category.name_prefix();
        let existing = self.dictionary.get_dict(category.dictionary_key());
        let taken = |candidate: &Name| existing.is_some_and(|entries| entries.contains_name(candidate));

        let counter = self.counters.entry(prefix).or_insert(1);
        while let Some(next) = counter.checked_add(1) {
            let candidate = Name::from(format!("{prefix}{counter}"));
            *counter = next;
            if !taken(&candidate) {
                return candidate;
            }
        }

        // The counter ran out of suffixes; take the lowest one still free
        let mut suffix = 1u64;
        loop {
            let candidate = Name::from(format!("{prefix}{suffix}"));
            if !taken(&candidate) {
                warn!("/{} names exhausted, reusing free suffix {}", prefix, suffix);
                return candidate;
            }
            suffix += 1;
        }
    }

    fn index_existing_names(&mut self) {
        for category in ResourceCategory::ALL {
            let key = category.dictionary_key();
            let prefix = category.name_prefix();
            let Some(entries) = self.dictionary.get_dict(key) else {
                continue;
            };

            let mut highest = 0u32;
            for (name, value) in entries.iter() {
                if let Some(reference) = value.as_reference() {
                    self.names_by_reference
                        .entry(key)
                        .or_default()
                        .entry(reference)
                        .or_insert_with(|| name.clone());
                }
                if let Some(number) = numeric_suffix(name, prefix) {
                    highest = highest.max(number);
                }
            }

            let counter = self.counters.entry(prefix).or_insert(1);
            *counter = (*counter).max(highest.saturating_add(1));
        }
    }
}

/// `Gs12` with prefix `Gs` gives 12. Prefixes are matched exactly, so `Fm3`
/// is not an `F` name.
fn numeric_suffix(name: &Name, prefix: &str) -> Option<u32> {
    let text = name.as_str()?;
    let digits = text.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
