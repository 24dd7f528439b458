//! Registry of named change units
//!
//! Built once by the wiring layer and handed to the engine; never modified
//! afterwards.

use crate::change::Change;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable, ordered mapping of change names to change units
#[derive(Debug, Default)]
pub struct Registry {
    changes: Vec<Arc<dyn Change>>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Build a registry, preserving registration order
    ///
    /// Fails with [`Error::DuplicateName`] if two changes share a name.
    pub fn new(changes: Vec<Arc<dyn Change>>) -> Result<Self> {
        let mut index = HashMap::with_capacity(changes.len());
        for (i, change) in changes.iter().enumerate() {
            if index.insert(change.name().to_string(), i).is_some() {
                return Err(Error::DuplicateName(change.name().to_string()));
            }
        }
        Ok(Self { changes, index })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Change>> {
        self.index.get(name).map(|&i| &self.changes[i])
    }

    /// Changes in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Change>> {
        self.changes.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Resolve a selection of names, in the order given
    ///
    /// Repeated names are kept once, at their first position. Any unknown
    /// name fails the whole selection.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<dyn Change>>> {
        if names.is_empty() {
            return Err(Error::EmptySelection);
        }

        let mut selected: Vec<Arc<dyn Change>> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let change = self.get(name).ok_or_else(|| Error::UnknownChange {
                name: name.to_string(),
                available: self.names(),
            })?;
            if !selected.iter().any(|c| Arc::ptr_eq(c, change)) {
                selected.push(Arc::clone(change));
            }
        }
        Ok(selected)
    }
}
