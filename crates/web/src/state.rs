//! Type-keyed state shared across the handlers of a route or scope.
//!
//! Values are stored once at build time and shared by reference across all
//! requests dispatched through the route; the map imposes no mutability
//! policy, so anything that needs mutation must synchronize internally
//! (e.g. `Mutex<T>` or atomics).

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

/// A map from value type to one shared instance of that type.
#[derive(Clone, Default)]
pub struct StateMap {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries.get(&TypeId::of::<T>()).cloned().and_then(|entry| entry.downcast::<T>().ok())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Overlays `other` on top of this map: on a type collision the entry
    /// from `other` wins. Scope merging relies on this, with the inner
    /// scope passed as `other`.
    pub fn merge(&mut self, other: &StateMap) {
        for (key, value) in &other.entries {
            self.entries.insert(*key, Arc::clone(value));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Debug for StateMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("StateMap").field("len", &self.entries.len()).finish()
    }
}

/// Convenience used in error messages.
pub(crate) fn state_type_name<T>() -> &'static str {
    type_name::<T>()
}
