//! Per-cycle status cache

use crate::models::{CheckOutcome, Resource, ResourceInstance};
use std::collections::HashMap;

/// Identity under which an outcome is cached
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Cluster singletons share one entry per kind
    Singleton(ResourceInstance),
    Resource(String),
}

impl CacheKey {
    pub fn for_resource(resource: &Resource) -> Self {
        if resource.instance.is_singleton() {
            CacheKey::Singleton(resource.instance)
        } else {
            CacheKey::Resource(resource.id.clone())
        }
    }
}

/// Outcomes already computed during the current reconciliation cycle
///
/// Create a fresh cache per cycle. The first write for a key wins.
#[derive(Debug, Default)]
pub struct StatusCache {
    entries: HashMap<CacheKey, Option<CheckOutcome>>,
}

impl StatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prior outcome for this resource, if one was computed this cycle
    ///
    /// The inner `None` is a cached "not observable" result.
    pub fn get(&self, resource: &Resource) -> Option<Option<CheckOutcome>> {
        self.entries.get(&CacheKey::for_resource(resource)).cloned()
    }

    /// Store an outcome unless one is already present; returns whether it was stored
    pub fn set(&mut self, resource: &Resource, outcome: Option<CheckOutcome>) -> bool {
        match self.entries.entry(CacheKey::for_resource(resource)) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(outcome);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
