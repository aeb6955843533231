//! Loaded versions of one named model.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::lease::InstanceEntry;

/// Versions of a single model, at most one entry per version.
///
/// May be empty while a model is being taken down or before its first
/// version loads.
#[derive(Default)]
pub(crate) struct VersionSet {
    versions: BTreeMap<u64, Arc<InstanceEntry>>,
}

impl VersionSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Numerically greatest loaded version.
    pub(crate) fn latest(&self) -> Option<&Arc<InstanceEntry>> {
        self.versions.values().next_back()
    }

    pub(crate) fn get(&self, version: u64) -> Option<&Arc<InstanceEntry>> {
        self.versions.get(&version)
    }

    pub(crate) fn contains(&self, version: u64) -> bool {
        self.versions.contains_key(&version)
    }

    /// Insert unless the version is already loaded. Returns false on duplicates.
    pub(crate) fn insert(&mut self, entry: Arc<InstanceEntry>) -> bool {
        let version = entry.version();
        if self.versions.contains_key(&version) {
            return false;
        }
        self.versions.insert(version, entry);
        true
    }

    pub(crate) fn remove(&mut self, version: u64) -> Option<Arc<InstanceEntry>> {
        self.versions.remove(&version)
    }

    pub(crate) fn drain_all(&mut self) -> Vec<Arc<InstanceEntry>> {
        std::mem::take(&mut self.versions).into_values().collect()
    }

    /// Remove the oldest versions until at most `max` remain.
    pub(crate) fn enforce_retention(&mut self, max: usize) -> Vec<Arc<InstanceEntry>> {
        let mut evicted = Vec::new();
        while self.versions.len() > max {
            match self.versions.pop_first() {
                Some((_, entry)) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    /// Loaded versions in ascending order.
    pub(crate) fn versions(&self) -> Vec<u64> {
        self.versions.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.versions.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
