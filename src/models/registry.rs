//! Model registry: model name → loaded versions.
//!
//! The single shared mutable structure between the lifecycle path and the
//! request path. Resolution takes the read lock only long enough to pick an
//! entry and grant a lease; mutations take the write lock only long enough to
//! update the mapping. No lock is held across inference.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use super::instance::{InstanceHandle, ModelId, ModelInstance};
use super::lease::{InstanceEntry, Lease, TeardownLedger};
use super::version_set::VersionSet;
use crate::telemetry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    #[error("Model '{model}' version {version} not found")]
    VersionNotFound { model: String, version: u64 },

    #[error("Model '{0}' has no version loaded")]
    ModelUnavailable(String),
}

/// Which version of a model a request wants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSelector {
    /// Numerically greatest loaded version.
    #[default]
    Latest,
    Specific(u64),
}

impl From<Option<u64>> for VersionSelector {
    fn from(version: Option<u64>) -> Self {
        version.map_or(Self::Latest, Self::Specific)
    }
}

/// Loaded versions of one known model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    /// Ascending; empty while the model is unavailable.
    pub versions: Vec<u64>,
}

/// Thread-safe registry of servable model instances.
///
/// Read by the dispatcher, mutated only through the lifecycle manager.
pub struct ModelRegistry {
    models: RwLock<HashMap<String, VersionSet>>,
    ledger: Arc<TeardownLedger>,
    changes: watch::Sender<u64>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            models: RwLock::new(HashMap::new()),
            ledger: Arc::new(TeardownLedger::new()),
            changes,
        }
    }

    /// Resolve a model and version to a leased instance.
    ///
    /// The lease is granted under the same read lock as the lookup, so it is
    /// atomic with respect to concurrent eviction.
    pub fn resolve(&self, model: &str, selector: VersionSelector) -> Result<Lease, ResolveError> {
        let models = self.models.read();
        let set = models
            .get(model)
            .ok_or_else(|| ResolveError::ModelNotFound(model.to_string()))?;

        // An empty set only makes "latest" unavailable; a pinned version that
        // is absent is not found, whether it never loaded or was evicted.
        let entry = match selector {
            VersionSelector::Latest => set
                .latest()
                .ok_or_else(|| ResolveError::ModelUnavailable(model.to_string()))?,
            VersionSelector::Specific(version) => {
                set.get(version).ok_or_else(|| ResolveError::VersionNotFound {
                    model: model.to_string(),
                    version,
                })?
            }
        };

        entry.try_lease().ok_or_else(|| ResolveError::VersionNotFound {
            model: model.to_string(),
            version: entry.version(),
        })
    }

    /// Returns true if the name has ever been declared or published.
    pub fn contains_model(&self, model: &str) -> bool {
        self.models.read().contains_key(model)
    }

    /// Loaded versions of a model, or `None` if the name is unknown.
    pub fn versions(&self, model: &str) -> Option<Vec<u64>> {
        self.models.read().get(model).map(VersionSet::versions)
    }

    /// Every known model with its loaded versions, sorted by name.
    pub fn list_models(&self) -> Vec<ModelStatus> {
        let models = self.models.read();
        let mut statuses: Vec<ModelStatus> = models
            .iter()
            .map(|(name, set)| ModelStatus {
                name: name.clone(),
                versions: set.versions(),
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Number of known model names.
    pub fn model_count(&self) -> usize {
        self.models.read().len()
    }

    /// Number of loaded instances across all models.
    pub fn instance_count(&self) -> usize {
        self.models.read().values().map(VersionSet::len).sum()
    }

    /// Retired instances still waiting for their last lease to be released.
    pub fn pending_teardowns(&self) -> Vec<(InstanceHandle, ModelId)> {
        self.ledger.snapshot()
    }

    /// Watch channel bumped after every publication.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub(crate) fn ledger(&self) -> &Arc<TeardownLedger> {
        &self.ledger
    }

    /// Register a name without versions. Returns false if already known.
    pub(crate) fn declare(&self, model: &str) -> bool {
        let mut models = self.models.write();
        if models.contains_key(model) {
            return false;
        }
        models.insert(model.to_string(), VersionSet::new());
        true
    }

    /// Insert an instance and apply retention in one critical section.
    ///
    /// Returns the entries evicted by retention (not yet retired), or gives
    /// the instance back if its version is already loaded.
    pub(crate) fn publish(
        &self,
        instance: ModelInstance,
        max_versions: Option<usize>,
    ) -> Result<Vec<Arc<InstanceEntry>>, ModelInstance> {
        let evicted = {
            let mut models = self.models.write();
            let set = models
                .entry(instance.name().to_string())
                .or_insert_with(VersionSet::new);

            if set.contains(instance.version()) {
                return Err(instance);
            }

            set.insert(InstanceEntry::new(instance, self.ledger.clone()));
            match max_versions {
                Some(max) => set.enforce_retention(max),
                None => Vec::new(),
            }
        };

        self.changes.send_modify(|generation| *generation += 1);
        telemetry::record_models_loaded(self.instance_count());
        Ok(evicted)
    }

    /// Unmap one version. The caller retires the returned entry.
    pub(crate) fn evict(&self, model: &str, version: u64) -> Option<Arc<InstanceEntry>> {
        let removed = self
            .models
            .write()
            .get_mut(model)
            .and_then(|set| set.remove(version));
        if removed.is_some() {
            telemetry::record_models_loaded(self.instance_count());
        }
        removed
    }

    /// Unmap every version of a model, keeping the name known.
    pub(crate) fn evict_all(&self, model: &str) -> Vec<Arc<InstanceEntry>> {
        let removed = self
            .models
            .write()
            .get_mut(model)
            .map(VersionSet::drain_all)
            .unwrap_or_default();
        telemetry::record_models_loaded(self.instance_count());
        removed
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::instance::{ExecutionError, ExecutionRequest, ModelBackend};
    use crate::models::signature::SignatureMap;
    use crate::tensor::TensorMap;
    use async_trait::async_trait;

    struct NullBackend;

    #[async_trait]
    impl ModelBackend for NullBackend {
        async fn execute(&self, _request: ExecutionRequest) -> Result<TensorMap, ExecutionError> {
            Ok(TensorMap::new())
        }
    }

    fn instance(name: &str, version: u64) -> ModelInstance {
        ModelInstance::new(name, version, SignatureMap::new(), Box::new(NullBackend))
    }

    #[test]
    fn unknown_model_is_not_found() {
        let registry = ModelRegistry::new();
        let err = registry.resolve("ghost", VersionSelector::Latest).unwrap_err();
        assert_eq!(err, ResolveError::ModelNotFound("ghost".into()));
        assert!(err.to_string().contains("Model"));
    }

    #[test]
    fn declared_model_without_versions_is_unavailable() {
        let registry = ModelRegistry::new();
        assert!(registry.declare("digits"));
        assert!(!registry.declare("digits"));
        assert_eq!(
            registry.resolve("digits", VersionSelector::Latest).unwrap_err(),
            ResolveError::ModelUnavailable("digits".into())
        );
        assert_eq!(
            registry.resolve("digits", VersionSelector::Specific(1)).unwrap_err(),
            ResolveError::VersionNotFound {
                model: "digits".into(),
                version: 1
            }
        );
    }

    #[test]
    fn publish_bumps_watch_generation() {
        let registry = ModelRegistry::new();
        let rx = registry.subscribe();
        assert_eq!(*rx.borrow(), 0);
        registry.publish(instance("m", 1), None).unwrap();
        assert_eq!(*rx.borrow(), 1);
    }

    #[test]
    fn publish_duplicate_returns_instance() {
        let registry = ModelRegistry::new();
        registry.publish(instance("m", 1), None).unwrap();
        let dup = registry.publish(instance("m", 1), None).unwrap_err();
        assert_eq!(dup.version(), 1);
        assert_eq!(registry.instance_count(), 1);
    }

    #[test]
    fn list_models_sorted_by_name() {
        let registry = ModelRegistry::new();
        registry.publish(instance("zeta", 2), None).unwrap();
        registry.publish(instance("alpha", 1), None).unwrap();
        registry.declare("mid");
        let names: Vec<String> = registry.list_models().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(registry.model_count(), 3);
        assert_eq!(registry.instance_count(), 2);
    }

    #[test]
    fn evicted_entry_stops_resolving() {
        let registry = ModelRegistry::new();
        registry.publish(instance("m", 1), None).unwrap();
        let entry = registry.evict("m", 1).unwrap();
        entry.retire();
        assert_eq!(
            registry.resolve("m", VersionSelector::Specific(1)).unwrap_err(),
            ResolveError::VersionNotFound {
                model: "m".into(),
                version: 1
            }
        );
        assert_eq!(
            registry.resolve("m", VersionSelector::Latest).unwrap_err(),
            ResolveError::ModelUnavailable("m".into())
        );
        assert!(registry.evict("m", 1).is_none());
    }
}
