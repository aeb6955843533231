//! Lifecycle management: applies loader availability events to the registry.
//!
//! All registry mutations funnel through [`LifecycleManager`], which
//! serializes them and enforces the retention policy. Evicted instances are
//! unmapped immediately and torn down once their last lease is released.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::instance::{InstanceHandle, ModelId, ModelInstance};
use super::lease::InstanceEntry;
use super::registry::ModelRegistry;
use crate::telemetry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrainError {
    #[error("teardown of instance {0} timed out waiting for in-flight requests")]
    Timeout(u64),
}

/// How many versions of each model stay loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// `None` keeps every published version.
    pub max_versions: Option<usize>,
}

impl RetentionPolicy {
    pub fn keep_latest(max_versions: usize) -> Self {
        Self {
            max_versions: Some(max_versions.max(1)),
        }
    }

    pub fn unlimited() -> Self {
        Self { max_versions: None }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::keep_latest(2)
    }
}

/// Availability events emitted by the external loader.
///
/// Delivered at least once and ordered per (model, version).
#[derive(Debug)]
pub enum LoaderEvent {
    /// A model name exists but no version has loaded yet.
    Declared(String),
    Available(ModelInstance),
    Unavailable { model: String, version: u64 },
    /// Every version of the model is going away.
    TakenDown(String),
}

/// Result of an availability event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published {
        id: ModelId,
        handle: InstanceHandle,
        /// Versions retired by the retention policy.
        evicted: Vec<u64>,
    },
    /// The version was already serving; the new instance was released.
    Duplicate(ModelId),
}

/// Create a bounded loader feed for [`LifecycleManager::run`].
pub fn loader_feed(capacity: usize) -> (mpsc::Sender<LoaderEvent>, mpsc::Receiver<LoaderEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Serializes publication and eviction against the shared registry.
pub struct LifecycleManager {
    registry: Arc<ModelRegistry>,
    retention: RetentionPolicy,
    mutation: Mutex<()>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<ModelRegistry>, retention: RetentionPolicy) -> Self {
        Self {
            registry,
            retention,
            mutation: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Make a model name known before any version is available.
    pub fn declare_model(&self, model: &str) -> bool {
        let _guard = self.mutation.lock();
        let declared = self.registry.declare(model);
        if declared {
            tracing::info!(model, "model declared");
        }
        declared
    }

    /// Publish a newly loaded instance, retiring versions beyond retention.
    pub fn on_instance_available(&self, instance: ModelInstance) -> PublishOutcome {
        let _guard = self.mutation.lock();
        let id = instance.id().clone();
        let handle = instance.handle();

        match self.registry.publish(instance, self.retention.max_versions) {
            Ok(evicted) => {
                telemetry::record_publication();
                tracing::info!(model = %id.name, version = id.version, handle = handle.id(), "instance published");
                let evicted = retire_all(evicted, "retention");
                PublishOutcome::Published {
                    id,
                    handle,
                    evicted,
                }
            }
            Err(duplicate) => {
                tracing::debug!(model = %id.name, version = id.version, "duplicate availability event ignored");
                duplicate.backend().release();
                PublishOutcome::Duplicate(id)
            }
        }
    }

    /// Stop serving a version. Redundant events are no-ops.
    ///
    /// Returns true if the version was loaded.
    pub fn on_instance_unavailable(&self, model: &str, version: u64) -> bool {
        let _guard = self.mutation.lock();
        match self.registry.evict(model, version) {
            Some(entry) => {
                retire_all(vec![entry], "unavailable");
                true
            }
            None => {
                tracing::debug!(model, version, "eviction of unloaded version ignored");
                false
            }
        }
    }

    /// Stop serving every version of a model. The name stays known.
    pub fn take_down_model(&self, model: &str) -> Vec<u64> {
        let _guard = self.mutation.lock();
        let removed = self.registry.evict_all(model);
        retire_all(removed, "takedown")
    }

    /// Apply one loader event.
    pub fn apply(&self, event: LoaderEvent) {
        match event {
            LoaderEvent::Declared(model) => {
                self.declare_model(&model);
            }
            LoaderEvent::Available(instance) => {
                self.on_instance_available(instance);
            }
            LoaderEvent::Unavailable { model, version } => {
                self.on_instance_unavailable(&model, version);
            }
            LoaderEvent::TakenDown(model) => {
                self.take_down_model(&model);
            }
        }
    }

    /// Consume the loader feed until it closes or `shutdown` fires.
    ///
    /// Returns the number of events applied.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<LoaderEvent>,
        shutdown: CancellationToken,
    ) -> usize {
        let mut applied = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!(applied, "lifecycle feed stopped by shutdown");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.apply(event);
                        applied += 1;
                    }
                    None => {
                        tracing::info!(applied, "lifecycle feed closed");
                        break;
                    }
                },
            }
        }
        applied
    }

    /// Wait for a retired instance to finish teardown.
    ///
    /// Succeeds immediately if the instance is not pending teardown.
    pub async fn await_teardown(
        &self,
        handle: InstanceHandle,
        timeout: Duration,
    ) -> Result<(), DrainError> {
        if self.registry.ledger().wait_for(handle, timeout).await {
            Ok(())
        } else {
            Err(DrainError::Timeout(handle.id()))
        }
    }

    /// Number of retired instances still held by leases.
    pub fn pending_teardowns(&self) -> usize {
        self.registry.ledger().len()
    }
}

fn retire_all(entries: Vec<Arc<InstanceEntry>>, reason: &'static str) -> Vec<u64> {
    let mut versions = Vec::with_capacity(entries.len());
    for entry in entries {
        let instance = entry.instance();
        tracing::info!(
            model = %instance.name(),
            version = instance.version(),
            in_flight = entry.lease_count(),
            reason,
            "instance retiring"
        );
        telemetry::record_eviction(reason);
        versions.push(instance.version());
        entry.retire();
    }
    versions
}
