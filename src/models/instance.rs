//! Loaded model instances and the backend capability they wrap.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::signature::{Signature, SignatureMap};
use crate::tensor::TensorMap;

/// (model name, version) identity of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,
    pub version: u64,
}

impl ModelId {
    pub fn new(name: impl Into<String>, version: u64) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Process-unique handle of one published instance.
///
/// Distinguishes a re-published version from a predecessor that is still draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl InstanceHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Failures reported by a backend while computing on valid inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("numeric fault: {0}")]
    Numeric(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("execution cancelled")]
    Cancelled,

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Everything a backend needs for one call.
#[derive(Debug)]
pub struct ExecutionRequest {
    pub signature_name: String,
    /// Inputs already validated against the signature.
    pub inputs: TensorMap,
    /// Outputs the caller will receive; backends may compute only these.
    pub output_names: Vec<String>,
    /// Fired when the caller gives up. Honoring it is optional.
    pub cancel: CancellationToken,
}

/// Executable handle behind a model instance.
///
/// The dispatcher treats implementations as opaque: it hands over validated
/// inputs and checks the returned outputs against the declared signature.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<TensorMap, ExecutionError>;

    /// Free underlying resources. Called exactly once, after the instance has
    /// been retired and its last lease released.
    fn release(&self) {}
}

/// One loaded, servable version of a model. Immutable once constructed.
pub struct ModelInstance {
    id: ModelId,
    handle: InstanceHandle,
    signatures: SignatureMap,
    backend: Box<dyn ModelBackend>,
}

impl ModelInstance {
    pub fn new(
        name: impl Into<String>,
        version: u64,
        signatures: SignatureMap,
        backend: Box<dyn ModelBackend>,
    ) -> Self {
        Self {
            id: ModelId::new(name, version),
            handle: InstanceHandle::next(),
            signatures,
            backend,
        }
    }

    pub fn id(&self) -> &ModelId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn version(&self) -> u64 {
        self.id.version
    }

    pub fn handle(&self) -> InstanceHandle {
        self.handle
    }

    pub fn signatures(&self) -> &SignatureMap {
        &self.signatures
    }

    /// Look up a signature by name; `None` selects the default signature.
    pub fn signature(&self, name: Option<&str>) -> Option<&Signature> {
        self.signatures.get(name)
    }

    pub fn backend(&self) -> &dyn ModelBackend {
        self.backend.as_ref()
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("signatures", &self.signatures.names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullBackend;

    #[async_trait]
    impl ModelBackend for NullBackend {
        async fn execute(&self, _request: ExecutionRequest) -> Result<TensorMap, ExecutionError> {
            Ok(TensorMap::new())
        }
    }

    #[test]
    fn handles_are_unique_per_instance() {
        let a = ModelInstance::new("m", 1, SignatureMap::new(), Box::new(NullBackend));
        let b = ModelInstance::new("m", 1, SignatureMap::new(), Box::new(NullBackend));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.handle(), b.handle());
    }

    #[test]
    fn model_id_display() {
        assert_eq!(ModelId::new("digits", 3).to_string(), "digits@3");
    }
}
