//! Model management: instances, signatures, the versioned registry and the
//! lifecycle manager that mutates it.

pub mod signature;

mod instance;
mod lease;
mod lifecycle;
mod registry;
mod version_set;

pub use instance::{
    ExecutionError, ExecutionRequest, InstanceHandle, ModelBackend, ModelId, ModelInstance,
};
pub use lease::Lease;
pub use lifecycle::{
    loader_feed, DrainError, LifecycleManager, LoaderEvent, PublishOutcome, RetentionPolicy,
};
pub use registry::{ModelRegistry, ModelStatus, ResolveError, VersionSelector};
pub use signature::{Dim, Signature, SignatureError, SignatureMap, TensorSpec, DEFAULT_SIGNATURE};
