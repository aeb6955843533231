//! Predict core
//!
//! Model resolution, versioning and request dispatch for a Predict
//! inference service. The transport, model loading and numeric execution
//! live outside this crate and plug in through narrow seams.
//!
//! # Components
//!
//! - **Registry**: model name → loaded versions, with lease-guarded instances
//! - **Lifecycle**: applies loader events, enforces retention, defers teardown
//!   until the last in-flight request releases its lease
//! - **Dispatch**: resolve, validate against the signature, execute, respond
//!
//! # Seams
//!
//! - Loader feed: [`models::LoaderEvent`]s over a bounded channel
//! - Executor: [`models::ModelBackend`] behind every published instance
//! - Transport: [`dispatch::ErrorKind`] and [`dispatch::StatusCode`] give every
//!   failure a stable classification

pub mod config;
pub mod dispatch;
pub mod health;
pub mod models;
pub mod shutdown;
pub mod telemetry;
pub mod tensor;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use config::RuntimeConfig;

use dispatch::{DispatchError, PredictRequest, PredictResponse, RequestContext, RequestDispatcher};
use health::{HealthChecker, HealthConfig, HealthReport};
use models::{loader_feed, LifecycleManager, LoaderEvent, ModelRegistry};
use shutdown::{ShutdownCoordinator, ShutdownResult};

/// A fully wired dispatch core.
///
/// The registry is created here and injected into both the lifecycle manager
/// and the dispatcher; nothing is process-global.
pub struct Runtime {
    pub registry: Arc<ModelRegistry>,
    pub lifecycle: Arc<LifecycleManager>,
    pub dispatcher: RequestDispatcher,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub health: HealthChecker,
    config: RuntimeConfig,
}

impl Runtime {
    /// Create a new runtime instance with the given configuration.
    pub fn new(config: RuntimeConfig) -> Self {
        let registry = Arc::new(ModelRegistry::new());
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let lifecycle = Arc::new(LifecycleManager::new(registry.clone(), config.retention()));
        let dispatcher =
            RequestDispatcher::new(registry.clone(), shutdown.clone(), config.dispatcher());
        let health = HealthChecker::new(HealthConfig {
            require_model_loaded: config.require_model_loaded,
        });

        Self {
            registry,
            lifecycle,
            dispatcher,
            shutdown,
            health,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Start consuming loader events on the current tokio runtime.
    ///
    /// The task ends when every sender is dropped or shutdown begins, and
    /// yields the number of events applied.
    pub fn spawn_loader_feed(&self) -> (mpsc::Sender<LoaderEvent>, JoinHandle<usize>) {
        let (tx, rx) = loader_feed(self.config.event_capacity);
        let lifecycle = self.lifecycle.clone();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move { lifecycle.run(rx, token).await });
        (tx, task)
    }

    pub async fn predict(
        &self,
        request: PredictRequest,
        ctx: RequestContext,
    ) -> Result<PredictResponse, DispatchError> {
        self.dispatcher.predict(request, ctx).await
    }

    pub fn health_report(&self) -> HealthReport {
        self.health.report(&self.registry, &self.shutdown)
    }

    /// Stop accepting requests and drain in-flight ones.
    pub async fn shutdown(&self) -> ShutdownResult {
        self.shutdown.initiate(self.config.shutdown_timeout()).await
    }
}
