//! Telemetry for the dispatch core.
//!
//! Structured logging via `tracing`, per-request spans, and counters/gauges
//! through the `metrics` facade. No exporter is installed here; the embedding
//! process chooses one.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{
    describe_metrics, record_eviction, record_models_loaded, record_pending_teardowns,
    record_predict, record_publication, record_teardown,
};
pub use spans::{RequestSpan, SpanExt};
