//! Telemetry module tests.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use predict_core::dispatch::{PredictRequest, RequestContext, RequestDispatcher};
use predict_core::models::ModelRegistry;
use predict_core::shutdown::ShutdownCoordinator;
use predict_core::telemetry::{
    describe_metrics, record_eviction, record_models_loaded, record_pending_teardowns,
    record_predict, record_publication, record_teardown, LogConfig, LogError, LogFormat,
    RequestSpan, SpanExt,
};
use tracing::Span;
use tracing_subscriber::fmt::MakeWriter;

// =============================================================================
// LogConfig Tests
// =============================================================================

#[test]
fn log_config_default_is_json() {
    let config = LogConfig::default();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "info");
    assert!(config.output_path.is_none());
}

#[test]
fn log_config_deserializes_partial_toml() {
    let config: LogConfig = toml::from_str("level = \"debug\"\noutput_path = \"/tmp/predict.log\"").unwrap();
    assert_eq!(config.format, LogFormat::Json);
    assert_eq!(config.level, "debug");
    assert_eq!(config.output_path, Some(PathBuf::from("/tmp/predict.log")));
}

#[test]
fn log_error_display() {
    let error = LogError::InvalidFilter("bad filter".to_string());
    assert!(error.to_string().contains("bad filter"));
    assert!(LogError::AlreadyInitialized
        .to_string()
        .contains("already initialized"));
}

// =============================================================================
// Span Tests
// =============================================================================

#[test]
fn span_ext_records_on_disabled_span() {
    let span = Span::none();
    let ok: Result<i32, String> = Ok(42);
    span.record_result(&ok, |_| "unused");
    let err: Result<i32, String> = Err("boom".into());
    span.record_result(&err, |_| "backend");
}

#[test]
fn request_span_creates_without_subscriber() {
    let span = RequestSpan::predict("req-123", "digits");
    let _guard = span.enter();
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn failed_predict_logs_error_kind_in_request_span() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(capture.clone())
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let dispatcher = RequestDispatcher::new(
        Arc::new(ModelRegistry::new()),
        Arc::new(ShutdownCoordinator::new()),
        Default::default(),
    );
    let _ = dispatcher
        .predict(PredictRequest::new("ghost"), RequestContext::new())
        .await;

    let logs = capture.contents();
    assert!(logs.contains("inference_request"), "logs: {logs}");
    assert!(logs.contains("model_not_found"), "logs: {logs}");
    assert!(logs.contains("ghost"), "logs: {logs}");
}

// =============================================================================
// Metrics Tests
// =============================================================================

#[test]
fn metrics_without_recorder_do_not_panic() {
    describe_metrics();
    describe_metrics();
    record_predict("ok", 1.5);
    record_predict("validation", 0.0);
    record_publication();
    record_eviction("retention");
    record_teardown();
    record_models_loaded(3);
    record_pending_teardowns(0);
}
