//! Request spans and result recording.

use tracing::{info_span, Span};

/// Record an operation's result on a span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>, error_kind: impl FnOnce(&E) -> &'static str)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>, error_kind: impl FnOnce(&E) -> &'static str)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.kind", error_kind(e));
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for predict request spans.
pub struct RequestSpan;

impl RequestSpan {
    /// Span for one predict call.
    ///
    /// `version` is filled in once resolution succeeds; `status`, `error.*`
    /// and `latency_ms` when the call finishes.
    pub fn predict(request_id: &str, model: &str) -> Span {
        info_span!(
            "inference_request",
            request_id = %request_id,
            model = %model,
            version = tracing::field::Empty,
            status = tracing::field::Empty,
            error.kind = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    }
}
