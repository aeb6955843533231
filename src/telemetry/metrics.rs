//! Metric names and recording helpers over the `metrics` facade.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

const PREDICT_REQUESTS: &str = "predict_requests_total";
const PREDICT_LATENCY: &str = "predict_latency_ms";
const PUBLICATIONS: &str = "model_publications_total";
const EVICTIONS: &str = "model_evictions_total";
const TEARDOWNS: &str = "model_teardowns_total";
const MODELS_LOADED: &str = "models_loaded";
const PENDING_TEARDOWNS: &str = "pending_teardowns";

/// Register descriptions with whatever recorder is installed.
pub fn describe_metrics() {
    describe_counter!(PREDICT_REQUESTS, "Predict calls by outcome");
    describe_histogram!(PREDICT_LATENCY, "Predict latency in milliseconds");
    describe_counter!(PUBLICATIONS, "Model instances published");
    describe_counter!(EVICTIONS, "Model instances retired, by reason");
    describe_counter!(TEARDOWNS, "Retired instances whose resources were released");
    describe_gauge!(MODELS_LOADED, "Instances currently servable");
    describe_gauge!(PENDING_TEARDOWNS, "Retired instances still held by leases");
}

/// Record one finished predict call. `outcome` is "ok" or an error kind.
pub fn record_predict(outcome: &'static str, latency_ms: f64) {
    counter!(PREDICT_REQUESTS, "outcome" => outcome).increment(1);
    histogram!(PREDICT_LATENCY).record(latency_ms);
}

pub fn record_publication() {
    counter!(PUBLICATIONS).increment(1);
}

pub fn record_eviction(reason: &'static str) {
    counter!(EVICTIONS, "reason" => reason).increment(1);
}

pub fn record_teardown() {
    counter!(TEARDOWNS).increment(1);
}

pub fn record_models_loaded(count: usize) {
    gauge!(MODELS_LOADED).set(count as f64);
}

pub fn record_pending_teardowns(count: usize) {
    gauge!(PENDING_TEARDOWNS).set(count as f64);
}
