//! Predict request/response structures and per-call context.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::VersionSelector;
use crate::tensor::{Tensor, TensorMap};

/// Which model, version and signature a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    /// Pin an explicit version; `None` serves the latest loaded version.
    #[serde(default)]
    pub version: Option<u64>,
    /// `None` selects the default signature.
    #[serde(default)]
    pub signature_name: Option<String>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            signature_name: None,
        }
    }

    pub fn selector(&self) -> VersionSelector {
        self.version.into()
    }
}

/// A decoded predict request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub model_spec: ModelSpec,
    pub inputs: TensorMap,
    /// Outputs to return. Empty returns every declared output.
    #[serde(default)]
    pub output_filter: Vec<String>,
}

impl PredictRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model_spec: ModelSpec::new(model),
            inputs: TensorMap::new(),
            output_filter: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.model_spec.version = Some(version);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.model_spec.signature_name = Some(signature.into());
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.inputs.insert(name.into(), tensor);
        self
    }

    pub fn with_output_filter<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_filter = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Parse a JSON-encoded request.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// The instance that actually served a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedModelSpec {
    pub name: String,
    pub version: u64,
    pub signature_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model_spec: ResolvedModelSpec,
    pub outputs: TensorMap,
}

/// Deadline and cancellation for one call.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Tie the request to a caller-owned token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub(crate) fn apply_default_timeout(&mut self, timeout: Option<Duration>) {
        if self.deadline.is_none() {
            self.deadline = timeout.map(|t| Instant::now() + t);
        }
    }
}
