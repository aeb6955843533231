//! Dispatch error taxonomy.
//!
//! Every failure path yields a [`DispatchError`] whose [`ErrorKind`] is
//! stable, so the transport layer can map it to a status deterministically.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ExecutionError, ModelId, ResolveError};
use crate::tensor::{DataType, TensorError};

/// Ways a request can violate the resolved instance's signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("model name must not be empty")]
    EmptyModelName,

    #[error("signature '{0}' not found")]
    UnknownSignature(String),

    #[error("missing required input '{0}'")]
    MissingInput(String),

    #[error("unexpected input '{0}' is not in the signature")]
    UnexpectedInput(String),

    #[error("input '{name}' has type {actual}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("input '{name}' has rank {actual}, expected {expected}")]
    RankMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("input '{name}' has shape {actual:?}, expected {expected}")]
    ShapeMismatch {
        name: String,
        expected: String,
        actual: Vec<usize>,
    },

    #[error("input '{name}' is malformed: {source}")]
    Malformed {
        name: String,
        #[source]
        source: TensorError,
    },

    #[error("requested output '{0}' is not in the signature")]
    UnknownOutput(String),
}

impl ValidationError {
    /// Name of the offending input or output, if there is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::EmptyModelName => None,
            Self::UnknownSignature(name)
            | Self::MissingInput(name)
            | Self::UnexpectedInput(name)
            | Self::UnknownOutput(name) => Some(name),
            Self::TypeMismatch { name, .. }
            | Self::RankMismatch { name, .. }
            | Self::ShapeMismatch { name, .. }
            | Self::Malformed { name, .. } => Some(name),
        }
    }
}

/// Errors returned by [`RequestDispatcher::predict`](super::RequestDispatcher::predict).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Model '{model}' not found")]
    ModelNotFound { model: String },

    #[error("Model '{model}' version {version} not found")]
    VersionNotFound { model: String, version: u64 },

    #[error("Model '{model}' has no version loaded")]
    ModelUnavailable { model: String },

    #[error("invalid request for {model}: {source}")]
    Validation {
        model: ModelId,
        #[source]
        source: ValidationError,
    },

    #[error("inference failed on {model}: {source}")]
    Execution {
        model: ModelId,
        #[source]
        source: ExecutionError,
    },

    #[error("request for model '{model}' cancelled")]
    Cancelled { model: String },

    #[error("request for model '{model}' exceeded its deadline")]
    DeadlineExceeded { model: String },

    #[error("server is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModelNotFound { .. } => ErrorKind::ModelNotFound,
            Self::VersionNotFound { .. } => ErrorKind::VersionNotFound,
            Self::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Execution { .. } => ErrorKind::InferenceExecution,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::DeadlineExceeded { .. } => ErrorKind::DeadlineExceeded,
            Self::ShuttingDown => ErrorKind::ShuttingDown,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }

    pub(crate) fn validation(model: &ModelId, source: ValidationError) -> Self {
        Self::Validation {
            model: model.clone(),
            source,
        }
    }

    pub(crate) fn execution(model: &ModelId, source: ExecutionError) -> Self {
        Self::Execution {
            model: model.clone(),
            source,
        }
    }
}

impl From<ResolveError> for DispatchError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::ModelNotFound(model) => Self::ModelNotFound { model },
            ResolveError::VersionNotFound { model, version } => {
                Self::VersionNotFound { model, version }
            }
            ResolveError::ModelUnavailable(model) => Self::ModelUnavailable { model },
        }
    }
}

/// Stable classification of a dispatch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ModelNotFound,
    VersionNotFound,
    ModelUnavailable,
    Validation,
    InferenceExecution,
    Cancelled,
    DeadlineExceeded,
    ShuttingDown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelNotFound => "model_not_found",
            Self::VersionNotFound => "version_not_found",
            Self::ModelUnavailable => "model_unavailable",
            Self::Validation => "validation",
            Self::InferenceExecution => "inference_execution",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::ShuttingDown => "shutting_down",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ModelNotFound | Self::VersionNotFound => StatusCode::NotFound,
            Self::ModelUnavailable | Self::ShuttingDown => StatusCode::Unavailable,
            Self::Validation => StatusCode::InvalidArgument,
            Self::InferenceExecution => StatusCode::Internal,
            Self::Cancelled => StatusCode::Cancelled,
            Self::DeadlineExceeded => StatusCode::DeadlineExceeded,
        }
    }

    /// Whether a caller-driven retry of the same request can succeed.
    ///
    /// Resolution misses and validation failures are deterministic for a
    /// given request and registry state; the core never retries anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable
                | Self::InferenceExecution
                | Self::DeadlineExceeded
                | Self::ShuttingDown
        )
    }
}

/// Transport-level status, numbered as gRPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Cancelled,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    Internal,
    Unavailable,
}

impl StatusCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::Cancelled => 1,
            Self::InvalidArgument => 3,
            Self::DeadlineExceeded => 4,
            Self::NotFound => 5,
            Self::Internal => 13,
            Self::Unavailable => 14,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_errors_keep_their_kind() {
        let err: DispatchError = ResolveError::ModelNotFound("m".into()).into();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        let err: DispatchError = ResolveError::VersionNotFound {
            model: "m".into(),
            version: 2,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::VersionNotFound);
        let err: DispatchError = ResolveError::ModelUnavailable("m".into()).into();
        assert_eq!(err.status(), StatusCode::Unavailable);
    }

    #[test]
    fn not_found_messages_name_the_model() {
        let err = DispatchError::VersionNotFound {
            model: "digits".into(),
            version: 2,
        };
        assert_eq!(err.status().code(), 5);
        assert!(err.to_string().starts_with("Model 'digits'"));
        assert!(!err.kind().is_retryable());
    }

    #[test]
    fn validation_and_execution_map_to_distinct_statuses() {
        let id = ModelId::new("m", 1);
        let bad = DispatchError::validation(&id, ValidationError::MissingInput("x".into()));
        let failed = DispatchError::execution(&id, ExecutionError::Numeric("nan".into()));
        assert_eq!(bad.status(), StatusCode::InvalidArgument);
        assert_eq!(failed.status(), StatusCode::Internal);
        assert!(!bad.kind().is_retryable());
        assert!(failed.kind().is_retryable());
    }

    #[test]
    fn validation_field_names_offender() {
        let err = ValidationError::TypeMismatch {
            name: "image".into(),
            expected: DataType::Float32,
            actual: DataType::Int32,
        };
        assert_eq!(err.field(), Some("image"));
        assert_eq!(ValidationError::EmptyModelName.field(), None);
    }

    #[test]
    fn status_strings_are_grpc_names() {
        assert_eq!(ErrorKind::Cancelled.status().as_str(), "CANCELLED");
        assert_eq!(ErrorKind::DeadlineExceeded.status().code(), 4);
        assert_eq!(ErrorKind::ShuttingDown.status().as_str(), "UNAVAILABLE");
    }
}
