//! Per-request dispatch: resolve, validate, execute, respond.
//!
//! Each call walks `Received → Resolved → Validated → Executing` and ends in
//! `Completed` or `Failed`. The lease taken at `Resolved` is owned by whichever
//! scope currently holds it, so it is released exactly once on every path,
//! including a backend panic or a caller that stops waiting mid-execution.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::error::{DispatchError, ValidationError};
use super::request::{ModelSpec, PredictRequest, PredictResponse, RequestContext, ResolvedModelSpec};
use super::validate::{check_outputs, select_outputs, validate_inputs};
use crate::models::{
    ExecutionError, ExecutionRequest, Lease, ModelId, ModelRegistry, ModelStatus, ResolveError,
    DEFAULT_SIGNATURE,
};
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::{self, RequestSpan, SpanExt};

/// Request processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Received,
    Resolved,
    Validated,
    Executing,
    Completed,
    Failed,
}

impl RequestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Resolved => "resolved",
            Self::Validated => "validated",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// How long a request for a model with no loaded version waits for a
    /// publication. `None` fails fast with `ModelUnavailable`.
    pub availability_wait: Option<Duration>,
    /// Deadline applied to requests that arrive without one.
    pub default_timeout: Option<Duration>,
}

/// Serves predict calls against a shared registry.
pub struct RequestDispatcher {
    registry: Arc<ModelRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    config: DispatcherConfig,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<ModelRegistry>,
        shutdown: Arc<ShutdownCoordinator>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry,
            shutdown,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Every known model with its loaded versions.
    pub fn list_models(&self) -> Vec<ModelStatus> {
        self.registry.list_models()
    }

    /// Serve one predict call.
    pub async fn predict(
        &self,
        request: PredictRequest,
        ctx: RequestContext,
    ) -> Result<PredictResponse, DispatchError> {
        let request_id = Uuid::new_v4().to_string();
        let span = RequestSpan::predict(&request_id, &request.model_spec.name);
        let start = Instant::now();

        let result = self.dispatch(request, ctx).instrument(span.clone()).await;

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        span.record("latency_ms", latency_ms);
        span.record_result(&result, |e: &DispatchError| e.kind().as_str());

        let outcome = match &result {
            Ok(_) => {
                span.in_scope(|| enter(RequestPhase::Completed));
                "ok"
            }
            Err(e) => {
                span.in_scope(|| {
                    enter(RequestPhase::Failed);
                    tracing::debug!(error = %e, kind = e.kind().as_str(), "predict failed");
                });
                e.kind().as_str()
            }
        };
        telemetry::record_predict(outcome, latency_ms);
        result
    }

    async fn dispatch(
        &self,
        request: PredictRequest,
        mut ctx: RequestContext,
    ) -> Result<PredictResponse, DispatchError> {
        enter(RequestPhase::Received);
        let guard = self.shutdown.track().ok_or(DispatchError::ShuttingDown)?;
        ctx.apply_default_timeout(self.config.default_timeout);

        let PredictRequest {
            model_spec,
            inputs,
            output_filter,
        } = request;
        if model_spec.name.is_empty() {
            return Err(DispatchError::validation(
                &ModelId::new("", 0),
                ValidationError::EmptyModelName,
            ));
        }

        let lease = self.resolve(&model_spec, &ctx).await?;
        let id = lease.model_id().clone();
        Span::current().record("version", id.version);
        enter(RequestPhase::Resolved);

        let signature_name = model_spec
            .signature_name
            .unwrap_or_else(|| DEFAULT_SIGNATURE.to_string());
        let signature = lease
            .signature(Some(signature_name.as_str()))
            .cloned()
            .ok_or_else(|| {
                DispatchError::validation(
                    &id,
                    ValidationError::UnknownSignature(signature_name.clone()),
                )
            })?;
        validate_inputs(&signature, &inputs).map_err(|e| DispatchError::validation(&id, e))?;
        let output_names =
            select_outputs(&signature, &output_filter).map_err(|e| DispatchError::validation(&id, e))?;
        enter(RequestPhase::Validated);

        let exec_cancel = ctx.cancel_token().child_token();
        let exec_request = ExecutionRequest {
            signature_name: signature_name.clone(),
            inputs,
            output_names: output_names.clone(),
            cancel: exec_cancel.clone(),
        };
        let mut task = tokio::spawn(
            async move {
                let result = lease.backend().execute(exec_request).await;
                drop(lease);
                drop(guard);
                result
            }
            .in_current_span(),
        );
        enter(RequestPhase::Executing);

        let joined = tokio::select! {
            joined = &mut task => joined,
            _ = ctx.cancel_token().cancelled() => {
                exec_cancel.cancel();
                return Err(DispatchError::Cancelled { model: id.name });
            }
            _ = deadline_elapsed(ctx.deadline()) => {
                exec_cancel.cancel();
                return Err(DispatchError::DeadlineExceeded { model: id.name });
            }
        };

        let produced = match joined {
            Ok(Ok(outputs)) => outputs,
            // A backend that aborts without the caller cancelling is a server-side failure.
            Ok(Err(ExecutionError::Cancelled)) if ctx.is_cancelled() => {
                return Err(DispatchError::Cancelled { model: id.name })
            }
            Ok(Err(e)) => return Err(DispatchError::execution(&id, e)),
            Err(join) => {
                let reason = if join.is_panic() {
                    "executor panicked"
                } else {
                    "executor task aborted"
                };
                tracing::error!(model = %id, reason, "backend did not return");
                return Err(DispatchError::execution(
                    &id,
                    ExecutionError::Backend(reason.to_string()),
                ));
            }
        };

        let outputs = check_outputs(&signature, &output_names, produced)
            .map_err(|e| DispatchError::execution(&id, e))?;

        Ok(PredictResponse {
            model_spec: ResolvedModelSpec {
                name: id.name,
                version: id.version,
                signature_name,
            },
            outputs,
        })
    }

    /// Resolve to a lease, waiting for a publication if configured.
    ///
    /// Cancellation and deadline are checked before every resolution attempt,
    /// so no lease is taken once the caller has given up.
    async fn resolve(&self, spec: &ModelSpec, ctx: &RequestContext) -> Result<Lease, DispatchError> {
        let wait_until = self.config.availability_wait.map(|wait| Instant::now() + wait);
        let mut changes = self.registry.subscribe();

        loop {
            check_interrupted(ctx, &spec.name)?;
            changes.borrow_and_update();

            let err = match self.registry.resolve(&spec.name, spec.selector()) {
                Ok(lease) => return Ok(lease),
                Err(err) => err,
            };
            let until = match (wait_until, &err) {
                (Some(until), ResolveError::ModelUnavailable(_)) => until,
                _ => return Err(err.into()),
            };
            if Instant::now() >= until {
                return Err(err.into());
            }

            tracing::debug!(model = %spec.name, "waiting for a version to be published");
            tokio::select! {
                biased;
                _ = ctx.cancel_token().cancelled() => {}
                _ = deadline_elapsed(ctx.deadline()) => {}
                _ = tokio::time::sleep_until(until) => return Err(err.into()),
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Err(err.into());
                    }
                }
            }
        }
    }
}

fn check_interrupted(ctx: &RequestContext, model: &str) -> Result<(), DispatchError> {
    if ctx.is_cancelled() {
        return Err(DispatchError::Cancelled {
            model: model.to_string(),
        });
    }
    if ctx.is_expired() {
        return Err(DispatchError::DeadlineExceeded {
            model: model.to_string(),
        });
    }
    Ok(())
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn enter(phase: RequestPhase) {
    tracing::trace!(phase = phase.as_str(), "request phase");
}
