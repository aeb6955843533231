//! Health check support.
//!
//! Provides liveness, readiness, and full health report capabilities
//! for orchestrator integration.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::models::ModelRegistry;
use crate::shutdown::{ShutdownCoordinator, ShutdownState};

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_requests: bool,
    pub shutdown_state: ShutdownState,
    pub models_known: usize,
    pub instances_loaded: usize,
    pub pending_teardowns: usize,
    pub in_flight: u32,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct HealthConfig {
    /// Report not ready until at least one instance is serving.
    pub require_model_loaded: bool,
}

/// Aggregates health information from runtime components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: accepting traffic.
    pub fn is_ready(&self, shutdown_state: ShutdownState, instances: usize) -> bool {
        if shutdown_state != ShutdownState::Running {
            return false;
        }
        !(self.config.require_model_loaded && instances == 0)
    }

    /// Generate full health report.
    pub fn report(&self, registry: &ModelRegistry, shutdown: &ShutdownCoordinator) -> HealthReport {
        let shutdown_state = shutdown.state();
        let instances = registry.instance_count();

        HealthReport {
            state: self.compute_state(shutdown_state, instances),
            ready: self.is_ready(shutdown_state, instances),
            accepting_requests: shutdown_state == ShutdownState::Running,
            shutdown_state,
            models_known: registry.model_count(),
            instances_loaded: instances,
            pending_teardowns: registry.pending_teardowns().len(),
            in_flight: shutdown.in_flight_count(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, shutdown_state: ShutdownState, instances: usize) -> HealthState {
        if shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        if self.config.require_model_loaded && instances == 0 {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
