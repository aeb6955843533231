//! Health check tests.

mod common;

use common::{digits, Probe};
use predict_core::health::{HealthChecker, HealthConfig, HealthState};
use predict_core::models::VersionSelector;
use predict_core::shutdown::ShutdownState;
use predict_core::{Runtime, RuntimeConfig};

#[test]
fn test_alive_always_true() {
    let checker = HealthChecker::default();
    assert!(checker.is_alive());
}

#[test]
fn test_ready_only_when_running() {
    let checker = HealthChecker::default();
    assert!(checker.is_ready(ShutdownState::Running, 0));
    assert!(!checker.is_ready(ShutdownState::Draining, 0));
    assert!(!checker.is_ready(ShutdownState::Stopped, 3));
}

#[test]
fn test_ready_respects_model_requirement() {
    let checker = HealthChecker::new(HealthConfig {
        require_model_loaded: true,
    });

    // Not ready when no instance is serving
    assert!(!checker.is_ready(ShutdownState::Running, 0));
    assert!(checker.is_ready(ShutdownState::Running, 1));
}

#[test]
fn test_report_reflects_registry() {
    let runtime = Runtime::new(RuntimeConfig {
        require_model_loaded: true,
        ..Default::default()
    });
    let report = runtime.health_report();
    assert_eq!(report.state, HealthState::Degraded);
    assert!(!report.ready);

    let probe = Probe::new();
    runtime.lifecycle.declare_model("mnist");
    runtime.lifecycle.on_instance_available(digits(1, &probe));
    runtime.lifecycle.on_instance_available(digits(2, &probe));
    let lease = runtime
        .registry
        .resolve("digits", VersionSelector::Specific(1))
        .unwrap();
    runtime.lifecycle.on_instance_unavailable("digits", 1);

    let report = runtime.health_report();
    assert_eq!(report.state, HealthState::Healthy);
    assert!(report.ready);
    assert!(report.accepting_requests);
    assert_eq!(report.models_known, 2);
    assert_eq!(report.instances_loaded, 1);
    assert_eq!(report.pending_teardowns, 1);
    assert_eq!(report.in_flight, 0);

    drop(lease);
    assert_eq!(runtime.health_report().pending_teardowns, 0);
}

#[tokio::test]
async fn test_report_unhealthy_after_shutdown() {
    let runtime = Runtime::new(RuntimeConfig::default());
    runtime.shutdown().await;
    let report = runtime.health_report();
    assert_eq!(report.state, HealthState::Unhealthy);
    assert_eq!(report.shutdown_state, ShutdownState::Stopped);
    assert!(!report.ready);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["shutdown_state"], "stopped");
}
