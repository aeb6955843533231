//! Graceful shutdown coordination.
//!
//! Provides a state machine for clean process termination that drains
//! in-flight predict calls before exit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Shutdown state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

/// Result of a shutdown operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: u32 },
}

/// Coordinates graceful shutdown across runtime components.
pub struct ShutdownCoordinator {
    state: RwLock<ShutdownState>,
    in_flight: Arc<AtomicU32>,
    notify: Arc<Notify>,
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ShutdownState::Running),
            in_flight: Arc::new(AtomicU32::new(0)),
            notify: Arc::new(Notify::new()),
            token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.state.read()
    }

    /// Check if accepting new requests.
    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Cancelled when shutdown begins. Background tasks select on this.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Track an in-flight request. Returns None if shutting down.
    pub fn track(&self) -> Option<ShutdownGuard> {
        // Hold the read lock so a request cannot slip in after draining starts.
        let state = self.state.read();
        if *state != ShutdownState::Running {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(ShutdownGuard {
            counter: self.in_flight.clone(),
            notify: self.notify.clone(),
        })
    }

    pub fn in_flight_count(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Initiate shutdown: stop accepting, wait for drain.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        *self.state.write() = ShutdownState::Draining;
        self.token.cancel();
        tracing::info!(in_flight = self.in_flight_count(), "shutdown initiated");

        let result = self.wait_for_drain(timeout).await;

        *self.state.write() = ShutdownState::Stopped;
        match &result {
            ShutdownResult::Complete => tracing::info!("shutdown complete"),
            ShutdownResult::Timeout { remaining } => {
                tracing::warn!(remaining, "shutdown timed out with requests in flight")
            }
        }
        result
    }

    async fn wait_for_drain(&self, timeout: Duration) -> ShutdownResult {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let count = self.in_flight_count();
            if count == 0 {
                return ShutdownResult::Complete;
            }

            let remaining_time = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining_time.is_zero() {
                return ShutdownResult::Timeout { remaining: count };
            }

            tokio::select! {
                _ = self.notify.notified() => continue,
                _ = tokio::time::sleep(remaining_time) => {
                    let final_count = self.in_flight_count();
                    if final_count == 0 {
                        return ShutdownResult::Complete;
                    }
                    return ShutdownResult::Timeout { remaining: final_count };
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for in-flight request tracking.
pub struct ShutdownGuard {
    counter: Arc<AtomicU32>,
    notify: Arc<Notify>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_shutdown_completes_immediately() {
        let coordinator = ShutdownCoordinator::new();
        assert!(coordinator.is_accepting());
        let token = coordinator.token();
        let result = coordinator.initiate(Duration::from_millis(10)).await;
        assert_eq!(result, ShutdownResult::Complete);
        assert_eq!(coordinator.state(), ShutdownState::Stopped);
        assert!(token.is_cancelled());
        assert!(coordinator.track().is_none());
    }

    #[tokio::test]
    async fn guard_drop_releases_drain() {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        let guard = coordinator.track().unwrap();
        assert_eq!(coordinator.in_flight_count(), 1);

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.initiate(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(guard);
        assert_eq!(waiter.await.unwrap(), ShutdownResult::Complete);
    }

    #[tokio::test]
    async fn drain_times_out_with_remaining_count() {
        let coordinator = ShutdownCoordinator::new();
        let _guard = coordinator.track().unwrap();
        let result = coordinator.initiate(Duration::from_millis(20)).await;
        assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });
    }
}
