//! Lease accounting and deferred teardown for published instances.
//!
//! Each published instance lives in an arena entry carrying an atomic lease
//! count and a lifecycle state (`SERVING` → `RETIRING` → `TORN_DOWN`).
//! Retirement never blocks: it records a pending teardown, and whichever of
//! the retiring thread or the last lease release observes a zero count first
//! performs the teardown. A compare-and-swap on the state makes it run once.
//!
//! Leases are only granted while the registry read lock is held and the entry
//! is still mapped, and entries are unmapped under the write lock before they
//! are retired. A lease can therefore never be observed on a torn-down
//! instance, and teardown cannot complete while a lease is outstanding.

use std::ops::Deref;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;

use super::instance::{InstanceHandle, ModelId, ModelInstance};
use crate::telemetry;

const SERVING: u8 = 0;
const RETIRING: u8 = 1;
const TORN_DOWN: u8 = 2;

/// Instances retired but not yet torn down.
pub(crate) struct TeardownLedger {
    pending: DashMap<InstanceHandle, ModelId>,
    completed: Notify,
}

impl TeardownLedger {
    pub(crate) fn new() -> Self {
        Self {
            pending: DashMap::new(),
            completed: Notify::new(),
        }
    }

    fn register(&self, handle: InstanceHandle, id: ModelId) {
        self.pending.insert(handle, id);
        telemetry::record_pending_teardowns(self.pending.len());
    }

    fn complete(&self, handle: InstanceHandle) {
        self.pending.remove(&handle);
        telemetry::record_pending_teardowns(self.pending.len());
        self.completed.notify_waiters();
    }

    pub(crate) fn is_pending(&self, handle: InstanceHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<(InstanceHandle, ModelId)> {
        let mut entries: Vec<_> = self
            .pending
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        entries.sort();
        entries
    }

    /// Wait until `handle` is no longer pending. Returns false on timeout.
    pub(crate) async fn wait_for(&self, handle: InstanceHandle, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_pending(handle) {
                return true;
            }

            tokio::select! {
                _ = &mut notified => continue,
                _ = tokio::time::sleep_until(deadline) => return !self.is_pending(handle),
            }
        }
    }
}

/// Arena entry for one published instance.
pub(crate) struct InstanceEntry {
    instance: Arc<ModelInstance>,
    leases: AtomicUsize,
    state: AtomicU8,
    ledger: Arc<TeardownLedger>,
}

impl std::fmt::Debug for InstanceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceEntry")
            .field("id", self.instance.id())
            .field("handle", &self.instance.handle())
            .finish_non_exhaustive()
    }
}

impl InstanceEntry {
    pub(crate) fn new(instance: ModelInstance, ledger: Arc<TeardownLedger>) -> Arc<Self> {
        Arc::new(Self {
            instance: Arc::new(instance),
            leases: AtomicUsize::new(0),
            state: AtomicU8::new(SERVING),
            ledger,
        })
    }

    pub(crate) fn instance(&self) -> &ModelInstance {
        &self.instance
    }

    pub(crate) fn version(&self) -> u64 {
        self.instance.version()
    }

    pub(crate) fn lease_count(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    /// Grant a lease unless the entry has started retiring.
    ///
    /// Callers hold the registry read lock while this runs.
    pub(crate) fn try_lease(self: &Arc<Self>) -> Option<Lease> {
        self.leases.fetch_add(1, Ordering::SeqCst);
        if self.state.load(Ordering::SeqCst) != SERVING {
            self.release_one();
            return None;
        }
        Some(Lease {
            entry: Arc::clone(self),
        })
    }

    /// Mark the entry for teardown. Must only be called after the entry was
    /// unmapped from the registry. Returns false if it was already retiring.
    pub(crate) fn retire(&self) -> bool {
        if self
            .state
            .compare_exchange(SERVING, RETIRING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.ledger
            .register(self.instance.handle(), self.instance.id().clone());

        if self.state.load(Ordering::SeqCst) == TORN_DOWN {
            // A concurrent last release tore down before the ledger entry existed.
            self.ledger.complete(self.instance.handle());
        } else {
            self.try_teardown();
        }
        true
    }

    fn release_one(&self) {
        let previous = self.leases.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.state.load(Ordering::SeqCst) == RETIRING {
            self.try_teardown();
        }
    }

    fn try_teardown(&self) {
        if self.leases.load(Ordering::SeqCst) != 0 {
            return;
        }
        if self
            .state
            .compare_exchange(RETIRING, TORN_DOWN, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        self.instance.backend().release();
        self.ledger.complete(self.instance.handle());
        telemetry::record_teardown();
        tracing::info!(
            model = %self.instance.name(),
            version = self.instance.version(),
            handle = self.instance.handle().id(),
            "instance torn down"
        );
    }

    #[cfg(test)]
    pub(crate) fn is_torn_down(&self) -> bool {
        self.state.load(Ordering::SeqCst) == TORN_DOWN
    }
}

/// RAII claim on a published instance for the duration of one request.
///
/// The instance cannot be torn down while any lease on it is alive. Dropping
/// the lease releases it exactly once on every exit path.
pub struct Lease {
    entry: Arc<InstanceEntry>,
}

impl Lease {
    pub fn instance(&self) -> &ModelInstance {
        self.entry.instance()
    }

    pub fn model_id(&self) -> &ModelId {
        self.entry.instance().id()
    }

    pub fn handle(&self) -> InstanceHandle {
        self.entry.instance().handle()
    }

    /// Leases currently outstanding on this instance, this one included.
    pub fn outstanding(&self) -> usize {
        self.entry.lease_count()
    }
}

impl Deref for Lease {
    type Target = ModelInstance;

    fn deref(&self) -> &ModelInstance {
        self.entry.instance()
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("model", self.model_id())
            .field("handle", &self.handle())
            .finish()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.entry.release_one();
    }
}
