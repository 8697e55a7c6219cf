//! Bookkeeping of in-flight contract executions.
//!
//! A pass that blows its wall-clock budget is cancelled from the pool
//! thread's supervisor, which only knows the pass, not the contracts it
//! is running. The registry bridges that gap: every execution registers
//! an id here for its duration, and `cancel_all` forwards cancellation
//! to the sandbox for whatever is still active.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::sandbox::ContractSandbox;

#[derive(Default)]
pub struct ExecutionRegistry {
    next_id: AtomicU64,
    active: Mutex<BTreeSet<u64>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id and mark it active.
    pub fn begin(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.active.lock().insert(id);
        id
    }

    /// Mark an execution finished.
    pub fn end(&self, id: u64) {
        self.active.lock().remove(&id);
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Cancel every active execution through the sandbox.
    pub fn cancel_all(&self, sandbox: &dyn ContractSandbox) {
        let ids: Vec<u64> = self.active.lock().iter().copied().collect();
        for id in ids {
            debug!(id, "cancelling contract execution");
            sandbox.cancel(id);
        }
    }
}
