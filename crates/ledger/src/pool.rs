//! Bounded-time execution of ledger work.
//!
//! Contract code cannot be trusted to terminate, so block application
//! runs on a worker thread under a wall-clock budget. When the budget
//! expires the pool flips the job's cancel flag and asks the sandbox to
//! cancel every active execution, which surfaces inside the engine as a
//! `TxTimeout` abort of the offending transaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tessera_contract::{ContractSandbox, ExecutionRegistry};
use tracing::warn;

pub struct ExecutionPool {
    sandbox: Arc<dyn ContractSandbox>,
    registry: Arc<ExecutionRegistry>,
}

impl ExecutionPool {
    pub fn new(sandbox: Arc<dyn ContractSandbox>, registry: Arc<ExecutionRegistry>) -> Self {
        Self { sandbox, registry }
    }

    /// Run `job` on a worker thread, giving it at most `timeout`.
    ///
    /// The job receives the cancel flag it must poll (an
    /// `ExecutionContext` wired with this flag checks it between host
    /// calls). On timeout the flag is raised, every active sandbox
    /// execution is cancelled, and `None` is returned; the worker is
    /// left to wind down on its own once cancellation takes hold.
    pub fn run_with_timeout<T, F>(&self, timeout: Duration, job: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<AtomicBool>) -> T + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            // The receiver may be gone already if we timed out; nothing
            // to do with the result in that case.
            let _ = sender.send(job(flag));
        });

        match receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "execution timed out, cancelling");
                cancel.store(true, Ordering::SeqCst);
                self.registry.cancel_all(self.sandbox.as_ref());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_contract::ScriptedSandbox;

    fn pool() -> ExecutionPool {
        ExecutionPool::new(
            Arc::new(ScriptedSandbox::new()),
            Arc::new(ExecutionRegistry::new()),
        )
    }

    #[test]
    fn test_fast_job_completes() {
        let result = pool().run_with_timeout(Duration::from_secs(1), |_cancel| 41 + 1);
        assert_eq!(result, Some(42));
    }

    #[test]
    fn test_slow_job_times_out_and_raises_flag() {
        let observed = Arc::new(AtomicBool::new(false));
        let observed_in_job = observed.clone();
        let result = pool().run_with_timeout(Duration::from_millis(50), move |cancel| {
            // Poll the flag the way an execution context would.
            for _ in 0..200 {
                if cancel.load(Ordering::SeqCst) {
                    observed_in_job.store(true, Ordering::SeqCst);
                    return 0;
                }
                thread::sleep(Duration::from_millis(10));
            }
            0
        });
        assert_eq!(result, None);
        // Give the worker a moment to observe the flag.
        for _ in 0..100 {
            if observed.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(observed.load(Ordering::SeqCst));
    }
}
