//! Block application and ledger closing.
//!
//! This crate sits on top of `tessera-tx`: it owns the contract call
//! stack ([`ExecutionContext`]), applies whole transaction sets
//! ([`BlockFrame`]), and advances the chain one sealed header at a time
//! ([`LedgerCloser`]). Execution is deterministic; wall-clock budgets
//! are enforced from outside via [`ExecutionPool`] and the cancel flag.

pub mod block;
pub mod closer;
pub mod context;
pub mod error;
pub mod pool;

pub use block::{ApplyMode, BlockFrame};
pub use closer::{
    AcceptAll, ClosedLedger, ConsensusVerifier, GenesisConfig, LedgerCloser, LedgerObserver,
    SharedState, SharedTrie, Statistics, SyncBundle, MAX_SYNC_LEDGERS,
};
pub use context::{ExecutionContext, MEMORY_LIMIT, STEP_LIMIT};
pub use error::{LedgerError, Result};
pub use pool::ExecutionPool;
