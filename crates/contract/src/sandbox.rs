//! The sandbox trait.
//!
//! The real node plugs a scripting engine in here; the engine is a
//! black box to the ledger. Everything a contract can observe or do
//! goes through the [`ChainHost`] handed to `execute`, which keeps the
//! engine replaceable and the state transition deterministic.
//!
//! [`ChainHost`]: crate::host::ChainHost

use tessera_common::OpResult;

use crate::error::Result;
use crate::host::ChainHost;

/// Everything a sandbox needs to run one contract entry.
#[derive(Debug, Clone)]
pub struct ContractParameter {
    /// Address of the contract account.
    pub contract: String,
    /// The stored contract payload.
    pub payload: String,
    /// Entry point: `init`, `main` or `query`.
    pub entry: String,
    /// Caller-supplied input string.
    pub input: String,
    /// Execution id, used to target cancellation.
    pub id: u64,
}

/// A contract engine.
///
/// `execute` runs mutating entries and reports the contract's consensus
/// outcome; `query` is read-only and returns the contract's answer.
/// `cancel` may be called from another thread at any time and must make
/// the identified execution stop promptly.
pub trait ContractSandbox: Send + Sync {
    /// Validate a payload without running it.
    fn check_syntax(&self, payload: &str) -> Result<()>;

    fn execute(&self, param: &ContractParameter, host: &mut dyn ChainHost) -> Result<OpResult>;

    fn query(&self, param: &ContractParameter, host: &mut dyn ChainHost) -> Result<String>;

    fn cancel(&self, id: u64);
}
