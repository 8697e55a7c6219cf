//! Contract sandbox seam for the tessera ledger engine.
//!
//! The scripting engine that runs contracts is an external collaborator
//! behind the [`ContractSandbox`] trait. What a contract can see and do
//! is the typed [`ChainHost`] capability trait, implemented by the
//! execution context in `tessera-ledger`. [`ExecutionRegistry`] tracks
//! in-flight executions so a timed-out pass can cancel them, and
//! [`ScriptedSandbox`] is a deterministic JSON-driven engine used by
//! tests and single-process tooling.

pub mod error;
pub mod host;
pub mod registry;
pub mod sandbox;
pub mod script;

pub use error::{ContractError, Result};
pub use host::{BlockInfo, ChainHost, TxInfo};
pub use registry::ExecutionRegistry;
pub use sandbox::{ContractParameter, ContractSandbox};
pub use script::ScriptedSandbox;
