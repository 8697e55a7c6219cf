//! Sandbox-side errors.

use thiserror::Error;

/// Failure surfaced by a sandbox or the host plumbing underneath it.
///
/// Consensus outcomes (a contract deliberately failing, a budget code)
/// travel as `OpResult` values through the host trait; these errors are
/// for everything else.
#[derive(Debug, Error)]
pub enum ContractError {
    /// Payload failed the syntax check.
    #[error("syntax: {0}")]
    Syntax(String),

    /// The engine itself broke while running the contract.
    #[error("execution: {0}")]
    Execute(String),

    /// The execution was cancelled from outside (pass timeout).
    #[error("execution cancelled")]
    Cancelled,

    /// Host infrastructure failed (store, encoding).
    #[error("host: {0}")]
    Infra(String),
}

/// Result type for sandbox operations.
pub type Result<T> = std::result::Result<T, ContractError>;
