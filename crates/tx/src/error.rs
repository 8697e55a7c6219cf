//! Infrastructure errors for the transaction crate.
//!
//! These are distinct from the consensus [`OpResult`] codes: an
//! `OpResult` is data that every node agrees on and persists; a
//! [`TxError`] means this node could not finish the computation at all
//! (store failure, corrupt encoding) and the surrounding pass must stop.
//!
//! [`OpResult`]: tessera_common::OpResult

use tessera_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    /// Backing store failed while resolving state.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A persisted record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Internal invariant broken (scope stack misuse and the like).
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for transaction-crate operations.
pub type Result<T> = std::result::Result<T, TxError>;
