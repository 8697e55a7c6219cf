//! Ledger-level errors.

use tessera_store::StoreError;
use tessera_tx::TxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tx(#[from] TxError),

    /// Consensus value does not continue the last closed ledger.
    #[error("out-of-order consensus value: expected seq {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },

    /// Consensus value chains from a different previous hash.
    #[error("previous-hash mismatch at seq {seq}")]
    PreviousHashMismatch { seq: u64 },

    /// Proof failed verification.
    #[error("consensus proof rejected at seq {seq}")]
    BadProof { seq: u64 },

    /// A block failed validation in check mode.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// A persisted record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// A read-only contract query failed.
    #[error("contract query failed: {0}")]
    Query(String),

    /// A replayed ledger produced a different header than its peer sent.
    #[error("state divergence replaying seq {seq}")]
    Divergence { seq: u64 },
}

impl LedgerError {
    /// Whether the node must stop: its durable state can no longer be
    /// trusted to match the agreed ledger.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Store(e) if e.is_fatal())
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
