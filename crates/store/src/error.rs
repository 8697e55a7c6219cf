//! Error types for store operations.

use thiserror::Error;

/// Errors surfaced by the key/value and trie seams.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A read failed in a recoverable way (missing column, bad handle).
    #[error("store read failed: {0}")]
    Read(String),

    /// A write failed before any bytes reached durable state.
    #[error("store write failed: {0}")]
    Write(String),

    /// The store is in a state the node cannot prove consistent with the
    /// agreed ledger. The supervisor must stop the process; continuing
    /// would fork this node's state from its peers.
    #[error("fatal store inconsistency: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Whether this error requires process shutdown.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(StoreError::Fatal("batch half-applied".into()).is_fatal());
        assert!(!StoreError::Read("missing".into()).is_fatal());
        assert!(!StoreError::Write("disk full".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let e = StoreError::Fatal("account tree hash mismatch".into());
        assert!(format!("{e}").contains("fatal"));
    }
}
