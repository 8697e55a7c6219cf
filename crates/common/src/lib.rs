//! Shared primitives for the tessera ledger engine.
//!
//! This crate collects the pieces every other crate needs: the closed
//! consensus error-code set ([`ErrorCode`] / [`OpResult`]), overflow-checked
//! integer math, the [`Hash256`] digest wrapper, and chain-wide constants
//! (reserved system addresses, recursion limits, store key prefixes).
//!
//! Nothing in here touches storage or the network; it is deliberately the
//! leaf of the workspace dependency graph.

pub mod error;
pub mod hash;
pub mod math;

pub use error::{ErrorCode, OpResult};
pub use hash::{hash_of, Hash256};
pub use math::{checked_add_i64, checked_mul_i64, checked_sub_i64, MathError};

/// Current ledger (protocol) version produced by this software.
pub const LEDGER_VERSION: u32 = 1003;
/// Oldest ledger version this software can follow.
pub const LEDGER_MIN_VERSION: u32 = 1000;

/// Maximum nesting depth of contract-triggered transactions. The stack
/// includes the client-submitted bottom transaction, so a chain of calls
/// nested deeper than this is rejected.
pub const CONTRACT_MAX_RECURSIVE_DEPTH: usize = 4;

/// Maximum number of contract-synthesized transactions a single bottom
/// transaction may spawn across its whole call tree.
pub const CONTRACT_MAX_TRANSACTIONS: usize = 512;

/// Hard cap on the serialized size of one transaction envelope, in bytes.
pub const TRANSACTION_LIMIT_SIZE: usize = 1024 * 1024;

/// Maximum number of operations in one transaction.
pub const TRANSACTION_MAX_OPERATIONS: usize = 100;

/// Wall-clock budget for executing one full block, in milliseconds.
pub const BLOCK_EXECUTE_TIMEOUT_MS: u64 = 5_000;

/// Wall-clock budget for one transaction's contract execution, in
/// milliseconds.
pub const TX_EXECUTE_TIMEOUT_MS: u64 = 1_000;

/// Keys and key prefixes in the persistent stores.
pub mod keys {
    /// Highest closed ledger sequence (account db and ledger db).
    pub const MAX_LEDGER_SEQ: &str = "maxLedgerSeq";
    /// Address of the genesis account.
    pub const GENESIS_ACCOUNT: &str = "genesisAccount";
    /// Proof blob for the last closed ledger.
    pub const LAST_PROOF: &str = "lastProof";
    /// Running node statistics (account count etc).
    pub const STATISTICS: &str = "statistics";
    /// Prefix for per-sequence ledger headers: `ledger-<seq>`.
    pub const LEDGER_PREFIX: &str = "ledger";
    /// Prefix for per-sequence consensus values: `consensusValue-<seq>`.
    pub const CONSENSUS_VALUE_PREFIX: &str = "consensusValue";
    /// Prefix for validator-set blobs keyed by hash: `validators-<hex>`.
    pub const VALIDATORS_PREFIX: &str = "validators";
    /// Prefix for fee-config blobs keyed by hash: `fees-<hex>`.
    pub const FEES_PREFIX: &str = "fees";
    /// Prefix for account records in the trie-backed store.
    pub const ACCOUNT_PREFIX: &str = "acc";
    /// Prefix for per-sequence transaction records: `txs-<seq>`.
    pub const TX_RECORDS_PREFIX: &str = "txs";

    /// Compose a `<prefix>-<seq>` store key.
    pub fn seq_key(prefix: &str, seq: u64) -> String {
        format!("{prefix}-{seq}")
    }

    /// Compose a `<prefix>-<hex hash>` store key.
    pub fn hash_key(prefix: &str, hash: &crate::Hash256) -> String {
        format!("{prefix}-{}", hash.to_hex())
    }
}

/// Reserved system addresses. Certain operation types may not target
/// these from ordinary accounts.
pub mod reserved {
    /// Validator-registry contract address.
    pub const VALIDATOR_ADDRESS: &str = "tsrQVALIDATORxxxxxxxxxxxxxxxxxxxxxx1";
    /// Fee-collection address.
    pub const FEE_ADDRESS: &str = "tsrQFEExxxxxxxxxxxxxxxxxxxxxxxxxxxx2";
    /// Reserved creator address for system-created accounts.
    pub const CREATOR_ADDRESS: &str = "tsrQCREATORxxxxxxxxxxxxxxxxxxxxxxxx3";
    /// DPoS election contract address.
    pub const DPOS_ADDRESS: &str = "tsrQDPOSxxxxxxxxxxxxxxxxxxxxxxxxxxx4";

    const RESERVED: [&str; 9] = [
        VALIDATOR_ADDRESS,
        FEE_ADDRESS,
        CREATOR_ADDRESS,
        DPOS_ADDRESS,
        "tsrQRESERVEDxxxxxxxxxxxxxxxxxxxxxxx5",
        "tsrQRESERVEDxxxxxxxxxxxxxxxxxxxxxxx6",
        "tsrQRESERVEDxxxxxxxxxxxxxxxxxxxxxxx7",
        "tsrQRESERVEDxxxxxxxxxxxxxxxxxxxxxxx8",
        "tsrQRESERVEDxxxxxxxxxxxxxxxxxxxxxxx9",
    ];

    /// Whether `addr` is one of the reserved system addresses.
    pub fn is_reserved(addr: &str) -> bool {
        RESERVED.contains(&addr)
    }

    /// A reserved destination is only reachable from another reserved
    /// (system) source.
    pub fn reserved_target_allowed(source: &str, dest: &str) -> bool {
        !is_reserved(dest) || is_reserved(source)
    }
}
