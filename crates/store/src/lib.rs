//! Persistent-store seams for the tessera ledger engine.
//!
//! The state-transition core treats persistence as two narrow, opaque
//! collaborators:
//!
//! - [`KeyValueStore`]: an ordered byte-oriented key/value store with
//!   atomic batch writes, used for ledger headers, consensus values and
//!   node bookkeeping.
//! - [`AccountTrie`]: a keyed store over account records that can produce
//!   a single commitment hash over its whole contents. The real node
//!   plugs a Merkle trie in here; its internal layout is deliberately not
//!   part of this crate's contract.
//!
//! [`MemoryStore`] and [`MemoryTrie`] are complete in-process
//! implementations used by tests and single-process tooling.
//!
//! Store failures during a commit are unrecoverable by design: a node
//! that cannot prove its on-disk state matches the agreed ledger must
//! stop rather than drift from its peers. That policy is expressed as
//! [`StoreError::Fatal`], which the process supervisor maps to shutdown —
//! not as a process-exit call buried down here.

mod error;
mod kv;
mod trie;

pub use error::StoreError;
pub use kv::{BatchOp, KeyValueStore, MemoryStore, WriteBatch};
pub use trie::{AccountTrie, MemoryTrie};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
