//! The consensus data model.
//!
//! Every type here is part of what nodes must agree on byte-for-byte:
//! all of them derive `Serialize`/`Deserialize`, all maps are `BTreeMap`,
//! and content hashes are SHA-256 over the canonical bincode encoding
//! (see `tessera_common::hash_of`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_common::{hash_of, Hash256, OpResult};

/// Chain address: `tsrQ` prefix, 36 alphanumeric characters total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Address(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Syntactic validity only; existence is a separate question.
    pub fn is_valid(&self) -> bool {
        self.0.len() == 36
            && self.0.starts_with("tsrQ")
            && self.0.bytes().all(|b| b.is_ascii_alphanumeric())
    }

    /// Whether this is one of the reserved system addresses.
    pub fn is_reserved(&self) -> bool {
        tessera_common::reserved::is_reserved(&self.0)
    }
}

impl std::borrow::Borrow<str> for Address {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Address(s.to_string())
    }
}

/// Identifies an asset by its issuing account and code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub issuer: Address,
    pub code: String,
}

/// One metadata entry under an account, with an optimistic version
/// counter bumped on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub value: String,
    pub version: u64,
}

/// Contract payload attached to an account. `kind` selects the sandbox
/// engine; 0 is the default scripting engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub payload: String,
    pub kind: u32,
}

/// Operation discriminant, used for per-type thresholds and the gas
/// table. Wire values are fixed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u32)]
pub enum OperationType {
    CreateAccount = 1,
    IssueAsset = 2,
    PayAsset = 3,
    SetMetadata = 4,
    SetSignerWeight = 5,
    SetThreshold = 6,
    PayCoin = 7,
    Log = 8,
    SetPrivilege = 9,
}

/// Signing thresholds: one for transactions overall, with optional
/// per-operation-type overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub tx_threshold: u64,
    pub type_thresholds: BTreeMap<OperationType, u64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            tx_threshold: 1,
            type_thresholds: BTreeMap::new(),
        }
    }
}

/// Account signing privileges: the master key's weight plus additional
/// signers and the thresholds their combined weight must reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Privilege {
    pub master_weight: u64,
    pub signers: BTreeMap<Address, u64>,
    pub thresholds: Thresholds,
}

impl Default for Privilege {
    fn default() -> Self {
        Self {
            master_weight: 1,
            signers: BTreeMap::new(),
            thresholds: Thresholds::default(),
        }
    }
}

/// Full state of one account. Accounts are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub address: Address,
    pub balance: i64,
    pub nonce: u64,
    pub metadata: BTreeMap<String, MetadataEntry>,
    pub assets: BTreeMap<AssetKey, i64>,
    pub contract: Option<ContractInfo>,
    pub privilege: Privilege,
}

/// Body of one operation. Amount fields are always non-negative; that
/// is enforced at validation, not by the types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationBody {
    CreateAccount {
        dest: Address,
        init_balance: i64,
        privilege: Privilege,
        contract: Option<ContractInfo>,
        /// Input passed to the contract's `init` entry on creation.
        init_input: Option<String>,
    },
    IssueAsset {
        code: String,
        amount: i64,
    },
    PayAsset {
        dest: Address,
        asset: AssetKey,
        amount: i64,
        /// Input for the destination contract's `main` entry.
        input: Option<String>,
    },
    SetMetadata {
        key: String,
        value: String,
        /// 0 means "don't care"; otherwise must equal the stored version.
        version: u64,
        delete: bool,
    },
    SetSignerWeight {
        master_weight: Option<u64>,
        /// Weight 0 removes the signer.
        signers: BTreeMap<Address, u64>,
    },
    SetThreshold {
        tx_threshold: Option<u64>,
        type_thresholds: BTreeMap<OperationType, u64>,
    },
    PayCoin {
        dest: Address,
        amount: i64,
        input: Option<String>,
    },
    Log {
        topic: String,
        data: Vec<String>,
    },
    SetPrivilege {
        master_weight: Option<u64>,
        signers: BTreeMap<Address, u64>,
        tx_threshold: Option<u64>,
        type_thresholds: BTreeMap<OperationType, u64>,
    },
}

impl OperationBody {
    pub fn op_type(&self) -> OperationType {
        match self {
            OperationBody::CreateAccount { .. } => OperationType::CreateAccount,
            OperationBody::IssueAsset { .. } => OperationType::IssueAsset,
            OperationBody::PayAsset { .. } => OperationType::PayAsset,
            OperationBody::SetMetadata { .. } => OperationType::SetMetadata,
            OperationBody::SetSignerWeight { .. } => OperationType::SetSignerWeight,
            OperationBody::SetThreshold { .. } => OperationType::SetThreshold,
            OperationBody::PayCoin { .. } => OperationType::PayCoin,
            OperationBody::Log { .. } => OperationType::Log,
            OperationBody::SetPrivilege { .. } => OperationType::SetPrivilege,
        }
    }
}

/// One operation inside a transaction, with an optional per-operation
/// source overriding the transaction source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub source: Option<Address>,
    pub body: OperationBody,
}

impl Operation {
    pub fn new(body: OperationBody) -> Self {
        Self { source: None, body }
    }
}

/// The signed content of a transaction. Its canonical hash is the
/// transaction's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub source: Address,
    /// Must equal the source account's stored nonce + 1.
    pub nonce: u64,
    /// Upper bound on the total fee the source is willing to pay.
    pub fee_limit: i64,
    pub gas_price: i64,
    pub operations: Vec<Operation>,
    pub metadata: Option<String>,
    pub chain_id: u64,
}

impl Transaction {
    pub fn hash(&self) -> Hash256 {
        hash_of(self)
    }
}

/// A signature over the transaction content hash. Cryptographic
/// verification happens upstream of the engine; the frame only checks
/// that the signer weights reach the required threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signer: Address,
    pub signature: Vec<u8>,
}

/// Back-reference carried by contract-synthesized transactions: the
/// transaction and operation index that triggered them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub tx_hash: Hash256,
    pub op_index: u32,
}

/// Transaction plus signatures plus the optional trigger back-reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub tx: Transaction,
    pub signatures: Vec<Signature>,
    pub trigger: Option<Trigger>,
}

impl TransactionEnvelope {
    pub fn new(tx: Transaction) -> Self {
        Self {
            tx,
            signatures: Vec::new(),
            trigger: None,
        }
    }

    /// Identity hash: content only, signatures excluded.
    pub fn hash(&self) -> Hash256 {
        self.tx.hash()
    }

    /// Serialized size, used for byte gas and the envelope size cap.
    pub fn byte_size(&self) -> usize {
        bincode::serialized_size(self).unwrap_or(0) as usize
    }

    pub fn is_synthesized(&self) -> bool {
        self.trigger.is_some()
    }
}

/// Record of one applied (or failed) transaction, persisted per ledger
/// and fed to observers. Synthesized transactions get their own records
/// in the caller's instruction log, linked via `envelope.trigger`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub envelope: TransactionEnvelope,
    pub result: OpResult,
    pub ledger_seq: u64,
    pub close_time: i64,
    pub actual_fee: i64,
    pub contract_logs: Vec<String>,
}

/// Upgrade piggybacked on a consensus value; applied before the header
/// is hashed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LedgerUpgrade {
    pub new_ledger_version: Option<u32>,
    /// Hardfork replacement of the validator set with a single validator.
    pub new_validator: Option<Address>,
}

impl LedgerUpgrade {
    pub fn is_empty(&self) -> bool {
        self.new_ledger_version.is_none() && self.new_validator.is_none()
    }
}

/// What consensus agreed on for one ledger close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusValue {
    pub ledger_seq: u64,
    pub close_time: i64,
    pub previous_ledger_hash: Hash256,
    pub previous_proof: Vec<u8>,
    pub txset: Vec<TransactionEnvelope>,
    pub upgrade: Option<LedgerUpgrade>,
}

impl ConsensusValue {
    pub fn hash(&self) -> Hash256 {
        hash_of(self)
    }
}

/// Closed-ledger header. `hash` commits to every other field and is
/// computed strictly last, over the encoding with `hash` zeroed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LedgerHeader {
    pub seq: u64,
    pub hash: Hash256,
    pub previous_hash: Hash256,
    pub account_tree_hash: Hash256,
    pub consensus_value_hash: Hash256,
    pub validators_hash: Hash256,
    pub fees_hash: Hash256,
    pub close_time: i64,
    pub version: u32,
    /// Cumulative count of transactions across all closed ledgers.
    pub tx_count: u64,
    pub chain_id: u64,
}

impl LedgerHeader {
    /// Hash of this header with its own `hash` field zeroed.
    pub fn compute_hash(&self) -> Hash256 {
        let mut unsealed = self.clone();
        unsealed.hash = Hash256::zero();
        hash_of(&unsealed)
    }

    /// Populate `hash` from the other fields. Must be the last mutation.
    pub fn seal(&mut self) {
        self.hash = self.compute_hash();
    }

    /// Whether `hash` matches the other fields.
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// Chain fee parameters, agreed by validator vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub gas_price: i64,
    /// Minimum balance an account must retain.
    pub base_reserve: i64,
}

impl FeeConfig {
    pub fn hash(&self) -> Hash256 {
        hash_of(self)
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            gas_price: 1,
            base_reserve: 100,
        }
    }
}

/// One validator and its pledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub pledge: i64,
}

/// The active validator set, hashed into every header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidatorSet {
    pub validators: Vec<Validator>,
}

impl ValidatorSet {
    pub fn hash(&self) -> Hash256 {
        hash_of(self)
    }

    pub fn single(address: Address) -> Self {
        Self {
            validators: vec![Validator { address, pledge: 0 }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: &str) -> Address {
        let mut s = format!("tsrQ{tag}");
        while s.len() < 36 {
            s.push('x');
        }
        Address::new(s)
    }

    #[test]
    fn test_address_validity() {
        assert!(addr("alice").is_valid());
        assert!(!Address::new("short").is_valid());
        assert!(!Address::new("badQprefixxxxxxxxxxxxxxxxxxxxxxxxxxx").is_valid());
        assert!(!addr("with space").is_valid());
    }

    #[test]
    fn test_envelope_hash_ignores_signatures() {
        let tx = Transaction {
            source: addr("alice"),
            nonce: 1,
            fee_limit: 100,
            gas_price: 1,
            operations: vec![Operation::new(OperationBody::Log {
                topic: "t".into(),
                data: vec![],
            })],
            metadata: None,
            chain_id: 1,
        };
        let mut env = TransactionEnvelope::new(tx);
        let before = env.hash();
        env.signatures.push(Signature {
            signer: addr("alice"),
            signature: vec![1, 2, 3],
        });
        assert_eq!(env.hash(), before);
    }

    #[test]
    fn test_header_seal_is_idempotent() {
        let mut header = LedgerHeader {
            seq: 7,
            close_time: 1000,
            version: 1003,
            ..Default::default()
        };
        header.seal();
        let first = header.hash;
        assert!(header.verify_hash());
        header.seal();
        assert_eq!(header.hash, first);
    }

    #[test]
    fn test_header_hash_covers_fields() {
        let mut a = LedgerHeader {
            seq: 7,
            ..Default::default()
        };
        a.seal();
        let mut b = LedgerHeader {
            seq: 8,
            ..Default::default()
        };
        b.seal();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_op_type_mapping() {
        let op = OperationBody::PayCoin {
            dest: addr("bob"),
            amount: 1,
            input: None,
        };
        assert_eq!(op.op_type(), OperationType::PayCoin);
    }
}
