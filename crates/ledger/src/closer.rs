//! Closing ledgers.
//!
//! The [`LedgerCloser`] owns the last-closed-ledger state and the two
//! persistent collaborators: the ledger store (headers, consensus
//! values, transaction records) and the account side (key/value
//! bookkeeping plus the account trie). `close_ledger` is the only way
//! state advances:
//!
//! 1. verify the consensus value chains from the last closed ledger and
//!    its proof checks out;
//! 2. run the whole transaction set through one [`ExecutionContext`]
//!    over one root [`Environment`] on the last trie state;
//! 3. commit: merge the root scope into the trie under the write lock,
//!    recompute the tree hash, populate the header in a fixed field
//!    order with its own hash sealed strictly last, and write both
//!    store batches.
//!
//! A failed batch write here is fatal: the node can no longer prove its
//! durable state matches the agreed ledger, so the error carries
//! [`StoreError::Fatal`] up to the supervisor instead of being retried.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tessera_common::{keys, Hash256, BLOCK_EXECUTE_TIMEOUT_MS, LEDGER_MIN_VERSION, LEDGER_VERSION};
use tessera_contract::{ContractSandbox, ExecutionRegistry};
use tessera_store::{AccountTrie, KeyValueStore, StoreError, WriteBatch};
use tessera_tx::{
    AccountState, Address, ConsensusValue, Environment, FeeConfig, LedgerHeader, StateReader,
    TransactionRecord, Validator, ValidatorSet,
};
use tracing::{debug, info};

use crate::block::{ApplyMode, BlockFrame};
use crate::context::ExecutionContext;
use crate::error::{LedgerError, Result};

/// Upper bound on ledgers served per catch-up request.
pub const MAX_SYNC_LEDGERS: u64 = 5;

/// Shared handle to the account trie. Environment reads take the read
/// lock; the committing closer takes the write lock.
pub type SharedTrie = Arc<RwLock<Box<dyn AccountTrie>>>;

/// [`StateReader`] over the committed trie.
pub struct SharedState {
    trie: SharedTrie,
}

impl SharedState {
    pub fn new(trie: SharedTrie) -> Self {
        Self { trie }
    }
}

impl StateReader for SharedState {
    fn read_account(
        &self,
        address: &str,
    ) -> std::result::Result<Option<AccountState>, StoreError> {
        let trie = self.trie.read();
        match trie.get(address)? {
            Some(bytes) => bincode::deserialize(&bytes).map(Some).map_err(|e| {
                StoreError::Fatal(format!("corrupt account record for {address}: {e}"))
            }),
            None => Ok(None),
        }
    }
}

/// Validates consensus values and their proofs. The voting protocol
/// itself lives outside this crate; the closer only asks yes or no.
pub trait ConsensusVerifier: Send + Sync {
    fn check_value_and_proof(
        &self,
        value: &ConsensusValue,
        proof: &[u8],
        last_proof: &[u8],
    ) -> bool;
}

/// Verifier that accepts everything: tests and single-node tooling.
pub struct AcceptAll;

impl ConsensusVerifier for AcceptAll {
    fn check_value_and_proof(
        &self,
        _value: &ConsensusValue,
        _proof: &[u8],
        _last_proof: &[u8],
    ) -> bool {
        true
    }
}

/// Close notifications, delivered after the commit is durable.
pub trait LedgerObserver: Send + Sync {
    fn on_ledger_closed(&self, _header: &LedgerHeader, _has_upgrade: bool) {}
    fn on_transaction_applied(&self, _record: &TransactionRecord) {}
}

/// Node-local counters persisted alongside the account state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub account_count: u64,
}

/// Everything needed to create the first ledger.
#[derive(Debug, Clone)]
pub struct GenesisConfig {
    pub account: Address,
    pub balance: i64,
    pub validators: Vec<Address>,
    pub chain_id: u64,
}

/// One closed ledger as shipped to a catching-up peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedLedger {
    pub header: LedgerHeader,
    pub value: ConsensusValue,
}

/// Catch-up payload: sequential closed ledgers plus the proof for the
/// newest one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBundle {
    pub ledgers: Vec<ClosedLedger>,
    pub tip_proof: Vec<u8>,
}

pub struct LedgerCloser {
    ledger_store: Arc<dyn KeyValueStore>,
    account_store: Arc<dyn KeyValueStore>,
    trie: SharedTrie,
    sandbox: Arc<dyn ContractSandbox>,
    registry: Arc<ExecutionRegistry>,
    verifier: Box<dyn ConsensusVerifier>,
    observers: Vec<Arc<dyn LedgerObserver>>,
    chain_id: u64,
    cancel_flag: Option<Arc<AtomicBool>>,
    lcl: LedgerHeader,
    last_proof: Vec<u8>,
    fees: FeeConfig,
    validators: ValidatorSet,
    statistics: Statistics,
}

impl LedgerCloser {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger_store: Arc<dyn KeyValueStore>,
        account_store: Arc<dyn KeyValueStore>,
        trie: SharedTrie,
        sandbox: Arc<dyn ContractSandbox>,
        registry: Arc<ExecutionRegistry>,
        verifier: Box<dyn ConsensusVerifier>,
        chain_id: u64,
    ) -> Self {
        Self {
            ledger_store,
            account_store,
            trie,
            sandbox,
            registry,
            verifier,
            observers: Vec::new(),
            chain_id,
            cancel_flag: None,
            lcl: LedgerHeader::default(),
            last_proof: Vec::new(),
            fees: FeeConfig::default(),
            validators: ValidatorSet::default(),
            statistics: Statistics::default(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn LedgerObserver>) {
        self.observers.push(observer);
    }

    /// Route an external cancel flag (see [`crate::ExecutionPool`])
    /// into every subsequent close.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel_flag = Some(flag);
    }

    pub fn last_closed(&self) -> &LedgerHeader {
        &self.lcl
    }

    pub fn fee_config(&self) -> &FeeConfig {
        &self.fees
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn trie(&self) -> SharedTrie {
        self.trie.clone()
    }

    /// Load the last closed ledger from the stores, or create genesis
    /// when the stores are empty.
    pub fn initialize(&mut self, genesis: GenesisConfig) -> Result<LedgerHeader> {
        match self.account_store.get(keys::MAX_LEDGER_SEQ)? {
            Some(bytes) => {
                let seq: u64 = bincode::deserialize(&bytes)
                    .map_err(|e| LedgerError::Corrupt(format!("maxLedgerSeq: {e}")))?;
                self.load_last_closed(seq)
            }
            None => self.create_genesis(genesis),
        }
    }

    fn load_last_closed(&mut self, seq: u64) -> Result<LedgerHeader> {
        let header: LedgerHeader = self.read_ledger_blob(&keys::seq_key(keys::LEDGER_PREFIX, seq))?;
        if !header.verify_hash() {
            return Err(LedgerError::Corrupt(format!(
                "header {seq} fails its own hash"
            )));
        }
        self.fees = self.read_account_blob(&keys::hash_key(keys::FEES_PREFIX, &header.fees_hash))?;
        self.validators =
            self.read_account_blob(&keys::hash_key(keys::VALIDATORS_PREFIX, &header.validators_hash))?;
        if let Some(bytes) = self.account_store.get(keys::STATISTICS)? {
            self.statistics = bincode::deserialize(&bytes)
                .map_err(|e| LedgerError::Corrupt(format!("statistics: {e}")))?;
        }
        self.last_proof = self.account_store.get(keys::LAST_PROOF)?.unwrap_or_default();
        self.lcl = header.clone();
        info!(seq, hash = %header.hash, "loaded last closed ledger");
        Ok(header)
    }

    fn create_genesis(&mut self, genesis: GenesisConfig) -> Result<LedgerHeader> {
        self.chain_id = genesis.chain_id;
        self.fees = FeeConfig::default();
        self.validators = ValidatorSet {
            validators: genesis
                .validators
                .iter()
                .map(|address| Validator {
                    address: address.clone(),
                    pledge: 0,
                })
                .collect(),
        };

        let mut accounts = vec![AccountState::new(genesis.account.clone(), genesis.balance)];
        for validator in &genesis.validators {
            if *validator != genesis.account {
                accounts.push(AccountState::new(validator.clone(), 0));
            }
        }

        let mut header = LedgerHeader::default();
        {
            let trie = self.trie.write();
            for account in &accounts {
                let bytes = bincode::serialize(account)
                    .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
                trie.set(account.address.as_str(), &bytes)?;
            }
            let root = trie.update_hash()?;
            self.statistics.account_count = accounts.len() as u64;

            header.version = LEDGER_MIN_VERSION;
            header.validators_hash = self.validators.hash();
            header.fees_hash = self.fees.hash();
            header.account_tree_hash = root;
            header.consensus_value_hash = Hash256::zero();
            header.tx_count = 0;
            header.close_time = 0;
            header.seq = 1;
            header.previous_hash = Hash256::zero();
            header.chain_id = self.chain_id;
            header.seal();

            let mut ledger_batch = WriteBatch::new();
            ledger_batch.put(
                keys::seq_key(keys::LEDGER_PREFIX, 1),
                self.encode(&header)?,
            );
            self.write_fatal(&self.ledger_store, ledger_batch, "genesis ledger batch")?;

            let mut account_batch = WriteBatch::new();
            account_batch.put(keys::MAX_LEDGER_SEQ, self.encode(&1u64)?);
            account_batch.put(keys::GENESIS_ACCOUNT, genesis.account.as_str().as_bytes().to_vec());
            account_batch.put(keys::STATISTICS, self.encode(&self.statistics)?);
            account_batch.put(
                keys::hash_key(keys::FEES_PREFIX, &header.fees_hash),
                self.encode(&self.fees)?,
            );
            account_batch.put(
                keys::hash_key(keys::VALIDATORS_PREFIX, &header.validators_hash),
                self.encode(&self.validators)?,
            );
            self.write_fatal(&self.account_store, account_batch, "genesis account batch")?;
        }

        self.lcl = header.clone();
        info!(hash = %header.hash, accounts = accounts.len(), "genesis ledger created");
        Ok(header)
    }

    /// Advance the chain by one ledger. Returns the sealed header.
    pub fn close_ledger(
        &mut self,
        value: ConsensusValue,
        proof: Vec<u8>,
        mode: ApplyMode,
    ) -> Result<LedgerHeader> {
        let expected = self.lcl.seq + 1;
        if value.ledger_seq != expected {
            return Err(LedgerError::OutOfOrder {
                expected,
                got: value.ledger_seq,
            });
        }
        if value.previous_ledger_hash != self.lcl.hash {
            return Err(LedgerError::PreviousHashMismatch {
                seq: value.ledger_seq,
            });
        }
        if value.close_time < self.lcl.close_time {
            return Err(LedgerError::InvalidBlock(format!(
                "close time {} before previous {}",
                value.close_time, self.lcl.close_time
            )));
        }
        if !self
            .verifier
            .check_value_and_proof(&value, &proof, &self.last_proof)
        {
            return Err(LedgerError::BadProof {
                seq: value.ledger_seq,
            });
        }

        let mut env = Environment::new(Arc::new(SharedState::new(self.trie.clone())));
        let mut ctx = ExecutionContext::new(
            self.sandbox.clone(),
            self.registry.clone(),
            self.fees,
            value.ledger_seq,
            value.close_time,
            self.chain_id,
        );
        ctx.set_deadline(Instant::now() + Duration::from_millis(BLOCK_EXECUTE_TIMEOUT_MS));
        if let Some(flag) = &self.cancel_flag {
            ctx.set_cancel_flag(flag.clone());
        }

        let seq = value.ledger_seq;
        let mut block = BlockFrame::new(value);
        if !block.apply(&mut env, &mut ctx, mode)? {
            return Err(LedgerError::InvalidBlock(format!("seq {seq} failed check")));
        }
        // From here on only the block's own value counts: in propose
        // mode it has been pruned of dropped transactions, and that
        // pruned set is what peers must be able to replay.
        let value = block.value().clone();

        // Votes are read from the root layer before it is drained.
        let voted_fee = env.voted_fee(&self.fees);
        let voted_validators = env.voted_validators(&self.validators);
        let (accounts, _settings) = env.drain_root().map_err(LedgerError::Tx)?;

        let mut new_version = self.lcl.version;
        let mut has_upgrade = false;
        let mut validators = match voted_validators {
            Some(v) => {
                has_upgrade = true;
                v
            }
            None => self.validators.clone(),
        };
        let fees = match voted_fee {
            Some(f) => {
                has_upgrade = true;
                f
            }
            None => self.fees,
        };
        if let Some(upgrade) = &value.upgrade {
            if let Some(version) = upgrade.new_ledger_version {
                if version > new_version && version <= LEDGER_VERSION {
                    new_version = version;
                    has_upgrade = true;
                }
            }
            if let Some(address) = &upgrade.new_validator {
                validators = ValidatorSet::single(address.clone());
                has_upgrade = true;
            }
        }

        let mut header = LedgerHeader::default();
        {
            let trie = self.trie.write();
            let mut created = 0u64;
            for (address, account) in &accounts {
                if trie.get(address.as_str())?.is_none() {
                    created += 1;
                }
                let bytes = bincode::serialize(account)
                    .map_err(|e| LedgerError::Corrupt(e.to_string()))?;
                trie.set(address.as_str(), &bytes)?;
            }
            let root = trie.update_hash()?;
            self.statistics.account_count += created;

            // Fixed population order; the header's own hash comes last.
            header.version = new_version;
            header.validators_hash = validators.hash();
            header.fees_hash = fees.hash();
            header.account_tree_hash = root;
            header.consensus_value_hash = value.hash();
            header.tx_count = self.lcl.tx_count + block.applied_count();
            header.close_time = value.close_time;
            header.seq = value.ledger_seq;
            header.previous_hash = self.lcl.hash;
            header.chain_id = self.chain_id;
            header.seal();

            let mut ledger_batch = WriteBatch::new();
            ledger_batch.put(
                keys::seq_key(keys::LEDGER_PREFIX, header.seq),
                self.encode(&header)?,
            );
            ledger_batch.put(
                keys::seq_key(keys::CONSENSUS_VALUE_PREFIX, header.seq),
                self.encode(&value)?,
            );
            ledger_batch.put(
                keys::seq_key(keys::TX_RECORDS_PREFIX, header.seq),
                self.encode(&block.records().to_vec())?,
            );
            self.write_fatal(&self.ledger_store, ledger_batch, "ledger batch")?;

            let mut account_batch = WriteBatch::new();
            account_batch.put(keys::MAX_LEDGER_SEQ, self.encode(&header.seq)?);
            account_batch.put(keys::LAST_PROOF, proof.clone());
            account_batch.put(keys::STATISTICS, self.encode(&self.statistics)?);
            account_batch.put(
                keys::hash_key(keys::FEES_PREFIX, &header.fees_hash),
                self.encode(&fees)?,
            );
            account_batch.put(
                keys::hash_key(keys::VALIDATORS_PREFIX, &header.validators_hash),
                self.encode(&validators)?,
            );
            self.write_fatal(&self.account_store, account_batch, "account batch")?;
        }

        self.lcl = header.clone();
        self.fees = fees;
        self.validators = validators;
        self.last_proof = proof;

        info!(
            seq = header.seq,
            hash = %header.hash,
            txs = block.applied_count(),
            dropped = block.dropped().len(),
            has_upgrade,
            "ledger closed"
        );
        for observer in &self.observers {
            observer.on_ledger_closed(&header, has_upgrade);
            for record in block.records() {
                observer.on_transaction_applied(record);
            }
        }
        Ok(header)
    }

    /// Serve a catch-up request: at most [`MAX_SYNC_LEDGERS`] sequential
    /// closed ledgers from `start_seq`, with the proof attached when
    /// the range reaches the tip. Genesis (seq 1) has no consensus
    /// value and is never served; peers create their own.
    pub fn on_request_ledgers(&self, start_seq: u64, count: u64) -> Result<SyncBundle> {
        let start = start_seq.max(2);
        let count = count.min(MAX_SYNC_LEDGERS);
        let mut ledgers = Vec::new();
        for seq in start..start.saturating_add(count) {
            if seq > self.lcl.seq {
                break;
            }
            let header: LedgerHeader =
                self.read_ledger_blob(&keys::seq_key(keys::LEDGER_PREFIX, seq))?;
            let value: ConsensusValue =
                self.read_ledger_blob(&keys::seq_key(keys::CONSENSUS_VALUE_PREFIX, seq))?;
            ledgers.push(ClosedLedger { header, value });
        }
        let at_tip = ledgers
            .last()
            .map(|l| l.header.seq == self.lcl.seq)
            .unwrap_or(false);
        Ok(SyncBundle {
            ledgers,
            tip_proof: if at_tip {
                self.last_proof.clone()
            } else {
                Vec::new()
            },
        })
    }

    /// Replay received ledgers through the normal close path, verifying
    /// each replayed header matches what the peer sent.
    pub fn on_receive_ledgers(&mut self, bundle: SyncBundle) -> Result<u64> {
        let total = bundle.ledgers.len();
        for (index, closed) in bundle.ledgers.into_iter().enumerate() {
            if closed.value.ledger_seq <= self.lcl.seq {
                debug!(seq = closed.value.ledger_seq, "skipping stale ledger");
                continue;
            }
            let proof = if index + 1 == total {
                bundle.tip_proof.clone()
            } else {
                Vec::new()
            };
            let header = self.close_ledger(closed.value, proof, ApplyMode::Follow)?;
            if header.hash != closed.header.hash {
                return Err(LedgerError::Divergence { seq: header.seq });
            }
        }
        Ok(self.lcl.seq)
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| LedgerError::Corrupt(e.to_string()))
    }

    fn read_ledger_blob<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<T> {
        let bytes = self
            .ledger_store
            .get(key)?
            .ok_or_else(|| LedgerError::Corrupt(format!("missing ledger record {key}")))?;
        bincode::deserialize(&bytes).map_err(|e| LedgerError::Corrupt(format!("{key}: {e}")))
    }

    fn read_account_blob<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<T> {
        let bytes = self
            .account_store
            .get(key)?
            .ok_or_else(|| LedgerError::Corrupt(format!("missing account record {key}")))?;
        bincode::deserialize(&bytes).map_err(|e| LedgerError::Corrupt(format!("{key}: {e}")))
    }

    fn write_fatal(
        &self,
        store: &Arc<dyn KeyValueStore>,
        batch: WriteBatch,
        what: &str,
    ) -> Result<()> {
        store.write_batch(batch).map_err(|e| {
            LedgerError::Store(StoreError::Fatal(format!("{what} write failed: {e}")))
        })
    }
}
