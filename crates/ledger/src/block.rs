//! Applying one block's transaction set.
//!
//! The same code path serves three roles, differing only in what
//! happens to an invalid transaction:
//!
//! - `Propose`: building a block from the local pool; invalid
//!   transactions are dropped from the set before it goes to consensus.
//! - `Check`: judging another node's proposal; one invalid transaction
//!   condemns the whole block.
//! - `Follow`: applying what consensus agreed on; every transaction is
//!   executed and its outcome recorded, a validation failure becoming a
//!   no-effect failure record.

use std::collections::BTreeSet;

use tessera_common::{Hash256, OpResult};
use tessera_tx::{ConsensusValue, Environment, TransactionEnvelope, TransactionRecord};
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    Propose,
    Check,
    Follow,
}

/// One block mid-application.
pub struct BlockFrame {
    value: ConsensusValue,
    records: Vec<TransactionRecord>,
    dropped: Vec<(TransactionEnvelope, OpResult)>,
    applied: u64,
}

impl BlockFrame {
    pub fn new(value: ConsensusValue) -> Self {
        Self {
            value,
            records: Vec::new(),
            dropped: Vec::new(),
            applied: 0,
        }
    }

    pub fn value(&self) -> &ConsensusValue {
        &self.value
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn dropped(&self) -> &[(TransactionEnvelope, OpResult)] {
        &self.dropped
    }

    /// Transactions executed (client-submitted only, not synthesized).
    pub fn applied_count(&self) -> u64 {
        self.applied
    }

    /// Run the transaction set. `Ok(false)` means the block failed
    /// check-mode validation and must be voted down.
    pub fn apply(
        &mut self,
        env: &mut Environment,
        ctx: &mut ExecutionContext,
        mode: ApplyMode,
    ) -> Result<bool> {
        let txset = self.value.txset.clone();
        for envelope in txset {
            if mode != ApplyMode::Follow {
                let valid = ctx.check(env, &envelope)?;
                if !valid.is_success() {
                    if mode == ApplyMode::Check {
                        info!(
                            seq = self.value.ledger_seq,
                            tx = %envelope.hash(),
                            code = %valid.code(),
                            "block rejected: invalid transaction"
                        );
                        return Ok(false);
                    }
                    debug!(tx = %envelope.hash(), code = %valid.code(), "dropping invalid transaction");
                    self.dropped.push((envelope, valid));
                    continue;
                }
            }
            let (mut records, _state) = ctx.execute(env, envelope)?;
            self.applied += 1;
            self.records.append(&mut records);
        }

        if mode == ApplyMode::Propose && !self.dropped.is_empty() {
            let dropped: BTreeSet<Hash256> =
                self.dropped.iter().map(|(e, _)| e.hash()).collect();
            self.value.txset.retain(|e| !dropped.contains(&e.hash()));
        }
        Ok(true)
    }
}
