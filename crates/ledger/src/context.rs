//! The execution context: nested contract-call transactions.
//!
//! One [`ExecutionContext`] drives one pass over a block. For each
//! client-submitted envelope it runs a [`TransactionFrame`]; when an
//! applied operation triggers a contract, the context runs the sandbox
//! with itself as the [`ChainHost`], and host mutations come back in as
//! synthesized transactions through [`do_transaction`] — pushed onto
//! the same frame stack, applied in a child scope of the caller, and
//! recorded in the caller's instruction log.
//!
//! Budgets are enforced here: recursion depth against the frame stack,
//! a per-bottom-transaction cap on synthesized transactions, step and
//! memory ceilings reported by the sandbox, and the pass's wall clock.
//!
//! [`do_transaction`]: ExecutionContext::do_transaction

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tessera_common::{
    checked_add_i64, ErrorCode, Hash256, OpResult, CONTRACT_MAX_RECURSIVE_DEPTH,
    CONTRACT_MAX_TRANSACTIONS,
};
use tessera_contract::{
    BlockInfo, ChainHost, ContractError, ContractParameter, ContractSandbox, ExecutionRegistry,
    TxInfo,
};
use tessera_tx::{
    fee, AssetKey, ContractEntry, ContractInvoker, ContractTrigger, Environment, FeeConfig,
    FrameState, Operation, OperationBody, Transaction, TransactionEnvelope, TransactionFrame,
    TransactionRecord, Trigger, TxError,
};
use tracing::{debug, warn};

use crate::error::{LedgerError, Result};

/// Ceiling on sandbox-reported instruction steps per bottom transaction.
pub const STEP_LIMIT: u64 = 10_000_000;
/// Ceiling on sandbox-reported memory per bottom transaction, in bytes.
pub const MEMORY_LIMIT: u64 = 64 * 1024 * 1024;

struct StackEntry {
    tx_hash: Hash256,
    source: tessera_tx::Address,
}

pub struct ExecutionContext {
    sandbox: Arc<dyn ContractSandbox>,
    registry: Arc<ExecutionRegistry>,
    fees: FeeConfig,
    ledger_seq: u64,
    close_time: i64,
    chain_id: u64,
    deadline: Option<Instant>,
    cancel_flag: Arc<AtomicBool>,
    stack: Vec<StackEntry>,
    /// Gas charged to the bottom transaction by nested execution.
    extra_gas: i64,
    synthesized: usize,
    steps: u64,
    memory: u64,
    logs: Vec<String>,
    records: Vec<TransactionRecord>,
}

impl ExecutionContext {
    pub fn new(
        sandbox: Arc<dyn ContractSandbox>,
        registry: Arc<ExecutionRegistry>,
        fees: FeeConfig,
        ledger_seq: u64,
        close_time: i64,
        chain_id: u64,
    ) -> Self {
        Self {
            sandbox,
            registry,
            fees,
            ledger_seq,
            close_time,
            chain_id,
            deadline: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            stack: Vec::new(),
            extra_gas: 0,
            synthesized: 0,
            steps: 0,
            memory: 0,
            logs: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Wall-clock cutoff for this pass.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Shared flag a supervisor can raise to stop the pass.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    /// Replace the cancel flag with one owned by a supervisor, so an
    /// external timeout can stop this pass.
    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel_flag = flag;
    }

    pub fn fees(&self) -> &FeeConfig {
        &self.fees
    }

    /// Validate an envelope without applying it.
    pub fn check(&self, env: &Environment, envelope: &TransactionEnvelope) -> Result<OpResult> {
        let frame = TransactionFrame::new(envelope.clone(), self.ledger_seq, self.close_time);
        Ok(frame.check_valid(env, &self.fees)?)
    }

    /// Run one client-submitted envelope to completion. Returns the
    /// records of the bottom transaction and every synthesized
    /// transaction it spawned, in completion order (bottom last), plus
    /// the bottom frame's final state.
    pub fn execute(
        &mut self,
        env: &mut Environment,
        envelope: TransactionEnvelope,
    ) -> Result<(Vec<TransactionRecord>, FrameState)> {
        if !self.stack.is_empty() {
            return Err(LedgerError::Tx(TxError::Internal(
                "execute re-entered with frames active".into(),
            )));
        }
        self.extra_gas = 0;
        self.synthesized = 0;
        self.steps = 0;
        self.memory = 0;
        self.logs.clear();
        self.records.clear();

        let mut frame = TransactionFrame::new(envelope, self.ledger_seq, self.close_time);
        self.stack.push(StackEntry {
            tx_hash: frame.hash(),
            source: frame.source().clone(),
        });
        let fees = self.fees;
        let applied = frame.apply(env, &fees, self);
        self.stack.pop();
        applied?;

        let mut record = frame.to_record();
        record.contract_logs.extend(self.logs.drain(..));
        let mut records = std::mem::take(&mut self.records);
        records.push(record);
        Ok((records, frame.state()))
    }

    /// Re-entry point for contract-synthesized transactions.
    ///
    /// The synthesized envelope's byte gas is charged to the bottom
    /// transaction whether or not the call is admitted; budget failures
    /// return as consensus codes that abort the whole calling
    /// transaction.
    fn do_transaction(
        &mut self,
        env: &mut Environment,
        envelope: TransactionEnvelope,
    ) -> tessera_tx::Result<OpResult> {
        self.synthesized += 1;
        if self.synthesized > CONTRACT_MAX_TRANSACTIONS {
            return Ok(OpResult::error(
                ErrorCode::ContractTooManyTransactions,
                format!("synthesized-transaction budget {CONTRACT_MAX_TRANSACTIONS} exhausted"),
            ));
        }
        match fee::byte_gas(&envelope).and_then(|gas| checked_add_i64(self.extra_gas, gas)) {
            Ok(total) => self.extra_gas = total,
            Err(_) => {
                return Ok(OpResult::error(
                    ErrorCode::MathOverflow,
                    "synthesized byte gas overflow",
                ))
            }
        }
        if self.stack.len() >= CONTRACT_MAX_RECURSIVE_DEPTH {
            return Ok(OpResult::error(
                ErrorCode::ContractTooManyRecursion,
                format!("call depth exceeds {CONTRACT_MAX_RECURSIVE_DEPTH}"),
            ));
        }

        let mut frame = TransactionFrame::new(envelope, self.ledger_seq, self.close_time);
        self.stack.push(StackEntry {
            tx_hash: frame.hash(),
            source: frame.source().clone(),
        });
        let fees = self.fees;
        let applied = frame.apply(env, &fees, self);
        self.stack.pop();
        let result = applied?;

        debug!(
            depth = self.stack.len() + 1,
            code = %result.code(),
            "synthesized transaction finished"
        );
        self.records.push(frame.to_record());
        Ok(result)
    }

    /// Build the synthesized envelope for a host mutation: source is
    /// the contract account, nonce continues the contract's nonce as
    /// seen through the caller's scope, no fee or signatures of its own.
    fn synthesize(
        &mut self,
        env: &mut Environment,
        source: &tessera_tx::Address,
        origin: Trigger,
        op: OperationBody,
    ) -> tessera_tx::Result<OpResult> {
        let nonce = env
            .get_account(source.as_str())?
            .map(|acc| acc.nonce + 1)
            .unwrap_or(1);
        let mut envelope = TransactionEnvelope::new(Transaction {
            source: source.clone(),
            nonce,
            fee_limit: 0,
            gas_price: 0,
            operations: vec![Operation::new(op)],
            metadata: None,
            chain_id: self.chain_id,
        });
        envelope.trigger = Some(origin);
        self.do_transaction(env, envelope)
    }

    /// Read-only contract query; never part of consensus. The script
    /// runs against a scratch scope that is discarded unconditionally,
    /// so host mutations cannot leak into the pass's state.
    pub fn query(
        &mut self,
        env: &mut Environment,
        contract: &tessera_tx::Address,
        input: &str,
    ) -> Result<String> {
        let account = env
            .get_account(contract.as_str())
            .map_err(LedgerError::Tx)?;
        let info = account.and_then(|acc| acc.contract).ok_or_else(|| {
            LedgerError::Query(format!("{contract} is not a contract account"))
        })?;
        let id = self.registry.begin();
        let param = ContractParameter {
            contract: contract.to_string(),
            payload: info.payload,
            entry: "query".into(),
            input: input.to_string(),
            id,
        };
        let sandbox = self.sandbox.clone();
        let origin = Trigger {
            tx_hash: Hash256::zero(),
            op_index: 0,
        };
        self.stack.push(StackEntry {
            tx_hash: Hash256::zero(),
            source: contract.clone(),
        });
        env.push_scope();
        let answer = {
            let mut host = HostAdapter {
                ctx: self,
                env,
                contract: contract.clone(),
                origin,
            };
            sandbox.query(&param, &mut host)
        };
        env.discard_scope().map_err(LedgerError::Tx)?;
        self.stack.pop();
        self.registry.end(id);
        answer.map_err(|e| LedgerError::Query(e.to_string()))
    }
}

impl ContractInvoker for ExecutionContext {
    fn invoke(
        &mut self,
        env: &mut Environment,
        trigger: &ContractTrigger,
        origin: Trigger,
    ) -> tessera_tx::Result<OpResult> {
        let account = env.get_account(trigger.contract.as_str())?;
        let info = match account.and_then(|acc| acc.contract) {
            Some(info) => info,
            None => {
                return Ok(OpResult::error(
                    ErrorCode::ContractExecuteFail,
                    format!("{} is not a contract account", trigger.contract),
                ))
            }
        };
        if let Err(e) = self.sandbox.check_syntax(&info.payload) {
            return Ok(OpResult::error(ErrorCode::ContractSyntaxError, e.to_string()));
        }

        let id = self.registry.begin();
        let param = ContractParameter {
            contract: trigger.contract.to_string(),
            payload: info.payload,
            entry: match trigger.entry {
                ContractEntry::Init => "init".into(),
                ContractEntry::Main => "main".into(),
            },
            input: trigger.input.clone(),
            id,
        };
        let sandbox = self.sandbox.clone();
        let outcome = {
            let mut host = HostAdapter {
                ctx: self,
                env,
                contract: trigger.contract.clone(),
                origin,
            };
            sandbox.execute(&param, &mut host)
        };
        self.registry.end(id);

        match outcome {
            Ok(result) => Ok(result),
            Err(ContractError::Syntax(e)) => {
                Ok(OpResult::error(ErrorCode::ContractSyntaxError, e))
            }
            Err(ContractError::Execute(e)) => {
                Ok(OpResult::error(ErrorCode::ContractExecuteFail, e))
            }
            Err(ContractError::Cancelled) => {
                warn!(contract = %trigger.contract, "contract execution cancelled");
                Ok(OpResult::error(ErrorCode::TxTimeout, "execution cancelled"))
            }
            Err(ContractError::Infra(e)) => Err(TxError::Internal(e)),
        }
    }

    fn accrued_gas(&self) -> i64 {
        self.extra_gas
    }

    fn expired(&self) -> bool {
        if self.cancel_flag.load(Ordering::Relaxed) {
            return true;
        }
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

/// [`ChainHost`] bound to a specific contract execution: the context,
/// the environment of the pass, the contract account acting as source,
/// and the trigger back-reference for synthesized envelopes.
struct HostAdapter<'a> {
    ctx: &'a mut ExecutionContext,
    env: &'a mut Environment,
    contract: tessera_tx::Address,
    origin: Trigger,
}

impl HostAdapter<'_> {
    fn infra(e: impl std::fmt::Display) -> ContractError {
        ContractError::Infra(e.to_string())
    }

    fn synthesize(&mut self, op: OperationBody) -> tessera_contract::Result<OpResult> {
        let contract = self.contract.clone();
        let origin = self.origin;
        self.ctx
            .synthesize(self.env, &contract, origin, op)
            .map_err(Self::infra)
    }
}

impl ChainHost for HostAdapter<'_> {
    fn block_info(&self) -> BlockInfo {
        BlockInfo {
            ledger_seq: self.ctx.ledger_seq,
            close_time: self.ctx.close_time,
        }
    }

    fn tx_info(&self) -> TxInfo {
        let bottom = self.ctx.stack.first();
        TxInfo {
            tx_hash: bottom
                .map(|e| e.tx_hash.to_hex())
                .unwrap_or_default(),
            source: bottom
                .map(|e| e.source.to_string())
                .unwrap_or_default(),
            contract: self.contract.to_string(),
        }
    }

    fn get_balance(&mut self, address: &str) -> tessera_contract::Result<i64> {
        Ok(self
            .env
            .get_account(address)
            .map_err(Self::infra)?
            .map(|acc| acc.balance)
            .unwrap_or(0))
    }

    fn get_account(&mut self, address: &str) -> tessera_contract::Result<Option<Value>> {
        Ok(self
            .env
            .get_account(address)
            .map_err(Self::infra)?
            .map(|acc| {
                json!({
                    "address": acc.address.to_string(),
                    "balance": acc.balance,
                    "nonce": acc.nonce,
                    "is_contract": acc.is_contract(),
                })
            }))
    }

    fn get_metadata(&mut self, address: &str, key: &str) -> tessera_contract::Result<Option<String>> {
        Ok(self
            .env
            .get_account(address)
            .map_err(Self::infra)?
            .and_then(|acc| acc.metadata.get(key).map(|entry| entry.value.clone())))
    }

    fn set_metadata(
        &mut self,
        key: &str,
        value: &str,
        version: u64,
        delete: bool,
    ) -> tessera_contract::Result<OpResult> {
        self.synthesize(OperationBody::SetMetadata {
            key: key.to_string(),
            value: value.to_string(),
            version,
            delete,
        })
    }

    fn pay_coin(&mut self, dest: &str, amount: i64, input: &str) -> tessera_contract::Result<OpResult> {
        self.synthesize(OperationBody::PayCoin {
            dest: tessera_tx::Address::new(dest),
            amount,
            input: if input.is_empty() {
                None
            } else {
                Some(input.to_string())
            },
        })
    }

    fn call_contract(&mut self, dest: &str, input: &str) -> tessera_contract::Result<OpResult> {
        // A zero-amount payment carrying input: triggers `main` without
        // moving coin.
        self.synthesize(OperationBody::PayCoin {
            dest: tessera_tx::Address::new(dest),
            amount: 0,
            input: Some(input.to_string()),
        })
    }

    fn pay_asset(
        &mut self,
        dest: &str,
        issuer: &str,
        code: &str,
        amount: i64,
        input: &str,
    ) -> tessera_contract::Result<OpResult> {
        self.synthesize(OperationBody::PayAsset {
            dest: tessera_tx::Address::new(dest),
            asset: AssetKey {
                issuer: tessera_tx::Address::new(issuer),
                code: code.to_string(),
            },
            amount,
            input: if input.is_empty() {
                None
            } else {
                Some(input.to_string())
            },
        })
    }

    fn issue_asset(&mut self, code: &str, amount: i64) -> tessera_contract::Result<OpResult> {
        self.synthesize(OperationBody::IssueAsset {
            code: code.to_string(),
            amount,
        })
    }

    fn emit_log(&mut self, topic: &str, data: &str) -> tessera_contract::Result<()> {
        self.ctx.logs.push(format!("{topic}: {data}"));
        Ok(())
    }

    fn vote_fee(&mut self, gas_price: i64, base_reserve: i64) -> tessera_contract::Result<OpResult> {
        if gas_price < 0 || base_reserve < 0 {
            return Ok(OpResult::error(
                ErrorCode::InvalidParameter,
                "negative fee parameters",
            ));
        }
        self.env.set_setting(
            tessera_tx::SETTING_FEES,
            json!({ "gas_price": gas_price, "base_reserve": base_reserve }),
        );
        Ok(OpResult::ok())
    }

    fn vote_validators(&mut self, validators: Value) -> tessera_contract::Result<OpResult> {
        if !validators.is_array() {
            return Ok(OpResult::error(
                ErrorCode::InvalidParameter,
                "validator vote is not a list",
            ));
        }
        self.env.set_setting(
            tessera_tx::SETTING_VALIDATORS,
            json!({ "validators": validators }),
        );
        Ok(OpResult::ok())
    }

    fn consume_steps(&mut self, steps: u64) -> tessera_contract::Result<OpResult> {
        if self.ctx.expired() {
            return Ok(OpResult::error(
                ErrorCode::TxTimeout,
                "execution budget expired",
            ));
        }
        self.ctx.steps = self.ctx.steps.saturating_add(steps);
        if self.ctx.steps > STEP_LIMIT {
            return Ok(OpResult::error(
                ErrorCode::ContractTooManyTransactions,
                format!("step ceiling {STEP_LIMIT} exceeded"),
            ));
        }
        Ok(OpResult::ok())
    }

    fn consume_memory(&mut self, bytes: u64) -> tessera_contract::Result<OpResult> {
        self.ctx.memory = self.ctx.memory.saturating_add(bytes);
        if self.ctx.memory > MEMORY_LIMIT {
            return Ok(OpResult::error(
                ErrorCode::ContractTooManyTransactions,
                format!("memory ceiling {MEMORY_LIMIT} exceeded"),
            ));
        }
        Ok(OpResult::ok())
    }
}
