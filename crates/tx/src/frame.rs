//! The transaction state machine.
//!
//! A [`TransactionFrame`] drives one envelope through
//! `Received -> NonceChecked -> FeeReserved -> OperationsApplied ->
//! Committed | RolledBack` against a layered [`Environment`]. The frame
//! opens one scope for the whole transaction and one nested scope per
//! operation, which yields exactly the agreed failure semantics:
//!
//! - a transaction that applies cleanly pays gas times gas price; the
//!   declared fee is reserved up front and the unused remainder
//!   refunded at commit;
//! - a failing operation loses only its own writes; operations applied
//!   before it stay, and the declared fee is charged in full;
//! - an aborting transaction (fee exhausted mid-contract, recursion or
//!   instruction budget blown, wall-clock expiry) loses every operation
//!   but still consumes the nonce and the declared fee;
//! - a transaction that fails validation changes nothing at all.
//!
//! Contract-synthesized transactions (`envelope.trigger` set) carry no
//! fee and no signatures of their own; the client-submitted bottom
//! transaction pays for the whole call tree.

use tessera_common::{
    checked_add_i64, checked_mul_i64, checked_sub_i64, ErrorCode, Hash256, OpResult,
    TRANSACTION_LIMIT_SIZE, TRANSACTION_MAX_OPERATIONS,
};
use tracing::debug;

use crate::environment::Environment;
use crate::error::Result;
use crate::fee;
use crate::operations::{ContractTrigger, OperationFrame};
use crate::types::{
    FeeConfig, Operation, OperationBody, TransactionEnvelope, TransactionRecord, Trigger,
};

/// Hook through which applied operations reach the contract sandbox.
///
/// Implemented by the execution context; the frame itself knows nothing
/// about contracts beyond "an operation asked for one to run".
pub trait ContractInvoker {
    /// Run a triggered contract inside the current scope and return its
    /// consensus result.
    fn invoke(
        &mut self,
        env: &mut Environment,
        trigger: &ContractTrigger,
        origin: Trigger,
    ) -> Result<OpResult>;

    /// Gas accrued by nested execution on behalf of the bottom
    /// transaction since the pass began.
    fn accrued_gas(&self) -> i64 {
        0
    }

    /// Whether the pass's wall-clock budget has expired.
    fn expired(&self) -> bool {
        false
    }
}

/// Invoker for transactions that never touch contracts.
pub struct NoopInvoker;

impl ContractInvoker for NoopInvoker {
    fn invoke(
        &mut self,
        _env: &mut Environment,
        _trigger: &ContractTrigger,
        _origin: Trigger,
    ) -> Result<OpResult> {
        Ok(OpResult::ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Received,
    NonceChecked,
    FeeReserved,
    OperationsApplied,
    /// Scope merged into the parent; effects (possibly partial) are in.
    Committed,
    /// Scope discarded; at most nonce and fee were consumed.
    RolledBack,
}

/// One transaction mid-application.
pub struct TransactionFrame {
    envelope: TransactionEnvelope,
    state: FrameState,
    result: OpResult,
    actual_fee: i64,
    gas_used: i64,
    ledger_seq: u64,
    close_time: i64,
    logs: Vec<String>,
}

impl TransactionFrame {
    pub fn new(envelope: TransactionEnvelope, ledger_seq: u64, close_time: i64) -> Self {
        Self {
            envelope,
            state: FrameState::Received,
            result: OpResult::ok(),
            actual_fee: 0,
            gas_used: 0,
            ledger_seq,
            close_time,
            logs: Vec::new(),
        }
    }

    pub fn envelope(&self) -> &TransactionEnvelope {
        &self.envelope
    }

    pub fn hash(&self) -> Hash256 {
        self.envelope.hash()
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn result(&self) -> &OpResult {
        &self.result
    }

    pub fn actual_fee(&self) -> i64 {
        self.actual_fee
    }

    pub fn source(&self) -> &crate::types::Address {
        &self.envelope.tx.source
    }

    pub fn is_synthesized(&self) -> bool {
        self.envelope.is_synthesized()
    }

    /// Validation only; no writes. A failed result here means the
    /// transaction must be dropped (propose) or recorded as a no-effect
    /// failure (follow) by the caller.
    pub fn check_valid(&self, env: &Environment, fees: &FeeConfig) -> Result<OpResult> {
        let tx = &self.envelope.tx;
        if tx.operations.is_empty() {
            return Ok(OpResult::error(
                ErrorCode::MissingOperations,
                "transaction has no operations",
            ));
        }
        if tx.operations.len() > TRANSACTION_MAX_OPERATIONS {
            return Ok(OpResult::error(
                ErrorCode::InvalidParameter,
                format!("{} operations exceeds cap", tx.operations.len()),
            ));
        }
        if self.envelope.byte_size() > TRANSACTION_LIMIT_SIZE {
            return Ok(OpResult::error(
                ErrorCode::InvalidParameter,
                format!("envelope size {} exceeds cap", self.envelope.byte_size()),
            ));
        }
        if !tx.source.is_valid() {
            return Ok(OpResult::error(
                ErrorCode::InvalidAddress,
                format!("bad source address {}", tx.source),
            ));
        }
        let source = match env.get_account(tx.source.as_str())? {
            Some(acc) => acc,
            None => {
                return Ok(OpResult::error(
                    ErrorCode::AccountNotFound,
                    format!("source account {} not found", tx.source),
                ))
            }
        };
        if tx.nonce != source.nonce + 1 {
            return Ok(OpResult::error(
                ErrorCode::InvalidNonce,
                format!(
                    "nonce {} does not continue stored nonce {}",
                    tx.nonce, source.nonce
                ),
            ));
        }

        for (index, op) in tx.operations.iter().enumerate() {
            let op_frame = OperationFrame::new(op, &tx.source, index as u32);
            let op_valid = op_frame.check_valid();
            if !op_valid.is_success() {
                return Ok(op_valid);
            }
        }

        if self.is_synthesized() {
            // Authorized by the triggering contract; carries no fee or
            // signatures of its own.
            return Ok(OpResult::ok());
        }

        // Signature weight must reach the highest threshold any
        // operation requires.
        let mut needed = source.privilege.thresholds.tx_threshold;
        for op in &tx.operations {
            needed = needed.max(source.threshold_for(op.body.op_type()));
        }
        let mut weight: u64 = 0;
        let mut seen = std::collections::BTreeSet::new();
        for sig in &self.envelope.signatures {
            if seen.insert(sig.signer.clone()) {
                weight = weight.saturating_add(source.signer_weight(&sig.signer));
            }
        }
        if weight < needed {
            return Ok(OpResult::error(
                ErrorCode::BadSignature,
                format!("signer weight {weight} below threshold {needed}"),
            ));
        }

        if tx.gas_price < fees.gas_price {
            return Ok(OpResult::error(
                ErrorCode::FeeNotEnough,
                format!(
                    "gas price {} below chain gas price {}",
                    tx.gas_price, fees.gas_price
                ),
            ));
        }
        let required = match fee::required_fee(&self.envelope) {
            Ok(f) => f,
            Err(e) => {
                return Ok(OpResult::error(ErrorCode::MathOverflow, e.to_string()))
            }
        };
        if tx.fee_limit < required {
            return Ok(OpResult::error(
                ErrorCode::FeeNotEnough,
                format!("declared fee {} below required {required}", tx.fee_limit),
            ));
        }
        // The declared fee must be affordable after the base reserve
        // and every coin outflow the source itself declares.
        let mut outflow: i64 = 0;
        for op in &tx.operations {
            if op.source.as_ref().is_some_and(|s| s != &tx.source) {
                continue;
            }
            let amount = match &op.body {
                OperationBody::PayCoin { amount, .. } => *amount,
                OperationBody::CreateAccount { init_balance, .. } => *init_balance,
                _ => 0,
            };
            outflow = match checked_add_i64(outflow, amount) {
                Ok(v) => v,
                Err(e) => return Ok(OpResult::error(ErrorCode::MathOverflow, e.to_string())),
            };
        }
        let max_affordable = checked_sub_i64(source.balance, fees.base_reserve)
            .and_then(|left| checked_sub_i64(left, outflow))
            .unwrap_or(-1);
        if tx.fee_limit > max_affordable {
            return Ok(OpResult::error(
                ErrorCode::FeeNotEnough,
                format!(
                    "balance {} cannot cover declared fee {} past reserve and payments",
                    source.balance, tx.fee_limit
                ),
            ));
        }
        Ok(OpResult::ok())
    }

    /// Validate and apply. On return the frame is `Committed` (effects
    /// merged into the caller's scope, result possibly a failure) or
    /// `RolledBack` (no operation effects; nonce and fee consumed unless
    /// validation itself failed).
    pub fn apply(
        &mut self,
        env: &mut Environment,
        fees: &FeeConfig,
        invoker: &mut dyn ContractInvoker,
    ) -> Result<OpResult> {
        let valid = self.check_valid(env, fees)?;
        if !valid.is_success() {
            self.state = FrameState::RolledBack;
            self.result = valid.clone();
            debug!(tx = %self.hash(), code = %valid.code(), "transaction rejected");
            return Ok(valid);
        }

        env.push_scope();
        self.consume_nonce(env)?;
        self.state = FrameState::NonceChecked;

        if !self.is_synthesized() {
            self.charge_fee(env)?;
        }
        self.state = FrameState::FeeReserved;

        let tx_hash = self.hash();
        let tx_source = self.envelope.tx.source.clone();
        let ops: Vec<Operation> = self.envelope.tx.operations.clone();
        let gas_snapshot = invoker.accrued_gas();
        self.gas_used = match fee::byte_gas(&self.envelope) {
            Ok(g) => g,
            Err(_) => {
                env.discard_scope()?;
                return self.finish_abort(env, ErrorCode::MathOverflow, "byte gas overflow");
            }
        };

        for (index, op) in ops.iter().enumerate() {
            if invoker.expired() {
                env.discard_scope()?;
                return self.finish_abort(env, ErrorCode::TxTimeout, "execution budget expired");
            }

            env.push_scope();
            let op_frame = OperationFrame::new(op, &tx_source, index as u32);
            let outcome = op_frame.apply(env, fees)?;
            self.gas_used = match checked_add_i64(self.gas_used, fee::operation_gas(op.body.op_type())) {
                Ok(g) => g,
                Err(_) => {
                    env.discard_scope()?;
                    env.discard_scope()?;
                    return self.finish_abort(env, ErrorCode::MathOverflow, "gas accrual overflow");
                }
            };

            let mut op_result = outcome.result;
            if op_result.is_success() {
                if let Some(trigger) = &outcome.trigger {
                    let origin = Trigger {
                        tx_hash,
                        op_index: index as u32,
                    };
                    let inv_result = invoker.invoke(env, trigger, origin)?;
                    if !inv_result.is_success() {
                        op_result = inv_result;
                    }
                }
            }

            if !self.is_synthesized() {
                // Nested execution charges gas to this (bottom) frame.
                let owed = checked_add_i64(self.gas_used, invoker.accrued_gas() - gas_snapshot)
                    .and_then(|total| checked_mul_i64(total, self.envelope.tx.gas_price));
                match owed {
                    Ok(owed) if owed <= self.envelope.tx.fee_limit => {}
                    _ => {
                        env.discard_scope()?;
                        env.discard_scope()?;
                        return self.finish_abort(
                            env,
                            ErrorCode::FeeNotEnough,
                            "gas exhausted the declared fee",
                        );
                    }
                }
            }

            match op_result.code() {
                ErrorCode::Success => {
                    if let OperationBody::Log { topic, data } = &op.body {
                        self.logs.push(format!("{topic}: {}", data.join(" ")));
                    }
                    env.commit_scope()?;
                }
                // Budget and timeout failures abort the whole
                // transaction, not just this operation.
                ErrorCode::FeeNotEnough
                | ErrorCode::ContractTooManyTransactions
                | ErrorCode::ContractTooManyRecursion
                | ErrorCode::TxTimeout => {
                    env.discard_scope()?;
                    env.discard_scope()?;
                    return self.finish_abort(env, op_result.code(), op_result.desc().to_string());
                }
                _ => {
                    env.discard_scope()?;
                    self.state = FrameState::OperationsApplied;
                    self.result = op_result.clone();
                    env.commit_scope()?;
                    self.state = FrameState::Committed;
                    debug!(
                        tx = %tx_hash,
                        op = index,
                        code = %op_result.code(),
                        "operation failed, earlier effects kept"
                    );
                    return Ok(op_result);
                }
            }
        }

        self.state = FrameState::OperationsApplied;
        if !self.is_synthesized() {
            self.settle_fee(env, invoker.accrued_gas() - gas_snapshot)?;
        }
        self.result = OpResult::ok();
        env.commit_scope()?;
        self.state = FrameState::Committed;
        Ok(OpResult::ok())
    }

    /// Abort path: every operation effect is already discarded; consume
    /// the nonce and the declared fee in a fresh scope so the failure
    /// still costs its author.
    fn finish_abort(
        &mut self,
        env: &mut Environment,
        code: ErrorCode,
        desc: impl Into<String>,
    ) -> Result<OpResult> {
        if !self.is_synthesized() {
            env.push_scope();
            self.consume_nonce(env)?;
            self.charge_fee(env)?;
            env.commit_scope()?;
        }
        self.state = FrameState::RolledBack;
        self.result = OpResult::error(code, desc);
        debug!(tx = %self.hash(), code = %code, "transaction aborted");
        Ok(self.result.clone())
    }

    fn consume_nonce(&self, env: &mut Environment) -> Result<()> {
        if let Some(mut src) = env.get_account(self.envelope.tx.source.as_str())? {
            src.bump_nonce();
            env.put_account(src);
        }
        Ok(())
    }

    /// Reserve the declared fee. Failure paths keep the full amount;
    /// a clean commit settles down to the gas actually used.
    fn charge_fee(&mut self, env: &mut Environment) -> Result<()> {
        if let Some(mut src) = env.get_account(self.envelope.tx.source.as_str())? {
            // Affordability was checked in validation.
            if src.sub_balance(self.envelope.tx.fee_limit).is_ok() {
                self.actual_fee = self.envelope.tx.fee_limit;
            }
            env.put_account(src);
        }
        Ok(())
    }

    /// Success settlement: the fee owed is total gas (own plus nested)
    /// times the gas price; the rest of the reservation goes back to
    /// the source.
    fn settle_fee(&mut self, env: &mut Environment, nested_gas: i64) -> Result<()> {
        let limit = self.envelope.tx.fee_limit;
        // The per-operation bound already proved owed <= limit.
        let owed = match checked_add_i64(self.gas_used, nested_gas)
            .and_then(|total| checked_mul_i64(total, self.envelope.tx.gas_price))
        {
            Ok(fee) => fee.min(limit),
            Err(_) => limit,
        };
        let refund = limit - owed;
        if refund > 0 {
            if let Some(mut src) = env.get_account(self.envelope.tx.source.as_str())? {
                if src.add_balance(refund).is_ok() {
                    env.put_account(src);
                }
            }
        }
        self.actual_fee = owed;
        Ok(())
    }

    /// The persisted record of this frame's outcome.
    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord {
            envelope: self.envelope.clone(),
            result: self.result.clone(),
            ledger_seq: self.ledger_seq,
            close_time: self.close_time,
            actual_fee: self.actual_fee,
            contract_logs: self.logs.clone(),
        }
    }
}
