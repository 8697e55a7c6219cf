//! Per-operation executors.
//!
//! An [`OperationFrame`] binds one operation to its effective source
//! and applies it against an [`Environment`]. Application is
//! all-or-nothing at the operation level: every precondition is checked
//! before the first write, and the transaction frame additionally wraps
//! each operation in its own scope so a failing operation can never
//! leave partial writes behind.
//!
//! Operations that touch a contract account do not run the contract
//! themselves; they return a [`ContractTrigger`] that the execution
//! context forwards to the sandbox inside the same scope.

mod asset;
mod create_account;
mod metadata;
mod payment;
mod privilege;

use tessera_common::{reserved, ErrorCode, OpResult};

use crate::environment::Environment;
use crate::error::Result;
use crate::types::{AccountState, Address, FeeConfig, Operation, OperationBody, OperationType};

pub use metadata::{METADATA_KEY_MAX, METADATA_VALUE_MAX};

/// Which contract entry point a triggering operation invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractEntry {
    /// Runs once, when the contract account is created.
    Init,
    /// Runs on every payment into the contract account.
    Main,
}

/// Request to run a contract, produced by an applied operation and
/// consumed by the execution context.
#[derive(Debug, Clone)]
pub struct ContractTrigger {
    pub contract: Address,
    pub entry: ContractEntry,
    pub input: String,
}

/// Result of applying one operation: the consensus result plus an
/// optional contract trigger.
#[derive(Debug)]
pub struct OpOutcome {
    pub result: OpResult,
    pub trigger: Option<ContractTrigger>,
}

impl OpOutcome {
    pub fn ok() -> Self {
        Self {
            result: OpResult::ok(),
            trigger: None,
        }
    }

    pub fn ok_with_trigger(trigger: ContractTrigger) -> Self {
        Self {
            result: OpResult::ok(),
            trigger: Some(trigger),
        }
    }

    pub fn fail(code: ErrorCode, desc: impl Into<String>) -> Self {
        Self {
            result: OpResult::error(code, desc),
            trigger: None,
        }
    }
}

/// One operation bound to its position in the transaction and its
/// effective source address.
pub struct OperationFrame<'a> {
    pub op: &'a Operation,
    pub tx_source: &'a Address,
    pub index: u32,
}

impl<'a> OperationFrame<'a> {
    pub fn new(op: &'a Operation, tx_source: &'a Address, index: u32) -> Self {
        Self {
            op,
            tx_source,
            index,
        }
    }

    /// The per-operation source override, or the transaction source.
    pub fn source(&self) -> &Address {
        self.op.source.as_ref().unwrap_or(self.tx_source)
    }

    pub fn op_type(&self) -> OperationType {
        self.op.body.op_type()
    }

    /// Static validation: address syntax, amount signs, size caps, and
    /// the reserved-address deny list. Needs no state.
    pub fn check_valid(&self) -> OpResult {
        let source = self.source();
        if !source.is_valid() {
            return OpResult::error(
                ErrorCode::InvalidAddress,
                format!("bad source address {source}"),
            );
        }
        match &self.op.body {
            OperationBody::CreateAccount {
                dest, init_balance, ..
            } => {
                check_dest(source, dest).unwrap_or_else(|| check_amount(*init_balance, "init_balance"))
            }
            OperationBody::IssueAsset { code, amount } => {
                if code.is_empty() || code.len() > 64 {
                    return OpResult::error(
                        ErrorCode::InvalidParameter,
                        format!("asset code length {} out of range", code.len()),
                    );
                }
                check_amount(*amount, "amount")
            }
            OperationBody::PayAsset {
                dest,
                asset,
                amount,
                ..
            } => {
                if !asset.issuer.is_valid() {
                    return OpResult::error(
                        ErrorCode::InvalidAddress,
                        format!("bad asset issuer {}", asset.issuer),
                    );
                }
                check_dest(source, dest).unwrap_or_else(|| check_amount(*amount, "amount"))
            }
            OperationBody::SetMetadata { key, value, .. } => metadata::check_sizes(key, value),
            OperationBody::SetSignerWeight { signers, .. }
            | OperationBody::SetPrivilege { signers, .. } => {
                privilege::check_signers(source, signers)
            }
            OperationBody::SetThreshold { .. } => OpResult::ok(),
            OperationBody::PayCoin { dest, amount, .. } => {
                check_dest(source, dest).unwrap_or_else(|| check_amount(*amount, "amount"))
            }
            OperationBody::Log { topic, .. } => {
                if topic.is_empty() || topic.len() > 128 {
                    OpResult::error(
                        ErrorCode::InvalidParameter,
                        format!("log topic length {} out of range", topic.len()),
                    )
                } else {
                    OpResult::ok()
                }
            }
        }
    }

    /// Apply against the environment. Preconditions first, writes after;
    /// an `Err` is an infrastructure failure, a failed [`OpResult`] is a
    /// consensus outcome.
    pub fn apply(&self, env: &mut Environment, fees: &FeeConfig) -> Result<OpOutcome> {
        let valid = self.check_valid();
        if !valid.is_success() {
            return Ok(OpOutcome {
                result: valid,
                trigger: None,
            });
        }
        let source = self.source();
        match &self.op.body {
            OperationBody::CreateAccount {
                dest,
                init_balance,
                privilege,
                contract,
                init_input,
            } => create_account::apply(
                env,
                fees,
                source,
                dest,
                *init_balance,
                privilege,
                contract.as_ref(),
                init_input.as_deref(),
            ),
            OperationBody::IssueAsset { code, amount } => {
                asset::issue(env, source, code, *amount)
            }
            OperationBody::PayAsset {
                dest,
                asset,
                amount,
                input,
            } => asset::pay(env, source, dest, asset, *amount, input.as_deref()),
            OperationBody::SetMetadata {
                key,
                value,
                version,
                delete,
            } => metadata::apply(env, source, key, value, *version, *delete),
            OperationBody::SetSignerWeight {
                master_weight,
                signers,
            } => privilege::apply(env, source, *master_weight, signers, None, &Default::default()),
            OperationBody::SetThreshold {
                tx_threshold,
                type_thresholds,
            } => privilege::apply(
                env,
                source,
                None,
                &Default::default(),
                *tx_threshold,
                type_thresholds,
            ),
            OperationBody::SetPrivilege {
                master_weight,
                signers,
                tx_threshold,
                type_thresholds,
            } => privilege::apply(
                env,
                source,
                *master_weight,
                signers,
                *tx_threshold,
                type_thresholds,
            ),
            OperationBody::PayCoin {
                dest,
                amount,
                input,
            } => payment::apply(env, fees, source, dest, *amount, input.as_deref()),
            // Pure log: recorded by the frame, no state change.
            OperationBody::Log { .. } => Ok(OpOutcome::ok()),
        }
    }
}

/// Destination checks shared by the transfer-like operations: syntax,
/// self-transfer, and the reserved deny list. `None` means the
/// destination is fine.
fn check_dest(source: &Address, dest: &Address) -> Option<OpResult> {
    if !dest.is_valid() {
        return Some(OpResult::error(
            ErrorCode::InvalidAddress,
            format!("bad destination address {dest}"),
        ));
    }
    if dest == source {
        return Some(OpResult::error(
            ErrorCode::InvalidParameter,
            "destination equals source",
        ));
    }
    if !reserved::reserved_target_allowed(source.as_str(), dest.as_str()) {
        return Some(OpResult::error(
            ErrorCode::InvalidAddress,
            format!("{dest} is a reserved address"),
        ));
    }
    None
}

fn check_amount(amount: i64, field: &str) -> OpResult {
    if amount < 0 {
        OpResult::error(
            ErrorCode::InvalidParameter,
            format!("negative {field}: {amount}"),
        )
    } else {
        OpResult::ok()
    }
}

/// Load the effective source, mapping absence to `AccountNotFound`.
fn load_source(
    env: &Environment,
    source: &Address,
) -> Result<std::result::Result<AccountState, OpOutcome>> {
    match env.get_account(source.as_str())? {
        Some(acc) => Ok(Ok(acc)),
        None => Ok(Err(OpOutcome::fail(
            ErrorCode::AccountNotFound,
            format!("source account {source} not found"),
        ))),
    }
}
