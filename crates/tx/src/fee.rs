//! Fee evaluation.
//!
//! A transaction's required fee is gas times gas price, where gas is
//! the serialized envelope size in bytes plus a fixed amount per
//! operation type. Every step of the computation is overflow-checked;
//! an overflow means the transaction is rejected outright with no state
//! change.

use tessera_common::{checked_add_i64, checked_mul_i64, MathError};

use crate::types::{OperationType, TransactionEnvelope};

/// Gas charged per serialized envelope byte.
pub const GAS_PER_BYTE: i64 = 1;

/// Fixed gas for one operation of the given type.
pub fn operation_gas(op_type: OperationType) -> i64 {
    match op_type {
        OperationType::CreateAccount => 1_000,
        OperationType::IssueAsset => 300,
        OperationType::PayAsset => 100,
        OperationType::SetMetadata => 120,
        OperationType::SetSignerWeight => 100,
        OperationType::SetThreshold => 100,
        OperationType::PayCoin => 100,
        OperationType::Log => 50,
        OperationType::SetPrivilege => 100,
    }
}

/// Byte gas for an envelope: serialized size times [`GAS_PER_BYTE`].
pub fn byte_gas(envelope: &TransactionEnvelope) -> Result<i64, MathError> {
    checked_mul_i64(envelope.byte_size() as i64, GAS_PER_BYTE)
}

/// Total gas for an envelope: byte gas plus per-operation gas.
pub fn total_gas(envelope: &TransactionEnvelope) -> Result<i64, MathError> {
    let mut gas = byte_gas(envelope)?;
    for op in &envelope.tx.operations {
        gas = checked_add_i64(gas, operation_gas(op.body.op_type()))?;
    }
    Ok(gas)
}

/// The fee an envelope must be able to pay: total gas times the
/// transaction's gas price.
pub fn required_fee(envelope: &TransactionEnvelope) -> Result<i64, MathError> {
    checked_mul_i64(total_gas(envelope)?, envelope.tx.gas_price)
}
