//! The closed consensus error-code set.
//!
//! Every executed unit — operation, transaction, nested contract call —
//! carries an [`OpResult`]: a code from the closed [`ErrorCode`]
//! enumeration plus a human-readable description. These codes are
//! consensus data (they are persisted into transaction records that all
//! nodes must agree on), so they are modelled as plain values rather than
//! Rust error types. Infrastructure failures (store I/O, encoding) use
//! per-crate `thiserror` enums instead and never appear in these records.

use serde::{Deserialize, Serialize};

/// Closed set of result codes attached to executed units.
///
/// `Success` is zero; every other member is a failure. The numeric values
/// are part of the consensus wire format and must never be reassigned;
/// serialization goes through the explicit discriminant, not the
/// variant's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// The unit applied completely.
    Success = 0,
    /// Unexpected internal failure.
    InternalError = 1,
    /// A request parameter failed validation.
    InvalidParameter = 2,
    /// Transaction nonce does not continue the account's sequence.
    InvalidNonce = 3,
    /// An address failed syntactic validation.
    InvalidAddress = 4,
    /// Signature weight below the required threshold.
    BadSignature = 5,
    /// Referenced account does not exist.
    AccountNotFound = 10,
    /// Balance would drop below the base reserve.
    AccountLowReserve = 11,
    /// Create-account destination already exists.
    AccountDestExists = 12,
    /// Asset balance insufficient for the payment.
    AccountAssetLowReserve = 13,
    /// Metadata version check failed or entry missing/present unexpectedly.
    InvalidDataVersion = 14,
    /// Fee limit below the required fee, or unaffordable.
    FeeNotEnough = 20,
    /// Transaction carries no operations.
    MissingOperations = 21,
    /// Overflow in fee or balance arithmetic.
    MathOverflow = 30,
    /// Contract call stack exceeded the recursion bound.
    ContractTooManyRecursion = 40,
    /// Contract call tree exceeded the synthesized-transaction budget.
    ContractTooManyTransactions = 41,
    /// The contract sandbox reported an execution failure.
    ContractExecuteFail = 42,
    /// Contract source failed the syntax check.
    ContractSyntaxError = 43,
    /// Wall-clock execution budget exceeded.
    TxTimeout = 50,
}

impl ErrorCode {
    /// Numeric wire value of the code.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Decode a wire value back into the enumeration.
    pub fn from_code(code: i32) -> Option<Self> {
        use ErrorCode::*;
        Some(match code {
            0 => Success,
            1 => InternalError,
            2 => InvalidParameter,
            3 => InvalidNonce,
            4 => InvalidAddress,
            5 => BadSignature,
            10 => AccountNotFound,
            11 => AccountLowReserve,
            12 => AccountDestExists,
            13 => AccountAssetLowReserve,
            14 => InvalidDataVersion,
            20 => FeeNotEnough,
            21 => MissingOperations,
            30 => MathOverflow,
            40 => ContractTooManyRecursion,
            41 => ContractTooManyTransactions,
            42 => ContractExecuteFail,
            43 => ContractSyntaxError,
            50 => TxTimeout,
            _ => return None,
        })
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        ErrorCode::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code {code}")))
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Result of applying one unit: code plus description.
///
/// Code 0 means success. The description is informational only and not
/// part of any hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpResult {
    code: ErrorCode,
    desc: String,
}

impl OpResult {
    /// A successful result with an empty description.
    pub fn ok() -> Self {
        Self {
            code: ErrorCode::Success,
            desc: String::new(),
        }
    }

    /// A failure result with the given code and description.
    pub fn error(code: ErrorCode, desc: impl Into<String>) -> Self {
        Self {
            code,
            desc: desc.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn is_success(&self) -> bool {
        self.code == ErrorCode::Success
    }
}

impl Default for OpResult {
    fn default() -> Self {
        Self::ok()
    }
}

impl std::fmt::Display for OpResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_success() {
            write!(f, "ok")
        } else {
            write!(f, "{}: {}", self.code, self.desc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_zero() {
        assert_eq!(ErrorCode::Success.code(), 0);
        assert!(OpResult::ok().is_success());
    }

    #[test]
    fn test_error_result() {
        let r = OpResult::error(ErrorCode::FeeNotEnough, "required 500, limit 100");
        assert!(!r.is_success());
        assert_eq!(r.code(), ErrorCode::FeeNotEnough);
        assert!(r.desc().contains("500"));
    }

    #[test]
    fn test_wire_value_is_the_discriminant() {
        let bytes = bincode::serialize(&ErrorCode::AccountNotFound).unwrap();
        assert_eq!(bytes, 10i32.to_le_bytes());
        let back: ErrorCode = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, ErrorCode::AccountNotFound);
        // Unassigned values never decode into the closed set.
        assert!(bincode::deserialize::<ErrorCode>(&7i32.to_le_bytes()).is_err());
    }

    #[test]
    fn test_every_code_round_trips() {
        for code in [
            ErrorCode::Success,
            ErrorCode::InternalError,
            ErrorCode::InvalidParameter,
            ErrorCode::InvalidNonce,
            ErrorCode::InvalidAddress,
            ErrorCode::BadSignature,
            ErrorCode::AccountNotFound,
            ErrorCode::AccountLowReserve,
            ErrorCode::AccountDestExists,
            ErrorCode::AccountAssetLowReserve,
            ErrorCode::InvalidDataVersion,
            ErrorCode::FeeNotEnough,
            ErrorCode::MissingOperations,
            ErrorCode::MathOverflow,
            ErrorCode::ContractTooManyRecursion,
            ErrorCode::ContractTooManyTransactions,
            ErrorCode::ContractExecuteFail,
            ErrorCode::ContractSyntaxError,
            ErrorCode::TxTimeout,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
    }

    #[test]
    fn test_display() {
        let r = OpResult::error(ErrorCode::MathOverflow, "fee accumulation");
        let s = format!("{}", r);
        assert!(s.contains("MathOverflow"));
        assert!(s.contains("30"));
    }
}
