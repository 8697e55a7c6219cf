//! Overflow-checked arithmetic for balances, fees and gas.
//!
//! All fee and balance arithmetic in the engine must fail loudly on
//! overflow rather than wrap or saturate: peers must agree bit-for-bit on
//! the resulting state, and a silently wrapped balance would fork the
//! chain. These helpers return [`MathError::Overflow`] which callers map
//! to the consensus `MathOverflow` code.

/// Error type for checked math operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    /// The result does not fit in the target type.
    Overflow,
    /// An input was negative where a non-negative value is required.
    NegativeInput,
}

impl std::fmt::Display for MathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MathError::Overflow => write!(f, "integer overflow"),
            MathError::NegativeInput => write!(f, "negative input where non-negative required"),
        }
    }
}

impl std::error::Error for MathError {}

/// `a + b`, failing on i64 overflow.
pub fn checked_add_i64(a: i64, b: i64) -> Result<i64, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// `a - b`, failing on i64 overflow.
pub fn checked_sub_i64(a: i64, b: i64) -> Result<i64, MathError> {
    a.checked_sub(b).ok_or(MathError::Overflow)
}

/// `a * b`, failing on i64 overflow.
pub fn checked_mul_i64(a: i64, b: i64) -> Result<i64, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

/// Sum a sequence of non-negative amounts, failing on overflow or on any
/// negative element.
pub fn checked_sum_i64<I: IntoIterator<Item = i64>>(items: I) -> Result<i64, MathError> {
    let mut total: i64 = 0;
    for v in items {
        if v < 0 {
            return Err(MathError::NegativeInput);
        }
        total = checked_add_i64(total, v)?;
    }
    Ok(total)
}
