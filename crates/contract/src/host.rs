//! The capability surface a running contract sees.
//!
//! Each blockchain primitive is one typed method; there is no
//! string-keyed callback table. The execution context implements this
//! trait, routing state reads through the current scope and mutations
//! through synthesized transactions, so a contract can never touch
//! state outside its transaction's rollback boundary.

use serde_json::Value;
use tessera_common::OpResult;

use crate::error::Result;

/// Ledger position the contract is executing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub ledger_seq: u64,
    pub close_time: i64,
}

/// Identity of the triggering transaction and the contract itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInfo {
    /// Hex hash of the bottom (client-submitted) transaction.
    pub tx_hash: String,
    /// Source of the transaction that triggered this execution.
    pub source: String,
    /// Address of the contract account being run.
    pub contract: String,
}

/// Host capabilities exposed to a sandboxed contract.
///
/// Reads return data; mutations return the consensus [`OpResult`] of
/// the synthesized transaction they spawned. An `Err` from any method
/// is an infrastructure failure and must abort the execution.
pub trait ChainHost {
    fn block_info(&self) -> BlockInfo;

    fn tx_info(&self) -> TxInfo;

    /// Native-coin balance of an account, 0 if absent.
    fn get_balance(&mut self, address: &str) -> Result<i64>;

    /// Full account record as JSON, if the account exists.
    fn get_account(&mut self, address: &str) -> Result<Option<Value>>;

    /// One metadata value under an account.
    fn get_metadata(&mut self, address: &str, key: &str) -> Result<Option<String>>;

    /// Write metadata under the contract's own account.
    fn set_metadata(&mut self, key: &str, value: &str, version: u64, delete: bool)
        -> Result<OpResult>;

    /// Pay native coin from the contract account. A contract
    /// destination triggers its `main` entry (nested execution).
    fn pay_coin(&mut self, dest: &str, amount: i64, input: &str) -> Result<OpResult>;

    /// Call another contract's `main` entry without moving coin.
    fn call_contract(&mut self, dest: &str, input: &str) -> Result<OpResult>;

    /// Pay an asset from the contract account.
    fn pay_asset(
        &mut self,
        dest: &str,
        issuer: &str,
        code: &str,
        amount: i64,
        input: &str,
    ) -> Result<OpResult>;

    /// Issue an asset in the contract account's name.
    fn issue_asset(&mut self, code: &str, amount: i64) -> Result<OpResult>;

    /// Append a log entry to the transaction record.
    fn emit_log(&mut self, topic: &str, data: &str) -> Result<()>;

    /// Vote for a fee-config change; tallied at ledger close.
    fn vote_fee(&mut self, gas_price: i64, base_reserve: i64) -> Result<OpResult>;

    /// Vote for a validator-set change; tallied at ledger close.
    fn vote_validators(&mut self, validators: Value) -> Result<OpResult>;

    /// Charge `steps` against the instruction budget. A failure code
    /// means the budget is exhausted and execution must stop with it.
    fn consume_steps(&mut self, steps: u64) -> Result<OpResult>;

    /// Charge `bytes` against the memory budget.
    fn consume_memory(&mut self, bytes: u64) -> Result<OpResult>;
}
