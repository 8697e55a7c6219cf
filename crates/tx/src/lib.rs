//! Transaction processing for the tessera ledger engine.
//!
//! This crate holds the consensus data model, the layered
//! copy-on-write [`Environment`], the per-operation executors, fee
//! evaluation and the [`TransactionFrame`] state machine. It knows
//! nothing about blocks, consensus or contract engines; those live in
//! `tessera-ledger` and `tessera-contract` and reach in through the
//! [`StateReader`] and [`ContractInvoker`] seams.

mod account;
pub mod environment;
pub mod error;
pub mod fee;
pub mod frame;
pub mod operations;
pub mod types;

pub use environment::{EmptyReader, Environment, StateReader, SETTING_FEES, SETTING_VALIDATORS};
pub use error::{Result, TxError};
pub use frame::{ContractInvoker, FrameState, NoopInvoker, TransactionFrame};
pub use operations::{ContractEntry, ContractTrigger, OpOutcome, OperationFrame};
pub use types::{
    AccountState, Address, AssetKey, ConsensusValue, ContractInfo, FeeConfig, LedgerHeader,
    LedgerUpgrade, MetadataEntry, Operation, OperationBody, OperationType, Privilege, Signature,
    Thresholds, Transaction, TransactionEnvelope, TransactionRecord, Trigger, Validator,
    ValidatorSet,
};
