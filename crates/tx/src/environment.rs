//! Layered copy-on-write view over account state.
//!
//! One [`Environment`] value owns a stack of layers. Each layer buffers
//! account writes and chain-setting writes made while it is on top.
//! Reads walk the stack from the top layer down and fall through to the
//! backing [`StateReader`]; writes always land in the top layer.
//!
//! The stack is the rollback mechanism for the whole engine: a
//! transaction gets a scope, each of its operations gets a scope, and
//! each nested contract call gets a scope. Committing a scope merges
//! its buffers into the layer below; discarding drops them. Nothing
//! reaches the backing store until the ledger closer drains the root
//! layer after the whole block applied.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tessera_store::StoreError;
use tracing::warn;

use crate::error::{Result, TxError};
use crate::types::{AccountState, Address, FeeConfig, ValidatorSet};

/// Chain-setting key for fee votes.
pub const SETTING_FEES: &str = "configFees";
/// Chain-setting key for validator votes.
pub const SETTING_VALIDATORS: &str = "validators";

/// Read-only source of committed account state.
///
/// A read failure here is fatal by contract: the caller cannot tell a
/// missing account from a broken store, and guessing would fork state.
pub trait StateReader: Send + Sync {
    fn read_account(
        &self,
        address: &str,
    ) -> std::result::Result<Option<AccountState>, StoreError>;
}

/// A reader over nothing, for tests that build all state in layers.
pub struct EmptyReader;

impl StateReader for EmptyReader {
    fn read_account(
        &self,
        _address: &str,
    ) -> std::result::Result<Option<AccountState>, StoreError> {
        Ok(None)
    }
}

#[derive(Debug, Default)]
struct Layer {
    accounts: BTreeMap<Address, AccountState>,
    settings: BTreeMap<String, Value>,
}

impl Layer {
    fn merge_into(self, parent: &mut Layer) {
        parent.accounts.extend(self.accounts);
        parent.settings.extend(self.settings);
    }
}

/// The layered state view. Always has at least the root layer.
pub struct Environment {
    reader: Arc<dyn StateReader>,
    layers: Vec<Layer>,
}

impl Environment {
    pub fn new(reader: Arc<dyn StateReader>) -> Self {
        Self {
            reader,
            layers: vec![Layer::default()],
        }
    }

    /// Number of layers, including the root.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Open a new scope; subsequent writes land here until it is
    /// committed or discarded.
    pub fn push_scope(&mut self) {
        self.layers.push(Layer::default());
    }

    /// Merge the top scope into the one below it.
    pub fn commit_scope(&mut self) -> Result<()> {
        if self.layers.len() < 2 {
            return Err(TxError::Internal("commit_scope on root layer".into()));
        }
        let top = self
            .layers
            .pop()
            .ok_or_else(|| TxError::Internal("empty layer stack".into()))?;
        let parent = self
            .layers
            .last_mut()
            .ok_or_else(|| TxError::Internal("empty layer stack".into()))?;
        top.merge_into(parent);
        Ok(())
    }

    /// Drop the top scope and everything written in it.
    pub fn discard_scope(&mut self) -> Result<()> {
        if self.layers.len() < 2 {
            return Err(TxError::Internal("discard_scope on root layer".into()));
        }
        self.layers.pop();
        Ok(())
    }

    /// Resolve an account through the layers and the backing reader.
    pub fn get_account(&self, address: &str) -> Result<Option<AccountState>> {
        for layer in self.layers.iter().rev() {
            if let Some(acc) = layer.accounts.get(address) {
                return Ok(Some(acc.clone()));
            }
        }
        match self.reader.read_account(address) {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!(address, error = %e, "backing-store read failed");
                Err(TxError::Store(StoreError::Fatal(format!(
                    "account read failed for {address}: {e}"
                ))))
            }
        }
    }

    pub fn account_exists(&self, address: &str) -> Result<bool> {
        Ok(self.get_account(address)?.is_some())
    }

    /// Write an account into the top scope.
    pub fn put_account(&mut self, account: AccountState) {
        let top = match self.layers.last_mut() {
            Some(l) => l,
            None => return,
        };
        top.accounts.insert(account.address.clone(), account);
    }

    /// Write a chain setting into the top scope.
    pub fn set_setting(&mut self, key: &str, value: Value) {
        if let Some(top) = self.layers.last_mut() {
            top.settings.insert(key.to_string(), value);
        }
    }

    /// Read a chain setting from the layers only. Settings are in-flight
    /// votes; committed ones live in dedicated store blobs.
    pub fn get_setting(&self, key: &str) -> Option<Value> {
        for layer in self.layers.iter().rev() {
            if let Some(v) = layer.settings.get(key) {
                return Some(v.clone());
            }
        }
        None
    }

    /// Fee config voted during this block, if it differs from `current`.
    pub fn voted_fee(&self, current: &FeeConfig) -> Option<FeeConfig> {
        let value = self.get_setting(SETTING_FEES)?;
        let voted: FeeConfig = serde_json::from_value(value).ok()?;
        if voted == *current {
            None
        } else {
            Some(voted)
        }
    }

    /// Validator set voted during this block, if it differs from
    /// `current`.
    pub fn voted_validators(&self, current: &ValidatorSet) -> Option<ValidatorSet> {
        let value = self.get_setting(SETTING_VALIDATORS)?;
        let voted: ValidatorSet = serde_json::from_value(value).ok()?;
        if voted == *current {
            None
        } else {
            Some(voted)
        }
    }

    /// Take the root layer's buffers, leaving the environment empty.
    /// Fails if any scope is still open.
    pub fn drain_root(
        &mut self,
    ) -> Result<(BTreeMap<Address, AccountState>, BTreeMap<String, Value>)> {
        if self.layers.len() != 1 {
            return Err(TxError::Internal(format!(
                "drain_root with {} scopes still open",
                self.layers.len() - 1
            )));
        }
        let root = std::mem::take(&mut self.layers[0]);
        Ok((root.accounts, root.settings))
    }
}
