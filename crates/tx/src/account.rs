//! Checked mutators over [`AccountState`].
//!
//! Balances never go negative and never wrap; every arithmetic path
//! goes through the checked helpers and surfaces [`MathError`] instead
//! of panicking or truncating.

use tessera_common::{checked_add_i64, checked_sub_i64, MathError};

use crate::types::{AccountState, Address, AssetKey, OperationType, Privilege};

impl AccountState {
    /// A fresh plain account with default privileges.
    pub fn new(address: Address, balance: i64) -> Self {
        Self {
            address,
            balance,
            nonce: 0,
            metadata: Default::default(),
            assets: Default::default(),
            contract: None,
            privilege: Privilege::default(),
        }
    }

    pub fn is_contract(&self) -> bool {
        self.contract.is_some()
    }

    pub fn add_balance(&mut self, amount: i64) -> Result<(), MathError> {
        if amount < 0 {
            return Err(MathError::NegativeInput);
        }
        self.balance = checked_add_i64(self.balance, amount)?;
        Ok(())
    }

    pub fn sub_balance(&mut self, amount: i64) -> Result<(), MathError> {
        if amount < 0 {
            return Err(MathError::NegativeInput);
        }
        let next = checked_sub_i64(self.balance, amount)?;
        if next < 0 {
            return Err(MathError::Overflow);
        }
        self.balance = next;
        Ok(())
    }

    pub fn bump_nonce(&mut self) {
        self.nonce += 1;
    }

    pub fn asset_balance(&self, key: &AssetKey) -> i64 {
        self.assets.get(key).copied().unwrap_or(0)
    }

    pub fn add_asset(&mut self, key: &AssetKey, amount: i64) -> Result<(), MathError> {
        if amount < 0 {
            return Err(MathError::NegativeInput);
        }
        let next = checked_add_i64(self.asset_balance(key), amount)?;
        self.assets.insert(key.clone(), next);
        Ok(())
    }

    pub fn sub_asset(&mut self, key: &AssetKey, amount: i64) -> Result<(), MathError> {
        if amount < 0 {
            return Err(MathError::NegativeInput);
        }
        let next = checked_sub_i64(self.asset_balance(key), amount)?;
        if next < 0 {
            return Err(MathError::Overflow);
        }
        self.assets.insert(key.clone(), next);
        Ok(())
    }

    /// Weight this signer contributes: the master weight for the
    /// account's own address, the signer-list weight otherwise.
    pub fn signer_weight(&self, signer: &Address) -> u64 {
        if *signer == self.address {
            self.privilege.master_weight
        } else {
            self.privilege
                .signers
                .get(signer)
                .copied()
                .unwrap_or(0)
        }
    }

    /// Threshold required for an operation of this type: the per-type
    /// override if set, else the transaction threshold.
    pub fn threshold_for(&self, op_type: OperationType) -> u64 {
        self.privilege
            .thresholds
            .type_thresholds
            .get(&op_type)
            .copied()
            .unwrap_or(self.privilege.thresholds.tx_threshold)
    }
}
