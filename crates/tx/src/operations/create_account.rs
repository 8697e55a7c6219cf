//! Account creation.
//!
//! Plain accounts must be funded to at least the base reserve. Contract
//! accounts must be created with master weight 0 and tx threshold 1 so
//! nothing but the contract itself can ever act as them; their `init`
//! entry runs in the creating operation's scope.

use tessera_common::ErrorCode;

use crate::environment::Environment;
use crate::error::Result;
use crate::types::{AccountState, Address, ContractInfo, FeeConfig, Privilege};

use super::{load_source, ContractEntry, ContractTrigger, OpOutcome};

#[allow(clippy::too_many_arguments)]
pub(super) fn apply(
    env: &mut Environment,
    fees: &FeeConfig,
    source: &Address,
    dest: &Address,
    init_balance: i64,
    privilege: &Privilege,
    contract: Option<&ContractInfo>,
    init_input: Option<&str>,
) -> Result<OpOutcome> {
    if env.account_exists(dest.as_str())? {
        return Ok(OpOutcome::fail(
            ErrorCode::AccountDestExists,
            format!("destination account {dest} already exists"),
        ));
    }
    let mut src = match load_source(env, source)? {
        Ok(acc) => acc,
        Err(fail) => return Ok(fail),
    };

    match contract {
        Some(info) => {
            if info.payload.is_empty() {
                return Ok(OpOutcome::fail(
                    ErrorCode::InvalidParameter,
                    "empty contract payload",
                ));
            }
            // Contract accounts must be inert: no master key, threshold 1.
            if privilege.master_weight != 0 || privilege.thresholds.tx_threshold != 1 {
                return Ok(OpOutcome::fail(
                    ErrorCode::InvalidParameter,
                    "contract account requires master_weight 0 and tx_threshold 1",
                ));
            }
        }
        None => {
            if init_balance < fees.base_reserve {
                return Ok(OpOutcome::fail(
                    ErrorCode::AccountLowReserve,
                    format!(
                        "init_balance {init_balance} below base reserve {}",
                        fees.base_reserve
                    ),
                ));
            }
        }
    }

    if src.balance < init_balance
        || src.balance - init_balance < fees.base_reserve
    {
        return Ok(OpOutcome::fail(
            ErrorCode::AccountLowReserve,
            format!(
                "source balance {} cannot fund {init_balance} and keep reserve {}",
                src.balance, fees.base_reserve
            ),
        ));
    }
    if src.sub_balance(init_balance).is_err() {
        return Ok(OpOutcome::fail(ErrorCode::MathOverflow, "funding underflow"));
    }

    let mut created = AccountState::new(dest.clone(), init_balance);
    created.privilege = privilege.clone();
    created.contract = contract.cloned();

    env.put_account(src);
    env.put_account(created);

    if contract.is_some() {
        return Ok(OpOutcome::ok_with_trigger(ContractTrigger {
            contract: dest.clone(),
            entry: ContractEntry::Init,
            input: init_input.unwrap_or_default().to_string(),
        }));
    }
    Ok(OpOutcome::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EmptyReader;
    use crate::types::Thresholds;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn addr(tag: &str) -> Address {
        let mut s = format!("tsrQ{tag}");
        while s.len() < 36 {
            s.push('x');
        }
        Address::new(s)
    }

    fn env_with(addr_: &Address, balance: i64) -> Environment {
        let mut env = Environment::new(Arc::new(EmptyReader));
        env.put_account(AccountState::new(addr_.clone(), balance));
        env
    }

    #[test]
    fn test_create_plain_account() {
        let alice = addr("alice");
        let bob = addr("bob");
        let mut env = env_with(&alice, 10_000);
        let fees = FeeConfig::default();

        let outcome = apply(
            &mut env,
            &fees,
            &alice,
            &bob,
            500,
            &Privilege::default(),
            None,
            None,
        )
        .unwrap();
        assert!(outcome.result.is_success());
        assert!(outcome.trigger.is_none());
        assert_eq!(env.get_account(bob.as_str()).unwrap().unwrap().balance, 500);
        assert_eq!(env.get_account(alice.as_str()).unwrap().unwrap().balance, 9_500);
    }

    #[test]
    fn test_dest_exists() {
        let alice = addr("alice");
        let bob = addr("bob");
        let mut env = env_with(&alice, 10_000);
        env.put_account(AccountState::new(bob.clone(), 1));

        let outcome = apply(
            &mut env,
            &FeeConfig::default(),
            &alice,
            &bob,
            500,
            &Privilege::default(),
            None,
            None,
        )
        .unwrap();
        assert_eq!(outcome.result.code(), ErrorCode::AccountDestExists);
        // Source untouched.
        assert_eq!(env.get_account(alice.as_str()).unwrap().unwrap().balance, 10_000);
    }

    #[test]
    fn test_init_balance_below_reserve() {
        let alice = addr("alice");
        let mut env = env_with(&alice, 10_000);
        let fees = FeeConfig {
            gas_price: 1,
            base_reserve: 100,
        };
        let outcome = apply(
            &mut env,
            &fees,
            &alice,
            &addr("bob"),
            99,
            &Privilege::default(),
            None,
            None,
        )
        .unwrap();
        assert_eq!(outcome.result.code(), ErrorCode::AccountLowReserve);
    }

    #[test]
    fn test_contract_account_triggers_init() {
        let alice = addr("alice");
        let dest = addr("widget");
        let mut env = env_with(&alice, 10_000);
        let privilege = Privilege {
            master_weight: 0,
            signers: BTreeMap::new(),
            thresholds: Thresholds {
                tx_threshold: 1,
                type_thresholds: BTreeMap::new(),
            },
        };
        let contract = ContractInfo {
            payload: "function init(input) {}".into(),
            kind: 0,
        };
        let outcome = apply(
            &mut env,
            &FeeConfig::default(),
            &alice,
            &dest,
            0,
            &privilege,
            Some(&contract),
            Some("{\"n\":1}"),
        )
        .unwrap();
        assert!(outcome.result.is_success());
        let trigger = outcome.trigger.unwrap();
        assert_eq!(trigger.contract, dest);
        assert_eq!(trigger.entry, ContractEntry::Init);
        assert!(env.get_account(dest.as_str()).unwrap().unwrap().is_contract());
    }

    #[test]
    fn test_contract_account_privilege_rules() {
        let alice = addr("alice");
        let mut env = env_with(&alice, 10_000);
        let contract = ContractInfo {
            payload: "function main() {}".into(),
            kind: 0,
        };
        // Default privilege has master_weight 1.
        let outcome = apply(
            &mut env,
            &FeeConfig::default(),
            &alice,
            &addr("widget"),
            0,
            &Privilege::default(),
            Some(&contract),
            None,
        )
        .unwrap();
        assert_eq!(outcome.result.code(), ErrorCode::InvalidParameter);
    }
}
