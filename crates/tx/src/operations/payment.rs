//! Native-coin payment.

use tessera_common::ErrorCode;

use crate::environment::Environment;
use crate::error::Result;
use crate::types::{Address, FeeConfig};

use super::{load_source, ContractEntry, ContractTrigger, OpOutcome};

/// Move `amount` coins from source to dest. The source must keep the
/// base reserve after paying; the destination must already exist.
/// Paying into a contract account triggers its `main` entry.
pub(super) fn apply(
    env: &mut Environment,
    fees: &FeeConfig,
    source: &Address,
    dest: &Address,
    amount: i64,
    input: Option<&str>,
) -> Result<OpOutcome> {
    let mut dst = match env.get_account(dest.as_str())? {
        Some(acc) => acc,
        None => {
            return Ok(OpOutcome::fail(
                ErrorCode::AccountNotFound,
                format!("destination account {dest} not found"),
            ))
        }
    };
    let mut src = match load_source(env, source)? {
        Ok(acc) => acc,
        Err(fail) => return Ok(fail),
    };

    if src.balance < amount || src.balance - amount < fees.base_reserve {
        return Ok(OpOutcome::fail(
            ErrorCode::AccountLowReserve,
            format!(
                "balance {} cannot pay {amount} and keep reserve {}",
                src.balance, fees.base_reserve
            ),
        ));
    }
    if src.sub_balance(amount).is_err() || dst.add_balance(amount).is_err() {
        return Ok(OpOutcome::fail(ErrorCode::MathOverflow, "coin transfer overflow"));
    }

    let is_contract = dst.is_contract();
    env.put_account(src);
    env.put_account(dst);

    if is_contract {
        return Ok(OpOutcome::ok_with_trigger(ContractTrigger {
            contract: dest.clone(),
            entry: ContractEntry::Main,
            input: input.unwrap_or_default().to_string(),
        }));
    }
    Ok(OpOutcome::ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EmptyReader;
    use crate::types::{AccountState, ContractInfo};
    use std::sync::Arc;

    fn addr(tag: &str) -> Address {
        let mut s = format!("tsrQ{tag}");
        while s.len() < 36 {
            s.push('x');
        }
        Address::new(s)
    }

    fn env2(a: &Address, abal: i64, b: &Address, bbal: i64) -> Environment {
        let mut env = Environment::new(Arc::new(EmptyReader));
        env.put_account(AccountState::new(a.clone(), abal));
        env.put_account(AccountState::new(b.clone(), bbal));
        env
    }

    #[test]
    fn test_pay_coin_moves_balance() {
        let alice = addr("alice");
        let bob = addr("bob");
        let mut env = env2(&alice, 1_000, &bob, 200);
        let outcome = apply(&mut env, &FeeConfig::default(), &alice, &bob, 300, None).unwrap();
        assert!(outcome.result.is_success());
        assert_eq!(env.get_account(alice.as_str()).unwrap().unwrap().balance, 700);
        assert_eq!(env.get_account(bob.as_str()).unwrap().unwrap().balance, 500);
    }

    #[test]
    fn test_pay_coin_respects_reserve() {
        let alice = addr("alice");
        let bob = addr("bob");
        let mut env = env2(&alice, 1_000, &bob, 0);
        let fees = FeeConfig {
            gas_price: 1,
            base_reserve: 100,
        };
        // 1000 - 950 = 50 < reserve.
        let outcome = apply(&mut env, &fees, &alice, &bob, 950, None).unwrap();
        assert_eq!(outcome.result.code(), ErrorCode::AccountLowReserve);
        assert_eq!(env.get_account(alice.as_str()).unwrap().unwrap().balance, 1_000);
    }

    #[test]
    fn test_pay_into_contract_triggers_main() {
        let alice = addr("alice");
        let widget = addr("widget");
        let mut env = env2(&alice, 1_000, &widget, 0);
        let mut contract = env.get_account(widget.as_str()).unwrap().unwrap();
        contract.contract = Some(ContractInfo {
            payload: "function main(input) {}".into(),
            kind: 0,
        });
        env.put_account(contract);

        let outcome =
            apply(&mut env, &FeeConfig::default(), &alice, &widget, 300, Some("ping")).unwrap();
        assert!(outcome.result.is_success());
        let trigger = outcome.trigger.unwrap();
        assert_eq!(trigger.entry, ContractEntry::Main);
        assert_eq!(trigger.input, "ping");
    }
}
