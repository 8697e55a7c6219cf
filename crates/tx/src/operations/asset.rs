//! Asset issuance and asset payment.

use tessera_common::ErrorCode;

use crate::environment::Environment;
use crate::error::Result;
use crate::types::{Address, AssetKey};

use super::{load_source, ContractEntry, ContractTrigger, OpOutcome};

/// Mint `amount` of `(source, code)` into the source's own balance.
pub(super) fn issue(
    env: &mut Environment,
    source: &Address,
    code: &str,
    amount: i64,
) -> Result<OpOutcome> {
    let mut src = match load_source(env, source)? {
        Ok(acc) => acc,
        Err(fail) => return Ok(fail),
    };
    let key = AssetKey {
        issuer: source.clone(),
        code: code.to_string(),
    };
    if src.add_asset(&key, amount).is_err() {
        return Ok(OpOutcome::fail(
            ErrorCode::MathOverflow,
            format!("issuing {amount} of {code} overflows"),
        ));
    }
    env.put_account(src);
    Ok(OpOutcome::ok())
}

/// Move `amount` of `asset` from source to dest. Paying into a contract
/// account triggers its `main` entry.
pub(super) fn pay(
    env: &mut Environment,
    source: &Address,
    dest: &Address,
    asset: &AssetKey,
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

    if src.asset_balance(asset) < amount {
        return Ok(OpOutcome::fail(
            ErrorCode::AccountAssetLowReserve,
            format!(
                "asset balance {} below payment {amount}",
                src.asset_balance(asset)
            ),
        ));
    }
    if src.sub_asset(asset, amount).is_err() || dst.add_asset(asset, amount).is_err() {
        return Ok(OpOutcome::fail(ErrorCode::MathOverflow, "asset transfer overflow"));
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
    use crate::types::AccountState;
    use std::sync::Arc;

    fn addr(tag: &str) -> Address {
        let mut s = format!("tsrQ{tag}");
        while s.len() < 36 {
            s.push('x');
        }
        Address::new(s)
    }

    #[test]
    fn test_issue_then_pay() {
        let issuer = addr("issuer");
        let holder = addr("holder");
        let mut env = Environment::new(Arc::new(EmptyReader));
        env.put_account(AccountState::new(issuer.clone(), 0));
        env.put_account(AccountState::new(holder.clone(), 0));

        assert!(issue(&mut env, &issuer, "GOLD", 1_000)
            .unwrap()
            .result
            .is_success());

        let key = AssetKey {
            issuer: issuer.clone(),
            code: "GOLD".into(),
        };
        let outcome = pay(&mut env, &issuer, &holder, &key, 250, None).unwrap();
        assert!(outcome.result.is_success());
        assert_eq!(
            env.get_account(issuer.as_str()).unwrap().unwrap().asset_balance(&key),
            750
        );
        assert_eq!(
            env.get_account(holder.as_str()).unwrap().unwrap().asset_balance(&key),
            250
        );
    }

    #[test]
    fn test_pay_more_than_held() {
        let issuer = addr("issuer");
        let holder = addr("holder");
        let mut env = Environment::new(Arc::new(EmptyReader));
        env.put_account(AccountState::new(issuer.clone(), 0));
        env.put_account(AccountState::new(holder.clone(), 0));
        let key = AssetKey {
            issuer: issuer.clone(),
            code: "GOLD".into(),
        };
        let outcome = pay(&mut env, &issuer, &holder, &key, 1, None).unwrap();
        assert_eq!(outcome.result.code(), ErrorCode::AccountAssetLowReserve);
    }

    #[test]
    fn test_pay_missing_dest() {
        let issuer = addr("issuer");
        let mut env = Environment::new(Arc::new(EmptyReader));
        env.put_account(AccountState::new(issuer.clone(), 0));
        let key = AssetKey {
            issuer: issuer.clone(),
            code: "GOLD".into(),
        };
        let outcome = pay(&mut env, &issuer, &addr("ghost"), &key, 1, None).unwrap();
        assert_eq!(outcome.result.code(), ErrorCode::AccountNotFound);
    }
}
