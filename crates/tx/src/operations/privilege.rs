//! Signer weights and thresholds.
//!
//! `SetSignerWeight`, `SetThreshold` and the combined `SetPrivilege`
//! all funnel into one apply routine; `None` fields leave the current
//! value in place and a signer weight of 0 removes the signer.

use std::collections::BTreeMap;

use tessera_common::{ErrorCode, OpResult};

use crate::environment::Environment;
use crate::error::Result;
use crate::types::{Address, OperationType};

use super::{load_source, OpOutcome};

pub(super) fn check_signers(source: &Address, signers: &BTreeMap<Address, u64>) -> OpResult {
    for (signer, _) in signers.iter() {
        if !signer.is_valid() {
            return OpResult::error(
                ErrorCode::InvalidAddress,
                format!("bad signer address {signer}"),
            );
        }
        if signer == source {
            return OpResult::error(
                ErrorCode::InvalidParameter,
                "own address in signer list; use master_weight",
            );
        }
    }
    OpResult::ok()
}

pub(super) fn apply(
    env: &mut Environment,
    source: &Address,
    master_weight: Option<u64>,
    signers: &BTreeMap<Address, u64>,
    tx_threshold: Option<u64>,
    type_thresholds: &BTreeMap<OperationType, u64>,
) -> Result<OpOutcome> {
    let mut src = match load_source(env, source)? {
        Ok(acc) => acc,
        Err(fail) => return Ok(fail),
    };

    if let Some(weight) = master_weight {
        src.privilege.master_weight = weight;
    }
    for (signer, weight) in signers {
        if *weight == 0 {
            src.privilege.signers.remove(signer);
        } else {
            src.privilege.signers.insert(signer.clone(), *weight);
        }
    }
    if let Some(threshold) = tx_threshold {
        src.privilege.thresholds.tx_threshold = threshold;
    }
    for (op_type, threshold) in type_thresholds {
        if *threshold == 0 {
            src.privilege.thresholds.type_thresholds.remove(op_type);
        } else {
            src.privilege
                .thresholds
                .type_thresholds
                .insert(*op_type, *threshold);
        }
    }

    env.put_account(src);
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

    fn env_with(a: &Address) -> Environment {
        let mut env = Environment::new(Arc::new(EmptyReader));
        env.put_account(AccountState::new(a.clone(), 0));
        env
    }

    #[test]
    fn test_set_and_remove_signer() {
        let alice = addr("alice");
        let carol = addr("carol");
        let mut env = env_with(&alice);

        let mut signers = BTreeMap::new();
        signers.insert(carol.clone(), 3);
        apply(&mut env, &alice, None, &signers, None, &BTreeMap::new()).unwrap();
        let acc = env.get_account(alice.as_str()).unwrap().unwrap();
        assert_eq!(acc.signer_weight(&carol), 3);

        signers.insert(carol.clone(), 0);
        apply(&mut env, &alice, None, &signers, None, &BTreeMap::new()).unwrap();
        let acc = env.get_account(alice.as_str()).unwrap().unwrap();
        assert_eq!(acc.signer_weight(&carol), 0);
        assert!(acc.privilege.signers.is_empty());
    }

    #[test]
    fn test_thresholds_update() {
        let alice = addr("alice");
        let mut env = env_with(&alice);
        let mut types = BTreeMap::new();
        types.insert(OperationType::SetPrivilege, 5u64);
        apply(&mut env, &alice, Some(2), &BTreeMap::new(), Some(2), &types).unwrap();

        let acc = env.get_account(alice.as_str()).unwrap().unwrap();
        assert_eq!(acc.privilege.master_weight, 2);
        assert_eq!(acc.threshold_for(OperationType::PayCoin), 2);
        assert_eq!(acc.threshold_for(OperationType::SetPrivilege), 5);
    }

    #[test]
    fn test_own_address_rejected_as_signer() {
        let alice = addr("alice");
        let mut signers = BTreeMap::new();
        signers.insert(alice.clone(), 1u64);
        assert_eq!(
            check_signers(&alice, &signers).code(),
            ErrorCode::InvalidParameter
        );
    }
}
