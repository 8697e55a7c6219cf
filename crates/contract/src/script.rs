//! A scriptable in-process sandbox.
//!
//! The payload is a JSON object mapping entry names to lists of
//! actions, each action one host call:
//!
//! ```json
//! {
//!   "init": [ {"set_metadata": {"key": "owner", "value": "..."}} ],
//!   "main": [
//!     {"steps": 10},
//!     {"pay_coin": {"dest": "tsrQ...", "amount": 5}},
//!     {"log": {"topic": "paid", "data": "5"}}
//!   ]
//! }
//! ```
//!
//! This is the engine used by tests and single-process tooling: it
//! exercises the whole host surface and the nested-transaction
//! machinery without a real scripting runtime. Deliberately
//! deterministic; the action list is the program.

use std::collections::BTreeSet;

use parking_lot::Mutex;
use serde_json::Value;
use tessera_common::{ErrorCode, OpResult};
use tracing::trace;

use crate::error::{ContractError, Result};
use crate::host::ChainHost;
use crate::sandbox::{ContractParameter, ContractSandbox};

#[derive(Default)]
pub struct ScriptedSandbox {
    cancelled: Mutex<BTreeSet<u64>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn actions(payload: &str, entry: &str) -> Result<Vec<Value>> {
        let doc: Value = serde_json::from_str(payload)
            .map_err(|e| ContractError::Syntax(e.to_string()))?;
        let obj = doc
            .as_object()
            .ok_or_else(|| ContractError::Syntax("payload is not an object".into()))?;
        match obj.get(entry) {
            None => Ok(Vec::new()),
            Some(Value::Array(actions)) => Ok(actions.clone()),
            Some(_) => Err(ContractError::Syntax(format!(
                "entry {entry} is not an action list"
            ))),
        }
    }

    fn is_cancelled(&self, id: u64) -> bool {
        self.cancelled.lock().contains(&id)
    }

    /// Run one action. `Ok(Some(result))` with a failure result stops
    /// the script with that consensus outcome.
    fn run_action(
        &self,
        action: &Value,
        host: &mut dyn ChainHost,
        output: &mut Vec<Value>,
    ) -> Result<OpResult> {
        let obj = action
            .as_object()
            .ok_or_else(|| ContractError::Syntax("action is not an object".into()))?;
        let (name, arg) = obj
            .iter()
            .next()
            .ok_or_else(|| ContractError::Syntax("empty action".into()))?;
        trace!(action = %name, "scripted action");
        match name.as_str() {
            "log" => {
                host.emit_log(str_field(arg, "topic"), str_field(arg, "data"))
                    .map(|_| OpResult::ok())
            }
            "pay_coin" => host.pay_coin(
                str_field(arg, "dest"),
                int_field(arg, "amount"),
                str_field(arg, "input"),
            ),
            "call" => host.call_contract(str_field(arg, "dest"), str_field(arg, "input")),
            "pay_asset" => host.pay_asset(
                str_field(arg, "dest"),
                str_field(arg, "issuer"),
                str_field(arg, "code"),
                int_field(arg, "amount"),
                str_field(arg, "input"),
            ),
            "issue_asset" => host.issue_asset(str_field(arg, "code"), int_field(arg, "amount")),
            "set_metadata" => host.set_metadata(
                str_field(arg, "key"),
                str_field(arg, "value"),
                int_field(arg, "version") as u64,
                bool_field(arg, "delete"),
            ),
            "vote_fee" => host.vote_fee(
                int_field(arg, "gas_price"),
                int_field(arg, "base_reserve"),
            ),
            "vote_validators" => host.vote_validators(arg.clone()),
            "steps" => host.consume_steps(arg.as_u64().unwrap_or(0)),
            "memory" => host.consume_memory(arg.as_u64().unwrap_or(0)),
            "get_balance" => {
                let balance = host.get_balance(str_field(arg, "address"))?;
                output.push(Value::from(balance));
                Ok(OpResult::ok())
            }
            "get_metadata" => {
                let value = host.get_metadata(str_field(arg, "address"), str_field(arg, "key"))?;
                output.push(value.map(Value::from).unwrap_or(Value::Null));
                Ok(OpResult::ok())
            }
            "fail" => Ok(OpResult::error(
                ErrorCode::ContractExecuteFail,
                arg.as_str().unwrap_or("scripted failure"),
            )),
            other => Err(ContractError::Syntax(format!("unknown action {other}"))),
        }
    }

    fn run(
        &self,
        param: &ContractParameter,
        host: &mut dyn ChainHost,
        output: &mut Vec<Value>,
    ) -> Result<OpResult> {
        let actions = Self::actions(&param.payload, &param.entry)?;
        for action in &actions {
            if self.is_cancelled(param.id) {
                return Err(ContractError::Cancelled);
            }
            let result = self.run_action(action, host, output)?;
            if !result.is_success() {
                return Ok(result);
            }
        }
        Ok(OpResult::ok())
    }
}

impl ContractSandbox for ScriptedSandbox {
    fn check_syntax(&self, payload: &str) -> Result<()> {
        let doc: Value = serde_json::from_str(payload)
            .map_err(|e| ContractError::Syntax(e.to_string()))?;
        if !doc.is_object() {
            return Err(ContractError::Syntax("payload is not an object".into()));
        }
        Ok(())
    }

    fn execute(&self, param: &ContractParameter, host: &mut dyn ChainHost) -> Result<OpResult> {
        let mut output = Vec::new();
        self.run(param, host, &mut output)
    }

    fn query(&self, param: &ContractParameter, host: &mut dyn ChainHost) -> Result<String> {
        let mut output = Vec::new();
        let result = self.run(param, host, &mut output)?;
        if !result.is_success() {
            return Err(ContractError::Execute(result.desc().to_string()));
        }
        serde_json::to_string(&output).map_err(|e| ContractError::Execute(e.to_string()))
    }

    fn cancel(&self, id: u64) {
        self.cancelled.lock().insert(id);
    }
}

fn str_field<'a>(arg: &'a Value, field: &str) -> &'a str {
    arg.get(field).and_then(Value::as_str).unwrap_or("")
}

fn int_field(arg: &Value, field: &str) -> i64 {
    arg.get(field).and_then(Value::as_i64).unwrap_or(0)
}

fn bool_field(arg: &Value, field: &str) -> bool {
    arg.get(field).and_then(Value::as_bool).unwrap_or(false)
}
