//! Request handlers grouped by DAP area.
//! - lifecycle: initialize/launch/attach/configurationDone/disconnect
//! - breakpoints: setBreakpoints/setFunctionBreakpoints
//! - threads: thread list
//! - inspect: stackTrace/scopes/variables on the active stop
//! - run_control: continue/next/stepIn/stepOut/pause

mod breakpoints;
mod inspect;
mod lifecycle;
mod run_control;
mod threads;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{DebugError, Result};
use crate::protocol::Request;

use super::{DebugSession, DispatchOutcome};

impl DebugSession {
    pub(super) async fn dispatch_request(&mut self, request: Request<Value>) -> DispatchOutcome {
        tracing::debug!(seq = request.seq, command = %request.command, "dispatch");
        let result = match request.command.as_str() {
            "initialize" => self.handle_initialize(&request),
            "launch" => self.handle_launch(&request),
            "attach" => self.handle_attach(&request),
            "configurationDone" => self.handle_configuration_done(&request),
            "disconnect" => self.handle_disconnect(&request),
            "setBreakpoints" => self.handle_set_breakpoints(&request),
            "setFunctionBreakpoints" => self.handle_set_function_breakpoints(&request),
            "threads" => Ok(self.handle_threads(&request)),
            "stackTrace" => self.handle_stack_trace(&request).await,
            "scopes" => self.handle_scopes(&request).await,
            "variables" => self.handle_variables(&request).await,
            "pause" => self.handle_pause(&request),
            "continue" => self.handle_continue(&request),
            "next" => self.handle_next(&request),
            "stepIn" => self.handle_step_in(&request),
            "stepOut" => self.handle_step_out(&request),
            _ => {
                tracing::debug!(command = %request.command, "unsupported command");
                return DispatchOutcome {
                    responses: vec![self.handle.error_response(&request, "unsupported command")],
                    ..DispatchOutcome::default()
                };
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                let fatal = !err.is_contract_violation();
                if fatal {
                    tracing::error!(command = %request.command, %err, "request failed, closing session");
                } else {
                    tracing::warn!(command = %request.command, %err, "request rejected");
                }
                DispatchOutcome {
                    responses: vec![self.handle.error_response(&request, &err.to_string())],
                    should_exit: fatal,
                    ..DispatchOutcome::default()
                }
            }
        }
    }

    fn reply<T: Serialize>(&self, request: &Request<Value>, body: Option<T>) -> DispatchOutcome {
        DispatchOutcome {
            responses: vec![self.handle.ok_response(request, body)],
            ..DispatchOutcome::default()
        }
    }
}

/// Parses `request.arguments`; absent arguments parse as an empty object.
fn arguments<T: DeserializeOwned>(request: &Request<Value>) -> Result<T> {
    let value = request
        .arguments
        .clone()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
    serde_json::from_value(value).map_err(|err| DebugError::invalid_arguments(&request.command, err))
}
