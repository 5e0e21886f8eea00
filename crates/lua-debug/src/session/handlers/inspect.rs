//! Inspection handlers. Each request runs on the parked interpreter thread.

use serde_json::Value;

use crate::error::Result;
use crate::protocol::{
    Request, ScopesArguments, ScopesResponseBody, StackTraceArguments, VariablesArguments,
    VariablesResponseBody,
};

use super::super::{DebugSession, DispatchOutcome};
use super::arguments;

impl DebugSession {
    pub(super) async fn handle_stack_trace(
        &mut self,
        request: &Request<Value>,
    ) -> Result<DispatchOutcome> {
        let args: StackTraceArguments = arguments(request)?;
        let body = self
            .handle
            .with_stop(move |context| Ok(context.graph.stack_trace(context.runtime, &args)))
            .await?;
        Ok(self.reply(request, Some(body)))
    }

    pub(super) async fn handle_scopes(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let args: ScopesArguments = arguments(request)?;
        let scopes = self
            .handle
            .with_stop(move |context| context.graph.scopes(context.runtime, args.frame_id))
            .await?;
        Ok(self.reply(request, Some(ScopesResponseBody { scopes })))
    }

    pub(super) async fn handle_variables(
        &mut self,
        request: &Request<Value>,
    ) -> Result<DispatchOutcome> {
        let args: VariablesArguments = arguments(request)?;
        let variables = self
            .handle
            .with_stop(move |context| context.graph.variables(context.runtime, &args))
            .await?;
        Ok(self.reply(request, Some(VariablesResponseBody { variables })))
    }
}
