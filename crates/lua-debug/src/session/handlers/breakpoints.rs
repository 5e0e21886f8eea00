//! Breakpoint handlers.
//! - handle_set_breakpoints: replace the breakpoints of one source
//! - handle_set_function_breakpoints: replace all function breakpoints

use serde_json::Value;

use crate::error::Result;
use crate::protocol::{
    Request, SetBreakpointsArguments, SetBreakpointsResponseBody, SetFunctionBreakpointsArguments,
};

use super::super::{DebugSession, DispatchOutcome};
use super::arguments;

impl DebugSession {
    pub(super) fn handle_set_breakpoints(
        &mut self,
        request: &Request<Value>,
    ) -> Result<DispatchOutcome> {
        let args: SetBreakpointsArguments = arguments(request)?;
        let specs = args.breakpoints.unwrap_or_default();
        let breakpoints = self.controller.set_breakpoints(&args.source, &specs);
        Ok(self.reply(request, Some(SetBreakpointsResponseBody { breakpoints })))
    }

    pub(super) fn handle_set_function_breakpoints(
        &mut self,
        request: &Request<Value>,
    ) -> Result<DispatchOutcome> {
        let args: SetFunctionBreakpointsArguments = arguments(request)?;
        let breakpoints = self.controller.set_function_breakpoints(&args.breakpoints);
        Ok(self.reply(request, Some(SetBreakpointsResponseBody { breakpoints })))
    }
}
