//! Session lifecycle handlers.
//! - handle_initialize: capabilities + `initialized` event
//! - handle_launch/handle_attach: record start mode
//! - handle_configuration_done: start the target
//! - handle_disconnect: close the session

use serde_json::Value;

use crate::error::Result;
use crate::protocol::{
    AttachArguments, Capabilities, DisconnectArguments, InitializeArguments, LaunchArguments,
    Request,
};

use super::super::{DebugSession, DispatchOutcome};
use super::arguments;

impl DebugSession {
    pub(super) fn handle_initialize(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let args: InitializeArguments = arguments(request)?;
        tracing::info!(
            client = args.client_id.as_deref().unwrap_or("unknown"),
            "client initialized"
        );
        let capabilities = Capabilities {
            supports_configuration_done_request: Some(true),
            supports_function_breakpoints: Some(true),
            supports_conditional_breakpoints: Some(false),
            supports_hit_conditional_breakpoints: Some(false),
            supports_log_points: Some(false),
            supports_pause_request: Some(false),
        };
        let mut outcome = self.reply(request, Some(capabilities));
        outcome.events.push(self.handle.event::<Value>("initialized", None));
        Ok(outcome)
    }

    pub(super) fn handle_launch(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let args: LaunchArguments = arguments(request)?;
        self.controller.configure_launch(&args)?;
        Ok(self.reply::<Value>(request, None))
    }

    pub(super) fn handle_attach(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let args: AttachArguments = arguments(request)?;
        self.controller.configure_attach(&args)?;
        Ok(self.reply::<Value>(request, None))
    }

    pub(super) fn handle_configuration_done(
        &mut self,
        request: &Request<Value>,
    ) -> Result<DispatchOutcome> {
        self.controller.configuration_done()?;
        Ok(self.reply::<Value>(request, None))
    }

    pub(super) fn handle_disconnect(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let args: DisconnectArguments = arguments(request)?;
        tracing::info!(restart = args.restart.unwrap_or(false), "client disconnected");
        self.disconnected = true;
        self.controller.disconnect();
        let mut outcome = self.reply::<Value>(request, None);
        outcome.should_exit = true;
        Ok(outcome)
    }
}
