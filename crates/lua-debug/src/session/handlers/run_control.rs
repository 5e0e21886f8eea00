//! Continue/step/pause handlers.
//! - handle_continue: resume execution
//! - handle_next/step_in/step_out: resume with a step predicate
//! - handle_pause: accepted, no effect

use serde_json::Value;

use crate::error::Result;
use crate::protocol::{
    ContinueArguments, ContinueResponseBody, NextArguments, PauseArguments, Request,
    StepInArguments, StepOutArguments,
};
use crate::step::ContinueMode;

use super::super::{DebugSession, DispatchOutcome};
use super::arguments;

impl DebugSession {
    fn resume<T: serde::Serialize>(
        &mut self,
        request: &Request<Value>,
        mode: ContinueMode,
        body: Option<T>,
    ) -> Result<DispatchOutcome> {
        let stop = self.handle.take_stop(mode)?;
        tracing::debug!(?mode, "resuming");
        let mut outcome = self.reply(request, body);
        outcome.release = Some(stop);
        Ok(outcome)
    }

    pub(super) fn handle_continue(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let _args: ContinueArguments = arguments(request)?;
        self.resume(
            request,
            ContinueMode::Continue,
            Some(ContinueResponseBody {
                all_threads_continued: Some(true),
            }),
        )
    }

    pub(super) fn handle_next(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let _args: NextArguments = arguments(request)?;
        self.resume::<Value>(request, ContinueMode::Step, None)
    }

    pub(super) fn handle_step_in(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let _args: StepInArguments = arguments(request)?;
        self.resume::<Value>(request, ContinueMode::StepIn, None)
    }

    pub(super) fn handle_step_out(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let _args: StepOutArguments = arguments(request)?;
        self.resume::<Value>(request, ContinueMode::StepOut, None)
    }

    pub(super) fn handle_pause(&mut self, request: &Request<Value>) -> Result<DispatchOutcome> {
        let args: PauseArguments = arguments(request)?;
        tracing::debug!(thread_id = args.thread_id, "pause ignored");
        Ok(self.reply::<Value>(request, None))
    }
}
