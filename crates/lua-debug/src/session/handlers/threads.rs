//! Thread requests.
//! - handle_threads: the controller's fixed thread list

use serde_json::Value;

use crate::protocol::{Request, ThreadsResponseBody};

use super::super::{DebugSession, DispatchOutcome};

impl DebugSession {
    pub(super) fn handle_threads(&mut self, request: &Request<Value>) -> DispatchOutcome {
        let threads = self.controller.threads();
        self.reply(request, Some(ThreadsResponseBody { threads }))
    }
}
