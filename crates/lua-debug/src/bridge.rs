//! Execution bridge: parks the interpreter thread during a stop while running
//! work queued by the session task on that same thread.

use parking_lot::{Condvar, Mutex};

use crate::error::{DebugError, Result};
use crate::runtime::DebugRuntime;
use crate::stack::StackGraph;

/// Interpreter-side state available to queued work during a stop.
pub struct StopContext<'a> {
    pub graph: &'a mut StackGraph,
    pub runtime: &'a mut dyn DebugRuntime,
}

type Invocation = Box<dyn FnOnce(&mut StopContext<'_>) + Send>;

#[derive(Default)]
struct BridgeState {
    queue: Vec<Invocation>,
    closing: bool,
}

/// Single-use run loop for one stop.
#[derive(Default)]
pub struct ExecutionBridge {
    state: Mutex<BridgeState>,
    wake: Condvar,
}

impl ExecutionBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `invocation` for the parked thread. Fails once the bridge is disposed.
    pub fn schedule<F>(&self, invocation: F) -> Result<()>
    where
        F: FnOnce(&mut StopContext<'_>) + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.closing {
            return Err(DebugError::StopEnded);
        }
        state.queue.push(Box::new(invocation));
        self.wake.notify_one();
        Ok(())
    }

    /// Lets [`run`](Self::run) return after draining what is already queued.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        state.closing = true;
        self.wake.notify_all();
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().closing
    }

    /// Blocks the calling thread, running queued invocations in order until disposed.
    pub fn run(&self, context: &mut StopContext<'_>) {
        loop {
            let (batch, closing) = {
                let mut state = self.state.lock();
                while state.queue.is_empty() && !state.closing {
                    self.wake.wait(&mut state);
                }
                (std::mem::take(&mut state.queue), state.closing)
            };
            if batch.is_empty() && closing {
                return;
            }
            for invocation in batch {
                invocation(context);
            }
        }
    }
}
