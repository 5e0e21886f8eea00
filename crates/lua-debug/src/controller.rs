//! Session controller and the interpreter-side debugger.
//! - SessionController: what a session needs from the debugged program
//! - Debugger: breakpoint/step evaluation on execution events

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::breakpoints::BreakpointRegistry;
use crate::config::PathCase;
use crate::error::{DebugError, Result};
use crate::protocol::{
    AttachArguments, Breakpoint, FunctionBreakpoint, LaunchArguments, Source, SourceBreakpoint,
    StoppedEventBody, Thread,
};
use crate::runtime::{
    DebugRuntime, DebugTarget, EventKind, ExecutionEvent, ExecutionHook, StartMode,
};
use crate::session::SessionHandle;
use crate::stack::{ReferenceIds, StackGraph};
use crate::step::{ContinueMode, StepPredicate};

/// Only thread reported to clients.
pub const DEFAULT_THREAD_ID: u32 = 1;

/// Program-side half of a debug session.
pub trait SessionController: Send + Sync {
    fn attach_session(&self, session: SessionHandle);
    fn configure_launch(&self, args: &LaunchArguments) -> Result<()>;
    fn configure_attach(&self, args: &AttachArguments) -> Result<()>;
    /// Starts the program; the start mode must have been chosen.
    fn configuration_done(&self) -> Result<()>;
    fn disconnect(&self);
    fn set_breakpoints(&self, source: &Source, breakpoints: &[SourceBreakpoint]) -> Vec<Breakpoint>;
    fn set_function_breakpoints(&self, breakpoints: &[FunctionBreakpoint]) -> Vec<Breakpoint>;

    fn threads(&self) -> Vec<Thread> {
        vec![Thread {
            id: DEFAULT_THREAD_ID,
            name: "Default".to_string(),
        }]
    }
}

#[derive(Debug, Default)]
struct ControlState {
    start_mode: Option<StartMode>,
    step: Option<StepPredicate>,
    terminated: bool,
}

/// Debugger for one target: owns the breakpoints and the stepping state, and
/// reports stops to the attached session.
pub struct Debugger {
    this: Weak<Debugger>,
    target: Arc<dyn DebugTarget>,
    registry: BreakpointRegistry,
    references: ReferenceIds,
    session: Mutex<Option<SessionHandle>>,
    control: Mutex<ControlState>,
}

impl Debugger {
    pub fn new(target: Arc<dyn DebugTarget>, path_case: PathCase) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            target,
            registry: BreakpointRegistry::new(path_case),
            references: ReferenceIds::default(),
            session: Mutex::new(None),
            control: Mutex::new(ControlState::default()),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    fn set_start_mode(&self, mode: StartMode) -> Result<()> {
        let mut control = self.control.lock();
        if control.start_mode.is_some() {
            return Err(DebugError::StartModeAlreadySet);
        }
        control.start_mode = Some(mode);
        Ok(())
    }

    fn breakpoint_stop(&self, event: &ExecutionEvent) -> Option<StoppedEventBody> {
        let (reason, id) = match event.kind {
            EventKind::Line => {
                let line = event.line?;
                ("breakpoint", self.registry.match_line(event.source.as_deref(), line)?)
            }
            EventKind::Call => {
                let function = event.function.as_deref()?;
                ("function breakpoint", self.registry.match_call(function)?)
            }
            EventKind::Return => return None,
        };
        Some(stopped(reason, Some(id)))
    }

    fn step_stop(
        step: Option<StepPredicate>,
        runtime: &mut dyn DebugRuntime,
        event: &ExecutionEvent,
    ) -> Option<StoppedEventBody> {
        let step = step?;
        if event.kind != EventKind::Line {
            return None;
        }
        let line = event.line?;
        let depth = runtime.stack_depth();
        step.should_stop(event.kind, line, depth)
            .then(|| stopped("step", None))
    }

    fn apply_continuation(
        &self,
        mode: ContinueMode,
        runtime: &mut dyn DebugRuntime,
        event: &ExecutionEvent,
    ) {
        let step = match mode {
            ContinueMode::Stopped | ContinueMode::Continue => None,
            ContinueMode::Step | ContinueMode::StepIn | ContinueMode::StepOut => {
                StepPredicate::for_mode(mode, event.line.unwrap_or(0), runtime.stack_depth())
            }
        };
        let mut control = self.control.lock();
        control.step = step;
        if mode == ContinueMode::Stopped {
            control.terminated = true;
        }
    }
}

fn stopped(reason: &str, breakpoint: Option<u32>) -> StoppedEventBody {
    StoppedEventBody {
        reason: reason.to_string(),
        description: None,
        thread_id: Some(DEFAULT_THREAD_ID),
        hit_breakpoint_ids: breakpoint.map(|id| vec![id]),
        all_threads_stopped: Some(true),
    }
}

impl SessionController for Debugger {
    fn attach_session(&self, session: SessionHandle) {
        *self.session.lock() = Some(session);
    }

    fn configure_launch(&self, args: &LaunchArguments) -> Result<()> {
        tracing::debug!(no_debug = ?args.no_debug, "launch requested");
        self.set_start_mode(StartMode::Launch)
    }

    fn configure_attach(&self, _args: &AttachArguments) -> Result<()> {
        tracing::debug!("attach requested");
        self.set_start_mode(StartMode::Attach)
    }

    fn configuration_done(&self) -> Result<()> {
        let mode = self
            .control
            .lock()
            .start_mode
            .ok_or(DebugError::StartModeMissing)?;
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| DebugError::Launch("debugger is shutting down".into()))?;
        let hook: Arc<dyn ExecutionHook> = this;
        tracing::info!(?mode, "starting target");
        self.target.start(mode, hook)
    }

    fn disconnect(&self) {
        let mut control = self.control.lock();
        control.terminated = true;
        control.step = None;
    }

    fn set_breakpoints(&self, source: &Source, breakpoints: &[SourceBreakpoint]) -> Vec<Breakpoint> {
        self.registry.set_source_breakpoints(source, breakpoints)
    }

    fn set_function_breakpoints(&self, breakpoints: &[FunctionBreakpoint]) -> Vec<Breakpoint> {
        self.registry.set_function_breakpoints(breakpoints)
    }
}

impl ExecutionHook for Debugger {
    fn on_execution_event(&self, runtime: &mut dyn DebugRuntime, event: &ExecutionEvent) {
        let step = {
            let control = self.control.lock();
            if control.terminated {
                return;
            }
            control.step
        };

        let Some(body) = self
            .breakpoint_stop(event)
            .or_else(|| Self::step_stop(step, runtime, event))
        else {
            return;
        };
        let Some(session) = self.session.lock().clone() else {
            tracing::warn!(reason = %body.reason, "stop without an attached session");
            return;
        };

        self.control.lock().step = None;
        let graph = StackGraph::new(self.references.clone());
        let mode = session.stop_execution(body, graph, runtime);
        self.apply_continuation(mode, runtime, event);
    }
}
