//! Interpreter capability interface.
//! - DebugRuntime: frame/local/value introspection of a paused interpreter
//! - ExecutionHook: per-event callback installed by the debugger
//! - DebugTarget: the program being debugged

use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::Result;

/// Kind of function running in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Top-level chunk.
    Main,
    /// Script function.
    Lua,
    /// Native (C) function.
    Native,
}

/// Interpreter view of one stack level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub kind: FrameKind,
    pub name: Option<SmolStr>,
    /// Chunk name, e.g. `@scripts/main.lua`.
    pub source: Option<String>,
    pub line: Option<u32>,
}

/// Value read from the interpreter. Composite values carry no payload; their
/// keys are enumerated separately through [`DebugRuntime::entries`].
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeValue {
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Table,
    Function,
    Userdata,
    Thread,
}

/// Key of a table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Name(String),
    Index(i64),
}

/// Location of a value: a local slot of a frame, then a chain of table keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePath {
    pub level: u32,
    /// 1-based local slot.
    pub slot: u32,
    pub keys: Vec<ValueKey>,
}

/// Introspection of a paused interpreter. Only valid on the interpreter thread
/// while an execution event is being handled.
pub trait DebugRuntime {
    /// Frame at `level` (0 = innermost), `None` past the outermost frame.
    fn frame(&mut self, level: u32) -> Option<FrameInfo>;

    /// Number of active frames.
    fn stack_depth(&mut self) -> u32 {
        let mut depth = 0;
        while self.frame(depth).is_some() {
            depth += 1;
        }
        depth
    }

    /// Local names of the frame at `level`, in slot order. `None` when the frame
    /// cannot be activated.
    fn locals(&mut self, level: u32) -> Option<Vec<String>>;

    /// Reads the value at `path`, `None` when it is no longer reachable.
    fn resolve(&mut self, path: &ValuePath) -> Option<RuntimeValue>;

    /// Keys of the table at `path`, in iteration order.
    fn entries(&mut self, path: &ValuePath) -> Option<Vec<ValueKey>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Line,
    Call,
    Return,
}

/// One interpreter hook notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    pub kind: EventKind,
    pub source: Option<String>,
    pub line: Option<u32>,
    /// Called function name for call events.
    pub function: Option<SmolStr>,
}

impl ExecutionEvent {
    pub fn line(source: impl Into<String>, line: u32) -> Self {
        Self {
            kind: EventKind::Line,
            source: Some(source.into()),
            line: Some(line),
            function: None,
        }
    }

    pub fn call(function: impl Into<SmolStr>) -> Self {
        Self {
            kind: EventKind::Call,
            source: None,
            line: None,
            function: Some(function.into()),
        }
    }

    #[must_use]
    pub fn ret() -> Self {
        Self {
            kind: EventKind::Return,
            source: None,
            line: None,
            function: None,
        }
    }
}

/// Callback the target invokes synchronously on its interpreter thread.
pub trait ExecutionHook: Send + Sync {
    fn on_execution_event(&self, runtime: &mut dyn DebugRuntime, event: &ExecutionEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Launch,
    Attach,
}

/// Program under debug.
pub trait DebugTarget: Send + Sync {
    /// Starts (or attaches to) the program with `hook` installed. Must not block:
    /// the program runs on the target's own interpreter thread.
    fn start(&self, mode: StartMode, hook: Arc<dyn ExecutionHook>) -> Result<()>;
}
