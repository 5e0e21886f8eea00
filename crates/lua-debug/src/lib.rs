//! Debug Adapter Protocol (DAP) engine for embedded Lua interpreters.

mod breakpoints;
mod bridge;
mod config;
mod controller;
mod error;
mod protocol;
mod protocol_io;
mod runtime;
mod server;
mod session;
mod stack;
mod step;

#[cfg(test)]
mod test_support;

pub use breakpoints::BreakpointRegistry;
pub use bridge::{ExecutionBridge, StopContext};
pub use config::{init_tracing, DebugServerConfig, PathCase};
pub use controller::{Debugger, SessionController, DEFAULT_THREAD_ID};
pub use error::{DebugError, Result};
pub use protocol::{
    AttachArguments, Breakpoint, Capabilities, ContinueArguments, ContinueResponseBody,
    DebugLocation, DisconnectArguments, Event, FunctionBreakpoint, HandshakeResponse,
    InitializeArguments, LaunchArguments, MessageType, NextArguments, PauseArguments,
    ProtocolMessage, Request, Response, Scope, ScopesArguments, ScopesResponseBody,
    SetBreakpointsArguments, SetBreakpointsResponseBody, SetFunctionBreakpointsArguments, Source,
    SourceBreakpoint, StackFrame, StackTraceArguments, StackTraceResponseBody, StepInArguments,
    StepOutArguments, StoppedEventBody, Thread, ThreadsResponseBody, Variable,
    VariablePresentationHint, VariablesArguments, VariablesFilter, VariablesResponseBody,
};
pub use protocol_io::{
    encode_packet, MessageReader, MessageWriter, PacketBuffer, DEFAULT_ENDPOINT, MAX_PACKET_SIZE,
};
pub use runtime::{
    DebugRuntime, DebugTarget, EventKind, ExecutionEvent, ExecutionHook, FrameInfo, FrameKind,
    RuntimeValue, StartMode, ValueKey, ValuePath,
};
pub use server::{serve_connection, ControllerFactory, DebugServer, DebuggerFactory, DEFAULT_LOCATION};
pub use session::{DebugSession, SessionHandle};
pub use stack::{ReferenceIds, StackGraph};
pub use step::{ContinueMode, StepPredicate};
