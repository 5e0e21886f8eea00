//! Debug session: request loop and the active stop.
//! - SessionHandle: shared with the interpreter thread (stop_execution)
//! - DebugSession::run: read/dispatch/write loop
//! - handlers: DAP request handlers by area
//! - tests: end-to-end session tests over in-memory streams

mod handlers;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::bridge::{ExecutionBridge, StopContext};
use crate::controller::SessionController;
use crate::error::{DebugError, Result};
use crate::protocol::{
    Event, MessageType, ProtocolMessage, Request, Response, StoppedEventBody,
};
use crate::protocol_io::{MessageReader, MessageWriter};
use crate::runtime::DebugRuntime;
use crate::stack::StackGraph;
use crate::step::ContinueMode;

/// The one paused point of execution.
pub(crate) struct StoppedSession {
    bridge: ExecutionBridge,
    continuation: Mutex<Option<ContinueMode>>,
}

impl StoppedSession {
    fn new() -> Self {
        Self {
            bridge: ExecutionBridge::new(),
            continuation: Mutex::new(None),
        }
    }

    /// Wakes the parked interpreter thread.
    pub(crate) fn release(&self) {
        self.bridge.dispose();
    }
}

enum Outgoing {
    Message(Value),
    Close,
}

struct SessionShared {
    closed: AtomicBool,
    stopped: Mutex<Option<Arc<StoppedSession>>>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

/// Cloneable handle to a session, used by controllers on the interpreter thread.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    fn new(outgoing: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                closed: AtomicBool::new(false),
                stopped: Mutex::new(None),
                outgoing,
            }),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.lock().is_some()
    }

    fn send<T: Serialize>(&self, message: &T) {
        match serde_json::to_value(message) {
            Ok(value) => {
                if self.shared.outgoing.send(Outgoing::Message(value)).is_err() {
                    tracing::debug!("session writer gone, message dropped");
                }
            }
            Err(err) => tracing::error!(%err, "failed to encode outgoing message"),
        }
    }

    /// Builds an event; `seq` is filled in by the writer task, in wire order.
    pub(crate) fn event<T: Serialize>(&self, event: &str, body: Option<T>) -> Event<Value> {
        Event {
            seq: 0,
            message_type: MessageType::Event,
            event: event.to_string(),
            body: body.and_then(|body| serde_json::to_value(body).ok()),
        }
    }

    pub(crate) fn ok_response<T: Serialize>(
        &self,
        request: &Request<Value>,
        body: Option<T>,
    ) -> Response<Value> {
        Response {
            seq: 0,
            message_type: MessageType::Response,
            request_seq: request.seq,
            success: true,
            command: request.command.clone(),
            message: None,
            body: body.and_then(|body| serde_json::to_value(body).ok()),
        }
    }

    pub(crate) fn error_response(&self, request: &Request<Value>, message: &str) -> Response<Value> {
        Response {
            seq: 0,
            message_type: MessageType::Response,
            request_seq: request.seq,
            success: false,
            command: request.command.clone(),
            message: Some(message.to_string()),
            body: None,
        }
    }

    /// Reports a stop and parks the calling interpreter thread until the client
    /// picks a continuation. Returns [`ContinueMode::Stopped`] once the session is
    /// closed.
    pub fn stop_execution(
        &self,
        body: StoppedEventBody,
        mut graph: StackGraph,
        runtime: &mut dyn DebugRuntime,
    ) -> ContinueMode {
        let stop = Arc::new(StoppedSession::new());
        {
            let mut slot = self.shared.stopped.lock();
            if self.is_closed() {
                return ContinueMode::Stopped;
            }
            debug_assert!(slot.is_none(), "stop reported while another stop is active");
            *slot = Some(Arc::clone(&stop));
        }

        tracing::debug!(reason = %body.reason, "execution stopped");
        self.send(&self.event("stopped", Some(body)));

        let mut context = StopContext {
            graph: &mut graph,
            runtime,
        };
        stop.bridge.run(&mut context);

        let mut slot = self.shared.stopped.lock();
        if slot.as_ref().is_some_and(|active| Arc::ptr_eq(active, &stop)) {
            *slot = None;
        }
        let mode = stop.continuation.lock().unwrap_or(ContinueMode::Stopped);
        tracing::debug!(?mode, "execution resumed");
        mode
    }

    /// Chooses `mode` as the continuation of the active stop. The caller releases
    /// the returned stop once the response is on its way; the stop stays active
    /// until the interpreter thread wakes, and later decisions are rejected.
    pub(crate) fn take_stop(&self, mode: ContinueMode) -> Result<Arc<StoppedSession>> {
        let stop = self
            .shared
            .stopped
            .lock()
            .clone()
            .ok_or(DebugError::NotStopped)?;
        let mut continuation = stop.continuation.lock();
        if continuation.is_some() {
            return Err(DebugError::ContinuationAlreadySet);
        }
        *continuation = Some(mode);
        drop(continuation);
        Ok(stop)
    }

    /// Runs `f` on the parked interpreter thread and waits for its result.
    pub(crate) async fn with_stop<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut StopContext<'_>) -> Result<T> + Send + 'static,
    {
        let stop = self
            .shared
            .stopped
            .lock()
            .clone()
            .ok_or(DebugError::NotStopped)?;
        let (tx, rx) = oneshot::channel();
        stop.bridge.schedule(move |context| {
            let _ = tx.send(f(context));
        })?;
        rx.await.map_err(|_| DebugError::StopEnded)?
    }

    /// Marks the session closed and lets a parked interpreter thread run free.
    pub(crate) fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let stop = self.shared.stopped.lock().take();
        if let Some(stop) = stop {
            let mut continuation = stop.continuation.lock();
            continuation.get_or_insert(ContinueMode::Stopped);
            drop(continuation);
            stop.release();
        }
    }
}

/// Outcome of one dispatched request.
#[derive(Default)]
pub(crate) struct DispatchOutcome {
    pub(crate) responses: Vec<Response<Value>>,
    pub(crate) events: Vec<Event<Value>>,
    pub(crate) should_exit: bool,
    /// Stop to release after the response is queued.
    pub(crate) release: Option<Arc<StoppedSession>>,
}

/// One client connection driving one controller.
pub struct DebugSession {
    controller: Arc<dyn SessionController>,
    handle: SessionHandle,
    outgoing: Option<mpsc::UnboundedReceiver<Outgoing>>,
    disconnected: bool,
}

impl DebugSession {
    pub fn new(controller: Arc<dyn SessionController>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(tx);
        controller.attach_session(handle.clone());
        Self {
            controller,
            handle,
            outgoing: Some(rx),
            disconnected: false,
        }
    }

    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Serves requests until `disconnect`, a fatal handler error, or end of input.
    pub async fn run<R, W>(
        mut self,
        mut reader: MessageReader<R>,
        writer: MessageWriter<W>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let outgoing = self.outgoing.take();
        let writer_task = tokio::spawn(write_loop(outgoing, writer));

        let result = loop {
            if self.handle.is_closed() {
                break Ok(());
            }
            let message = match reader.read_message().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tracing::debug!("client closed the stream");
                    break Ok(());
                }
                Err(err) => break Err(err),
            };
            let header = match serde_json::from_value::<ProtocolMessage>(message.clone()) {
                Ok(header) => header,
                Err(err) => {
                    tracing::warn!(%err, "dropping message without seq/type");
                    continue;
                }
            };
            if header.message_type != MessageType::Request {
                tracing::debug!(seq = header.seq, kind = ?header.message_type, "ignoring non-request");
                continue;
            }
            let request = match serde_json::from_value::<Request<Value>>(message) {
                Ok(request) => request,
                Err(err) => {
                    tracing::warn!(seq = header.seq, %err, "dropping malformed request");
                    continue;
                }
            };

            let outcome = self.dispatch_request(request).await;
            for response in &outcome.responses {
                self.handle.send(response);
            }
            for event in &outcome.events {
                self.handle.send(event);
            }
            if let Some(stop) = outcome.release {
                stop.release();
            }
            if outcome.should_exit {
                self.handle.close();
            }
        };

        self.handle.close();
        if !self.disconnected {
            self.controller.disconnect();
        }
        let _ = self.handle.shared.outgoing.send(Outgoing::Close);
        match writer_task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(%err, "session writer failed"),
            Err(err) => tracing::warn!(%err, "session writer task panicked"),
        }
        result
    }
}

async fn write_loop<W>(
    outgoing: Option<mpsc::UnboundedReceiver<Outgoing>>,
    mut writer: MessageWriter<W>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let Some(mut outgoing) = outgoing else {
        return Ok(());
    };
    let mut seq: u32 = 1;
    while let Some(message) = outgoing.recv().await {
        match message {
            Outgoing::Message(mut value) => {
                if let Some(object) = value.as_object_mut() {
                    object.insert("seq".to_string(), Value::from(seq));
                    seq += 1;
                }
                writer.write_message(&value).await?;
            }
            Outgoing::Close => break,
        }
    }
    writer.shutdown().await
}
