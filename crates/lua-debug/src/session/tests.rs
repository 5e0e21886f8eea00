//! Session tests.
//! - breakpoint/step/function-breakpoint stops over an in-memory stream
//! - inspection during a stop, stale references after it
//! - error policy: contract violations vs fatal failures
//! - outgoing seq numbering and single-decision stops

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::*;
use crate::config::PathCase;
use crate::controller::Debugger;
use crate::protocol_io::{encode_packet, DEFAULT_ENDPOINT};
use crate::runtime::{ExecutionEvent, StartMode};
use crate::test_support::{FakeFrame, FakeRuntime, FakeValue, ScriptStep, ScriptedTarget};

const TIMEOUT: Duration = Duration::from_secs(5);

struct Client {
    reader: MessageReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    pending: VecDeque<Value>,
    /// `seq` of every adapter message, in arrival order.
    received: Vec<u64>,
    seq: u64,
}

impl Client {
    async fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    async fn send_raw(&mut self, message: Value) {
        let body = serde_json::to_vec(&message).unwrap();
        self.send_bytes(&encode_packet(DEFAULT_ENDPOINT, &body)).await;
    }

    async fn send(&mut self, command: &str, arguments: Value) -> u64 {
        self.seq += 1;
        let seq = self.seq;
        self.send_raw(json!({
            "seq": seq,
            "type": "request",
            "command": command,
            "arguments": arguments,
        }))
        .await;
        seq
    }

    async fn recv(&mut self) -> Option<Value> {
        let message = tokio::time::timeout(TIMEOUT, self.reader.read_message())
            .await
            .expect("timed out waiting for the adapter")
            .unwrap()?;
        self.received.push(message["seq"].as_u64().expect("message without seq"));
        Some(message)
    }

    fn assert_seq_ascending(&self) {
        assert!(
            self.received.windows(2).all(|pair| pair[0] < pair[1]),
            "seq out of order: {:?}",
            self.received
        );
    }

    async fn response(&mut self, seq: u64) -> Value {
        if let Some(idx) = self
            .pending
            .iter()
            .position(|m| m["type"] == "response" && m["request_seq"] == json!(seq))
        {
            return self.pending.remove(idx).unwrap();
        }
        loop {
            let message = self.recv().await.expect("stream closed before response");
            if message["type"] == "response" && message["request_seq"] == json!(seq) {
                return message;
            }
            self.pending.push_back(message);
        }
    }

    async fn request(&mut self, command: &str, arguments: Value) -> Value {
        let seq = self.send(command, arguments).await;
        self.response(seq).await
    }

    async fn event(&mut self, name: &str) -> Value {
        if let Some(idx) = self
            .pending
            .iter()
            .position(|m| m["type"] == "event" && m["event"] == name)
        {
            return self.pending.remove(idx).unwrap();
        }
        loop {
            let message = self.recv().await.expect("stream closed before event");
            if message["type"] == "event" && message["event"] == name {
                return message;
            }
            self.pending.push_back(message);
        }
    }

    fn pending_events(&self, name: &str) -> usize {
        self.pending
            .iter()
            .filter(|m| m["type"] == "event" && m["event"] == name)
            .count()
    }

    async fn expect_closed(&mut self) {
        while let Some(message) = self.recv().await {
            self.pending.push_back(message);
        }
    }
}

fn start(target: Arc<ScriptedTarget>) -> (Client, JoinHandle<Result<()>>) {
    let (client, task, _handle) = start_with_handle(target);
    (client, task)
}

fn start_with_handle(
    target: Arc<ScriptedTarget>,
) -> (Client, JoinHandle<Result<()>>, SessionHandle) {
    let (client_io, adapter_io) = tokio::io::duplex(64 * 1024);
    let (adapter_read, adapter_write) = tokio::io::split(adapter_io);
    let session = DebugSession::new(Debugger::new(target, PathCase::Sensitive));
    let handle = session.handle();
    let task = tokio::spawn(session.run(
        MessageReader::new(adapter_read),
        MessageWriter::new(adapter_write, DEFAULT_ENDPOINT),
    ));

    let (client_read, client_write) = tokio::io::split(client_io);
    let client = Client {
        reader: MessageReader::new(client_read),
        writer: client_write,
        pending: VecDeque::new(),
        received: Vec::new(),
        seq: 0,
    };
    (client, task, handle)
}

/// Interpreter stack with the innermost frame at `line` and `depth` frames total.
fn stack_at(line: u32, depth: usize) -> FakeRuntime {
    let mut frames = vec![FakeFrame::lua(Some("tick"), "@a.lua", line)
        .local("count", FakeValue::number(f64::from(line)))
        .local(
            "items",
            FakeValue::array(vec![FakeValue::string("x"), FakeValue::string("y")]),
        )];
    for _ in 1..depth {
        frames.push(FakeFrame::main("@a.lua", 1));
    }
    FakeRuntime::new(frames)
}

fn line(line: u32, depth: usize) -> ScriptStep {
    (stack_at(line, depth), ExecutionEvent::line("@a.lua", line))
}

fn call(function: &str, depth: usize) -> ScriptStep {
    (stack_at(0, depth), ExecutionEvent::call(function))
}

async fn launch_with_breakpoints(client: &mut Client, lines: &[u32]) -> Value {
    let response = client.request("initialize", json!({"clientID": "test"})).await;
    assert_eq!(response["success"], json!(true));
    client.event("initialized").await;
    assert_eq!(client.request("launch", json!({})).await["success"], json!(true));
    let breakpoints: Vec<Value> = lines.iter().map(|line| json!({"line": line})).collect();
    let response = client
        .request(
            "setBreakpoints",
            json!({"source": {"path": "a.lua"}, "breakpoints": breakpoints}),
        )
        .await;
    assert_eq!(response["success"], json!(true));
    response
}

async fn finish(client: &mut Client, task: JoinHandle<Result<()>>) {
    let response = client.request("disconnect", json!({})).await;
    assert_eq!(response["success"], json!(true));
    client.expect_closed().await;
    task.await.unwrap().unwrap();
}

async fn wait_finished(finished: oneshot::Receiver<StartMode>) -> StartMode {
    tokio::time::timeout(TIMEOUT, finished)
        .await
        .expect("target did not finish")
        .unwrap()
}

#[tokio::test]
async fn breakpoint_hit_reports_single_stop() {
    let (target, finished) = ScriptedTarget::new(vec![line(5, 1), line(10, 1), line(12, 1)]);
    let (mut client, task, handle) = start_with_handle(target);
    assert!(!handle.is_stopped());

    let response = launch_with_breakpoints(&mut client, &[10]).await;
    assert_eq!(
        response["body"]["breakpoints"],
        json!([{"id": 1, "verified": true, "source": {"path": "a.lua"}, "line": 10}])
    );
    assert_eq!(client.request("configurationDone", json!({})).await["success"], json!(true));

    let stopped = client.event("stopped").await;
    assert_eq!(
        stopped["body"],
        json!({
            "reason": "breakpoint",
            "threadId": 1,
            "hitBreakpointIds": [1],
            "allThreadsStopped": true
        })
    );
    assert!(handle.is_stopped());

    let trace = client.request("stackTrace", json!({"threadId": 1})).await;
    assert_eq!(trace["body"]["stackFrames"][0]["line"], json!(10));
    assert_eq!(trace["body"]["stackFrames"][0]["name"], json!("tick"));

    let response = client.request("continue", json!({"threadId": 1})).await;
    assert_eq!(response["success"], json!(true));
    assert_eq!(response["body"]["allThreadsContinued"], json!(true));

    assert_eq!(wait_finished(finished).await, StartMode::Launch);
    let threads = client.request("threads", json!({})).await;
    assert_eq!(threads["body"]["threads"], json!([{"id": 1, "name": "Default"}]));
    assert_eq!(client.pending_events("stopped"), 0);
    assert!(!handle.is_stopped());

    finish(&mut client, task).await;
    assert!(handle.is_closed());
    client.assert_seq_ascending();
}

#[tokio::test]
async fn inspection_walks_frames_scopes_and_variables() {
    let (target, finished) = ScriptedTarget::new(vec![line(7, 2)]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[7]).await;
    client.request("configurationDone", json!({})).await;
    client.event("stopped").await;

    let trace = client.request("stackTrace", json!({"threadId": 1})).await;
    assert_eq!(trace["body"]["totalFrames"], json!(2));
    let frame_id = trace["body"]["stackFrames"][0]["id"].clone();

    let scopes = client.request("scopes", json!({"frameId": frame_id})).await;
    let scope = &scopes["body"]["scopes"][0];
    assert_eq!(scope["name"], json!("Locals"));
    assert_eq!(scope["presentationHint"], json!("locals"));
    let locals_ref = scope["variablesReference"].clone();

    let locals = client
        .request("variables", json!({"variablesReference": locals_ref}))
        .await;
    let variables = locals["body"]["variables"].as_array().unwrap();
    assert_eq!(variables[0]["name"], json!("count"));
    assert_eq!(variables[0]["value"], json!("7"));
    assert_eq!(variables[0]["variablesReference"], json!(0));
    assert_eq!(variables[1]["type"], json!("array"));
    assert_eq!(variables[1]["indexedVariables"], json!(2));

    let items = client
        .request(
            "variables",
            json!({"variablesReference": variables[1]["variablesReference"]}),
        )
        .await;
    assert_eq!(items["body"]["variables"][1]["value"], json!("y"));

    client.request("continue", json!({"threadId": 1})).await;
    wait_finished(finished).await;
    finish(&mut client, task).await;
}

#[tokio::test]
async fn references_from_an_ended_stop_fail() {
    let (target, finished) = ScriptedTarget::new(vec![line(3, 1), line(4, 1)]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[3, 4]).await;
    client.request("configurationDone", json!({})).await;

    client.event("stopped").await;
    let trace = client.request("stackTrace", json!({"threadId": 1})).await;
    let frame_id = trace["body"]["stackFrames"][0]["id"].clone();
    let scopes = client.request("scopes", json!({"frameId": frame_id})).await;
    let locals_ref = scopes["body"]["scopes"][0]["variablesReference"].clone();
    let first = client
        .request("variables", json!({"variablesReference": locals_ref}))
        .await;
    assert_eq!(first["success"], json!(true));
    client.request("continue", json!({"threadId": 1})).await;

    let second_stop = client.event("stopped").await;
    assert_eq!(second_stop["body"]["hitBreakpointIds"], json!([2]));
    let stale = client
        .request("variables", json!({"variablesReference": locals_ref}))
        .await;
    assert_eq!(stale["success"], json!(false));
    assert!(stale["message"].as_str().unwrap().contains("unknown variables reference"));

    // The session survives the rejected request.
    let trace = client.request("stackTrace", json!({"threadId": 1})).await;
    assert_eq!(trace["body"]["stackFrames"][0]["line"], json!(4));
    client.request("continue", json!({"threadId": 1})).await;
    wait_finished(finished).await;
    finish(&mut client, task).await;
}

#[tokio::test]
async fn continue_without_stop_is_rejected() {
    let (target, _finished) = ScriptedTarget::new(Vec::new());
    let (mut client, task) = start(target);

    let response = client.request("continue", json!({"threadId": 1})).await;
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["message"], json!("not stopped"));

    let response = client.request("variables", json!({"variablesReference": 1})).await;
    assert_eq!(response["success"], json!(false));

    let threads = client.request("threads", json!({})).await;
    assert_eq!(threads["success"], json!(true));
    finish(&mut client, task).await;
}

#[tokio::test]
async fn step_over_skips_nested_call() {
    let (target, finished) = ScriptedTarget::new(vec![
        line(1, 1),
        call("helper", 2),
        line(20, 2),
        line(21, 2),
        line(2, 1),
        line(3, 1),
    ]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[1]).await;
    client.request("configurationDone", json!({})).await;

    client.event("stopped").await;
    assert_eq!(client.request("next", json!({"threadId": 1})).await["success"], json!(true));

    let stopped = client.event("stopped").await;
    assert_eq!(stopped["body"]["reason"], json!("step"));
    assert!(stopped["body"].get("hitBreakpointIds").is_none());
    let trace = client.request("stackTrace", json!({"threadId": 1})).await;
    assert_eq!(trace["body"]["stackFrames"][0]["line"], json!(2));

    client.request("continue", json!({"threadId": 1})).await;
    wait_finished(finished).await;
    finish(&mut client, task).await;
}

#[tokio::test]
async fn step_in_enters_nested_call() {
    let (target, finished) =
        ScriptedTarget::new(vec![line(1, 1), call("helper", 2), line(20, 2), line(2, 1)]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[1]).await;
    client.request("configurationDone", json!({})).await;

    client.event("stopped").await;
    client.request("stepIn", json!({"threadId": 1})).await;
    client.event("stopped").await;
    let trace = client.request("stackTrace", json!({"threadId": 1})).await;
    assert_eq!(trace["body"]["stackFrames"][0]["line"], json!(20));

    client.request("stepOut", json!({"threadId": 1})).await;
    client.event("stopped").await;
    let trace = client.request("stackTrace", json!({"threadId": 1})).await;
    assert_eq!(trace["body"]["stackFrames"][0]["line"], json!(2));

    client.request("continue", json!({"threadId": 1})).await;
    wait_finished(finished).await;
    finish(&mut client, task).await;
}

#[tokio::test]
async fn function_breakpoint_stops_on_call() {
    let (target, finished) = ScriptedTarget::new(vec![line(1, 1), call("helper", 2), line(20, 2)]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[]).await;
    let response = client
        .request("setFunctionBreakpoints", json!({"breakpoints": [{"name": "helper"}]}))
        .await;
    let id = response["body"]["breakpoints"][0]["id"].clone();
    client.request("configurationDone", json!({})).await;

    let stopped = client.event("stopped").await;
    assert_eq!(stopped["body"]["reason"], json!("function breakpoint"));
    assert_eq!(stopped["body"]["hitBreakpointIds"], json!([id]));

    client.request("continue", json!({"threadId": 1})).await;
    wait_finished(finished).await;
    finish(&mut client, task).await;
}

#[tokio::test]
async fn disconnect_during_stop_releases_the_target() {
    let (target, finished) = ScriptedTarget::new(vec![line(3, 1), line(3, 1)]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[3]).await;
    client.request("configurationDone", json!({})).await;
    client.event("stopped").await;

    finish(&mut client, task).await;
    wait_finished(finished).await;
    assert_eq!(client.pending_events("stopped"), 0);
}

#[tokio::test]
async fn responses_echo_request_seq_with_fresh_seq() {
    let (target, _finished) = ScriptedTarget::new(Vec::new());
    let (mut client, task) = start(target);

    client.seq = 41;
    let response = client.request("threads", json!({})).await;
    assert_eq!(response["request_seq"], json!(42));
    assert_eq!(response["command"], json!("threads"));
    let first_seq = response["seq"].as_u64().unwrap();

    let response = client.request("threads", json!({})).await;
    assert!(response["seq"].as_u64().unwrap() > first_seq);
    finish(&mut client, task).await;
}

#[tokio::test]
async fn unsupported_and_non_request_messages() {
    let (target, _finished) = ScriptedTarget::new(Vec::new());
    let (mut client, task) = start(target);

    client
        .send_raw(json!({"seq": 100, "type": "event", "event": "output"}))
        .await;
    let response = client.request("evaluate", json!({"expression": "x"})).await;
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["message"], json!("unsupported command"));

    let response = client.request("pause", json!({"threadId": 1})).await;
    assert_eq!(response["success"], json!(true));
    assert!(client.pending.is_empty());
    finish(&mut client, task).await;
}

#[tokio::test]
async fn start_mode_is_chosen_once() {
    let (target, _finished) = ScriptedTarget::new(Vec::new());
    let (mut client, task) = start(target);

    let response = client.request("configurationDone", json!({})).await;
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["message"], json!("start mode not set"));

    assert_eq!(client.request("attach", json!({})).await["success"], json!(true));
    let response = client.request("launch", json!({})).await;
    assert_eq!(response["success"], json!(false));
    finish(&mut client, task).await;
}

#[tokio::test]
async fn launch_failure_closes_the_session() {
    let (mut client, task) = start(ScriptedTarget::failing());
    client.request("launch", json!({})).await;

    let response = client.request("configurationDone", json!({})).await;
    assert_eq!(response["success"], json!(false));
    assert_eq!(response["message"], json!("launch failed: script not found"));

    client.expect_closed().await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_arguments_close_the_session() {
    let (target, _finished) = ScriptedTarget::new(Vec::new());
    let (mut client, task) = start(target);

    let response = client.request("setBreakpoints", json!({"breakpoints": []})).await;
    assert_eq!(response["success"], json!(false));
    assert!(response["message"]
        .as_str()
        .unwrap()
        .starts_with("invalid setBreakpoints args"));

    client.expect_closed().await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn stream_end_releases_a_parked_target() {
    let (target, finished) = ScriptedTarget::new(vec![line(3, 1)]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[3]).await;
    client.request("configurationDone", json!({})).await;
    client.event("stopped").await;

    client.writer.shutdown().await.unwrap();
    task.await.unwrap().unwrap();
    wait_finished(finished).await;
}

#[tokio::test]
async fn second_continuation_for_one_stop_is_rejected() {
    let (target, finished) = ScriptedTarget::new(vec![line(3, 1)]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[3]).await;
    client.request("configurationDone", json!({})).await;
    client.event("stopped").await;

    let first = client.send("next", json!({"threadId": 1})).await;
    let second = client.send("continue", json!({"threadId": 1})).await;
    assert_eq!(client.response(first).await["success"], json!(true));
    let rejected = client.response(second).await;
    assert_eq!(rejected["success"], json!(false));
    let message = rejected["message"].as_str().unwrap();
    assert!(
        message == "continuation already set" || message == "not stopped",
        "unexpected message {message}"
    );

    wait_finished(finished).await;
    let threads = client.request("threads", json!({})).await;
    assert_eq!(threads["success"], json!(true));
    finish(&mut client, task).await;
    client.assert_seq_ascending();
}

#[tokio::test]
async fn oversized_content_length_during_stop_releases_the_target() {
    let (target, finished) = ScriptedTarget::new(vec![line(3, 1), line(3, 1)]);
    let (mut client, task) = start(target);
    launch_with_breakpoints(&mut client, &[3]).await;
    client.request("configurationDone", json!({})).await;
    client.event("stopped").await;

    client
        .send_bytes(b"POST /dap HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n{}")
        .await;
    let result = tokio::time::timeout(TIMEOUT, task)
        .await
        .expect("session did not end")
        .unwrap();
    assert!(matches!(result, Err(DebugError::Framing(_))));
    assert_eq!(wait_finished(finished).await, StartMode::Launch);
}

#[test]
fn continuation_is_chosen_once_per_stop() {
    let (tx, _rx) = mpsc::unbounded_channel();
    let handle = SessionHandle::new(tx);
    assert!(matches!(
        handle.take_stop(ContinueMode::Continue),
        Err(DebugError::NotStopped)
    ));

    *handle.shared.stopped.lock() = Some(Arc::new(StoppedSession::new()));
    let stop = handle.take_stop(ContinueMode::Step).unwrap();
    assert!(handle.is_stopped());
    assert!(matches!(
        handle.take_stop(ContinueMode::Continue),
        Err(DebugError::ContinuationAlreadySet)
    ));
    assert_eq!(*stop.continuation.lock(), Some(ContinueMode::Step));
}

#[tokio::test]
async fn writer_numbers_messages_in_wire_order() {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = SessionHandle::new(tx.clone());
    let request: Request<Value> =
        serde_json::from_value(json!({"seq": 9, "type": "request", "command": "threads"}))
            .unwrap();
    // Built out of order, numbered as written.
    let response = handle.ok_response::<Value>(&request, None);
    handle.send(&handle.event::<Value>("initialized", None));
    handle.send(&response);
    tx.send(Outgoing::Close).unwrap();

    let (client_io, adapter_io) = tokio::io::duplex(16 * 1024);
    write_loop(Some(rx), MessageWriter::new(adapter_io, DEFAULT_ENDPOINT))
        .await
        .unwrap();
    let mut reader = MessageReader::new(client_io);
    let event = reader.read_message().await.unwrap().unwrap();
    let response = reader.read_message().await.unwrap().unwrap();
    assert_eq!((event["event"].clone(), event["seq"].clone()), (json!("initialized"), json!(1)));
    assert_eq!(response["seq"], json!(2));
    assert_eq!(response["request_seq"], json!(9));
}
