//! Protocol engine: framing, sequencing, dispatch and the session state machine.
//!
//! The engine owns the inbound queue and the outbound [`Outbound`] path. Command
//! handling lives behind the [`Dispatch`] trait; [`process_one_message`] drives
//! one step of the loop and contains every handler failure, including panics,
//! as a failed response.

/// NDJSON framing.
pub mod codec;
/// Wire schema.
pub mod message;
/// Sequenced, lock-guarded outbound path.
pub mod outbound;
/// Traceback formatting.
pub mod trace;

use serde_json::{Value, json};
use std::any::Any;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

pub use message::{Event, Incoming, Message, Request, Response, empty_object};
pub use outbound::Outbound;

use crate::error::{HandlerError, ProtocolError};

/// `body.code` of the unrecognized-request response.
pub const UNRECOGNIZED_REQUEST_CODE: i64 = 1014;
/// `message` of the unrecognized-request response.
pub const UNRECOGNIZED_REQUEST: &str = "unrecognized request";
/// `output` category used for loop-level failures.
pub const INTERNAL_ERROR_CATEGORY: &str = "internal error";

/// Session states. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Dispatching every command
    Running,
    /// Evaluated code is blocked on `input()`; only non-evaluating commands run
    AwaitingStdin,
    /// `disconnect` was acknowledged or the transport closed
    Disconnected,
}

/// Outcome of a command handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// `success` of the response
    pub success: bool,
    /// `message` of the response
    pub message: String,
    /// `body` of the response
    pub body: Value,
    /// Enter [`SessionState::Disconnected`] once the response is sent
    pub disconnect: bool,
}

impl Reply {
    /// Bare success.
    pub fn ok() -> Self {
        Self::with_body(empty_object())
    }

    /// Success carrying `body`.
    pub fn with_body(body: Value) -> Self {
        Self {
            success: true,
            message: String::new(),
            body,
            disconnect: false,
        }
    }

    /// Failure carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            body: empty_object(),
            disconnect: false,
        }
    }

    /// Add one field to the body.
    pub fn with(mut self, key: &str, value: Value) -> Self {
        if !self.body.is_object() {
            self.body = empty_object();
        }
        if let Some(body) = self.body.as_object_mut() {
            body.insert(key.to_string(), value);
        }
        self
    }

    /// The failure sent for commands nobody handles.
    pub fn unrecognized() -> Self {
        Self::failure(UNRECOGNIZED_REQUEST).with("code", json!(UNRECOGNIZED_REQUEST_CODE))
    }

    /// Disconnect after this reply is sent.
    pub fn then_disconnect(mut self) -> Self {
        self.disconnect = true;
        self
    }
}

/// The message engine.
pub struct Engine {
    reader: Box<dyn BufRead>,
    queue: VecDeque<Incoming>,
    outbound: Outbound,
    state: SessionState,
}

impl Engine {
    /// Engine reading frames from `reader` and writing them to `writer`.
    pub fn new(reader: impl BufRead + 'static, writer: impl Write + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            queue: VecDeque::new(),
            outbound: Outbound::new(writer),
            state: SessionState::Running,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        if self.state != SessionState::Disconnected {
            self.state = state;
        }
    }

    /// Whether the session has ended.
    pub fn is_disconnected(&self) -> bool {
        self.state == SessionState::Disconnected
    }

    /// Enter the terminal state.
    pub fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            info!("session disconnected");
        }
        self.state = SessionState::Disconnected;
    }

    /// Queue a frame ahead of anything not yet read from the transport.
    pub fn enqueue(&mut self, raw: Value) {
        self.queue.push_back(Incoming::classify(raw));
    }

    /// Next inbound message, blocking on the transport when the queue is empty.
    pub fn next_incoming(&mut self) -> Result<Incoming, ProtocolError> {
        if let Some(incoming) = self.queue.pop_front() {
            return Ok(incoming);
        }
        let raw = codec::read_frame(&mut self.reader)?;
        debug!(frame = %raw, "recv");
        Ok(Incoming::classify(raw))
    }

    /// Cloneable sender for events raised outside the loop.
    pub fn event_sender(&self) -> Outbound {
        self.outbound.clone()
    }

    /// Send a request to the front end.
    pub fn send_request(&self, command: &str, arguments: Value) -> Result<i64, ProtocolError> {
        self.outbound.send_with(|seq| {
            Message::Request(Request {
                seq,
                command: command.to_string(),
                arguments,
            })
        })
    }

    /// Answer `request` with `reply`.
    pub fn send_response(&self, request: &Request, reply: &Reply) -> Result<i64, ProtocolError> {
        self.respond(request.seq, &request.command, reply)
    }

    fn respond(&self, request_seq: i64, command: &str, reply: &Reply) -> Result<i64, ProtocolError> {
        self.outbound.send_with(|seq| {
            Message::Response(Response {
                seq,
                request_seq,
                success: reply.success,
                command: command.to_string(),
                message: reply.message.clone(),
                body: reply.body.clone(),
            })
        })
    }

    /// Answer a request nobody handles.
    pub fn send_unrecognized(&self, request_seq: i64, command: &str) -> Result<i64, ProtocolError> {
        self.respond(request_seq, command, &Reply::unrecognized())
    }

    /// Send an event.
    pub fn send_event(&self, event: &str, body: Value) -> Result<i64, ProtocolError> {
        self.outbound.event(event, body)
    }

    /// Send an `output` event.
    pub fn send_output(&self, category: &str, output: &str) -> Result<i64, ProtocolError> {
        self.outbound.output(category, output)
    }
}

/// Command handling plugged into [`process_one_message`].
pub trait Dispatch {
    /// The engine messages are read from and replies written to.
    fn engine(&mut self) -> &mut Engine;

    /// Handle one request.
    fn on_request(&mut self, request: &Request) -> Result<Reply, HandlerError>;

    /// Text of the failed response for `err`.
    fn describe_error(&self, err: &HandlerError) -> String {
        err.to_string()
    }
}

/// Process one inbound message. Returns `true` once the session has exited.
///
/// Handler failures become failed responses and loop-level decode failures
/// become `internal error` output events; only transport errors escape.
pub fn process_one_message<D: Dispatch + ?Sized>(dispatcher: &mut D) -> Result<bool, ProtocolError> {
    if dispatcher.engine().is_disconnected() {
        return Ok(true);
    }

    let incoming = match dispatcher.engine().next_incoming() {
        Ok(incoming) => incoming,
        Err(ProtocolError::Closed) => {
            info!("transport closed");
            dispatcher.engine().disconnect();
            return Ok(true);
        }
        Err(err) => return Err(err),
    };

    match incoming {
        Incoming::Message(Message::Request(request)) => {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| dispatcher.on_request(&request)));
            let reply = match outcome {
                Ok(Ok(reply)) => reply,
                Ok(Err(err)) => {
                    debug!(command = %request.command, error = %err, "request failed");
                    Reply::failure(dispatcher.describe_error(&err))
                }
                Err(payload) => {
                    let err = HandlerError::Panic(panic_message(payload.as_ref()));
                    warn!(command = %request.command, error = %err, "handler panicked");
                    Reply::failure(err.to_string())
                }
            };
            let engine = dispatcher.engine();
            engine.send_response(&request, &reply)?;
            if reply.disconnect {
                engine.disconnect();
            }
        }
        Incoming::Message(Message::Response(response)) => {
            debug!(request_seq = response.request_seq, "ignoring response from front end");
        }
        Incoming::Message(Message::Event(event)) => {
            debug!(event = %event.event, "ignoring event from front end");
        }
        Incoming::Unknown { seq, command } => {
            dispatcher.engine().send_unrecognized(seq, &command)?;
        }
        Incoming::Undecodable { reason } => {
            warn!(%reason, "undecodable message");
            dispatcher.engine().send_output(INTERNAL_ERROR_CATEGORY, &reason)?;
        }
    }

    Ok(dispatcher.engine().is_disconnected())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Sink(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Sink {
        fn frames(&self) -> Vec<Value> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    struct Echo {
        engine: Engine,
    }

    impl Dispatch for Echo {
        fn engine(&mut self) -> &mut Engine {
            &mut self.engine
        }

        fn on_request(&mut self, request: &Request) -> Result<Reply, HandlerError> {
            match request.command.as_str() {
                "disconnect" => Ok(Reply::ok().then_disconnect()),
                "boom" => panic!("kaboom"),
                "fail" => Err(HandlerError::InvalidArgument("value")),
                _ => Ok(Reply::ok().with("echo", request.arguments.clone())),
            }
        }
    }

    fn echo(input: &str) -> (Echo, Sink) {
        let sink = Sink::default();
        let engine = Engine::new(Cursor::new(input.as_bytes().to_vec()), sink.clone());
        (Echo { engine }, sink)
    }

    #[test]
    fn handler_failures_and_panics_become_failed_responses() {
        let (mut echo, sink) = echo(concat!(
            "{\"type\":\"request\",\"seq\":1,\"command\":\"fail\"}\n",
            "{\"type\":\"request\",\"seq\":2,\"command\":\"boom\"}\n",
            "{\"type\":\"request\",\"seq\":3,\"command\":\"ping\",\"arguments\":{\"x\":1}}\n",
        ));
        for _ in 0..3 {
            assert!(!process_one_message(&mut echo).unwrap());
        }
        let frames = sink.frames();
        assert_eq!(frames[0]["success"], false);
        assert_eq!(frames[0]["message"], "missing or invalid argument: value");
        assert_eq!(frames[1]["success"], false);
        assert_eq!(frames[1]["message"], "internal error: kaboom");
        assert_eq!(frames[2]["body"]["echo"]["x"], 1);
        assert_eq!(frames[2]["requestSeq"], 3);
    }

    #[test]
    fn disconnect_is_terminal() {
        let (mut echo, sink) = echo(concat!(
            "{\"type\":\"request\",\"seq\":1,\"command\":\"disconnect\"}\n",
            "{\"type\":\"request\",\"seq\":2,\"command\":\"ping\"}\n",
        ));
        assert!(process_one_message(&mut echo).unwrap());
        assert!(process_one_message(&mut echo).unwrap());
        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["success"], true);
        assert_eq!(echo.engine.state(), SessionState::Disconnected);
    }

    #[test]
    fn end_of_input_ends_the_session() {
        let (mut echo, sink) = echo("");
        assert!(process_one_message(&mut echo).unwrap());
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn unknown_message_type_is_unrecognized() {
        let (mut echo, sink) = echo("{\"type\":\"nonsense\",\"seq\":5}\n");
        process_one_message(&mut echo).unwrap();
        let frames = sink.frames();
        assert_eq!(frames[0]["requestSeq"], 5);
        assert_eq!(frames[0]["message"], UNRECOGNIZED_REQUEST);
        assert_eq!(frames[0]["body"]["code"], UNRECOGNIZED_REQUEST_CODE);
    }

    #[test]
    fn undecodable_request_is_an_internal_error_event() {
        let (mut echo, sink) = echo("{\"type\":\"request\",\"seq\":\"x\"}\n");
        assert!(!process_one_message(&mut echo).unwrap());
        let frames = sink.frames();
        assert_eq!(frames[0]["type"], "event");
        assert_eq!(frames[0]["body"]["category"], INTERNAL_ERROR_CATEGORY);
    }

    #[test]
    fn malformed_json_is_fatal() {
        let (mut echo, _sink) = echo("{oops\n");
        assert!(matches!(
            process_one_message(&mut echo),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn queued_frames_are_served_before_the_transport() {
        let (mut echo, sink) = echo("{\"type\":\"request\",\"seq\":2,\"command\":\"second\"}\n");
        echo.engine
            .enqueue(json!({"type": "request", "seq": 1, "command": "first"}));
        process_one_message(&mut echo).unwrap();
        process_one_message(&mut echo).unwrap();
        let frames = sink.frames();
        assert_eq!(frames[0]["command"], "first");
        assert_eq!(frames[1]["command"], "second");
        assert_eq!(frames[0]["seq"], 0);
        assert_eq!(frames[1]["seq"], 1);
    }
}
