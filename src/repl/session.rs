use serde_json::{Value as JsonValue, json};
use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::cache::{GLOBALS_REFERENCE, NO_REFERENCE, Projection, ReferenceCache};
use crate::config::ReplConfig;
use crate::error::{HandlerError, ProtocolError};
use crate::protocol::trace::format_handler_error;
use crate::protocol::{
    Dispatch, Engine, Reply, Request, SessionState, empty_object, process_one_message,
};
use crate::script::{NamespaceRef, Produced, ScriptHost, Stream};

/// Event asking the front end for one line of input.
pub const READ_STDIN_EVENT: &str = "readStdin";

pub(crate) type SessionHandler = fn(&mut Session, &Request) -> Result<Reply, HandlerError>;

/// Commands that never start an evaluation. They stay available while
/// evaluated code waits for input.
pub(crate) const SESSION_COMMANDS: &[(&str, SessionHandler)] = &[
    ("initialize", Session::on_acknowledge),
    ("attach", Session::on_acknowledge),
    ("continue", Session::on_acknowledge),
    ("next", Session::on_acknowledge),
    ("stepIn", Session::on_acknowledge),
    ("stepOut", Session::on_acknowledge),
    ("pause", Session::on_acknowledge),
    ("disconnect", Session::on_disconnect),
    ("variables", Session::on_variables),
    ("scopes", Session::on_scopes),
    ("stdin", Session::on_stdin),
    ("setBreakpoints", Session::on_capability_gap),
    ("stackTrace", Session::on_capability_gap),
    ("source", Session::on_capability_gap),
    ("threads", Session::on_capability_gap),
];

pub(crate) fn session_handler(command: &str) -> Option<SessionHandler> {
    SESSION_COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, handler)| *handler)
}

/// Protocol-facing half of a REPL: engine, reference cache and input buffer.
///
/// The session is also the [`ScriptHost`] of evaluated code, so program
/// output turns into `output` events and `input()` relays through the front
/// end.
pub struct Session {
    pub(crate) engine: Engine,
    pub(crate) cache: ReferenceCache,
    pub(crate) config: ReplConfig,
    namespace: NamespaceRef,
    stdin: VecDeque<String>,
    fatal: Option<ProtocolError>,
}

impl Session {
    pub(crate) fn new(engine: Engine, cache: ReferenceCache, config: ReplConfig, namespace: NamespaceRef) -> Self {
        Self {
            engine,
            cache,
            config,
            namespace,
            stdin: VecDeque::new(),
            fatal: None,
        }
    }

    /// Point persistent listings at a different namespace.
    pub(crate) fn set_namespace(&mut self, namespace: NamespaceRef) {
        self.namespace = namespace;
    }

    /// Transport failure raised while pumping messages for `input()`.
    pub(crate) fn take_fatal(&mut self) -> Option<ProtocolError> {
        self.fatal.take()
    }

    /// Mirror the active namespace into the persistent generation.
    pub(crate) fn sync_persistent(&mut self) {
        let bindings = self.namespace.borrow().snapshot();
        self.cache.sync_persistent(bindings);
    }

    /// Handle for a produced value. A bare name still bound to the same
    /// value reuses its persistent handle.
    pub(crate) fn reference(&mut self, produced: Produced) -> i64 {
        if let Some(name) = &produced.binding {
            if let Some(handle) = self.cache.persistent_handle(name) {
                let unchanged = self
                    .cache
                    .value(handle)
                    .map(|current| current.same(&produced.value))
                    .unwrap_or(false);
                if unchanged {
                    return handle;
                }
            }
        }
        self.cache.capture(produced.value, produced.binding.as_deref())
    }

    /// Truncation length requested by `request`, or the configured default.
    pub(crate) fn max_length(&self, request: &Request) -> usize {
        request
            .int_arg("maximumLength")
            .and_then(|max| usize::try_from(max).ok())
            .unwrap_or(self.config.maximum_length)
    }

    fn on_acknowledge(&mut self, _request: &Request) -> Result<Reply, HandlerError> {
        Ok(Reply::ok())
    }

    fn on_disconnect(&mut self, _request: &Request) -> Result<Reply, HandlerError> {
        Ok(Reply::ok().then_disconnect())
    }

    fn on_capability_gap(&mut self, request: &Request) -> Result<Reply, HandlerError> {
        Err(HandlerError::NotImplemented(request.command.clone()))
    }

    fn on_variables(&mut self, request: &Request) -> Result<Reply, HandlerError> {
        let handle = match request.arguments.get("variablesReference") {
            None => GLOBALS_REFERENCE,
            Some(_) => request
                .int_arg("variablesReference")
                .ok_or(HandlerError::InvalidArgument("variablesReference"))?,
        };
        let max = self.max_length(request);

        if handle < NO_REFERENCE {
            self.sync_persistent();
            let variables = self.cache.persistent(&Projection::values(max));
            return Ok(Reply::ok().with("variables", JsonValue::Array(variables)));
        }
        if handle == NO_REFERENCE {
            return Ok(Reply::ok());
        }

        let members = self.cache.capture_members(handle)?;
        let variables = members
            .iter()
            .map(|member| self.cache.resolve(*member, &Projection::values(max)))
            .collect::<Result<Vec<_>, _>>()?;
        let descriptor = self.cache.resolve(handle, &Projection::full(max))?;
        Ok(Reply::with_body(descriptor).with("variables", JsonValue::Array(variables)))
    }

    fn on_scopes(&mut self, _request: &Request) -> Result<Reply, HandlerError> {
        Ok(Reply::ok().with(
            "scopes",
            json!([{
                "name": "Globals",
                "variablesReference": GLOBALS_REFERENCE,
                "expensive": false,
            }]),
        ))
    }

    fn on_stdin(&mut self, request: &Request) -> Result<Reply, HandlerError> {
        let text = request
            .arguments
            .get("text")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        self.stdin.push_back(text.to_string());
        debug!(buffered = self.stdin.len(), "stdin line received");
        Ok(Reply::ok())
    }

    /// Pump messages until a stdin line arrives or the session ends.
    fn await_stdin(&mut self) -> Option<String> {
        if let Err(err) = self.engine.send_event(READ_STDIN_EVENT, empty_object()) {
            warn!(error = %err, "cannot request input");
            self.fatal = Some(err);
            return None;
        }
        self.engine.set_state(SessionState::AwaitingStdin);
        let line = loop {
            if let Some(line) = self.stdin.pop_front() {
                break Some(line);
            }
            match process_one_message(self) {
                Ok(false) => continue,
                Ok(true) => break None,
                Err(err) => {
                    warn!(error = %err, "transport failed while awaiting input");
                    self.engine.disconnect();
                    self.fatal = Some(err);
                    break None;
                }
            }
        };
        self.engine.set_state(SessionState::Running);
        line
    }
}

impl ScriptHost for Session {
    fn write(&mut self, stream: Stream, text: &str) {
        self.write_special(stream.category(), text);
    }

    fn write_special(&mut self, category: &str, text: &str) {
        if let Err(err) = self.engine.send_output(category, text) {
            warn!(error = %err, "dropping program output");
        }
    }

    fn read_line(&mut self) -> Option<String> {
        match self.stdin.pop_front() {
            Some(line) => Some(line),
            None if self.engine.is_disconnected() => None,
            None => self.await_stdin(),
        }
    }
}

/// Dispatch used while evaluated code waits for input.
impl Dispatch for Session {
    fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    fn on_request(&mut self, request: &Request) -> Result<Reply, HandlerError> {
        if super::evaluation_handler(&request.command).is_some() {
            return Err(HandlerError::AwaitingInput);
        }
        match session_handler(&request.command) {
            Some(handler) => handler(self, request),
            None => Ok(Reply::unrecognized()),
        }
    }

    fn describe_error(&self, err: &HandlerError) -> String {
        format_handler_error(err, &self.config.trace_skip_prefixes)
    }
}
