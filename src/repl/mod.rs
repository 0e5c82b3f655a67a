//! REPL front: command handlers, the closed command table, and the prompt loop.
//!
//! A [`Repl`] pairs the protocol-facing [`Session`] (engine, reference cache,
//! stdin buffer) with the [`EvalContext`]. Commands that run code live here;
//! everything else is served by the session, which keeps serving it while
//! evaluated code waits for input.

mod session;

use serde_json::{Value as JsonValue, json};
use std::io::{BufRead, Write};
use tracing::{debug, info, warn};

pub use session::{READ_STDIN_EVENT, Session};

use crate::cache::display::TEXT_PLAIN;
use crate::cache::{JsonDisplayHook, Projection, ReferenceCache};
use crate::config::ReplConfig;
use crate::context::{
    EvalContext, LaunchTarget, UPDATE_PROMPT_HOOK, is_prior_result_alias, run_process,
    split_arguments,
};
use crate::error::{HandlerError, ProtocolError};
use crate::protocol::trace::{format_handler_error, format_script_error};
use crate::protocol::{Dispatch, Engine, Reply, Request, process_one_message};
use crate::script::{Produced, Stream};

/// Event carrying the current prompts.
pub const PROMPTS_EVENT: &str = "prompts";

type Handler = fn(&mut Repl, &Request) -> Result<Reply, HandlerError>;

/// Commands that start an evaluation.
const EVALUATION_COMMANDS: &[(&str, Handler)] = &[
    ("evaluate", Repl::on_evaluate),
    ("launch", Repl::on_launch),
    ("setModule", Repl::on_set_module),
];

pub(crate) fn evaluation_handler(command: &str) -> Option<Handler> {
    EVALUATION_COMMANDS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, handler)| *handler)
}

/// A debug-console session over one transport.
pub struct Repl {
    session: Session,
    context: EvalContext,
}

impl Repl {
    /// Session reading frames from `reader` and writing them to `writer`.
    pub fn new(
        reader: impl BufRead + 'static,
        writer: impl Write + Send + 'static,
        config: ReplConfig,
    ) -> Self {
        let context = EvalContext::new(&config);
        let mut cache = ReferenceCache::new();
        cache.add_hook(Box::new(context.display_hooks()));
        if config.rich_display {
            cache.add_hook(Box::new(JsonDisplayHook));
        }
        let engine = Engine::new(reader, writer);
        let session = Session::new(engine, cache, config, context.namespace().clone());
        Self { session, context }
    }

    /// Every command this REPL answers.
    pub fn commands() -> impl Iterator<Item = &'static str> {
        EVALUATION_COMMANDS
            .iter()
            .map(|(name, _)| *name)
            .chain(session::SESSION_COMMANDS.iter().map(|(name, _)| *name))
    }

    /// The protocol engine.
    pub fn engine(&self) -> &Engine {
        &self.session.engine
    }

    /// The protocol engine, for queueing frames.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.session.engine
    }

    /// The reference cache.
    pub fn cache(&self) -> &ReferenceCache {
        &self.session.cache
    }

    /// The evaluation context.
    pub fn context(&self) -> &EvalContext {
        &self.context
    }

    /// Process one inbound message. Returns `true` once the session has exited.
    pub fn process_one(&mut self) -> Result<bool, ProtocolError> {
        let exited = process_one_message(self)?;
        match self.session.take_fatal() {
            Some(err) => Err(err),
            None => Ok(exited),
        }
    }

    /// Announce the prompts, then serve messages until the session ends,
    /// refreshing the prompts after each one.
    pub fn run(&mut self) -> Result<(), ProtocolError> {
        let mut prompts = self.context.prompts();
        self.send_prompts(&prompts)?;
        while !self.process_one()? {
            self.refresh_prompts(&mut prompts)?;
        }
        info!("session ended");
        Ok(())
    }

    fn send_prompts(&self, (ps1, ps2): &(String, String)) -> Result<(), ProtocolError> {
        self.session
            .engine
            .send_event(PROMPTS_EVENT, json!({ "ps1": ps1, "ps2": ps2 }))?;
        Ok(())
    }

    fn refresh_prompts(&mut self, last: &mut (String, String)) -> Result<(), ProtocolError> {
        let call = format!("{}()", UPDATE_PROMPT_HOOK);
        let outcome = self
            .context
            .evaluate_in_state(&call, Some(UPDATE_PROMPT_HOOK), &mut self.session);
        if let Some(err) = self.session.take_fatal() {
            return Err(err);
        }
        if let Err(err) = outcome {
            warn!(error = %err, "prompt hook failed");
            let text = format_script_error(&err, &self.session.config.trace_skip_prefixes);
            self.session.engine.send_output(Stream::Stderr.category(), &text)?;
        }

        let current = self.context.prompts();
        if current != *last {
            self.send_prompts(&current)?;
            *last = current;
        }
        Ok(())
    }

    fn on_evaluate(&mut self, request: &Request) -> Result<Reply, HandlerError> {
        let expression = request
            .arguments
            .get("expression")
            .and_then(JsonValue::as_str)
            .ok_or(HandlerError::InvalidArgument("expression"))?;
        debug!(expression, "evaluate");

        self.session.cache.clear();
        let outcome = self
            .context
            .evaluate_in_state(expression, None, &mut self.session);
        self.session.sync_persistent();
        let produced = outcome?;

        let projection = Projection::full(self.session.max_length(request));
        let handles: Vec<i64> = produced
            .into_iter()
            .map(|value| self.session.reference(value))
            .collect();
        let Some(last) = handles.last() else {
            return Ok(Reply::ok());
        };
        let mut reply = Reply::with_body(self.session.cache.resolve(*last, &projection)?);
        if request.flag("keepAll") {
            let all = handles
                .iter()
                .map(|handle| self.session.cache.resolve(*handle, &projection))
                .collect::<Result<Vec<_>, _>>()?;
            reply = reply.with("all", JsonValue::Array(all));
        }
        Ok(reply)
    }

    fn on_launch(&mut self, request: &Request) -> Result<Reply, HandlerError> {
        self.session.cache.clear();
        let target = LaunchTarget::from_request(request)?;
        let extra = split_arguments(request.str_arg("extraArguments"))?;
        info!(?target, ?extra, "launch");

        match target {
            LaunchTarget::Code(code) => self.launch_code(&code, request),
            LaunchTarget::Script(path) => {
                let outcome = self.context.run_script(&path, &extra, &mut self.session);
                self.session.sync_persistent();
                outcome?;
                Ok(Reply::ok())
            }
            LaunchTarget::Module(name) => {
                let outcome = self.context.run_module(&name, &extra, &mut self.session);
                self.session.sync_persistent();
                outcome?;
                Ok(Reply::ok())
            }
            LaunchTarget::Process(path) => {
                let events = self.session.engine.event_sender();
                let outcome = run_process(&path, &extra, &events)?;
                Ok(Reply::ok().with("exitCode", json!(outcome.exit_code)))
            }
        }
    }

    fn launch_code(&mut self, code: &str, request: &Request) -> Result<Reply, HandlerError> {
        let outcome = self.context.evaluate_in_state(code, None, &mut self.session);
        let produced: Vec<Produced> = match outcome {
            Ok(produced) => produced,
            Err(err) => {
                self.session.sync_persistent();
                return Err(err.into());
            }
        };
        if !is_prior_result_alias(code) {
            for value in &produced {
                self.context.rotate_prior_results(value.value.clone());
            }
        }
        self.session.sync_persistent();

        let projection = Projection::full(self.session.max_length(request));
        let mut last = None;
        for value in produced {
            let handle = self.session.reference(value);
            let descriptor = self.session.cache.resolve(handle, &projection)?;
            self.echo(&descriptor)?;
            last = Some(descriptor);
        }
        Ok(last.map(Reply::with_body).unwrap_or_else(Reply::ok))
    }

    /// Send a descriptor's richest display entry as an `output` event.
    fn echo(&self, descriptor: &JsonValue) -> Result<(), ProtocolError> {
        let entry = descriptor.get("display").and_then(|display| display.get(0));
        let category = entry
            .and_then(|entry| entry.get("contentType"))
            .and_then(JsonValue::as_str)
            .unwrap_or(TEXT_PLAIN);
        let output = entry
            .and_then(|entry| entry.get("value"))
            .or_else(|| descriptor.get("value"))
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        self.session.engine.send_output(category, output)?;
        Ok(())
    }

    fn on_set_module(&mut self, request: &Request) -> Result<Reply, HandlerError> {
        let message = self.context.set_module(request.str_arg("module"))?;
        self.session.set_namespace(self.context.namespace().clone());
        Ok(Reply {
            message,
            ..Reply::ok()
        })
    }
}

impl Dispatch for Repl {
    fn engine(&mut self) -> &mut Engine {
        &mut self.session.engine
    }

    fn on_request(&mut self, request: &Request) -> Result<Reply, HandlerError> {
        if let Some(handler) = evaluation_handler(&request.command) {
            return handler(self, request);
        }
        match session::session_handler(&request.command) {
            Some(handler) => handler(&mut self.session, request),
            None => Ok(Reply::unrecognized()),
        }
    }

    fn describe_error(&self, err: &HandlerError) -> String {
        format_handler_error(err, &self.session.config.trace_skip_prefixes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn command_table_is_closed_and_unique() {
        let commands: Vec<&str> = Repl::commands().collect();
        let unique: BTreeSet<&str> = commands.iter().copied().collect();
        assert_eq!(commands.len(), unique.len());
        for command in [
            "initialize", "launch", "attach", "disconnect", "evaluate", "variables", "scopes",
            "stdin", "setModule",
        ] {
            assert!(unique.contains(command), "{command} missing");
        }
        assert!(!unique.contains("restart"));
    }

    #[test]
    fn evaluation_commands_are_not_session_commands() {
        for (name, _) in EVALUATION_COMMANDS {
            assert!(session::session_handler(name).is_none());
        }
    }
}
