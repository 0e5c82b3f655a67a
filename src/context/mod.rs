//! Evaluation context: the live namespace and everything that executes in it.
//!
//! The context owns the primary `__main__` namespace, the namespace that is
//! currently active (switchable through [`EvalContext::set_module`]), the
//! module registry and the compatibility flags accumulated across
//! evaluations. It knows nothing about the wire; callers supply a
//! [`ScriptHost`] for program I/O.

/// Display hooks registered from console code.
pub mod hooks;
/// External process launch.
pub mod process;

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub use hooks::ConsoleDisplayHooks;
pub use process::{ProcessOutcome, run_process};

use crate::config::ReplConfig;
use crate::error::ContextError;
use crate::protocol::Request;
use crate::script::builtins::Builtin;
use crate::script::{
    ErrorKind, FutureFlags, Interpreter, Module, ModuleRegistry, NamespaceRef, Produced, ScriptError,
    ScriptHost, Value, new_namespace, parse_program,
};

/// Name of the primary namespace.
pub const MAIN_MODULE: &str = "__main__";
/// Source name of text evaluated from requests.
pub const STDIN_FILE: &str = "<stdin>";
/// File name of frames contributed by the adapter itself.
pub const INTERNAL_FILE: &str = "<replwire>";
/// Prior-result aliases, oldest first.
pub const PRIOR_RESULT_NAMES: [&str; 3] = ["___", "__", "_"];
/// Optional prompt-refresh routine run after every message.
pub const UPDATE_PROMPT_HOOK: &str = "__update_prompt";
/// List of console display hooks bound in `__main__`.
pub const DISPLAY_HOOKS_BINDING: &str = "__displayhooks";
/// Output routine bound in `__main__`.
pub const OUTPUT_SPECIAL_BINDING: &str = "__output_special";

/// What a `launch` request asks to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// Inline code
    Code(String),
    /// Script file
    Script(PathBuf),
    /// Module found on the search path
    Module(String),
    /// External program
    Process(PathBuf),
}

impl LaunchTarget {
    /// Pick the launch input from request arguments.
    ///
    /// `code` wins over `scriptPath`, which wins over `moduleName`, which wins
    /// over `processPath`. Empty strings count as absent.
    pub fn from_request(request: &Request) -> Result<Self, ContextError> {
        if let Some(code) = request.str_arg("code") {
            Ok(LaunchTarget::Code(code.to_string()))
        } else if let Some(script) = request.str_arg("scriptPath") {
            Ok(LaunchTarget::Script(PathBuf::from(script)))
        } else if let Some(module) = request.str_arg("moduleName") {
            Ok(LaunchTarget::Module(module.to_string()))
        } else if let Some(process) = request.str_arg("processPath") {
            Ok(LaunchTarget::Process(PathBuf::from(process)))
        } else {
            Err(ContextError::UnsupportedLaunch)
        }
    }
}

/// Split `extraArguments` the way a shell would.
pub fn split_arguments(extra: Option<&str>) -> Result<Vec<String>, ContextError> {
    match extra {
        Some(text) if !text.trim().is_empty() => Ok(shell_words::split(text)?),
        _ => Ok(Vec::new()),
    }
}

/// Whether `text` is exactly one of the prior-result aliases.
pub fn is_prior_result_alias(text: &str) -> bool {
    PRIOR_RESULT_NAMES.contains(&text.trim())
}

/// The mutable evaluation state of a session.
#[derive(Debug)]
pub struct EvalContext {
    main: NamespaceRef,
    active: NamespaceRef,
    modules: ModuleRegistry,
    flags: FutureFlags,
    display_hooks: Value,
}

impl EvalContext {
    /// Fresh context whose `__main__` namespace holds only the
    /// `__displayhooks` list and `__output_special`.
    pub fn new(config: &ReplConfig) -> Self {
        let modules = ModuleRegistry::new(&config.module_paths, &config.ps1, &config.ps2);
        let main = new_namespace();
        let display_hooks = Value::list(Vec::new());
        {
            let mut ns = main.borrow_mut();
            ns.set(DISPLAY_HOOKS_BINDING, display_hooks.clone());
            ns.set(OUTPUT_SPECIAL_BINDING, Value::Builtin(Builtin::OutputSpecial));
        }
        modules.register(Module::new(MAIN_MODULE, None, Some(main.clone())));
        Self {
            active: main.clone(),
            main,
            modules,
            flags: FutureFlags::default(),
            display_hooks,
        }
    }

    /// Display hook that consults the `__displayhooks` list created with
    /// this context. Rebinding the name does not replace the list.
    pub fn display_hooks(&self) -> ConsoleDisplayHooks {
        ConsoleDisplayHooks::new(self.display_hooks.clone(), self.modules.clone())
    }

    /// The active namespace.
    pub fn namespace(&self) -> &NamespaceRef {
        &self.active
    }

    /// The `__main__` namespace.
    pub fn main_namespace(&self) -> &NamespaceRef {
        &self.main
    }

    /// Loaded modules.
    pub fn modules(&self) -> &ModuleRegistry {
        &self.modules
    }

    /// Compatibility flags accumulated so far.
    pub fn flags(&self) -> FutureFlags {
        self.flags
    }

    /// Execute `text` in the active namespace and return the produced values.
    ///
    /// With `required_binding`, nothing runs unless that name is bound.
    pub fn evaluate_in_state(
        &mut self,
        text: &str,
        required_binding: Option<&str>,
        host: &mut dyn ScriptHost,
    ) -> Result<Vec<Produced>, ScriptError> {
        if let Some(name) = required_binding {
            let bound = self.active.borrow().contains(name);
            if !bound {
                return Ok(Vec::new());
            }
        }
        let program = parse_program(text, STDIN_FILE, self.flags)?;
        self.flags |= program.flags;
        Interpreter::new(host, self.modules.clone()).run(&program, &self.active, STDIN_FILE)
    }

    /// Shift `___ <- __ <- _ <- value` in the active namespace.
    pub fn rotate_prior_results(&mut self, value: Value) {
        let mut ns = self.active.borrow_mut();
        for pair in PRIOR_RESULT_NAMES.windows(2) {
            let newer = ns.get(pair[1]).unwrap_or(Value::None);
            ns.set(pair[0], newer);
        }
        ns.set(PRIOR_RESULT_NAMES[PRIOR_RESULT_NAMES.len() - 1], value);
    }

    /// Run a script file in the active namespace with `sys.argv = [path, *extra]`.
    pub fn run_script(
        &mut self,
        path: &Path,
        extra: &[String],
        host: &mut dyn ScriptHost,
    ) -> Result<Vec<Produced>, ContextError> {
        let source = fs::read_to_string(path).map_err(|source| ContextError::ReadScript {
            path: path.to_path_buf(),
            source,
        })?;
        let file = path.display().to_string();
        let mut argv = vec![file.clone()];
        argv.extend(extra.iter().cloned());
        info!(script = %file, "running script");
        self.run_file(&source, &file, argv, "run_script", host)
    }

    /// Run a module's source in the active namespace with `sys.argv = ["", *extra]`.
    pub fn run_module(
        &mut self,
        name: &str,
        extra: &[String],
        host: &mut dyn ScriptHost,
    ) -> Result<Vec<Produced>, ContextError> {
        let path = self.modules.locate(name).ok_or_else(|| {
            ScriptError::new(ErrorKind::ImportError, format!("No module named '{}'", name))
            .with_frame(INTERNAL_FILE, 0, "run_module")
        })?;
        let source = fs::read_to_string(&path).map_err(|source| ContextError::ReadScript {
            path: path.clone(),
            source,
        })?;
        let mut argv = vec![String::new()];
        argv.extend(extra.iter().cloned());
        info!(module = name, path = %path.display(), "running module");
        self.run_file(&source, &path.display().to_string(), argv, "run_module", host)
    }

    fn run_file(
        &mut self,
        source: &str,
        file: &str,
        argv: Vec<String>,
        scope: &str,
        host: &mut dyn ScriptHost,
    ) -> Result<Vec<Produced>, ContextError> {
        let _argv = ArgvGuard::install(self.modules.sys(), argv);
        let outcome = parse_program(source, file, FutureFlags::default()).and_then(|program| {
            Interpreter::new(host, self.modules.clone()).run(&program, &self.active, file)
        });
        outcome.map_err(|err| ContextError::Script(err.with_frame(INTERNAL_FILE, 0, scope)))
    }

    /// Make a module's namespace the active one; `None` or `__main__`
    /// returns to the primary namespace. Returns the response message.
    pub fn set_module(&mut self, name: Option<&str>) -> Result<String, ContextError> {
        let name = match name {
            None | Some("") | Some(MAIN_MODULE) => {
                self.active = self.main.clone();
                return Ok(format!("Now in {}", MAIN_MODULE));
            }
            Some(name) => name,
        };
        let module = self
            .modules
            .get(name)
            .ok_or_else(|| ContextError::UnknownModule(name.to_string()))?;
        let namespace = module
            .namespace()
            .ok_or_else(|| ContextError::UnknownModule(name.to_string()))?;
        self.active = namespace.clone();
        debug!(module = name, "switched namespace");
        let file = module
            .file()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "no file".to_string());
        Ok(format!("Now in {} ({})", name, file))
    }

    /// Current `sys.ps1` and `sys.ps2`.
    pub fn prompts(&self) -> (String, String) {
        let sys = self.modules.sys().borrow();
        let read = |name: &str| sys.get(name).map(|value| value.to_str()).unwrap_or_default();
        (read("ps1"), read("ps2"))
    }

    /// Current `sys.argv` as text.
    pub fn argv(&self) -> Vec<String> {
        match self.modules.sys().borrow().get("argv") {
            Some(Value::List(items)) => items.borrow().iter().map(Value::to_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Replaces `sys.argv` and puts the previous value back when dropped.
struct ArgvGuard<'a> {
    sys: &'a NamespaceRef,
    saved: Option<Value>,
}

impl<'a> ArgvGuard<'a> {
    fn install(sys: &'a NamespaceRef, argv: Vec<String>) -> Self {
        debug!(?argv, "argv overridden");
        let saved = sys.borrow().get("argv");
        sys.borrow_mut()
            .set("argv", Value::list(argv.into_iter().map(Value::from).collect()));
        Self { sys, saved }
    }
}

impl Drop for ArgvGuard<'_> {
    fn drop(&mut self) {
        let mut sys = self.sys.borrow_mut();
        match self.saved.take() {
            Some(previous) => sys.set("argv", previous),
            None => {
                sys.remove("argv");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::testing::BufferedHost;
    use serde_json::json;

    fn context() -> EvalContext {
        EvalContext::new(&ReplConfig::default())
    }

    fn request(arguments: serde_json::Value) -> Request {
        Request {
            seq: 1,
            command: "launch".into(),
            arguments,
        }
    }

    #[test]
    fn required_binding_defers_evaluation() {
        let mut ctx = context();
        let mut host = BufferedHost::default();
        let produced = ctx
            .evaluate_in_state("missing_hook()", Some("missing_hook"), &mut host)
            .unwrap();
        assert!(produced.is_empty());
        ctx.evaluate_in_state("hook = lambda: 7", None, &mut host).unwrap();
        let produced = ctx.evaluate_in_state("hook()", Some("hook"), &mut host).unwrap();
        assert_eq!(produced[0].value.repr(), "7");
    }

    #[test]
    fn future_flags_accumulate_across_evaluations() {
        let mut ctx = context();
        let mut host = BufferedHost::default();
        ctx.evaluate_in_state("from __future__ import barry_as_FLUFL", None, &mut host)
            .unwrap();
        assert!(ctx.flags().contains(FutureFlags::BARRY_AS_FLUFL));
        let produced = ctx.evaluate_in_state("1 <> 2", None, &mut host).unwrap();
        assert_eq!(produced[0].value.repr(), "True");
        let err = ctx.evaluate_in_state("1 != 2", None, &mut host).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn prior_results_rotate_oldest_out() {
        let mut ctx = context();
        for n in 1..=4 {
            ctx.rotate_prior_results(Value::Int(n));
        }
        let ns = ctx.namespace().borrow();
        assert_eq!(ns.get("_").unwrap().repr(), "4");
        assert_eq!(ns.get("__").unwrap().repr(), "3");
        assert_eq!(ns.get("___").unwrap().repr(), "2");
        assert!(is_prior_result_alias(" __ "));
        assert!(!is_prior_result_alias("_x"));
    }

    #[test]
    fn launch_target_precedence() {
        let both = request(json!({"code": "1", "scriptPath": "a.rws"}));
        assert_eq!(LaunchTarget::from_request(&both).unwrap(), LaunchTarget::Code("1".into()));
        let module = request(json!({"code": "", "moduleName": "tools"}));
        assert_eq!(
            LaunchTarget::from_request(&module).unwrap(),
            LaunchTarget::Module("tools".into())
        );
        let none = request(json!({}));
        assert_eq!(
            LaunchTarget::from_request(&none).unwrap_err().to_string(),
            "Unsupported script type"
        );
    }

    #[test]
    fn argv_is_restored_after_failing_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.rws");
        fs::write(&script, "import sys\nseen = sys.argv\n1 / 0\n").unwrap();
        let mut ctx = context();
        let mut host = BufferedHost::default();
        let before = ctx.argv();
        let err = ctx
            .run_script(&script, &["--fast".to_string()], &mut host)
            .unwrap_err();
        assert!(matches!(err, ContextError::Script(ref e) if e.kind == ErrorKind::ZeroDivisionError));
        assert_eq!(ctx.argv(), before);
        let seen = ctx.namespace().borrow().get("seen").unwrap();
        assert_eq!(
            seen.repr(),
            format!("['{}', '--fast']", script.display())
        );
    }

    #[test]
    fn module_runs_with_empty_program_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tool.rws"), "import sys\nargs = sys.argv\n").unwrap();
        let config = ReplConfig {
            module_paths: vec![dir.path().to_path_buf()],
            ..ReplConfig::default()
        };
        let mut ctx = EvalContext::new(&config);
        let mut host = BufferedHost::default();
        ctx.run_module("tool", &["a b".to_string()], &mut host).unwrap();
        let args = ctx.namespace().borrow().get("args").unwrap();
        assert_eq!(args.repr(), "['', 'a b']");
        assert_eq!(ctx.argv(), vec![String::new()]);
    }

    #[test]
    fn main_namespace_carries_display_hooks_and_output_special() {
        use crate::cache::DisplayHook;

        let mut ctx = context();
        let mut host = BufferedHost::default();
        let code = "__displayhooks.append(lambda v: {'value': 'hooked'})\n\
                    __output_special(0, {'value': 'sent'})";
        ctx.evaluate_in_state(code, None, &mut host).unwrap();
        assert_eq!(host.stdout, "sent");

        // rebinding the name leaves the registered list in place
        ctx.evaluate_in_state("__displayhooks = []", None, &mut host).unwrap();
        let item = ctx.display_hooks().render(&Value::Int(1)).unwrap();
        assert_eq!(item.value, "hooked");
    }

    #[test]
    fn set_module_switches_namespaces() {
        let mut ctx = context();
        let mut host = BufferedHost::default();
        assert_eq!(ctx.set_module(Some("sys")).unwrap(), "Now in sys (no file)");
        let produced = ctx.evaluate_in_state("ps1", None, &mut host).unwrap();
        assert_eq!(produced[0].value.to_str(), ">>> ");
        assert_eq!(ctx.set_module(None).unwrap(), "Now in __main__");
        assert!(ctx.set_module(Some("builtins")).is_err());
        assert_eq!(
            ctx.set_module(Some("nowhere")).unwrap_err().to_string(),
            "Cannot switch to nowhere"
        );
    }

    #[test]
    fn extra_arguments_split_like_a_shell() {
        assert_eq!(
            split_arguments(Some("-v 'two words' x")).unwrap(),
            vec!["-v", "two words", "x"]
        );
        assert!(split_arguments(None).unwrap().is_empty());
        assert!(split_arguments(Some("'open")).is_err());
    }
}
