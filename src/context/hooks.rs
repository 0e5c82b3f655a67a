use tracing::{debug, warn};

use crate::cache::display::TEXT_PLAIN;
use crate::cache::{DisplayHook, DisplayItem};
use crate::script::{Interpreter, ModuleRegistry, ScriptHost, Stream, Value};

/// Display hook backed by the console's `__displayhooks` list.
///
/// Every callable in the list is called with the value being displayed, in
/// order. The first one returning a non-empty dict supplies the rendering:
/// `contentType` (default `text/plain`) and `value` (default the dict's
/// repr). Failing hooks are logged and skipped.
#[derive(Debug)]
pub struct ConsoleDisplayHooks {
    hooks: Value,
    modules: ModuleRegistry,
}

impl ConsoleDisplayHooks {
    pub(crate) fn new(hooks: Value, modules: ModuleRegistry) -> Self {
        Self { hooks, modules }
    }

    fn registered(&self) -> Vec<Value> {
        match &self.hooks {
            Value::List(items) => items.borrow().clone(),
            _ => Vec::new(),
        }
    }
}

impl DisplayHook for ConsoleDisplayHooks {
    fn render(&self, value: &Value) -> Option<DisplayItem> {
        let hooks = self.registered();
        if hooks.is_empty() {
            return None;
        }
        let mut host = QuietHost;
        let mut interp = Interpreter::new(&mut host, self.modules.clone());
        for hook in hooks {
            match interp.call_value(hook, vec![value.clone()]) {
                Ok(rendered) => {
                    if let Some(item) = display_item(&rendered) {
                        return Some(item);
                    }
                }
                Err(err) => warn!(error = %err, "display hook failed"),
            }
        }
        None
    }
}

fn display_item(rendered: &Value) -> Option<DisplayItem> {
    let Value::Dict(entries) = rendered else {
        return None;
    };
    let entries = entries.borrow();
    if entries.is_empty() {
        return None;
    }
    let field = |key: &str| {
        entries
            .iter()
            .find(|(existing, _)| existing.as_str() == Some(key))
            .map(|(_, value)| value.to_str())
    };
    Some(DisplayItem {
        content_type: field("contentType").unwrap_or_else(|| TEXT_PLAIN.to_string()),
        value: field("value").unwrap_or_else(|| rendered.repr()),
    })
}

/// Host for hook calls: output goes to the log, input is exhausted.
struct QuietHost;

impl ScriptHost for QuietHost {
    fn write(&mut self, stream: Stream, text: &str) {
        debug!(stream = stream.category(), text, "display hook output");
    }

    fn read_line(&mut self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{FutureFlags, new_namespace, parse_program};

    fn hooks_from(source: &str) -> ConsoleDisplayHooks {
        let modules = ModuleRegistry::new(&[], ">>> ", "... ");
        let globals = new_namespace();
        let list = Value::list(Vec::new());
        globals.borrow_mut().set("hooks", list.clone());
        let program = parse_program(source, "<test>", FutureFlags::default()).unwrap();
        let mut host = QuietHost;
        Interpreter::new(&mut host, modules.clone())
            .run(&program, &globals, "<test>")
            .unwrap();
        ConsoleDisplayHooks::new(list, modules)
    }

    #[test]
    fn first_non_empty_dict_wins() {
        let hooks = hooks_from(
            "hooks.append(lambda v: None)\n\
             hooks.append(lambda v: {'contentType': 'text/html', 'value': '<b>' + str(v) + '</b>'} if v == 3 else {})\n\
             hooks.append(lambda v: {'value': 'fallback'})",
        );
        let item = hooks.render(&Value::Int(3)).unwrap();
        assert_eq!(item.content_type, "text/html");
        assert_eq!(item.value, "<b>3</b>");

        let item = hooks.render(&Value::Int(4)).unwrap();
        assert_eq!(item.content_type, TEXT_PLAIN);
        assert_eq!(item.value, "fallback");
    }

    #[test]
    fn failing_hooks_are_skipped() {
        let hooks = hooks_from("hooks.append(lambda v: 1 / 0)\nhooks.append(lambda v: {'x': 1})");
        let item = hooks.render(&Value::Int(1)).unwrap();
        assert_eq!(item.value, "{'x': 1}");
        assert!(hooks_from("").render(&Value::Int(1)).is_none());
    }
}
