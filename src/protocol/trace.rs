use std::fmt::Write as _;

use crate::error::HandlerError;
use crate::script::ScriptError;

/// Format a script error as a traceback.
///
/// Leading frames whose file starts with one of `skip_prefixes` belong to the
/// adapter itself and are dropped, so the trace begins at caller code.
pub fn format_script_error(err: &ScriptError, skip_prefixes: &[String]) -> String {
    let frames: Vec<_> = err
        .traceback
        .iter()
        .skip_while(|frame| {
            skip_prefixes
                .iter()
                .any(|prefix| frame.file.starts_with(prefix.as_str()))
        })
        .collect();

    let mut out = String::new();
    if !frames.is_empty() {
        out.push_str("Traceback (most recent call last):\n");
        for frame in frames {
            let _ = writeln!(
                out,
                "  File \"{}\", line {}, in {}",
                frame.file, frame.line, frame.scope
            );
        }
    }
    let _ = write!(out, "{}", err);
    out
}

/// Message for a failed response.
pub fn format_handler_error(err: &HandlerError, skip_prefixes: &[String]) -> String {
    match err.script_error() {
        Some(script) => format_script_error(script, skip_prefixes),
        None => err.to_string(),
    }
}
