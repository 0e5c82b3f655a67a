//! Console language used to evaluate text against a live namespace.
//!
//! The language is a small, dynamically typed expression and statement
//! language. Programs are parsed into an AST ([`ast`]), evaluated by the
//! [`Interpreter`] against a [`NamespaceRef`], and talk to the outside world
//! only through a [`ScriptHost`]. Every expression statement that yields a
//! value other than `None` is reported back as a [`Produced`] value, in order.

/// Abstract syntax tree for console programs.
pub mod ast;
/// Builtin functions and methods.
pub mod builtins;
/// Tree-walking evaluator.
pub mod interp;
/// Tokenizer feeding the parser.
pub mod lexer;
/// Namespaces and the module registry.
pub mod namespace;
/// Parser producing [`ast::Program`] values.
pub mod parser;
/// Runtime values and their textual forms.
pub mod value;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use thiserror::Error;

pub use ast::Program;
pub use interp::{Interpreter, Produced};
pub use namespace::{Module, ModuleRegistry, Namespace, NamespaceRef, new_namespace};
pub use parser::parse_program;
pub use value::Value;

/// Convenience result alias for script evaluation.
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Output stream targeted by evaluated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl Stream {
    /// Category name used for `output` events.
    pub fn category(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Host trait implemented by whoever runs console programs.
///
/// The interpreter never touches process stdio directly; `print` and `input`
/// are routed through this seam.
pub trait ScriptHost {
    /// Write program output.
    fn write(&mut self, stream: Stream, text: &str);
    /// Read one line of program input. `None` means input is exhausted.
    fn read_line(&mut self) -> Option<String>;
    /// Write output under a caller-chosen category.
    fn write_special(&mut self, category: &str, text: &str) {
        let _ = category;
        self.write(Stream::Stdout, text);
    }
}

/// Compatibility flags accumulated from `from __future__ import ...`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FutureFlags(u32);

impl FutureFlags {
    /// No flags.
    pub const EMPTY: FutureFlags = FutureFlags(0);
    /// `division`
    pub const DIVISION: FutureFlags = FutureFlags(1 << 0);
    /// `absolute_import`
    pub const ABSOLUTE_IMPORT: FutureFlags = FutureFlags(1 << 1);
    /// `with_statement`
    pub const WITH_STATEMENT: FutureFlags = FutureFlags(1 << 2);
    /// `print_function`
    pub const PRINT_FUNCTION: FutureFlags = FutureFlags(1 << 3);
    /// `unicode_literals`
    pub const UNICODE_LITERALS: FutureFlags = FutureFlags(1 << 4);
    /// `generator_stop`
    pub const GENERATOR_STOP: FutureFlags = FutureFlags(1 << 5);
    /// `annotations`
    pub const ANNOTATIONS: FutureFlags = FutureFlags(1 << 6);
    /// `barry_as_FLUFL`: `<>` is the inequality operator and `!=` is rejected.
    pub const BARRY_AS_FLUFL: FutureFlags = FutureFlags(1 << 7);

    /// Map a `__future__` feature name to its flag.
    ///
    /// Features that are always enabled map to [`FutureFlags::EMPTY`].
    pub fn from_feature(name: &str) -> Option<FutureFlags> {
        let flag = match name {
            "nested_scopes" | "generators" => FutureFlags::EMPTY,
            "division" => FutureFlags::DIVISION,
            "absolute_import" => FutureFlags::ABSOLUTE_IMPORT,
            "with_statement" => FutureFlags::WITH_STATEMENT,
            "print_function" => FutureFlags::PRINT_FUNCTION,
            "unicode_literals" => FutureFlags::UNICODE_LITERALS,
            "generator_stop" => FutureFlags::GENERATOR_STOP,
            "annotations" => FutureFlags::ANNOTATIONS,
            "barry_as_FLUFL" => FutureFlags::BARRY_AS_FLUFL,
            _ => return None,
        };
        Some(flag)
    }

    /// Whether every bit of `other` is set.
    pub fn contains(self, other: FutureFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for FutureFlags {
    type Output = FutureFlags;

    fn bitor(self, rhs: FutureFlags) -> FutureFlags {
        FutureFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for FutureFlags {
    fn bitor_assign(&mut self, rhs: FutureFlags) {
        self.0 |= rhs.0;
    }
}

/// Category of a script failure, named the way console users expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ErrorKind {
    SyntaxError,
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    OverflowError,
    IndexError,
    KeyError,
    AttributeError,
    ImportError,
    EOFError,
    IOError,
    RecursionError,
    RuntimeError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One entry of a script traceback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    /// Source name (`<stdin>`, a script path, a module file).
    pub file: String,
    /// 1-based line number; `0` when unknown.
    pub line: usize,
    /// Enclosing scope (`<module>`, a function name).
    pub scope: String,
}

/// Failure raised while parsing or evaluating console code.
///
/// Frames are ordered outermost first, the way a traceback is printed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Frames the error unwound through.
    pub traceback: Vec<TraceFrame>,
}

impl ScriptError {
    /// Create an error without traceback frames.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceback: Vec::new(),
        }
    }

    /// Record that the error unwound through an outer frame.
    pub fn with_frame(mut self, file: &str, line: usize, scope: &str) -> Self {
        self.traceback.insert(
            0,
            TraceFrame {
                file: file.to_string(),
                line,
                scope: scope.to_string(),
            },
        );
        self
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, message)
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub(crate) fn value_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueError, message)
    }

    pub(crate) fn name_error(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{}' is not defined", name))
    }
}
