//! replwire – a debug-console protocol adapter
//!
//! This crate serves an interactive front end over newline-delimited JSON:
//! - A protocol engine with one shared sequence counter, closed command
//!   dispatch, and failure containment (handler errors become failed
//!   responses, never a dead loop)
//! - A reference cache handing out opaque integer handles for produced
//!   values, split into persistent (binding-tied) and ephemeral (per-turn)
//!   generations
//! - An evaluation context running console code, scripts, modules and
//!   external processes against a live, switchable namespace
//!
//! [`repl::Repl`] ties the three together.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Reference cache and display descriptors
pub mod cache;
/// Adapter configuration
pub mod config;
/// Evaluation context
pub mod context;
/// Error types
pub mod error;
/// Protocol engine
pub mod protocol;
/// Command handlers and the prompt loop
pub mod repl;
/// Console language
pub mod script;

pub use cache::ReferenceCache;
pub use config::ReplConfig;
pub use context::EvalContext;
pub use protocol::{Engine, SessionState};
pub use repl::Repl;

/// Current version of replwire
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
