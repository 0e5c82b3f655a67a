//! Adapter configuration.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Configuration for a replwire session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplConfig {
    /// Primary prompt (`sys.ps1`)
    pub ps1: String,

    /// Continuation prompt (`sys.ps2`)
    pub ps2: String,

    /// Directories searched by `import`
    pub module_paths: Vec<PathBuf>,

    /// Truncation length used when a request does not carry `maximumLength`;
    /// values of 3 or less disable truncation
    pub maximum_length: usize,

    /// Enable the JSON display hook for lists and dicts
    pub rich_display: bool,

    /// Trace frames whose file starts with one of these prefixes are dropped
    /// from the head of reported tracebacks
    pub trace_skip_prefixes: Vec<String>,
}

impl Default for ReplConfig {
    fn default() -> Self {
        Self {
            ps1: ">>> ".to_string(),
            ps2: "... ".to_string(),
            module_paths: Vec::new(),
            maximum_length: 0,
            rich_display: false,
            trace_skip_prefixes: vec![crate::context::INTERNAL_FILE.to_string()],
        }
    }
}

impl ReplConfig {
    /// Load a configuration file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the configuration as pretty JSON, replacing the file atomically.
    pub fn write(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_vec_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;
        Ok(())
    }
}
