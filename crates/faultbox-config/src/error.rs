//! Configuration error types
//!
//! `validate` reports settings the fault and data layers cannot honor, and
//! path discovery reports a missing home directory. The loader wraps both
//! in `anyhow` context so the CLI prints the offending key on exit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("XDG directory error: {0}")]
    XdgError(String),
}
