//! CLI command implementations.

pub mod config;
pub mod serve;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};
use faultbox_config::FaultboxConfig;

/// Loads and validates configuration, optionally rooted at `config_dir`.
pub fn load_config(config_dir: Option<&Path>) -> Result<FaultboxConfig> {
    match config_dir {
        Some(dir) => FaultboxConfig::load_from_dir(dir),
        None => FaultboxConfig::load(),
    }
    .context("Failed to load configuration")
}
