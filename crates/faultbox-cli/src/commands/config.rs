//! Configuration display command.

use std::path::Path;

use anyhow::{Result, bail};

use super::load_config;

/// Prints the resolved configuration.
pub fn show(config_dir: Option<&Path>, format: &str) -> Result<()> {
    let config = load_config(config_dir)?;

    match format {
        "toml" => println!("{}", toml::to_string_pretty(&config)?),
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        other => bail!("Unknown format '{other}'. Use 'toml' or 'json'."),
    }
    Ok(())
}
