//! Configuration commands.

use std::path::Path;

use anyhow::{Result, bail};

/// Prints the effective configuration.
pub fn show(project: &Path, format: &str) -> Result<()> {
    let config = super::load_config(project)?;

    match format {
        "toml" => print!("{}", config.to_toml()?),
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        other => bail!("Unknown format '{other}'. Use 'toml' or 'json'."),
    }
    Ok(())
}
