//! CLI command implementations.

pub mod config;
pub mod run;
pub mod serve;
pub mod smoke;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};
use kgcheck_config::{ConfigLoader, KgcheckConfig};

/// Loads the layered configuration for the given project directory.
fn load_config(project: &Path) -> Result<KgcheckConfig> {
    ConfigLoader::new()
        .with_project_dir(project)
        .load()
        .context("Failed to load configuration")
}
