//! Configuration loader with multi-source merging

use crate::{KgcheckConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "KGCHECK".to_string(),
            user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "KGCHECK")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/kgcheck/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<KgcheckConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = KgcheckConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/kgcheck/config.toml)
        if self.user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                builder = builder.add_source(toml_file(user_config_file));
            }
        }

        // 3. Project config (kgcheck.toml)
        builder = builder.add_source(toml_file(Paths::project_config_file(&self.project_dir)));

        // 4. Local config (kgcheck.local.toml, gitignored)
        builder = builder.add_source(toml_file(Paths::local_config_file(&self.project_dir)));

        // 5. Environment variables (KGCHECK_RUN__UPDATE_PERCENTAGE=50)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let kgcheck_config: KgcheckConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        kgcheck_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(kgcheck_config)
    }

    /// Load configuration or return defaults if loading fails
    pub fn load_or_default(self) -> KgcheckConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn toml_file(path: PathBuf) -> config::File<config::FileSourceFile, config::FileFormat> {
    config::File::from(path)
        .required(false)
        .format(config::FileFormat::Toml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgcheck_types::ConflictPolicy;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("KGCHECK_LOADER_TEST")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config.client.collection, "forumkeygroup");
        assert_eq!(config.run.update_percentage, 10);
        assert_eq!(config.reconcile.max_attempts, 100);
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[client]
id = "client-7"
node_id = "nodeB"
host = "10.0.0.2:7411"

[run]
iterations = 500
update_percentage = 50
seed = 99

[server]
conflict_policy = "keep-siblings"
"#;
        fs::write(project_dir.join("kgcheck.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.client.id, "client-7");
        assert_eq!(config.client.node_id, "nodeB");
        assert_eq!(config.client.host.as_deref(), Some("10.0.0.2:7411"));
        assert_eq!(config.run.iterations, 500);
        assert_eq!(config.run.update_percentage, 50);
        assert_eq!(config.run.seed, Some(99));
        assert_eq!(config.server.conflict_policy, ConflictPolicy::KeepSiblings);
        // Untouched sections keep their defaults
        assert_eq!(config.bootstrap.max_attempts, 5);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("kgcheck.toml"),
            r#"
[retry]
initial_delay_ms = 10
max_attempts = 3
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("kgcheck.local.toml"),
            r#"
[retry]
max_attempts = 8
"#,
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.initial_delay_ms, 10);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            temp_dir.path().join("kgcheck.toml"),
            "[run]\nupdate_percentage = 150\n",
        )
        .expect("Failed to write config");

        let err = loader(temp_dir.path()).load().unwrap_err();
        assert!(format!("{err:#}").contains("update_percentage"));
    }

    // Environment overrides are not exercised here: mutating the process
    // environment is unsafe under edition 2024. In actual usage:
    //
    // KGCHECK_CLIENT__HOST=10.0.0.1:7411
    // KGCHECK_RUN__UPDATE_PERCENTAGE=100
    //
    // override the corresponding file values.
}
