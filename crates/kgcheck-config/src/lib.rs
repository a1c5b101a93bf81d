//! Configuration management for kgcheck
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. CLI arguments (highest precedence, applied by the CLI)
//! 2. Environment variables (KGCHECK_* prefix, `__` between section and key)
//! 3. kgcheck.local.toml (gitignored, local overrides)
//! 4. kgcheck.toml (git-tracked, project config)
//! 5. ~/.config/kgcheck/config.toml (user defaults)
//! 6. Built-in defaults (lowest precedence)

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use kgcheck::{BootstrapPolicy, RetryLimit, RetryPolicy, VerifyConfig};
use kgcheck_types::ConflictPolicy;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main kgcheck configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgcheckConfig {
    pub client: ClientConfig,
    pub run: RunConfig,
    pub retry: RetryConfig,
    pub bootstrap: BootstrapConfig,
    pub reconcile: ReconcileConfig,
    pub server: ServerConfig,
}

/// Who this client is and which store and record it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub id: String,
    pub node_id: String,
    /// Store address; unset means the in-memory store.
    pub host: Option<String>,
    pub collection: String,
    pub record: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            id: "client".to_string(),
            node_id: "node".to_string(),
            host: None,
            collection: kgcheck::DEFAULT_COLLECTION.to_string(),
            record: kgcheck::DEFAULT_RECORD.to_string(),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
            write_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub iterations: u64,
    pub update_percentage: u8,
    pub inter_op_delay_ms: u64,
    pub seed: Option<u64>,
    pub stop_on_violation: bool,
    /// Concurrent sessions started by one `run`.
    pub clients: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: kgcheck::DEFAULT_ITERATIONS,
            update_percentage: 10,
            inter_op_delay_ms: 1,
            seed: None,
            stop_on_violation: true,
            clients: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 1.0 keeps the delay fixed.
    pub multiplier: f64,
    /// 0 retries until success.
    pub max_attempts: u32,
    pub deadline_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 10,
            max_delay_ms: 1_000,
            multiplier: 1.0,
            max_attempts: 0,
            deadline_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub fail_on_unresolved: bool,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 10,
            fail_on_unresolved: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub max_attempts: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            max_attempts: kgcheck::DEFAULT_RECONCILE_ATTEMPTS,
        }
    }
}

/// Dev store server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub max_connections: usize,
    pub conflict_policy: ConflictPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7411".to_string(),
            max_connections: 256,
            conflict_policy: ConflictPolicy::Reject,
        }
    }
}

impl KgcheckConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Checks values the type system cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

        if self.client.id.is_empty() {
            return invalid("client.id must not be empty");
        }
        if self.client.node_id.is_empty() {
            return invalid("client.node_id must not be empty");
        }
        if self.run.update_percentage > 100 {
            return invalid("run.update_percentage must be between 0 and 100");
        }
        if self.run.clients == 0 {
            return invalid("run.clients must be at least 1");
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return invalid("retry.multiplier must be at least 1.0");
        }
        if self.retry.max_delay_ms < self.retry.initial_delay_ms {
            return invalid("retry.max_delay_ms must not be below retry.initial_delay_ms");
        }
        if self.reconcile.max_attempts == 0 {
            return invalid("reconcile.max_attempts must be at least 1");
        }
        Ok(())
    }

    /// Serializes the effective configuration.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.retry;
        let limit = match (retry.max_attempts, retry.deadline_ms) {
            (0, None) => RetryLimit::Unbounded,
            (0, Some(ms)) => RetryLimit::Deadline(Duration::from_millis(ms)),
            (n, _) => RetryLimit::Attempts(n),
        };

        RetryPolicy::fixed(Duration::from_millis(retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(retry.max_delay_ms))
            .with_multiplier(retry.multiplier)
            .with_limit(limit)
    }

    pub fn bootstrap_policy(&self) -> BootstrapPolicy {
        BootstrapPolicy {
            max_attempts: self.bootstrap.max_attempts,
            backoff: Duration::from_millis(self.bootstrap.backoff_ms),
            fail_on_unresolved: self.bootstrap.fail_on_unresolved,
        }
    }

    /// Builds the session configuration for the client with the given id.
    pub fn verify_config(&self, client_id: &str) -> VerifyConfig {
        let mut config = VerifyConfig::new(client_id, self.client.node_id.as_str())
            .with_collection(self.client.collection.as_str())
            .with_record(self.client.record.as_str())
            .with_iterations(self.run.iterations)
            .with_update_percentage(self.run.update_percentage)
            .with_inter_op_delay(Duration::from_millis(self.run.inter_op_delay_ms))
            .with_stop_on_violation(self.run.stop_on_violation)
            .with_retry(self.retry_policy())
            .with_bootstrap(self.bootstrap_policy())
            .with_reconcile_max_attempts(self.reconcile.max_attempts);

        if let Some(seed) = self.run.seed {
            config = config.with_seed(seed);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KgcheckConfig::default();
        assert_eq!(config.client.collection, "forumkeygroup");
        assert_eq!(config.client.record, "forumkey");
        assert_eq!(config.run.update_percentage, 10);
        assert_eq!(config.run.inter_op_delay_ms, 1);
        assert!(config.run.stop_on_violation);
        assert_eq!(config.bootstrap.max_attempts, 5);
        assert_eq!(config.server.conflict_policy, ConflictPolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_limits() {
        let mut config = KgcheckConfig::default();
        assert_eq!(config.retry_policy().limit, RetryLimit::Unbounded);

        config.retry.deadline_ms = Some(2_000);
        assert_eq!(
            config.retry_policy().limit,
            RetryLimit::Deadline(Duration::from_secs(2))
        );

        config.retry.max_attempts = 4;
        assert_eq!(config.retry_policy().limit, RetryLimit::Attempts(4));
    }

    #[test]
    fn test_verify_config_mapping() {
        let mut config = KgcheckConfig::default();
        config.client.node_id = "nodeA".to_string();
        config.run.seed = Some(3);
        config.run.iterations = 42;

        let verify = config.verify_config("c-2");
        assert_eq!(verify.client_id.as_str(), "c-2");
        assert_eq!(verify.node_id.as_str(), "nodeA");
        assert_eq!(verify.iterations, 42);
        assert_eq!(verify.seed, Some(3));
        assert_eq!(verify.inter_op_delay, Duration::from_millis(1));
        assert_eq!(verify.reconcile_max_attempts, 100);
    }

    #[test]
    fn test_validation() {
        let mut config = KgcheckConfig::default();
        config.retry.multiplier = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(msg)) if msg.contains("multiplier")
        ));

        let mut config = KgcheckConfig::default();
        config.run.clients = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = KgcheckConfig::default();
        config.client.host = Some("127.0.0.1:7411".to_string());
        config.server.conflict_policy = ConflictPolicy::KeepSiblings;

        let text = config.to_toml().unwrap();
        assert!(text.contains("conflict_policy = \"keep-siblings\""));

        let parsed: KgcheckConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
