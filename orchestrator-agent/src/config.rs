use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub dispatch: DispatchConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Connection string for the task store. Empty defaults to a SQLite
    /// file under `$XDG_DATA_HOME/orchestrator` (or `$HOME`).
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DispatchConfig {
    /// How often the dispatcher scans for idle agents and claimable tasks.
    pub poll_interval_ms: u64,
    /// `T_offline`: an agent with no heartbeat in this long is marked offline.
    pub offline_threshold_secs: u64,
    /// `T_reclaim`: an `Assigned`/`InProgress` task whose agent has been
    /// offline this long is reclaimed back to `Pending`.
    pub reclaim_threshold_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkflowConfig {
    pub max_workflow_iterations: u32,
    pub max_retry_default: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Config {
    /// Loads configuration from the bundled defaults, an optional
    /// `CONFIG_FILE`-named override, and `ORCHESTRATOR_`-prefixed env vars.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        builder = builder.add_source(File::from_str(include_str!("../config/default.toml"), FileFormat::Toml));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false).format(FileFormat::Toml));
        }

        builder = builder.add_source(Environment::with_prefix("ORCHESTRATOR").separator("_").try_parsing(true));

        let config = builder.build().context("failed to build configuration")?;

        let mut result: Config = config.try_deserialize().context("failed to deserialize configuration")?;
        Self::apply_standard_env_vars(&mut result);

        Ok(result)
    }

    /// Loads configuration from a specific file path, bypassing the bundled
    /// defaults entirely (still honors env var overrides).
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(Environment::with_prefix("ORCHESTRATOR").separator("_").try_parsing(true));

        let config = builder.build().context("failed to build configuration from file")?;
        config.try_deserialize().context("failed to deserialize configuration from file")
    }

    /// Applies standard, unprefixed environment variables for compatibility
    /// with common deployment conventions.
    fn apply_standard_env_vars(config: &mut Config) {
        if let Ok(storage_url) = env::var("STORAGE_URL") {
            config.storage.url = storage_url;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.logging.level = log_level;
        }
    }

    /// The storage connection string, falling back to a default SQLite path
    /// when none is configured.
    pub fn storage_url(&self) -> String {
        if self.storage.url.is_empty() {
            Self::default_storage_url()
        } else {
            self.storage.url.clone()
        }
    }

    pub fn default_storage_url() -> String {
        if let Ok(xdg_data) = env::var("XDG_DATA_HOME") {
            return format!("sqlite://{xdg_data}/orchestrator/orchestrator.sqlite");
        }

        let home = env::var("HOME").or_else(|_| env::var("USERPROFILE")).unwrap_or_else(|_| ".".to_string());
        format!("sqlite://{home}/orchestrator.sqlite")
    }

    pub fn offline_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch.offline_threshold_secs)
    }

    pub fn reclaim_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.dispatch.reclaim_threshold_secs)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.dispatch.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "invalid log level: {}. must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ));
            }
        }

        let storage_url = self.storage_url();
        if !storage_url.starts_with("sqlite://") && !storage_url.starts_with(":memory:") {
            return Err(anyhow::anyhow!(
                "only sqlite storage is supported; url must start with 'sqlite://'. got: {storage_url}"
            ));
        }

        if self.storage.max_connections == 0 {
            return Err(anyhow::anyhow!("storage max_connections must be greater than 0"));
        }

        if self.dispatch.offline_threshold_secs == 0 {
            return Err(anyhow::anyhow!("dispatch.offline_threshold_secs must be greater than 0"));
        }

        if self.dispatch.reclaim_threshold_secs < self.dispatch.offline_threshold_secs {
            return Err(anyhow::anyhow!(
                "dispatch.reclaim_threshold_secs must be at least offline_threshold_secs"
            ));
        }

        if self.workflow.max_workflow_iterations == 0 {
            return Err(anyhow::anyhow!("workflow.max_workflow_iterations must be greater than 0"));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig { url: String::new(), max_connections: 5, connection_timeout: 30 },
            dispatch: DispatchConfig { poll_interval_ms: 500, offline_threshold_secs: 30, reclaim_threshold_secs: 150 },
            workflow: WorkflowConfig { max_workflow_iterations: 1000, max_retry_default: 3 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_bundled_toml() {
        let config = Config::default();
        assert_eq!(config.dispatch.offline_threshold_secs, 30);
        assert_eq!(config.dispatch.reclaim_threshold_secs, 150);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn storage_url_falls_back_to_default() {
        let config = Config::default();
        let url = config.storage_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("orchestrator"));
    }

    #[test]
    fn storage_url_honors_explicit_value() {
        let mut config = Config::default();
        config.storage.url = "sqlite://custom.db".to_string();
        assert_eq!(config.storage_url(), "sqlite://custom.db");
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_reclaim_shorter_than_offline() {
        let mut config = Config::default();
        config.dispatch.reclaim_threshold_secs = 10;
        config.dispatch.offline_threshold_secs = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn from_env_loads_bundled_defaults() {
        let config = Config::from_env().expect("bundled default.toml must parse");
        assert_eq!(config.dispatch.offline_threshold_secs, 30);
        assert!(config.validate().is_ok());
    }
}
