// src/config/config.rs
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the mining engine
///
/// Contains the settings that tune networking and retry behavior.
/// Parallelism (cores, threads) is not configuration; it arrives with the
/// credentials at session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Base URL of the job server
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Timeout applied to every HTTP request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Consecutive transient failures tolerated before the session fails
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// First retry delay, in milliseconds (doubles per attempt)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Ceiling on any retry or rate-limit delay, in seconds
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// How often the aggregate hashrate is reported to the server and
    /// logged locally, in seconds
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Rig identifier sent along with submissions
    #[serde(default = "default_rig_name")]
    pub rig_name: String,
}

fn default_server_url() -> String {
    "https://server.duinocoin.com".into()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_retry_budget() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_secs() -> u64 {
    30
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_rig_name() -> String {
    "Duco Miner (Rust)".into()
}

impl Default for MinerConfig {
    fn default() -> Self {
        MinerConfig {
            server_url: default_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_budget: default_retry_budget(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_secs: default_backoff_cap_secs(),
            report_interval_secs: default_report_interval_secs(),
            rig_name: default_rig_name(),
        }
    }
}

impl MinerConfig {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(MinerConfig)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If the file couldn't be read, parsed or validated
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::Config(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: MinerConfig = toml::from_str(&config_str)
            .map_err(|e| MinerError::Config(format!("Invalid config format: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.retry_budget == 0 {
            return Err(MinerError::Config("retry_budget must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(MinerError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Per-request HTTP timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// First retry delay of the backoff schedule
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Ceiling on retry and rate-limit delays
    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs)
    }

    /// Cadence of hashrate reporting
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Duco Miner Configuration\n\n");
        template.push_str("# Base URL of the job server\n");
        template.push_str("server_url = \"https://server.duinocoin.com\"\n");
        template.push_str("# Timeout for each HTTP request, in seconds\n");
        template.push_str("request_timeout_secs = 15\n");
        template.push_str("# Transient failures tolerated before the session fails\n");
        template.push_str("retry_budget = 5\n");
        template.push_str("# First retry delay in milliseconds; doubles per attempt\n");
        template.push_str("backoff_base_ms = 500\n");
        template.push_str("# Ceiling on any retry delay, in seconds\n");
        template.push_str("backoff_cap_secs = 30\n");
        template.push_str("# Hashrate reporting cadence, in seconds\n");
        template.push_str("report_interval_secs = 10\n");
        template.push_str("# Rig identifier sent with submissions\n");
        template.push_str("rig_name = \"Duco Miner (Rust)\"\n");
        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MinerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_budget, 5);
        assert_eq!(config.backoff_cap(), Duration::from_secs(30));
    }

    #[test]
    fn omitted_keys_fall_back_to_defaults() {
        let config: MinerConfig =
            toml::from_str("server_url = \"http://localhost:8080\"").unwrap();
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.request_timeout_secs, 15);
        assert_eq!(config.rig_name, "Duco Miner (Rust)");
    }

    #[test]
    fn template_parses_back() {
        let config: MinerConfig = toml::from_str(&MinerConfig::generate_template()).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_retry_budget_is_rejected() {
        let config: MinerConfig = toml::from_str("retry_budget = 0").unwrap();
        assert!(matches!(config.validate(), Err(MinerError::Config(_))));
    }
}
