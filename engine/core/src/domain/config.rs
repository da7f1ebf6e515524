// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Solver Configuration Types
//
// Defines the configuration schema for a DPOP solve:
// - Optimization direction and wall-clock timeout
// - Leader-election round budget
// - Conditional-optimum table storage (in memory or on disk)
// - Message statistics and tracing switches

use crate::domain::addable::Direction;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration of one solve, shared by every agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Minimize costs or maximize utilities
    #[serde(default)]
    pub direction: Direction,

    /// Wall-clock budget for the whole solve (e.g. "30s", "2m")
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,

    /// Flooding rounds of the leader election. Must be at least the diameter
    /// of every connected component; defaults to the number of variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub election_rounds: Option<u32>,

    /// Where UTIL keeps its tables until VALUE consumes them
    #[serde(default)]
    pub opt_table_store: OptTableStoreConfig,

    /// Count messages and bytes per type and per agent pair
    #[serde(default = "default_true")]
    pub collect_stats: bool,

    /// Log every outgoing message at trace level
    #[serde(default)]
    pub trace_messages: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OptTableStoreConfig {
    #[default]
    InMemory,
    OnDisk {
        /// Root directory; each agent writes below `<directory>/<agent>`
        directory: PathBuf,
    },
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            direction: Direction::default(),
            timeout: default_timeout(),
            election_rounds: None,
            opt_table_store: OptTableStoreConfig::default(),
            collect_stats: true,
            trace_messages: false,
        }
    }
}

impl SolverConfig {
    /// Election rounds for a problem with `total_variables` variables.
    pub fn election_rounds_for(&self, total_variables: usize) -> u32 {
        self.election_rounds
            .unwrap_or_else(|| u32::try_from(total_variables).unwrap_or(u32::MAX))
    }

    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. DCOP_CONFIG_PATH environment variable
    /// 2. ./dcop-config.yaml (working directory)
    /// 3. ~/.dcop/config.yaml (user home)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("DCOP_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./dcop-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".dcop").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("DCOP_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: DCOP_TIMEOUT_MS={}", ms);
                    self.timeout = Duration::from_millis(ms);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for DCOP_TIMEOUT_MS: '{}'. Expected milliseconds. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("DCOP_TRACE_MESSAGES") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: DCOP_TRACE_MESSAGES=true");
                    self.trace_messages = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: DCOP_TRACE_MESSAGES=false");
                    self.trace_messages = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for DCOP_TRACE_MESSAGES: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout.is_zero() {
            anyhow::bail!("timeout must be greater than zero");
        }

        if self.election_rounds == Some(0) {
            anyhow::bail!("election_rounds must be at least 1 when set");
        }

        if let OptTableStoreConfig::OnDisk { directory } = &self.opt_table_store {
            if directory.as_os_str().is_empty() {
                anyhow::bail!("opt_table_store.directory cannot be empty");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SolverConfig::default();
        assert_eq!(config.direction, Direction::Minimize);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.opt_table_store, OptTableStoreConfig::InMemory);
        assert!(config.collect_stats);
        assert!(config.validate().is_ok());
        assert_eq!(config.election_rounds_for(7), 7);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
direction: maximize
timeout: 2m 30s
election_rounds: 12
opt_table_store:
  type: on_disk
  directory: /tmp/dcop-tables
trace_messages: true
"#;
        let config = SolverConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.direction, Direction::Maximize);
        assert_eq!(config.timeout, Duration::from_secs(150));
        assert_eq!(config.election_rounds_for(3), 12);
        assert_eq!(
            config.opt_table_store,
            OptTableStoreConfig::OnDisk {
                directory: PathBuf::from("/tmp/dcop-tables")
            }
        );
        assert!(config.collect_stats);
        assert!(config.trace_messages);
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcop-config.yaml");
        let config = SolverConfig {
            election_rounds: Some(4),
            ..SolverConfig::default()
        };
        config.to_yaml_file(&path).unwrap();
        assert_eq!(SolverConfig::from_yaml_file(&path).unwrap(), config);
    }

    #[test]
    fn test_validation() {
        let mut config = SolverConfig::default();

        config.timeout = Duration::ZERO;
        assert!(config.validate().is_err());
        config.timeout = Duration::from_secs(1);

        config.election_rounds = Some(0);
        assert!(config.validate().is_err());
        config.election_rounds = None;

        config.opt_table_store = OptTableStoreConfig::OnDisk {
            directory: PathBuf::new(),
        };
        assert!(config.validate().is_err());
    }
}
