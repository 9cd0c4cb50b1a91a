//! Supervisor configuration

use serde::{Deserialize, Serialize};

/// Supervisor tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Size of the worker pool
    #[serde(rename = "max-workers")]
    pub max_workers: usize,

    /// Join timeout when shutting down, in seconds
    #[serde(rename = "shutdown-timeout-secs")]
    pub shutdown_timeout_secs: u64,

    /// Wall-clock budget for `run_all_pending`, in seconds
    #[serde(rename = "run-all-timeout-secs")]
    pub run_all_timeout_secs: u64,

    /// Capability required of a node before delegating
    #[serde(rename = "delegation-capability")]
    pub delegation_capability: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            shutdown_timeout_secs: 5,
            run_all_timeout_secs: 300,
            delegation_capability: "general".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.shutdown_timeout_secs, 5);
        assert_eq!(config.run_all_timeout_secs, 300);
        assert_eq!(config.delegation_capability, "general");
    }

    #[test]
    fn test_yaml_overrides() {
        let config: SupervisorConfig = serde_yaml::from_str("max-workers: 8\n").unwrap();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.run_all_timeout_secs, 300);
    }
}
