//! Configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::supervisor::SupervisorConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Persistent state directory
    pub storage: StorageConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Supervisor / worker pool tuning
    pub supervisor: SupervisorConfig,

    /// Sandbox and command policy
    pub security: SecurityConfig,

    /// Active profile name
    pub profile: ProfileConfig,
}

impl Config {
    /// Load configuration with fallback chain: explicit path ->
    /// `./.taskpilot.yml` -> `~/.config/taskpilot/taskpilot.yml` -> defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local = PathBuf::from(".taskpilot.yml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Failed to load config from {}: {}", local.display(), e),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user = config_dir.join("taskpilot").join("taskpilot.yml");
            if user.exists() {
                match Self::load_from_file(&user) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("Failed to load config from {}: {}", user.display(), e),
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Storage paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for persisted JSON state
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,

    /// Working directory for tools and IRIS (default: cwd)
    #[serde(rename = "working-dir")]
    pub working_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            working_dir: None,
        }
    }
}

impl StorageConfig {
    /// Path to a named state file under the data directory
    pub fn state_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    /// Resolved working directory
    pub fn resolve_working_dir(&self) -> PathBuf {
        self.working_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Force a default provider (otherwise env-based selection)
    pub provider: Option<String>,

    /// Model identifier for the OpenAI provider
    pub model: String,

    /// Environment variable carrying the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Master switch for sandbox + policy filtering
    pub enabled: bool,

    /// Substrings that permit otherwise-dangerous commands
    pub allowlist: Vec<String>,

    /// Patterns that always block
    pub denylist: Vec<String>,

    /// CPU-time limit for sandboxed commands, seconds
    #[serde(rename = "max-cpu-secs")]
    pub max_cpu_secs: u64,

    /// Address-space cap for sandboxed commands, MiB
    #[serde(rename = "max-memory-mb")]
    pub max_memory_mb: u64,

    /// Process-count cap for sandboxed commands
    #[serde(rename = "max-processes")]
    pub max_processes: u64,

    /// Open-fd cap for sandboxed commands
    #[serde(rename = "max-open-files")]
    pub max_open_files: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowlist: Vec::new(),
            denylist: Vec::new(),
            max_cpu_secs: 30,
            max_memory_mb: 1024,
            max_processes: 100,
            max_open_files: 1024,
        }
    }
}

/// Profile selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// Name of the profile to run with
    pub name: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: "balanced".to_string(),
        }
    }
}
