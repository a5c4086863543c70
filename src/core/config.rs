//! Configuration management for qa-pilot
//!
//! Layering: built-in defaults, then `config.toml`, then environment, then CLI flags.
//!
//! Config file location: ~/.config/qa-pilot/config.toml

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{PilotError, Result};

/// Main configuration for qa-pilot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Decision oracle configuration
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Chromium launch settings
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Run record and artifact storage
    #[serde(default)]
    pub storage: StorageConfig,
    /// Pre-run host cleanup
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Which text-generation backend answers oracle prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Local Ollama server
    Ollama,
    /// Google Generative Language API
    Gemini,
}

/// Decision oracle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Backend provider
    pub provider: ProviderType,
    /// Ollama host address (default: localhost)
    pub host: String,
    /// Ollama port number (default: 11434)
    pub port: u16,
    /// Model asked for decisions
    pub model: String,
    /// API key for hosted providers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per decision before falling back to wait
    pub max_attempts: u32,
    /// Fixed delay between attempts in ms
    pub retry_delay_ms: u64,
}

/// How the per-run Chromium is launched
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Explicit Chrome/Chromium binary, otherwise auto-detected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<PathBuf>,
    /// Viewport width
    pub window_width: u32,
    /// Viewport height
    pub window_height: u32,
    /// Deadline for the initial navigation in ms
    pub navigation_timeout_ms: u64,
    /// Deadline for a single interaction attempt in ms
    pub action_timeout_ms: u64,
    /// Prefix of the per-run temporary profile directory
    pub profile_prefix: String,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Maximum loop iterations before the run fails
    /// Default: 20
    pub max_steps: usize,
    /// Number of recent history entries shown to the oracle
    /// Default: 5
    pub history_window: usize,
    /// Pause after every executed step in ms
    pub settle_delay_ms: u64,
    /// Pause taken on a wait decision in ms
    pub wait_delay_ms: u64,
    /// Visible text cap per snapshot line
    pub text_cap: usize,
    /// Whether to emit debug logging
    pub debug: bool,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON record per run
    pub runs_dir: PathBuf,
    /// Directory holding screenshots
    pub artifacts_dir: PathBuf,
    /// Lifetime of a screenshot reference in seconds
    pub link_ttl_secs: u64,
}

/// Host cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Command-line fragments identifying orphaned browser processes
    pub process_markers: Vec<String>,
    /// Temp directory entry prefixes purged before each run
    pub temp_prefixes: Vec<String>,
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().map(|v| v == "true" || v == "1")
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for OracleConfig {
    fn default() -> Self {
        let provider = match env::var("QA_PILOT_PROVIDER").as_deref() {
            Ok("gemini") => ProviderType::Gemini,
            _ => ProviderType::Ollama,
        };
        let model = env::var("QA_PILOT_MODEL").unwrap_or_else(|_| match provider {
            ProviderType::Ollama => "qwen3:8b".to_string(),
            ProviderType::Gemini => "gemini-2.0-flash".to_string(),
        });

        Self {
            provider,
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env_parse("OLLAMA_PORT").unwrap_or(11434),
            model,
            api_key: env::var("GEMINI_API_KEY").ok(),
            temperature: 0.1,
            timeout_secs: 60,
            max_attempts: 3,
            retry_delay_ms: 2000,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: !env_flag("QA_PILOT_HEADED").unwrap_or(false),
            executable_path: env::var("QA_PILOT_CHROME").ok().map(PathBuf::from),
            window_width: 1280,
            window_height: 900,
            navigation_timeout_ms: 30000,
            action_timeout_ms: 5000,
            profile_prefix: "qa-pilot-profile-".to_string(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: env_parse("QA_PILOT_MAX_STEPS").unwrap_or(20),
            history_window: 5,
            settle_delay_ms: 2000,
            wait_delay_ms: 3000,
            text_cap: 50,
            debug: env_flag("QA_PILOT_DEBUG").unwrap_or(false),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qa-pilot");

        Self {
            runs_dir: base.join("runs"),
            artifacts_dir: base.join("screenshots"),
            link_ttl_secs: 3600,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            process_markers: vec!["qa-pilot-profile-".to_string()],
            temp_prefixes: vec!["qa-pilot-profile-".to_string()],
        }
    }
}

impl Config {
    /// `~/.config/qa-pilot` or the platform equivalent
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qa-pilot")
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Defaults, overlaid with the user config file and then the environment
    /// Priority: CLI args > config file > env vars > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file(&Self::config_file()) {
            return config;
        }

        Self::default()
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PilotError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| PilotError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; missing sections fall back to defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PilotError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            return Err(PilotError::config("agent.max_steps must be at least 1"));
        }
        if self.oracle.max_attempts == 0 {
            return Err(PilotError::config("oracle.max_attempts must be at least 1"));
        }
        if self.oracle.provider == ProviderType::Gemini && self.oracle.api_key.is_none() {
            return Err(PilotError::config(
                "oracle.api_key (or GEMINI_API_KEY) is required for the gemini provider",
            ));
        }
        Ok(())
    }

    /// Write this configuration to the user config file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .map_err(|e| PilotError::config(format!("Failed to create config dir: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| PilotError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| PilotError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Ollama base URL built from host and port
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.oracle.host, self.oracle.port)
    }
}

impl OracleConfig {
    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay between decision attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

impl AgentConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn wait_delay(&self) -> Duration {
        Duration::from_millis(self.wait_delay_ms)
    }
}
