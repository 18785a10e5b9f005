//! Configuration loading, validation, and management for gemcode.
//!
//! Loads configuration from `~/.gemcode/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.gemcode/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gemini API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the API base URL (testing, proxies)
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model id
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for agent calls
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Model calls allowed per user turn before tools are switched off
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Turn count above which the history is summarized
    #[serde(default = "default_max_turns_in_context")]
    pub max_turns_in_context: usize,

    /// Thinking budget in tokens (0 disables thinking)
    #[serde(default = "default_thinking_budget")]
    pub thinking_budget: u32,

    /// Whether thought summaries are requested and rendered
    #[serde(default = "default_true")]
    pub include_thoughts: bool,

    /// Server-side context cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Where conversation records are kept (default `~/.gemcode/history`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_dir: Option<PathBuf>,

    /// Log file (default `~/.gemcode/gemcode.log`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Remote tool servers, keyed by id
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

fn default_api_url() -> String {
    "https://generativelanguage.googleapis.com".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_iterations() -> u32 {
    30
}
fn default_max_turns_in_context() -> usize {
    10
}
fn default_thinking_budget() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_iterations", &self.max_iterations)
            .field("max_turns_in_context", &self.max_turns_in_context)
            .field("thinking_budget", &self.thinking_budget)
            .field("include_thoughts", &self.include_thoughts)
            .field("cache", &self.cache)
            .field("tools", &self.tools)
            .field("history_dir", &self.history_dir)
            .field("log_file", &self.log_file)
            .field("mcp_servers", &self.mcp_servers)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Kill shell commands running longer than this
    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,

    /// Files listed in the system prompt's project index
    #[serde(default = "default_max_index_files")]
    pub max_index_files: usize,

    /// Extra file or directory names skipped when walking the project
    #[serde(default)]
    pub ignored: Vec<String>,
}

fn default_shell_timeout() -> u64 {
    120
}
fn default_max_index_files() -> usize {
    200
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: default_shell_timeout(),
            max_index_files: default_max_index_files(),
            ignored: vec![],
        }
    }
}

/// A stdio tool server started as a child process.
#[derive(Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Program and arguments
    pub command: Vec<String>,

    /// Extra environment for the child (tokens live here)
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl std::fmt::Debug for McpServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&String> = self.env.keys().collect();
        f.debug_struct("McpServerConfig")
            .field("command", &self.command)
            .field("env", &env_keys)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.gemcode/config.toml).
    ///
    /// Also checks environment variables:
    /// - `GEMCODE_API_KEY` (highest priority), then `GEMINI_API_KEY`
    /// - `GEMCODE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(key) = std::env::var("GEMCODE_API_KEY")
            .ok()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        {
            self.api_key = Some(key);
        }

        if let Ok(model) = std::env::var("GEMCODE_MODEL") {
            self.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".gemcode")
    }

    /// Directory holding persisted conversations.
    pub fn history_dir(&self) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("history"))
    }

    /// Log file path.
    pub fn log_file(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("gemcode.log"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be at least 1".into(),
            ));
        }

        if self.max_turns_in_context < 2 {
            return Err(ConfigError::ValidationError(
                "max_turns_in_context must be at least 2".into(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.ttl_secs must be > 0".into(),
            ));
        }

        if let Some((id, _)) = self.mcp_servers.iter().find(|(_, s)| s.command.is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "mcp_servers.{id}.command must not be empty"
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_iterations: default_max_iterations(),
            max_turns_in_context: default_max_turns_in_context(),
            thinking_budget: default_thinking_budget(),
            include_thoughts: true,
            cache: CacheConfig::default(),
            tools: ToolsConfig::default(),
            history_dir: None,
            log_file: None,
            mcp_servers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
