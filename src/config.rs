//! Runtime configuration
//!
//! Layered, later layers win:
//!
//! ```text
//! defaults → makeitpass.toml (or --config) → environment → CLI flags
//! ```
//!
//! CLI flags are applied by the binary on top of the value returned by
//! [`Config::load`].

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::agent::{AgentConfig, DEFAULT_INSTRUCTIONS, DEFAULT_MODEL};
use crate::llm::DEFAULT_BASE_URL;
use crate::tools::workspace::DEFAULT_MAX_OUTPUT_BYTES;

/// Config file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "makeitpass.toml";

/// Full runtime configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Model identifier, e.g. "openai/gpt-4o"
    pub model: String,
    /// Output token limit per completion
    pub max_tokens: u32,
    /// Completion API root
    pub base_url: String,
    /// Bearer token for the completion API
    pub api_key: Option<String>,
    /// Instruction block appended to each prompt
    pub prompt: String,
    /// Fix attempts before giving up
    pub max_iterations: u32,
    /// Tool rounds per fix attempt (unbounded when unset)
    pub max_tool_rounds: Option<usize>,
    /// Cap on shell output returned to the model
    pub max_tool_output_bytes: usize,
    /// OTLP collector for trace export (disabled when unset)
    pub otlp_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            prompt: DEFAULT_INSTRUCTIONS.to_string(),
            max_iterations: 5,
            max_tool_rounds: None,
            max_tool_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            otlp_endpoint: None,
        }
    }
}

/// Error type for configuration loading
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidEnv {
        var: &'static str,
        value: String,
    },
    MissingApiKey,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Invalid config in {}: {}", path.display(), source)
            }
            ConfigError::InvalidEnv { var, value } => {
                write!(f, "Invalid value for {}: {:?}", var, value)
            }
            ConfigError::MissingApiKey => write!(
                f,
                "No API key configured. Set OPENROUTER_API_KEY or api_key in {}",
                CONFIG_FILE_NAME
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load defaults, then the config file, then the process environment
    ///
    /// # Arguments
    /// * `explicit` - Path given with `--config`; must exist when set
    /// * `workdir` - Directory searched for `makeitpass.toml` otherwise
    pub fn load(explicit: Option<&Path>, workdir: &Path) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(workdir.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml_str(&text, &path)?
            }
            None => Self::default(),
        };

        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Overlay environment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENROUTER_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = get("OPENROUTER_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = get("MAKEITPASS_MODEL") {
            self.model = model;
        }
        if let Some(prompt) = get("MAKEITPASS_PROMPT") {
            self.prompt = prompt;
        }
        if let Some(value) = get("MAKEITPASS_MAX_TOKENS") {
            self.max_tokens = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: "MAKEITPASS_MAX_TOKENS",
                value,
            })?;
        }
        Ok(())
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Settings for the fix loop
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            instructions: self.prompt.clone(),
            max_tool_rounds: self.max_tool_rounds,
        }
    }
}
