use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Providers the translator can be backed by.
pub const SUPPORTED_PROVIDERS: &[&str] = &["anthropic", "ollama"];

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub applications: ApplicationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    /// Supports ${ENV_VAR} substitution. Unused by Ollama.
    #[serde(default)]
    pub api_key: String,
    /// Ollama base URL, defaults to http://localhost:11434
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: u32,
    /// Upper bound on a single translation call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Directories under which actions are permitted
    pub allowed_roots: Vec<PathBuf>,
    /// Extra protected locations, added to the platform defaults
    #[serde(default)]
    pub denied_paths: Vec<PathBuf>,
    /// Maximum number of matches returned by `search_file`
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ApplicationsConfig {
    /// Friendly name → program, merged over the builtin aliases
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

/// Startup configuration problems. All of them are fatal: the assistant
/// never starts in a degraded, unrestricted mode.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sandbox.allowed_roots is empty; at least one allowed directory is required")]
    EmptyAllowList,

    #[error("allowed root {path} is unusable: {reason}")]
    AllowedRoot { path: PathBuf, reason: String },

    #[error("denied path {0} must be absolute")]
    RelativeDenyEntry(PathBuf),

    #[error("unsupported LLM provider '{0}' (expected one of: anthropic, ollama)")]
    UnknownProvider(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_search_limit() -> usize {
    200
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and checks a configuration document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${ANTHROPIC_API_KEY}
        let escaped = escape_bare_dollars(content);
        let expanded = shellexpand::env(&escaped)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that need no filesystem access. Root existence
    /// is checked when the path authority is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sandbox.allowed_roots.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }
        if !SUPPORTED_PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::UnknownProvider(self.llm.provider.clone()));
        }
        if self.sandbox.search_limit == 0 {
            return Err(ConfigError::Zero("sandbox.search_limit"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::Zero("llm.timeout_secs"));
        }
        Ok(())
    }
}

/// Only `${VAR}` is substituted. A `$` not followed by `{` is literal,
/// so paths like `D:\\$Recycle.Bin` survive expansion unchanged.
fn escape_bare_dollars(content: &str) -> String {
    let mut escaped = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        escaped.push(c);
        if c == '$' && chars.peek() != Some(&'{') {
            escaped.push('$');
        }
    }
    escaped
}
