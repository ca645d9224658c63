pub mod anthropic;
pub mod client;
pub mod ollama;
pub mod translator;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use ollama::OllamaClient;
pub use translator::{LlmTranslator, Translator};

/// A single conversation message.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// LLM response with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Builds the client for the configured provider.
pub fn create_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "anthropic" => Ok(Box::new(AnthropicClient::new(config.clone())?)),
        "ollama" => Ok(Box::new(OllamaClient::new(config.clone())?)),
        other => anyhow::bail!("Unsupported LLM provider '{other}'"),
    }
}
