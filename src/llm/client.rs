//! `LlmClient` trait: abstraction over LLM backends.
//!
//! Providers (Anthropic, Ollama) implement this trait so the translator
//! can be configured to use any supported backend via the `[llm]
//! provider` config field.

use anyhow::Result;
use async_trait::async_trait;

use super::{LlmResponse, Message};

/// Each provider translates the shared message type into its own wire
/// format and normalizes responses back into [`LlmResponse`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends a conversation to the LLM and returns the response.
    ///
    /// Providers ask for deterministic output (temperature 0) and, where
    /// the API supports it, a JSON-only answer.
    async fn complete(&self, system_prompt: &str, messages: &[Message]) -> Result<LlmResponse>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in the banner, e.g. `"anthropic (claude-sonnet-4-5-20250929)"`.
    fn description(&self) -> String;
}
