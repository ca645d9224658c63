//! Natural language → raw command JSON.
//!
//! The translator is untrusted: whatever it returns is decoded and
//! validated like any other input. The system prompt only makes a
//! well-formed answer likely, it guarantees nothing.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::client::LlmClient;
use super::Message;
use crate::actions::ActionRegistry;

#[async_trait]
pub trait Translator: Send + Sync {
    /// Returns the raw payload for one utterance. No history is kept
    /// between calls.
    async fn translate(&self, utterance: &str) -> Result<String>;

    fn description(&self) -> String;
}

/// Translator backed by an [`LlmClient`].
pub struct LlmTranslator {
    client: Box<dyn LlmClient>,
    system_prompt: String,
}

impl LlmTranslator {
    pub fn new(client: Box<dyn LlmClient>, registry: &ActionRegistry, allowed_roots: &[PathBuf]) -> Self {
        Self {
            client,
            system_prompt: system_prompt(registry, allowed_roots),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, utterance: &str) -> Result<String> {
        let response = self
            .client
            .complete(&self.system_prompt, &[Message::user(utterance)])
            .await?;
        debug!(
            "Translator payload ({} in / {} out tokens): {}",
            response.input_tokens, response.output_tokens, response.text
        );
        Ok(response.text.trim().to_string())
    }

    fn description(&self) -> String {
        self.client.description()
    }
}

/// Builds the system instruction from the live catalogue and roots, so
/// the prompt can never advertise an action the registry does not have.
pub fn system_prompt(registry: &ActionRegistry, allowed_roots: &[PathBuf]) -> String {
    let roots = allowed_roots
        .iter()
        .map(|root| format!("- {}", root.display()))
        .collect::<Vec<_>>()
        .join("\n");
    let destructive = registry
        .descriptors()
        .filter(|d| d.is_destructive())
        .map(|d| d.name)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are a local desktop assistant running on {os}.

You translate natural language instructions into structured JSON commands that are checked and executed by a separate, strict backend.

You do NOT execute commands.
You do NOT explain anything.
You ONLY output a single valid JSON object.

ALLOWED ROOT DIRECTORIES
You may ONLY refer to paths inside:
{roots}

Always use full absolute paths. Never use a path outside these directories, and never refer to system directories, hidden configuration folders or the registry.

ALLOWED ACTIONS
{catalogue}

No other actions exist.

SECURITY RULES
- Destructive actions ({destructive}) must set "requires_confirmation": true.
- If the instruction is unclear, return:
  {{"action": "clarify", "message": "<one specific question>"}}
- If the request is outside the permitted scope, return:
  {{"action": "denied", "reason": "<short reason>"}}

OUTPUT FORMAT
{{
  "action": "<action_name>",
  "parameters": {{"<parameter>": "<value>"}},
  "requires_confirmation": false
}}

Use exactly the parameter names listed for the action. No markdown, no commentary, no extra keys."#,
        os = std::env::consts::OS,
        catalogue = registry.catalogue_text(),
    )
}
