//! Command schema: the wire contract between the translator and the validator.
//!
//! The translator is expected to answer with a single JSON object:
//!
//! ```json
//! {
//!   "action": "delete_file",
//!   "parameters": { "path": "D:\\Workspace\\test.txt" },
//!   "requires_confirmation": true
//! }
//! ```
//!
//! Decoding only checks the *shape* of that object. Whether the action
//! exists, or whether its parameters make sense, is the validator's job.

use serde_json::{Map, Value};
use thiserror::Error;

/// Passthrough action: the request was ambiguous, ask the user.
pub const CLARIFY: &str = "clarify";

/// Passthrough action: the translator refused the request itself.
pub const DENIED: &str = "denied";

/// Action parameters as sent by the translator.
pub type Parameters = Map<String, Value>;

/// A structured instruction decoded from translator output.
///
/// Built once per turn and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    action: String,
    parameters: Parameters,
    requires_confirmation: bool,
}

impl Command {
    pub fn new(action: impl Into<String>, parameters: Parameters, requires_confirmation: bool) -> Self {
        Self {
            action: action.into(),
            parameters,
            requires_confirmation,
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// The translator's own opinion on confirmation. Advisory only:
    /// it can add a prompt, never remove one.
    pub fn requires_confirmation(&self) -> bool {
        self.requires_confirmation
    }
}

/// Everything the translator may legitimately answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// An operational command, still to be validated.
    Command(Command),
    /// The request was ambiguous; `message` is the question to show.
    Clarify { message: String },
    /// The translator refused the request.
    Denied { reason: String },
}

/// Structurally malformed translator output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("translator returned an empty response")]
    Empty,

    #[error("translator output is not valid JSON: {0}")]
    Json(String),

    #[error("translator output is not a JSON object")]
    NotAnObject,

    #[error("missing 'action' field")]
    MissingAction,

    #[error("'action' must be a string")]
    ActionNotString,

    #[error("missing 'parameters' field")]
    MissingParameters,

    #[error("'parameters' must be a JSON object")]
    ParametersNotObject,

    #[error("'requires_confirmation' must be a boolean")]
    ConfirmationNotBoolean,
}

/// Decodes raw translator output into a [`Translation`].
///
/// Models sometimes wrap their JSON in a Markdown code fence even when
/// told not to; the fence is stripped before parsing. Unknown top-level
/// fields are ignored.
pub fn decode(raw: &str) -> Result<Translation, DecodeError> {
    let text = strip_code_fence(raw.trim());
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let action = match object.remove("action") {
        None | Some(Value::Null) => return Err(DecodeError::MissingAction),
        Some(Value::String(action)) => action,
        Some(_) => return Err(DecodeError::ActionNotString),
    };

    match action.as_str() {
        CLARIFY => {
            return Ok(Translation::Clarify {
                message: text_field(&object, "message"),
            })
        }
        DENIED => {
            return Ok(Translation::Denied {
                reason: text_field(&object, "reason"),
            })
        }
        _ => {}
    }

    let parameters = match object.remove("parameters") {
        None | Some(Value::Null) => return Err(DecodeError::MissingParameters),
        Some(Value::Object(parameters)) => parameters,
        Some(_) => return Err(DecodeError::ParametersNotObject),
    };

    let requires_confirmation = match object.get("requires_confirmation") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(DecodeError::ConfirmationNotBoolean),
    };

    Ok(Translation::Command(Command::new(
        action,
        parameters,
        requires_confirmation,
    )))
}

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // The opening line may carry a language tag
    let body = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
