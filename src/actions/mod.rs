pub mod builtin;
pub mod registry;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::desktop::Desktop;
use crate::error::ErrorKind;
use crate::sandbox::{PathAuthority, PathDenial};

pub use builtin::AppAliases;
pub use registry::{ActionRegistry, RegistryError};

/// How much an action can change the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    Read,
    Mutate,
    /// Irreversible or hard to reverse; always confirmed.
    Destructive,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideEffect::Read => write!(f, "read"),
            SideEffect::Mutate => write!(f, "mutate"),
            SideEffect::Destructive => write!(f, "destructive"),
        }
    }
}

/// The type a parameter value must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Absolute filesystem path, checked by the path authority
    Path,
    String,
    OptionalString,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Path => write!(f, "a path string"),
            ParamKind::String => write!(f, "a string"),
            ParamKind::OptionalString => write!(f, "a string or nothing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

/// Catalogue entry for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    /// Identifier the translator must use (e.g. "delete_file").
    pub name: &'static str,
    /// One line shown to the translator and in `--actions`.
    pub description: &'static str,
    pub side_effect: SideEffect,
    pub parameters: &'static [ParamSpec],
}

impl ActionDescriptor {
    pub fn is_destructive(&self) -> bool {
        self.side_effect == SideEffect::Destructive
    }

    pub fn parameter(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// A path parameter after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub canonical: PathBuf,
    /// Whether something existed at `canonical` when it was validated.
    /// Lets handlers tell "never there" from "vanished since".
    pub existed: bool,
}

/// Validated arguments handed to a handler. Path parameters are
/// canonical; the raw strings the translator sent are not reachable.
#[derive(Debug, Clone, Default)]
pub struct ActionArgs {
    paths: BTreeMap<String, ResolvedPath>,
    strings: BTreeMap<String, String>,
}

impl ActionArgs {
    pub fn new(paths: BTreeMap<String, ResolvedPath>, strings: BTreeMap<String, String>) -> Self {
        Self { paths, strings }
    }

    pub fn path(&self, name: &str) -> Result<&Path, ActionError> {
        self.paths
            .get(name)
            .map(|p| p.canonical.as_path())
            .ok_or_else(|| ActionError::InvalidRequest(format!("missing path parameter '{name}'")))
    }

    /// Returns a path that must exist right now.
    ///
    /// If it existed at validation time and is gone, that is a race,
    /// not a bad request.
    pub fn existing_path(&self, name: &str) -> Result<&Path, ActionError> {
        let resolved = self
            .paths
            .get(name)
            .ok_or_else(|| ActionError::InvalidRequest(format!("missing path parameter '{name}'")))?;
        let path = resolved.canonical.as_path();
        if path.symlink_metadata().is_ok() {
            Ok(path)
        } else if resolved.existed {
            Err(ActionError::Race(format!(
                "{} disappeared after it was validated",
                path.display()
            )))
        } else {
            Err(ActionError::InvalidRequest(format!("{} not found", path.display())))
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, ActionError> {
        self.strings
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ActionError::InvalidRequest(format!("missing parameter '{name}'")))
    }

    pub fn optional(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    pub fn resolved_paths(&self) -> impl Iterator<Item = (&str, &ResolvedPath)> {
        self.paths.iter().map(|(name, path)| (name.as_str(), path))
    }
}

/// Shared services available to every handler.
///
/// Built once at startup; cloning is cheap.
#[derive(Clone)]
pub struct ActionContext {
    pub desktop: Arc<dyn Desktop>,
    pub authority: Arc<PathAuthority>,
    pub aliases: Arc<AppAliases>,
    /// Cap on `search_file` results
    pub search_limit: usize,
}

/// What a successful handler returns.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionOutput {
    pub message: String,
    pub data: Option<Value>,
}

impl ActionOutput {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Failures raised by handlers. Handlers never panic on OS errors;
/// every one of them ends up here.
#[derive(Debug, Error)]
pub enum ActionError {
    /// State changed between validation and execution.
    #[error("{0}")]
    Race(String),

    #[error("{context}: {source}")]
    Os {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The request is well-formed but cannot apply to the current state
    /// (e.g. opening a folder that is a file).
    #[error("{0}")]
    InvalidRequest(String),

    /// The operation would reach a protected location that was not one of
    /// the validated paths (inside a tree, or a derived placement target).
    #[error("{} is not permitted: {reason}", .path.display())]
    Protected { path: PathBuf, reason: PathDenial },
}

impl ActionError {
    /// Adapter for `map_err`: `fs::remove_file(p).await.map_err(ActionError::os("..."))`.
    pub fn os(context: impl Into<String>) -> impl FnOnce(io::Error) -> ActionError {
        let context = context.into();
        move |source| ActionError::Os { context, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ActionError::Race(_) => ErrorKind::ExecutionRace,
            ActionError::Os { .. } => ErrorKind::OperatingSystem,
            ActionError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            ActionError::Protected { .. } => ErrorKind::PathNotPermitted,
        }
    }
}

/// Implementation bound to one catalogue entry.
///
/// Handlers trust their arguments: the action exists, the parameters
/// have the declared kinds, every path is inside an allowed root and
/// the operator confirmed when required.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError>;
}

/// Outcome status of a turn that reached the confirmation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Cancelled,
}

/// Result payload reported to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl ExecutionResult {
    pub fn success(output: ActionOutput) -> Self {
        Self {
            status: Status::Success,
            message: output.message,
            data: output.data,
            error: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: Status::Failure,
            message: message.into(),
            data: None,
            error: Some(kind),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            status: Status::Cancelled,
            message: message.into(),
            data: None,
            error: Some(ErrorKind::ConfirmationDeclined),
        }
    }
}

impl From<&ActionError> for ExecutionResult {
    fn from(error: &ActionError) -> Self {
        Self::failure(error.kind(), error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args_with(path: PathBuf, existed: bool) -> ActionArgs {
        let mut paths = BTreeMap::new();
        paths.insert(
            "path".to_string(),
            ResolvedPath {
                canonical: path,
                existed,
            },
        );
        ActionArgs::new(paths, BTreeMap::new())
    }

    #[test]
    fn test_existing_path_present() {
        let dir = tempfile::tempdir().unwrap();
        let args = args_with(dir.path().to_path_buf(), true);
        assert_eq!(args.existing_path("path").unwrap(), dir.path());
    }

    #[test]
    fn test_existing_path_vanished_is_a_race() {
        let dir = tempfile::tempdir().unwrap();
        let args = args_with(dir.path().join("gone.txt"), true);
        let err = args.existing_path("path").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionRace);
    }

    #[test]
    fn test_existing_path_never_there_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let args = args_with(dir.path().join("never.txt"), false);
        let err = args.existing_path("path").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_descriptor_lookup() {
        const PARAMS: &[ParamSpec] = &[
            ParamSpec { name: "source", kind: ParamKind::Path },
            ParamSpec { name: "label", kind: ParamKind::String },
            ParamSpec { name: "destination", kind: ParamKind::Path },
        ];
        let descriptor = ActionDescriptor {
            name: "copy_labelled",
            description: "test",
            side_effect: SideEffect::Mutate,
            parameters: PARAMS,
        };
        assert!(!descriptor.is_destructive());
        assert_eq!(descriptor.parameter("label").unwrap().kind, ParamKind::String);
    }

    #[test]
    fn test_result_payload_shape() {
        let ok = ExecutionResult::success(ActionOutput::with_data("done", json!({"count": 2})));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"status": "success", "message": "done", "data": {"count": 2}})
        );

        let cancelled = ExecutionResult::cancelled("Cancelled by user");
        assert_eq!(
            serde_json::to_value(&cancelled).unwrap(),
            json!({"status": "cancelled", "message": "Cancelled by user", "error": "confirmation_declined"})
        );

        let race = ExecutionResult::from(&ActionError::Race("gone".into()));
        assert_eq!(race.status, Status::Failure);
        assert_eq!(race.error, Some(ErrorKind::ExecutionRace));
    }
}
