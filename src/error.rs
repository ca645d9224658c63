//! Error taxonomy for a single turn.
//!
//! Every variant is terminal for the turn it occurs in: a rejected
//! command is reported, never retried.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::actions::{ActionError, ParamKind};
use crate::command::DecodeError;
use crate::sandbox::PathDenial;

/// Machine-readable failure class, carried in result payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Translation,
    Decode,
    UnknownAction,
    InvalidParameter,
    PathNotPermitted,
    ConfirmationDeclined,
    ExecutionRace,
    OperatingSystem,
    InvalidRequest,
}

/// What is wrong with a single parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterProblem {
    Missing,
    Empty,
    WrongKind(ParamKind),
    Unexpected,
}

impl fmt::Display for ParameterProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterProblem::Missing => write!(f, "required but missing"),
            ParameterProblem::Empty => write!(f, "must not be empty"),
            ParameterProblem::WrongKind(kind) => write!(f, "expected {kind}"),
            ParameterProblem::Unexpected => write!(f, "not accepted by this action"),
        }
    }
}

/// Domain rejection of a well-formed command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("action '{0}' is not permitted")]
    UnknownAction(String),

    #[error("parameter '{parameter}' of '{action}' is invalid: {problem}")]
    InvalidParameter {
        action: String,
        parameter: String,
        problem: ParameterProblem,
    },

    #[error("access denied for '{path}' ({parameter}): {denial}")]
    PathNotPermitted {
        parameter: String,
        path: String,
        canonical: PathBuf,
        denial: PathDenial,
    },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ValidationError::UnknownAction(_) => ErrorKind::UnknownAction,
            ValidationError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            ValidationError::PathNotPermitted { .. } => ErrorKind::PathNotPermitted,
        }
    }
}

/// Pipeline stages a turn can fail in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Translation,
    Validation,
    Confirmation,
    Execution,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Translation => write!(f, "translation"),
            Stage::Validation => write!(f, "validation"),
            Stage::Confirmation => write!(f, "confirmation"),
            Stage::Execution => write!(f, "execution"),
        }
    }
}

/// Any failure that ends a turn early.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("translator unavailable: {0}")]
    Translation(String),

    #[error("translator did not answer within {}s", .0.as_secs())]
    TranslationTimeout(Duration),

    #[error("malformed translator output: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("'{action}' was not confirmed")]
    ConfirmationDeclined { action: String },

    #[error(transparent)]
    Action(#[from] ActionError),
}

impl PipelineError {
    /// The stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Translation(_)
            | PipelineError::TranslationTimeout(_)
            | PipelineError::Decode(_) => Stage::Translation,
            PipelineError::Validation(_) => Stage::Validation,
            PipelineError::ConfirmationDeclined { .. } => Stage::Confirmation,
            PipelineError::Action(_) => Stage::Execution,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Translation(_) | PipelineError::TranslationTimeout(_) => {
                ErrorKind::Translation
            }
            PipelineError::Decode(_) => ErrorKind::Decode,
            PipelineError::Validation(e) => e.kind(),
            PipelineError::ConfirmationDeclined { .. } => ErrorKind::ConfirmationDeclined,
            PipelineError::Action(e) => e.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_of_each_error() {
        assert_eq!(
            PipelineError::from(DecodeError::MissingAction).stage(),
            Stage::Translation
        );
        assert_eq!(
            PipelineError::TranslationTimeout(Duration::from_secs(5)).stage(),
            Stage::Translation
        );
        assert_eq!(
            PipelineError::from(ValidationError::UnknownAction("x".into())).stage(),
            Stage::Validation
        );
        assert_eq!(
            PipelineError::ConfirmationDeclined { action: "delete_file".into() }.stage(),
            Stage::Confirmation
        );
        assert_eq!(
            PipelineError::from(ActionError::Race("gone".into())).stage(),
            Stage::Execution
        );
    }

    #[test]
    fn test_kinds_are_specific() {
        assert_eq!(
            PipelineError::from(ActionError::Race("gone".into())).kind(),
            ErrorKind::ExecutionRace
        );
        assert_eq!(
            PipelineError::from(ValidationError::PathNotPermitted {
                parameter: "path".into(),
                path: "/etc".into(),
                canonical: PathBuf::from("/etc"),
                denial: PathDenial::DenyListed(PathBuf::from("/etc")),
            })
            .kind(),
            ErrorKind::PathNotPermitted
        );
    }

    #[test]
    fn test_messages() {
        let err = ValidationError::InvalidParameter {
            action: "open_file".into(),
            parameter: "path".into(),
            problem: ParameterProblem::WrongKind(ParamKind::Path),
        };
        assert_eq!(
            err.to_string(),
            "parameter 'path' of 'open_file' is invalid: expected a path string"
        );
        assert_eq!(
            PipelineError::TranslationTimeout(Duration::from_secs(30)).to_string(),
            "translator did not answer within 30s"
        );
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::ExecutionRace).unwrap(),
            "\"execution_race\""
        );
    }
}
