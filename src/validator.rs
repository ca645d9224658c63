//! Turns a decoded [`Command`] into an [`Accepted`] one, or rejects it.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. the action is in the registry
//! 2. declared parameters are present with the right kind, and nothing
//!    undeclared is present
//! 3. every path parameter passes the path authority, in declaration order
//!
//! Confirmation is then derived: destructive actions always require it,
//! and the translator may ask for it on top. It can never waive it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::actions::{
    ActionArgs, ActionDescriptor, ActionRegistry, ParamKind, ParamSpec, ResolvedPath,
};
use crate::command::Command;
use crate::error::{ParameterProblem, ValidationError};
use crate::sandbox::{PathAuthority, PathDenial};

/// A command that passed validation.
///
/// Only [`Validator::validate`] can build one, so holding an `Accepted`
/// proves the checks ran. Path parameters are carried in canonical form.
#[derive(Debug)]
pub struct Accepted {
    descriptor: &'static ActionDescriptor,
    args: ActionArgs,
    requires_confirmation: bool,
}

impl Accepted {
    pub fn descriptor(&self) -> &'static ActionDescriptor {
        self.descriptor
    }

    pub fn action(&self) -> &'static str {
        self.descriptor.name
    }

    /// Arguments as the handler will see them.
    pub fn args(&self) -> &ActionArgs {
        &self.args
    }

    /// Effective confirmation requirement.
    pub fn requires_confirmation(&self) -> bool {
        self.requires_confirmation
    }
}

pub struct Validator {
    registry: Arc<ActionRegistry>,
    authority: Arc<PathAuthority>,
}

impl Validator {
    pub fn new(registry: Arc<ActionRegistry>, authority: Arc<PathAuthority>) -> Self {
        Self {
            registry,
            authority,
        }
    }

    pub fn validate(&self, command: Command) -> Result<Accepted, ValidationError> {
        // Nothing about the parameters is looked at before this
        let descriptor = self
            .registry
            .descriptor(command.action())
            .ok_or_else(|| ValidationError::UnknownAction(command.action().to_string()))?;

        let mut strings = BTreeMap::new();
        let mut raw_paths = Vec::new();
        for spec in descriptor.parameters {
            match check_parameter(descriptor, spec, command.parameters().get(spec.name))? {
                Checked::Path(raw) => raw_paths.push((spec.name, raw)),
                Checked::Text(text) => {
                    strings.insert(spec.name.to_string(), text);
                }
                Checked::Absent => {}
            }
        }

        if let Some(unexpected) = command
            .parameters()
            .keys()
            .find(|key| descriptor.parameter(key).is_none())
        {
            return Err(ValidationError::InvalidParameter {
                action: descriptor.name.to_string(),
                parameter: unexpected.clone(),
                problem: ParameterProblem::Unexpected,
            });
        }

        let mut paths = BTreeMap::new();
        for (name, raw) in raw_paths {
            let verdict = self.authority.check(Path::new(&raw));
            if !verdict.allowed {
                let denial = verdict.reason.unwrap_or(PathDenial::OutsideAllowList);
                if denial.is_deny_list_hit() {
                    warn!(
                        "{} asked for protected location {}",
                        descriptor.name,
                        verdict.canonical_path.display()
                    );
                }
                return Err(ValidationError::PathNotPermitted {
                    parameter: name.to_string(),
                    path: raw,
                    canonical: verdict.canonical_path,
                    denial,
                });
            }
            let existed = verdict.canonical_path.symlink_metadata().is_ok();
            paths.insert(
                name.to_string(),
                ResolvedPath {
                    canonical: verdict.canonical_path,
                    existed,
                },
            );
        }

        let requires_confirmation = descriptor.is_destructive() || command.requires_confirmation();
        debug!(
            "Accepted {} (confirmation: {requires_confirmation})",
            descriptor.name
        );

        Ok(Accepted {
            descriptor,
            args: ActionArgs::new(paths, strings),
            requires_confirmation,
        })
    }
}

enum Checked {
    Path(String),
    Text(String),
    Absent,
}

fn check_parameter(
    descriptor: &ActionDescriptor,
    spec: &ParamSpec,
    value: Option<&Value>,
) -> Result<Checked, ValidationError> {
    let invalid = |problem| ValidationError::InvalidParameter {
        action: descriptor.name.to_string(),
        parameter: spec.name.to_string(),
        problem,
    };

    match (spec.kind, value) {
        (ParamKind::OptionalString, None | Some(Value::Null)) => Ok(Checked::Absent),
        (ParamKind::OptionalString, Some(Value::String(text))) => Ok(Checked::Text(text.clone())),
        (_, None | Some(Value::Null)) => Err(invalid(ParameterProblem::Missing)),
        (ParamKind::Path, Some(Value::String(raw))) if raw.trim().is_empty() => {
            Err(invalid(ParameterProblem::Empty))
        }
        (ParamKind::Path, Some(Value::String(raw))) => Ok(Checked::Path(raw.clone())),
        (ParamKind::String, Some(Value::String(text))) if text.trim().is_empty() => {
            Err(invalid(ParameterProblem::Empty))
        }
        (ParamKind::String, Some(Value::String(text))) => Ok(Checked::Text(text.clone())),
        (kind, Some(_)) => Err(invalid(ParameterProblem::WrongKind(kind))),
    }
}
