//! Operator approval for commands that require it.
//!
//! The gate is the only place an [`Authorized`] command can come from.
//! Commands that do not need confirmation pass straight through; all
//! others wait for an explicit `y`/`yes`. Anything else, including no
//! answer at all, declines.

use std::fmt;
use std::io::{self, BufRead, Write};

use tracing::{info, warn};

use crate::actions::{ParamKind, SideEffect};
use crate::error::PipelineError;
use crate::validator::Accepted;

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub action: &'static str,
    pub side_effect: SideEffect,
    /// Parameter name and the value that will actually be used
    /// (canonical form for paths).
    pub details: Vec<(String, String)>,
}

impl ConfirmationRequest {
    fn for_accepted(accepted: &Accepted) -> Self {
        let args = accepted.args();
        let details = accepted
            .descriptor()
            .parameters
            .iter()
            .filter_map(|spec| {
                let value = match spec.kind {
                    ParamKind::Path => args.path(spec.name).ok()?.display().to_string(),
                    ParamKind::String | ParamKind::OptionalString => {
                        args.optional(spec.name)?.to_string()
                    }
                };
                Some((spec.name.to_string(), value))
            })
            .collect();

        Self {
            action: accepted.action(),
            side_effect: accepted.descriptor().side_effect,
            details,
        }
    }
}

impl fmt::Display for ConfirmationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.action, self.side_effect)?;
        for (name, value) in &self.details {
            write!(f, "\n  {name}: {value}")?;
        }
        Ok(())
    }
}

/// Synchronous yes/no capability.
///
/// Returns the operator's raw answer, or `None` when no answer can be
/// obtained (closed input, I/O error).
pub trait Confirmer: Send + Sync {
    fn ask(&self, request: &ConfirmationRequest) -> Option<String>;
}

/// True only for `y` / `yes`, ignoring case and surrounding whitespace.
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}

/// A command the executor may run.
///
/// Built only by [`ConfirmationGate::authorize`].
#[derive(Debug)]
pub struct Authorized {
    accepted: Accepted,
    prompted: bool,
}

impl Authorized {
    pub fn accepted(&self) -> &Accepted {
        &self.accepted
    }

    /// Whether the operator was asked (as opposed to the gate being
    /// skipped).
    pub fn prompted(&self) -> bool {
        self.prompted
    }
}

pub struct ConfirmationGate {
    confirmer: Box<dyn Confirmer>,
}

impl ConfirmationGate {
    pub fn new(confirmer: Box<dyn Confirmer>) -> Self {
        Self { confirmer }
    }

    pub fn authorize(&self, accepted: Accepted) -> Result<Authorized, PipelineError> {
        if !accepted.requires_confirmation() {
            return Ok(Authorized {
                accepted,
                prompted: false,
            });
        }

        let request = ConfirmationRequest::for_accepted(&accepted);
        match self.confirmer.ask(&request) {
            Some(answer) if is_affirmative(&answer) => {
                info!("Operator confirmed {}", request.action);
                Ok(Authorized {
                    accepted,
                    prompted: true,
                })
            }
            answer => {
                warn!("Operator declined {} (answer: {answer:?})", request.action);
                Err(PipelineError::ConfirmationDeclined {
                    action: request.action.to_string(),
                })
            }
        }
    }
}

/// Asks on the controlling terminal.
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn ask(&self, request: &ConfirmationRequest) -> Option<String> {
        let mut stdout = io::stdout().lock();
        let prompt = writeln!(stdout, "\n⚠  Confirmation required: {request}")
            .and_then(|_| write!(stdout, "Proceed? [y/N] "))
            .and_then(|_| stdout.flush());
        if let Err(e) = prompt {
            warn!("Cannot show confirmation prompt: {e}");
            return None;
        }
        drop(stdout);

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(answer),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedConfirmer;
    use super::*;
    use crate::actions::ActionRegistry;
    use crate::command::Command;
    use crate::sandbox::PathAuthority;
    use crate::validator::Validator;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    fn accept(root: &Path, action: &str, parameters: serde_json::Value, flag: bool) -> Accepted {
        let authority = PathAuthority::with_deny_list(&[root.to_path_buf()], &[], Vec::new()).unwrap();
        let validator = Validator::new(
            Arc::new(ActionRegistry::builtin().unwrap()),
            Arc::new(authority),
        );
        let serde_json::Value::Object(parameters) = parameters else {
            panic!("parameters must be an object");
        };
        validator
            .validate(Command::new(action, parameters, flag))
            .unwrap()
    }

    #[test]
    fn test_affirmatives() {
        for yes in ["y", "Y", "yes", "YES", " yes\n", "Yes"] {
            assert!(is_affirmative(yes), "{yes:?}");
        }
        for no in ["", "n", "no", "yeah", "sure", "ok", "y es", "yes please"] {
            assert!(!is_affirmative(no), "{no:?}");
        }
    }

    #[test]
    fn test_not_required_skips_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let confirmer = ScriptedConfirmer::default();
        let gate = ConfirmationGate::new(Box::new(confirmer.clone()));

        let accepted = accept(dir.path(), "list_directory", json!({"path": dir.path()}), false);
        let authorized = gate.authorize(accepted).unwrap();
        assert!(!authorized.prompted());
        assert!(confirmer.asked().is_empty());
    }

    #[test]
    fn test_destructive_prompts_with_canonical_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "x").unwrap();
        let confirmer = ScriptedConfirmer::answering(&[Some("yes")]);
        let gate = ConfirmationGate::new(Box::new(confirmer.clone()));

        let authorized = gate
            .authorize(accept(dir.path(), "delete_file", json!({"path": &file}), false))
            .unwrap();
        assert!(authorized.prompted());

        let asked = confirmer.asked();
        assert_eq!(asked.len(), 1);
        assert_eq!(asked[0].action, "delete_file");
        assert_eq!(asked[0].side_effect, SideEffect::Destructive);
        assert_eq!(
            asked[0].details,
            vec![(
                "path".to_string(),
                dunce::canonicalize(&file).unwrap().display().to_string()
            )]
        );
    }

    #[test]
    fn test_decline_and_no_answer() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.txt");
        std::fs::write(&file, "x").unwrap();
        let confirmer = ScriptedConfirmer::answering(&[Some("no"), None]);
        let gate = ConfirmationGate::new(Box::new(confirmer.clone()));

        for _ in 0..2 {
            let err = gate
                .authorize(accept(dir.path(), "delete_file", json!({"path": &file}), false))
                .unwrap_err();
            assert!(matches!(
                err,
                PipelineError::ConfirmationDeclined { ref action } if action == "delete_file"
            ));
        }
        assert_eq!(confirmer.asked().len(), 2);
    }

    #[test]
    fn test_request_display() {
        let request = ConfirmationRequest {
            action: "move_file",
            side_effect: SideEffect::Destructive,
            details: vec![
                ("source".into(), "/w/a.txt".into()),
                ("destination".into(), "/w/b".into()),
            ],
        };
        assert_eq!(
            request.to_string(),
            "move_file (destructive)\n  source: /w/a.txt\n  destination: /w/b"
        );
    }
}
