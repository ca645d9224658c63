//! Runs authorized commands.
//!
//! The only entry point takes an [`Authorized`], so nothing reaches a
//! handler without going through the validator and the gate.

use std::sync::Arc;

use tracing::{error, info};

use crate::actions::{ActionContext, ActionError, ActionOutput, ActionRegistry};
use crate::gate::Authorized;
use crate::sandbox::resolve;

pub struct Executor {
    registry: Arc<ActionRegistry>,
    context: ActionContext,
}

impl Executor {
    pub fn new(registry: Arc<ActionRegistry>, context: ActionContext) -> Self {
        Self { registry, context }
    }

    /// Runs the handler bound to the authorized action.
    ///
    /// Failures stay typed; callers fold them into an
    /// [`ExecutionResult`](crate::actions::ExecutionResult) for reporting.
    pub async fn execute(&self, authorized: &Authorized) -> Result<ActionOutput, ActionError> {
        let accepted = authorized.accepted();
        let action = accepted.action();

        // A link swapped in since validation would send the handler
        // somewhere that was never checked
        for (name, validated) in accepted.args().resolved_paths() {
            match resolve(&validated.canonical) {
                Ok(now) if now == validated.canonical => {}
                Ok(now) => {
                    return Err(ActionError::Race(format!(
                        "'{name}' now resolves to {} instead of {}",
                        now.display(),
                        validated.canonical.display()
                    )))
                }
                Err(denial) => {
                    return Err(ActionError::Race(format!(
                        "'{name}' ({}) can no longer be resolved: {denial}",
                        validated.canonical.display()
                    )))
                }
            }
        }

        let handler = self.registry.handler(action).ok_or_else(|| {
            ActionError::InvalidRequest(format!("no handler registered for '{action}'"))
        })?;

        info!("Executing {action}");
        match handler.run(accepted.args(), &self.context).await {
            Ok(output) => {
                info!("{action} succeeded: {}", output.message);
                Ok(output)
            }
            Err(e) => {
                error!("{action} failed: {e}");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::builtin::testing::context;
    use crate::command::Command;
    use crate::desktop::testing::DesktopCall;
    use crate::error::ErrorKind;
    use crate::gate::testing::ScriptedConfirmer;
    use crate::gate::ConfirmationGate;
    use crate::validator::Validator;
    use serde_json::{json, Value};
    use std::fs;
    use std::path::Path;

    struct Harness {
        validator: Validator,
        gate: ConfirmationGate,
        executor: Executor,
    }

    impl Harness {
        fn new(root: &Path) -> (Self, Arc<crate::desktop::testing::RecordingDesktop>) {
            let registry = Arc::new(ActionRegistry::builtin().unwrap());
            let (ctx, desktop) = context(root);
            let harness = Self {
                validator: Validator::new(registry.clone(), ctx.authority.clone()),
                gate: ConfirmationGate::new(Box::new(ScriptedConfirmer::answering(&[Some("y")]))),
                executor: Executor::new(registry, ctx),
            };
            (harness, desktop)
        }

        fn authorize(&self, action: &str, parameters: Value) -> Authorized {
            let Value::Object(parameters) = parameters else {
                panic!("parameters must be an object");
            };
            let accepted = self
                .validator
                .validate(Command::new(action, parameters, false))
                .unwrap();
            self.gate.authorize(accepted).unwrap()
        }
    }

    #[tokio::test]
    async fn test_execute_success() {
        let dir = tempfile::tempdir().unwrap();
        let (harness, desktop) = Harness::new(dir.path());

        let authorized = harness.authorize("open_folder", json!({"path": dir.path()}));
        let output = harness.executor.execute(&authorized).await.unwrap();
        assert!(output.message.starts_with("Opened folder"));
        assert_eq!(desktop.calls().len(), 1);
        assert!(matches!(desktop.calls()[0], DesktopCall::Open(_)));
    }

    #[tokio::test]
    async fn test_os_failure_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let (harness, _) = Harness::new(dir.path());

        // Parent folder does not exist, so the rename itself fails
        let source = dir.path().join("a.txt");
        fs::write(&source, "x").unwrap();
        let authorized = harness.authorize(
            "move_file",
            json!({"source": &source, "destination": dir.path().join("missing/b.txt")}),
        );
        let err = harness.executor.execute(&authorized).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OperatingSystem);
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_vanished_target_is_a_race() {
        let dir = tempfile::tempdir().unwrap();
        let (harness, _) = Harness::new(dir.path());
        let file = dir.path().join("test.txt");
        fs::write(&file, "x").unwrap();

        let authorized = harness.authorize("delete_file", json!({"path": &file}));
        fs::remove_file(&file).unwrap();

        let err = harness.executor.execute(&authorized).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionRace);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_swapped_in_after_validation_is_a_race() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let data = root.join("data");
        let outside = dir.path().join("outside");
        fs::create_dir_all(&data).unwrap();
        fs::create_dir_all(&outside).unwrap();
        fs::write(data.join("file.txt"), "mine").unwrap();
        fs::write(outside.join("file.txt"), "not mine").unwrap();
        let (harness, _) = Harness::new(&root);

        let authorized = harness.authorize("delete_file", json!({"path": data.join("file.txt")}));

        fs::remove_dir_all(&data).unwrap();
        std::os::unix::fs::symlink(&outside, &data).unwrap();

        let err = harness.executor.execute(&authorized).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionRace);
        assert!(outside.join("file.txt").exists());
    }
}
