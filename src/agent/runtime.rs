use std::time::Duration;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::actions::ExecutionResult;
use crate::command::{self, Translation};
use crate::error::{PipelineError, Stage};
use crate::executor::Executor;
use crate::gate::ConfirmationGate;
use crate::llm::Translator;
use crate::validator::Validator;

/// States a turn moves through. None is ever visited twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Received,
    Translated,
    Validated,
    /// The operator approved the command.
    Confirmed,
    /// No confirmation was required.
    Skipped,
    Executed,
    Reported,
    Failed(Stage),
}

/// How a turn ended.
#[derive(Debug)]
pub enum TurnOutcome {
    /// The translator needs more information.
    Clarify { message: String },
    /// The translator refused the request itself.
    Refused { reason: String },
    /// The action ran to completion.
    Completed(ExecutionResult),
    /// The turn stopped early. A declined confirmation lands here too,
    /// with a `cancelled` result.
    Failed {
        error: PipelineError,
        result: ExecutionResult,
    },
}

/// Everything known about a finished turn. Nothing outlives it.
#[derive(Debug)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub trail: Vec<TurnState>,
    pub outcome: TurnOutcome,
}

impl TurnReport {
    /// The result payload, for turns that got past translation.
    pub fn result(&self) -> Option<&ExecutionResult> {
        match &self.outcome {
            TurnOutcome::Completed(result) | TurnOutcome::Failed { result, .. } => Some(result),
            TurnOutcome::Clarify { .. } | TurnOutcome::Refused { .. } => None,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match &self.outcome {
            TurnOutcome::Failed { error, .. } => Some(error.stage()),
            _ => None,
        }
    }
}

/// The turn pipeline: translate, validate, confirm, execute, report.
///
/// Stages run strictly in order and the first failure ends the turn.
/// `run_turn` takes `&mut self`, so one pipeline never runs two turns
/// at once.
pub struct Pipeline {
    translator: Box<dyn Translator>,
    validator: Validator,
    gate: ConfirmationGate,
    executor: Executor,
    translate_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        translator: Box<dyn Translator>,
        validator: Validator,
        gate: ConfirmationGate,
        executor: Executor,
        translate_timeout: Duration,
    ) -> Self {
        Self {
            translator,
            validator,
            gate,
            executor,
            translate_timeout,
        }
    }

    pub fn translator_description(&self) -> String {
        self.translator.description()
    }

    /// Runs one utterance through every stage.
    pub async fn run_turn(&mut self, utterance: &str) -> TurnReport {
        let turn_id = Uuid::new_v4();
        let span = info_span!("turn", id = %turn_id);

        let mut trail = vec![TurnState::Received];
        let outcome = self.advance(utterance, &mut trail).instrument(span).await;
        trail.push(match &outcome {
            TurnOutcome::Failed { error, .. } => TurnState::Failed(error.stage()),
            _ => TurnState::Reported,
        });

        TurnReport {
            turn_id,
            trail,
            outcome,
        }
    }

    async fn advance(&self, utterance: &str, trail: &mut Vec<TurnState>) -> TurnOutcome {
        match self.step(utterance, trail).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!("Turn failed at {}: {error}", error.stage());
                let result = match &error {
                    PipelineError::ConfirmationDeclined { action } => {
                        ExecutionResult::cancelled(format!("Cancelled: {action} was not confirmed"))
                    }
                    PipelineError::Action(e) => ExecutionResult::from(e),
                    other => ExecutionResult::failure(other.kind(), other.to_string()),
                };
                TurnOutcome::Failed { error, result }
            }
        }
    }

    async fn step(
        &self,
        utterance: &str,
        trail: &mut Vec<TurnState>,
    ) -> Result<TurnOutcome, PipelineError> {
        info!("Received: {utterance}");

        let raw = match tokio::time::timeout(
            self.translate_timeout,
            self.translator.translate(utterance),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(PipelineError::Translation(format!("{e:#}"))),
            Err(_) => return Err(PipelineError::TranslationTimeout(self.translate_timeout)),
        };

        let command = match command::decode(&raw)? {
            Translation::Command(command) => command,
            Translation::Clarify { message } => {
                trail.push(TurnState::Translated);
                info!("Translator asked for clarification");
                return Ok(TurnOutcome::Clarify { message });
            }
            Translation::Denied { reason } => {
                trail.push(TurnState::Translated);
                info!("Translator refused: {reason}");
                return Ok(TurnOutcome::Refused { reason });
            }
        };
        trail.push(TurnState::Translated);

        let accepted = self.validator.validate(command)?;
        trail.push(TurnState::Validated);

        let authorized = self.gate.authorize(accepted)?;
        trail.push(if authorized.prompted() {
            TurnState::Confirmed
        } else {
            TurnState::Skipped
        });

        let output = self.executor.execute(&authorized).await?;
        trail.push(TurnState::Executed);

        Ok(TurnOutcome::Completed(ExecutionResult::success(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::builtin::testing::{context, context_with_denied};
    use crate::actions::{ActionContext, ActionRegistry, Status};
    use crate::desktop::testing::{DesktopCall, RecordingDesktop};
    use crate::error::ErrorKind;
    use crate::gate::testing::ScriptedConfirmer;
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    /// Answers every utterance with the same payload.
    struct CannedTranslator {
        reply: anyhow::Result<String>,
        delay: Duration,
    }

    impl CannedTranslator {
        fn replying(payload: serde_json::Value) -> Box<Self> {
            Box::new(Self {
                reply: Ok(payload.to_string()),
                delay: Duration::ZERO,
            })
        }

        fn raw(text: &str) -> Box<Self> {
            Box::new(Self {
                reply: Ok(text.to_string()),
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl Translator for CannedTranslator {
        async fn translate(&self, _utterance: &str) -> anyhow::Result<String> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }

        fn description(&self) -> String {
            "canned".to_string()
        }
    }

    struct Fixture {
        pipeline: Pipeline,
        confirmer: ScriptedConfirmer,
        desktop: Arc<RecordingDesktop>,
    }

    fn fixture(
        ctx: (ActionContext, Arc<RecordingDesktop>),
        translator: Box<dyn Translator>,
        answers: &[Option<&str>],
    ) -> Fixture {
        let (ctx, desktop) = ctx;
        let registry = Arc::new(ActionRegistry::builtin().unwrap());
        let confirmer = ScriptedConfirmer::answering(answers);
        let pipeline = Pipeline::new(
            translator,
            Validator::new(registry.clone(), ctx.authority.clone()),
            ConfirmationGate::new(Box::new(confirmer.clone())),
            Executor::new(registry, ctx),
            Duration::from_secs(5),
        );
        Fixture {
            pipeline,
            confirmer,
            desktop,
        }
    }

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_read_action_runs_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let projects = dir.path().join("Projects");
        fs::create_dir(&projects).unwrap();
        let translator = CannedTranslator::replying(json!({
            "action": "open_folder",
            "parameters": {"path": path_str(&projects)},
            "requires_confirmation": false
        }));
        let mut f = fixture(context(dir.path()), translator, &[]);

        let report = f.pipeline.run_turn("Open my Projects folder").await;

        assert_eq!(
            report.trail,
            vec![
                TurnState::Received,
                TurnState::Translated,
                TurnState::Validated,
                TurnState::Skipped,
                TurnState::Executed,
                TurnState::Reported,
            ]
        );
        assert_eq!(report.result().unwrap().status, Status::Success);
        assert!(f.confirmer.asked().is_empty());
        assert_eq!(
            f.desktop.calls(),
            vec![DesktopCall::Open(dunce::canonicalize(&projects).unwrap())]
        );
    }

    #[tokio::test]
    async fn test_destructive_declined_never_executes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.txt");
        fs::write(&file, "keep me").unwrap();
        let translator = CannedTranslator::replying(json!({
            "action": "delete_file",
            "parameters": {"path": path_str(&file)},
            "requires_confirmation": false
        }));
        let mut f = fixture(context(dir.path()), translator, &[Some("n")]);

        let report = f.pipeline.run_turn("Delete test.txt").await;

        assert_eq!(f.confirmer.asked().len(), 1);
        let result = report.result().unwrap();
        assert_eq!(result.status, Status::Cancelled);
        assert_eq!(result.error, Some(ErrorKind::ConfirmationDeclined));
        assert_eq!(report.failed_stage(), Some(Stage::Confirmation));
        assert_eq!(report.trail.last(), Some(&TurnState::Failed(Stage::Confirmation)));
        assert!(!report.trail.contains(&TurnState::Executed));
        assert_eq!(fs::read_to_string(&file).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn test_destructive_confirmed_executes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("test.txt");
        fs::write(&file, "bye").unwrap();
        let translator = CannedTranslator::replying(json!({
            "action": "delete_file",
            "parameters": {"path": path_str(&file)},
            "requires_confirmation": true
        }));
        let mut f = fixture(context(dir.path()), translator, &[Some("YES")]);

        let report = f.pipeline.run_turn("Delete test.txt").await;

        assert!(report.trail.contains(&TurnState::Confirmed));
        assert_eq!(report.result().unwrap().status, Status::Success);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_protected_directory_rejected_at_validation() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("Windows");
        fs::create_dir(&system).unwrap();
        let translator = CannedTranslator::replying(json!({
            "action": "open_folder",
            "parameters": {"path": path_str(&system)},
            "requires_confirmation": false
        }));
        let mut f = fixture(
            context_with_denied(dir.path(), &[system.clone()]),
            translator,
            &[],
        );

        let report = f.pipeline.run_turn("Open the Windows folder").await;

        assert_eq!(report.failed_stage(), Some(Stage::Validation));
        assert_eq!(
            report.result().unwrap().error,
            Some(ErrorKind::PathNotPermitted)
        );
        assert!(f.desktop.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let translator = CannedTranslator::replying(json!({
            "action": "rename_disk",
            "parameters": {"disk": "C:"},
            "requires_confirmation": false
        }));
        let mut f = fixture(context(dir.path()), translator, &[]);

        let report = f.pipeline.run_turn("Rename my disk").await;

        let TurnOutcome::Failed { error, .. } = &report.outcome else {
            panic!("expected a failure, got {:?}", report.outcome);
        };
        assert_eq!(error.kind(), ErrorKind::UnknownAction);
        assert_eq!(
            report.trail,
            vec![
                TurnState::Received,
                TurnState::Translated,
                TurnState::Failed(Stage::Validation),
            ]
        );
    }

    #[tokio::test]
    async fn test_clarify_and_denied_pass_through() {
        let dir = tempfile::tempdir().unwrap();

        let translator = CannedTranslator::replying(json!({
            "action": "clarify",
            "message": "Which folder do you mean?"
        }));
        let mut f = fixture(context(dir.path()), translator, &[]);
        let report = f.pipeline.run_turn("Open it").await;
        assert!(matches!(
            report.outcome,
            TurnOutcome::Clarify { ref message } if message == "Which folder do you mean?"
        ));
        assert_eq!(
            report.trail,
            vec![TurnState::Received, TurnState::Translated, TurnState::Reported]
        );
        assert!(report.result().is_none());

        let translator = CannedTranslator::replying(json!({
            "action": "denied",
            "reason": "Request outside permitted scope"
        }));
        let mut f = fixture(context(dir.path()), translator, &[]);
        let report = f.pipeline.run_turn("Format C:").await;
        assert!(matches!(report.outcome, TurnOutcome::Refused { .. }));
    }

    #[tokio::test]
    async fn test_malformed_output_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fixture(
            context(dir.path()),
            CannedTranslator::raw("Sure! I'll delete that for you."),
            &[],
        );

        let report = f.pipeline.run_turn("Delete everything").await;

        assert_eq!(report.failed_stage(), Some(Stage::Translation));
        assert_eq!(report.result().unwrap().error, Some(ErrorKind::Decode));
        assert_eq!(
            report.trail,
            vec![TurnState::Received, TurnState::Failed(Stage::Translation)]
        );
    }

    #[tokio::test]
    async fn test_translator_error_and_timeout() {
        let dir = tempfile::tempdir().unwrap();

        let failing = Box::new(CannedTranslator {
            reply: Err(anyhow::anyhow!("connection refused")),
            delay: Duration::ZERO,
        });
        let mut f = fixture(context(dir.path()), failing, &[]);
        let report = f.pipeline.run_turn("Open my folder").await;
        let result = report.result().unwrap();
        assert_eq!(result.error, Some(ErrorKind::Translation));
        assert!(result.message.contains("connection refused"));

        let slow = Box::new(CannedTranslator {
            reply: Ok("{}".to_string()),
            delay: Duration::from_secs(10),
        });
        let mut f = fixture(context(dir.path()), slow, &[]);
        f.pipeline.translate_timeout = Duration::from_millis(50);
        let report = f.pipeline.run_turn("Open my folder").await;
        let TurnOutcome::Failed { error, .. } = &report.outcome else {
            panic!("expected a timeout");
        };
        assert!(matches!(error, PipelineError::TranslationTimeout(_)));
        assert_eq!(report.failed_stage(), Some(Stage::Translation));
    }

    #[tokio::test]
    async fn test_execution_failure_is_reported_typed() {
        let dir = tempfile::tempdir().unwrap();
        let translator = CannedTranslator::replying(json!({
            "action": "open_file",
            "parameters": {"path": path_str(&dir.path().join("missing.pdf"))},
            "requires_confirmation": false
        }));
        let mut f = fixture(context(dir.path()), translator, &[]);

        let report = f.pipeline.run_turn("Open missing.pdf").await;

        assert_eq!(report.failed_stage(), Some(Stage::Execution));
        let result = report.result().unwrap();
        assert_eq!(result.status, Status::Failure);
        assert_eq!(result.error, Some(ErrorKind::InvalidRequest));
    }

    #[tokio::test]
    async fn test_each_turn_gets_its_own_id() {
        let dir = tempfile::tempdir().unwrap();
        let translator = CannedTranslator::replying(json!({"action": "clarify", "message": "?"}));
        let mut f = fixture(context(dir.path()), translator, &[]);

        let first = f.pipeline.run_turn("a").await;
        let second = f.pipeline.run_turn("b").await;
        assert_ne!(first.turn_id, second.turn_id);
    }

    #[test]
    fn test_turn_state_serialization() {
        assert_eq!(
            serde_json::to_value(TurnState::Failed(Stage::Validation)).unwrap(),
            json!({"failed": "validation"})
        );
        assert_eq!(serde_json::to_value(TurnState::Skipped).unwrap(), json!("skipped"));
    }
}
