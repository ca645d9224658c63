//! Starting and stopping desktop applications.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::actions::{ActionArgs, ActionContext, ActionError, ActionHandler, ActionOutput};

const MAX_PROGRAM_LEN: usize = 64;

#[cfg(windows)]
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("notepad", "notepad.exe"),
    ("calculator", "calc.exe"),
    ("calc", "calc.exe"),
    ("paint", "mspaint.exe"),
    ("cmd", "cmd.exe"),
    ("powershell", "powershell.exe"),
    ("explorer", "explorer.exe"),
    ("chrome", "chrome.exe"),
    ("firefox", "firefox.exe"),
    ("edge", "msedge.exe"),
    ("code", "code.exe"),
    ("vscode", "code.exe"),
    ("word", "winword.exe"),
    ("excel", "excel.exe"),
    ("spotify", "spotify.exe"),
    ("terminal", "wt.exe"),
];

#[cfg(target_os = "macos")]
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("notepad", "TextEdit"),
    ("calculator", "Calculator"),
    ("calc", "Calculator"),
    ("terminal", "Terminal"),
    ("chrome", "Google Chrome"),
    ("firefox", "Firefox"),
    ("safari", "Safari"),
    ("code", "Visual Studio Code"),
    ("vscode", "Visual Studio Code"),
    ("spotify", "Spotify"),
];

#[cfg(all(unix, not(target_os = "macos")))]
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("notepad", "gedit"),
    ("calculator", "gnome-calculator"),
    ("calc", "gnome-calculator"),
    ("terminal", "x-terminal-emulator"),
    ("chrome", "google-chrome"),
    ("firefox", "firefox"),
    ("code", "code"),
    ("vscode", "code"),
    ("spotify", "spotify"),
];

#[cfg(not(any(unix, windows)))]
const DEFAULT_ALIASES: &[(&str, &str)] = &[];

/// Friendly application names mapped to program names.
///
/// Lookups are case-insensitive. Unknown names pass through unchanged.
#[derive(Debug, Clone)]
pub struct AppAliases {
    aliases: HashMap<String, String>,
}

impl AppAliases {
    /// Platform defaults, with `overrides` taking precedence.
    pub fn with_overrides(overrides: &HashMap<String, String>) -> Self {
        let mut aliases: HashMap<String, String> = DEFAULT_ALIASES
            .iter()
            .map(|(alias, program)| (alias.to_string(), program.to_string()))
            .collect();
        for (alias, program) in overrides {
            aliases.insert(alias.trim().to_lowercase(), program.clone());
        }
        Self { aliases }
    }

    pub fn resolve(&self, name: &str) -> String {
        let key = name.trim().to_lowercase();
        match self.aliases.get(&key) {
            Some(program) => {
                debug!("Alias {name} → {program}");
                program.clone()
            }
            None => name.trim().to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }
}

/// A program name must be a bare name: no separators, no option-like
/// prefix, nothing a launcher could read as a path or a flag.
fn check_program_name(program: &str) -> Result<(), ActionError> {
    let invalid = |why: &str| {
        Err(ActionError::InvalidRequest(format!(
            "'{program}' is not a valid application name: {why}"
        )))
    };

    if program.is_empty() {
        return invalid("empty");
    }
    if program.chars().count() > MAX_PROGRAM_LEN {
        return invalid("too long");
    }
    if program.starts_with('-') {
        return invalid("starts with '-'");
    }
    if program == "." || program == ".." {
        return invalid("not a name");
    }
    if let Some(c) = program
        .chars()
        .find(|c| !(c.is_alphanumeric() || " ._-+()".contains(*c)))
    {
        return invalid(&format!("character '{c}' not allowed"));
    }
    Ok(())
}

pub struct OpenApplication;

#[async_trait]
impl ActionHandler for OpenApplication {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let program = ctx.aliases.resolve(args.string("name")?);
        check_program_name(&program)?;

        ctx.desktop
            .launch(&program)
            .map_err(ActionError::os(format!("cannot launch {program}")))?;
        Ok(ActionOutput::with_data(
            format!("Launched {program}"),
            json!({ "program": program }),
        ))
    }
}

pub struct CloseApplication;

#[async_trait]
impl ActionHandler for CloseApplication {
    async fn run(&self, args: &ActionArgs, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let program = ctx.aliases.resolve(args.string("name")?);
        check_program_name(&program)?;

        let stopped = ctx
            .desktop
            .terminate(&program)
            .map_err(ActionError::os(format!("cannot close {program}")))?;
        if !stopped {
            return Err(ActionError::InvalidRequest(format!("{program} is not running")));
        }
        Ok(ActionOutput::with_data(
            format!("Closed {program}"),
            json!({ "program": program }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::builtin::testing::{args, context};
    use crate::desktop::testing::{DesktopCall, RecordingDesktop};
    use crate::error::ErrorKind;
    use std::path::Path;
    use std::sync::Arc;

    fn name(value: &str) -> ActionArgs {
        args::<&Path>(&[], &[("name", value)])
    }

    #[test]
    fn test_alias_lookup_is_case_insensitive() {
        let mut overrides = HashMap::new();
        overrides.insert("Editor".to_string(), "my-editor".to_string());
        let aliases = AppAliases::with_overrides(&overrides);

        assert_eq!(aliases.resolve("EDITOR"), "my-editor");
        assert_eq!(aliases.resolve("  editor "), "my-editor");
        assert_eq!(aliases.resolve("unknown-tool"), "unknown-tool");
        assert_eq!(aliases.len(), DEFAULT_ALIASES.len() + 1);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("calc".to_string(), "qalculate".to_string());
        let aliases = AppAliases::with_overrides(&overrides);
        assert_eq!(aliases.resolve("calc"), "qalculate");
    }

    #[test]
    fn test_program_name_rules() {
        assert!(check_program_name("notepad.exe").is_ok());
        assert!(check_program_name("Google Chrome").is_ok());
        assert!(check_program_name("g++").is_ok());
        assert!(check_program_name("").is_err());
        assert!(check_program_name("-rf").is_err());
        assert!(check_program_name("..").is_err());
        assert!(check_program_name("../bin/sh").is_err());
        assert!(check_program_name(r"C:\Windows\evil").is_err());
        assert!(check_program_name("calc & del").is_err());
        assert!(check_program_name(&"x".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_open_application_launches_resolved_program() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, desktop) = context(dir.path());
        let mut overrides = HashMap::new();
        overrides.insert("editor".to_string(), "my-editor".to_string());
        ctx.aliases = Arc::new(AppAliases::with_overrides(&overrides));

        let output = OpenApplication.run(&name("Editor"), &ctx).await.unwrap();
        assert_eq!(output.message, "Launched my-editor");
        assert_eq!(desktop.calls(), vec![DesktopCall::Launch("my-editor".into())]);
    }

    #[tokio::test]
    async fn test_open_application_rejects_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, desktop) = context(dir.path());
        let err = OpenApplication.run(&name("/bin/sh"), &ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(desktop.calls().is_empty());
    }

    #[tokio::test]
    async fn test_close_application() {
        let dir = tempfile::tempdir().unwrap();
        let (mut ctx, _) = context(dir.path());
        let desktop = Arc::new(RecordingDesktop {
            running: vec!["spotify-client".to_string()],
            ..Default::default()
        });
        ctx.desktop = desktop.clone();

        let output = CloseApplication
            .run(&name("spotify-client"), &ctx)
            .await
            .unwrap();
        assert_eq!(output.message, "Closed spotify-client");

        let err = CloseApplication.run(&name("idle-tool"), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("is not running"));
        assert_eq!(desktop.calls().len(), 2);
    }
}
