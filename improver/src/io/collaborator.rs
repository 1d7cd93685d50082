//! Collaborator abstraction for the code-editing agent.
//!
//! The [`Collaborator`] trait decouples the loop from the actual agent backend
//! (currently `aider`). Analysis requests and repository-mutating requests are
//! separate methods so an analysis call can never be issued in edit mode.
//! Tests use scripted collaborators that return predetermined responses
//! without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::io::config::{CollaboratorConfig, RunConfig};
use crate::io::process::{CommandOutput, run_command};

/// Abstraction over code-editing agent backends.
pub trait Collaborator {
    /// Ask a question about the repository. Must not edit any file.
    fn analyze(&self, prompt: &str) -> Result<String>;

    /// Ask for changes. The agent edits the repository in place.
    fn apply(&self, prompt: &str) -> Result<()>;
}

impl<T: Collaborator + ?Sized> Collaborator for &T {
    fn analyze(&self, prompt: &str) -> Result<String> {
        (**self).analyze(prompt)
    }

    fn apply(&self, prompt: &str) -> Result<()> {
        (**self).apply(prompt)
    }
}

/// Whole lines aider prints around the model's reply: the startup banner,
/// file notices and the token/cost footer.
static NOTICE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:Aider v\S+|(?:Main|Weak|Editor) model: |Model: |Git repo: |Repo-map: |Added \S.* to the chat\.?$|Use /help |Tokens: |Cost: |https://aider\.chat/)[^\n]*(?:\n|\z)",
    )
    .expect("notice line pattern should be valid")
});

/// Drop aider's own notice lines so only the model's reply remains.
fn strip_notices(stdout: &str) -> String {
    NOTICE_LINE_RE.replace_all(stdout, "").into_owned()
}

/// Chat mode passed to the agent for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatMode {
    /// Read-only question answering.
    Ask,
    /// Plan-then-edit mode that writes files.
    Architect,
}

impl ChatMode {
    fn as_str(self) -> &'static str {
        match self {
            ChatMode::Ask => "ask",
            ChatMode::Architect => "architect",
        }
    }
}

/// Launch parameters shared by every call of one collaborator.
#[derive(Debug, Clone)]
pub struct AiderSettings {
    pub command: String,
    pub model: String,
    pub editable: Vec<String>,
    pub read_only: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Option<Duration>,
    pub retries: u32,
    pub output_limit_bytes: usize,
}

impl AiderSettings {
    pub fn from_config(cfg: &RunConfig, model: &str, workdir: PathBuf) -> Self {
        let CollaboratorConfig {
            command, retries, ..
        } = &cfg.collaborator;
        Self {
            command: command.clone(),
            model: model.to_string(),
            editable: cfg.context_editable.clone(),
            read_only: cfg.context_read_only.clone(),
            workdir,
            timeout: cfg.collaborator.timeout(),
            retries: *retries,
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }
}

/// Collaborator that spawns one `aider` process per call.
#[derive(Debug, Clone)]
pub struct AiderCollaborator {
    settings: AiderSettings,
}

impl AiderCollaborator {
    pub fn new(settings: AiderSettings) -> Self {
        Self { settings }
    }

    fn build_command(&self, mode: ChatMode, prompt: &str) -> Command {
        let s = &self.settings;
        let mut cmd = Command::new(&s.command);
        cmd.arg("--model")
            .arg(&s.model)
            .arg("--chat-mode")
            .arg(mode.as_str())
            .arg("--yes-always")
            .arg("--no-auto-commits")
            .arg("--no-suggest-shell-commands")
            .arg("--no-pretty")
            .arg("--no-stream")
            .arg("--no-check-update")
            .arg("--no-show-release-notes");
        for file in &s.editable {
            cmd.arg("--file").arg(file);
        }
        for file in &s.read_only {
            cmd.arg("--read").arg(file);
        }
        cmd.arg("--message").arg(prompt).current_dir(&s.workdir);
        cmd
    }

    #[instrument(skip_all, fields(mode = mode.as_str(), model = %self.settings.model))]
    fn call(&self, mode: ChatMode, prompt: &str) -> Result<String> {
        let attempts = self.settings.retries + 1;
        for attempt in 1..=attempts {
            info!(attempt, attempts, "invoking collaborator");
            let output = run_command(
                self.build_command(mode, prompt),
                self.settings.timeout,
                self.settings.output_limit_bytes,
            )
            .with_context(|| format!("run {}", self.settings.command))?;

            if output.timed_out {
                warn!(attempt, timeout = ?self.settings.timeout, "collaborator timed out");
                continue;
            }
            return finish(&self.settings.command, output);
        }
        Err(anyhow!(
            "{} timed out after {} attempt(s) of {:?}",
            self.settings.command,
            attempts,
            self.settings.timeout.unwrap_or_default()
        ))
    }
}

fn finish(command: &str, output: CommandOutput) -> Result<String> {
    if !output.status.success() {
        warn!(exit_code = ?output.status.code(), "collaborator failed");
        return Err(anyhow!(
            "{command} failed with status {:?}: {}",
            output.status.code(),
            output.stderr_text().trim()
        ));
    }
    debug!(bytes = output.stdout.len(), "collaborator responded");
    Ok(strip_notices(&output.stdout_text()))
}

impl Collaborator for AiderCollaborator {
    fn analyze(&self, prompt: &str) -> Result<String> {
        self.call(ChatMode::Ask, prompt)
    }

    fn apply(&self, prompt: &str) -> Result<()> {
        self.call(ChatMode::Architect, prompt).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn settings(command: &str, workdir: PathBuf) -> AiderSettings {
        AiderSettings {
            command: command.to_string(),
            model: "test-model".to_string(),
            editable: vec!["app.py".to_string()],
            read_only: vec!["README.md".to_string()],
            workdir,
            timeout: Some(Duration::from_secs(10)),
            retries: 0,
            output_limit_bytes: 10_000,
        }
    }

    /// Write an executable stand-in for the agent.
    fn fake_agent(dir: &std::path::Path, body: &str) -> String {
        let path = dir.join("fake-agent");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod");
        path.display().to_string()
    }

    #[test]
    fn analyze_uses_ask_mode_and_returns_stdout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let collaborator = AiderCollaborator::new(settings("echo", temp.path().to_path_buf()));

        let response = collaborator.analyze("what is here?").expect("analyze");
        assert!(response.contains("--chat-mode ask"), "{response}");
        assert!(response.contains("--model test-model"));
        assert!(response.contains("--file app.py"));
        assert!(response.contains("--read README.md"));
        assert!(response.ends_with("--message what is here?\n"));
    }

    #[test]
    fn apply_uses_architect_mode() {
        let temp = tempfile::tempdir().expect("tempdir");
        let collaborator = AiderCollaborator::new(settings("echo", temp.path().to_path_buf()));

        let cmd = collaborator.build_command(ChatMode::Architect, "change it");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let mode = args.iter().position(|a| a == "--chat-mode").expect("mode flag");
        assert_eq!(args[mode + 1], "architect");
        assert_eq!(args.last().map(String::as_str), Some("change it"));
        collaborator.apply("change it").expect("apply");
    }

    #[test]
    fn nonzero_exit_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let collaborator = AiderCollaborator::new(settings("false", temp.path().to_path_buf()));

        let err = collaborator.analyze("x").unwrap_err();
        assert!(err.to_string().contains("false failed with status"), "{err}");
    }

    #[test]
    fn missing_binary_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let collaborator = AiderCollaborator::new(settings(
            "definitely-not-a-real-agent-xyz",
            temp.path().to_path_buf(),
        ));
        assert!(collaborator.analyze("x").is_err());
    }

    #[test]
    fn timeouts_are_retried_then_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = fake_agent(temp.path(), "echo tick >> calls.txt; exec sleep 30");
        let mut settings = settings(&agent, temp.path().to_path_buf());
        settings.timeout = Some(Duration::from_millis(300));
        settings.retries = 1;
        let collaborator = AiderCollaborator::new(settings);

        let err = collaborator.analyze("x").unwrap_err();
        assert!(err.to_string().contains("timed out after 2 attempt(s)"), "{err}");
        let calls = fs::read_to_string(temp.path().join("calls.txt")).expect("calls");
        assert_eq!(calls.lines().count(), 2);
    }

    #[test]
    fn banner_and_footer_are_stripped_from_replies() {
        let temp = tempfile::tempdir().expect("tempdir");
        let agent = fake_agent(
            temp.path(),
            r#"cat <<'EOF'
Aider v0.86.1
Main model: gpt-4o with diff edit format
Weak model: gpt-4o-mini
Git repo: .git with 12 files
Repo-map: using 1024 tokens, auto refresh
Added app.py to the chat.
Use /help <question> for help, run "aider --help" to see cmd line args
{"success": false, "feedback": "add the /health route"}
Tokens: 2.1k sent, 35 received. Cost: $0.0056 message, $0.0056 session.
EOF"#,
        );
        let collaborator = AiderCollaborator::new(settings(&agent, temp.path().to_path_buf()));

        let response = collaborator.analyze("x").expect("analyze");
        assert_eq!(
            response,
            "{\"success\": false, \"feedback\": \"add the /health route\"}\n"
        );
        let verdict = crate::core::verdict::parse_evaluation(&response);
        assert!(!verdict.success);
        assert_eq!(verdict.feedback.as_deref(), Some("add the /health route"));
    }

    #[test]
    fn reply_lines_that_mention_notices_are_kept() {
        let reply = "The model: gpt-4o answered.\nAdded caching to the handler and tests.\n";
        assert_eq!(strip_notices(reply), reply);
    }

    #[test]
    fn update_checks_and_release_notes_are_disabled() {
        let temp = tempfile::tempdir().expect("tempdir");
        let collaborator = AiderCollaborator::new(settings("echo", temp.path().to_path_buf()));
        let cmd = collaborator.build_command(ChatMode::Ask, "x");
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.iter().any(|a| a == "--no-check-update"));
        assert!(args.iter().any(|a| a == "--no-show-release-notes"));
    }
}
