//! Test-only doubles for driving a session without spawning processes.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{EvaluatorKind, ExecutionOutcome, ProgramType};
use crate::execute::ProgramRunner;
use crate::io::collaborator::Collaborator;
use crate::io::config::{CollaboratorConfig, RunConfig};
use crate::io::console::Console;

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorCall {
    Analyze(String),
    Apply(String),
}

/// Collaborator that answers `analyze` from a queue and records every call.
///
/// `analyze` fails once the queue is empty, like an agent that stopped
/// responding.
#[derive(Debug, Default)]
pub struct ScriptedCollaborator {
    responses: RefCell<VecDeque<String>>,
    calls: RefCell<Vec<CollaboratorCall>>,
    apply_error: Option<String>,
}

impl ScriptedCollaborator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: RefCell::new(responses.into_iter().map(Into::into).collect()),
            calls: RefCell::new(Vec::new()),
            apply_error: None,
        }
    }

    /// Make every `apply` call fail with `message`.
    pub fn with_apply_error(mut self, message: impl Into<String>) -> Self {
        self.apply_error = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<CollaboratorCall> {
        self.calls.borrow().clone()
    }

    /// Prompts of every `analyze` call, in order.
    pub fn analyze_prompts(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| match call {
                CollaboratorCall::Analyze(prompt) => Some(prompt.clone()),
                CollaboratorCall::Apply(_) => None,
            })
            .collect()
    }

    pub fn apply_count(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, CollaboratorCall::Apply(_)))
            .count()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl Collaborator for ScriptedCollaborator {
    fn analyze(&self, prompt: &str) -> Result<String> {
        self.calls
            .borrow_mut()
            .push(CollaboratorCall::Analyze(prompt.to_string()));
        self.responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted collaborator has no response left"))
    }

    fn apply(&self, prompt: &str) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(CollaboratorCall::Apply(prompt.to_string()));
        match &self.apply_error {
            Some(message) => Err(anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

/// Console with queued answers. Once the queue runs dry every question reads
/// as end of input (an empty answer).
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    answers: RefCell<VecDeque<String>>,
    questions: RefCell<Vec<String>>,
    panels: RefCell<Vec<(String, String)>>,
    notes: RefCell<Vec<String>>,
}

impl ScriptedConsole {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: RefCell::new(answers.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.borrow().clone()
    }

    /// `(title, body)` of every panel shown, in order.
    pub fn panels(&self) -> Vec<(String, String)> {
        self.panels.borrow().clone()
    }

    pub fn panel_bodies(&self, title: &str) -> Vec<String> {
        self.panels
            .borrow()
            .iter()
            .filter(|(t, _)| t == title)
            .map(|(_, body)| body.clone())
            .collect()
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes.borrow().clone()
    }

    pub fn has_note(&self, line: &str) -> bool {
        self.notes.borrow().iter().any(|note| note == line)
    }
}

impl Console for ScriptedConsole {
    fn ask(&self, question: &str) -> Result<String> {
        self.questions.borrow_mut().push(question.to_string());
        Ok(self
            .answers
            .borrow_mut()
            .pop_front()
            .map(|answer| answer.trim().to_string())
            .unwrap_or_default())
    }

    fn show(&self, title: &str, body: &str) {
        self.panels
            .borrow_mut()
            .push((title.to_string(), body.to_string()));
    }

    fn note(&self, line: &str) {
        self.notes.borrow_mut().push(line.to_string());
    }
}

/// Program that reports queued outcomes, then repeats a fallback text.
#[derive(Debug)]
pub struct ScriptedProgram {
    outcomes: RefCell<VecDeque<ExecutionOutcome>>,
    fallback: String,
    runs: Cell<u32>,
}

impl ScriptedProgram {
    pub fn new<I, S>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outcomes: RefCell::new(outcomes.into_iter().map(ExecutionOutcome::new).collect()),
            fallback: String::new(),
            runs: Cell::new(0),
        }
    }

    /// Report the same text on every run.
    pub fn repeating(text: &str) -> Self {
        Self {
            fallback: text.to_string(),
            ..Self::new(Vec::<String>::new())
        }
    }

    pub fn runs(&self) -> u32 {
        self.runs.get()
    }
}

impl ProgramRunner for ScriptedProgram {
    fn run(&self) -> ExecutionOutcome {
        self.runs.set(self.runs.get() + 1);
        self.outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| ExecutionOutcome::new(self.fallback.clone()))
    }
}

/// Temporary project directory with a config fixture.
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.dir.path().join("improver_prompt.json")
    }

    /// Script-mode config with one refinement pass and the artifact inside
    /// the workspace.
    pub fn config(&self, max_iterations: u32) -> RunConfig {
        RunConfig {
            prompt_path: self.dir.path().join("prompt.md"),
            prompt_template: "Keep changes small.".to_string(),
            coder_model: "coder-model".to_string(),
            evaluator_model: "evaluator-model".to_string(),
            max_iterations,
            execution_command: "python main.py".to_string(),
            context_editable: vec!["main.py".to_string()],
            context_read_only: Vec::new(),
            evaluator: EvaluatorKind::Default,
            program_type: ProgramType::Script,
            startup_timeout: 5,
            health_check_command: None,
            refine_iterations: 1,
            output_limit_bytes: 100_000,
            artifact_path: self.artifact_path(),
            collaborator: CollaboratorConfig::default(),
        }
    }
}
