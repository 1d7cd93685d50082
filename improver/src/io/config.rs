//! Session configuration loaded from `improver.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{EvaluatorKind, ProgramType};

pub const DEFAULT_CONFIG_PATH: &str = "improver.toml";

/// Session configuration (TOML).
///
/// Loaded once before the loop starts and never changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunConfig {
    /// Path to the prompt template file.
    #[serde(rename = "prompt")]
    pub prompt_path: PathBuf,

    /// Contents of the prompt template file, filled in by [`load_config`].
    #[serde(skip)]
    pub prompt_template: String,

    pub coder_model: String,
    pub evaluator_model: String,

    /// Upper bound on generate/execute/evaluate cycles.
    pub max_iterations: u32,

    /// Whitespace-tokenized command that runs the target program.
    pub execution_command: String,

    /// Files the coder may edit. Required, may be empty.
    pub context_editable: Vec<String>,
    /// Files the collaborators may read but not edit. Required, may be empty.
    pub context_read_only: Vec<String>,

    pub evaluator: EvaluatorKind,

    #[serde(default)]
    pub program_type: ProgramType,

    /// Seconds a long-running program must survive to count as started.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: u64,

    #[serde(default)]
    pub health_check_command: Option<String>,

    /// Number of idea refinement passes before synthesis.
    #[serde(default = "default_refine_iterations")]
    pub refine_iterations: u32,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    #[serde(default = "default_output_limit_bytes")]
    pub output_limit_bytes: usize,

    /// Where the idea summary is written once the operator confirms.
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    #[serde(default)]
    pub collaborator: CollaboratorConfig,
}

/// How the collaborator process is launched and supervised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollaboratorConfig {
    /// Executable to spawn for every collaborator call.
    pub command: String,

    /// Per-call wall-clock bound. Unset waits indefinitely.
    pub timeout_secs: Option<u64>,

    /// Extra attempts after a call times out.
    pub retries: u32,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            command: "aider".to_string(),
            timeout_secs: None,
            retries: 0,
        }
    }
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_startup_timeout() -> u64 {
    5
}

fn default_refine_iterations() -> u32 {
    3
}

fn default_output_limit_bytes() -> usize {
    1_000_000
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("improver_prompt.json")
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.execution_command.split_whitespace().next().is_none() {
            return Err(anyhow!("execution_command must be non-empty"));
        }
        if self.startup_timeout == 0 {
            return Err(anyhow!("startup_timeout must be > 0"));
        }
        if let Some(cmd) = &self.health_check_command {
            if cmd.split_whitespace().next().is_none() {
                return Err(anyhow!("health_check_command must be non-empty when set"));
            }
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.collaborator.command.trim().is_empty() {
            return Err(anyhow!("collaborator.command must be non-empty"));
        }
        if self.collaborator.timeout_secs == Some(0) {
            return Err(anyhow!("collaborator.timeout_secs must be > 0 when set"));
        }
        Ok(())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout)
    }
}

/// Load config from a TOML file and read its prompt template.
///
/// `prompt_override` takes precedence over the `prompt` key. Both files must
/// exist; nothing else is touched when either is missing.
pub fn load_config(path: &Path, prompt_override: Option<&Path>) -> Result<RunConfig> {
    if !path.exists() {
        return Err(anyhow!("config file not found: {}", path.display()));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut cfg: RunConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;

    if let Some(prompt) = prompt_override {
        cfg.prompt_path = prompt.to_path_buf();
    }
    if !cfg.prompt_path.exists() {
        return Err(anyhow!(
            "prompt file not found: {}",
            cfg.prompt_path.display()
        ));
    }
    cfg.prompt_template = fs::read_to_string(&cfg.prompt_path)
        .with_context(|| format!("read {}", cfg.prompt_path.display()))?;

    cfg.validate()?;
    debug!(
        config = %path.display(),
        prompt = %cfg.prompt_path.display(),
        program_type = ?cfg.program_type,
        max_iterations = cfg.max_iterations,
        "config loaded"
    );
    Ok(cfg)
}
