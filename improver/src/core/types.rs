//! Shared deterministic types for the improvement loop.
//!
//! These types define the values passed between loop stages. They carry no
//! I/O and every fallible stage degrades into one of them rather than an error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the target program is expected to behave when executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramType {
    /// Runs to completion; output is the evidence.
    #[default]
    Script,
    /// A service expected to keep running past the startup window.
    LongRunning,
}

/// Verdict strategy selector. Only one strategy exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    #[default]
    Default,
}

/// Textual evidence from one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub text: String,
}

impl ExecutionOutcome {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Structured verdict produced by the evaluator for one iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub success: bool,
    #[serde(default)]
    pub feedback: Option<String>,
}

impl EvaluationResult {
    /// Verdict used whenever the evaluator response cannot be validated.
    pub fn parsing_error() -> Self {
        Self {
            success: false,
            feedback: Some("Parsing error".to_string()),
        }
    }
}

/// Outcome of the automated half of the review gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewVerdict {
    pub passed: bool,
}

/// Outcome of the interactive half of the review gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HumanVerdict {
    pub accepted: bool,
}

/// Loop phases, in the order a session moves through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Synthesizing,
    Generating,
    Executing,
    Evaluating,
    Reviewing,
    Succeeded,
    Exhausted,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Synthesizing => "synthesizing",
            Phase::Generating => "generating",
            Phase::Executing => "executing",
            Phase::Evaluating => "evaluating",
            Phase::Reviewing => "reviewing",
            Phase::Succeeded => "succeeded",
            Phase::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session stopped before entering the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The operator supplied an empty idea.
    NoIdea,
    /// The operator declined the rendered structured prompt.
    Declined,
}

/// Terminal status of a session. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Aborted(AbortReason),
    /// The iteration budget ran out without a successful evaluation.
    Exhausted,
    /// The loop succeeded but the automated final review did not pass.
    ReviewFailed,
    /// The automated review passed but the operator rejected the result.
    HumanRejected,
    /// Both review stages accepted the result.
    Accepted,
}

impl SessionStatus {
    pub fn is_success(self) -> bool {
        matches!(self, SessionStatus::Accepted)
    }
}
