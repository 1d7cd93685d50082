//! Session orchestration: idea intake, synthesis, the bounded improvement
//! loop, and the review gate.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::prompt::RequestTemplates;
use crate::core::types::{AbortReason, EvaluationResult, ExecutionOutcome, Phase, SessionStatus};
use crate::evaluate::OutcomeEvaluator;
use crate::execute::ProgramRunner;
use crate::io::artifact::write_json;
use crate::io::collaborator::Collaborator;
use crate::io::config::RunConfig;
use crate::io::console::{Console, is_affirmative};
use crate::review::ReviewGate;
use crate::synthesize::PromptSynthesizer;

pub const IDEA_QUESTION: &str = "Enter your high-level idea:";
pub const CONFIRM_QUESTION: &str = "Do you want to run this prompt? (y/n):";

/// Progress reported by [`run_loop`] as it moves through an iteration.
#[derive(Debug, Clone, Copy)]
pub enum LoopEvent<'a> {
    Started { iteration: u32, max_iterations: u32 },
    /// `error` carries the failure when the coder could not apply the prompt.
    Generated { iteration: u32, error: Option<&'a str> },
    Executed { iteration: u32, outcome: &'a ExecutionOutcome },
    Evaluated { iteration: u32, result: &'a EvaluationResult },
}

/// Reason why `run_loop` stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStop {
    /// An evaluation reported success.
    Succeeded,
    /// `max_iterations` cycles ran without success.
    Exhausted,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub iterations: u32,
    pub last_evaluation: Option<EvaluationResult>,
    pub stop: LoopStop,
}

/// Run generate/execute/evaluate cycles until an evaluation succeeds or
/// `max_iterations` cycles have run. The same `prompt` drives every cycle.
///
/// Collaborator failures never stop the loop. A failed generation skips
/// execution and its error becomes the outcome the evaluator judges; a failed
/// evaluation counts as an unsuccessful one.
pub fn run_loop<C, V, P, F>(
    prompt: &str,
    max_iterations: u32,
    coder: &C,
    evaluator: &OutcomeEvaluator<'_, V>,
    program: &P,
    mut on_event: F,
) -> LoopOutcome
where
    C: Collaborator,
    V: Collaborator,
    P: ProgramRunner,
    F: FnMut(LoopEvent<'_>),
{
    let mut last_evaluation = None;
    for iteration in 1..=max_iterations {
        on_event(LoopEvent::Started {
            iteration,
            max_iterations,
        });

        info!(phase = %Phase::Generating, iteration);
        let generation_error = coder.apply(prompt).err().map(|err| {
            warn!(iteration, err = %format!("{err:#}"), "code generation failed");
            format!("{err:#}")
        });
        on_event(LoopEvent::Generated {
            iteration,
            error: generation_error.as_deref(),
        });

        let outcome = match generation_error {
            Some(err) => ExecutionOutcome::new(format!("Code generation failed: {err}")),
            None => {
                info!(phase = %Phase::Executing, iteration);
                program.run()
            }
        };
        on_event(LoopEvent::Executed {
            iteration,
            outcome: &outcome,
        });

        info!(phase = %Phase::Evaluating, iteration);
        let result = evaluator.evaluate(&outcome);
        on_event(LoopEvent::Evaluated {
            iteration,
            result: &result,
        });

        let succeeded = result.success;
        last_evaluation = Some(result);
        if succeeded {
            info!(phase = %Phase::Succeeded, iteration);
            return LoopOutcome {
                iterations: iteration,
                last_evaluation,
                stop: LoopStop::Succeeded,
            };
        }
    }

    info!(phase = %Phase::Exhausted, max_iterations);
    LoopOutcome {
        iterations: max_iterations,
        last_evaluation,
        stop: LoopStop::Exhausted,
    }
}

/// Terminal result of [`Session::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub status: SessionStatus,
    /// Generate/execute/evaluate cycles that ran.
    pub iterations: u32,
    pub last_evaluation: Option<EvaluationResult>,
}

impl SessionReport {
    fn aborted(reason: AbortReason) -> Self {
        Self {
            status: SessionStatus::Aborted(reason),
            iterations: 0,
            last_evaluation: None,
        }
    }
}

/// One improvement session over a loaded configuration.
///
/// `coder` serves synthesis, generation and the final review; `evaluator`
/// judges execution outcomes.
pub struct Session<'a, C, V, P, K> {
    config: &'a RunConfig,
    coder: &'a C,
    evaluator: &'a V,
    program: &'a P,
    console: &'a K,
    templates: RequestTemplates,
}

impl<'a, C, V, P, K> Session<'a, C, V, P, K>
where
    C: Collaborator,
    V: Collaborator,
    P: ProgramRunner,
    K: Console,
{
    pub fn new(
        config: &'a RunConfig,
        coder: &'a C,
        evaluator: &'a V,
        program: &'a P,
        console: &'a K,
    ) -> Self {
        Self {
            config,
            coder,
            evaluator,
            program,
            console,
            templates: RequestTemplates::new(),
        }
    }

    #[instrument(skip_all, fields(max_iterations = self.config.max_iterations))]
    pub fn run(&self) -> Result<SessionReport> {
        let idea = self.console.ask(IDEA_QUESTION)?;
        if idea.trim().is_empty() {
            self.console.note("No idea provided. Exiting.");
            return Ok(SessionReport::aborted(AbortReason::NoIdea));
        }

        info!(phase = %Phase::Synthesizing);
        let refine_iterations = self.config.refine_iterations;
        let synthesis = PromptSynthesizer::new(
            self.coder,
            &self.templates,
            refine_iterations,
            &self.config.prompt_template,
        )
        .run(idea.trim(), |pass, refined| {
            self.console
                .show(&format!("Refined Idea ({pass}/{refine_iterations})"), refined);
        })?;

        let prompt = synthesis.prompt.render();
        if synthesis.prompt.is_raw() {
            self.console
                .note("Structured prompt could not be parsed; using the raw response.");
        }
        self.console.show("Generated Structured Prompt", &prompt);

        let answer = self.console.ask(CONFIRM_QUESTION)?;
        if !is_affirmative(&answer) {
            self.console.note("Prompt execution canceled.");
            return Ok(SessionReport::aborted(AbortReason::Declined));
        }

        match &synthesis.summary {
            Some(summary) => {
                write_json(&self.config.artifact_path, summary)?;
                self.console.note(&format!(
                    "Prompt saved to: {}",
                    self.config.artifact_path.display()
                ));
            }
            None => warn!("idea summary unavailable, artifact not written"),
        }

        let evaluator = OutcomeEvaluator::new(self.evaluator, &self.templates);
        let outcome = run_loop(
            &prompt,
            self.config.max_iterations,
            self.coder,
            &evaluator,
            self.program,
            |event| self.report(event),
        );

        let status = match outcome.stop {
            LoopStop::Exhausted => {
                self.console
                    .note("Failed to achieve success within maximum iterations");
                SessionStatus::Exhausted
            }
            LoopStop::Succeeded => {
                info!(phase = %Phase::Reviewing);
                ReviewGate::new(self.coder, self.console, &self.templates).run()?
            }
        };

        info!(?status, iterations = outcome.iterations, "session finished");
        Ok(SessionReport {
            status,
            iterations: outcome.iterations,
            last_evaluation: outcome.last_evaluation,
        })
    }

    fn report(&self, event: LoopEvent<'_>) {
        match event {
            LoopEvent::Started {
                iteration,
                max_iterations,
            } => {
                self.console
                    .note(&format!("\n==== Iteration {iteration}/{max_iterations} ===="));
                self.console
                    .note("Generating/updating code based on the prompt...");
            }
            LoopEvent::Generated { error: None, .. } => {
                self.console.note("Executing the generated code...");
            }
            LoopEvent::Generated {
                error: Some(err), ..
            } => {
                self.console.note(&format!("Code generation failed: {err}"));
            }
            LoopEvent::Executed { outcome, .. } => {
                self.console.show("Execution Output", &outcome.text);
            }
            LoopEvent::Evaluated { iteration, result } => {
                let feedback = result.feedback.as_deref().unwrap_or("None");
                self.console.show(
                    "Evaluation Result",
                    &format!("Success: {}\nFeedback: {feedback}", result.success),
                );
                if result.success {
                    self.console
                        .note("Automated evaluation indicates success!");
                } else {
                    self.console
                        .note("Automated evaluation did not meet goals.");
                    if iteration < self.config.max_iterations {
                        self.console.note(
                            "Repeating the automated process with updated code generation...",
                        );
                    }
                }
            }
        }
    }
}
