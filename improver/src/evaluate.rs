//! Outcome evaluation through the evaluator collaborator.

use tracing::{info, instrument, warn};

use crate::core::prompt::RequestTemplates;
use crate::core::types::{EvaluationResult, ExecutionOutcome};
use crate::core::verdict::parse_evaluation;
use crate::io::collaborator::Collaborator;

/// Asks a collaborator whether an execution outcome meets the goals.
pub struct OutcomeEvaluator<'a, C> {
    collaborator: &'a C,
    templates: &'a RequestTemplates,
}

impl<'a, C: Collaborator> OutcomeEvaluator<'a, C> {
    pub fn new(collaborator: &'a C, templates: &'a RequestTemplates) -> Self {
        Self {
            collaborator,
            templates,
        }
    }

    /// An unreadable verdict counts as failure with feedback "Parsing error".
    /// A failed collaborator call counts as failure too, with the error as
    /// feedback.
    #[instrument(skip_all, fields(outcome_bytes = outcome.text.len()))]
    pub fn evaluate(&self, outcome: &ExecutionOutcome) -> EvaluationResult {
        let response = self
            .templates
            .evaluate(&outcome.text)
            .and_then(|request| self.collaborator.analyze(&request));
        let result = match response {
            Ok(response) => parse_evaluation(&response),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "evaluation call failed");
                call_failed(&err)
            }
        };
        info!(success = result.success, "outcome evaluated");
        result
    }
}

fn call_failed(err: &anyhow::Error) -> EvaluationResult {
    EvaluationResult {
        success: false,
        feedback: Some(format!("Evaluation error: {err:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedCollaborator;

    #[test]
    fn sends_outcome_text_and_parses_verdict() {
        let templates = RequestTemplates::new();
        let collaborator = ScriptedCollaborator::new([
            "Looks fine.\n```json\n{\"success\": true, \"feedback\": null}\n```",
        ]);
        let evaluator = OutcomeEvaluator::new(&collaborator, &templates);

        let result = evaluator.evaluate(&ExecutionOutcome::new("ok: 3 tests passed\n"));
        assert_eq!(
            result,
            EvaluationResult {
                success: true,
                feedback: None
            }
        );
        assert!(collaborator.analyze_prompts()[0].contains("ok: 3 tests passed"));
        assert_eq!(collaborator.apply_count(), 0);
    }

    #[test]
    fn unreadable_verdict_is_failure() {
        let templates = RequestTemplates::new();
        let collaborator = ScriptedCollaborator::new(["I think it worked!"]);
        let evaluator = OutcomeEvaluator::new(&collaborator, &templates);

        let result = evaluator.evaluate(&ExecutionOutcome::new(""));
        assert_eq!(result, EvaluationResult::parsing_error());
    }

    #[test]
    fn failed_call_is_a_failed_verdict() {
        let templates = RequestTemplates::new();
        let collaborator = ScriptedCollaborator::default();
        let evaluator = OutcomeEvaluator::new(&collaborator, &templates);

        let result = evaluator.evaluate(&ExecutionOutcome::new("ok"));
        assert!(!result.success);
        let feedback = result.feedback.expect("feedback");
        assert!(feedback.starts_with("Evaluation error: "), "{feedback}");
        assert_eq!(collaborator.analyze_prompts().len(), 1);
    }
}
