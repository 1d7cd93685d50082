//! Two-stage acceptance: an automated review, then the operator.

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::prompt::RequestTemplates;
use crate::core::types::{HumanVerdict, ReviewVerdict, SessionStatus};
use crate::core::verdict::parse_review;
use crate::io::collaborator::Collaborator;
use crate::io::console::{Console, is_affirmative};

pub const REVIEW_QUESTION: &str = "Does the final review meet your expectations? (y/n):";

pub struct ReviewGate<'a, C, K> {
    collaborator: &'a C,
    console: &'a K,
    templates: &'a RequestTemplates,
}

impl<'a, C: Collaborator, K: Console> ReviewGate<'a, C, K> {
    pub fn new(collaborator: &'a C, console: &'a K, templates: &'a RequestTemplates) -> Self {
        Self {
            collaborator,
            console,
            templates,
        }
    }

    /// A failed review call counts as a failed review.
    pub fn automated(&self) -> ReviewVerdict {
        let response = self
            .templates
            .review()
            .and_then(|request| self.collaborator.analyze(&request));
        match response {
            Ok(response) => parse_review(&response),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "review call failed");
                ReviewVerdict { passed: false }
            }
        }
    }

    pub fn human(&self) -> Result<HumanVerdict> {
        let answer = self.console.ask(REVIEW_QUESTION)?;
        Ok(HumanVerdict {
            accepted: is_affirmative(&answer),
        })
    }

    /// Run both stages. The operator is only asked when the automated review
    /// passes.
    #[instrument(skip_all)]
    pub fn run(&self) -> Result<SessionStatus> {
        self.console.note("Performing final automated review...");
        let review = self.automated();
        info!(passed = review.passed, "automated review finished");
        if !review.passed {
            self.console.note("Final automated review FAILED.");
            return Ok(SessionStatus::ReviewFailed);
        }
        self.console.note("Final automated review PASSED!");

        let verdict = self.human()?;
        info!(accepted = verdict.accepted, "human verification finished");
        if verdict.accepted {
            self.console.note("Human verification PASSED!");
            self.console.note("Project updated successfully!");
            Ok(SessionStatus::Accepted)
        } else {
            self.console
                .note("Human verification FAILED. Please review the changes.");
            Ok(SessionStatus::HumanRejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedCollaborator, ScriptedConsole};

    #[test]
    fn failed_review_skips_the_operator() {
        let templates = RequestTemplates::new();
        let collaborator = ScriptedCollaborator::new([r#"{"review_passed": false}"#]);
        let console = ScriptedConsole::new(["y"]);

        let status = ReviewGate::new(&collaborator, &console, &templates)
            .run()
            .expect("review");
        assert_eq!(status, SessionStatus::ReviewFailed);
        assert!(console.questions().is_empty());
        assert!(console.has_note("Final automated review FAILED."));
    }

    #[test]
    fn unreadable_review_counts_as_failed() {
        let templates = RequestTemplates::new();
        let collaborator = ScriptedCollaborator::new(["Everything looks great to me."]);
        let console = ScriptedConsole::new(["y"]);

        let status = ReviewGate::new(&collaborator, &console, &templates)
            .run()
            .expect("review");
        assert_eq!(status, SessionStatus::ReviewFailed);
        assert!(console.questions().is_empty());
    }

    #[test]
    fn operator_decides_after_passing_review() {
        let templates = RequestTemplates::new();
        for (answer, expected) in [
            ("y", SessionStatus::Accepted),
            (" Y ", SessionStatus::Accepted),
            ("n", SessionStatus::HumanRejected),
            ("yes", SessionStatus::HumanRejected),
        ] {
            let collaborator = ScriptedCollaborator::new([r#"{"review_passed": true}"#]);
            let console = ScriptedConsole::new([answer]);
            let status = ReviewGate::new(&collaborator, &console, &templates)
                .run()
                .expect("review");
            assert_eq!(status, expected, "answer {answer:?}");
            assert_eq!(console.questions(), vec![REVIEW_QUESTION.to_string()]);
        }
    }

    #[test]
    fn review_never_edits() {
        let templates = RequestTemplates::new();
        let collaborator = ScriptedCollaborator::new([r#"{"review_passed": true}"#]);
        let console = ScriptedConsole::new(["n"]);
        ReviewGate::new(&collaborator, &console, &templates)
            .run()
            .expect("review");
        assert_eq!(collaborator.apply_count(), 0);
        assert!(collaborator.analyze_prompts()[0].contains("Do not make any code changes."));
    }

    #[test]
    fn failed_review_call_skips_the_operator() {
        let templates = RequestTemplates::new();
        let collaborator = ScriptedCollaborator::default();
        let console = ScriptedConsole::new(["y"]);

        let status = ReviewGate::new(&collaborator, &console, &templates)
            .run()
            .expect("review");
        assert_eq!(status, SessionStatus::ReviewFailed);
        assert!(console.questions().is_empty());
        assert!(console.has_note("Final automated review FAILED."));
        assert_eq!(collaborator.analyze_prompts().len(), 1);
    }
}
