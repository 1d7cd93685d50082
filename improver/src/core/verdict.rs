//! Verdict parsing with failure defaults.
//!
//! An unreadable verdict is never treated as success: evaluation falls back to
//! a failed result and review falls back to "not passed".

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::response::{EVALUATION_SCHEMA, IDEA_SUMMARY_SCHEMA, REVIEW_SCHEMA, parse_validated};
use crate::core::types::{EvaluationResult, ReviewVerdict};

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    review_passed: bool,
}

/// Three-level summary of the operator's original idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaSummary {
    pub high_level: Value,
    pub mid_level: Value,
    pub low_level: Value,
}

pub fn parse_evaluation(response: &str) -> EvaluationResult {
    match parse_validated::<EvaluationResult>(response, EVALUATION_SCHEMA) {
        Ok(result) => result,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "evaluation response unreadable");
            EvaluationResult::parsing_error()
        }
    }
}

pub fn parse_review(response: &str) -> ReviewVerdict {
    match parse_validated::<ReviewResponse>(response, REVIEW_SCHEMA) {
        Ok(review) => ReviewVerdict {
            passed: review.review_passed,
        },
        Err(err) => {
            warn!(err = %format!("{err:#}"), "review response unreadable");
            ReviewVerdict { passed: false }
        }
    }
}

/// Parse the idea summary. Returns `None` when the response is unusable.
pub fn parse_idea_summary(response: &str) -> Option<IdeaSummary> {
    match parse_validated::<IdeaSummary>(response, IDEA_SUMMARY_SCHEMA) {
        Ok(summary) => Some(summary),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "idea summary unreadable");
            None
        }
    }
}
