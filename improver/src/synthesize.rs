//! Idea refinement and structured prompt synthesis.

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::prompt::RequestTemplates;
use crate::core::structured::StructuredPrompt;
use crate::core::verdict::{IdeaSummary, parse_idea_summary};
use crate::io::collaborator::Collaborator;

/// Everything synthesis produces for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Idea after the last refinement pass.
    pub refined_idea: String,
    /// Prompt that drives every generation call.
    pub prompt: StructuredPrompt,
    /// Summary of the original idea, `None` when the response was unusable.
    pub summary: Option<IdeaSummary>,
}

/// Turns an operator idea into a [`StructuredPrompt`] through read-only
/// collaborator calls.
pub struct PromptSynthesizer<'a, C> {
    collaborator: &'a C,
    templates: &'a RequestTemplates,
    refine_iterations: u32,
    guidance: &'a str,
}

impl<'a, C: Collaborator> PromptSynthesizer<'a, C> {
    pub fn new(
        collaborator: &'a C,
        templates: &'a RequestTemplates,
        refine_iterations: u32,
        guidance: &'a str,
    ) -> Self {
        Self {
            collaborator,
            templates,
            refine_iterations,
            guidance,
        }
    }

    /// Refine `idea` `refine_iterations` times. Each pass sees only the
    /// previous pass's trimmed output. `on_refined` gets the 1-based pass
    /// number and the new idea.
    ///
    /// A failed call ends refinement early with the last idea obtained.
    pub fn refine<F: FnMut(u32, &str)>(&self, idea: &str, mut on_refined: F) -> Result<String> {
        let mut current = idea.to_string();
        for pass in 1..=self.refine_iterations {
            let request = self.templates.refine(&current)?;
            match self.collaborator.analyze(&request) {
                Ok(response) => {
                    current = response.trim().to_string();
                    debug!(pass, chars = current.len(), "idea refined");
                    on_refined(pass, &current);
                }
                Err(err) => {
                    warn!(pass, err = %format!("{err:#}"), "refinement call failed, keeping last idea");
                    break;
                }
            }
        }
        Ok(current)
    }

    /// Request the structured document for `refined`. Falls back to the raw
    /// response when it does not validate, and to `refined` itself when the
    /// call fails.
    pub fn synthesize(&self, refined: &str) -> Result<StructuredPrompt> {
        let request = self.templates.synthesize(refined, self.guidance)?;
        match self.collaborator.analyze(&request) {
            Ok(response) => Ok(StructuredPrompt::from_response(&response)),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "synthesis call failed, using the refined idea");
                Ok(StructuredPrompt::Raw(refined.to_string()))
            }
        }
    }

    /// Request the three-level summary of the operator's original idea.
    pub fn summarize(&self, original: &str) -> Result<Option<IdeaSummary>> {
        let request = self.templates.summary(original)?;
        match self.collaborator.analyze(&request) {
            Ok(response) => Ok(parse_idea_summary(&response)),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "summary call failed");
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(refine_iterations = self.refine_iterations))]
    pub fn run<F: FnMut(u32, &str)>(&self, idea: &str, on_refined: F) -> Result<Synthesis> {
        let refined_idea = self.refine(idea, on_refined)?;
        let prompt = self.synthesize(&refined_idea)?;
        let summary = self.summarize(idea)?;
        info!(raw = prompt.is_raw(), summary = summary.is_some(), "synthesis finished");
        Ok(Synthesis {
            refined_idea,
            prompt,
            summary,
        })
    }
}
