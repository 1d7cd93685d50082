//! Collaborator request rendering.
//!
//! Every request the loop sends has a fixed shape; only the interpolated
//! values change between calls.

use anyhow::Result;
use minijinja::{Environment, context};

const REFINE_TEMPLATE: &str = include_str!("../prompts/refine.md");
const SYNTHESIZE_TEMPLATE: &str = include_str!("../prompts/synthesize.md");
const SUMMARY_TEMPLATE: &str = include_str!("../prompts/summary.md");
const EVALUATE_TEMPLATE: &str = include_str!("../prompts/evaluate.md");
const REVIEW_TEMPLATE: &str = include_str!("../prompts/review.md");

/// Template engine wrapper around minijinja.
pub struct RequestTemplates {
    env: Environment<'static>,
}

impl Default for RequestTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestTemplates {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("refine", REFINE_TEMPLATE)
            .expect("refine template should be valid");
        env.add_template("synthesize", SYNTHESIZE_TEMPLATE)
            .expect("synthesize template should be valid");
        env.add_template("summary", SUMMARY_TEMPLATE)
            .expect("summary template should be valid");
        env.add_template("evaluate", EVALUATE_TEMPLATE)
            .expect("evaluate template should be valid");
        env.add_template("review", REVIEW_TEMPLATE)
            .expect("review template should be valid");
        Self { env }
    }

    /// Ask the collaborator to specialize `idea` against the repository.
    pub fn refine(&self, idea: &str) -> Result<String> {
        let template = self.env.get_template("refine")?;
        Ok(template.render(context! { idea => idea })?)
    }

    /// Ask for the structured task document. `guidance` is the operator's
    /// prompt template text and is omitted when blank.
    pub fn synthesize(&self, idea: &str, guidance: &str) -> Result<String> {
        let template = self.env.get_template("synthesize")?;
        let guidance = guidance.trim();
        Ok(template.render(context! {
            idea => idea,
            guidance => (!guidance.is_empty()).then_some(guidance),
        })?)
    }

    /// Ask for the three-level summary persisted as the session artifact.
    pub fn summary(&self, idea: &str) -> Result<String> {
        let template = self.env.get_template("summary")?;
        Ok(template.render(context! { idea => idea })?)
    }

    pub fn evaluate(&self, output: &str) -> Result<String> {
        let template = self.env.get_template("evaluate")?;
        Ok(template.render(context! { output => output })?)
    }

    pub fn review(&self) -> Result<String> {
        let template = self.env.get_template("review")?;
        Ok(template.render(context! {})?)
    }
}
