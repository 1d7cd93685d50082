//! Structured task prompt: the validated document and its markdown rendering.
//!
//! Rendering is a pure function of the parsed document, so identical JSON
//! always yields a byte-identical prompt.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::response::{STRUCTURED_PROMPT_SCHEMA, parse_validated};

/// Parsed structured prompt document. Missing sections default to empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptDocument {
    pub high_level_goals: Vec<String>,
    pub mid_level_goals: Vec<String>,
    pub implementation_guidelines: ImplementationGuidelines,
    pub project_context: ProjectContext,
    pub low_level_goals: Vec<LowLevelGoal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplementationGuidelines {
    pub technical_details: Vec<String>,
    pub dependencies: Vec<String>,
    pub coding_standards: Vec<String>,
    pub other_guidance: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectContext {
    pub beginning_files: Vec<String>,
    pub ending_files: Vec<String>,
}

/// One atomic task entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowLevelGoal {
    pub task: String,
    pub prompt: String,
    pub file: String,
    pub function: String,
    pub details: String,
}

/// The prompt that drives every generation call of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredPrompt {
    /// The collaborator returned a valid document.
    Document(PromptDocument),
    /// The collaborator response could not be validated; used verbatim.
    Raw(String),
}

impl StructuredPrompt {
    /// Parse a synthesis response, falling back to the raw text on any failure.
    pub fn from_response(response: &str) -> Self {
        match parse_validated::<PromptDocument>(response, STRUCTURED_PROMPT_SCHEMA) {
            Ok(doc) => StructuredPrompt::Document(doc),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "structured prompt unreadable, using raw response");
                StructuredPrompt::Raw(response.to_string())
            }
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, StructuredPrompt::Raw(_))
    }

    /// Text sent to the collaborator for generation.
    pub fn render(&self) -> String {
        match self {
            StructuredPrompt::Document(doc) => render_document(doc),
            StructuredPrompt::Raw(raw) => raw.clone(),
        }
    }
}

/// Render a document into the fixed markdown layout.
pub fn render_document(doc: &PromptDocument) -> String {
    let mut out = String::new();
    out.push_str("# Architect Prompt Template\n");
    out.push_str("Process this file working through each step to ensure each objective is met.\n\n");

    out.push_str("## High Level Goals\n\n");
    push_bullets(&mut out, &doc.high_level_goals);

    out.push_str("\n## Mid Level Goals\n\n");
    push_bullets(&mut out, &doc.mid_level_goals);

    out.push_str("\n## Implementation Guidelines\n");
    let guidelines = &doc.implementation_guidelines;
    push_bullets(&mut out, &guidelines.technical_details);
    push_bullets(&mut out, &guidelines.dependencies);
    push_bullets(&mut out, &guidelines.coding_standards);
    push_bullets(&mut out, &guidelines.other_guidance);

    out.push_str("\n## Project Context\n\n");
    out.push_str("### Beginning files\n");
    push_bullets(&mut out, &doc.project_context.beginning_files);
    out.push_str("\n### Ending files\n");
    push_bullets(&mut out, &doc.project_context.ending_files);

    out.push_str("\n## Low Level Goals\n");
    out.push_str("> Ordered from first to last\n\n");
    for (idx, goal) in doc.low_level_goals.iter().enumerate() {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{}. **{}**  \n\
             ```code-example\n\
             What instructions would you need to complete this task? {}\n\
             What file do you want to work on? {}\n\
             What function do you want to work on? {}\n\
             What are details you want to add to ensure consistency? {}\n\
             ```\n\n",
            idx + 1,
            goal.task,
            goal.prompt,
            goal.file,
            goal.function,
            goal.details,
        );
    }
    out
}

fn push_bullets(out: &mut String, items: &[String]) {
    for item in items {
        out.push_str("- ");
        out.push_str(item);
        out.push('\n');
    }
}
