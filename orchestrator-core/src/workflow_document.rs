//! The data model produced by parsing a markdown-originated workflow
//! document, and the translation from that model into a
//! [`WorkflowDefinition`](crate::models::WorkflowDefinition).
//!
//! Turning the markdown source itself into typed sections happens upstream
//! of this crate; [`translate`] only needs the document already split into
//! the schema below.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{OrchestratorError, Result},
    models::{
        StepType, VariableDefinition, VariableType, WorkflowDefinition, WorkflowMetadata,
        WorkflowStep,
    },
    validation::WorkflowValidator,
};

/// Tag for one of a markdown workflow document's top-level sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSection {
    Metadata,
    Variables,
    Steps,
    Description,
    Notes,
    Unknown,
}

/// One entry from a document's Variables section, before it is resolved
/// into a [`VariableDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVariable {
    pub name: String,
    pub var_type: VariableType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// One entry from a document's Steps section. `step_type` ranges over the
/// full document schema, including `Delay` and `SubWorkflow`, which the
/// core engine does not interpret; [`translate`] carries them through
/// unchanged so a caller can remap them before submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentStep {
    pub id: String,
    pub step_type: StepType,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub condition: Option<String>,
}

/// A markdown-originated workflow document, already split into its typed
/// sections by an upstream parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkdownWorkflowDocument {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub variables: Vec<DocumentVariable>,
    #[serde(default)]
    pub steps: Vec<DocumentStep>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Which sections the source document actually contained. A document
    /// missing its Steps section is rejected even if `steps` happens to be
    /// empty for some other reason.
    #[serde(default)]
    pub sections_present: Vec<DocumentSection>,
}

/// Translates a parsed markdown-originated document into a
/// [`WorkflowDefinition`] the engine can validate and run.
///
/// Only the Metadata and Steps sections are mandatory; Variables,
/// Description, and Notes may be absent. `Delay` and `SubWorkflow` steps
/// pass through untouched — the core engine cannot run them, so a caller
/// needing those semantics must translate them onto `Task`/`Loop` steps
/// before submitting the result to [`crate::workflow_engine::WorkflowEngine`].
pub fn translate(doc: &MarkdownWorkflowDocument) -> Result<WorkflowDefinition> {
    if doc.id.trim().is_empty() {
        return Err(OrchestratorError::ValidationFailed(
            "document Metadata section is missing an id".to_string(),
        ));
    }
    if doc.name.trim().is_empty() {
        return Err(OrchestratorError::ValidationFailed(
            "document Metadata section is missing a name".to_string(),
        ));
    }
    if !doc.sections_present.contains(&DocumentSection::Steps) {
        return Err(OrchestratorError::ValidationFailed(
            "document has no Steps section".to_string(),
        ));
    }
    if doc.steps.is_empty() {
        return Err(OrchestratorError::ValidationFailed(
            "document's Steps section contains no steps".to_string(),
        ));
    }

    let mut variables = HashMap::with_capacity(doc.variables.len());
    for v in &doc.variables {
        if v.name.trim().is_empty() {
            return Err(OrchestratorError::ValidationFailed(
                "document Variables section contains an unnamed variable".to_string(),
            ));
        }
        variables.insert(
            v.name.clone(),
            VariableDefinition {
                name: v.name.clone(),
                var_type: v.var_type,
                default: v.default.clone(),
                required: v.required,
                description: v.description.clone(),
            },
        );
    }

    let mut steps = Vec::with_capacity(doc.steps.len());
    for s in &doc.steps {
        let mut step = WorkflowStep::new(s.id.clone(), s.step_type)
            .with_command(s.command.clone())
            .with_depends_on(s.depends_on.clone());
        if let Some(condition) = &s.condition {
            step = step.with_condition(condition.clone());
        }
        for (name, value) in &s.parameters {
            step = step.with_parameter(name.clone(), value.clone());
        }
        steps.push(step);
    }

    let metadata = WorkflowMetadata {
        author: doc.author.clone(),
        version: doc.version.clone(),
        tags: doc.tags.clone(),
        created_at: doc.created_at,
    };

    let definition = WorkflowDefinition { id: doc.id.clone(), name: doc.name.clone(), steps, variables, metadata };

    WorkflowValidator::validate(&definition)?;

    Ok(definition)
}
