//! Concrete process classes

use super::parameter::Parameter;
use super::step::WorkflowStep;
use crate::requirements::Requirement;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const CWL_VERSION: &str = "v1.2";

fn default_cwl_version() -> String {
    CWL_VERSION.to_string()
}

/// A wrapped command line program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandLineTool {
    pub id: String,
    #[serde(default = "default_cwl_version")]
    pub cwl_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<JsonValue>,
    #[serde(default)]
    pub inputs: Vec<Parameter>,
    #[serde(default)]
    pub outputs: Vec<Parameter>,
    /// A single string or a list of strings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_command: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<Requirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Requirement>>,
    /// Namespaces, schema metadata and any other key not modelled above
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

impl CommandLineTool {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cwl_version: default_cwl_version(),
            label: None,
            doc: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            base_command: None,
            arguments: None,
            stdout: None,
            stderr: None,
            requirements: None,
            hints: None,
            extra: IndexMap::new(),
        }
    }
}

/// A graph of steps with workflow-level inputs and outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    #[serde(default = "default_cwl_version")]
    pub cwl_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<JsonValue>,
    #[serde(default)]
    pub inputs: Vec<Parameter>,
    #[serde(default)]
    pub outputs: Vec<Parameter>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<Requirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Requirement>>,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

impl Workflow {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cwl_version: default_cwl_version(),
            label: None,
            doc: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            steps: Vec::new(),
            requirements: None,
            hints: None,
            extra: IndexMap::new(),
        }
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|step| step.id == id)
    }

    /// True if the workflow declares a requirement of this class.
    pub fn requires(&self, class: &str) -> bool {
        self.requirements
            .iter()
            .flatten()
            .any(|requirement| requirement.class() == class)
    }
}
