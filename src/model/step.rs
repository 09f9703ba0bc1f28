//! Workflow steps and their step-scoped inputs and outputs
//!
//! Step IO entries are copies of the wrapped process parameters. Their types
//! are known when the step was produced by the step builder; steps read from
//! a document start untyped until the workflow builder resolves the wrapped
//! process and calls [`WorkflowStep::infer_types`].

use super::{deserialize_string_list, Process, RunRef, Source};
use crate::builder::ids::{generate_cwl_source_repr, parse_cwl_source_repr};
use crate::error::{CwlError, CwlResult};
use crate::requirements::Requirement;
use crate::runtime::fs_utils;
use crate::types::CwlType;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// How multiple scattered inputs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScatterMethod {
    Dotproduct,
    NestedCrossproduct,
    FlatCrossproduct,
}

impl fmt::Display for ScatterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScatterMethod::Dotproduct => "dotproduct",
            ScatterMethod::NestedCrossproduct => "nested_crossproduct",
            ScatterMethod::FlatCrossproduct => "flat_crossproduct",
        };
        f.write_str(name)
    }
}

/// A step input: either linked to a source or carrying a literal value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStepInput {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_merge: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pick_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,

    #[serde(skip)]
    pub cwl_type: Option<CwlType>,
    #[serde(skip)]
    pub optional: bool,
    #[serde(skip)]
    pub format: Option<String>,
    /// Literal value, written to the config document rather than the workflow
    #[serde(skip)]
    pub value: Option<Value>,
    /// Instance key of the step behind each source entry, when known
    #[serde(skip)]
    origins: Vec<Option<Uuid>>,
}

impl WorkflowStepInput {
    pub fn new(id: impl Into<String>, cwl_type: CwlType, optional: bool) -> Self {
        Self {
            id: id.into(),
            source: None,
            default: None,
            value_from: None,
            link_merge: None,
            pick_value: None,
            label: None,
            extra: IndexMap::new(),
            cwl_type: Some(cwl_type),
            optional,
            format: None,
            value: None,
            origins: Vec::new(),
        }
    }

    /// True when the input is bound to a source, a value or a default.
    pub fn is_set(&self) -> bool {
        self.source.is_some()
            || self.value.is_some()
            || self.default.is_some()
            || self.value_from.is_some()
    }

    /// True when the input has anything besides its id to write.
    fn has_wire_fields(&self) -> bool {
        self.source.is_some()
            || self.default.is_some()
            || self.value_from.is_some()
            || self.link_merge.is_some()
            || self.pick_value.is_some()
            || self.label.is_some()
            || !self.extra.is_empty()
    }

    fn typed(&self, step_id: &str) -> CwlResult<&CwlType> {
        self.cwl_type.as_ref().ok_or_else(|| {
            CwlError::UnsupportedCase(format!(
                "type of input {} on step {} is unknown",
                self.id, step_id
            ))
        })
    }

    fn assign(&mut self, step_id: &str, assignment: Assignment) -> CwlResult<()> {
        let sink = generate_cwl_source_repr(step_id, &self.id);
        let sink_type = self.typed(step_id)?.clone();
        match assignment {
            Assignment::Value(Value::Null) if self.optional => {
                self.value = None;
                self.source = None;
                self.origins.clear();
            }
            Assignment::Value(value) => {
                if !sink_type.is_value_assignable(&value) {
                    return Err(CwlError::incompatible_value(&sink, &sink_type, &value));
                }
                self.value = Some(value);
                self.source = None;
                self.origins.clear();
            }
            Assignment::Link(output) => {
                let source_type = output.typed()?;
                if *source_type != sink_type {
                    return Err(CwlError::incompatible_type(&sink, &sink_type, source_type));
                }
                self.source = Some(Source::Single(output.source()));
                self.origins = vec![Some(output.step_key)];
                self.value = None;
            }
            Assignment::Links(outputs) => {
                let items = sink_type.items().ok_or_else(|| {
                    CwlError::incompatible_type(
                        &sink,
                        format!("{} (fan-in needs an array input)", sink_type),
                        "multiple sources",
                    )
                })?;
                if outputs.is_empty() {
                    return Err(CwlError::UnsupportedCase(format!(
                        "empty source list for {}",
                        sink
                    )));
                }
                for output in &outputs {
                    let source_type = output.typed()?;
                    if source_type != items {
                        return Err(CwlError::incompatible_type(&sink, items, source_type));
                    }
                }
                self.source = Some(Source::Multiple(
                    outputs.iter().map(OutputRef::source).collect(),
                ));
                self.origins = outputs.iter().map(|output| Some(output.step_key)).collect();
                self.value = None;
            }
        }
        debug!(input = %sink, "assigned step input");
        Ok(())
    }

    /// Bind to a workflow-level input parameter.
    pub(crate) fn bind_workflow_input(&mut self, workflow_input_id: &str) {
        self.source = Some(Source::Single(workflow_input_id.to_string()));
        self.origins = vec![None];
    }

    /// Source entries paired with the instance key of their producing step.
    pub(crate) fn sources_with_origins(&self) -> Vec<(String, Option<Uuid>)> {
        let sources = match &self.source {
            None => return Vec::new(),
            Some(source) => source.entries(),
        };
        sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| (source, self.origins.get(i).copied().flatten()))
            .collect()
    }

    pub(crate) fn replace_sources(&mut self, sources: Vec<String>) {
        self.source = match self.source {
            Some(Source::Multiple(_)) => Some(Source::Multiple(sources)),
            _ => sources.into_iter().next().map(Source::Single),
        };
    }
}

/// A step output; on the wire only its id is written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawStepOutput", into = "String")]
pub struct WorkflowStepOutput {
    pub id: String,
    pub cwl_type: Option<CwlType>,
    pub format: Option<String>,
    /// Transient value, only set while bubbling nested defaults upward
    pub value: Option<Value>,
    /// Excluded from the outputs the workflow builder generates
    pub suppressed: bool,
}

impl WorkflowStepOutput {
    pub fn new(id: impl Into<String>, cwl_type: CwlType) -> Self {
        Self {
            id: id.into(),
            cwl_type: Some(cwl_type),
            format: None,
            value: None,
            suppressed: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStepOutput {
    Id(String),
    Record { id: String },
}

impl From<RawStepOutput> for WorkflowStepOutput {
    fn from(raw: RawStepOutput) -> Self {
        let id = match raw {
            RawStepOutput::Id(id) | RawStepOutput::Record { id } => id,
        };
        Self {
            id,
            cwl_type: None,
            format: None,
            value: None,
            suppressed: false,
        }
    }
}

impl From<WorkflowStepOutput> for String {
    fn from(output: WorkflowStepOutput) -> Self {
        output.id
    }
}

/// Result of looking up an id on a step; inputs and outputs may share ids.
#[derive(Debug, Clone, Copy)]
pub enum StepIo<'a> {
    Input(&'a WorkflowStepInput),
    Output(&'a WorkflowStepOutput),
    Both {
        input: &'a WorkflowStepInput,
        output: &'a WorkflowStepOutput,
    },
}

/// A handle on a step output, usable as the source of another step input
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRef {
    pub step_id: String,
    pub output_id: String,
    pub cwl_type: Option<CwlType>,
    step_key: Uuid,
}

impl OutputRef {
    /// `<step-id>/<output-id>`
    pub fn source(&self) -> String {
        generate_cwl_source_repr(&self.step_id, &self.output_id)
    }

    fn typed(&self) -> CwlResult<&CwlType> {
        self.cwl_type.as_ref().ok_or_else(|| {
            CwlError::UnsupportedCase(format!("type of output {} is unknown", self.source()))
        })
    }
}

/// What can be assigned to a step input
#[derive(Debug, Clone)]
pub enum Assignment {
    Value(Value),
    Link(OutputRef),
    /// Fan-in from several outputs
    Links(Vec<OutputRef>),
}

impl From<Value> for Assignment {
    fn from(value: Value) -> Self {
        Assignment::Value(value)
    }
}

impl From<OutputRef> for Assignment {
    fn from(output: OutputRef) -> Self {
        Assignment::Link(output)
    }
}

impl From<Vec<OutputRef>> for Assignment {
    fn from(outputs: Vec<OutputRef>) -> Self {
        Assignment::Links(outputs)
    }
}

/// A step of a workflow, wrapping exactly one process
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<JsonValue>,
    #[serde(rename = "in", default, serialize_with = "serialize_set_inputs")]
    pub inputs: Vec<WorkflowStepInput>,
    #[serde(rename = "out", default)]
    pub outputs: Vec<WorkflowStepOutput>,
    pub run: RunRef,
    #[serde(
        default,
        deserialize_with = "deserialize_string_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub scatter: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scatter_method: Option<ScatterMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<Requirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<Requirement>>,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,

    /// Identity of this step instance, stable across renames
    #[serde(skip, default = "Uuid::new_v4")]
    key: Uuid,
    /// The wrapped process, when the step was built from one in memory
    #[serde(skip)]
    wrapped: Option<Box<Process>>,
}

/// A clone is a new step instance and gets its own key; links made to the
/// original keep pointing at the original.
impl Clone for WorkflowStep {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            label: self.label.clone(),
            doc: self.doc.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            run: self.run.clone(),
            scatter: self.scatter.clone(),
            scatter_method: self.scatter_method,
            when: self.when.clone(),
            requirements: self.requirements.clone(),
            hints: self.hints.clone(),
            extra: self.extra.clone(),
            key: Uuid::new_v4(),
            wrapped: self.wrapped.clone(),
        }
    }
}

/// Inputs that would be written as a bare id are left out.
fn serialize_set_inputs<S: Serializer>(
    inputs: &[WorkflowStepInput],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(inputs.iter().filter(|input| input.has_wire_fields()))
}

impl WorkflowStep {
    pub fn new(
        id: impl Into<String>,
        run: RunRef,
        inputs: Vec<WorkflowStepInput>,
        outputs: Vec<WorkflowStepOutput>,
    ) -> Self {
        Self {
            id: id.into(),
            label: None,
            doc: None,
            inputs,
            outputs,
            run,
            scatter: Vec::new(),
            scatter_method: None,
            when: None,
            requirements: None,
            hints: None,
            extra: IndexMap::new(),
            key: Uuid::new_v4(),
            wrapped: None,
        }
    }

    pub(crate) fn key(&self) -> Uuid {
        self.key
    }

    pub(crate) fn with_wrapped(mut self, process: Process) -> Self {
        self.wrapped = Some(Box::new(process));
        self
    }

    /// The process this step was built from, if it is held in memory.
    pub fn wrapped(&self) -> Option<&Process> {
        self.wrapped.as_deref()
    }

    /// Look up an id among inputs and outputs.
    pub fn get(&self, id: &str) -> CwlResult<StepIo<'_>> {
        let input = self.inputs.iter().find(|input| input.id == id);
        let output = self.outputs.iter().find(|output| output.id == id);
        match (input, output) {
            (Some(input), Some(output)) => Ok(StepIo::Both { input, output }),
            (Some(input), None) => Ok(StepIo::Input(input)),
            (None, Some(output)) => Ok(StepIo::Output(output)),
            (None, None) => Err(CwlError::NoSuchInput {
                step: self.id.clone(),
                id: id.to_string(),
            }),
        }
    }

    pub fn input(&self, id: &str) -> CwlResult<&WorkflowStepInput> {
        self.inputs
            .iter()
            .find(|input| input.id == id)
            .ok_or_else(|| CwlError::NoSuchInput {
                step: self.id.clone(),
                id: id.to_string(),
            })
    }

    pub fn output(&self, id: &str) -> CwlResult<&WorkflowStepOutput> {
        self.outputs
            .iter()
            .find(|output| output.id == id)
            .ok_or_else(|| CwlError::NoSuchOutput {
                step: self.id.clone(),
                id: id.to_string(),
            })
    }

    /// Reference to one of this step's outputs, to link into another step.
    pub fn output_ref(&self, id: &str) -> CwlResult<OutputRef> {
        let output = self.output(id)?;
        Ok(OutputRef {
            step_id: self.id.clone(),
            output_id: output.id.clone(),
            cwl_type: output.cwl_type.clone(),
            step_key: self.key,
        })
    }

    /// Assign a value to an input or link it to upstream outputs.
    pub fn set_input(&mut self, id: &str, assignment: impl Into<Assignment>) -> CwlResult<()> {
        let step_id = self.id.clone();
        let names_output = self.outputs.iter().any(|output| output.id == id);
        match self.inputs.iter_mut().find(|input| input.id == id) {
            Some(input) => input.assign(&step_id, assignment.into()),
            None if names_output => Err(CwlError::OutputAssignment {
                step: step_id,
                id: id.to_string(),
            }),
            None => Err(CwlError::NoSuchInput {
                step: step_id,
                id: id.to_string(),
            }),
        }
    }

    /// Outputs are never writable.
    pub fn set_output(&mut self, id: &str, _assignment: impl Into<Assignment>) -> CwlResult<()> {
        Err(CwlError::OutputAssignment {
            step: self.id.clone(),
            id: id.to_string(),
        })
    }

    /// Do not generate a workflow output for this step output.
    pub fn suppress_output(&mut self, id: &str) -> CwlResult<()> {
        let step_id = self.id.clone();
        let output = self
            .outputs
            .iter_mut()
            .find(|output| output.id == id)
            .ok_or(CwlError::NoSuchOutput {
                step: step_id,
                id: id.to_string(),
            })?;
        output.suppressed = true;
        Ok(())
    }

    /// Fill in missing IO types from the wrapped process declaration.
    pub fn infer_types(&mut self, process: &Process) {
        let scattered: HashSet<&str> = self.scatter.iter().map(String::as_str).collect();
        for input in self.inputs.iter_mut().filter(|input| input.cwl_type.is_none()) {
            if let Some(parameter) = process.inputs().iter().find(|p| p.id == input.id) {
                let cwl_type = parameter.cwl_type.clone();
                input.cwl_type = Some(if scattered.contains(input.id.as_str()) {
                    cwl_type.promote()
                } else {
                    cwl_type
                });
                input.optional = parameter.optional || parameter.default.is_some();
                input.format = parameter.format.clone();
            }
        }
        for output in self.outputs.iter_mut().filter(|output| output.cwl_type.is_none()) {
            if let Some(parameter) = process.outputs().iter().find(|p| p.id == output.id) {
                let cwl_type = parameter.cwl_type.clone();
                output.cwl_type = Some(if scattered.is_empty() {
                    cwl_type
                } else {
                    cwl_type.promote()
                });
                output.format = parameter.format.clone();
            }
        }
    }

    /// Every input with an assigned value, serialized through its type.
    pub fn config(&self) -> CwlResult<IndexMap<String, JsonValue>> {
        let mut config = IndexMap::new();
        for input in &self.inputs {
            if let Some(value) = &input.value {
                let cwl_type = input.typed(&self.id)?;
                config.insert(input.id.clone(), cwl_type.serialize_value(value)?);
            }
        }
        Ok(config)
    }

    /// Write the config document as `<dir>/<step-id>.yaml`.
    pub fn save_config(&self, dir: impl AsRef<Path>) -> CwlResult<PathBuf> {
        let dir = fs_utils::directory_exists(dir)?;
        let path = dir.join(format!("{}.yaml", self.id));
        let content = serde_yaml::to_string(&self.config()?)?;
        fs_utils::write_file_atomic(&path, content)?;
        debug!(step = %self.id, path = %path.display(), "saved step config");
        Ok(path)
    }

    /// Step ids referenced by this step's sources, paired with their origin keys.
    pub(crate) fn upstream(&self) -> Vec<(String, Option<Uuid>)> {
        self.inputs
            .iter()
            .flat_map(|input| input.sources_with_origins())
            .filter_map(|(source, origin)| {
                parse_cwl_source_repr(&source).map(|(step, _)| (step.to_string(), origin))
            })
            .collect()
    }
}
