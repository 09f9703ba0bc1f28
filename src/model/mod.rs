//! CWL process model
//!
//! This module contains the in-memory representation of CWL documents:
//! processes (workflows and command line tools), their parameters and the
//! steps of a workflow. Documents are read through a [`Normalizer`] which
//! hands back a canonical structure; the model is deserialized from that
//! structure and serialized back with the wire field names.
//!
//! Resolution of `run` references across documents goes through a
//! [`ResolutionContext`] owned by the caller and threaded through every
//! recursive load, so a process referenced many times is only read once and
//! self-referential graphs terminate.

use crate::error::{CwlError, CwlResult};
use crate::parser::{LocalNormalizer, Normalizer};
use crate::requirements::Requirement;
use crate::runtime::fs_utils;
use crate::types::CwlType;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod parameter;
pub mod process;
pub mod step;

#[cfg(test)]
mod step_tests;

pub use parameter::{InputBinding, OutputBinding, Parameter};
pub use process::{CommandLineTool, Workflow, CWL_VERSION};
pub use step::{
    Assignment, OutputRef, ScatterMethod, StepIo, WorkflowStep, WorkflowStepInput,
    WorkflowStepOutput,
};

/// Source of a step input or workflow output: one reference or several (fan-in)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Single(String),
    Multiple(Vec<String>),
}

impl Source {
    /// All references, in order.
    pub fn entries(&self) -> Vec<String> {
        match self {
            Source::Single(source) => vec![source.clone()],
            Source::Multiple(sources) => sources.clone(),
        }
    }

    pub fn is_multiple(&self) -> bool {
        matches!(self, Source::Multiple(sources) if sources.len() > 1)
    }

    pub fn contains(&self, reference: &str) -> bool {
        match self {
            Source::Single(source) => source == reference,
            Source::Multiple(sources) => sources.iter().any(|source| source == reference),
        }
    }
}

/// The process a step runs: a reference (absolute URI) or an embedded document
#[derive(Debug, Clone)]
pub enum RunRef {
    Reference(String),
    Embedded(Box<Process>),
}

impl RunRef {
    /// Id of the referenced process.
    pub fn id(&self) -> &str {
        match self {
            RunRef::Reference(id) => id,
            RunRef::Embedded(process) => process.id(),
        }
    }
}

impl Serialize for RunRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RunRef::Reference(id) => serializer.serialize_str(id),
            RunRef::Embedded(process) => process.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RunRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match JsonValue::deserialize(deserializer)? {
            JsonValue::String(id) => Ok(RunRef::Reference(id)),
            document @ JsonValue::Object(_) => Process::from_document(document)
                .map(|process| RunRef::Embedded(Box::new(process)))
                .map_err(serde::de::Error::custom),
            other => Err(serde::de::Error::custom(format!(
                "run must be a reference or a process, got {}",
                other
            ))),
        }
    }
}

/// Accept a single string where a list of strings is expected.
pub(crate) fn deserialize_string_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
    })
}

/// A CWL process, discriminated on its `class` field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum Process {
    Workflow(Workflow),
    CommandLineTool(CommandLineTool),
}

impl From<Workflow> for Process {
    fn from(workflow: Workflow) -> Self {
        Process::Workflow(workflow)
    }
}

impl From<CommandLineTool> for Process {
    fn from(tool: CommandLineTool) -> Self {
        Process::CommandLineTool(tool)
    }
}

/// Anything `Process::load` can start from
#[derive(Debug, Clone)]
pub enum ProcessSource {
    /// A path or URI, read by the normalizer
    Uri(String),
    /// A raw document, canonicalized by the normalizer
    Document(JsonValue),
    /// An already constructed process
    Process(Process),
}

impl From<&str> for ProcessSource {
    fn from(uri: &str) -> Self {
        ProcessSource::Uri(uri.to_string())
    }
}

impl From<String> for ProcessSource {
    fn from(uri: String) -> Self {
        ProcessSource::Uri(uri)
    }
}

impl From<&Path> for ProcessSource {
    fn from(path: &Path) -> Self {
        ProcessSource::Uri(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for ProcessSource {
    fn from(path: PathBuf) -> Self {
        ProcessSource::from(path.as_path())
    }
}

impl From<JsonValue> for ProcessSource {
    fn from(document: JsonValue) -> Self {
        ProcessSource::Document(document)
    }
}

impl From<Process> for ProcessSource {
    fn from(process: Process) -> Self {
        ProcessSource::Process(process)
    }
}

/// Caller-owned id → process map shared across (recursive) loads and builds
#[derive(Debug, Default)]
pub struct ResolutionContext {
    processes: IndexMap<String, Process>,
    in_progress: HashSet<String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Process> {
        self.processes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.processes.contains_key(id)
    }

    /// Record a process; an existing entry with the same id is replaced.
    pub fn insert(&mut self, process: Process) {
        self.processes.insert(process.id().to_string(), process);
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.processes.keys().map(String::as_str)
    }

    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    fn is_resolving(&self, id: &str) -> bool {
        self.in_progress.contains(id)
    }
}

impl Process {
    pub fn id(&self) -> &str {
        match self {
            Process::Workflow(workflow) => &workflow.id,
            Process::CommandLineTool(tool) => &tool.id,
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        match self {
            Process::Workflow(workflow) => workflow.id = id.into(),
            Process::CommandLineTool(tool) => tool.id = id.into(),
        }
    }

    /// Value of the `class` discriminant.
    pub fn class(&self) -> &'static str {
        match self {
            Process::Workflow(_) => "Workflow",
            Process::CommandLineTool(_) => "CommandLineTool",
        }
    }

    pub fn cwl_version(&self) -> &str {
        match self {
            Process::Workflow(workflow) => &workflow.cwl_version,
            Process::CommandLineTool(tool) => &tool.cwl_version,
        }
    }

    /// Stem of the id's path, used as file name when saving.
    pub fn name(&self) -> String {
        let id = self.id();
        let path = match url::Url::parse(id) {
            Ok(url) => url.path().to_string(),
            Err(_) => id.to_string(),
        };
        let path = path.split('#').next().unwrap_or_default();
        Path::new(path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string())
    }

    pub fn inputs(&self) -> &[Parameter] {
        match self {
            Process::Workflow(workflow) => &workflow.inputs,
            Process::CommandLineTool(tool) => &tool.inputs,
        }
    }

    pub fn outputs(&self) -> &[Parameter] {
        match self {
            Process::Workflow(workflow) => &workflow.outputs,
            Process::CommandLineTool(tool) => &tool.outputs,
        }
    }

    pub fn requirements(&self) -> &[Requirement] {
        let requirements = match self {
            Process::Workflow(workflow) => &workflow.requirements,
            Process::CommandLineTool(tool) => &tool.requirements,
        };
        requirements.as_deref().unwrap_or_default()
    }

    /// Extra top-level keys, such as namespaces and schema metadata.
    pub fn extra(&self) -> &IndexMap<String, JsonValue> {
        match self {
            Process::Workflow(workflow) => &workflow.extra,
            Process::CommandLineTool(tool) => &tool.extra,
        }
    }

    pub fn is_workflow(&self) -> bool {
        matches!(self, Process::Workflow(_))
    }

    pub fn as_workflow(&self) -> Option<&Workflow> {
        match self {
            Process::Workflow(workflow) => Some(workflow),
            Process::CommandLineTool(_) => None,
        }
    }

    pub fn as_workflow_mut(&mut self) -> Option<&mut Workflow> {
        match self {
            Process::Workflow(workflow) => Some(workflow),
            Process::CommandLineTool(_) => None,
        }
    }

    pub fn as_tool(&self) -> Option<&CommandLineTool> {
        match self {
            Process::CommandLineTool(tool) => Some(tool),
            Process::Workflow(_) => None,
        }
    }

    /// Build a process from a canonical document.
    pub fn from_document(document: JsonValue) -> CwlResult<Process> {
        check_document(&document)?;
        let id = document
            .get("id")
            .and_then(JsonValue::as_str)
            .unwrap_or("<anonymous>")
            .to_string();
        serde_json::from_value(document).map_err(|e| CwlError::bad_document(id, e))
    }

    /// Canonical document of this process.
    pub fn to_document(&self) -> CwlResult<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }

    /// Load a process with the default local normalizer.
    pub fn load(
        source: impl Into<ProcessSource>,
        recursive: bool,
        context: &mut ResolutionContext,
    ) -> CwlResult<Process> {
        Self::load_with(&LocalNormalizer::default(), source, recursive, context)
    }

    /// Load a process, optionally resolving every `run` reference transitively.
    ///
    /// Every process encountered is recorded in `context`; references already
    /// present there are not read again.
    pub fn load_with(
        normalizer: &dyn Normalizer,
        source: impl Into<ProcessSource>,
        recursive: bool,
        context: &mut ResolutionContext,
    ) -> CwlResult<Process> {
        let process = match source.into() {
            ProcessSource::Process(process) => process,
            ProcessSource::Document(document) => {
                Process::from_document(normalizer.normalize_document(document, None)?)?
            }
            ProcessSource::Uri(uri) => {
                debug!(uri = %uri, "loading cwl document");
                Process::from_document(normalizer.normalize_uri(&uri)?)?
            }
        };

        if recursive {
            resolve_references(normalizer, &process, context)?;
        }

        context.insert(process.clone());
        Ok(process)
    }

    /// Write the document as `<dir>/<name>.cwl` and return its path.
    pub fn save(&self, dir: impl AsRef<Path>) -> CwlResult<PathBuf> {
        let dir = fs_utils::directory_exists(dir)?;
        let path = dir.join(format!("{}.cwl", self.name()));
        let content = serde_yaml::to_string(self)?;
        fs_utils::write_file_atomic(&path, content)?;
        info!(id = %self.id(), path = %path.display(), "saved cwl document");
        Ok(path)
    }
}

/// Load every process a workflow's steps refer to, depth first.
fn resolve_references(
    normalizer: &dyn Normalizer,
    process: &Process,
    context: &mut ResolutionContext,
) -> CwlResult<()> {
    let workflow = match process {
        Process::Workflow(workflow) => workflow,
        Process::CommandLineTool(_) => return Ok(()),
    };
    if !context.in_progress.insert(workflow.id.clone()) {
        return Ok(());
    }
    let result = resolve_steps(normalizer, workflow, context);
    context.in_progress.remove(&workflow.id);
    result
}

fn resolve_steps(
    normalizer: &dyn Normalizer,
    workflow: &Workflow,
    context: &mut ResolutionContext,
) -> CwlResult<()> {
    for step in &workflow.steps {
        match &step.run {
            RunRef::Reference(uri) => {
                if context.contains(uri) || context.is_resolving(uri) {
                    debug!(uri = %uri, "reference already resolved");
                    continue;
                }
                Process::load_with(normalizer, uri.as_str(), true, context)?;
            }
            RunRef::Embedded(embedded) => {
                resolve_references(normalizer, embedded, context)?;
                context.insert(embedded.as_ref().clone());
            }
        }
    }
    Ok(())
}

const PROCESS_CLASSES: [&str; 2] = ["Workflow", "CommandLineTool"];

/// Surface class and type errors with their own kinds before deserializing.
fn check_document(document: &JsonValue) -> CwlResult<()> {
    let id = document
        .get("id")
        .and_then(JsonValue::as_str)
        .unwrap_or("<anonymous>");
    let class = document
        .get("class")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| CwlError::bad_document(id, "missing process class"))?;
    if !PROCESS_CLASSES.contains(&class) {
        return Err(CwlError::UnsupportedProcessClass(class.to_string()));
    }
    for key in ["inputs", "outputs"] {
        if let Some(JsonValue::Array(parameters)) = document.get(key) {
            for parameter in parameters {
                if let Some(declared) = parameter.get("type") {
                    CwlType::from_wire(declared)?;
                }
            }
        }
    }
    if let Some(JsonValue::Array(steps)) = document.get("steps") {
        for step in steps {
            if let Some(run @ JsonValue::Object(_)) = step.get("run") {
                check_document(run)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn echo_tool() -> JsonValue {
        json!({
            "id": "file:///tools/echo.cwl",
            "cwlVersion": "v1.2",
            "class": "CommandLineTool",
            "baseCommand": "echo",
            "inputs": [
                {"id": "message", "type": "string", "inputBinding": {"position": 1}}
            ],
            "outputs": [
                {"id": "out", "type": "File", "outputBinding": {"glob": "out.txt"}}
            ],
            "stdout": "out.txt",
            "$namespaces": {"s": "https://schema.org/"},
            "s:softwareVersion": "1.0.0",
        })
    }

    #[test]
    fn test_from_document_dispatches_on_class() {
        let process = Process::from_document(echo_tool()).unwrap();
        assert_eq!(process.class(), "CommandLineTool");
        assert_eq!(process.name(), "echo");
        assert_eq!(process.inputs()[0].cwl_type, CwlType::string());
        assert_eq!(
            process.extra().get("s:softwareVersion"),
            Some(&json!("1.0.0"))
        );
    }

    #[test]
    fn test_unsupported_class() {
        let mut document = echo_tool();
        document["class"] = json!("ExpressionTool");
        assert!(matches!(
            Process::from_document(document),
            Err(CwlError::UnsupportedProcessClass(class)) if class == "ExpressionTool"
        ));
    }

    #[test]
    fn test_unexpected_type_surfaces() {
        let mut document = echo_tool();
        document["inputs"][0]["type"] = json!(["string", "null"]);
        assert!(matches!(
            Process::from_document(document),
            Err(CwlError::UnexpectedType { .. })
        ));
    }

    #[test]
    fn test_expression_lib_include_loads() {
        let mut document = echo_tool();
        document["requirements"] = json!([{
            "class": "InlineJavascriptRequirement",
            "expressionLib": [{"$include": "helpers.js"}],
        }]);
        let process = Process::from_document(document.clone()).unwrap();
        assert_eq!(process.requirements()[0].class(), "InlineJavascriptRequirement");
        assert_eq!(process.to_document().unwrap(), document);
    }

    #[test]
    fn test_malformed_field_is_a_bad_document() {
        let mut document = echo_tool();
        document["stdout"] = json!({"not": "a file name"});
        assert!(matches!(
            Process::from_document(document),
            Err(CwlError::BadDocument { uri, .. }) if uri == "file:///tools/echo.cwl"
        ));
    }

    #[test]
    fn test_document_round_trip() {
        let process = Process::from_document(echo_tool()).unwrap();
        let document = process.to_document().unwrap();
        assert_eq!(document, echo_tool());
    }

    #[test]
    fn test_embedded_run_is_checked() {
        let workflow = json!({
            "id": "file:///wf/outer.cwl",
            "class": "Workflow",
            "inputs": [],
            "outputs": [],
            "steps": [{
                "id": "inner",
                "in": [],
                "out": [],
                "run": {"id": "file:///wf/inner.cwl", "class": "Operation"},
            }],
        });
        assert!(matches!(
            Process::from_document(workflow),
            Err(CwlError::UnsupportedProcessClass(_))
        ));
    }

    #[test]
    fn test_save_uses_process_name() {
        let temp_dir = TempDir::new().unwrap();
        let process = Process::from_document(echo_tool()).unwrap();
        let path = process.save(temp_dir.path()).unwrap();
        assert!(path.ends_with("echo.cwl"));

        let content = std::fs::read_to_string(&path).unwrap();
        let reread: JsonValue = serde_yaml::from_str(&content).unwrap();
        assert_eq!(reread, echo_tool());
    }

    #[test]
    fn test_load_prebuilt_process_records_it() {
        let mut context = ResolutionContext::new();
        let process = Process::from_document(echo_tool()).unwrap();
        Process::load(process, true, &mut context).unwrap();
        assert!(context.contains("file:///tools/echo.cwl"));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_variant_accessors() {
        let mut tool = Process::from_document(echo_tool()).unwrap();
        assert!(tool.as_tool().is_some());
        assert!(tool.as_workflow_mut().is_none());
        tool.set_id("file:///staged/echo.cwl");
        assert_eq!(tool.id(), "file:///staged/echo.cwl");

        let mut workflow = Process::from_document(json!({
            "id": "file:///wf/outer.cwl",
            "class": "Workflow",
            "inputs": [],
            "outputs": [],
            "steps": [{"id": "say", "in": [], "out": [], "run": echo_tool()}],
        }))
        .unwrap();
        assert!(workflow.as_tool().is_none());
        let step = workflow
            .as_workflow_mut()
            .and_then(|workflow| workflow.step_mut("say"))
            .unwrap();
        step.when = Some("$(inputs.enabled)".to_string());
        assert!(workflow.to_document().unwrap()["steps"][0]["when"].is_string());
    }

    #[test]
    fn test_source_helpers() {
        let single = Source::Single("a/out".to_string());
        let multiple = Source::Multiple(vec!["a/out".to_string(), "b/out".to_string()]);
        assert!(!single.is_multiple());
        assert!(multiple.is_multiple());
        assert!(multiple.contains("b/out"));
        assert_eq!(
            serde_json::to_value(&multiple).unwrap(),
            json!(["a/out", "b/out"])
        );
    }
}
