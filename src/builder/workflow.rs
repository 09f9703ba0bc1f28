//! Linking steps into a workflow
//!
//! The builder takes a fixed list of steps and, in order:
//! 1. prefixes every step id with its position and rewrites every source
//!    reference to match (when `add_step_index` is on)
//! 2. checks scatter sets against the step inputs
//! 3. resolves each wrapped process and infers the capability requirements
//! 4. mints a workflow input for each unbound step input
//! 5. mints a workflow output for each step output
//! 6. detects fan-in inputs
//!
//! and finally saves the assembled workflow under the working directory.

use super::ids::{
    generate_cwl_source_repr, generate_default_input_path, generate_step_id,
    generate_workflow_id, generate_workflow_io_id, parse_cwl_source_repr, validate_identifier,
};
use crate::error::{CwlError, CwlResult};
use crate::model::{
    Parameter, Process, ProcessSource, ResolutionContext, RunRef, Source, Workflow, WorkflowStep,
};
use crate::requirements::Requirement;
use crate::types::{BasicKind, CwlType};
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Capabilities a workflow needs given its steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub scatter: bool,
    pub subworkflow: bool,
    pub inline_javascript: bool,
    pub multiple_input: bool,
}

impl Capabilities {
    /// Requirement entries, in a fixed order.
    pub fn requirements(&self) -> Vec<Requirement> {
        let mut requirements = Vec::new();
        if self.scatter {
            requirements.push(Requirement::ScatterFeature);
        }
        if self.subworkflow {
            requirements.push(Requirement::SubworkflowFeature);
        }
        if self.inline_javascript {
            requirements.push(Requirement::inline_javascript());
        }
        if self.multiple_input {
            requirements.push(Requirement::MultipleInputFeature);
        }
        requirements
    }
}

/// Builds workflows from steps
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    workdir: PathBuf,
    recursive: bool,
    add_step_index: bool,
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            recursive: true,
            add_step_index: true,
        }
    }
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory the workflow document is written to.
    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Load wrapped processes recursively.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Prefix step ids with their position, needed when a process is used twice.
    pub fn add_step_index(mut self, add_step_index: bool) -> Self {
        self.add_step_index = add_step_index;
        self
    }

    pub fn get_workdir(&self) -> &Path {
        &self.workdir
    }

    /// Link `steps` into a workflow named `id`, save it and return it.
    ///
    /// Steps are consumed; on error nothing built so far is handed back.
    pub fn build(
        &self,
        id: &str,
        mut steps: Vec<WorkflowStep>,
        context: &mut ResolutionContext,
    ) -> CwlResult<Workflow> {
        validate_identifier(id)?;

        if self.add_step_index {
            add_step_index(&mut steps)?;
        } else {
            check_references(&steps)?;
        }

        for step in &steps {
            validate_step_scatter(step)?;
        }

        let mut capabilities = Capabilities::default();
        for step in steps.iter_mut() {
            let process = self.resolve(step, context)?;
            step.infer_types(&process);
            capabilities.scatter |= !step.scatter.is_empty();
            capabilities.inline_javascript |= step.when.is_some();
            capabilities.subworkflow |= process.is_workflow();
        }

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for index in 0..steps.len() {
            inputs.extend(mint_inputs(id, &mut steps, index)?);
            outputs.extend(mint_outputs(id, &steps[index])?);
        }

        capabilities.multiple_input = steps.iter().any(|step| {
            step.inputs
                .iter()
                .any(|input| matches!(input.source, Some(Source::Multiple(_))))
        });

        let requirements = capabilities.requirements();
        let mut workflow = Workflow::new(generate_workflow_id(&self.workdir, id)?);
        workflow.inputs = inputs;
        workflow.outputs = outputs;
        workflow.steps = steps;
        workflow.requirements = (!requirements.is_empty()).then_some(requirements);

        let process = Process::Workflow(workflow.clone());
        process.save(&self.workdir)?;
        context.insert(process);
        info!(
            workflow = %workflow.id,
            steps = workflow.steps.len(),
            inputs = workflow.inputs.len(),
            outputs = workflow.outputs.len(),
            "built workflow"
        );
        Ok(workflow)
    }

    /// Find the process a step runs: context first, then the step's own copy,
    /// then the document it references.
    fn resolve(&self, step: &WorkflowStep, context: &mut ResolutionContext) -> CwlResult<Process> {
        if let Some(process) = context.get(step.run.id()) {
            return Ok(process.clone());
        }
        let source = match (&step.run, step.wrapped()) {
            (RunRef::Embedded(process), _) => ProcessSource::Process(process.as_ref().clone()),
            (RunRef::Reference(_), Some(process)) => ProcessSource::Process(process.clone()),
            (RunRef::Reference(uri), None) => ProcessSource::Uri(uri.clone()),
        };
        Process::load(source, self.recursive, context)
    }
}

/// Rename every step to `<index>__<id>` and rewrite sources to match.
///
/// Sources created by linking carry the instance key of the producing step,
/// which disambiguates steps that shared an id before renaming. Sources read
/// from a document fall back to the old id and fail when it is ambiguous.
fn add_step_index(steps: &mut [WorkflowStep]) -> CwlResult<()> {
    let renamed: Vec<String> = steps
        .iter()
        .enumerate()
        .map(|(index, step)| generate_step_id(&step.id, Some(&index.to_string()), None))
        .collect();
    let by_key: HashMap<Uuid, &str> = steps
        .iter()
        .zip(&renamed)
        .map(|(step, new_id)| (step.key(), new_id.as_str()))
        .collect();
    let mut by_old_id: HashMap<&str, Vec<&str>> = HashMap::new();
    for (step, new_id) in steps.iter().zip(&renamed) {
        by_old_id.entry(step.id.as_str()).or_default().push(new_id);
    }

    let mut rewrites = Vec::with_capacity(steps.len());
    for step in steps.iter() {
        let mut step_rewrites = Vec::with_capacity(step.inputs.len());
        for input in &step.inputs {
            let sources = input
                .sources_with_origins()
                .into_iter()
                .map(|(source, origin)| rewrite_source(&source, origin, &by_key, &by_old_id))
                .collect::<CwlResult<Vec<_>>>()?;
            step_rewrites.push(sources);
        }
        rewrites.push(step_rewrites);
    }

    for ((step, new_id), step_rewrites) in steps.iter_mut().zip(renamed).zip(rewrites) {
        debug!(from = %step.id, to = %new_id, "renamed step");
        step.id = new_id;
        for (input, sources) in step.inputs.iter_mut().zip(step_rewrites) {
            if !sources.is_empty() {
                input.replace_sources(sources);
            }
        }
    }
    Ok(())
}

fn rewrite_source(
    source: &str,
    origin: Option<Uuid>,
    by_key: &HashMap<Uuid, &str>,
    by_old_id: &HashMap<&str, Vec<&str>>,
) -> CwlResult<String> {
    let Some((step_id, io_id)) = parse_cwl_source_repr(source) else {
        return Ok(source.to_string());
    };
    if let Some(origin) = origin {
        return match by_key.get(&origin) {
            Some(new_id) => Ok(generate_cwl_source_repr(new_id, io_id)),
            None => Err(CwlError::UnsupportedCase(format!(
                "source {} comes from a step that is not part of the workflow",
                source
            ))),
        };
    }
    match by_old_id.get(step_id).map(Vec::as_slice) {
        Some([new_id]) => Ok(generate_cwl_source_repr(new_id, io_id)),
        Some(_) => Err(CwlError::UnsupportedCase(format!(
            "source {} is ambiguous, step {} is used more than once",
            source, step_id
        ))),
        None => Err(CwlError::UnsupportedCase(format!(
            "source {} refers to an unknown step",
            source
        ))),
    }
}

/// Without renaming, step ids must already be unique and every step source
/// must point at one of them.
fn check_references(steps: &[WorkflowStep]) -> CwlResult<()> {
    let mut ids = HashSet::new();
    for step in steps {
        if !ids.insert(step.id.as_str()) {
            return Err(CwlError::UnsupportedCase(format!(
                "step id {} is used more than once, enable the step index",
                step.id
            )));
        }
    }
    for step in steps {
        for (upstream, _) in step.upstream() {
            if !ids.contains(upstream.as_str()) {
                return Err(CwlError::UnsupportedCase(format!(
                    "step {} refers to unknown step {}",
                    step.id, upstream
                )));
            }
        }
    }
    Ok(())
}

fn validate_step_scatter(step: &WorkflowStep) -> CwlResult<()> {
    match step
        .scatter
        .iter()
        .find(|id| !step.inputs.iter().any(|input| &input.id == *id))
    {
        Some(unknown) => Err(CwlError::ScatterValidation(format!(
            "step {} scatters over undeclared input {}",
            step.id, unknown
        ))),
        None => Ok(()),
    }
}

/// True if another step consumes the output `output_id` of `steps[index]`.
fn is_output_consumed(steps: &[WorkflowStep], index: usize, output_id: &str) -> bool {
    let step = &steps[index];
    if !step.outputs.iter().any(|output| output.id == output_id) {
        return false;
    }
    let reference = generate_cwl_source_repr(&step.id, output_id);
    steps
        .iter()
        .enumerate()
        .filter(|(other, _)| *other != index)
        .flat_map(|(_, other)| other.inputs.iter())
        .any(|input| input.source.as_ref().is_some_and(|s| s.contains(&reference)))
}

/// Mint workflow inputs for the unbound inputs of `steps[index]`.
fn mint_inputs(
    workflow_id: &str,
    steps: &mut [WorkflowStep],
    index: usize,
) -> CwlResult<Vec<Parameter>> {
    let mut parameters = Vec::new();
    for position in 0..steps[index].inputs.len() {
        let step_id = steps[index].id.clone();
        let input = &steps[index].inputs[position];
        if input.source.is_some() {
            continue;
        }
        if input.value.is_none()
            && (input.optional || input.default.is_some() || input.value_from.is_some())
        {
            continue;
        }

        let cwl_type = input.cwl_type.clone().ok_or_else(|| {
            CwlError::UnsupportedCase(format!(
                "type of input {} on step {} is unknown",
                input.id, step_id
            ))
        })?;
        let synthesize = input.value.is_none() && is_output_consumed(steps, index, &input.id);
        let input_id = input.id.clone();
        let optional = input.optional;

        if synthesize {
            let path = generate_default_input_path(&step_id, &input_id);
            let value = match cwl_type {
                CwlType::Basic(BasicKind::File) => Value::File(path),
                CwlType::Basic(BasicKind::Directory) => Value::Directory(path),
                ref other => {
                    return Err(CwlError::UnsupportedCase(format!(
                        "cannot generate a default value of type {} for {}",
                        other,
                        generate_cwl_source_repr(&step_id, &input_id)
                    )))
                }
            };
            debug!(step = %step_id, input = %input_id, value = %value, "synthesized default input");
            steps[index].inputs[position].value = Some(value);
        }

        let parameter_id = generate_workflow_io_id(workflow_id, &step_id, &input_id);
        steps[index].inputs[position].bind_workflow_input(&parameter_id);
        parameters.push(Parameter::new(parameter_id, cwl_type).with_optional(optional));
    }
    Ok(parameters)
}

/// Mint a workflow output for every non-suppressed output of `step`.
fn mint_outputs(workflow_id: &str, step: &WorkflowStep) -> CwlResult<Vec<Parameter>> {
    step.outputs
        .iter()
        .filter(|output| !output.suppressed)
        .map(|output| {
            let cwl_type = output.cwl_type.clone().ok_or_else(|| {
                CwlError::UnsupportedCase(format!(
                    "type of output {} on step {} is unknown",
                    output.id, step.id
                ))
            })?;
            // Conditional steps may skip and produce null
            let optional = step.when.is_some();
            Ok(
                Parameter::new(generate_workflow_io_id(workflow_id, &step.id, &output.id), cwl_type)
                    .with_optional(optional)
                    .with_output_source(generate_cwl_source_repr(&step.id, &output.id)),
            )
        })
        .collect()
}
