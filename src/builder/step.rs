//! Wrapping a process into a workflow step

use super::ids::{generate_default_step_id, validate_identifier};
use crate::error::{CwlError, CwlResult};
use crate::model::{
    Parameter, Process, RunRef, ScatterMethod, Source, Workflow, WorkflowStep,
    WorkflowStepInput, WorkflowStepOutput,
};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

/// Derives a step id from a process name
pub type StepIdGenerator = Box<dyn Fn(&str) -> String>;

/// Per-call options of [`StepBuilder::build`]
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    pub id: Option<String>,
    pub scatter: Vec<String>,
    pub scatter_method: Option<ScatterMethod>,
    pub when: Option<String>,
    /// Inputs referenced by the `when` clause
    pub when_input_names: Vec<String>,
    /// Raw descriptions of inputs the process does not declare
    pub extra_inputs: Vec<JsonValue>,
}

impl StepOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn scatter<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scatter = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn scatter_method(mut self, method: ScatterMethod) -> Self {
        self.scatter_method = Some(method);
        self
    }

    /// Conditional clause and the input names it references.
    pub fn when<I, S>(mut self, clause: impl Into<String>, input_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.when = Some(clause.into());
        self.when_input_names = input_names.into_iter().map(Into::into).collect();
        self
    }

    pub fn extra_input(mut self, description: JsonValue) -> Self {
        self.extra_inputs.push(description);
        self
    }
}

/// Builds workflow steps from processes
#[derive(Default)]
pub struct StepBuilder {
    generate_step_id: Option<StepIdGenerator>,
}

impl fmt::Debug for StepBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepBuilder")
            .field("custom_id_generator", &self.generate_step_id.is_some())
            .finish()
    }
}

impl StepBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `generator` on the process name when no explicit id is given.
    pub fn with_id_generator(generator: impl Fn(&str) -> String + 'static) -> Self {
        Self {
            generate_step_id: Some(Box::new(generator)),
        }
    }

    /// Wrap `process` into a new step.
    ///
    /// Each process parameter gets a step-scoped copy. Scattered inputs have
    /// their type promoted to an array, and any scatter promotes every output.
    pub fn build(&self, process: &Process, options: StepOptions) -> CwlResult<WorkflowStep> {
        let step_id = match (&options.id, &self.generate_step_id) {
            (Some(id), _) => id.clone(),
            (None, Some(generate)) => generate(&process.name()),
            (None, None) => generate_default_step_id(&process.name()),
        };
        validate_identifier(&step_id)?;

        let extra_inputs = parse_extra_inputs(process, &options.extra_inputs)?;
        let declared: HashSet<&str> = process
            .inputs()
            .iter()
            .chain(extra_inputs.iter())
            .map(|input| input.id.as_str())
            .collect();

        validate_scatter(&step_id, &declared, &options)?;
        validate_when(&step_id, &declared, &options)?;

        let scattered: HashSet<&str> = options.scatter.iter().map(String::as_str).collect();
        let inputs = process
            .inputs()
            .iter()
            .chain(extra_inputs.iter())
            .map(|parameter| step_input(parameter, scattered.contains(parameter.id.as_str())))
            .collect();
        let outputs = process
            .outputs()
            .iter()
            .map(|parameter| {
                let cwl_type = if scattered.is_empty() {
                    parameter.cwl_type.clone()
                } else {
                    parameter.cwl_type.clone().promote()
                };
                let mut output = WorkflowStepOutput::new(&parameter.id, cwl_type);
                output.format = parameter.format.clone();
                output
            })
            .collect();

        let mut step = WorkflowStep::new(
            step_id,
            RunRef::Reference(process.id().to_string()),
            inputs,
            outputs,
        )
        .with_wrapped(process.clone());
        step.scatter = options.scatter;
        step.scatter_method = options.scatter_method;
        step.when = options.when;

        if let Process::Workflow(workflow) = process {
            bubble_up(&mut step, workflow);
        }

        info!(
            step = %step.id,
            run = %process.id(),
            inputs = step.inputs.len(),
            outputs = step.outputs.len(),
            "built step"
        );
        Ok(step)
    }
}

fn step_input(parameter: &Parameter, scattered: bool) -> WorkflowStepInput {
    let cwl_type = if scattered {
        parameter.cwl_type.clone().promote()
    } else {
        parameter.cwl_type.clone()
    };
    let optional = parameter.optional || parameter.default.is_some();
    let mut input = WorkflowStepInput::new(&parameter.id, cwl_type, optional);
    input.format = parameter.format.clone();
    input
}

fn parse_extra_inputs(process: &Process, descriptions: &[JsonValue]) -> CwlResult<Vec<Parameter>> {
    let mut parsed: Vec<Parameter> = Vec::with_capacity(descriptions.len());
    for description in descriptions {
        let parameter = Parameter::from_json(description.clone()).map_err(|e| {
            CwlError::CannotParseAdditionalInput(format!("{}: {}", description, e))
        })?;
        let clashes = process.inputs().iter().any(|input| input.id == parameter.id)
            || parsed.iter().any(|input| input.id == parameter.id);
        if clashes {
            return Err(CwlError::CannotParseAdditionalInput(format!(
                "input {} is already declared",
                parameter.id
            )));
        }
        parsed.push(parameter);
    }
    Ok(parsed)
}

fn validate_scatter(step_id: &str, declared: &HashSet<&str>, options: &StepOptions) -> CwlResult<()> {
    let mut seen = HashSet::new();
    for id in &options.scatter {
        if !declared.contains(id.as_str()) {
            return Err(CwlError::ScatterValidation(format!(
                "step {} scatters over undeclared input {}",
                step_id, id
            )));
        }
        if !seen.insert(id.as_str()) {
            return Err(CwlError::ScatterValidation(format!(
                "step {} scatters twice over input {}",
                step_id, id
            )));
        }
    }
    match (options.scatter.len(), options.scatter_method) {
        (0, Some(method)) => Err(CwlError::ScatterValidation(format!(
            "step {} has scatter method {} but no scatter inputs",
            step_id, method
        ))),
        (n, None) if n > 1 => Err(CwlError::ScatterValidation(format!(
            "step {} scatters over {} inputs and needs a scatter method",
            step_id, n
        ))),
        _ => Ok(()),
    }
}

fn validate_when(step_id: &str, declared: &HashSet<&str>, options: &StepOptions) -> CwlResult<()> {
    if options.when.is_none() {
        if !options.when_input_names.is_empty() {
            return Err(CwlError::WhenClauseValidation(format!(
                "step {} names when inputs without a when clause",
                step_id
            )));
        }
        return Ok(());
    }
    if options.when_input_names.is_empty() {
        return Err(CwlError::WhenClauseValidation(format!(
            "step {}: inputs referenced in the when clause must be listed",
            step_id
        )));
    }
    match options
        .when_input_names
        .iter()
        .find(|name| !declared.contains(name.as_str()))
    {
        Some(unknown) => Err(CwlError::WhenClauseValidation(format!(
            "step {}: input {} of the when clause is not declared, add it to the extra inputs",
            step_id, unknown
        ))),
        None => Ok(()),
    }
}

/// Copy values already assigned inside a wrapped workflow onto the new step.
///
/// Only single-source inner inputs are considered; fan-in inputs cannot be
/// traced back to one outer input and are skipped.
fn bubble_up(step: &mut WorkflowStep, workflow: &Workflow) {
    for inner in &workflow.steps {
        for input in &inner.inputs {
            let Some(value) = &input.value else {
                continue;
            };
            let source = match &input.source {
                Some(Source::Single(source)) => source,
                Some(Source::Multiple(_)) => {
                    debug!(step = %inner.id, input = %input.id, "not bubbling fan-in input");
                    continue;
                }
                None => continue,
            };
            let Some(outer) = step.inputs.iter_mut().find(|outer| &outer.id == source) else {
                continue;
            };
            let assignable = outer
                .cwl_type
                .as_ref()
                .is_some_and(|cwl_type| cwl_type.is_value_assignable(value));
            if !assignable {
                debug!(input = %outer.id, "bubbled value does not fit the step input");
                continue;
            }
            outer.value = Some(value.clone());
            if let Some(output) = step.outputs.iter_mut().find(|output| &output.id == source) {
                output.value = Some(value.clone());
            }
            debug!(input = %source, "bubbled value from {}", inner.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CwlType;
    use crate::value::Value;
    use serde_json::json;

    fn tool(inputs: JsonValue, outputs: JsonValue) -> Process {
        Process::from_document(json!({
            "id": "file:///tools/echo.cwl",
            "class": "CommandLineTool",
            "inputs": inputs,
            "outputs": outputs,
        }))
        .unwrap()
    }

    fn echo() -> Process {
        tool(
            json!([
                {"id": "message", "type": "string"},
                {"id": "count", "type": "int?"},
            ]),
            json!([{"id": "out", "type": "File"}]),
        )
    }

    #[test]
    fn test_default_step_id_and_types() {
        let step = StepBuilder::new().build(&echo(), StepOptions::new()).unwrap();
        assert_eq!(step.id, "step__echo");
        assert_eq!(step.run.id(), "file:///tools/echo.cwl");
        assert_eq!(step.input("message").unwrap().cwl_type, Some(CwlType::string()));
        assert!(step.input("count").unwrap().optional);
        assert_eq!(step.output("out").unwrap().cwl_type, Some(CwlType::file()));
    }

    #[test]
    fn test_custom_id_generator() {
        let builder = StepBuilder::with_id_generator(|name| format!("run_{}", name));
        let step = builder.build(&echo(), StepOptions::new()).unwrap();
        assert_eq!(step.id, "run_echo");

        let step = builder.build(&echo(), StepOptions::new().id("explicit")).unwrap();
        assert_eq!(step.id, "explicit");
    }

    #[test]
    fn test_scatter_promotes_types() {
        let step = StepBuilder::new()
            .build(&echo(), StepOptions::new().scatter(["message"]))
            .unwrap();
        assert_eq!(
            step.input("message").unwrap().cwl_type,
            Some(CwlType::array(CwlType::string()))
        );
        assert_eq!(step.input("count").unwrap().cwl_type, Some(CwlType::int()));
        assert_eq!(
            step.output("out").unwrap().cwl_type,
            Some(CwlType::array(CwlType::file()))
        );

        let plain = StepBuilder::new().build(&echo(), StepOptions::new()).unwrap();
        assert_eq!(plain.input("message").unwrap().cwl_type, Some(CwlType::string()));
    }

    #[test]
    fn test_scatter_validation() {
        let builder = StepBuilder::new();
        let unknown = builder.build(&echo(), StepOptions::new().scatter(["missing"]));
        assert!(matches!(unknown, Err(CwlError::ScatterValidation(_))));

        let no_method = builder.build(&echo(), StepOptions::new().scatter(["message", "count"]));
        assert!(matches!(no_method, Err(CwlError::ScatterValidation(_))));

        let with_method = builder.build(
            &echo(),
            StepOptions::new()
                .scatter(["message", "count"])
                .scatter_method(ScatterMethod::Dotproduct),
        );
        assert!(with_method.is_ok());

        let method_only = builder.build(
            &echo(),
            StepOptions::new().scatter_method(ScatterMethod::FlatCrossproduct),
        );
        assert!(matches!(method_only, Err(CwlError::ScatterValidation(_))));
    }

    #[test]
    fn test_when_clause_requires_declared_inputs() {
        let builder = StepBuilder::new();
        let missing_names = builder.build(
            &echo(),
            StepOptions::new().when("$(inputs.count > 0)", Vec::<String>::new()),
        );
        assert!(matches!(missing_names, Err(CwlError::WhenClauseValidation(_))));

        let unknown = builder.build(
            &echo(),
            StepOptions::new().when("$(inputs.enabled)", ["enabled"]),
        );
        assert!(matches!(unknown, Err(CwlError::WhenClauseValidation(_))));

        let declared = builder
            .build(
                &echo(),
                StepOptions::new()
                    .when("$(inputs.enabled)", ["enabled"])
                    .extra_input(json!({"id": "enabled", "type": "boolean"})),
            )
            .unwrap();
        assert_eq!(declared.when.as_deref(), Some("$(inputs.enabled)"));
        assert_eq!(
            declared.input("enabled").unwrap().cwl_type,
            Some(CwlType::boolean())
        );
    }

    #[test]
    fn test_extra_inputs_must_parse() {
        let builder = StepBuilder::new();
        let no_type = builder.build(&echo(), StepOptions::new().extra_input(json!({"id": "x"})));
        assert!(matches!(no_type, Err(CwlError::CannotParseAdditionalInput(_))));

        let bad_type = builder.build(
            &echo(),
            StepOptions::new().extra_input(json!({"id": "x", "type": "record"})),
        );
        assert!(matches!(bad_type, Err(CwlError::CannotParseAdditionalInput(_))));

        let clash = builder.build(
            &echo(),
            StepOptions::new().extra_input(json!({"id": "message", "type": "string"})),
        );
        assert!(matches!(clash, Err(CwlError::CannotParseAdditionalInput(_))));
    }

    #[test]
    fn test_step_does_not_mutate_process() {
        let process = echo();
        let mut step = StepBuilder::new().build(&process, StepOptions::new()).unwrap();
        step.set_input("message", Value::from("hello")).unwrap();
        assert_eq!(process.inputs()[0].default, None);
        assert_eq!(process.inputs()[0].cwl_type, CwlType::string());
        assert!(step.wrapped().is_some());
    }
}
