//! Tests for step IO lookup, assignment and config generation

use super::*;
use crate::builder::{StepBuilder, StepOptions};
use crate::error::CwlError;
use crate::types::CwlType;
use crate::value::Value;
use serde_json::json;
use tempfile::TempDir;

fn tool(id: &str, inputs: JsonValue, outputs: JsonValue) -> Process {
    Process::from_document(json!({
        "id": format!("file:///tools/{}.cwl", id),
        "class": "CommandLineTool",
        "inputs": inputs,
        "outputs": outputs,
    }))
    .unwrap()
}

fn echo() -> Process {
    tool(
        "echo",
        json!([{"id": "message", "type": "string"}]),
        json!([{"id": "out", "type": "string"}]),
    )
}

fn step(process: &Process, id: &str) -> WorkflowStep {
    StepBuilder::new()
        .build(process, StepOptions::new().id(id))
        .unwrap()
}

#[test]
fn test_get_distinguishes_inputs_and_outputs() {
    let touch = tool(
        "touch",
        json!([{"id": "dir", "type": "Directory"}, {"id": "name", "type": "string"}]),
        json!([{"id": "dir", "type": "Directory"}, {"id": "log", "type": "File"}]),
    );
    let step = step(&touch, "touch");

    assert!(matches!(step.get("dir").unwrap(), StepIo::Both { .. }));
    assert!(matches!(step.get("name").unwrap(), StepIo::Input(_)));
    assert!(matches!(step.get("log").unwrap(), StepIo::Output(_)));
    assert!(matches!(
        step.get("missing"),
        Err(CwlError::NoSuchInput { .. })
    ));
}

#[test]
fn test_assign_value() {
    let mut step = step(&echo(), "echo");
    assert!(!step.input("message").unwrap().is_set());
    step.set_input("message", Value::from("hello")).unwrap();
    assert!(step.input("message").unwrap().is_set());
    assert_eq!(
        step.input("message").unwrap().value,
        Some(Value::from("hello"))
    );

    let result = step.set_input("message", Value::from(3));
    assert!(matches!(result, Err(CwlError::IncompatibleValue { .. })));
    assert_eq!(
        step.input("message").unwrap().value,
        Some(Value::from("hello"))
    );
}

#[test]
fn test_link_sets_source() {
    let step1 = step(&echo(), "step1");
    let mut step2 = step(&echo(), "step2");
    step2.set_input("message", Value::from("stale")).unwrap();

    step2
        .set_input("message", step1.output_ref("out").unwrap())
        .unwrap();
    let input = step2.input("message").unwrap();
    assert_eq!(input.source, Some(Source::Single("step1/out".to_string())));
    assert_eq!(input.value, None);
}

#[test]
fn test_link_rejects_different_types() {
    let counter = tool(
        "count",
        json!([{"id": "text", "type": "string"}]),
        json!([{"id": "total", "type": "int"}]),
    );
    let step1 = step(&counter, "count");
    let mut step2 = step(&echo(), "echo");

    let result = step2.set_input("message", step1.output_ref("total").unwrap());
    match result {
        Err(CwlError::IncompatibleType {
            sink,
            expected,
            actual,
        }) => {
            assert_eq!(sink, "echo/message");
            assert_eq!(expected, "string");
            assert_eq!(actual, "int");
        }
        other => panic!("Expected incompatible type, got {:?}", other),
    }
    assert_eq!(step2.input("message").unwrap().source, None);
}

#[test]
fn test_fan_in_requires_array_of_source_type() {
    let gather = tool(
        "gather",
        json!([{"id": "messages", "type": "string[]"}]),
        json!([{"id": "merged", "type": "File"}]),
    );
    let step1 = step(&echo(), "a");
    let step2 = step(&echo(), "b");
    let mut sink = step(&gather, "gather");

    sink.set_input(
        "messages",
        vec![
            step1.output_ref("out").unwrap(),
            step2.output_ref("out").unwrap(),
        ],
    )
    .unwrap();
    assert_eq!(
        sink.input("messages").unwrap().source,
        Some(Source::Multiple(vec![
            "a/out".to_string(),
            "b/out".to_string()
        ]))
    );

    let mut scalar = step(&echo(), "scalar");
    let result = scalar.set_input("message", vec![step1.output_ref("out").unwrap()]);
    assert!(matches!(result, Err(CwlError::IncompatibleType { .. })));
}

#[test]
fn test_output_assignment_is_rejected() {
    let mut step = step(&echo(), "echo");
    assert!(matches!(
        step.set_input("out", Value::from("x")),
        Err(CwlError::OutputAssignment { .. })
    ));
    assert!(matches!(
        step.set_output("out", Value::from("x")),
        Err(CwlError::OutputAssignment { .. })
    ));
    assert!(matches!(
        step.set_input("nope", Value::from("x")),
        Err(CwlError::NoSuchInput { .. })
    ));
}

#[test]
fn test_optional_input_accepts_null() {
    let optional = tool(
        "opt",
        json!([{"id": "flag", "type": "boolean?"}]),
        json!([]),
    );
    let mut step = step(&optional, "opt");
    step.set_input("flag", Value::Boolean(true)).unwrap();
    step.set_input("flag", Value::Null).unwrap();
    assert_eq!(step.input("flag").unwrap().value, None);
}

#[test]
fn test_null_clears_an_existing_link() {
    let producer = tool(
        "producer",
        json!([]),
        json!([{"id": "flag", "type": "boolean"}]),
    );
    let optional = tool(
        "opt",
        json!([{"id": "flag", "type": "boolean?"}]),
        json!([]),
    );
    let upstream = step(&producer, "producer");
    let mut step = step(&optional, "opt");
    step.set_input("flag", upstream.output_ref("flag").unwrap())
        .unwrap();
    assert!(step.input("flag").unwrap().source.is_some());

    step.set_input("flag", Value::Null).unwrap();
    let input = step.input("flag").unwrap();
    assert_eq!(input.source, None);
    assert!(input.sources_with_origins().is_empty());
    assert!(!input.is_set());
}

#[test]
fn test_clone_is_a_new_instance() {
    let original = step(&echo(), "echo");
    let copy = original.clone();
    assert_eq!(copy.id, original.id);
    assert_ne!(copy.key(), original.key());
}

#[test]
fn test_suppress_output() {
    let mut step = step(&echo(), "echo");
    step.suppress_output("out").unwrap();
    assert!(step.output("out").unwrap().suppressed);
    assert!(matches!(
        step.suppress_output("message"),
        Err(CwlError::NoSuchOutput { .. })
    ));
}

#[test]
fn test_config_serializes_filesystem_values() {
    let copy = tool(
        "copy",
        json!([
            {"id": "src", "type": "File"},
            {"id": "dest", "type": "Directory"},
            {"id": "verbose", "type": "boolean?"},
        ]),
        json!([]),
    );
    let mut step = step(&copy, "copy");
    step.set_input("src", Value::file("data/in.txt")).unwrap();
    step.set_input("dest", Value::directory("out")).unwrap();

    let config = step.config().unwrap();
    assert_eq!(config.len(), 2);
    assert_eq!(
        config["src"],
        json!({"class": "File", "location": "data/in.txt"})
    );
    assert_eq!(
        config["dest"],
        json!({"class": "Directory", "location": "out"})
    );

    let temp_dir = TempDir::new().unwrap();
    let path = step.save_config(temp_dir.path()).unwrap();
    assert!(path.ends_with("copy.yaml"));
    let saved: JsonValue =
        serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["src"]["class"], json!("File"));
}

#[test]
fn test_serialization_skips_unset_inputs() {
    let step1 = step(&echo(), "step1");
    let mut step2 = step(&echo(), "step2");
    let unlinked = serde_json::to_value(&step2).unwrap();
    assert_eq!(unlinked["in"], json!([]));
    assert_eq!(unlinked["out"], json!(["out"]));

    step2
        .set_input("message", step1.output_ref("out").unwrap())
        .unwrap();
    let linked = serde_json::to_value(&step2).unwrap();
    assert_eq!(
        linked["in"],
        json!([{"id": "message", "source": "step1/out"}])
    );
    assert_eq!(linked["run"], json!("file:///tools/echo.cwl"));
}

#[test]
fn test_serialization_keeps_inputs_with_wire_fields() {
    let loaded: WorkflowStep = serde_json::from_value(json!({
        "id": "echo",
        "run": "file:///tools/echo.cwl",
        "in": [
            {"id": "message", "label": "greeting"},
            {"id": "extra", "loadContents": true},
            {"id": "bare"},
        ],
        "out": ["out"],
    }))
    .unwrap();
    let saved = serde_json::to_value(&loaded).unwrap();
    assert_eq!(
        saved["in"],
        json!([
            {"id": "message", "label": "greeting"},
            {"id": "extra", "loadContents": true},
        ])
    );
}

#[test]
fn test_loaded_step_is_untyped_until_inferred() {
    let mut loaded: WorkflowStep = serde_json::from_value(json!({
        "id": "echo",
        "run": "file:///tools/echo.cwl",
        "in": [{"id": "message", "source": "wf_message"}],
        "out": [{"id": "out"}],
        "scatter": "message",
    }))
    .unwrap();
    assert_eq!(loaded.scatter, vec!["message".to_string()]);
    assert_eq!(loaded.input("message").unwrap().cwl_type, None);

    loaded.infer_types(&echo());
    assert_eq!(
        loaded.input("message").unwrap().cwl_type,
        Some(CwlType::array(CwlType::string()))
    );
    assert_eq!(
        loaded.output("out").unwrap().cwl_type,
        Some(CwlType::array(CwlType::string()))
    );
}
