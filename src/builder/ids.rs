//! Deterministic id generation for steps, workflow IO and default inputs

use crate::error::{CwlError, CwlResult};
use crate::runtime::fs_utils;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Identifiers the builder writes into documents: no `/`, `#` or whitespace.
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("valid regex"));

/// Check an id can be used for a step or a workflow.
pub fn validate_identifier(id: &str) -> CwlResult<()> {
    if IDENTIFIER.is_match(id) {
        Ok(())
    } else {
        Err(CwlError::UnsupportedCase(format!(
            "{:?} is not a valid identifier",
            id
        )))
    }
}

/// `<step-id>/<io-id>`
pub fn generate_cwl_source_repr(step_id: &str, io_id: &str) -> String {
    format!("{}/{}", step_id, io_id)
}

/// Split a `<step-id>/<io-id>` reference; workflow input references yield `None`.
pub fn parse_cwl_source_repr(source: &str) -> Option<(&str, &str)> {
    source.split_once('/')
}

/// `file://` URI of `<dir>/<id>.cwl`
pub fn generate_workflow_id(dir: &Path, id: &str) -> CwlResult<String> {
    let dir = fs_utils::directory_exists(dir)?;
    Ok(fs_utils::path_to_uri(dir.join(format!("{}.cwl", id)))?)
}

pub fn generate_default_step_id(process_name: &str) -> String {
    generate_step_id(process_name, Some("step"), None)
}

/// Join optional prefix and suffix to a step id with `__`.
pub fn generate_step_id(step_id: &str, prefix: Option<&str>, suffix: Option<&str>) -> String {
    let mut id = step_id.to_string();
    if let Some(prefix) = prefix {
        id = format!("{}__{}", prefix, id);
    }
    if let Some(suffix) = suffix {
        id = format!("{}__{}", id, suffix);
    }
    id
}

/// `<workflow-id>___<step-id>___<io-id>`
pub fn generate_workflow_io_id(workflow_id: &str, step_id: &str, io_id: &str) -> String {
    format!("{}___{}___{}", workflow_id, step_id, io_id)
}

/// Relative location for a synthesized File or Directory input.
///
/// Each input gets its own leaf name since the engine only stages leaf
/// directories back.
pub fn generate_default_input_path(step_id: &str, input_id: &str) -> PathBuf {
    PathBuf::from(format!("{}__{}", step_id, input_id))
}
