//! Process input and output parameters
//!
//! A single `Parameter` type serves both roles; whether a parameter is an
//! input or an output is decided by the list that owns it. On the wire the
//! optional flag is folded into the `type` declaration, in memory it is kept
//! apart from the `CwlType`.

use super::Source;
use crate::error::{CwlError, CwlResult};
use crate::types::CwlType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// How an input is rendered on the tool command line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_separator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_contents: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell_quote: Option<bool>,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

/// How a tool output is collected after the run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBinding {
    /// Glob pattern(s); a string, a list or an expression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glob: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_contents: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_eval: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

/// A typed process parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParameter", into = "RawParameter")]
pub struct Parameter {
    pub id: String,
    pub cwl_type: CwlType,
    pub optional: bool,
    pub label: Option<String>,
    pub doc: Option<JsonValue>,
    /// Media type tag, only legal on `File` and arrays of `File`
    pub format: Option<String>,
    pub default: Option<JsonValue>,
    pub input_binding: Option<InputBinding>,
    pub output_binding: Option<OutputBinding>,
    /// Workflow outputs only
    pub output_source: Option<Source>,
    pub extra: IndexMap<String, JsonValue>,
}

impl Parameter {
    pub fn new(id: impl Into<String>, cwl_type: CwlType) -> Self {
        Self {
            id: id.into(),
            cwl_type,
            optional: false,
            label: None,
            doc: None,
            format: None,
            default: None,
            input_binding: None,
            output_binding: None,
            output_source: None,
            extra: IndexMap::new(),
        }
    }

    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_output_source(mut self, source: impl Into<String>) -> Self {
        self.output_source = Some(Source::Single(source.into()));
        self
    }

    /// Attach a format tag; fails for anything but files.
    pub fn with_format(mut self, format: impl Into<String>) -> CwlResult<Self> {
        let format = format.into();
        check_format(&self.id, &self.cwl_type, &format)?;
        self.format = Some(format);
        Ok(self)
    }

    /// Parse a raw parameter description.
    pub fn from_json(value: JsonValue) -> CwlResult<Self> {
        let raw: RawParameter = serde_json::from_value(value)?;
        Parameter::try_from(raw)
    }
}

fn check_format(id: &str, cwl_type: &CwlType, format: &str) -> CwlResult<()> {
    if cwl_type.is_file_like() {
        Ok(())
    } else {
        Err(CwlError::unexpected_type(format!(
            "format {} declared on parameter {} of type {}",
            format, id, cwl_type
        )))
    }
}

/// Wire form of a parameter, with the type still in its declared shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParameter {
    id: String,
    #[serde(rename = "type")]
    type_: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doc: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_binding: Option<InputBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_binding: Option<OutputBinding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_source: Option<Source>,
    #[serde(flatten)]
    extra: IndexMap<String, JsonValue>,
}

impl TryFrom<RawParameter> for Parameter {
    type Error = CwlError;

    fn try_from(raw: RawParameter) -> CwlResult<Self> {
        let (cwl_type, optional) = CwlType::from_wire(&raw.type_)?;
        if let Some(format) = &raw.format {
            check_format(&raw.id, &cwl_type, format)?;
        }
        Ok(Parameter {
            id: raw.id,
            cwl_type,
            optional,
            label: raw.label,
            doc: raw.doc,
            format: raw.format,
            default: raw.default,
            input_binding: raw.input_binding,
            output_binding: raw.output_binding,
            output_source: raw.output_source,
            extra: raw.extra,
        })
    }
}

impl From<Parameter> for RawParameter {
    fn from(parameter: Parameter) -> Self {
        RawParameter {
            type_: parameter.cwl_type.to_wire(parameter.optional),
            id: parameter.id,
            label: parameter.label,
            doc: parameter.doc,
            format: parameter.format,
            default: parameter.default,
            input_binding: parameter.input_binding,
            output_binding: parameter.output_binding,
            output_source: parameter.output_source,
            extra: parameter.extra,
        }
    }
}
