//! Process requirements and hints
//!
//! The feature requirements the workflow builder infers (scatter,
//! subworkflow, inline javascript, multiple inputs) are unit-like variants.
//! Other well-known classes carry their fields; any class not listed here is
//! kept verbatim so loading and saving a document never drops an entry.

use crate::error::{CwlError, CwlResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerRequirement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_pull: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_load: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_import: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_output_directory: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

impl DockerRequirement {
    pub fn pull(image: impl Into<String>) -> Self {
        Self {
            docker_pull: Some(image.into()),
            ..Default::default()
        }
    }
}

/// Resource bounds; each bound is a number or an expression string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores_min: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cores_max: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_min: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ram_max: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmpdir_min: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmpdir_max: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdir_min: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdir_max: Option<JsonValue>,
    #[serde(flatten)]
    pub extra: IndexMap<String, JsonValue>,
}

/// A requirement or hint entry, discriminated on its `class` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JsonValue", into = "JsonValue")]
pub enum Requirement {
    ScatterFeature,
    SubworkflowFeature,
    /// Library entries are code strings or `{$include: <uri>}` mappings
    InlineJavascript { expression_lib: Option<Vec<JsonValue>> },
    MultipleInputFeature,
    StepInputExpression,
    Docker(DockerRequirement),
    Resource(ResourceRequirement),
    NetworkAccess { network_access: JsonValue },
    EnvVar { env_def: JsonValue },
    InitialWorkDir { listing: JsonValue },
    Software { packages: JsonValue },
    /// Any other class, kept as written
    Other(JsonValue),
}

impl Requirement {
    /// Value of the `class` field
    pub fn class(&self) -> &str {
        match self {
            Requirement::ScatterFeature => "ScatterFeatureRequirement",
            Requirement::SubworkflowFeature => "SubworkflowFeatureRequirement",
            Requirement::InlineJavascript { .. } => "InlineJavascriptRequirement",
            Requirement::MultipleInputFeature => "MultipleInputFeatureRequirement",
            Requirement::StepInputExpression => "StepInputExpressionRequirement",
            Requirement::Docker(_) => "DockerRequirement",
            Requirement::Resource(_) => "ResourceRequirement",
            Requirement::NetworkAccess { .. } => "NetworkAccess",
            Requirement::EnvVar { .. } => "EnvVarRequirement",
            Requirement::InitialWorkDir { .. } => "InitialWorkDirRequirement",
            Requirement::Software { .. } => "SoftwareRequirement",
            Requirement::Other(value) => value
                .get("class")
                .and_then(|class| class.as_str())
                .unwrap_or_default(),
        }
    }

    pub fn inline_javascript() -> Self {
        Requirement::InlineJavascript {
            expression_lib: None,
        }
    }

    fn field(body: &mut JsonMap<String, JsonValue>, key: &str) -> JsonValue {
        body.remove(key).unwrap_or(JsonValue::Null)
    }
}

impl TryFrom<JsonValue> for Requirement {
    type Error = CwlError;

    fn try_from(value: JsonValue) -> CwlResult<Self> {
        let mut body = match value {
            JsonValue::Object(body) => body,
            other => {
                return Err(CwlError::bad_document(
                    "requirement",
                    format!("expected a mapping, got {}", other),
                ))
            }
        };
        let class = match body.get("class").and_then(|class| class.as_str()) {
            Some(class) => class.to_string(),
            None => {
                return Err(CwlError::bad_document(
                    "requirement",
                    "requirement entry without class",
                ))
            }
        };
        // Unrecognized classes keep the class key
        let original = JsonValue::Object(body.clone());
        body.remove("class");

        let requirement = match class.as_str() {
            "ScatterFeatureRequirement" => Requirement::ScatterFeature,
            "SubworkflowFeatureRequirement" => Requirement::SubworkflowFeature,
            "MultipleInputFeatureRequirement" => Requirement::MultipleInputFeature,
            "StepInputExpressionRequirement" => Requirement::StepInputExpression,
            "InlineJavascriptRequirement" => Requirement::InlineJavascript {
                expression_lib: match body.remove("expressionLib") {
                    Some(JsonValue::Array(lib)) => Some(lib),
                    Some(other) => {
                        return Err(CwlError::bad_document(
                            "requirement",
                            format!("expressionLib must be a list, got {}", other),
                        ))
                    }
                    None => None,
                },
            },
            "DockerRequirement" => Requirement::Docker(
                serde_json::from_value(JsonValue::Object(body))
                    .map_err(|e| CwlError::bad_document("DockerRequirement", e))?,
            ),
            "ResourceRequirement" => Requirement::Resource(
                serde_json::from_value(JsonValue::Object(body))
                    .map_err(|e| CwlError::bad_document("ResourceRequirement", e))?,
            ),
            "NetworkAccess" => Requirement::NetworkAccess {
                network_access: Self::field(&mut body, "networkAccess"),
            },
            "EnvVarRequirement" => Requirement::EnvVar {
                env_def: Self::field(&mut body, "envDef"),
            },
            "InitialWorkDirRequirement" => Requirement::InitialWorkDir {
                listing: Self::field(&mut body, "listing"),
            },
            "SoftwareRequirement" => Requirement::Software {
                packages: Self::field(&mut body, "packages"),
            },
            _ => Requirement::Other(original),
        };
        Ok(requirement)
    }
}

impl From<Requirement> for JsonValue {
    fn from(requirement: Requirement) -> Self {
        let mut body = JsonMap::new();
        body.insert(
            "class".to_string(),
            JsonValue::String(requirement.class().to_string()),
        );
        let fields: Vec<(String, JsonValue)> = match requirement {
            Requirement::Other(value) => return value,
            Requirement::InlineJavascript {
                expression_lib: Some(lib),
            } => vec![("expressionLib".to_string(), JsonValue::Array(lib))],
            Requirement::Docker(docker) => match serde_json::to_value(docker) {
                Ok(JsonValue::Object(map)) => map.into_iter().collect(),
                _ => Vec::new(),
            },
            Requirement::Resource(resource) => match serde_json::to_value(resource) {
                Ok(JsonValue::Object(map)) => map.into_iter().collect(),
                _ => Vec::new(),
            },
            Requirement::NetworkAccess { network_access } => {
                vec![("networkAccess".to_string(), network_access)]
            }
            Requirement::EnvVar { env_def } => vec![("envDef".to_string(), env_def)],
            Requirement::InitialWorkDir { listing } => vec![("listing".to_string(), listing)],
            Requirement::Software { packages } => vec![("packages".to_string(), packages)],
            _ => Vec::new(),
        };
        for (key, value) in fields {
            body.insert(key, value);
        }
        JsonValue::Object(body)
    }
}
