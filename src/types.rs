//! CWL parameter types
//!
//! The type system is closed: a type is either one of the basic kinds
//! (`null`, `boolean`, `int`, `long`, `float`, `double`, `string`, `File`,
//! `Directory`) or an array of another type. Optionality is not part of the
//! type itself; parameters carry it as a separate flag and it is only folded
//! back into the wire form when serializing.
//!
//! Wire forms accepted on input:
//! 1. `T`, `T?`, `T[]`, `T[]?` shorthands
//! 2. `{type: array, items: T}`
//! 3. `["null", T]` for an optional `T`

use crate::error::{CwlError, CwlResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;

/// The basic (non-parametric) CWL types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicKind {
    #[serde(rename = "null")]
    Null,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "long")]
    Long,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "double")]
    Double,
    #[serde(rename = "string")]
    String,
    File,
    Directory,
}

impl BasicKind {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            BasicKind::Null => "null",
            BasicKind::Boolean => "boolean",
            BasicKind::Int => "int",
            BasicKind::Long => "long",
            BasicKind::Float => "float",
            BasicKind::Double => "double",
            BasicKind::String => "string",
            BasicKind::File => "File",
            BasicKind::Directory => "Directory",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "null" => BasicKind::Null,
            "boolean" => BasicKind::Boolean,
            "int" => BasicKind::Int,
            "long" => BasicKind::Long,
            "float" => BasicKind::Float,
            "double" => BasicKind::Double,
            "string" => BasicKind::String,
            "File" => BasicKind::File,
            "Directory" => BasicKind::Directory,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for BasicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A CWL parameter type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CwlType {
    /// One of the basic kinds
    Basic(BasicKind),
    /// Array type, parameterized by item type
    Array(Box<CwlType>),
}

impl CwlType {
    pub fn null() -> Self {
        CwlType::Basic(BasicKind::Null)
    }

    pub fn boolean() -> Self {
        CwlType::Basic(BasicKind::Boolean)
    }

    pub fn int() -> Self {
        CwlType::Basic(BasicKind::Int)
    }

    pub fn long() -> Self {
        CwlType::Basic(BasicKind::Long)
    }

    pub fn float() -> Self {
        CwlType::Basic(BasicKind::Float)
    }

    pub fn double() -> Self {
        CwlType::Basic(BasicKind::Double)
    }

    pub fn string() -> Self {
        CwlType::Basic(BasicKind::String)
    }

    pub fn file() -> Self {
        CwlType::Basic(BasicKind::File)
    }

    pub fn directory() -> Self {
        CwlType::Basic(BasicKind::Directory)
    }

    /// Create a new Array type.
    pub fn array(items: CwlType) -> Self {
        CwlType::Array(Box::new(items))
    }

    /// Wrap this type into an array, as done for scattered step IO.
    pub fn promote(self) -> Self {
        CwlType::array(self)
    }

    /// Item type of an array, `None` for basic types.
    pub fn items(&self) -> Option<&CwlType> {
        match self {
            CwlType::Array(items) => Some(items),
            CwlType::Basic(_) => None,
        }
    }

    /// True for `File` and `Directory`.
    pub fn is_filesystem(&self) -> bool {
        matches!(
            self,
            CwlType::Basic(BasicKind::File) | CwlType::Basic(BasicKind::Directory)
        )
    }

    /// True for `File` and arrays (of any depth) of `File`.
    pub fn is_file_like(&self) -> bool {
        match self {
            CwlType::Basic(kind) => *kind == BasicKind::File,
            CwlType::Array(items) => items.is_file_like(),
        }
    }

    /// Parse a wire type declaration, returning the type and its optional flag.
    pub fn from_wire(wire: &JsonValue) -> CwlResult<(CwlType, bool)> {
        match wire {
            JsonValue::String(name) => Self::parse_shorthand(name),
            JsonValue::Object(map) => match map.get("type").and_then(|t| t.as_str()) {
                Some("array") => {
                    let items = map.get("items").ok_or_else(|| {
                        CwlError::unexpected_type(format!("array without items: {}", wire))
                    })?;
                    let (items, items_optional) = CwlType::from_wire(items)?;
                    if items_optional {
                        return Err(CwlError::unexpected_type(format!(
                            "arrays of optional items are not supported: {}",
                            wire
                        )));
                    }
                    Ok((CwlType::array(items), false))
                }
                _ => Err(CwlError::unexpected_type(wire.to_string())),
            },
            JsonValue::Array(union) => match union.as_slice() {
                [JsonValue::String(first), rest] if first == "null" => {
                    let (cwl_type, _) = CwlType::from_wire(rest)?;
                    Ok((cwl_type, true))
                }
                _ => Err(CwlError::unexpected_type(wire.to_string())),
            },
            _ => Err(CwlError::unexpected_type(wire.to_string())),
        }
    }

    fn parse_shorthand(name: &str) -> CwlResult<(CwlType, bool)> {
        let (mut rest, optional) = match name.strip_suffix('?') {
            Some(stripped) => (stripped, true),
            None => (name, false),
        };
        let mut depth = 0;
        while let Some(stripped) = rest.strip_suffix("[]") {
            rest = stripped;
            depth += 1;
        }
        let kind = BasicKind::parse(rest)
            .ok_or_else(|| CwlError::unexpected_type(format!("unknown type {}", name)))?;
        let mut cwl_type = CwlType::Basic(kind);
        for _ in 0..depth {
            cwl_type = cwl_type.promote();
        }
        Ok((cwl_type, optional))
    }

    /// Serialize the type declaration, folding in the optional flag.
    ///
    /// Optional basic types and optional arrays of basic types use the `?`
    /// shorthand, every other optional type uses the `["null", T]` union.
    pub fn to_wire(&self, optional: bool) -> JsonValue {
        match (self, optional) {
            (CwlType::Basic(BasicKind::Null), _) => json!("null"),
            (CwlType::Basic(kind), false) => json!(kind.as_str()),
            (CwlType::Basic(kind), true) => json!(format!("{}?", kind)),
            (CwlType::Array(items), false) => json!({
                "type": "array",
                "items": items.to_wire(false),
            }),
            (CwlType::Array(items), true) => match items.as_ref() {
                CwlType::Basic(kind) if *kind != BasicKind::Null => {
                    json!(format!("{}[]?", kind))
                }
                _ => json!(["null", self.to_wire(false)]),
            },
        }
    }

    /// Check if a value can be assigned to a parameter of this type.
    pub fn is_value_assignable(&self, value: &Value) -> bool {
        match (self, value) {
            (CwlType::Basic(BasicKind::Null), Value::Null) => true,
            (CwlType::Basic(BasicKind::Boolean), Value::Boolean(_)) => true,
            (CwlType::Basic(BasicKind::Int | BasicKind::Long), Value::Int(_)) => true,
            (CwlType::Basic(BasicKind::Float | BasicKind::Double), Value::Float(_)) => true,
            (CwlType::Basic(BasicKind::String), Value::String(_)) => true,
            (CwlType::Basic(BasicKind::File), Value::File(_)) => true,
            (CwlType::Basic(BasicKind::Directory), Value::Directory(_)) => true,
            (CwlType::Array(items), Value::Array(values)) => {
                values.iter().all(|value| items.is_value_assignable(value))
            }
            _ => false,
        }
    }

    /// Serialize a value according to this type.
    ///
    /// Files and directories become `{class, location}` references, arrays are
    /// serialized element-wise and everything else passes through.
    pub fn serialize_value(&self, value: &Value) -> CwlResult<JsonValue> {
        match (self, value) {
            (CwlType::Basic(BasicKind::File), Value::File(path)) => Ok(json!({
                "class": "File",
                "location": Value::posix(path),
            })),
            (CwlType::Basic(BasicKind::Directory), Value::Directory(path)) => Ok(json!({
                "class": "Directory",
                "location": Value::posix(path),
            })),
            (CwlType::Array(items), Value::Array(values)) => values
                .iter()
                .map(|value| items.serialize_value(value))
                .collect::<CwlResult<Vec<_>>>()
                .map(JsonValue::Array),
            (CwlType::Basic(_), value) if self.is_value_assignable(value) => Ok(value.to_json()),
            _ => Err(CwlError::incompatible_value("value", self, value)),
        }
    }

    /// Read back a serialized value according to this type.
    pub fn deserialize_value(&self, wire: &JsonValue) -> CwlResult<Value> {
        let mismatch = || CwlError::incompatible_value("value", self, wire);
        match self {
            CwlType::Basic(BasicKind::Null) => match wire {
                JsonValue::Null => Ok(Value::Null),
                _ => Err(mismatch()),
            },
            CwlType::Basic(BasicKind::Boolean) => {
                wire.as_bool().map(Value::Boolean).ok_or_else(mismatch)
            }
            CwlType::Basic(BasicKind::Int | BasicKind::Long) => {
                wire.as_i64().map(Value::Int).ok_or_else(mismatch)
            }
            CwlType::Basic(BasicKind::Float | BasicKind::Double) => {
                wire.as_f64().map(Value::Float).ok_or_else(mismatch)
            }
            CwlType::Basic(BasicKind::String) => wire
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            CwlType::Basic(kind @ (BasicKind::File | BasicKind::Directory)) => {
                let location = match wire {
                    JsonValue::String(location) => location.as_str(),
                    JsonValue::Object(map) => {
                        if map.get("class").and_then(|c| c.as_str()) != Some(kind.as_str()) {
                            return Err(mismatch());
                        }
                        map.get("location")
                            .or_else(|| map.get("path"))
                            .and_then(|l| l.as_str())
                            .ok_or_else(mismatch)?
                    }
                    _ => return Err(mismatch()),
                };
                Ok(if *kind == BasicKind::File {
                    Value::file(location)
                } else {
                    Value::directory(location)
                })
            }
            CwlType::Array(items) => match wire {
                JsonValue::Array(values) => values
                    .iter()
                    .map(|value| items.deserialize_value(value))
                    .collect::<CwlResult<Vec<_>>>()
                    .map(Value::Array),
                _ => Err(mismatch()),
            },
        }
    }
}

impl fmt::Display for CwlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CwlType::Basic(kind) => write!(f, "{}", kind),
            CwlType::Array(items) => write!(f, "{}[]", items),
        }
    }
}
