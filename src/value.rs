//! Literal values assigned to workflow and step parameters
//!
//! Values are untyped at construction; the declared `CwlType` of the
//! receiving parameter decides whether a value is assignable and how it is
//! serialized into a config document.

use serde_json::Value as JsonValue;
use std::fmt;
use std::path::{Path, PathBuf};

/// A literal parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value
    Null,

    /// Boolean value
    Boolean(bool),

    /// Integer value, assignable to `int` and `long`
    Int(i64),

    /// Floating point value, assignable to `float` and `double`
    Float(f64),

    /// String value
    String(String),

    /// Reference to a file
    File(PathBuf),

    /// Reference to a directory
    Directory(PathBuf),

    /// Array value
    Array(Vec<Value>),
}

impl Value {
    /// Create a File value
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Value::File(path.into())
    }

    /// Create a Directory value
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Value::Directory(path.into())
    }

    /// Path of a File or Directory value
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::File(path) | Value::Directory(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Plain JSON form. Files and directories become bare path strings;
    /// typed serialization goes through `CwlType::serialize_value`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::File(path) | Value::Directory(path) => JsonValue::String(Self::posix(path)),
            Value::Array(values) => JsonValue::Array(values.iter().map(Value::to_json).collect()),
        }
    }

    /// Forward-slash rendering of a path, as written into documents.
    pub(crate) fn posix(path: &Path) -> String {
        path.to_string_lossy().replace('\\', "/")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::File(path) => write!(f, "File({})", path.display()),
            Value::Directory(path) => write!(f, "Directory({})", path.display()),
            Value::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}
