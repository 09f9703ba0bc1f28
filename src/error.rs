//! Error types for CWL document loading, type checking and workflow linking.
//!
//! Every build/link operation is fail-fast: the first error aborts the call and
//! no partially constructed step or workflow is handed back to the caller.

use crate::runtime::error::RuntimeError;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type CwlResult<T> = Result<T, CwlError>;

/// Main error type for all CWL model and builder errors.
#[derive(Error, Debug)]
pub enum CwlError {
    /// Static type mismatch between a prospective source and sink
    #[error("Incompatible types for {sink}: expected {expected}, got {actual}")]
    IncompatibleType {
        sink: String,
        expected: String,
        actual: String,
    },

    /// A literal value fails the declared type's assignability check
    #[error("Cannot assign value {value} to parameter {id} of type {expected}")]
    IncompatibleValue {
        id: String,
        expected: String,
        value: String,
    },

    /// A type form the loader cannot interpret
    #[error("Unexpected type: {message}")]
    UnexpectedType { message: String },

    /// Attempted write to an output-role reference
    #[error("Cannot assign to output {id} of step {step}")]
    OutputAssignment { step: String, id: String },

    /// Topology recognized by the builder but not safely resolvable
    #[error("Unsupported case: {0}")]
    UnsupportedCase(String),

    /// A `when` clause references identifiers that are not declared
    #[error("Invalid when clause: {0}")]
    WhenClauseValidation(String),

    /// A scatter set references identifiers that are not declared
    #[error("Invalid scatter: {0}")]
    ScatterValidation(String),

    /// An extra input descriptor could not be parsed into a parameter
    #[error("Cannot parse additional input: {0}")]
    CannotParseAdditionalInput(String),

    /// The document normalizer rejected its input
    #[error("Invalid cwl document {uri}: {message}")]
    BadDocument { uri: String, message: String },

    /// The document discriminant is not a supported process class
    #[error("Unsupported cwl process class: {0}")]
    UnsupportedProcessClass(String),

    /// The document advertises a schema version other than the accepted one
    #[error("Unsupported cwl version {found} (only {supported} is supported)")]
    UnsupportedVersion { found: String, supported: String },

    /// A version string does not follow semantic versioning
    #[error("Invalid version ({version}): {message}")]
    InvalidVersion { version: String, message: String },

    /// No input with this id on the step
    #[error("Step {step} has no input {id}")]
    NoSuchInput { step: String, id: String },

    /// No output with this id on the step
    #[error("Step {step} has no output {id}")]
    NoSuchOutput { step: String, id: String },

    /// Two distinct documents advertise the same process revision
    #[error("Found duplicate version {version} of {name}")]
    DuplicateVersion { name: String, version: String },

    /// Filesystem or subprocess failure
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CwlError {
    /// Create an incompatible type error.
    pub fn incompatible_type(
        sink: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        CwlError::IncompatibleType {
            sink: sink.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an incompatible value error.
    pub fn incompatible_value(
        id: impl Into<String>,
        expected: impl ToString,
        value: impl ToString,
    ) -> Self {
        CwlError::IncompatibleValue {
            id: id.into(),
            expected: expected.to_string(),
            value: value.to_string(),
        }
    }

    /// Create an unexpected type error.
    pub fn unexpected_type(message: impl Into<String>) -> Self {
        CwlError::UnexpectedType {
            message: message.into(),
        }
    }

    /// Create a bad document error.
    pub fn bad_document(uri: impl Into<String>, message: impl ToString) -> Self {
        CwlError::BadDocument {
            uri: uri.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid version error.
    pub fn invalid_version(version: impl Into<String>, message: impl Into<String>) -> Self {
        CwlError::InvalidVersion {
            version: version.into(),
            message: message.into(),
        }
    }

    /// Short machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CwlError::IncompatibleType { .. } => "incompatible_type",
            CwlError::IncompatibleValue { .. } => "incompatible_value",
            CwlError::UnexpectedType { .. } => "unexpected_type",
            CwlError::OutputAssignment { .. } => "output_assignment",
            CwlError::UnsupportedCase(_) => "unsupported_case",
            CwlError::WhenClauseValidation(_) => "when_clause_validation",
            CwlError::ScatterValidation(_) => "scatter_validation",
            CwlError::CannotParseAdditionalInput(_) => "cannot_parse_additional_input",
            CwlError::BadDocument { .. } => "bad_document",
            CwlError::UnsupportedProcessClass(_) => "unsupported_process_class",
            CwlError::UnsupportedVersion { .. } => "unsupported_version",
            CwlError::InvalidVersion { .. } => "invalid_version",
            CwlError::NoSuchInput { .. } => "no_such_input",
            CwlError::NoSuchOutput { .. } => "no_such_output",
            CwlError::DuplicateVersion { .. } => "duplicate_version",
            CwlError::Runtime(_) => "runtime",
            CwlError::Yaml(_) => "yaml",
            CwlError::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incompatible_type_message() {
        let error = CwlError::incompatible_type("step2/message", "string", "int");
        assert_eq!(
            error.to_string(),
            "Incompatible types for step2/message: expected string, got int"
        );
        assert_eq!(error.code(), "incompatible_type");
    }

    #[test]
    fn test_incompatible_value_message() {
        let error = CwlError::incompatible_value("message", "string", 42);
        let display = error.to_string();
        assert!(display.contains("42"));
        assert!(display.contains("message"));
        assert!(display.contains("string"));
    }

    #[test]
    fn test_bad_document() {
        let error = CwlError::bad_document("file:///tmp/missing.cwl", "not found");
        match &error {
            CwlError::BadDocument { uri, message } => {
                assert_eq!(uri, "file:///tmp/missing.cwl");
                assert_eq!(message, "not found");
            }
            _ => panic!("Expected bad document error"),
        }
        assert_eq!(error.code(), "bad_document");
    }

    #[test]
    fn test_runtime_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let runtime = RuntimeError::filesystem_error("Failed to read".to_string(), None, io_error);
        let error: CwlError = runtime.into();
        assert_eq!(error.code(), "runtime");
        assert!(error.to_string().contains("Failed to read"));
    }
}
