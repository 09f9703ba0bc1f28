//! Runtime-specific error types
//!
//! This module defines errors raised by filesystem helpers and by the
//! external execution engine boundary, separate from the model errors in the
//! main error module.

use std::fmt;
use std::io;
use std::process::ExitStatus;

/// Runtime errors
#[derive(Debug)]
pub enum RuntimeError {
    /// The execution engine exited unsuccessfully
    CommandFailed {
        /// Command line that was run
        command: String,
        /// Exit status, if the process ran at all
        exit_status: Option<ExitStatus>,
        /// Working directory
        working_dir: String,
    },

    /// The execution engine could not be started
    SpawnFailed {
        /// Executable that failed to start
        command: String,
        /// Underlying IO error
        io_error: io::Error,
    },

    /// File system operation failed
    FileSystemError {
        /// Error message
        message: String,
        /// File path if relevant
        path: Option<String>,
        /// Underlying IO error
        io_error: io::Error,
    },

    /// Expected a regular file
    NotAFile {
        /// Offending path
        path: String,
    },

    /// Expected a directory
    NotADirectory {
        /// Offending path
        path: String,
    },

    /// Configuration error
    ConfigurationError {
        /// Error message
        message: String,
        /// Configuration key if relevant
        key: Option<String>,
    },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::CommandFailed {
                command,
                exit_status,
                working_dir,
            } => {
                write!(f, "Command failed: {}", command)?;
                if let Some(status) = exit_status {
                    write!(f, " (exit status: {})", status)?;
                }
                write!(f, " in directory: {}", working_dir)
            }
            RuntimeError::SpawnFailed { command, io_error } => {
                write!(f, "Failed to spawn {}: {}", command, io_error)
            }
            RuntimeError::FileSystemError {
                message,
                path,
                io_error,
            } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "File system error at {}: {} ({})",
                        path, message, io_error
                    )
                } else {
                    write!(f, "File system error: {} ({})", message, io_error)
                }
            }
            RuntimeError::NotAFile { path } => write!(f, "{} is not a file", path),
            RuntimeError::NotADirectory { path } => write!(f, "{} is not a directory", path),
            RuntimeError::ConfigurationError { message, key } => {
                if let Some(key) = key {
                    write!(f, "Configuration error ({}): {}", key, message)
                } else {
                    write!(f, "Configuration error: {}", message)
                }
            }
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::SpawnFailed { io_error, .. }
            | RuntimeError::FileSystemError { io_error, .. } => {
                Some(io_error as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl RuntimeError {
    /// Create a command failed error
    pub fn command_failed(
        command: String,
        exit_status: Option<ExitStatus>,
        working_dir: String,
    ) -> Self {
        Self::CommandFailed {
            command,
            exit_status,
            working_dir,
        }
    }

    /// Create a file system error
    pub fn filesystem_error(message: String, path: Option<String>, io_error: io::Error) -> Self {
        Self::FileSystemError {
            message,
            path,
            io_error,
        }
    }

    /// Create a configuration error
    pub fn configuration_error(message: String, key: Option<String>) -> Self {
        Self::ConfigurationError { message, key }
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Extension trait for converting IO errors to runtime errors
pub trait IntoRuntimeError<T> {
    fn runtime_context(self, message: &str) -> RuntimeResult<T>;
    fn runtime_context_with_path(self, message: &str, path: &str) -> RuntimeResult<T>;
}

impl<T> IntoRuntimeError<T> for Result<T, io::Error> {
    fn runtime_context(self, message: &str) -> RuntimeResult<T> {
        self.map_err(|e| RuntimeError::filesystem_error(message.to_string(), None, e))
    }

    fn runtime_context_with_path(self, message: &str, path: &str) -> RuntimeResult<T> {
        self.map_err(|e| {
            RuntimeError::filesystem_error(message.to_string(), Some(path.to_string()), e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn test_command_failed_display() {
        let error = RuntimeError::command_failed(
            "cwltool wf.cwl wf.yaml".to_string(),
            Some(ExitStatus::from_raw(256)), // exit code 1
            "/tmp/staging".to_string(),
        );

        let display = format!("{}", error);
        assert!(display.contains("Command failed: cwltool wf.cwl wf.yaml"));
        assert!(display.contains("in directory: /tmp/staging"));
    }

    #[test]
    fn test_filesystem_error() {
        let io_error = Error::new(ErrorKind::NotFound, "File not found");
        let error = RuntimeError::filesystem_error(
            "Cannot read file".to_string(),
            Some("/path/to/file".to_string()),
            io_error,
        );

        let display = format!("{}", error);
        assert!(display.contains("File system error at /path/to/file"));
        assert!(display.contains("Cannot read file"));
        assert!(display.contains("File not found"));
    }

    #[test]
    fn test_into_runtime_error_extension() {
        let io_error = Error::new(ErrorKind::PermissionDenied, "Permission denied");
        let result: Result<(), _> = Err(io_error);

        let runtime_result = result.runtime_context_with_path("Failed to write", "/tmp/test");
        if let Err(RuntimeError::FileSystemError { message, path, .. }) = runtime_result {
            assert_eq!(message, "Failed to write");
            assert_eq!(path.as_deref(), Some("/tmp/test"));
        } else {
            panic!("Expected FileSystemError");
        }
    }

    #[test]
    fn test_configuration_error_display() {
        let error = RuntimeError::configuration_error(
            "engine must not be empty".to_string(),
            Some("engine".to_string()),
        );
        assert_eq!(
            error.to_string(),
            "Configuration error (engine): engine must not be empty"
        );
    }
}
