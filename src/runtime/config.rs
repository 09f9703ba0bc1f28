//! Runner configuration
//!
//! Settings for handing a generated workflow to an external CWL engine. They
//! are stored as TOML; a missing settings file means defaults.

use crate::runtime::error::{IntoRuntimeError, RuntimeError, RuntimeResult};
use crate::runtime::fs_utils::write_file_atomic;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Main configuration structure for engine execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Engine executable
    pub engine: String,

    /// Flags appended after the workflow and config documents
    pub extra_args: Vec<String>,

    /// Copy the workflow document into the working directory and run the copy
    pub copy_workflow: bool,

    /// Copy the config document into the working directory and run the copy
    pub copy_config: bool,

    /// Create File and Directory locations named by the config document
    /// when they do not exist yet
    pub create_missing_locations: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            engine: "cwltool".to_string(),
            extra_args: Vec::new(),
            copy_workflow: true,
            copy_config: true,
            create_missing_locations: true,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set engine executable
    pub fn with_engine<S: Into<String>>(mut self, engine: S) -> Self {
        self.engine = engine.into();
        self
    }

    /// Add an engine flag
    pub fn with_extra_arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn with_copy_workflow(mut self, copy: bool) -> Self {
        self.copy_workflow = copy;
        self
    }

    pub fn with_copy_config(mut self, copy: bool) -> Self {
        self.copy_config = copy;
        self
    }

    pub fn with_create_missing_locations(mut self, create: bool) -> Self {
        self.create_missing_locations = create;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.engine.trim().is_empty() {
            return Err(RuntimeError::configuration_error(
                "engine must not be empty".to_string(),
                Some("engine".to_string()),
            ));
        }
        Ok(())
    }
}

/// Load settings from a TOML file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> RuntimeResult<RunnerConfig> {
    let config = match fs::read_to_string(path) {
        Ok(contents) => toml::from_str::<RunnerConfig>(&contents).map_err(|e| {
            RuntimeError::configuration_error(
                format!("Failed to parse {} as TOML: {}", path.display(), e),
                None,
            )
        })?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => RunnerConfig::default(),
        Err(err) => {
            return Err(err)
                .runtime_context_with_path("Failed to read settings", &path.display().to_string())
        }
    };
    config.validate()?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &RunnerConfig) -> RuntimeResult<()> {
    let serialized = toml::to_string(config).map_err(|e| {
        RuntimeError::configuration_error(
            format!("Failed to serialize settings to TOML: {}", e),
            None,
        )
    })?;
    write_file_atomic(path, serialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.engine, "cwltool");
        assert!(config.extra_args.is_empty());
        assert!(config.copy_workflow);
        assert!(config.copy_config);
        assert!(config.create_missing_locations);
    }

    #[test]
    fn test_config_fluent_api() {
        let config = RunnerConfig::new()
            .with_engine("toil-cwl-runner")
            .with_extra_arg("--parallel")
            .with_copy_workflow(false)
            .with_create_missing_locations(false);

        assert_eq!(config.engine, "toil-cwl-runner");
        assert_eq!(config.extra_args, vec!["--parallel".to_string()]);
        assert!(!config.copy_workflow);
        assert!(config.copy_config);
        assert!(!config.create_missing_locations);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("cwlflow.toml")).unwrap();
        assert_eq!(config, RunnerConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cwlflow.toml");
        let config = RunnerConfig::new()
            .with_engine("cwltool")
            .with_extra_arg("--outdir")
            .with_extra_arg("out")
            .with_copy_config(false);

        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cwlflow.toml");
        std::fs::write(&path, "engine = \"toil-cwl-runner\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.engine, "toil-cwl-runner");
        assert!(config.copy_workflow);
    }

    #[test]
    fn test_invalid_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cwlflow.toml");

        std::fs::write(&path, "engine = [").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(RuntimeError::ConfigurationError { .. })
        ));

        std::fs::write(&path, "engine = \"  \"\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(RuntimeError::ConfigurationError { .. })
        ));

        assert!(load_config(temp_dir.path()).is_err());
    }
}
