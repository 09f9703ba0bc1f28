//! External engine invocation
//!
//! Generated workflows are executed by an external CWL engine (`cwltool` by
//! default). The runner stages the workflow and its config document in the
//! working directory and waits for the engine to finish.

use crate::error::{CwlError, CwlResult};
use crate::runtime::config::RunnerConfig;
use crate::runtime::error::{IntoRuntimeError, RuntimeError};
use crate::runtime::fs_utils::{
    copy_file, create_dir_all, directory_exists, file_exists, path_to_uri, read_file_to_string,
    uri_to_path, write_file_atomic,
};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// A fully staged engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl EngineCommand {
    /// Command line as a single string, for logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct CwlRunner {
    config: RunnerConfig,
}

impl CwlRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Stage the documents in `cwd` (the current directory by default) and
    /// build the engine command line.
    pub fn prepare(
        &self,
        workflow: &Path,
        config: Option<&Path>,
        cwd: Option<&Path>,
    ) -> CwlResult<EngineCommand> {
        self.config.validate()?;
        let cwd = directory_exists(cwd.unwrap_or_else(|| Path::new(".")))?;

        let mut workflow = file_exists(workflow)?;
        if self.config.copy_workflow && workflow.parent() != Some(cwd.as_path()) {
            workflow = stage_workflow(&workflow, &cwd)?;
        }

        let mut args = vec![workflow.display().to_string()];
        if let Some(config) = config {
            let mut config = file_exists(config)?;
            if self.config.copy_config && config.parent() != Some(cwd.as_path()) {
                let copy = cwd.join(file_name(&config)?);
                warn!(
                    config = %config.display(),
                    cwd = %cwd.display(),
                    "config document copied to working directory"
                );
                copy_file(&config, &copy)?;
                config = copy;
            }
            if self.config.create_missing_locations {
                create_missing_locations(&config)?;
            }
            args.push(config.display().to_string());
        }
        args.extend(self.config.extra_args.iter().cloned());

        Ok(EngineCommand {
            program: self.config.engine.clone(),
            args,
            working_dir: cwd,
        })
    }

    /// Run the engine and wait for it. Success means exit code 0.
    pub fn run(&self, workflow: &Path, config: Option<&Path>, cwd: Option<&Path>) -> CwlResult<()> {
        let command = self.prepare(workflow, config, cwd)?;
        info!(
            command = %command.display(),
            cwd = %command.working_dir.display(),
            "running cwl engine"
        );

        let status = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .status()
            .map_err(|io_error| RuntimeError::SpawnFailed {
                command: command.program.clone(),
                io_error,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::command_failed(
                command.display(),
                Some(status),
                command.working_dir.display().to_string(),
            )
            .into())
        }
    }
}

fn file_name(path: &Path) -> CwlResult<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| {
        RuntimeError::NotAFile {
            path: path.display().to_string(),
        }
        .into()
    })
}

/// Copy the workflow into `cwd` and point its id at the copy.
fn stage_workflow(workflow: &Path, cwd: &Path) -> CwlResult<PathBuf> {
    let copy = cwd.join(file_name(workflow)?);
    warn!(
        workflow = %workflow.display(),
        cwd = %cwd.display(),
        "workflow document copied to working directory"
    );
    let text = read_file_to_string(workflow)?;
    let mut document: JsonValue = serde_yaml::from_str(&text)
        .map_err(|e| CwlError::bad_document(workflow.display().to_string(), e))?;
    if let JsonValue::Object(document) = &mut document {
        document.insert("id".to_string(), JsonValue::String(path_to_uri(&copy)?));
    }
    write_file_atomic(&copy, serde_yaml::to_string(&document)?)?;
    Ok(copy)
}

/// Create every File or Directory location of a config document that is missing.
///
/// Relative locations resolve against the folder of the config document.
fn create_missing_locations(config: &Path) -> CwlResult<()> {
    let base = config.parent().unwrap_or_else(|| Path::new("."));
    let text = read_file_to_string(config)?;
    let document: JsonValue = serde_yaml::from_str(&text)
        .map_err(|e| CwlError::bad_document(config.display().to_string(), e))?;
    let JsonValue::Object(entries) = document else {
        return Ok(());
    };

    for value in entries.values() {
        let class = value.get("class").and_then(JsonValue::as_str);
        let location = value
            .get("location")
            .or_else(|| value.get("path"))
            .and_then(JsonValue::as_str);
        let (Some(class), Some(location)) = (class, location) else {
            continue;
        };
        // Remote locations are staged by the engine itself
        let Some(location) = uri_to_path(location) else {
            continue;
        };
        let path = base.join(location);
        if path.exists() {
            continue;
        }
        match class {
            "Directory" => {
                warn!(path = %path.display(), "creating missing directory to run workflow");
                create_dir_all(&path)?;
            }
            "File" => {
                warn!(path = %path.display(), "creating missing file to run workflow");
                if let Some(parent) = path.parent() {
                    create_dir_all(parent)?;
                }
                std::fs::File::create(&path)
                    .runtime_context_with_path("Failed to create file", &path.display().to_string())?;
            }
            _ => {}
        }
    }
    Ok(())
}
