//! Runtime Module
//!
//! Filesystem helpers used when documents are written or staged, plus the
//! boundary to the external CWL engine that executes generated workflows.

pub mod config;
pub mod error;
pub mod fs_utils;
pub mod runner;

pub use config::{load_config, save_config, RunnerConfig};
pub use error::{IntoRuntimeError, RuntimeError, RuntimeResult};
pub use runner::{CwlRunner, EngineCommand};
