//! # cwlflow
//!
//! Build, type-check, link and serialize CWL (Common Workflow Language)
//! workflows.
//!
//! Processes (command line tools and workflows) are loaded from CWL documents,
//! wrapped into workflow steps whose inputs can be assigned literal values or
//! linked to upstream outputs, and assembled into new workflow documents with
//! their inputs, outputs and requirements derived automatically.

pub mod builder;
pub mod catalog;
pub mod error;
pub mod model;
pub mod parser;
pub mod requirements;
pub mod runtime;
pub mod types;
pub mod value;
pub mod version;

pub use builder::{Capabilities, StepBuilder, StepOptions, WorkflowBuilder};
pub use catalog::{CatalogReport, ProcessCatalog};
pub use error::{CwlError, CwlResult};
pub use model::{
    Assignment, CommandLineTool, OutputRef, Parameter, Process, ProcessSource,
    ResolutionContext, Source, StepIo, Workflow, WorkflowStep, WorkflowStepInput,
    WorkflowStepOutput,
};
pub use parser::{LocalNormalizer, Normalizer, NormalizerOptions};
pub use requirements::Requirement;
pub use runtime::{CwlRunner, RunnerConfig};
pub use types::{BasicKind, CwlType};
pub use value::Value;
pub use version::Version;
