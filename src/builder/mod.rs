//! Builders turning processes into steps and steps into workflows
//!
//! [`StepBuilder`] wraps one process into a step with step-scoped IO copies.
//! The caller then links steps together through
//! [`WorkflowStep::set_input`](crate::model::WorkflowStep::set_input) and
//! hands the list to [`WorkflowBuilder`], which mints the workflow-level
//! parameters, infers requirements and saves the resulting document.

pub mod ids;
pub mod step;
pub mod workflow;

pub use step::{StepBuilder, StepIdGenerator, StepOptions};
pub use workflow::{Capabilities, WorkflowBuilder};
