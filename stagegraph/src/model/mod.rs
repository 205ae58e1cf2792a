//! The execution model: stages, executions and triggers.

mod execution;
mod stage;
mod status;
mod trigger;

pub use execution::{Execution, SharedExecution};
pub use stage::{Stage, STAGE_BACKOFF_PERIOD_OVERRIDE_KEY, STAGE_TIMEOUT_OVERRIDE_KEY};
pub use status::{ExecutionStatus, ExecutionType, SyntheticStageOwner};
pub use trigger::{ManualTrigger, PipelineTrigger, Trigger};
