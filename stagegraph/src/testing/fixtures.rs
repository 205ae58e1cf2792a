//! Stage and execution fixtures.

use crate::model::{Execution, ExecutionStatus, ExecutionType, Stage, SyntheticStageOwner, Trigger};
use serde_json::Value;

/// A top-level stage with a ref id and requisites.
#[must_use]
pub fn dag_stage(id: &str, ref_id: &str, requisites: &[&str]) -> Stage {
    Stage::new("wait")
        .with_id(id)
        .with_ref_id(ref_id)
        .with_requisite_stage_ref_ids(requisites.iter().copied())
}

/// A synthetic stage owned by `parent`.
#[must_use]
pub fn synthetic_stage(parent: &Stage, owner: SyntheticStageOwner, id: &str) -> Stage {
    Stage::synthetic(parent, owner, "wait", id).with_id(id)
}

/// A terminal `pipeline` stage that started `child_execution_id`.
#[must_use]
pub fn failed_pipeline_stage(id: &str, child_execution_id: &str) -> Stage {
    Stage::new("pipeline")
        .with_id(id)
        .with_ref_id(id)
        .with_status(ExecutionStatus::Terminal)
        .with_context_value("executionId", Value::String(child_execution_id.to_string()))
}

/// Builder for executions used in tests.
#[derive(Debug, Clone)]
pub struct TestExecution {
    execution: Execution,
}

impl TestExecution {
    /// Starts a pipeline execution for the `orders` application.
    #[must_use]
    pub fn pipeline(id: &str) -> Self {
        Self {
            execution: Execution::new(ExecutionType::Pipeline, "orders")
                .with_id(id)
                .with_name(format!("{id}-pipeline")),
        }
    }

    /// Starts an orchestration for the `orders` application.
    #[must_use]
    pub fn orchestration(id: &str) -> Self {
        Self {
            execution: Execution::new(ExecutionType::Orchestration, "orders").with_id(id),
        }
    }

    /// Sets the application.
    #[must_use]
    pub fn application(mut self, application: &str) -> Self {
        self.execution.application = application.to_string();
        self
    }

    /// Appends a stage.
    ///
    /// # Panics
    ///
    /// Panics if the stage cannot be added.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        if let Err(e) = self.execution.add_stage(stage) {
            panic!("invalid fixture stage: {e}");
        }
        self
    }

    /// Appends several stages.
    #[must_use]
    pub fn stages(self, stages: impl IntoIterator<Item = Stage>) -> Self {
        stages.into_iter().fold(self, Self::stage)
    }

    /// Marks the execution as started by `parent`.
    #[must_use]
    pub fn triggered_by(mut self, parent: Execution, parent_stage_id: Option<&str>) -> Self {
        self.execution.trigger = Trigger::pipeline(parent, parent_stage_id.map(str::to_string));
        self
    }

    /// Finishes the execution.
    #[must_use]
    pub fn build(self) -> Execution {
        self.execution
    }
}
