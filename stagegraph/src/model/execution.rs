//! A running or completed workflow and its stage arena.

use super::{ExecutionStatus, ExecutionType, Stage, Trigger};
use crate::errors::{ContractErrorInfo, GraphError, GraphValidationError};
use crate::utils::{next_execution_id, Timestamp};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// One instantiated workflow.
///
/// Stages are kept in insertion order. They are appended while the
/// execution is assembled and are never reordered or removed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    id: String,
    /// Pipeline or ad-hoc orchestration.
    #[serde(rename = "type")]
    pub execution_type: ExecutionType,
    /// The owning application.
    pub application: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Id of the pipeline configuration this execution was started from.
    #[serde(default)]
    pub pipeline_config_id: Option<String>,
    /// Overall status; owned by the dispatcher.
    #[serde(default)]
    pub status: ExecutionStatus,
    /// When the execution was created.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub build_time: Option<Timestamp>,
    /// When the execution started.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<Timestamp>,
    /// When the execution ended.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<Timestamp>,
    #[serde(default)]
    stages: Vec<Stage>,
    /// What started the execution.
    #[serde(default)]
    pub trigger: Trigger,
}

impl Execution {
    /// Creates an empty execution with a fresh id and a manual trigger.
    #[must_use]
    pub fn new(execution_type: ExecutionType, application: impl Into<String>) -> Self {
        Self {
            id: next_execution_id(),
            execution_type,
            application: application.into(),
            name: None,
            pipeline_config_id: None,
            status: ExecutionStatus::NotStarted,
            build_time: Some(chrono::Utc::now()),
            start_time: None,
            end_time: None,
            stages: Vec::new(),
            trigger: Trigger::default(),
        }
    }

    /// Replaces the generated id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the pipeline configuration id.
    #[must_use]
    pub fn with_pipeline_config_id(mut self, id: impl Into<String>) -> Self {
        self.pipeline_config_id = Some(id.into());
        self
    }

    /// Sets the trigger.
    #[must_use]
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = trigger;
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    /// The execution id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Stages in insertion order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Mutable access to each stage, in insertion order.
    pub fn stages_mut(&mut self) -> impl Iterator<Item = &mut Stage> {
        self.stages.iter_mut()
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the stage breaks the synthetic-stage
    /// invariant or its id is already taken.
    pub fn add_stage(&mut self, stage: Stage) -> Result<&Stage, GraphError> {
        stage.validate()?;

        if self.stage_by_id(stage.id()).is_some() {
            return Err(GraphValidationError::new(format!(
                "Stage {} already exists in execution {}",
                stage.id(),
                self.id
            ))
            .with_error_info(
                ContractErrorInfo::new("GRAPH-005-DUPLICATE", "Duplicate stage id")
                    .with_context_entry("stageId", stage.id()),
            )
            .into());
        }

        self.stages.push(stage);
        let index = self.stages.len() - 1;
        Ok(&self.stages[index])
    }

    /// Looks up a stage by id.
    #[must_use]
    pub fn stage_by_id(&self, stage_id: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id() == stage_id)
    }

    /// Looks up a stage by id for mutation.
    pub fn stage_by_id_mut(&mut self, stage_id: &str) -> Option<&mut Stage> {
        self.stages.iter_mut().find(|s| s.id() == stage_id)
    }

    /// Looks up a stage by id, failing if it is absent.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::StageNotFound` if no stage has the id.
    pub fn require_stage(&self, stage_id: &str) -> Result<&Stage, GraphError> {
        self.stage_by_id(stage_id)
            .ok_or_else(|| GraphError::stage_not_found(&self.id, stage_id))
    }

    /// The first stage carrying `ref_id`.
    #[must_use]
    pub fn stage_by_ref_id(&self, ref_id: &str) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.ref_id.as_deref() == Some(ref_id))
    }

    /// Position of a stage in insertion order.
    #[must_use]
    pub fn index_of(&self, stage_id: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.id() == stage_id)
    }

    /// Stages that are not synthetic.
    pub fn top_level_stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter().filter(|s| !s.is_synthetic())
    }

    /// Top-level stages with no requisite stages; where the dispatcher starts.
    pub fn initial_stages(&self) -> impl Iterator<Item = &Stage> {
        self.top_level_stages()
            .filter(|s| s.requisite_stage_ref_ids.is_empty())
    }

    /// The execution that triggered this one, if any.
    #[must_use]
    pub fn parent_execution(&self) -> Option<&Execution> {
        self.trigger.parent_execution()
    }

    /// Copies strategy parameters from the trigger into a stage's context.
    ///
    /// Only applies to pipelines whose trigger parameters set `strategy` to
    /// true. `cloudProvider`, `cluster` and `credentials` are copied as-is
    /// (null when absent); `region` becomes `regions`, otherwise `zone`
    /// becomes `zones`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::StageNotFound` if the stage is not part of this execution.
    pub fn resolve_strategy_params(&mut self, stage_id: &str) -> Result<(), GraphError> {
        if self.stage_by_id(stage_id).is_none() {
            return Err(GraphError::stage_not_found(&self.id, stage_id));
        }
        if self.execution_type != ExecutionType::Pipeline {
            return Ok(());
        }

        let parameters = self.trigger.parameters().clone();
        let strategy = parameters
            .get("strategy")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !strategy {
            return Ok(());
        }

        let Some(stage) = self.stage_by_id_mut(stage_id) else {
            return Ok(());
        };
        for key in ["cloudProvider", "cluster", "credentials"] {
            stage
                .context
                .set(key, parameters.get(key).cloned().unwrap_or(Value::Null));
        }
        if let Some(region) = parameters.get("region").filter(|v| !v.is_null()) {
            stage
                .context
                .set("regions", Value::Array(vec![region.clone()]));
        } else if let Some(zone) = parameters.get("zone").filter(|v| !v.is_null()) {
            stage.context.set("zones", Value::Array(vec![zone.clone()]));
        }

        Ok(())
    }

    /// Wraps the execution for shared access.
    #[must_use]
    pub fn into_shared(self) -> SharedExecution {
        SharedExecution::new(self)
    }
}

/// An execution shared between the dispatcher and readers.
///
/// Graph algorithms borrow an `&Execution`. Run them either under
/// [`SharedExecution::read`] or on a [`SharedExecution::snapshot`]; both give
/// the traversal one point-in-time view of the stages, and neither holds
/// off mutation for longer than the traversal itself.
#[derive(Debug, Clone)]
pub struct SharedExecution(Arc<RwLock<Execution>>);

impl SharedExecution {
    /// Wraps an execution.
    #[must_use]
    pub fn new(execution: Execution) -> Self {
        Self(Arc::new(RwLock::new(execution)))
    }

    /// Acquires a read guard.
    pub fn read(&self) -> RwLockReadGuard<'_, Execution> {
        self.0.read()
    }

    /// Acquires a write guard.
    pub fn write(&self) -> RwLockWriteGuard<'_, Execution> {
        self.0.write()
    }

    /// Clones the current state of the execution.
    #[must_use]
    pub fn snapshot(&self) -> Execution {
        self.0.read().clone()
    }
}
