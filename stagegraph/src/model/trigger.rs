//! What caused an execution to start.

use super::Execution;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The cause of an execution.
///
/// `Pipeline` links a child execution to the execution and stage that
/// started it; following those links walks the chain of parent executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trigger {
    /// Started by a user or an API call.
    Manual(ManualTrigger),
    /// Started by a `pipeline` stage of another execution.
    Pipeline(PipelineTrigger),
}

impl Default for Trigger {
    fn default() -> Self {
        Self::Manual(ManualTrigger::default())
    }
}

impl Trigger {
    /// Creates a manual trigger for a user.
    #[must_use]
    pub fn manual(user: impl Into<String>) -> Self {
        Self::Manual(ManualTrigger {
            user: Some(user.into()),
            parameters: Map::new(),
        })
    }

    /// Creates a pipeline trigger pointing at the parent execution and stage.
    #[must_use]
    pub fn pipeline(parent_execution: Execution, parent_pipeline_stage_id: Option<String>) -> Self {
        Self::Pipeline(PipelineTrigger {
            user: None,
            parameters: Map::new(),
            parent_execution: Box::new(parent_execution),
            parent_pipeline_stage_id,
        })
    }

    /// The parent execution, for pipeline triggers.
    #[must_use]
    pub fn parent_execution(&self) -> Option<&Execution> {
        match self {
            Self::Pipeline(trigger) => Some(&trigger.parent_execution),
            Self::Manual(_) => None,
        }
    }

    /// The pipeline trigger, if this is one.
    #[must_use]
    pub fn as_pipeline(&self) -> Option<&PipelineTrigger> {
        match self {
            Self::Pipeline(trigger) => Some(trigger),
            Self::Manual(_) => None,
        }
    }

    /// Trigger parameters.
    #[must_use]
    pub fn parameters(&self) -> &Map<String, Value> {
        match self {
            Self::Manual(trigger) => &trigger.parameters,
            Self::Pipeline(trigger) => &trigger.parameters,
        }
    }

    /// Mutable trigger parameters.
    pub fn parameters_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Self::Manual(trigger) => &mut trigger.parameters,
            Self::Pipeline(trigger) => &mut trigger.parameters,
        }
    }

    /// The triggering user, if known.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        match self {
            Self::Manual(trigger) => trigger.user.as_deref(),
            Self::Pipeline(trigger) => trigger.user.as_deref(),
        }
    }
}

/// Trigger for executions started directly.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualTrigger {
    /// The triggering user.
    #[serde(default)]
    pub user: Option<String>,
    /// Pipeline parameters.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Trigger for executions started by a `pipeline` stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTrigger {
    /// The triggering user.
    #[serde(default)]
    pub user: Option<String>,
    /// Pipeline parameters.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// The execution that started this one.
    pub parent_execution: Box<Execution>,
    /// The id of the `pipeline` stage in the parent that started this one.
    #[serde(default)]
    pub parent_pipeline_stage_id: Option<String>,
}
