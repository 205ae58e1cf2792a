//! Failure chains across nested pipelines.
//!
//! When a `pipeline` stage fails because the child execution it started
//! failed, the UI shows one record per level, each deep-linking to the
//! failing stage and to its neighbours. Extraction of the human-readable
//! error is best effort: any missing or oddly shaped context degrades to
//! [`EXCEPTION_NOT_FOUND`].

use crate::errors::GraphError;
use crate::model::{Execution, ExecutionStatus, ExecutionType, Stage};
use crate::observability::execution_span;
use crate::persistence::ExecutionRepository;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::Instrument;

/// Message used when no error can be extracted from a stage.
pub const EXCEPTION_NOT_FOUND: &str = "NOT_FOUND_CHECK_UI";

const PIPELINE_STAGE_TYPE: &str = "pipeline";
const RUN_JOB_MANIFEST_STAGE_TYPE: &str = "runJobManifest";

/// Configuration for failure chain building.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FailureChainConfig {
    /// Origin of the UI that deep links point at.
    pub ui_origin: String,
    /// Maximum number of records in one chain.
    pub max_depth: usize,
}

impl Default for FailureChainConfig {
    fn default() -> Self {
        Self {
            ui_origin: "http://localhost:9000".to_string(),
            max_depth: 16,
        }
    }
}

impl FailureChainConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the UI origin.
    #[must_use]
    pub fn with_ui_origin(mut self, origin: impl Into<String>) -> Self {
        self.ui_origin = origin.into();
        self
    }

    /// Sets the maximum chain length.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// One level of a failure chain, as rendered by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedStageExecution {
    /// Application owning the failed execution.
    pub application: String,
    /// The failed execution.
    pub execution_id: String,
    /// Name of the failed execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_name: Option<String>,
    /// The failing stage.
    pub stage_id: String,
    /// Name of the failing stage.
    pub stage_name: String,
    /// Type of the failing stage.
    pub stage_type: String,
    /// Position of the failing stage in the UI.
    pub stage_index: usize,
    /// Status of the failing stage.
    pub stage_status: ExecutionStatus,
    /// Error message, or [`EXCEPTION_NOT_FOUND`].
    pub exception_message: String,
    /// Deep link to the failing stage.
    pub pipeline_execution_url: String,
    /// Execution that triggered this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<String>,
    /// Name of the triggering execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_name: Option<String>,
    /// Application of the triggering execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_application: Option<String>,
    /// Deep link into the triggering execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_pipeline_execution_url: Option<String>,
    /// Execution started by the failing `pipeline` stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_execution_id: Option<String>,
    /// Name of the child execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_execution_name: Option<String>,
    /// Application of the child execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_application: Option<String>,
    /// Deep link into the child execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_pipeline_execution_url: Option<String>,
}

/// Builds failure chain records.
#[derive(Debug, Clone, Default)]
pub struct FailureChainBuilder {
    config: FailureChainConfig,
}

impl FailureChainBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(config: FailureChainConfig) -> Self {
        Self { config }
    }

    /// The builder's configuration.
    #[must_use]
    pub fn config(&self) -> &FailureChainConfig {
        &self.config
    }

    /// Builds the record for one failing stage.
    #[must_use]
    pub fn build(
        &self,
        execution: &Execution,
        stage: &Stage,
        stage_index: usize,
    ) -> FailedStageExecution {
        let mut record = FailedStageExecution {
            application: execution.application.clone(),
            execution_id: execution.id().to_string(),
            execution_name: execution.name.clone(),
            stage_id: stage.id().to_string(),
            stage_name: stage.name().to_string(),
            stage_type: stage.stage_type.clone(),
            stage_index,
            stage_status: stage.status,
            exception_message: exception_message(stage),
            pipeline_execution_url: self.execution_url(
                &execution.application,
                execution.id(),
                stage_index,
                &stage.stage_type,
            ),
            parent_execution_id: None,
            parent_execution_name: None,
            parent_application: None,
            parent_pipeline_execution_url: None,
            child_execution_id: None,
            child_execution_name: None,
            child_application: None,
            child_pipeline_execution_url: None,
        };

        if let Some(trigger) = execution.trigger.as_pipeline() {
            let parent = &trigger.parent_execution;
            record.parent_execution_id = Some(parent.id().to_string());
            record.parent_execution_name.clone_from(&parent.name);
            record.parent_application = Some(parent.application.clone());
            record.parent_pipeline_execution_url = trigger
                .parent_pipeline_stage_id
                .as_deref()
                .and_then(|id| ui_index(parent, id))
                .map(|index| {
                    self.execution_url(&parent.application, parent.id(), index, PIPELINE_STAGE_TYPE)
                });
        }

        if stage.stage_type == PIPELINE_STAGE_TYPE {
            record.child_execution_id = context_string(stage, "executionId");
            record.child_execution_name = context_string(stage, "executionName");
            record.child_application = context_string(stage, "application");
        }

        record
    }

    /// Cross-links adjacent records, root first.
    ///
    /// Each record's child link points at the next record, and each record's
    /// parent link points at the previous one.
    #[must_use]
    pub fn link_chain(&self, mut chain: Vec<FailedStageExecution>) -> Vec<FailedStageExecution> {
        for index in 1..chain.len() {
            let parent_url = chain[index - 1].pipeline_execution_url.clone();
            let child_url = chain[index].pipeline_execution_url.clone();
            chain[index - 1].child_pipeline_execution_url = Some(child_url);
            chain[index].parent_pipeline_execution_url = Some(parent_url);
        }
        chain
    }

    /// Builds the full chain starting at a failing stage, following child
    /// executions through `repository`.
    ///
    /// The chain ends at a stage that did not start a child, at a child that
    /// cannot be found or has no terminal stage, or at the configured depth.
    ///
    /// # Errors
    ///
    /// Returns an error only if the repository itself fails.
    pub async fn build_chain<R>(
        &self,
        repository: &R,
        execution: &Execution,
        stage: &Stage,
        stage_index: usize,
    ) -> Result<Vec<FailedStageExecution>, GraphError>
    where
        R: ExecutionRepository + ?Sized,
    {
        let mut chain = vec![self.build(execution, stage, stage_index)];
        self.follow_children(repository, &mut chain)
            .instrument(execution_span(execution))
            .await?;

        tracing::debug!(
            execution_id = %execution.id(),
            stage_id = %stage.id(),
            depth = chain.len(),
            "Built failure chain"
        );

        Ok(self.link_chain(chain))
    }

    async fn follow_children<R>(
        &self,
        repository: &R,
        chain: &mut Vec<FailedStageExecution>,
    ) -> Result<(), GraphError>
    where
        R: ExecutionRepository + ?Sized,
    {
        while chain.len() < self.config.max_depth {
            let Some(child_id) = chain.last().and_then(|r| r.child_execution_id.clone()) else {
                break;
            };

            let Some(child) = repository.retrieve(ExecutionType::Pipeline, &child_id).await? else {
                tracing::warn!(
                    child_execution_id = %child_id,
                    depth = chain.len(),
                    "Child execution not found, ending failure chain"
                );
                break;
            };

            let stages = ui_ordered_stages(&child);
            let Some((index, failed)) = stages.iter().enumerate().find(|(_, s)| s.has_failed())
            else {
                tracing::debug!(
                    child_execution_id = %child.id(),
                    "Child execution has no terminal stage, ending failure chain"
                );
                break;
            };

            chain.push(self.build(&child, failed, index));
        }

        Ok(())
    }

    fn execution_url(
        &self,
        application: &str,
        execution_id: &str,
        stage_index: usize,
        stage_type: &str,
    ) -> String {
        let details = if stage_type == PIPELINE_STAGE_TYPE {
            "pipelineConfig"
        } else {
            "runJobConfig"
        };
        format!(
            "{}/#/applications/{application}/executions/details/{execution_id}?stage={stage_index}&step=0&details={details}",
            self.config.ui_origin
        )
    }
}

/// Extracts a stage's error message, or [`EXCEPTION_NOT_FOUND`].
#[must_use]
pub fn exception_message(stage: &Stage) -> String {
    let message = match stage.stage_type.as_str() {
        PIPELINE_STAGE_TYPE => stage
            .context
            .pointer("/exception/details/errors/0")
            .and_then(Value::as_str),
        RUN_JOB_MANIFEST_STAGE_TYPE => stage
            .context
            .get("kato.tasks")
            .and_then(|tasks| tasks.pointer("/0/exception/cause"))
            .and_then(Value::as_str),
        _ => None,
    };
    message.unwrap_or(EXCEPTION_NOT_FOUND).to_string()
}

fn context_string(stage: &Stage, key: &str) -> Option<String> {
    let text = match stage.context.get(key)? {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Top-level stages in the order the UI numbers them. Falls back to
/// insertion order when the stages cannot be sorted.
fn ui_ordered_stages(execution: &Execution) -> Vec<&Stage> {
    execution.sorted_stages().unwrap_or_else(|err| {
        tracing::warn!(
            execution_id = %execution.id(),
            error = %err,
            "Falling back to insertion order for failure chain"
        );
        execution.top_level_stages().collect()
    })
}

fn ui_index(execution: &Execution, stage_id: &str) -> Option<usize> {
    ui_ordered_stages(execution)
        .iter()
        .position(|s| s.id() == stage_id)
}
