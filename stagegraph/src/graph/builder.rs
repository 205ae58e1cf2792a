//! Builds an execution from raw stage configuration.

use crate::errors::{ContractErrorInfo, GraphError, GraphValidationError};
use crate::model::{Execution, ExecutionType, Stage, Trigger};
use crate::observability::execution_span;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Options applied to every execution a builder produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildOptions {
    /// Name given to the execution.
    pub name: Option<String>,
    /// Pipeline or orchestration.
    pub execution_type: ExecutionType,
    /// Pipeline configuration the execution was started from.
    pub pipeline_config_id: Option<String>,
    /// Provider types whose stages keep their plain type.
    pub legacy_provider_types: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            name: None,
            execution_type: ExecutionType::Pipeline,
            pipeline_config_id: None,
            legacy_provider_types: vec!["aws".to_string(), "titus".to_string()],
        }
    }
}

impl BuildOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the execution name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the execution type.
    #[must_use]
    pub fn with_execution_type(mut self, execution_type: ExecutionType) -> Self {
        self.execution_type = execution_type;
        self
    }

    /// Sets the pipeline configuration id.
    #[must_use]
    pub fn with_pipeline_config_id(mut self, id: impl Into<String>) -> Self {
        self.pipeline_config_id = Some(id.into());
        self
    }

    /// Replaces the legacy provider types.
    #[must_use]
    pub fn with_legacy_provider_types(
        mut self,
        types: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.legacy_provider_types = types.into_iter().map(Into::into).collect();
        self
    }

    fn is_legacy_provider(&self, provider_type: &str) -> bool {
        self.legacy_provider_types
            .iter()
            .any(|legacy| legacy == provider_type)
    }
}

/// Turns raw stage configuration into an [`Execution`].
///
/// The builder neither persists nor dispatches what it builds.
#[derive(Debug, Clone, Default)]
pub struct ExecutionBuilder {
    options: BuildOptions,
}

impl ExecutionBuilder {
    /// Creates a builder with the given options.
    #[must_use]
    pub fn new(options: BuildOptions) -> Self {
        Self { options }
    }

    /// The builder's options.
    #[must_use]
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Builds an execution with one stage per raw entry, in input order.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the stage list is absent, an entry is
    /// not an object, an entry has no string `type`, or one of the extracted
    /// fields is malformed.
    pub fn build(
        &self,
        application: &str,
        raw_stages: Option<&[Value]>,
        trigger: Trigger,
    ) -> Result<Execution, GraphError> {
        let execution_name = self.options.name.as_deref().unwrap_or("<unnamed>");

        let raw_stages = raw_stages.ok_or_else(|| {
            GraphValidationError::new(format!(
                "Execution {execution_name} for application {application} has no stages"
            ))
            .with_error_info(
                ContractErrorInfo::new("GRAPH-006-NO_STAGES", "Stage list is absent")
                    .with_fix_hint("Provide a `stages` list, even an empty one.")
                    .with_context_entry("application", application),
            )
        })?;

        let mut execution = Execution::new(self.options.execution_type, application)
            .with_trigger(trigger);
        execution.name.clone_from(&self.options.name);
        execution
            .pipeline_config_id
            .clone_from(&self.options.pipeline_config_id);

        for (index, raw) in raw_stages.iter().enumerate() {
            let stage = self.build_stage(execution_name, application, index, raw)?;
            execution.add_stage(stage)?;
        }

        execution_span(&execution).in_scope(|| {
            tracing::debug!(stage_count = execution.stages().len(), "Built execution");
        });

        Ok(execution)
    }

    fn build_stage(
        &self,
        execution_name: &str,
        application: &str,
        index: usize,
        raw: &Value,
    ) -> Result<Stage, GraphError> {
        let Value::Object(config) = raw else {
            return Err(GraphValidationError::new(format!(
                "Stage {index} of execution {execution_name} for application {application} is not an object"
            ))
            .with_error_info(
                ContractErrorInfo::new("GRAPH-004-FIELD", "Malformed stage entry")
                    .with_context_entry("field", format!("stages[{index}]")),
            )
            .into());
        };

        let name = config.get("name").and_then(Value::as_str).map(str::to_string);
        let Some(base_type) = config.get("type").and_then(Value::as_str) else {
            let stage_name = name.as_deref().unwrap_or("<unnamed>");
            return Err(GraphValidationError::new(format!(
                "Stage {stage_name} of execution {execution_name} for application {application} is missing a type"
            ))
            .with_error_info(
                ContractErrorInfo::new("GRAPH-001-MISSING_TYPE", "Stage has no type")
                    .with_fix_hint("Every stage needs a string `type`.")
                    .with_context_entry("application", application)
                    .with_context_entry("execution", execution_name)
                    .with_context_entry("stage", stage_name),
            )
            .into());
        };

        let stage_type = match config.get("providerType").and_then(Value::as_str) {
            Some(provider) if !self.options.is_legacy_provider(provider) => {
                format!("{base_type}_{provider}")
            }
            _ => base_type.to_string(),
        };

        let context: Map<String, Value> = config.clone();
        Stage::from_config(stage_type, name, context).map_err(Into::into)
    }
}
