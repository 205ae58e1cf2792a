//! A node in an execution's stage graph.

use super::{ExecutionStatus, SyntheticStageOwner};
use crate::context::StageContext;
use crate::errors::{ContractErrorInfo, GraphError, GraphValidationError};
use crate::utils::{next_stage_id, timestamp_from_value, Timestamp};
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Context key overriding a stage's timeout, in milliseconds.
pub const STAGE_TIMEOUT_OVERRIDE_KEY: &str = "stageTimeoutMs";

/// Context key overriding a stage's backoff period, in milliseconds.
pub const STAGE_BACKOFF_PERIOD_OVERRIDE_KEY: &str = "backoffPeriodMs";

/// A single stage of an execution.
///
/// Stages relate to each other two ways: DAG edges through `ref_id` /
/// `requisite_stage_ref_ids`, and the synthetic tree through
/// `parent_stage_id` / `synthetic_stage_owner`. Equality and hashing use the
/// stage id only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    id: String,
    /// The DAG-participation key.
    #[serde(default, deserialize_with = "deserialize_ref_id")]
    pub ref_id: Option<String>,
    /// Classification used for dispatch routing.
    #[serde(rename = "type")]
    pub stage_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Ref ids of stages that must complete before this one.
    #[serde(default, deserialize_with = "deserialize_requisite_ref_ids")]
    pub requisite_stage_ref_ids: BTreeSet<String>,
    /// Mutable input surface of the stage.
    #[serde(default)]
    pub context: StageContext,
    /// Values published for downstream stages.
    #[serde(default)]
    pub outputs: Map<String, Value>,
    /// Current status; owned by the dispatcher.
    #[serde(default)]
    pub status: ExecutionStatus,
    /// Owning stage id; set exactly when the stage is synthetic.
    #[serde(default)]
    pub parent_stage_id: Option<String>,
    /// Position relative to the owning stage.
    #[serde(default)]
    pub synthetic_stage_owner: Option<SyntheticStageOwner>,
    /// When the stage started.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<Timestamp>,
    /// When the stage ended.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<Timestamp>,
    /// When the stage is scheduled to run.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub scheduled_time: Option<Timestamp>,
    /// If the stage has not started by this time the dispatcher may skip it.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time_expiry: Option<Timestamp>,
}

impl Stage {
    /// Creates a new top-level stage of the given type.
    #[must_use]
    pub fn new(stage_type: impl Into<String>) -> Self {
        Self {
            id: next_stage_id(),
            ref_id: None,
            stage_type: stage_type.into(),
            name: None,
            requisite_stage_ref_ids: BTreeSet::new(),
            context: StageContext::new(),
            outputs: Map::new(),
            status: ExecutionStatus::NotStarted,
            parent_stage_id: None,
            synthetic_stage_owner: None,
            start_time: None,
            end_time: None,
            scheduled_time: None,
            start_time_expiry: None,
        }
    }

    /// Creates a stage from raw configuration.
    ///
    /// `refId`, `startTimeExpiry` and `requisiteStageRefIds` are removed from
    /// `context` and become fields; everything else becomes the stage context.
    ///
    /// # Errors
    ///
    /// Returns a validation error if one of the extracted keys has the wrong shape.
    pub fn from_config(
        stage_type: impl Into<String>,
        name: Option<String>,
        mut context: Map<String, Value>,
    ) -> Result<Self, GraphValidationError> {
        let mut stage = Self::new(stage_type);
        stage.name = name;

        stage.ref_id = match context.remove("refId") {
            None | Some(Value::Null) => None,
            Some(value) => Some(ref_id_string(&value).ok_or_else(|| {
                field_error("refId", &value, "a string or a number")
            })?),
        };

        stage.start_time_expiry = match context.remove("startTimeExpiry") {
            None | Some(Value::Null) => None,
            Some(value) => Some(timestamp_from_value(&value).map_err(|e| {
                field_error("startTimeExpiry", &value, &format!("epoch milliseconds ({e})"))
            })?),
        };

        stage.requisite_stage_ref_ids = match context.remove("requisiteStageRefIds") {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    ref_id_string(item).ok_or_else(|| {
                        field_error("requisiteStageRefIds", item, "a string or a number")
                    })
                })
                .collect::<Result<_, _>>()?,
            Some(value) => {
                return Err(field_error("requisiteStageRefIds", &value, "a list of ref ids"))
            }
        };

        stage.context = StageContext::from_map(context);
        Ok(stage)
    }

    /// Creates a synthetic stage owned by `parent`.
    #[must_use]
    pub fn synthetic(
        parent: &Self,
        owner: SyntheticStageOwner,
        stage_type: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut stage = Self::new(stage_type);
        stage.name = Some(name.into());
        stage.parent_stage_id = Some(parent.id.clone());
        stage.synthetic_stage_owner = Some(owner);
        stage
    }

    /// Replaces the generated id. Only meant for stages restored from storage
    /// or fixtures, before the stage is added to an execution.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the ref id.
    #[must_use]
    pub fn with_ref_id(mut self, ref_id: impl Into<String>) -> Self {
        self.ref_id = Some(ref_id.into());
        self
    }

    /// Sets the requisite ref ids.
    #[must_use]
    pub fn with_requisite_stage_ref_ids(
        mut self,
        ref_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.requisite_stage_ref_ids = ref_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the status.
    #[must_use]
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds a context entry.
    #[must_use]
    pub fn with_context_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.set(key, value);
        self
    }

    /// Sets start and end times.
    #[must_use]
    pub fn with_times(mut self, start: Option<Timestamp>, end: Option<Timestamp>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    /// The stage's unique id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The display name, falling back to the type.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.stage_type)
    }

    /// Sets the display name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Returns true if the stage was injected under a parent stage.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.parent_stage_id.is_some()
    }

    /// Returns true if the stage waits on more than one upstream stage.
    #[must_use]
    pub fn is_join(&self) -> bool {
        self.requisite_stage_ref_ids.len() > 1
    }

    /// Returns true for manual judgment stages.
    #[must_use]
    pub fn is_manual_judgment_type(&self) -> bool {
        self.stage_type == "manualJudgment"
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn has_succeeded(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    /// Returns true if the stage failed terminally.
    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.status == ExecutionStatus::Terminal
    }

    /// Checks the synthetic-stage invariant.
    ///
    /// # Errors
    ///
    /// Returns an error if exactly one of `parent_stage_id` and
    /// `synthetic_stage_owner` is set.
    pub fn validate(&self) -> Result<(), GraphValidationError> {
        if self.parent_stage_id.is_some() != self.synthetic_stage_owner.is_some() {
            return Err(GraphValidationError::new(format!(
                "Stage {} must set parentStageId and syntheticStageOwner together",
                self.id
            ))
            .with_error_info(
                ContractErrorInfo::new("GRAPH-003-SYNTHETIC", "Inconsistent synthetic stage")
                    .with_context_entry("stageId", self.id.clone()),
            ));
        }
        Ok(())
    }

    /// The stage's own timeout override.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.context_millis(STAGE_TIMEOUT_OVERRIDE_KEY)
    }

    /// The stage's own backoff period override.
    #[must_use]
    pub fn backoff_period(&self) -> Option<Duration> {
        self.context_millis(STAGE_BACKOFF_PERIOD_OVERRIDE_KEY)
    }

    fn context_millis(&self, key: &str) -> Option<Duration> {
        self.context
            .get_i64(key)
            .map(|ms| Duration::from_millis(u64::try_from(ms).unwrap_or(0)))
    }

    /// Whether the pipeline continues when this stage fails.
    #[must_use]
    pub fn continue_pipeline_on_failure(&self) -> bool {
        self.context.get_bool("continuePipeline").unwrap_or(false)
    }

    /// Sets whether the pipeline continues when this stage fails.
    pub fn set_continue_pipeline_on_failure(&mut self, continue_pipeline: bool) {
        self.context
            .set("continuePipeline", Value::Bool(continue_pipeline));
    }

    /// Whether later siblings may run after this synthetic stage ends in
    /// `FAILED_CONTINUE`. Always false for top-level stages.
    #[must_use]
    pub fn allow_sibling_stages_to_continue_on_failure(&self) -> bool {
        self.is_synthetic()
            && self
                .context
                .get_bool("allowSiblingStagesToContinueOnFailure")
                .unwrap_or(false)
    }

    /// Sets the sibling-continuation flag.
    ///
    /// # Errors
    ///
    /// Returns an error on a top-level stage.
    pub fn set_allow_sibling_stages_to_continue_on_failure(
        &mut self,
        allow: bool,
    ) -> Result<(), GraphValidationError> {
        if !self.is_synthetic() {
            return Err(GraphValidationError::new(format!(
                "Not allowed to set allowSiblingStagesToContinueOnFailure on a non-child stage: {} with id {}",
                self.stage_type, self.id
            )));
        }
        self.context
            .set("allowSiblingStagesToContinueOnFailure", Value::Bool(allow));
        Ok(())
    }

    /// Whether the authentication context propagates to this stage's work.
    #[must_use]
    pub fn propagates_authentication(&self) -> bool {
        self.context
            .get_bool("propagateAuthenticationContext")
            .unwrap_or(false)
    }

    /// Appends a message to `context.exception.details.errors`.
    ///
    /// Missing or non-object intermediate entries are replaced.
    pub fn append_error_message(&mut self, message: impl Into<String>) {
        let exception = self
            .context
            .entry("exception")
            .or_insert_with(|| Value::Object(Map::new()));
        if !exception.is_object() {
            *exception = Value::Object(Map::new());
        }

        let details = exception
            .as_object_mut()
            .map(|e| e.entry("details").or_insert_with(|| Value::Object(Map::new())));
        let Some(details) = details else { return };
        if !details.is_object() {
            *details = Value::Object(Map::new());
        }

        let errors = details
            .as_object_mut()
            .map(|d| d.entry("errors").or_insert_with(|| Value::Array(Vec::new())));
        let Some(errors) = errors else { return };
        if !errors.is_array() {
            *errors = Value::Array(Vec::new());
        }

        if let Some(list) = errors.as_array_mut() {
            list.push(Value::String(message.into()));
        }
    }

    /// Deserializes the context, or the part of it at a JSON pointer.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ContextMapping` if the pointer is absent or the
    /// value does not fit `T`.
    pub fn map_to<T: DeserializeOwned>(&self, pointer: Option<&str>) -> Result<T, GraphError> {
        let value = match pointer {
            None | Some("") => self.context.to_value(),
            Some(p) => self.context.pointer(p).cloned().ok_or_else(|| {
                GraphError::ContextMapping(format!("No value at {p} in stage {}", self.id))
            })?,
        };

        serde_json::from_value(value).map_err(|e| {
            GraphError::ContextMapping(format!(
                "Unable to map context to {}: {e}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Decodes a base64-encoded JSON document stored in the context.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::ContextMapping` if the value is missing, not
    /// base64, or does not deserialize into `T`.
    pub fn decode_base64<T: DeserializeOwned>(&self, pointer: &str) -> Result<T, GraphError> {
        let encoded = self
            .context
            .pointer(pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GraphError::ContextMapping(format!(
                    "Value in stage context at pointer {pointer} is not base 64 encoded"
                ))
            })?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                GraphError::ContextMapping(format!(
                    "Value in stage context at pointer {pointer} is not base 64 encoded: {e}"
                ))
            })?;

        serde_json::from_slice(&data).map_err(|e| {
            GraphError::ContextMapping(format!(
                "Could not convert {} to {}: {e}",
                String::from_utf8_lossy(&data),
                std::any::type_name::<T>()
            ))
        })
    }
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Stage {}

impl Hash for Stage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stage {{id='{}', type='{}'}}", self.id, self.stage_type)
    }
}

fn ref_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_error(field: &str, value: &Value, expected: &str) -> GraphValidationError {
    GraphValidationError::new(format!("Invalid {field} {value}: expected {expected}"))
        .with_error_info(
            ContractErrorInfo::new("GRAPH-004-FIELD", format!("Malformed {field}"))
                .with_context_entry("field", field),
        )
}

fn deserialize_ref_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => ref_id_string(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid refId {v}"))),
    }
}

fn deserialize_requisite_ref_ids<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    values
        .iter()
        .map(|v| {
            ref_id_string(v)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid requisite ref id {v}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use serde::Deserialize;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_name_defaults_to_type() {
        let stage = Stage::new("wait");
        assert_eq!(stage.name(), "wait");

        let named = Stage::new("wait").with_name("Wait a bit");
        assert_eq!(named.name(), "Wait a bit");
    }

    #[test]
    fn test_from_config_extracts_fields() {
        let stage = Stage::from_config(
            "deploy",
            None,
            map(json!({
                "refId": "2",
                "requisiteStageRefIds": ["1", 3],
                "startTimeExpiry": "1696512000000",
                "cluster": "api-main"
            })),
        )
        .unwrap();

        assert_eq!(stage.ref_id.as_deref(), Some("2"));
        assert_eq!(
            stage.requisite_stage_ref_ids,
            BTreeSet::from(["1".to_string(), "3".to_string()])
        );
        assert_eq!(
            stage.start_time_expiry.map(|t| t.timestamp_millis()),
            Some(1_696_512_000_000)
        );
        assert!(!stage.context.contains_key("refId"));
        assert!(!stage.context.contains_key("requisiteStageRefIds"));
        assert!(!stage.context.contains_key("startTimeExpiry"));
        assert_eq!(stage.context.get_str("cluster"), Some("api-main"));
    }

    #[test]
    fn test_from_config_rejects_bad_requisites() {
        let err = Stage::from_config("deploy", None, map(json!({"requisiteStageRefIds": "1"})))
            .unwrap_err();
        assert_eq!(err.code(), Some("GRAPH-004-FIELD"));
    }

    #[test]
    fn test_synthetic_invariant() {
        let parent = Stage::new("deploy");
        let child = Stage::synthetic(&parent, SyntheticStageOwner::StageBefore, "resize", "Resize");
        assert!(child.is_synthetic());
        assert_eq!(child.parent_stage_id.as_deref(), Some(parent.id()));
        assert!(child.validate().is_ok());

        let mut broken = Stage::new("deploy");
        broken.parent_stage_id = Some(parent.id().to_string());
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_timeout_and_backoff_overrides() {
        let stage = Stage::new("deploy")
            .with_context_value(STAGE_TIMEOUT_OVERRIDE_KEY, json!(60_000))
            .with_context_value(STAGE_BACKOFF_PERIOD_OVERRIDE_KEY, json!("soon"));

        assert_eq!(stage.timeout(), Some(Duration::from_secs(60)));
        assert_eq!(stage.backoff_period(), None);
    }

    #[test]
    fn test_append_error_message_creates_path() {
        let mut stage = Stage::new("deploy");
        stage.append_error_message("first");
        stage.append_error_message("second");

        assert_eq!(
            stage.context.pointer("/exception/details/errors"),
            Some(&json!(["first", "second"]))
        );
    }

    #[test]
    fn test_append_error_message_keeps_existing_exception() {
        let mut stage = Stage::new("deploy").with_context_value(
            "exception",
            json!({"source": "task", "details": {"errors": ["earlier"]}}),
        );
        stage.append_error_message("later");

        assert_eq!(stage.context.pointer("/exception/source"), Some(&json!("task")));
        assert_eq!(
            stage.context.pointer("/exception/details/errors"),
            Some(&json!(["earlier", "later"]))
        );
    }

    #[test]
    fn test_sibling_continuation_requires_synthetic_stage() {
        let mut top = Stage::new("deploy");
        assert!(top
            .set_allow_sibling_stages_to_continue_on_failure(true)
            .is_err());
        assert!(!top.allow_sibling_stages_to_continue_on_failure());

        let mut child = Stage::synthetic(&top, SyntheticStageOwner::StageAfter, "check", "Check");
        child
            .set_allow_sibling_stages_to_continue_on_failure(true)
            .unwrap();
        assert!(child.allow_sibling_stages_to_continue_on_failure());
    }

    #[test]
    fn test_continue_pipeline_flag() {
        let mut stage = Stage::new("deploy");
        assert!(!stage.continue_pipeline_on_failure());
        stage.set_continue_pipeline_on_failure(true);
        assert!(stage.continue_pipeline_on_failure());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Target {
        cluster: String,
        regions: Vec<String>,
    }

    #[test]
    fn test_map_to_with_pointer() {
        let stage = Stage::new("deploy").with_context_value(
            "target",
            json!({"cluster": "api", "regions": ["us-east-1"]}),
        );

        let target: Target = stage.map_to(Some("/target")).unwrap();
        assert_eq!(target.cluster, "api");

        let missing = stage.map_to::<Target>(Some("/nope"));
        assert!(matches!(missing, Err(GraphError::ContextMapping(_))));
    }

    #[test]
    fn test_decode_base64() {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(r#"{"cluster":"api","regions":["eu-west-1"]}"#);
        let stage = Stage::new("deployManifest").with_context_value("manifest", json!(encoded));

        let target: Target = stage.decode_base64("/manifest").unwrap();
        assert_eq!(target.regions, vec!["eu-west-1".to_string()]);

        let bad = Stage::new("deployManifest").with_context_value("manifest", json!("%%%"));
        assert!(bad.decode_base64::<Target>("/manifest").is_err());
    }

    #[test]
    fn test_deserialize_accepts_numeric_ref_ids() {
        let stage: Stage = serde_json::from_value(json!({
            "id": "s1",
            "refId": 2,
            "type": "wait",
            "requisiteStageRefIds": [1, "0"],
            "startTime": 1_696_512_000_000_i64
        }))
        .unwrap();

        assert_eq!(stage.id(), "s1");
        assert_eq!(stage.ref_id.as_deref(), Some("2"));
        assert!(stage.requisite_stage_ref_ids.contains("1"));
        assert_eq!(stage.status, ExecutionStatus::NotStarted);
        assert!(stage.start_time.is_some());
    }

    #[test]
    fn test_equality_is_by_id() {
        let a = Stage::new("wait").with_id("same");
        let b = Stage::new("deploy").with_id("same");
        assert_eq!(a, b);
    }
}
