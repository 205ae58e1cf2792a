//! Error types for the stagegraph crate.
//!
//! Structural errors (malformed configuration, graph corruption) abort the
//! calling operation. Diagnostic extraction never produces an error; see
//! [`crate::diagnostics`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for stage graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Raw configuration or a field update was rejected.
    #[error("{0}")]
    Validation(#[from] GraphValidationError),

    /// Stages could not be ordered by their requisite ref ids.
    #[error("{0}")]
    InvalidStageRelationships(#[from] InvalidStageRelationshipsError),

    /// A synthetic stage points at a parent that is not in the execution.
    #[error("Couldn't find parent of stage {stage_id} with parent {parent_stage_id}")]
    MissingParentStage {
        /// The stage whose parent is missing.
        stage_id: String,
        /// The dangling parent stage id.
        parent_stage_id: String,
    },

    /// A stage id lookup failed.
    #[error("No stage found with id {stage_id} in execution {execution_id}")]
    StageNotFound {
        /// The execution that was searched.
        execution_id: String,
        /// The missing stage id.
        stage_id: String,
    },

    /// Stage context could not be mapped onto a typed value.
    #[error("Context mapping error: {0}")]
    ContextMapping(String),

    /// The persistence collaborator failed.
    #[error("Repository error: {0}")]
    Repository(String),
}

impl GraphError {
    /// Creates a missing parent error.
    #[must_use]
    pub fn missing_parent(stage_id: impl Into<String>, parent_stage_id: impl Into<String>) -> Self {
        Self::MissingParentStage {
            stage_id: stage_id.into(),
            parent_stage_id: parent_stage_id.into(),
        }
    }

    /// Creates a stage not found error.
    #[must_use]
    pub fn stage_not_found(execution_id: impl Into<String>, stage_id: impl Into<String>) -> Self {
        Self::StageNotFound {
            execution_id: execution_id.into(),
            stage_id: stage_id.into(),
        }
    }

    /// Returns true if the error indicates a corrupted graph rather than bad input.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::InvalidStageRelationships(_) | Self::MissingParentStage { .. }
        )
    }
}

/// Metadata about a contract error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "GRAPH-001-MISSING_TYPE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when raw stage configuration or a stage update is invalid.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphValidationError {
    /// The error message.
    pub message: String,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl GraphValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_info: None,
        }
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the contract error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }
}

/// A single `requisiteStageRefIds -> refId` edge reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEdge {
    /// The requisite ref ids, sorted for stable output.
    pub requisite_stage_ref_ids: Vec<String>,
    /// The dependent stage's ref id.
    pub ref_id: Option<String>,
}

impl std::fmt::Display for StageEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]->{}",
            self.requisite_stage_ref_ids.join(", "),
            self.ref_id.as_deref().unwrap_or("null")
        )
    }
}

/// Error raised when stages cannot be topologically ordered.
///
/// Either a cycle exists or a stage requires a ref id that no stage carries.
#[derive(Debug, Clone, Error)]
#[error("Invalid stage relationships found {}", format_edges(edges))]
pub struct InvalidStageRelationshipsError {
    /// Every edge of the stage set being sorted.
    pub edges: Vec<StageEdge>,
    /// Ref ids of the stages that could not be sorted.
    pub unsorted: Vec<Option<String>>,
    /// Contract error info.
    pub error_info: ContractErrorInfo,
}

impl InvalidStageRelationshipsError {
    /// Creates a new relationship error.
    #[must_use]
    pub fn new(edges: Vec<StageEdge>, unsorted: Vec<Option<String>>) -> Self {
        let info = ContractErrorInfo::new(
            "GRAPH-002-RELATIONSHIPS",
            format!("{} stage(s) can never become sortable", unsorted.len()),
        )
        .with_fix_hint(
            "Check requisiteStageRefIds for cycles or references to refIds that do not exist.",
        );

        Self {
            edges,
            unsorted,
            error_info: info,
        }
    }
}

fn format_edges(edges: &[StageEdge]) -> String {
    edges
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
