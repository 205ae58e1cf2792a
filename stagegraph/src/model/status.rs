//! Status, execution type and synthetic owner enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The status of a stage or an execution.
///
/// Transitions are owned by the dispatcher; this crate only reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Not yet started.
    #[default]
    NotStarted,
    /// Queued behind other executions.
    Buffered,
    /// Currently running.
    Running,
    /// Paused by a user.
    Paused,
    /// Suspended, waiting on an external event.
    Suspended,
    /// Completed successfully.
    Succeeded,
    /// Failed, but downstream stages may continue.
    FailedContinue,
    /// Failed; halts the execution.
    Terminal,
    /// Canceled by a user or the system.
    Canceled,
    /// Restarting a branch of the graph.
    Redirect,
    /// Stopped without failing the execution.
    Stopped,
    /// Skipped.
    Skipped,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Buffered => "BUFFERED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Suspended => "SUSPENDED",
            Self::Succeeded => "SUCCEEDED",
            Self::FailedContinue => "FAILED_CONTINUE",
            Self::Terminal => "TERMINAL",
            Self::Canceled => "CANCELED",
            Self::Redirect => "REDIRECT",
            Self::Stopped => "STOPPED",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(name)
    }
}

impl ExecutionStatus {
    /// Returns true if the status is terminal or semi-terminal.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::FailedContinue
                | Self::Terminal
                | Self::Canceled
                | Self::Stopped
                | Self::Skipped
        )
    }

    /// Returns true if the status halts downstream work.
    #[must_use]
    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Terminal | Self::Canceled)
    }

    /// Returns true if the status counts as success for downstream stages.
    #[must_use]
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Stopped | Self::Skipped)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Terminal | Self::FailedContinue | Self::Canceled)
    }
}

/// The kind of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    /// A configured pipeline.
    #[default]
    Pipeline,
    /// A bare, ad-hoc orchestration.
    Orchestration,
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipeline => write!(f, "PIPELINE"),
            Self::Orchestration => write!(f, "ORCHESTRATION"),
        }
    }
}

/// Position of a synthetic stage relative to its parent's own work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyntheticStageOwner {
    /// Runs before the parent.
    #[serde(rename = "STAGE_BEFORE")]
    StageBefore,
    /// Runs after the parent.
    #[serde(rename = "STAGE_AFTER")]
    StageAfter,
}

impl fmt::Display for SyntheticStageOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StageBefore => write!(f, "STAGE_BEFORE"),
            Self::StageAfter => write!(f, "STAGE_AFTER"),
        }
    }
}
