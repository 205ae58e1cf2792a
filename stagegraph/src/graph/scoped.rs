//! Settings a synthetic stage inherits from the stages that own it.
//!
//! Timeout and backoff overrides live in stage context. A synthetic stage
//! without its own override uses the nearest one up its parent chain.

use crate::errors::GraphError;
use crate::model::{Execution, Stage};
use std::time::Duration;

/// Walks the synthetic parent chain of stages in one execution.
#[derive(Debug, Clone, Copy)]
pub struct ScopedConfig<'a> {
    execution: &'a Execution,
}

impl<'a> ScopedConfig<'a> {
    /// Creates a view over an execution.
    #[must_use]
    pub fn new(execution: &'a Execution) -> Self {
        Self { execution }
    }

    /// The parent of a synthetic stage; `None` for top-level stages.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingParentStage` if the parent id dangles.
    pub fn parent(&self, stage: &Stage) -> Result<Option<&'a Stage>, GraphError> {
        let Some(parent_id) = stage.parent_stage_id.as_deref() else {
            return Ok(None);
        };
        self.execution
            .stage_by_id(parent_id)
            .map(Some)
            .ok_or_else(|| GraphError::missing_parent(stage.id(), parent_id))
    }

    /// The top-level stage that ultimately owns `stage`, or `stage` itself.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingParentStage` if a parent id on the chain dangles.
    pub fn top_level_stage<'s>(&self, stage: &'s Stage) -> Result<&'s Stage, GraphError>
    where
        'a: 's,
    {
        let mut current = stage;
        let mut hops = 0;
        while let Some(parent) = self.parent(current)? {
            current = parent;
            hops += 1;
            if hops > self.execution.stages().len() {
                break;
            }
        }
        Ok(current)
    }

    /// The first stage, starting with `stage` and walking up its parents,
    /// that sets a timeout override.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingParentStage` if a parent id on the chain dangles.
    pub fn parent_with_timeout<'s>(&self, stage: &'s Stage) -> Result<Option<&'s Stage>, GraphError>
    where
        'a: 's,
    {
        self.find_up(stage, |s| s.timeout().is_some())
    }

    /// The timeout that applies to `stage`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingParentStage` if a parent id on the chain dangles.
    pub fn resolved_timeout(&self, stage: &Stage) -> Result<Option<Duration>, GraphError> {
        Ok(self.parent_with_timeout(stage)?.and_then(Stage::timeout))
    }

    /// The backoff period that applies to `stage`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingParentStage` if a parent id on the chain dangles.
    pub fn resolved_backoff_period(&self, stage: &Stage) -> Result<Option<Duration>, GraphError> {
        Ok(self
            .find_up(stage, |s| s.backoff_period().is_some())?
            .and_then(Stage::backoff_period))
    }

    fn find_up<'s, P>(&self, stage: &'s Stage, predicate: P) -> Result<Option<&'s Stage>, GraphError>
    where
        'a: 's,
        P: Fn(&Stage) -> bool,
    {
        let mut current = Some(stage);
        let mut hops = 0;
        while let Some(candidate) = current {
            if predicate(candidate) {
                return Ok(Some(candidate));
            }
            hops += 1;
            if hops > self.execution.stages().len() {
                break;
            }
            current = self.parent(candidate)?;
        }
        Ok(None)
    }
}
