//! Stages that depend on a given stage.

use crate::errors::GraphError;
use crate::model::{Execution, Stage};
use std::collections::VecDeque;

/// Resolves the descendants of stages in one execution.
#[derive(Debug, Clone, Copy)]
pub struct DescendantResolver<'a> {
    execution: &'a Execution,
}

impl<'a> DescendantResolver<'a> {
    /// Creates a resolver over an execution.
    #[must_use]
    pub fn new(execution: &'a Execution) -> Self {
        Self { execution }
    }

    /// Every stage that transitively requires `stage`, breadth first.
    ///
    /// The stage itself is excluded and each descendant appears once.
    #[must_use]
    pub fn all_downstream_stages(&self, stage: &Stage) -> Vec<&'a Stage> {
        let mut pending: Vec<&'a Stage> = self
            .execution
            .stages()
            .iter()
            .filter(|s| s.id() != stage.id())
            .collect();
        let mut queue: VecDeque<&Stage> = VecDeque::from([stage]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            pending.retain(|s| s.id() != current.id());

            let Some(ref_id) = current.ref_id.as_deref() else {
                continue;
            };
            for &candidate in &pending {
                if candidate.requisite_stage_ref_ids.contains(ref_id)
                    && !queue.iter().any(|q| q.id() == candidate.id())
                {
                    queue.push_back(candidate);
                    result.push(candidate);
                }
            }
        }

        result
    }

    /// Synthetic stages whose parent is `stage`.
    #[must_use]
    pub fn direct_children(&self, stage: &Stage) -> Vec<&'a Stage> {
        self.execution
            .stages()
            .iter()
            .filter(|s| s.parent_stage_id.as_deref() == Some(stage.id()))
            .collect()
    }

    /// Stages that list `stage`'s ref id among their requisites.
    #[must_use]
    pub fn downstream_stages(&self, stage: &Stage) -> Vec<&'a Stage> {
        let Some(ref_id) = stage.ref_id.as_deref() else {
            return Vec::new();
        };
        self.execution
            .stages()
            .iter()
            .filter(|s| s.requisite_stage_ref_ids.contains(ref_id))
            .collect()
    }
}

impl Execution {
    /// Every stage that transitively requires the stage with the given id.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::StageNotFound` for an unknown id.
    pub fn all_downstream_stages_of(&self, stage_id: &str) -> Result<Vec<&Stage>, GraphError> {
        let stage = self.require_stage(stage_id)?;
        Ok(DescendantResolver::new(self).all_downstream_stages(stage))
    }

    /// Synthetic children of the stage with the given id.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::StageNotFound` for an unknown id.
    pub fn direct_children_of(&self, stage_id: &str) -> Result<Vec<&Stage>, GraphError> {
        let stage = self.require_stage(stage_id)?;
        Ok(DescendantResolver::new(self).direct_children(stage))
    }
}
