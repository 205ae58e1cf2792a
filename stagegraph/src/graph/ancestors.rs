//! Ancestor resolution across DAG edges, synthetic parents and parent executions.
//!
//! A stage's ancestors are, in visiting order:
//!
//! 1. stages named by its requisite ref ids, followed by their synthetic
//!    children, then the ancestors of each of those stages;
//! 2. otherwise, for a synthetic stage, its `STAGE_BEFORE` siblings (when it
//!    is a `STAGE_AFTER` stage), its parent, then the parent's ancestors;
//! 3. otherwise, for a root stage of a pipeline started by another pipeline,
//!    stages of the parent execution.
//!
//! Every walk keeps its own bookkeeping, so concurrent walks never share
//! state. A stage is reported at most once and expanded at most once per
//! walk, which bounds the walk even when requisites form a cycle.

use crate::errors::GraphError;
use crate::model::{Execution, ExecutionType, Stage, SyntheticStageOwner};
use crate::observability::stage_span;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::ControlFlow;

macro_rules! propagate {
    ($flow:expr) => {
        if $flow.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    };
}

/// Resolves the ancestors of stages in one execution.
#[derive(Debug, Clone, Copy)]
pub struct AncestorResolver<'a> {
    execution: &'a Execution,
}

impl<'a> AncestorResolver<'a> {
    /// Creates a resolver over an execution.
    #[must_use]
    pub fn new(execution: &'a Execution) -> Self {
        Self { execution }
    }

    /// The stage followed by all of its ancestors, crossing into parent
    /// executions.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingParentStage` if a synthetic stage on the
    /// way points at a parent that does not exist.
    pub fn ancestors(&self, stage: &'a Stage) -> Result<Vec<&'a Stage>, GraphError> {
        self.collect(stage, false)
    }

    /// The stage followed by its synthetic parents and their earlier
    /// siblings. Requisite edges and parent executions are ignored.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingParentStage` on a dangling parent id.
    pub fn direct_ancestors(&self, stage: &'a Stage) -> Result<Vec<&'a Stage>, GraphError> {
        self.collect(stage, true)
    }

    /// The first ancestor, in visiting order, that matches `predicate`.
    ///
    /// The stage itself is never tested. When a parent execution is reached
    /// without a parent pipeline stage to anchor on, its stages are tested
    /// running ones first, then most recently ended first.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::MissingParentStage` on a dangling parent id.
    pub fn find_ancestor<P>(
        &self,
        stage: &'a Stage,
        mut predicate: P,
    ) -> Result<Option<&'a Stage>, GraphError>
    where
        P: FnMut(&Stage) -> bool,
    {
        let mut found = None;
        let mut walk = Walk::new(false, |candidate: &'a Stage| {
            if predicate(candidate) {
                found = Some(candidate);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        stage_span(stage).in_scope(|| walk.start(self.execution, stage))?;
        Ok(found)
    }

    fn collect(&self, stage: &'a Stage, direct_only: bool) -> Result<Vec<&'a Stage>, GraphError> {
        let mut result = vec![stage];
        let mut walk = Walk::new(direct_only, |ancestor: &'a Stage| {
            result.push(ancestor);
            ControlFlow::Continue(())
        });
        stage_span(stage).in_scope(|| walk.start(self.execution, stage))?;
        Ok(result)
    }
}

/// Stages of a parent execution, running ones first, then by end time
/// descending. Input order breaks ties.
#[must_use]
pub fn by_recency(stages: &[Stage]) -> Vec<&Stage> {
    let mut ordered: Vec<&Stage> = stages.iter().collect();
    ordered.sort_by(|a, b| match (a.end_time, b.end_time) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => b.cmp(&a),
    });
    ordered
}

type StageKey<'a> = (&'a str, &'a str);
type ExpansionKey<'a> = (&'a str, Option<&'a str>);

struct Walk<'a, F> {
    direct_only: bool,
    reported: HashSet<StageKey<'a>>,
    expanded: HashSet<ExpansionKey<'a>>,
    visit: F,
}

impl<'a, F> Walk<'a, F>
where
    F: FnMut(&'a Stage) -> ControlFlow<()>,
{
    fn new(direct_only: bool, visit: F) -> Self {
        Self {
            direct_only,
            reported: HashSet::new(),
            expanded: HashSet::new(),
            visit,
        }
    }

    fn start(&mut self, execution: &'a Execution, stage: &'a Stage) -> Result<(), GraphError> {
        self.reported.insert((execution.id(), stage.id()));
        self.expand(execution, Some(stage)).map(|_| ())
    }

    fn report(&mut self, execution: &'a Execution, stage: &'a Stage) -> ControlFlow<()> {
        if self.reported.insert((execution.id(), stage.id())) {
            (self.visit)(stage)
        } else {
            ControlFlow::Continue(())
        }
    }

    fn is_expanded(&self, execution: &'a Execution, stage_id: &str) -> bool {
        self.expanded.contains(&(execution.id(), Some(stage_id)))
    }

    fn expand(
        &mut self,
        execution: &'a Execution,
        stage: Option<&'a Stage>,
    ) -> Result<ControlFlow<()>, GraphError> {
        if !self.expanded.insert((execution.id(), stage.map(Stage::id))) {
            return Ok(ControlFlow::Continue(()));
        }

        match stage {
            Some(stage) if !stage.requisite_stage_ref_ids.is_empty() && !self.direct_only => {
                self.expand_requisites(execution, stage)
            }
            Some(stage) if stage.parent_stage_id.is_some() => self.expand_parent(execution, stage),
            _ if self.direct_only => Ok(ControlFlow::Continue(())),
            _ => self.expand_parent_execution(execution),
        }
    }

    fn expand_requisites(
        &mut self,
        execution: &'a Execution,
        stage: &'a Stage,
    ) -> Result<ControlFlow<()>, GraphError> {
        let previous: Vec<&'a Stage> = execution
            .stages()
            .iter()
            .filter(|s| {
                s.ref_id
                    .as_ref()
                    .is_some_and(|r| stage.requisite_stage_ref_ids.contains(r))
            })
            .filter(|s| !self.is_expanded(execution, s.id()))
            .collect();

        let previous_ids: HashSet<&str> = previous.iter().map(|s| s.id()).collect();
        let synthetic = execution.stages().iter().filter(|s| {
            s.parent_stage_id
                .as_deref()
                .is_some_and(|p| previous_ids.contains(p))
        });

        for prior in previous.iter().copied().chain(synthetic) {
            propagate!(self.report(execution, prior));
        }
        for prior in previous {
            propagate!(self.expand(execution, Some(prior))?);
        }

        Ok(ControlFlow::Continue(()))
    }

    fn expand_parent(
        &mut self,
        execution: &'a Execution,
        stage: &'a Stage,
    ) -> Result<ControlFlow<()>, GraphError> {
        let Some(parent_id) = stage.parent_stage_id.as_deref() else {
            return Ok(ControlFlow::Continue(()));
        };
        if self.is_expanded(execution, parent_id) {
            return Ok(ControlFlow::Continue(()));
        }

        let parent = execution
            .stage_by_id(parent_id)
            .ok_or_else(|| GraphError::missing_parent(stage.id(), parent_id))?;

        if stage.synthetic_stage_owner == Some(SyntheticStageOwner::StageAfter) {
            let before = execution.stages().iter().filter(|s| {
                s.parent_stage_id.as_deref() == Some(parent_id)
                    && s.synthetic_stage_owner == Some(SyntheticStageOwner::StageBefore)
            });
            for sibling in before {
                propagate!(self.report(execution, sibling));
            }
        }

        propagate!(self.report(execution, parent));
        self.expand(execution, Some(parent))
    }

    fn expand_parent_execution(
        &mut self,
        execution: &'a Execution,
    ) -> Result<ControlFlow<()>, GraphError> {
        if execution.execution_type != ExecutionType::Pipeline {
            return Ok(ControlFlow::Continue(()));
        }
        let Some(trigger) = execution.trigger.as_pipeline() else {
            return Ok(ControlFlow::Continue(()));
        };
        let parent_execution: &'a Execution = &trigger.parent_execution;

        tracing::trace!(
            execution_id = %execution.id(),
            parent_execution_id = %parent_execution.id(),
            "Resolving ancestors in parent execution"
        );

        let parent_stage = trigger.parent_pipeline_stage_id.as_deref().and_then(|id| {
            parent_execution
                .stages()
                .iter()
                .find(|s| s.stage_type == "pipeline" && s.id() == id)
        });
        if let Some(parent_stage) = parent_stage {
            return self.expand(parent_execution, Some(parent_stage));
        }

        let ordered = by_recency(parent_execution.stages());
        let Some(first) = ordered.first().copied() else {
            return self.expand(parent_execution, None);
        };
        for candidate in ordered {
            propagate!(self.report(parent_execution, candidate));
        }
        self.expand(parent_execution, Some(first))
    }
}

impl Execution {
    /// Ancestors of the stage with the given id, the stage first.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::StageNotFound` for an unknown id, or
    /// `GraphError::MissingParentStage` on a dangling parent id.
    pub fn ancestors_of(&self, stage_id: &str) -> Result<Vec<&Stage>, GraphError> {
        let stage = self.require_stage(stage_id)?;
        AncestorResolver::new(self).ancestors(stage)
    }

    /// The nearest ancestor of the stage with the given id matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::StageNotFound` for an unknown id, or
    /// `GraphError::MissingParentStage` on a dangling parent id.
    pub fn find_ancestor_of<P>(
        &self,
        stage_id: &str,
        predicate: P,
    ) -> Result<Option<&Stage>, GraphError>
    where
        P: FnMut(&Stage) -> bool,
    {
        let stage = self.require_stage(stage_id)?;
        AncestorResolver::new(self).find_ancestor(stage, predicate)
    }
}
