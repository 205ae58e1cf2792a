//! Dependency ordering of stages by `refId` / `requisiteStageRefIds`.

use crate::errors::{GraphError, InvalidStageRelationshipsError, StageEdge};
use crate::model::{Execution, Stage};
use std::collections::HashSet;

/// Which stages take part in a sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageFilter {
    /// Every stage, synthetic ones included.
    AllStages,
    /// Only stages without a parent stage.
    #[default]
    TopLevelOnly,
}

impl StageFilter {
    fn accepts(self, stage: &Stage) -> bool {
        match self {
            Self::AllStages => true,
            Self::TopLevelOnly => !stage.is_synthetic(),
        }
    }
}

/// Sorts stages so every stage follows all stages named in its requisite ref ids.
///
/// Each pass takes every remaining stage whose requisites were all satisfied
/// by earlier passes, keeping input order within the pass.
///
/// # Errors
///
/// Returns `GraphError::InvalidStageRelationships` when a pass finds nothing
/// sortable: a cycle, a self reference, or a requisite no stage carries. The
/// error lists the edges of every input stage.
pub fn topological_sort<'a, I>(stages: I, filter: StageFilter) -> Result<Vec<&'a Stage>, GraphError>
where
    I: IntoIterator<Item = &'a Stage>,
{
    let all: Vec<&'a Stage> = stages.into_iter().collect();
    let mut unsorted: Vec<&'a Stage> = all.iter().copied().filter(|s| filter.accepts(s)).collect();
    let mut sorted = Vec::with_capacity(unsorted.len());
    let mut ref_ids: HashSet<Option<&'a str>> = HashSet::new();

    while !unsorted.is_empty() {
        let (sortable, remaining): (Vec<&'a Stage>, Vec<&'a Stage>) =
            unsorted.into_iter().partition(|stage| {
                stage
                    .requisite_stage_ref_ids
                    .iter()
                    .all(|r| ref_ids.contains(&Some(r.as_str())))
            });

        if sortable.is_empty() {
            let err = InvalidStageRelationshipsError::new(
                all.iter().copied().map(edge).collect(),
                remaining.iter().map(|s| s.ref_id.clone()).collect(),
            );
            tracing::warn!(
                unsortable = remaining.len(),
                error = %err,
                "Unable to order stages"
            );
            return Err(err.into());
        }

        for stage in sortable {
            ref_ids.insert(stage.ref_id.as_deref());
            sorted.push(stage);
        }
        unsorted = remaining;
    }

    Ok(sorted)
}

fn edge(stage: &Stage) -> StageEdge {
    StageEdge {
        requisite_stage_ref_ids: stage.requisite_stage_ref_ids.iter().cloned().collect(),
        ref_id: stage.ref_id.clone(),
    }
}

impl Execution {
    /// Top-level stages in dependency order.
    ///
    /// # Errors
    ///
    /// See [`topological_sort`].
    pub fn sorted_stages(&self) -> Result<Vec<&Stage>, GraphError> {
        topological_sort(self.stages(), StageFilter::TopLevelOnly)
    }

    /// All stages, synthetic ones included, in dependency order.
    ///
    /// # Errors
    ///
    /// See [`topological_sort`].
    pub fn sorted_all_stages(&self) -> Result<Vec<&Stage>, GraphError> {
        topological_sort(self.stages(), StageFilter::AllStages)
    }
}
