//! Stage graph algorithms.
//!
//! An execution's stages form two relations over one node set: DAG edges
//! (`refId` / `requisiteStageRefIds`) and the synthetic tree
//! (`parentStageId`). The builder creates the graph, the scheduler orders it,
//! and the resolvers walk it in either direction.

mod ancestors;
mod builder;
mod descendants;
mod scoped;
mod integration_tests;
mod topology;

pub use ancestors::{by_recency, AncestorResolver};
pub use builder::{BuildOptions, ExecutionBuilder};
pub use descendants::DescendantResolver;
pub use scoped::ScopedConfig;
pub use topology::{topological_sort, StageFilter};
