//! Testing utilities for stage graphs.
//!
//! This module provides:
//! - Stage and execution fixtures
//! - Assertions over resolved and sorted stage lists

mod assertions;
mod fixtures;

pub use assertions::{
    assert_contains_stage, assert_lacks_stage, assert_ordered_before, assert_stage_ids,
    assert_topologically_sound,
};
pub use fixtures::{dag_stage, failed_pipeline_stage, synthetic_stage, TestExecution};
