//! # Stagegraph
//!
//! The stage graph of a continuous-delivery pipeline execution.
//!
//! Stagegraph models executions made of stages and answers questions about
//! how those stages relate:
//!
//! - **Construction**: turn raw stage configuration into an [`model::Execution`]
//! - **Scheduling order**: sort stages by their requisite ref ids
//! - **Ancestry**: walk upstream through requisites, synthetic parents and
//!   the executions that started a child pipeline
//! - **Descendants**: find every stage downstream of a stage
//! - **Diagnostics**: follow failures through nested pipeline executions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagegraph::prelude::*;
//! use serde_json::json;
//!
//! let execution = ExecutionBuilder::new(BuildOptions::new().with_name("deploy"))
//!     .build(
//!         "orders",
//!         Some(&[
//!             json!({"type": "bake", "refId": "1"}),
//!             json!({"type": "deploy", "refId": "2", "requisiteStageRefIds": ["1"]}),
//!         ]),
//!         Trigger::manual("alice"),
//!     )?;
//!
//! let order = execution.sorted_stages()?;
//! let deploy = execution.stage_by_ref_id("2").unwrap();
//! let upstream = execution.ancestors_of(deploy.id())?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod diagnostics;
pub mod errors;
pub mod graph;
pub mod model;
pub mod observability;
pub mod persistence;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::context::StageContext;
    pub use crate::diagnostics::{FailedStageExecution, FailureChainBuilder, FailureChainConfig};
    pub use crate::errors::{
        ContractErrorInfo, GraphError, GraphValidationError, InvalidStageRelationshipsError,
        StageEdge,
    };
    pub use crate::graph::{
        AncestorResolver, BuildOptions, DescendantResolver, ExecutionBuilder, ScopedConfig,
        StageFilter,
    };
    pub use crate::model::{
        Execution, ExecutionStatus, ExecutionType, SharedExecution, Stage, SyntheticStageOwner,
        Trigger,
    };
    pub use crate::persistence::{ExecutionRepository, InMemoryExecutionRepository};
    pub use crate::utils::Timestamp;
}
