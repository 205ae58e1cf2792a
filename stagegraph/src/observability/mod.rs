//! Observability utilities.

mod tracing;

pub use tracing::{execution_span, init_test_tracing, stage_span};
