//! Tracing integration for executions and stages.
//!
//! Span constructors carrying the structured fields the rest of the crate
//! logs with (`execution_id`, `stage_id`, `ref_id`).

use crate::model::{Execution, Stage};

/// A span scoped to one execution.
#[must_use]
pub fn execution_span(execution: &Execution) -> tracing::Span {
    tracing::debug_span!(
        "execution",
        execution_id = %execution.id(),
        application = %execution.application,
        execution_type = %execution.execution_type,
    )
}

/// A span scoped to one stage.
#[must_use]
pub fn stage_span(stage: &Stage) -> tracing::Span {
    tracing::debug_span!(
        "stage",
        stage_id = %stage.id(),
        ref_id = stage.ref_id.as_deref().unwrap_or(""),
        stage_type = %stage.stage_type,
    )
}

/// Installs a fmt subscriber filtered by `RUST_LOG` for tests and benches.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
