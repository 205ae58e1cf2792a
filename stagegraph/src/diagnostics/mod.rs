//! Failure diagnostics for the UI.

mod failure_chain;

pub use failure_chain::{
    exception_message, FailedStageExecution, FailureChainBuilder, FailureChainConfig,
    EXCEPTION_NOT_FOUND,
};
