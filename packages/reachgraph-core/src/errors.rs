//! Error types for reachgraph-core
//!
//! Fatal classes abort the whole analysis with a structured error carrying
//! the causal chain where one exists; recoverable classes degrade
//! completeness and surface as warnings on the run report.

use thiserror::Error;

use crate::features::reachability::infrastructure::universe::ElementCounts;

/// A tolerated per-method summary failure, attached to the run report
#[derive(Debug, Clone)]
pub struct SummaryFailure {
    pub method: String,
    /// Rendered causal chain of the failed method, when one was recorded
    pub reason_chain: Option<String>,
    pub message: String,
}

/// Fatal analysis errors
#[derive(Debug, Clone, Error)]
pub enum ClosureError {
    /// Summary provider failed for one method under the strict policy
    #[error("summary computation failed for {method}: {message}")]
    SummaryComputation {
        method: String,
        reason_chain: Option<String>,
        message: String,
    },

    /// The universe grew without the iteration hook declaring another pass
    #[error(
        "universe changed without a declared analysis iteration: \
         types {} -> {}, methods {} -> {}, fields {} -> {}",
        before.types, after.types, before.methods, after.methods, before.fields, after.fields
    )]
    ConsistencyViolation {
        before: ElementCounts,
        after: ElementCounts,
    },

    /// Iteration cap exceeded
    #[error(
        "closure did not converge after {iterations} iterations; \
         the last inner fixpoint {} state",
        if *analysis_changed { "DID change" } else { "did NOT change" }
    )]
    NonConvergence {
        iterations: usize,
        analysis_changed: bool,
    },
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, ClosureError>;
