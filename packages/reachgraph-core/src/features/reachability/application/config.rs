//! Engine configuration

use serde::{Deserialize, Serialize};

/// What to do when the summary provider fails for one method.
///
/// `Lenient` runs best-effort: the method stays marked but contributes no
/// further fan-out, and the failure is attached to the run report as a
/// warning. That closure is incomplete for the failed method, which is why
/// strict deployments should abort instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SummaryFailurePolicy {
    /// Abort the whole run on the first summary failure
    Strict,
    /// Record a warning and continue with a degraded closure
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard cap on outer iterations; exceeding it is a non-convergence error
    pub max_outer_iterations: usize,

    /// Worker pool size; defaults to the number of logical CPUs
    pub worker_threads: Option<usize>,

    pub summary_failure_policy: SummaryFailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_outer_iterations: 1000,
            worker_threads: None,
            summary_failure_policy: SummaryFailurePolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn effective_workers(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}
