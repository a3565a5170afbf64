//! Ports (interfaces) for the closure engine's external collaborators
//!
//! The engine never parses bytecode, loads classes, or inspects the host
//! heap itself; those concerns arrive through these traits. All of them are
//! `Send + Sync` because they are called from pool workers.

use std::sync::Arc;

use thiserror::Error;

use crate::features::reachability::domain::{ForeignCallDescriptor, MethodRecord, MethodSummary};
use crate::features::reachability::infrastructure::propagator::ClosurePropagator;
use crate::features::reachability::infrastructure::universe::Universe;

/// Failure reported by the summary provider for one method.
///
/// Never a silent empty summary: the propagator applies the configured
/// failure policy to every error it sees.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SummaryError {
    pub message: String,
}

impl SummaryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Produces the effect set of one method body.
///
/// Pure with respect to engine state except for interning referenced
/// elements into the universe. May cache by method identity.
pub trait MethodSummaryProvider: Send + Sync {
    fn summary_of(
        &self,
        universe: &Universe,
        method: &MethodRecord,
    ) -> Result<MethodSummary, SummaryError>;
}

/// Plugin/feature seam invoked once per outer iteration.
///
/// May register additional roots through the propagator; must return true
/// if it did so in a way that changes reachable-element counts.
pub trait IterationBoundaryHook: Send + Sync {
    fn on_iteration_boundary(&self, analysis: &ClosurePropagator) -> bool;
}

/// Invoked only once the inner and outer loops have otherwise reached
/// quiescence. Returns true if it mutated reachability and another
/// iteration is required.
pub trait HeapVerifier: Send + Sync {
    fn verify_and_maybe_expand(&self, analysis: &ClosurePropagator) -> bool;
}

/// Host-VM seam mapping a low-level call target back to an analyzable
/// method; a resolved target becomes an implicit analysis root.
pub trait ForeignCallResolver: Send + Sync {
    fn resolve_foreign_call(
        &self,
        universe: &Universe,
        descriptor: &ForeignCallDescriptor,
    ) -> Option<Arc<MethodRecord>>;
}
