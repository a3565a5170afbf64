/*
 * Outer convergence loop
 *
 * Two nested fixpoints: the inner one drains the work scheduler to zero
 * pending units; the outer one gives external hooks a chance to extend the
 * universe and repeats until nothing requests another pass. A hook that
 * grows the universe without declaring it trips the consistency check, and
 * a hook that never stops requesting passes trips the iteration cap.
 */

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::errors::{ClosureError, Result, SummaryFailure};
use crate::features::reachability::infrastructure::propagator::ClosurePropagator;
use crate::features::reachability::infrastructure::scheduler::WorkScheduler;
use crate::features::reachability::infrastructure::universe::{
    FieldDescriptor, MethodDescriptor, TypeDescriptor, Universe,
};
use crate::features::reachability::ports::{
    ForeignCallResolver, HeapVerifier, IterationBoundaryHook, MethodSummaryProvider,
};

use super::config::EngineConfig;

/// Flag totals and run counters for one completed closure
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClosureStats {
    pub total_types: usize,
    pub total_methods: usize,
    pub total_fields: usize,

    pub reachable_types: usize,
    pub instantiated_types: usize,
    pub in_heap_types: usize,
    pub invoked_methods: usize,
    pub implementation_invoked_methods: usize,
    pub accessed_fields: usize,
    pub read_fields: usize,
    pub written_fields: usize,

    pub iterations: usize,
    pub executed_tasks: usize,
    pub propagations: usize,
    pub duration_ms: f64,
}

/// Result of a converged run
#[derive(Debug)]
pub struct ClosureReport {
    pub stats: ClosureStats,
    /// Summary failures tolerated under the lenient policy
    pub warnings: Vec<SummaryFailure>,
}

/// The reachability-closure engine
pub struct ClosureEngine {
    config: EngineConfig,
    universe: Arc<Universe>,
    scheduler: Arc<WorkScheduler>,
    propagator: Arc<ClosurePropagator>,
    iteration_hook: Option<Arc<dyn IterationBoundaryHook>>,
    heap_verifier: Option<Arc<dyn HeapVerifier>>,
}

impl ClosureEngine {
    pub fn new(config: EngineConfig, summary_provider: Arc<dyn MethodSummaryProvider>) -> Self {
        let universe = Arc::new(Universe::new());
        let scheduler = Arc::new(WorkScheduler::new(config.effective_workers()));
        let propagator = Arc::new(ClosurePropagator::new(
            Arc::clone(&universe),
            Arc::clone(&scheduler),
            summary_provider,
            config.summary_failure_policy,
        ));
        Self {
            config,
            universe,
            scheduler,
            propagator,
            iteration_hook: None,
            heap_verifier: None,
        }
    }

    pub fn with_iteration_hook(mut self, hook: Arc<dyn IterationBoundaryHook>) -> Self {
        self.iteration_hook = Some(hook);
        self
    }

    pub fn with_heap_verifier(mut self, verifier: Arc<dyn HeapVerifier>) -> Self {
        self.heap_verifier = Some(verifier);
        self
    }

    pub fn with_foreign_call_resolver(self, resolver: Arc<dyn ForeignCallResolver>) -> Self {
        self.propagator.set_foreign_call_resolver(resolver);
        self
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    pub fn propagator(&self) -> &Arc<ClosurePropagator> {
        &self.propagator
    }

    /// Root registration entry points, delegating to the propagator.
    pub fn add_root_type(&self, decl: &TypeDescriptor, add_fields: bool) {
        self.propagator.add_root_type(decl, add_fields);
    }

    pub fn add_root_method(&self, decl: &MethodDescriptor) {
        self.propagator.add_root_method(decl);
    }

    pub fn add_root_field(&self, decl: &FieldDescriptor) {
        self.propagator.add_root_field(decl);
    }

    /// Run to a global fixpoint: no pending work, no hook-requested
    /// iteration, and a quiet heap verifier.
    pub fn run(&self) -> Result<ClosureReport> {
        let started = Instant::now();
        let mut iterations = 0usize;

        loop {
            // Inner fixpoint: drain all scheduled propagation units.
            let executed = self.scheduler.drain(|item| self.propagator.process(item));
            let analysis_changed = executed > 0;

            if let Some(fatal) = self.propagator.fatal_error() {
                return Err(fatal);
            }

            iterations += 1;
            debug!(iterations, executed, "inner fixpoint reached");
            if iterations > self.config.max_outer_iterations {
                // Usually there are far fewer iterations; hitting the cap
                // means a hook keeps injecting roots or propagation leaks.
                return Err(ClosureError::NonConvergence {
                    iterations,
                    analysis_changed,
                });
            }

            let before = self.universe.element_counts();
            let requires_more = self
                .iteration_hook
                .as_ref()
                .is_some_and(|hook| hook.on_iteration_boundary(&self.propagator));
            let after = self.universe.element_counts();

            if requires_more {
                continue;
            }
            if before != after {
                // The hook grew the universe without requesting another
                // iteration; external contract breach.
                return Err(ClosureError::ConsistencyViolation { before, after });
            }
            if self.scheduler.pending_count() > 0 {
                // Manual low-level insertions do not go through the hook
                // protocol but still demand another inner fixpoint.
                debug!("pending operations found after quiescence, continuing");
                continue;
            }
            let heap_modified = self
                .heap_verifier
                .as_ref()
                .is_some_and(|verifier| verifier.verify_and_maybe_expand(&self.propagator));
            if !heap_modified {
                break;
            }
        }

        Ok(ClosureReport {
            stats: self.collect_stats(iterations, started),
            warnings: self.propagator.take_warnings(),
        })
    }

    fn collect_stats(&self, iterations: usize, started: Instant) -> ClosureStats {
        let mut stats = ClosureStats {
            iterations,
            executed_tasks: self.scheduler.executed_total(),
            propagations: self.propagator.propagations(),
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            ..ClosureStats::default()
        };
        for t in self.universe.all_types() {
            stats.total_types += 1;
            stats.reachable_types += t.is_reachable() as usize;
            stats.instantiated_types += t.is_instantiated() as usize;
            stats.in_heap_types += t.is_in_heap() as usize;
        }
        for m in self.universe.all_methods() {
            stats.total_methods += 1;
            stats.invoked_methods += m.is_invoked() as usize;
            stats.implementation_invoked_methods += m.is_implementation_invoked() as usize;
        }
        for f in self.universe.all_fields() {
            stats.total_fields += 1;
            stats.accessed_fields += f.is_accessed() as usize;
            stats.read_fields += f.is_read() as usize;
            stats.written_fields += f.is_written() as usize;
        }
        stats
    }
}
