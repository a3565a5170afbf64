/*
 * reachgraph-core - Reachability Closure Engine
 *
 * Feature-First Hexagonal Architecture:
 * - features/reachability/domain         : element records, reasons, summaries
 * - features/reachability/ports          : external collaborator traits
 * - features/reachability/infrastructure : universe, scheduler, propagator
 * - features/reachability/application    : engine config and convergence loop
 *
 * Concurrency:
 * - rayon workers over a shared worklist
 * - dashmap element registries
 * - atomic claim-and-set marks, exactly one fan-out per transition
 */

/// Feature modules
pub mod features;

/// Error types
pub mod errors;

// Re-exports for the public API
pub use errors::{ClosureError, Result, SummaryFailure};
pub use features::reachability::{
    ClosureEngine, ClosurePropagator, ClosureReport, ClosureStats, DispatchKind, ElementCounts,
    EngineConfig, FieldDescriptor, FieldId, FieldRecord, ForeignCallDescriptor,
    ForeignCallResolver, HeapConstant, HeapVerifier, IterationBoundaryHook, MethodDescriptor,
    MethodId, MethodRecord, MethodSummary, MethodSummaryProvider, Reason, SummaryError,
    SummaryFailurePolicy, TypeDescriptor, TypeId, TypeRecord, Universe,
};
