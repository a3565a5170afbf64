//! # Reachability Closure
//!
//! Incremental, concurrent transitive-closure engine for ahead-of-time
//! program analysis: starting from a set of root elements it computes the
//! complete set of types, methods, and fields that can execute or be
//! touched at runtime.
//!
//! ## Algorithm
//! A fixpoint over a mutually recursive call/type graph:
//! - a method body becoming implementation-invoked feeds its summary
//!   (calls, allocations, field touches) back into the closure;
//! - a type becoming instantiated retroactively activates every known
//!   virtual call site along its supertype chain;
//! - a method becoming virtually invoked activates its overrides on every
//!   already-instantiated receiver.
//! The last two rules are symmetric, which makes the resolved set
//! independent of discovery order.
//!
//! ## Usage
//! ```text
//! use reachgraph_core::{ClosureEngine, EngineConfig, MethodDescriptor, TypeDescriptor};
//!
//! let engine = ClosureEngine::new(EngineConfig::default(), provider);
//! engine.add_root_method(&MethodDescriptor::static_method(
//!     TypeDescriptor::named("App"), "main",
//! ));
//! let report = engine.run()?;
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod ports;

// Re-exports for the public API
pub use application::{ClosureEngine, ClosureReport, ClosureStats, EngineConfig, SummaryFailurePolicy};
pub use domain::{
    DispatchKind, FieldId, FieldRecord, ForeignCallDescriptor, HeapConstant, MethodId,
    MethodRecord, MethodSummary, Reason, TypeId, TypeRecord,
};
pub use infrastructure::{
    ClosurePropagator, ElementCounts, FieldDescriptor, MethodDescriptor, TypeDescriptor, Universe,
};
pub use ports::{
    ForeignCallResolver, HeapVerifier, IterationBoundaryHook, MethodSummaryProvider, SummaryError,
};
