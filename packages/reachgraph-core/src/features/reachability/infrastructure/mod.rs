//! Infrastructure for the reachability feature:
//! - universe: deduplicating concurrent element registries
//! - resolver: pure virtual-dispatch resolution
//! - scheduler: concurrent propagation-task executor
//! - propagator: the closure algorithm itself

pub mod propagator;
pub mod resolver;
pub mod scheduler;
pub mod universe;

pub use propagator::ClosurePropagator;
pub use resolver::resolve_override;
pub use scheduler::{WorkItem, WorkScheduler};
pub use universe::{
    ElementCounts, FieldDescriptor, MethodDescriptor, TypeDescriptor, Universe,
};
