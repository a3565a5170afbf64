//! Domain models for the reachability closure
//!
//! Core abstractions independent of scheduling and propagation:
//! - TypeRecord / MethodRecord / FieldRecord: per-element monotonic marking state
//! - Reason: causal chain attached to implementation-invoked methods
//! - MethodSummary: per-method effect set consumed by the propagator

pub mod reason;
pub mod records;
pub mod summary;

pub use reason::{DispatchKind, Reason};
pub use records::{FieldId, FieldRecord, MethodId, MethodRecord, TypeId, TypeRecord};
pub use summary::{ForeignCallDescriptor, HeapConstant, MethodSummary};
