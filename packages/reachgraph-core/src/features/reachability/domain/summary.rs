/*
 * Method summaries
 *
 * A summary is the complete effect set of one method body: what it calls,
 * what it allocates or touches on the heap, and which runtime routines it
 * references. Summaries are produced once per method by the external
 * provider and consumed exactly once by the propagator.
 */

use super::records::{FieldId, MethodId, TypeId};

/// A non-primitive constant embedded in a method body.
///
/// The runtime type of a non-null constant is registered as living in the
/// image heap. Null constants carry no type and are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConstant {
    pub runtime_type: TypeId,
    pub is_null: bool,
}

impl HeapConstant {
    pub fn of(runtime_type: TypeId) -> Self {
        Self {
            runtime_type,
            is_null: false,
        }
    }

    pub fn null(runtime_type: TypeId) -> Self {
        Self {
            runtime_type,
            is_null: true,
        }
    }
}

/// A reference to a runtime/foreign routine.
///
/// Math-intrinsic lowerings that resolve to concrete runtime routines are
/// emitted by the summary provider in this same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignCallDescriptor {
    pub name: String,
}

impl ForeignCallDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Immutable effect set of one method body
#[derive(Debug, Clone, Default)]
pub struct MethodSummary {
    /// Methods named at virtual call sites
    pub invoked_methods: Vec<MethodId>,

    /// Methods whose target is statically bound
    pub implementation_invoked_methods: Vec<MethodId>,

    /// Types read from or otherwise touched
    pub accessed_types: Vec<TypeId>,

    /// Types allocated by this body
    pub instantiated_types: Vec<TypeId>,

    pub read_fields: Vec<FieldId>,
    pub written_fields: Vec<FieldId>,

    /// Object constants embedded in the body
    pub embedded_constants: Vec<HeapConstant>,

    /// Referenced runtime-call targets
    pub foreign_call_targets: Vec<ForeignCallDescriptor>,
}

impl MethodSummary {
    pub fn is_empty(&self) -> bool {
        self.invoked_methods.is_empty()
            && self.implementation_invoked_methods.is_empty()
            && self.accessed_types.is_empty()
            && self.instantiated_types.is_empty()
            && self.read_fields.is_empty()
            && self.written_fields.is_empty()
            && self.embedded_constants.is_empty()
            && self.foreign_call_targets.is_empty()
    }
}
