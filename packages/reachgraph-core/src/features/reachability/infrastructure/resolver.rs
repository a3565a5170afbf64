/*
 * Virtual dispatch resolution
 *
 * Pure single-dispatch override resolution over the explicit type
 * hierarchy: walk the receiver's supertype chain and take the most-derived
 * declaration of the signature. An abstract winner has no concrete body and
 * resolves to nothing. Both propagation rules (instantiate-then-resolve and
 * invoke-then-resolve) call into this one function.
 */

use std::sync::Arc;

use crate::features::reachability::domain::{MethodRecord, TypeRecord};

use super::universe::Universe;

/// Resolve the concrete method body `receiver` would run for `signature`
/// declared on `declaring`. Returns `None` when the most-derived declaration
/// is abstract or no declaration is found on the chain.
pub fn resolve_override(
    universe: &Universe,
    declaring: &TypeRecord,
    signature: &str,
    receiver: &Arc<TypeRecord>,
) -> Option<Arc<MethodRecord>> {
    let mut current = Some(Arc::clone(receiver));
    while let Some(t) = current {
        if let Some(method) = universe.lookup_method(t.id(), signature) {
            if method.is_abstract() {
                return None;
            }
            return Some(method);
        }
        if t.id() == declaring.id() {
            // The declaring type itself holds no record for the signature;
            // nothing above it can be the resolved target.
            return None;
        }
        current = t.supertype().map(|id| universe.type_by_id(id));
    }
    None
}
