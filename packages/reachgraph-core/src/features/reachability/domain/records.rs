/*
 * Analysis element records
 *
 * One record per program type, method, and field for the lifetime of an
 * analysis run. Every flag is a one-way gate: a `try_mark_*` call returns
 * true only for the thread that performs the 0 -> 1 transition, so each
 * mark fans out into exactly one scheduled propagation task no matter how
 * many workers race on it.
 *
 * Records are shared across all workers behind `Arc`. Mutable interior
 * state is limited to atomic flags, write-once slots, and small locked
 * lists; no operation reads-then-writes more than one record atomically.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::reason::Reason;
use super::summary::MethodSummary;

/// Identity of a program type within one analysis run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

/// Identity of a method (owning type + signature)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(pub u32);

/// Identity of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub u32);

/// Atomic 0 -> 1 claim. True only for the winning thread.
fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Per-type marking state
///
/// State machine: Unmarked -> Reachable -> Instantiated -> InHeap, each a
/// one-way gate. The propagator maintains the implications
/// (instantiated implies reachable, in-heap implies instantiated).
pub struct TypeRecord {
    id: TypeId,
    name: String,

    /// Supertype link, set once by the loading/linking collaborator
    supertype: OnceCell<TypeId>,

    /// Direct subtypes, appended when a subtype links to this type
    subtypes: Mutex<Vec<TypeId>>,

    /// Cache of instantiated subtypes (including this type itself once
    /// instantiated), published before the invoked-method scan
    instantiated_subtypes: Mutex<FxHashSet<TypeId>>,

    /// Methods invoked virtually with this type as the declaring class,
    /// published at invoked-claim time
    invoked_methods: Mutex<Vec<MethodId>>,

    /// Declared instance fields, maintained by the universe
    declared_fields: Mutex<Vec<FieldId>>,

    reachable: AtomicBool,
    instantiated: AtomicBool,
    in_heap: AtomicBool,
}

impl TypeRecord {
    pub fn new(id: TypeId, name: String) -> Self {
        Self {
            id,
            name,
            supertype: OnceCell::new(),
            subtypes: Mutex::new(Vec::new()),
            instantiated_subtypes: Mutex::new(FxHashSet::default()),
            invoked_methods: Mutex::new(Vec::new()),
            declared_fields: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(false),
            instantiated: AtomicBool::new(false),
            in_heap: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supertype(&self) -> Option<TypeId> {
        self.supertype.get().copied()
    }

    /// Set the supertype link. Returns true if this call won the slot.
    pub fn link_supertype(&self, supertype: TypeId) -> bool {
        self.supertype.set(supertype).is_ok()
    }

    pub fn add_direct_subtype(&self, subtype: TypeId) {
        self.subtypes.lock().push(subtype);
    }

    pub fn direct_subtypes(&self) -> Vec<TypeId> {
        self.subtypes.lock().clone()
    }

    /// Record an instantiated subtype. Returns true on first insertion.
    pub fn add_instantiated_subtype(&self, subtype: TypeId) -> bool {
        self.instantiated_subtypes.lock().insert(subtype)
    }

    pub fn instantiated_subtypes(&self) -> Vec<TypeId> {
        self.instantiated_subtypes.lock().iter().copied().collect()
    }

    pub fn add_invoked_method(&self, method: MethodId) {
        self.invoked_methods.lock().push(method);
    }

    pub fn invoked_methods(&self) -> Vec<MethodId> {
        self.invoked_methods.lock().clone()
    }

    pub fn add_declared_field(&self, field: FieldId) {
        self.declared_fields.lock().push(field);
    }

    pub fn declared_fields(&self) -> Vec<FieldId> {
        self.declared_fields.lock().clone()
    }

    pub fn try_mark_reachable(&self) -> bool {
        claim(&self.reachable)
    }

    pub fn try_mark_instantiated(&self) -> bool {
        claim(&self.instantiated)
    }

    pub fn try_mark_in_heap(&self) -> bool {
        claim(&self.in_heap)
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    pub fn is_instantiated(&self) -> bool {
        self.instantiated.load(Ordering::Acquire)
    }

    pub fn is_in_heap(&self) -> bool {
        self.in_heap.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TypeRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("reachable", &self.is_reachable())
            .field("instantiated", &self.is_instantiated())
            .field("in_heap", &self.is_in_heap())
            .finish()
    }
}

/// Per-method marking state
///
/// State machine: Unmarked -> Invoked -> ImplementationInvoked. The summary
/// and the causal reason are write-once.
pub struct MethodRecord {
    id: MethodId,
    holder: TypeId,
    name: String,
    qualified: String,
    is_static: bool,
    is_abstract: bool,

    invoked: AtomicBool,
    implementation_invoked: AtomicBool,
    root_registered: AtomicBool,

    summary: OnceCell<MethodSummary>,
    reason: OnceCell<Arc<Reason>>,
}

impl MethodRecord {
    pub fn new(
        id: MethodId,
        holder: TypeId,
        name: String,
        qualified: String,
        is_static: bool,
        is_abstract: bool,
    ) -> Self {
        Self {
            id,
            holder,
            name,
            qualified,
            is_static,
            is_abstract,
            invoked: AtomicBool::new(false),
            implementation_invoked: AtomicBool::new(false),
            root_registered: AtomicBool::new(false),
            summary: OnceCell::new(),
            reason: OnceCell::new(),
        }
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn holder(&self) -> TypeId {
        self.holder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name, "Holder.signature"
    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn try_mark_invoked(&self) -> bool {
        claim(&self.invoked)
    }

    pub fn try_mark_implementation_invoked(&self) -> bool {
        claim(&self.implementation_invoked)
    }

    pub fn try_mark_root_registered(&self) -> bool {
        claim(&self.root_registered)
    }

    pub fn is_invoked(&self) -> bool {
        self.invoked.load(Ordering::Acquire)
    }

    pub fn is_implementation_invoked(&self) -> bool {
        self.implementation_invoked.load(Ordering::Acquire)
    }

    pub fn is_root_registered(&self) -> bool {
        self.root_registered.load(Ordering::Acquire)
    }

    /// Store the computed summary. Returns false if one was already set.
    pub fn set_summary(&self, summary: MethodSummary) -> bool {
        self.summary.set(summary).is_ok()
    }

    pub fn summary(&self) -> Option<&MethodSummary> {
        self.summary.get()
    }

    /// Record why this method first became implementation-invoked.
    /// Later attempts are ignored; the first cause wins.
    pub fn set_reason(&self, reason: Arc<Reason>) {
        let _ = self.reason.set(reason);
    }

    pub fn reason(&self) -> Option<Arc<Reason>> {
        self.reason.get().cloned()
    }
}

impl std::fmt::Debug for MethodRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRecord")
            .field("id", &self.id)
            .field("qualified", &self.qualified)
            .field("invoked", &self.is_invoked())
            .field("implementation_invoked", &self.is_implementation_invoked())
            .finish()
    }
}

/// Per-field marking state
///
/// `read` and `written` are orthogonal; either also claims `accessed`.
pub struct FieldRecord {
    id: FieldId,
    holder: TypeId,
    name: String,
    qualified: String,

    accessed: AtomicBool,
    read: AtomicBool,
    written: AtomicBool,
}

impl FieldRecord {
    pub fn new(id: FieldId, holder: TypeId, name: String, qualified: String) -> Self {
        Self {
            id,
            holder,
            name,
            qualified,
            accessed: AtomicBool::new(false),
            read: AtomicBool::new(false),
            written: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn holder(&self) -> TypeId {
        self.holder
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualified(&self) -> &str {
        &self.qualified
    }

    pub fn try_mark_accessed(&self) -> bool {
        claim(&self.accessed)
    }

    pub fn try_mark_read(&self) -> bool {
        claim(&self.read)
    }

    pub fn try_mark_written(&self) -> bool {
        claim(&self.written)
    }

    pub fn is_accessed(&self) -> bool {
        self.accessed.load(Ordering::Acquire)
    }

    pub fn is_read(&self) -> bool {
        self.read.load(Ordering::Acquire)
    }

    pub fn is_written(&self) -> bool {
        self.written.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FieldRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRecord")
            .field("id", &self.id)
            .field("qualified", &self.qualified)
            .field("accessed", &self.is_accessed())
            .finish()
    }
}
