/*
 * Closure propagator
 *
 * Derives new reachability marks from method summaries and type
 * instantiations and schedules the follow-up work for each first-time
 * transition. Correctness rests on two properties:
 *
 * - every `mark_*` is an atomic claim followed by exactly one scheduled
 *   task, so fan-out happens once per mark regardless of racing workers;
 * - both dispatch rules publish their own fact before scanning the other
 *   side (a newly invoked method enters the declaring type's invoked list
 *   before its receivers are scanned; a newly instantiated type enters the
 *   instantiated-subtype caches before the invoked lists are scanned), so
 *   the invoke/instantiate pair converges to the same resolved set in
 *   either discovery order.
 */

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::errors::{ClosureError, SummaryFailure};
use crate::features::reachability::application::config::SummaryFailurePolicy;
use crate::features::reachability::domain::{
    DispatchKind, FieldRecord, ForeignCallDescriptor, MethodRecord, MethodSummary, Reason,
    TypeRecord,
};
use crate::features::reachability::ports::{ForeignCallResolver, MethodSummaryProvider};

use super::resolver::resolve_override;
use super::scheduler::{WorkItem, WorkScheduler};
use super::universe::{FieldDescriptor, MethodDescriptor, TypeDescriptor, Universe};

/// The closure algorithm over one universe and one scheduler.
///
/// Also the facade handed to iteration-boundary and heap-verifier hooks:
/// root registration and the public `mark_*` entry points are the only ways
/// external callers seed or extend the closure.
pub struct ClosurePropagator {
    universe: Arc<Universe>,
    scheduler: Arc<WorkScheduler>,
    summary_provider: Arc<dyn MethodSummaryProvider>,
    foreign_call_resolver: OnceCell<Arc<dyn ForeignCallResolver>>,
    policy: SummaryFailurePolicy,

    /// First fatal error raised by any worker; checked after each drain
    fatal: OnceCell<ClosureError>,
    /// Summary failures tolerated under the lenient policy
    warnings: Mutex<Vec<SummaryFailure>>,
    /// Successful first-time transitions, for the run statistics
    propagations: AtomicUsize,
}

impl ClosurePropagator {
    pub fn new(
        universe: Arc<Universe>,
        scheduler: Arc<WorkScheduler>,
        summary_provider: Arc<dyn MethodSummaryProvider>,
        policy: SummaryFailurePolicy,
    ) -> Self {
        Self {
            universe,
            scheduler,
            summary_provider,
            foreign_call_resolver: OnceCell::new(),
            policy,
            fatal: OnceCell::new(),
            warnings: Mutex::new(Vec::new()),
            propagations: AtomicUsize::new(0),
        }
    }

    pub fn universe(&self) -> &Arc<Universe> {
        &self.universe
    }

    pub fn scheduler(&self) -> &Arc<WorkScheduler> {
        &self.scheduler
    }

    pub fn set_foreign_call_resolver(&self, resolver: Arc<dyn ForeignCallResolver>) {
        if self.foreign_call_resolver.set(resolver).is_err() {
            warn!("foreign call resolver already configured; keeping the first one");
        }
    }

    pub fn propagations(&self) -> usize {
        self.propagations.load(Ordering::Acquire)
    }

    pub fn fatal_error(&self) -> Option<ClosureError> {
        self.fatal.get().cloned()
    }

    pub fn take_warnings(&self) -> Vec<SummaryFailure> {
        std::mem::take(&mut *self.warnings.lock())
    }

    // ------------------------------------------------------------------
    // Root registration
    // ------------------------------------------------------------------

    /// Register a type as an analysis root: its supertype chain becomes
    /// reachable, the type itself becomes instantiated, and with
    /// `add_fields` the fields declared anywhere on the chain become
    /// accessed. Idempotent.
    pub fn add_root_type(&self, decl: &TypeDescriptor, add_fields: bool) -> Arc<TypeRecord> {
        let record = self.universe.type_of(decl);
        debug!(root = record.name(), "add root type");
        if add_fields {
            let mut current = Some(Arc::clone(&record));
            while let Some(t) = current {
                for field_id in t.declared_fields() {
                    self.mark_field_accessed(&self.universe.field_by_id(field_id));
                }
                current = t.supertype().map(|id| self.universe.type_by_id(id));
            }
        }
        self.mark_type_instantiated(&record);
        record
    }

    /// Register a method as an analysis root: invoked and
    /// implementation-invoked with a root reason; a non-static root also
    /// instantiates its declaring type. Idempotent; re-adding returns the
    /// existing record without re-scheduling.
    pub fn add_root_method(&self, decl: &MethodDescriptor) -> Arc<MethodRecord> {
        let record = self.universe.method_of(decl);
        self.register_root_method(&record);
        record
    }

    fn register_root_method(&self, record: &Arc<MethodRecord>) {
        if !record.try_mark_root_registered() {
            return;
        }
        debug!(root = record.qualified(), "add root method");
        if !record.is_static() {
            let holder = self.universe.type_by_id(record.holder());
            self.mark_type_instantiated(&holder);
        }
        let reason = Reason::root();
        self.mark_method_invoked(record, Arc::clone(&reason));
        self.mark_method_implementation_invoked(record, reason);
    }

    /// Register a field as an analysis root: its holder chain becomes
    /// reachable and the field becomes accessed. Idempotent.
    pub fn add_root_field(&self, decl: &FieldDescriptor) -> Arc<FieldRecord> {
        let record = self.universe.field_of(decl);
        debug!(root = record.qualified(), "add root field");
        let holder = self.universe.type_by_id(record.holder());
        self.mark_type_reachable(&holder);
        self.mark_field_accessed(&record);
        record
    }

    // ------------------------------------------------------------------
    // Mark transitions (claim, then schedule exactly once)
    // ------------------------------------------------------------------

    /// Mark a type and its supertype chain reachable. Iterative walk, no
    /// recursion on deep hierarchies. Returns true if this call claimed the
    /// transition for the type itself.
    pub fn mark_type_reachable(&self, type_record: &Arc<TypeRecord>) -> bool {
        let first = type_record.try_mark_reachable();
        if first {
            self.propagations.fetch_add(1, Ordering::Relaxed);
            let mut current = type_record.supertype();
            while let Some(id) = current {
                let supertype = self.universe.type_by_id(id);
                if !supertype.try_mark_reachable() {
                    break;
                }
                self.propagations.fetch_add(1, Ordering::Relaxed);
                current = supertype.supertype();
            }
        }
        first
    }

    /// Mark a type instantiated (implies reachable) and schedule the
    /// dispatch activation along its supertype chain.
    pub fn mark_type_instantiated(&self, type_record: &Arc<TypeRecord>) -> bool {
        if !type_record.try_mark_instantiated() {
            return false;
        }
        self.propagations.fetch_add(1, Ordering::Relaxed);
        self.mark_type_reachable(type_record);
        self.scheduler
            .schedule(WorkItem::TypeInstantiated(type_record.id()));
        true
    }

    /// Mark a type's instances as living in the image heap
    /// (implies instantiated).
    pub fn mark_type_in_heap(&self, type_record: &Arc<TypeRecord>) -> bool {
        self.mark_type_instantiated(type_record);
        let first = type_record.try_mark_in_heap();
        if first {
            self.propagations.fetch_add(1, Ordering::Relaxed);
        }
        first
    }

    pub fn mark_field_accessed(&self, field: &Arc<FieldRecord>) {
        if field.try_mark_accessed() {
            self.propagations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn mark_field_read(&self, field: &Arc<FieldRecord>) {
        self.mark_field_accessed(field);
        if field.try_mark_read() {
            self.propagations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn mark_field_written(&self, field: &Arc<FieldRecord>) {
        self.mark_field_accessed(field);
        if field.try_mark_written() {
            self.propagations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Mark a method invoked. An instance method is published into its
    /// declaring type's invoked list before the receiver scan is scheduled,
    /// so a racing instantiation cannot miss it.
    pub fn mark_method_invoked(&self, method: &Arc<MethodRecord>, reason: Arc<Reason>) {
        if !method.try_mark_invoked() {
            return;
        }
        self.propagations.fetch_add(1, Ordering::Relaxed);
        if !method.is_static() {
            self.universe
                .type_by_id(method.holder())
                .add_invoked_method(method.id());
        }
        self.scheduler
            .schedule(WorkItem::MethodInvoked(method.id(), reason));
    }

    /// Mark a method body implementation-invoked and schedule its summary
    /// processing. Abstract records carry no body; handing one in indicates
    /// a caller bug and is contained by logging and skipping.
    pub fn mark_method_implementation_invoked(
        &self,
        method: &Arc<MethodRecord>,
        reason: Arc<Reason>,
    ) {
        if method.is_abstract() {
            warn!(
                method = method.qualified(),
                "abstract method passed as implementation-invoked; skipping"
            );
            return;
        }
        self.mark_method_invoked(method, Arc::clone(&reason));
        if !method.try_mark_implementation_invoked() {
            return;
        }
        self.propagations.fetch_add(1, Ordering::Relaxed);
        method.set_reason(reason);
        self.scheduler
            .schedule(WorkItem::MethodImplementationInvoked(method.id()));
    }

    // ------------------------------------------------------------------
    // Scheduled work
    // ------------------------------------------------------------------

    /// Execute one unit. Returns false to request a fatal stop of the pool.
    ///
    /// A panicking unit is contained here, where the offending method and
    /// its causal chain can still be named; the scheduler's own containment
    /// only sees the opaque work item.
    pub fn process(&self, item: WorkItem) -> bool {
        if catch_unwind(AssertUnwindSafe(|| self.dispatch(&item))).is_err() {
            error!(
                task = %self.describe(&item),
                "propagation task panicked; dropping the unit"
            );
        }
        self.fatal.get().is_none()
    }

    fn dispatch(&self, item: &WorkItem) {
        match item {
            WorkItem::MethodImplementationInvoked(id) => {
                let method = self.universe.method_by_id(*id);
                self.on_method_implementation_invoked(&method);
            }
            WorkItem::MethodInvoked(id, reason) => {
                let method = self.universe.method_by_id(*id);
                self.on_method_invoked(&method, Arc::clone(reason));
            }
            WorkItem::TypeInstantiated(id) => {
                let type_record = self.universe.type_by_id(*id);
                self.on_type_instantiated(&type_record);
            }
        }
    }

    /// Qualified name plus rendered causal chain for diagnostics.
    fn describe(&self, item: &WorkItem) -> String {
        match item {
            WorkItem::MethodImplementationInvoked(id) => {
                let method = self.universe.method_by_id(*id);
                match method.reason() {
                    Some(reason) => {
                        format!("{} ({})", method.qualified(), self.render_chain(&reason))
                    }
                    None => method.qualified().to_string(),
                }
            }
            WorkItem::MethodInvoked(id, reason) => {
                let method = self.universe.method_by_id(*id);
                format!("{} ({})", method.qualified(), self.render_chain(reason))
            }
            WorkItem::TypeInstantiated(id) => self.universe.type_by_id(*id).name().to_string(),
        }
    }

    fn render_chain(&self, reason: &Reason) -> String {
        reason.describe_with(|id| self.universe.method_by_id(id).qualified().to_string())
    }

    /// Fetch the summary of a newly implementation-invoked body and derive
    /// marks from every entry. The summary slot is written only after the
    /// entries were processed successfully.
    fn on_method_implementation_invoked(&self, method: &Arc<MethodRecord>) {
        match self.summary_provider.summary_of(&self.universe, method) {
            Ok(summary) => {
                self.process_summary(method, &summary);
                method.set_summary(summary);
            }
            Err(err) => {
                let failure = SummaryFailure {
                    method: method.qualified().to_string(),
                    reason_chain: method.reason().map(|r| self.render_chain(&r)),
                    message: err.message,
                };
                match self.policy {
                    SummaryFailurePolicy::Strict => {
                        let _ = self.fatal.set(ClosureError::SummaryComputation {
                            method: failure.method.clone(),
                            reason_chain: failure.reason_chain.clone(),
                            message: failure.message.clone(),
                        });
                    }
                    SummaryFailurePolicy::Lenient => {
                        warn!(
                            method = %failure.method,
                            reason = failure.reason_chain.as_deref().unwrap_or("<root>"),
                            "summary computation failed; method contributes no further fan-out"
                        );
                        self.warnings.lock().push(failure);
                    }
                }
            }
        }
    }

    fn process_summary(&self, method: &Arc<MethodRecord>, summary: &MethodSummary) {
        for &invoked in &summary.invoked_methods {
            let target = self.universe.method_by_id(invoked);
            let reason = Reason::invoke(method.reason(), method.id(), DispatchKind::Virtual);
            self.mark_method_invoked(&target, reason);
        }
        for &direct in &summary.implementation_invoked_methods {
            let target = self.universe.method_by_id(direct);
            let reason = Reason::invoke(method.reason(), method.id(), DispatchKind::Static);
            self.mark_method_invoked(&target, Arc::clone(&reason));
            self.mark_method_implementation_invoked(&target, reason);
        }
        for &accessed in &summary.accessed_types {
            self.mark_type_reachable(&self.universe.type_by_id(accessed));
        }
        for &instantiated in &summary.instantiated_types {
            self.mark_type_instantiated(&self.universe.type_by_id(instantiated));
        }
        for &read in &summary.read_fields {
            self.mark_field_read(&self.universe.field_by_id(read));
        }
        for &written in &summary.written_fields {
            self.mark_field_written(&self.universe.field_by_id(written));
        }
        for constant in &summary.embedded_constants {
            if constant.is_null {
                continue;
            }
            self.mark_type_in_heap(&self.universe.type_by_id(constant.runtime_type));
        }
        for descriptor in &summary.foreign_call_targets {
            self.register_foreign_call(descriptor);
        }
    }

    /// Activate already-known virtual call sites along the supertype chain
    /// of a newly instantiated type. Publishes the type into each chain
    /// member's instantiated-subtype cache before scanning its invoked list.
    fn on_type_instantiated(&self, type_record: &Arc<TypeRecord>) {
        let mut current = Arc::clone(type_record);
        loop {
            current.add_instantiated_subtype(type_record.id());
            for method_id in current.invoked_methods() {
                let invoked = self.universe.method_by_id(method_id);
                if invoked.is_static() {
                    continue;
                }
                if let Some(resolved) =
                    resolve_override(&self.universe, &current, invoked.name(), type_record)
                {
                    let reason =
                        Reason::invoke(invoked.reason(), invoked.id(), DispatchKind::Virtual);
                    self.mark_method_implementation_invoked(&resolved, reason);
                }
            }
            match current.supertype() {
                Some(id) => current = self.universe.type_by_id(id),
                None => break,
            }
        }
    }

    /// Resolve a newly invoked method against every receiver type already
    /// known to be instantiated (the rule symmetric to type instantiation).
    fn on_method_invoked(&self, method: &Arc<MethodRecord>, reason: Arc<Reason>) {
        if method.is_static() {
            // No dispatch ambiguity; invoked immediately implies a body.
            self.mark_method_implementation_invoked(method, reason);
            return;
        }
        let declaring = self.universe.type_by_id(method.holder());
        for subtype_id in declaring.instantiated_subtypes() {
            let receiver = self.universe.type_by_id(subtype_id);
            if let Some(resolved) =
                resolve_override(&self.universe, &declaring, method.name(), &receiver)
            {
                let resolved_reason =
                    Reason::invoke(Some(Arc::clone(&reason)), method.id(), DispatchKind::Virtual);
                self.mark_method_implementation_invoked(&resolved, resolved_reason);
            }
        }
    }

    fn register_foreign_call(&self, descriptor: &ForeignCallDescriptor) {
        let Some(resolver) = self.foreign_call_resolver.get() else {
            debug!(target = %descriptor.name, "no foreign call resolver configured; skipping");
            return;
        };
        match resolver.resolve_foreign_call(&self.universe, descriptor) {
            Some(target) => self.register_root_method(&target),
            None => {
                // Caller-side bug or an intentionally opaque runtime routine;
                // contained without failing the run.
                warn!(target = %descriptor.name, "unresolved foreign call target; skipping root registration");
            }
        }
    }
}
