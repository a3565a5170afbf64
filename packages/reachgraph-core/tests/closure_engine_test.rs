//! End-to-end scenarios for the reachability-closure engine: virtual
//! dispatch, convergence protocol, hook contracts, and failure policies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pretty_assertions::assert_eq;

use reachgraph_core::features::reachability::infrastructure::WorkScheduler;
use reachgraph_core::{
    ClosureEngine, ClosureError, ClosurePropagator, EngineConfig, FieldDescriptor,
    ForeignCallDescriptor, ForeignCallResolver, HeapConstant, HeapVerifier, IterationBoundaryHook,
    MethodDescriptor, MethodRecord, MethodSummary, MethodSummaryProvider, Reason, SummaryError,
    SummaryFailurePolicy, TypeDescriptor, Universe,
};

// ----------------------------------------------------------------------
// Fixture: a scripted summary provider
// ----------------------------------------------------------------------

fn ty(name: &str) -> TypeDescriptor {
    TypeDescriptor::named(name)
}

fn ty_sub(name: &str, supertype: &str) -> TypeDescriptor {
    TypeDescriptor::with_supertype(name, supertype)
}

fn static_m(holder: &str, name: &str) -> MethodDescriptor {
    MethodDescriptor::static_method(ty(holder), name)
}

fn inst_m(holder: &str, name: &str) -> MethodDescriptor {
    MethodDescriptor::instance_method(ty(holder), name)
}

fn abs_m(holder: &str, name: &str) -> MethodDescriptor {
    MethodDescriptor::abstract_method(ty(holder), name)
}

fn fld(holder: &str, name: &str) -> FieldDescriptor {
    FieldDescriptor::new(ty(holder), name)
}

#[derive(Default, Clone)]
struct SummarySpec {
    invokes: Vec<MethodDescriptor>,
    calls_direct: Vec<MethodDescriptor>,
    accesses: Vec<TypeDescriptor>,
    instantiates: Vec<TypeDescriptor>,
    reads: Vec<FieldDescriptor>,
    writes: Vec<FieldDescriptor>,
    constants: Vec<(TypeDescriptor, bool)>,
    foreign: Vec<ForeignCallDescriptor>,
    fails_with: Option<String>,
    panics: bool,
}

impl SummarySpec {
    fn new() -> Self {
        Self::default()
    }

    fn invokes(mut self, m: MethodDescriptor) -> Self {
        self.invokes.push(m);
        self
    }

    fn calls_direct(mut self, m: MethodDescriptor) -> Self {
        self.calls_direct.push(m);
        self
    }

    fn accesses(mut self, t: TypeDescriptor) -> Self {
        self.accesses.push(t);
        self
    }

    fn instantiates(mut self, t: TypeDescriptor) -> Self {
        self.instantiates.push(t);
        self
    }

    fn reads(mut self, f: FieldDescriptor) -> Self {
        self.reads.push(f);
        self
    }

    fn writes(mut self, f: FieldDescriptor) -> Self {
        self.writes.push(f);
        self
    }

    fn constant(mut self, t: TypeDescriptor) -> Self {
        self.constants.push((t, false));
        self
    }

    fn null_constant(mut self, t: TypeDescriptor) -> Self {
        self.constants.push((t, true));
        self
    }

    fn foreign(mut self, name: &str) -> Self {
        self.foreign.push(ForeignCallDescriptor::new(name));
        self
    }

    fn fails_with(mut self, message: &str) -> Self {
        self.fails_with = Some(message.to_string());
        self
    }

    fn panics(mut self) -> Self {
        self.panics = true;
        self
    }
}

/// Scripted provider: summaries keyed by qualified method name; methods
/// without a script contribute an empty summary.
#[derive(Default)]
struct FixtureProvider {
    specs: HashMap<String, SummarySpec>,
}

impl FixtureProvider {
    fn new() -> Self {
        Self::default()
    }

    fn set(mut self, qualified: &str, spec: SummarySpec) -> Self {
        self.specs.insert(qualified.to_string(), spec);
        self
    }
}

impl MethodSummaryProvider for FixtureProvider {
    fn summary_of(
        &self,
        universe: &Universe,
        method: &MethodRecord,
    ) -> Result<MethodSummary, SummaryError> {
        let Some(spec) = self.specs.get(method.qualified()) else {
            return Ok(MethodSummary::default());
        };
        if spec.panics {
            panic!("summary computation exploded for {}", method.qualified());
        }
        if let Some(message) = &spec.fails_with {
            return Err(SummaryError::new(message.clone()));
        }
        Ok(MethodSummary {
            invoked_methods: spec.invokes.iter().map(|d| universe.method_of(d).id()).collect(),
            implementation_invoked_methods: spec
                .calls_direct
                .iter()
                .map(|d| universe.method_of(d).id())
                .collect(),
            accessed_types: spec.accesses.iter().map(|d| universe.type_of(d).id()).collect(),
            instantiated_types: spec
                .instantiates
                .iter()
                .map(|d| universe.type_of(d).id())
                .collect(),
            read_fields: spec.reads.iter().map(|d| universe.field_of(d).id()).collect(),
            written_fields: spec.writes.iter().map(|d| universe.field_of(d).id()).collect(),
            embedded_constants: spec
                .constants
                .iter()
                .map(|(t, is_null)| {
                    let id = universe.type_of(t).id();
                    if *is_null {
                        HeapConstant::null(id)
                    } else {
                        HeapConstant::of(id)
                    }
                })
                .collect(),
            foreign_call_targets: spec.foreign.clone(),
        })
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        worker_threads: Some(2),
        ..EngineConfig::default()
    }
}

fn engine_with(provider: FixtureProvider) -> ClosureEngine {
    ClosureEngine::new(test_config(), Arc::new(provider))
}

/// A universe/scheduler/propagator triple for tests that drive propagation
/// directly instead of going through the engine.
fn standalone_propagator(
    provider: FixtureProvider,
) -> (Arc<Universe>, Arc<WorkScheduler>, Arc<ClosurePropagator>) {
    let universe = Arc::new(Universe::new());
    let scheduler = Arc::new(WorkScheduler::new(2));
    let propagator = Arc::new(ClosurePropagator::new(
        Arc::clone(&universe),
        Arc::clone(&scheduler),
        Arc::new(provider),
        SummaryFailurePolicy::Lenient,
    ));
    (universe, scheduler, propagator)
}

// ----------------------------------------------------------------------
// Virtual dispatch
// ----------------------------------------------------------------------

#[test]
fn test_virtual_dispatch_resolves_to_instantiated_override() {
    let provider = FixtureProvider::new().set(
        "App.main",
        SummarySpec::new()
            .instantiates(ty_sub("Dog", "Animal"))
            .invokes(abs_m("Animal", "speak")),
    );
    let engine = engine_with(provider);

    // Program shape declared by the loading collaborator.
    let universe = Arc::clone(engine.universe());
    universe.type_of(&ty("Animal"));
    universe.type_of(&ty_sub("Dog", "Animal"));
    universe.method_of(&abs_m("Animal", "speak"));
    universe.method_of(&inst_m("Dog", "speak"));

    engine.add_root_method(&static_m("App", "main"));
    engine.run().unwrap();

    let animal = universe.lookup_type("Animal").unwrap();
    let dog = universe.lookup_type("Dog").unwrap();
    assert!(animal.is_reachable());
    assert!(!animal.is_instantiated());
    assert!(dog.is_instantiated());
    assert!(dog.is_reachable());

    let animal_speak = universe.lookup_method(animal.id(), "speak").unwrap();
    let dog_speak = universe.lookup_method(dog.id(), "speak").unwrap();
    assert!(animal_speak.is_invoked());
    assert!(!animal_speak.is_implementation_invoked());
    assert!(dog_speak.is_implementation_invoked());
}

#[test]
fn test_dispatch_resolution_is_order_independent() {
    let run = |instantiate_first: bool| {
        let (universe, scheduler, propagator) = standalone_propagator(FixtureProvider::new());
        universe.type_of(&ty("Animal"));
        let dog = universe.type_of(&ty_sub("Dog", "Animal"));
        let cat = universe.type_of(&ty_sub("Cat", "Animal"));
        let speak = universe.method_of(&abs_m("Animal", "speak"));
        universe.method_of(&inst_m("Dog", "speak"));
        universe.method_of(&inst_m("Cat", "speak"));

        if instantiate_first {
            propagator.mark_type_instantiated(&dog);
            scheduler.drain(|item| propagator.process(item));
            propagator.mark_method_invoked(&speak, Reason::root());
            scheduler.drain(|item| propagator.process(item));
        } else {
            propagator.mark_method_invoked(&speak, Reason::root());
            scheduler.drain(|item| propagator.process(item));
            propagator.mark_type_instantiated(&dog);
            scheduler.drain(|item| propagator.process(item));
        }

        let dog_speak = universe.lookup_method(dog.id(), "speak").unwrap();
        let cat_speak = universe.lookup_method(cat.id(), "speak").unwrap();
        (
            dog_speak.is_implementation_invoked(),
            cat_speak.is_implementation_invoked(),
        )
    };

    assert_eq!(run(true), (true, false));
    assert_eq!(run(false), (true, false));
}

#[test]
fn test_instantiation_activates_sites_up_the_whole_chain() {
    let provider = FixtureProvider::new().set(
        "App.main",
        SummarySpec::new()
            .invokes(inst_m("A", "tick"))
            .instantiates(ty_sub("C", "B")),
    );
    let engine = engine_with(provider);
    let universe = Arc::clone(engine.universe());

    // A <- B <- C, tick declared concrete on A only and inherited by C.
    universe.type_of(&ty("A"));
    universe.type_of(&ty_sub("B", "A"));
    universe.type_of(&ty_sub("C", "B"));
    let a_tick = universe.method_of(&inst_m("A", "tick"));

    engine.add_root_method(&static_m("App", "main"));
    engine.run().unwrap();

    // C inherits A.tick, so the inherited body is the resolved target.
    assert!(a_tick.is_implementation_invoked());
    let b = universe.lookup_type("B").unwrap();
    let a = universe.lookup_type("A").unwrap();
    assert!(b.is_reachable());
    assert!(a.is_reachable());
}

// ----------------------------------------------------------------------
// Marks and roots
// ----------------------------------------------------------------------

#[test]
fn test_root_registration_is_idempotent() {
    let (_universe, scheduler, propagator) = standalone_propagator(FixtureProvider::new());

    let first = propagator.add_root_method(&static_m("App", "main"));
    let pending_after_first = scheduler.pending_count();
    let second = propagator.add_root_method(&static_m("App", "main"));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(scheduler.pending_count(), pending_after_first);
}

#[test]
fn test_root_type_with_fields_covers_the_supertype_chain() {
    let engine = engine_with(FixtureProvider::new());
    let universe = Arc::clone(engine.universe());

    let base_field = universe.field_of(&fld("Base", "id"));
    let derived_field =
        universe.field_of(&FieldDescriptor::new(ty_sub("Derived", "Base"), "payload"));

    engine.add_root_type(&ty("Derived"), true);
    engine.run().unwrap();

    assert!(derived_field.is_accessed());
    assert!(base_field.is_accessed());

    let derived = universe.lookup_type("Derived").unwrap();
    let base = universe.lookup_type("Base").unwrap();
    assert!(derived.is_instantiated());
    assert!(base.is_reachable());
    assert!(!base.is_instantiated());
}

#[test]
fn test_root_field_marks_holder_chain_and_is_idempotent() {
    let (universe, scheduler, propagator) = standalone_propagator(FixtureProvider::new());
    universe.type_of(&ty_sub("Config", "Settings"));

    let first = propagator.add_root_field(&fld("Config", "path"));
    assert!(first.is_accessed());
    assert!(!first.is_read());
    assert!(!first.is_written());

    let config = universe.lookup_type("Config").unwrap();
    let settings = universe.lookup_type("Settings").unwrap();
    assert!(config.is_reachable());
    assert!(!config.is_instantiated());
    assert!(settings.is_reachable());

    let pending = scheduler.pending_count();
    let second = propagator.add_root_field(&fld("Config", "path"));
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(scheduler.pending_count(), pending);
}

#[test]
fn test_concurrent_instantiation_schedules_exactly_one_task() {
    let (universe, scheduler, propagator) = standalone_propagator(FixtureProvider::new());
    let t = universe.type_of(&ty("Hot"));

    let winners = AtomicUsize::new(0);
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                if propagator.mark_type_instantiated(&t) {
                    winners.fetch_add(1, Ordering::Relaxed);
                }
            });
        }
    });

    assert_eq!(winners.load(Ordering::Relaxed), 1);
    assert_eq!(scheduler.pending_count(), 1);
    assert!(t.is_instantiated());
    assert!(t.is_reachable());
}

#[test]
fn test_static_call_chain_reaches_transitive_closure() {
    let provider = FixtureProvider::new()
        .set("App.main", SummarySpec::new().calls_direct(static_m("App", "a")))
        .set(
            "App.a",
            SummarySpec::new()
                .calls_direct(static_m("App", "b"))
                .reads(fld("App", "config"))
                .writes(fld("App", "state")),
        );
    let engine = engine_with(provider);

    engine.add_root_method(&static_m("App", "main"));
    let report = engine.run().unwrap();

    let universe = engine.universe();
    let implementation_invoked: Vec<String> = {
        let mut names: Vec<String> = universe
            .all_methods()
            .into_iter()
            .filter(|m| m.is_implementation_invoked())
            .map(|m| m.qualified().to_string())
            .collect();
        names.sort();
        names
    };
    assert_eq!(implementation_invoked, vec!["App.a", "App.b", "App.main"]);

    let app = universe.lookup_type("App").unwrap();
    let b = universe.lookup_method(app.id(), "b").unwrap();
    assert!(b.summary().is_some());

    let fields = universe.all_fields();
    let read = fields.iter().find(|f| f.qualified() == "App.config").unwrap();
    let written = fields.iter().find(|f| f.qualified() == "App.state").unwrap();
    assert!(read.is_read() && read.is_accessed() && !read.is_written());
    assert!(written.is_written() && written.is_accessed() && !written.is_read());

    assert_eq!(report.stats.iterations, 1);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_heap_constants_mark_runtime_types_in_heap() {
    let provider = FixtureProvider::new().set(
        "App.main",
        SummarySpec::new().constant(ty("Str")).null_constant(ty("Nothing")),
    );
    let engine = engine_with(provider);

    engine.add_root_method(&static_m("App", "main"));
    engine.run().unwrap();

    let universe = engine.universe();
    let str_type = universe.lookup_type("Str").unwrap();
    assert!(str_type.is_in_heap());
    assert!(str_type.is_instantiated());
    assert!(str_type.is_reachable());

    let nothing = universe.lookup_type("Nothing").unwrap();
    assert!(!nothing.is_in_heap());
    assert!(!nothing.is_instantiated());
}

// ----------------------------------------------------------------------
// Foreign calls
// ----------------------------------------------------------------------

struct RuntimeStubs;

impl ForeignCallResolver for RuntimeStubs {
    fn resolve_foreign_call(
        &self,
        universe: &Universe,
        descriptor: &ForeignCallDescriptor,
    ) -> Option<Arc<MethodRecord>> {
        if descriptor.name == "arraycopy" {
            Some(universe.method_of(&static_m("Runtime", "arraycopy")))
        } else {
            None
        }
    }
}

#[test]
fn test_foreign_call_target_becomes_root() {
    let provider = FixtureProvider::new().set(
        "App.main",
        SummarySpec::new().foreign("arraycopy").foreign("unknown_intrinsic"),
    );
    let engine = engine_with(provider).with_foreign_call_resolver(Arc::new(RuntimeStubs));

    engine.add_root_method(&static_m("App", "main"));
    engine.run().unwrap();

    let universe = engine.universe();
    let runtime = universe.lookup_type("Runtime").unwrap();
    let arraycopy = universe.lookup_method(runtime.id(), "arraycopy").unwrap();
    assert!(arraycopy.is_root_registered());
    assert!(arraycopy.is_implementation_invoked());
}

// ----------------------------------------------------------------------
// Convergence protocol
// ----------------------------------------------------------------------

struct DeclaredLateRoot {
    fired: AtomicBool,
}

impl IterationBoundaryHook for DeclaredLateRoot {
    fn on_iteration_boundary(&self, analysis: &ClosurePropagator) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        analysis.add_root_type(&ty("LateRoot"), false);
        true
    }
}

#[test]
fn test_declared_late_root_adds_exactly_one_fixpoint() {
    let engine = engine_with(FixtureProvider::new()).with_iteration_hook(Arc::new(
        DeclaredLateRoot {
            fired: AtomicBool::new(false),
        },
    ));
    engine.add_root_method(&static_m("App", "main"));

    let report = engine.run().unwrap();
    assert_eq!(report.stats.iterations, 2);

    let late = engine.universe().lookup_type("LateRoot").unwrap();
    assert!(late.is_instantiated());
}

struct UndeclaredMutation;

impl IterationBoundaryHook for UndeclaredMutation {
    fn on_iteration_boundary(&self, analysis: &ClosurePropagator) -> bool {
        analysis.add_root_type(&ty("Sneaky"), false);
        false
    }
}

#[test]
fn test_undeclared_universe_growth_is_a_consistency_violation() {
    let engine =
        engine_with(FixtureProvider::new()).with_iteration_hook(Arc::new(UndeclaredMutation));
    engine.add_root_method(&static_m("App", "main"));

    let err = engine.run().unwrap_err();
    match err {
        ClosureError::ConsistencyViolation { before, after } => {
            assert_eq!(after.types, before.types + 1);
        }
        other => panic!("expected ConsistencyViolation, got {other}"),
    }
}

struct RunawayRootInjector {
    counter: AtomicUsize,
}

impl IterationBoundaryHook for RunawayRootInjector {
    fn on_iteration_boundary(&self, analysis: &ClosurePropagator) -> bool {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        analysis.add_root_type(&ty(&format!("Synthetic{n}")), false);
        true
    }
}

#[test]
fn test_runaway_hook_exceeds_iteration_cap() {
    let engine = engine_with(FixtureProvider::new()).with_iteration_hook(Arc::new(
        RunawayRootInjector {
            counter: AtomicUsize::new(0),
        },
    ));
    engine.add_root_method(&static_m("App", "main"));

    let err = engine.run().unwrap_err();
    match err {
        ClosureError::NonConvergence {
            iterations,
            analysis_changed,
        } => {
            assert_eq!(iterations, 1001);
            assert!(analysis_changed);
        }
        other => panic!("expected NonConvergence, got {other}"),
    }
}

struct ExpandingVerifier {
    fired: AtomicBool,
}

impl HeapVerifier for ExpandingVerifier {
    fn verify_and_maybe_expand(&self, analysis: &ClosurePropagator) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let buf = analysis.universe().lookup_type("Buf").unwrap();
        analysis.mark_type_in_heap(&buf);
        true
    }
}

#[test]
fn test_heap_verifier_forces_one_more_iteration() {
    let engine = engine_with(FixtureProvider::new()).with_heap_verifier(Arc::new(
        ExpandingVerifier {
            fired: AtomicBool::new(false),
        },
    ));
    engine.universe().type_of(&ty("Buf"));
    engine.add_root_method(&static_m("App", "main"));

    let report = engine.run().unwrap();
    assert_eq!(report.stats.iterations, 2);

    let buf = engine.universe().lookup_type("Buf").unwrap();
    assert!(buf.is_in_heap());
    assert!(buf.is_instantiated());
}

// ----------------------------------------------------------------------
// Summary failure policies
// ----------------------------------------------------------------------

#[test]
fn test_lenient_policy_degrades_and_warns() {
    let provider = FixtureProvider::new()
        .set("App.main", SummarySpec::new().calls_direct(static_m("App", "broken")))
        .set(
            "App.broken",
            SummarySpec::new()
                .calls_direct(static_m("App", "downstream"))
                .fails_with("unparseable body"),
        );
    let engine = engine_with(provider);
    engine.add_root_method(&static_m("App", "main"));

    let report = engine.run().unwrap();
    assert_eq!(report.warnings.len(), 1);
    let warning = &report.warnings[0];
    assert_eq!(warning.method, "App.broken");
    assert_eq!(warning.message, "unparseable body");
    assert!(warning
        .reason_chain
        .as_deref()
        .unwrap()
        .contains("static call from App.main"));

    // The failed method stays marked but produced no fan-out.
    let universe = engine.universe();
    let app = universe.lookup_type("App").unwrap();
    let broken = universe.lookup_method(app.id(), "broken").unwrap();
    assert!(broken.is_implementation_invoked());
    assert!(broken.summary().is_none());
    assert!(universe.lookup_method(app.id(), "downstream").is_none());
}

#[test]
fn test_strict_policy_aborts_the_run() {
    let provider = FixtureProvider::new()
        .set("App.main", SummarySpec::new().calls_direct(static_m("App", "broken")))
        .set("App.broken", SummarySpec::new().fails_with("unparseable body"));
    let config = EngineConfig {
        summary_failure_policy: SummaryFailurePolicy::Strict,
        ..test_config()
    };
    let engine = ClosureEngine::new(config, Arc::new(provider));
    engine.add_root_method(&static_m("App", "main"));

    let err = engine.run().unwrap_err();
    match err {
        ClosureError::SummaryComputation { method, message, .. } => {
            assert_eq!(method, "App.broken");
            assert_eq!(message, "unparseable body");
        }
        other => panic!("expected SummaryComputation, got {other}"),
    }
}

#[test]
fn test_panicking_summary_provider_is_contained() {
    let provider = FixtureProvider::new()
        .set(
            "App.main",
            SummarySpec::new()
                .calls_direct(static_m("App", "cursed"))
                .calls_direct(static_m("App", "healthy")),
        )
        .set("App.cursed", SummarySpec::new().panics())
        .set(
            "App.healthy",
            SummarySpec::new().instantiates(ty("Survivor")),
        );
    let engine = engine_with(provider);
    engine.add_root_method(&static_m("App", "main"));

    // The panicking unit is dropped; everything else still converges.
    let report = engine.run().unwrap();
    assert!(report.warnings.is_empty());

    let universe = engine.universe();
    let app = universe.lookup_type("App").unwrap();
    let cursed = universe.lookup_method(app.id(), "cursed").unwrap();
    let healthy = universe.lookup_method(app.id(), "healthy").unwrap();
    assert!(cursed.is_implementation_invoked());
    assert!(cursed.summary().is_none());
    assert!(healthy.summary().is_some());
    assert!(universe.lookup_type("Survivor").unwrap().is_instantiated());
}
