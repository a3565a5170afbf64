/*
 * Program universe
 *
 * Owns the registries of type, method, and field records and provides
 * deduplicated, thread-safe lookup/creation: concurrent calls with the same
 * identity always return the identical `Arc` record, in the same relation as
 * an interning table. Records are never removed during a run.
 *
 * Registries are DashMap-backed; id allocation is a relaxed atomic counter.
 * A record is inserted into the id map inside the name-map entry closure,
 * so any thread that observes an id can resolve its record.
 */

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::features::reachability::domain::{
    FieldId, FieldRecord, MethodId, MethodRecord, TypeId, TypeRecord,
};

/// Identity of a type as presented by the loading collaborator.
///
/// The first descriptor that names a supertype links it; hierarchy must be
/// linked before the type participates in propagation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub supertype: Option<String>,
}

impl TypeDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertype: None,
        }
    }

    pub fn with_supertype(name: impl Into<String>, supertype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertype: Some(supertype.into()),
        }
    }
}

/// Identity of a method: owning type plus signature name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub holder: TypeDescriptor,
    pub name: String,
    pub is_static: bool,
    pub is_abstract: bool,
}

impl MethodDescriptor {
    pub fn static_method(holder: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            holder,
            name: name.into(),
            is_static: true,
            is_abstract: false,
        }
    }

    pub fn instance_method(holder: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            holder,
            name: name.into(),
            is_static: false,
            is_abstract: false,
        }
    }

    pub fn abstract_method(holder: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            holder,
            name: name.into(),
            is_static: false,
            is_abstract: true,
        }
    }
}

/// Identity of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub holder: TypeDescriptor,
    pub name: String,
}

impl FieldDescriptor {
    pub fn new(holder: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            holder,
            name: name.into(),
        }
    }
}

/// Point-in-time universe size, compared across hook invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementCounts {
    pub types: usize,
    pub methods: usize,
    pub fields: usize,
}

/// Registry of all analysis elements for one run
pub struct Universe {
    types_by_name: DashMap<String, TypeId>,
    types_by_id: DashMap<u32, Arc<TypeRecord>>,
    methods_by_key: DashMap<(TypeId, String), MethodId>,
    methods_by_id: DashMap<u32, Arc<MethodRecord>>,
    fields_by_key: DashMap<(TypeId, String), FieldId>,
    fields_by_id: DashMap<u32, Arc<FieldRecord>>,
    next_type_id: AtomicU32,
    next_method_id: AtomicU32,
    next_field_id: AtomicU32,
}

impl Universe {
    pub fn new() -> Self {
        Self {
            types_by_name: DashMap::new(),
            types_by_id: DashMap::new(),
            methods_by_key: DashMap::new(),
            methods_by_id: DashMap::new(),
            fields_by_key: DashMap::new(),
            fields_by_id: DashMap::new(),
            next_type_id: AtomicU32::new(0),
            next_method_id: AtomicU32::new(0),
            next_field_id: AtomicU32::new(0),
        }
    }

    /// Look up or create the record for a type. Idempotent.
    pub fn type_of(&self, decl: &TypeDescriptor) -> Arc<TypeRecord> {
        let id = {
            let entry = self.types_by_name.entry(decl.name.clone()).or_insert_with(|| {
                let id = TypeId(self.next_type_id.fetch_add(1, Ordering::Relaxed));
                let record = Arc::new(TypeRecord::new(id, decl.name.clone()));
                self.types_by_id.insert(id.0, record);
                id
            });
            *entry
        };
        let record = self.type_by_id(id);
        self.link_supertype(&record, decl);
        record
    }

    /// Look up or create the record for a method. Idempotent; the first
    /// descriptor fixes staticness and abstractness.
    pub fn method_of(&self, decl: &MethodDescriptor) -> Arc<MethodRecord> {
        let holder = self.type_of(&decl.holder);
        let key = (holder.id(), decl.name.clone());
        let id = {
            let entry = self.methods_by_key.entry(key).or_insert_with(|| {
                let id = MethodId(self.next_method_id.fetch_add(1, Ordering::Relaxed));
                let qualified = format!("{}.{}", holder.name(), decl.name);
                let record = Arc::new(MethodRecord::new(
                    id,
                    holder.id(),
                    decl.name.clone(),
                    qualified,
                    decl.is_static,
                    decl.is_abstract,
                ));
                self.methods_by_id.insert(id.0, record);
                id
            });
            *entry
        };
        self.method_by_id(id)
    }

    /// Look up or create the record for a field. Idempotent. New fields are
    /// appended to the holder's declared-field list.
    pub fn field_of(&self, decl: &FieldDescriptor) -> Arc<FieldRecord> {
        let holder = self.type_of(&decl.holder);
        let key = (holder.id(), decl.name.clone());
        let mut created = false;
        let id = {
            let entry = self.fields_by_key.entry(key).or_insert_with(|| {
                let id = FieldId(self.next_field_id.fetch_add(1, Ordering::Relaxed));
                let qualified = format!("{}.{}", holder.name(), decl.name);
                let record = Arc::new(FieldRecord::new(id, holder.id(), decl.name.clone(), qualified));
                self.fields_by_id.insert(id.0, record);
                created = true;
                id
            });
            *entry
        };
        if created {
            holder.add_declared_field(id);
        }
        self.field_by_id(id)
    }

    /// Non-creating lookup used by dispatch resolution.
    pub fn lookup_method(&self, holder: TypeId, name: &str) -> Option<Arc<MethodRecord>> {
        self.methods_by_key
            .get(&(holder, name.to_string()))
            .map(|id| self.method_by_id(*id))
    }

    pub fn lookup_type(&self, name: &str) -> Option<Arc<TypeRecord>> {
        self.types_by_name.get(name).map(|id| self.type_by_id(*id))
    }

    pub fn type_by_id(&self, id: TypeId) -> Arc<TypeRecord> {
        self.types_by_id
            .get(&id.0)
            .map(|r| Arc::clone(&r))
            .expect("type id allocated without a record")
    }

    pub fn method_by_id(&self, id: MethodId) -> Arc<MethodRecord> {
        self.methods_by_id
            .get(&id.0)
            .map(|r| Arc::clone(&r))
            .expect("method id allocated without a record")
    }

    pub fn field_by_id(&self, id: FieldId) -> Arc<FieldRecord> {
        self.fields_by_id
            .get(&id.0)
            .map(|r| Arc::clone(&r))
            .expect("field id allocated without a record")
    }

    /// Point-in-time sizes for the convergence consistency check.
    pub fn element_counts(&self) -> ElementCounts {
        ElementCounts {
            types: self.types_by_id.len(),
            methods: self.methods_by_id.len(),
            fields: self.fields_by_id.len(),
        }
    }

    pub fn all_types(&self) -> Vec<Arc<TypeRecord>> {
        self.types_by_id.iter().map(|r| Arc::clone(&r)).collect()
    }

    pub fn all_methods(&self) -> Vec<Arc<MethodRecord>> {
        self.methods_by_id.iter().map(|r| Arc::clone(&r)).collect()
    }

    pub fn all_fields(&self) -> Vec<Arc<FieldRecord>> {
        self.fields_by_id.iter().map(|r| Arc::clone(&r)).collect()
    }

    fn link_supertype(&self, record: &Arc<TypeRecord>, decl: &TypeDescriptor) {
        let Some(super_name) = &decl.supertype else {
            return;
        };
        if record.supertype().is_some() {
            return;
        }
        // The bare descriptor cannot recurse further, so no entry guard is
        // held across this call.
        let super_record = self.type_of(&TypeDescriptor::named(super_name.clone()));
        if record.link_supertype(super_record.id()) {
            super_record.add_direct_subtype(record.id());
        }
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_lookup_is_idempotent() {
        let universe = Universe::new();
        let a = universe.type_of(&TypeDescriptor::named("Animal"));
        let b = universe.type_of(&TypeDescriptor::named("Animal"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(universe.element_counts().types, 1);
    }

    #[test]
    fn test_supertype_links_once_and_registers_subtype() {
        let universe = Universe::new();
        let dog = universe.type_of(&TypeDescriptor::with_supertype("Dog", "Animal"));
        let animal = universe.lookup_type("Animal").unwrap();
        assert_eq!(dog.supertype(), Some(animal.id()));
        assert_eq!(animal.direct_subtypes(), vec![dog.id()]);

        // A second linking descriptor must not duplicate the subtype edge.
        let again = universe.type_of(&TypeDescriptor::with_supertype("Dog", "Animal"));
        assert!(Arc::ptr_eq(&dog, &again));
        assert_eq!(animal.direct_subtypes(), vec![dog.id()]);
    }

    #[test]
    fn test_concurrent_lookup_creates_single_record() {
        let universe = Arc::new(Universe::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let universe = Arc::clone(&universe);
            handles.push(std::thread::spawn(move || {
                universe.type_of(&TypeDescriptor::named("Shared")).id()
            }));
        }
        let ids: Vec<TypeId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(universe.element_counts().types, 1);
    }

    #[test]
    fn test_field_creation_tracks_declared_fields() {
        let universe = Universe::new();
        let holder = TypeDescriptor::named("Config");
        let f = universe.field_of(&FieldDescriptor::new(holder.clone(), "path"));
        let again = universe.field_of(&FieldDescriptor::new(holder.clone(), "path"));
        assert!(Arc::ptr_eq(&f, &again));

        let config = universe.lookup_type("Config").unwrap();
        assert_eq!(config.declared_fields(), vec![f.id()]);
    }

    #[test]
    fn test_method_lookup_does_not_create() {
        let universe = Universe::new();
        let t = universe.type_of(&TypeDescriptor::named("App"));
        assert!(universe.lookup_method(t.id(), "main").is_none());
        assert_eq!(universe.element_counts().methods, 0);

        universe.method_of(&MethodDescriptor::static_method(
            TypeDescriptor::named("App"),
            "main",
        ));
        assert!(universe.lookup_method(t.id(), "main").is_some());
    }
}
