use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;

use crate::core::Value;

/// A per-field transform applied on read (accessor) or write (mutator).
pub type FieldMethod = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// The accessor/mutator table for one concrete record type.
#[derive(Default)]
pub struct TypeMethods {
    accessors: HashMap<String, FieldMethod>,
    mutators: HashMap<String, FieldMethod>,
}

impl TypeMethods {
    /// Registers an accessor for `field`, invoked by `Record::get` with the
    /// raw stored value (or `Null` when the field is absent).
    pub fn accessor<F>(&mut self, field: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.accessors.insert(field.into(), Arc::new(f));
        self
    }

    /// Registers a mutator for `field`, invoked by `Record::set` before the
    /// value is stored.
    pub fn mutator<F>(&mut self, field: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.mutators.insert(field.into(), Arc::new(f));
        self
    }
}

lazy_static! {
    static ref GLOBAL_METHODS: MethodRegistry = MethodRegistry {
        types: RwLock::new(HashMap::new()),
    };
}

/// Process-wide registry of accessor/mutator tables, keyed by concrete
/// record type tag.
///
/// The key is always the concrete type, never a shared default, so sibling
/// types cannot leak or shadow each other's methods. Each type is populated
/// at most once; lookups afterwards are read-only.
pub struct MethodRegistry {
    types: RwLock<HashMap<String, Arc<TypeMethods>>>,
}

impl MethodRegistry {
    pub fn global() -> &'static MethodRegistry {
        &GLOBAL_METHODS
    }

    /// Populates the method table for `tag` exactly once. Returns `false`
    /// without invoking the builder when the type is already defined.
    pub fn define<F>(&self, tag: &str, build: F) -> bool
    where
        F: FnOnce(&mut TypeMethods),
    {
        {
            let types = self.read_types();
            if types.contains_key(tag) {
                return false;
            }
        }

        let mut types = self
            .types
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Re-check under the write lock: another thread may have won.
        if types.contains_key(tag) {
            return false;
        }

        let mut methods = TypeMethods::default();
        build(&mut methods);
        types.insert(tag.to_string(), Arc::new(methods));
        true
    }

    pub fn accessor(&self, tag: &str, field: &str) -> Option<FieldMethod> {
        self.read_types()
            .get(tag)
            .and_then(|m| m.accessors.get(field).cloned())
    }

    pub fn mutator(&self, tag: &str, field: &str) -> Option<FieldMethod> {
        self.read_types()
            .get(tag)
            .and_then(|m| m.mutators.get(field).cloned())
    }

    fn read_types(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<TypeMethods>>> {
        // A poisoned lock only means another thread panicked mid-insert;
        // the map itself is still usable.
        self.types.read().unwrap_or_else(PoisonError::into_inner)
    }
}
