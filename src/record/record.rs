use std::borrow::Cow;
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

use crate::core::{EntityError, Result, Value};
use crate::record::methods::MethodRegistry;
use crate::registry::{alias_for, TypeRegistry};
use crate::table::Validator;

/// The accessibility map key matching every field without an explicit entry.
pub const WILDCARD: &str = "*";

/// Options for a single `set` call.
#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    /// Pass values through registered mutators before storing.
    pub mutate: bool,
    /// Skip fields the accessibility map does not allow.
    pub guard: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            mutate: true,
            guard: false,
        }
    }
}

impl SetOptions {
    /// Defaults for bulk assignment: mutators on, guarding on. Mass
    /// assignment is where unchecked input arrives, so it guards unless the
    /// caller opts out.
    pub fn bulk() -> Self {
        Self {
            mutate: true,
            guard: true,
        }
    }
}

/// Options for constructing a record from an initial property map.
#[derive(Debug, Clone, Copy)]
pub struct BuildOptions {
    pub mutate: bool,
    pub guard: bool,
    /// Mark every field clean after the initial assignment (hydration).
    pub mark_clean: bool,
    /// Known persistence state, if any. `None` leaves it unknown.
    pub mark_new: Option<bool>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            mutate: true,
            guard: false,
            mark_clean: false,
            mark_new: None,
        }
    }
}

/// Errors reported for a single field lookup.
///
/// Local messages win; when a field has none and holds nested records, the
/// nested records' own error maps are returned instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBag {
    Messages(Vec<String>),
    Record(IndexMap<String, Vec<String>>),
    Records(Vec<IndexMap<String, Vec<String>>>),
}

impl ErrorBag {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Messages(msgs) => msgs.is_empty(),
            Self::Record(map) => map.is_empty(),
            Self::Records(maps) => maps.iter().all(IndexMap::is_empty),
        }
    }

    /// The local messages, empty for the nested variants.
    pub fn messages(&self) -> &[String] {
        match self {
            Self::Messages(msgs) => msgs,
            _ => &[],
        }
    }
}

/// The hydrated, mutable representation of one logical row or composite
/// object.
///
/// A record tracks which fields changed since creation or the last
/// [`clean`](Record::clean) mark, dispatches per-field accessors/mutators
/// registered for its type, guards mass assignment through an accessibility
/// map, and aggregates validation errors for itself and nested records.
///
/// Records are not thread-safe; confine each instance to one logical
/// operation or synchronize externally.
///
/// ```
/// use rustentity::{Record, Value};
///
/// let mut record = Record::default();
/// record.set("name", "Andrew").set("id", 1);
/// assert_eq!(record.get("id").into_owned(), Value::Integer(1));
/// assert!(record.dirty("name"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    type_tag: String,
    properties: IndexMap<String, Value>,
    dirty: HashSet<String>,
    errors: IndexMap<String, Vec<String>>,
    accessible: IndexMap<String, bool>,
    hidden: Vec<String>,
    virtual_fields: Vec<String>,
    is_new: Option<bool>,
}

impl Default for Record {
    fn default() -> Self {
        Self::new("Entity")
    }
}

impl Record {
    /// Creates an empty record of the given type. The tag identifies the
    /// logical record type; accessor/mutator lookups and the external alias
    /// both key off it.
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            properties: IndexMap::new(),
            dirty: HashSet::new(),
            errors: IndexMap::new(),
            accessible: IndexMap::new(),
            hidden: Vec::new(),
            virtual_fields: Vec::new(),
            is_new: None,
        }
    }

    /// Creates a record from an initial property map.
    pub fn build(
        type_tag: impl Into<String>,
        properties: IndexMap<String, Value>,
        options: BuildOptions,
    ) -> Self {
        let mut record = Self::new(type_tag);
        record.set_many_with(
            properties,
            SetOptions {
                mutate: options.mutate,
                guard: options.guard,
            },
        );
        if options.mark_clean {
            record.clean();
        }
        if let Some(new) = options.mark_new {
            record.mark_new(new);
        }
        record
    }

    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The alias this record's own fields nest under in array form: the
    /// alias registered for this type, falling back to the type tag with
    /// the `Entity` suffix stripped. Consulting the registry keeps this in
    /// step with the hydrator, which nests and peels rows by the same
    /// metadata.
    pub fn alias(&self) -> String {
        match TypeRegistry::global().metadata(&self.type_tag) {
            Some(meta) => meta.alias_name().to_string(),
            None => alias_for(&self.type_tag).to_string(),
        }
    }

    /// Sets a single field. Single-field assignment is deliberate caller
    /// intent, so it bypasses the accessibility guard.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        self.set_with(field, value, SetOptions::default())
    }

    pub fn set_with(
        &mut self,
        field: &str,
        value: impl Into<Value>,
        options: SetOptions,
    ) -> &mut Self {
        self.apply(field, value.into(), options);
        self
    }

    /// Mass assignment with the bulk defaults (guarding enabled).
    pub fn set_many(&mut self, properties: IndexMap<String, Value>) -> &mut Self {
        self.set_many_with(properties, SetOptions::bulk())
    }

    /// Mass assignment with explicit options. When the input nests a map
    /// under this record's own alias key, its entries are merged into the
    /// top level first, so framework-shaped payloads can be passed as-is.
    pub fn set_many_with(
        &mut self,
        mut properties: IndexMap<String, Value>,
        options: SetOptions,
    ) -> &mut Self {
        let alias = self.alias();
        if let Some(Value::Map(inner)) = properties.shift_remove(&alias) {
            for (field, value) in inner {
                properties.insert(field, value);
            }
        }

        for (field, value) in properties {
            self.apply(&field, value, options);
        }
        self
    }

    /// The per-field assignment pipeline: guard, relation transform, dirty
    /// comparison, mutator, store. Unknown fields and untransformable
    /// values never fail.
    fn apply(&mut self, field: &str, value: Value, options: SetOptions) {
        if options.guard && !self.accessible(field) {
            return;
        }

        let value = self.transform_relation(field, value);

        let changed = match self.properties.get(field) {
            Some(existing) => *existing != value,
            None => true,
        };
        if changed {
            self.set_dirty(field, true);
        }

        let value = if options.mutate {
            match MethodRegistry::global().mutator(&self.type_tag, field) {
                Some(mutator) => mutator(value),
                None => value,
            }
        } else {
            value
        };

        self.properties.insert(field.to_string(), value);
    }

    /// Materializes raw associative data into nested records when the
    /// target type can be resolved for `field`. Best effort: unresolved
    /// input comes back unchanged.
    fn transform_relation(&self, field: &str, value: Value) -> Value {
        let target = match TypeRegistry::global().resolve_relation(&self.type_tag, field) {
            Some(meta) => meta,
            None => return value,
        };

        match value {
            Value::Map(map) => {
                Record::build(target.tag_name(), map, BuildOptions::default()).into()
            }
            Value::Array(items) if !items.is_empty() => {
                let mut maps = Vec::with_capacity(items.len());
                for item in &items {
                    match item {
                        Value::Map(map) => maps.push(map.clone()),
                        _ => return Value::Array(items),
                    }
                }
                Value::Records(
                    maps.into_iter()
                        .map(|map| Record::build(target.tag_name(), map, BuildOptions::default()))
                        .collect(),
                )
            }
            other => other,
        }
    }

    /// Returns the value stored for `field`, `Null` when absent. A
    /// registered accessor intercepts the raw value and its output is
    /// returned instead; otherwise the live stored value is borrowed.
    pub fn get(&self, field: &str) -> Cow<'_, Value> {
        let accessor = MethodRegistry::global().accessor(&self.type_tag, field);
        match (self.properties.get(field), accessor) {
            (stored, Some(accessor)) => {
                Cow::Owned(accessor(stored.cloned().unwrap_or(Value::Null)))
            }
            (Some(stored), None) => Cow::Borrowed(stored),
            (None, None) => Cow::Owned(Value::Null),
        }
    }

    /// Mutable handle to the stored value for in-place edits of composite
    /// values. Accessors do not intercept; the record stays the source of
    /// truth and observes the change directly.
    pub fn get_mut(&mut self, field: &str) -> Option<&mut Value> {
        self.properties.get_mut(field)
    }

    /// Whether `field` resolves to a non-null value. Note that a field
    /// explicitly set to `Null` reports `false`; "has" means "has a value",
    /// not "has an entry".
    pub fn has(&self, field: &str) -> bool {
        !self.get(field).is_null()
    }

    /// Removes fields from storage. Dirty and error bookkeeping are
    /// untouched.
    pub fn unset(&mut self, field: &str) -> &mut Self {
        self.properties.shift_remove(field);
        self
    }

    pub fn unset_many(&mut self, fields: &[&str]) -> &mut Self {
        for field in fields {
            self.properties.shift_remove(*field);
        }
        self
    }

    /// Whether any field is dirty.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Whether `field` was modified or added since creation or the last
    /// [`clean`](Record::clean).
    pub fn dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    /// Sets or clears the dirty flag for `field` and returns the resulting
    /// state. Marking a field dirty discards any error stored for it.
    pub fn set_dirty(&mut self, field: &str, is_dirty: bool) -> bool {
        if !is_dirty {
            self.dirty.remove(field);
            return false;
        }
        self.dirty.insert(field.to_string());
        self.errors.shift_remove(field);
        true
    }

    /// Marks the whole record clean: no dirty fields, no errors. Meant for
    /// the tail end of hydration.
    pub fn clean(&mut self) {
        self.dirty.clear();
        self.errors.clear();
    }

    /// Whether this record is known to not yet be persisted. `None` means
    /// no information is available, not "false".
    pub fn is_new(&self) -> Option<bool> {
        self.is_new
    }

    pub fn mark_new(&mut self, new: bool) -> bool {
        self.is_new = Some(new);
        new
    }

    /// All error messages stored on this record, by field.
    pub fn errors(&self) -> &IndexMap<String, Vec<String>> {
        &self.errors
    }

    /// Errors for one field. When none are stored locally and the field
    /// holds nested records, their error maps are returned instead, so
    /// errors bubble up without explicit propagation.
    pub fn field_errors(&self, field: &str) -> ErrorBag {
        if let Some(messages) = self.errors.get(field) {
            if !messages.is_empty() {
                return ErrorBag::Messages(messages.clone());
            }
        }

        match self.properties.get(field) {
            Some(Value::Record(record)) => ErrorBag::Record(record.errors().clone()),
            Some(Value::Records(records)) => {
                ErrorBag::Records(records.iter().map(|r| r.errors().clone()).collect())
            }
            _ => ErrorBag::Messages(Vec::new()),
        }
    }

    /// Stores error messages for a field, replacing any previous ones.
    pub fn set_error(
        &mut self,
        field: &str,
        messages: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.errors.insert(
            field.to_string(),
            messages.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn set_errors(&mut self, errors: IndexMap<String, Vec<String>>) -> &mut Self {
        for (field, messages) in errors {
            self.errors.insert(field, messages);
        }
        self
    }

    /// Whether `field` may be written during guarded mass assignment: its
    /// explicit entry if present, otherwise the wildcard entry, otherwise
    /// not accessible.
    pub fn accessible(&self, field: &str) -> bool {
        match self.accessible.get(field) {
            Some(flag) => *flag,
            None => self.accessible.get(WILDCARD).copied().unwrap_or(false),
        }
    }

    /// Changes the accessibility of a field. Passing [`WILDCARD`] resets
    /// **every** existing entry (the wildcard included) to the given state,
    /// wiping previously fine-grained permissions rather than merely adding
    /// a default.
    pub fn set_accessible(&mut self, field: &str, accessible: bool) -> &mut Self {
        if field == WILDCARD {
            for flag in self.accessible.values_mut() {
                *flag = accessible;
            }
            self.accessible.insert(WILDCARD.to_string(), accessible);
            return self;
        }
        self.accessible.insert(field.to_string(), accessible);
        self
    }

    pub fn set_accessible_many(&mut self, fields: &[&str], accessible: bool) -> &mut Self {
        for field in fields {
            self.set_accessible(field, accessible);
        }
        self
    }

    /// Fields hidden from array/JSON representations.
    pub fn hidden_fields(&self) -> &[String] {
        &self.hidden
    }

    pub fn set_hidden(
        &mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.hidden = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Computed fields included in array/JSON representations. A field both
    /// virtual and hidden stays hidden.
    pub fn virtual_fields(&self) -> &[String] {
        &self.virtual_fields
    }

    pub fn set_virtual(
        &mut self,
        fields: impl IntoIterator<Item = impl Into<String>>,
    ) -> &mut Self {
        self.virtual_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// The externally visible field set: stored properties plus virtual
    /// fields minus hidden ones. Recomputed on every call since the hidden
    /// and virtual sets can change after construction.
    pub fn visible_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.properties.keys().cloned().collect();
        for field in &self.virtual_fields {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields.retain(|field| !self.hidden.contains(field));
        fields
    }

    /// Returns the requested fields indexed by name, values resolved
    /// through [`get`](Record::get). Missing fields come back as `Null`
    /// unless `only_dirty` is set, in which case non-dirty fields are
    /// omitted entirely.
    pub fn extract(&self, fields: &[&str], only_dirty: bool) -> IndexMap<String, Value> {
        let mut result = IndexMap::new();
        for field in fields {
            if !only_dirty || self.dirty(field) {
                result.insert(field.to_string(), self.get(field).into_owned());
            }
        }
        result
    }

    /// This record's own scalar portion of the array form: every visible
    /// field that is not a nested record, accessor-resolved.
    fn own_map(&self) -> IndexMap<String, Value> {
        let mut own = IndexMap::new();
        for field in self.visible_fields() {
            let value = self.get(&field).into_owned();
            match value {
                Value::Record(_) | Value::Records(_) => {}
                other => {
                    own.insert(field, other);
                }
            }
        }
        own
    }

    /// The array form of this record: own scalar fields nested under the
    /// type's alias key, nested records expanded as top-level siblings
    /// (single records as maps, sequences as arrays of maps). A type with
    /// no own scalar fields omits the alias key entirely.
    ///
    /// The shape mirrors what [`set_many`](Record::set_many) re-absorbs, so
    /// hydrating the output builds an equivalent record.
    pub fn to_map(&self) -> IndexMap<String, Value> {
        let mut result = IndexMap::new();

        let own = self.own_map();
        if !own.is_empty() {
            result.insert(self.alias(), Value::Map(own));
        }

        for field in self.visible_fields() {
            match self.get(&field).into_owned() {
                Value::Record(record) => {
                    result.insert(field, Value::Map(record.own_map()));
                }
                Value::Records(records) => {
                    let expanded = records
                        .iter()
                        .map(|record| Value::Map(record.own_map()))
                        .collect();
                    result.insert(field, Value::Array(expanded));
                }
                _ => {}
            }
        }

        result
    }

    /// JSON rendition of [`to_map`](Record::to_map).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.to_map()
                .iter()
                .map(|(field, value)| (field.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Validation entry point for the external validator collaborator.
    /// Intentionally unimplemented in the core; fails loudly so a missing
    /// feature cannot be mistaken for "no errors".
    pub fn validate(&mut self, _validator: &dyn Validator) -> Result<bool> {
        Err(EntityError::NotImplemented("Record::validate"))
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
