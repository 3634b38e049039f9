use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;

/// Stripping this suffix from a type tag yields the type's alias.
pub const ENTITY_SUFFIX: &str = "Entity";

/// Metadata describing one logical record type: the alias its own fields
/// nest under, the backing table, the primary key, and its named relations.
#[derive(Debug, Clone)]
pub struct TypeMetadata {
    tag: String,
    alias: String,
    table: String,
    primary_key: String,
    relations: HashMap<String, String>,
}

impl TypeMetadata {
    /// Creates metadata for `tag` (e.g. `"ArticleEntity"`), deriving the
    /// alias by stripping the `Entity` suffix and the table name by
    /// tableizing the alias (`Article` -> `articles`, `LookupGap` ->
    /// `lookup_gaps`).
    pub fn new(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        let alias = alias_for(&tag).to_string();
        let table = tableize(&alias);
        Self {
            tag,
            alias,
            table,
            primary_key: "id".to_string(),
            relations: HashMap::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Declares that the field named `field` holds records of type
    /// `target_tag`, enabling the relation transform during `set`.
    pub fn relation(
        mut self,
        field: impl Into<String>,
        target_tag: impl Into<String>,
    ) -> Self {
        self.relations.insert(field.into(), target_tag.into());
        self
    }

    pub fn tag_name(&self) -> &str {
        &self.tag
    }

    pub fn alias_name(&self) -> &str {
        &self.alias
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn primary_key_name(&self) -> &str {
        &self.primary_key
    }

    pub fn relation_target(&self, field: &str) -> Option<&str> {
        self.relations.get(field).map(String::as_str)
    }
}

/// Alias for a type tag: the tag with the `Entity` suffix stripped.
pub fn alias_for(tag: &str) -> &str {
    tag.strip_suffix(ENTITY_SUFFIX).unwrap_or(tag)
}

fn tableize(alias: &str) -> String {
    let mut table = String::with_capacity(alias.len() + 3);
    for (i, c) in alias.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            table.push('_');
        }
        table.push(c.to_ascii_lowercase());
    }
    table.push('s');
    table
}

fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        format!("{}y", stem)
    } else if let Some(stem) = word.strip_suffix("ses") {
        format!("{}s", stem)
    } else if let Some(stem) = word.strip_suffix('s') {
        stem.to_string()
    } else {
        word.to_string()
    }
}

lazy_static! {
    static ref GLOBAL_TYPES: TypeRegistry = TypeRegistry {
        types: RwLock::new(HashMap::new()),
    };
}

/// Process-wide registry of [`TypeMetadata`], keyed by type tag.
///
/// This is the explicit lookup table that replaces reflection over class
/// names: relation inference during `Record::set` consults it, and
/// unresolvable fields simply stay raw.
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeMetadata>>>,
}

impl TypeRegistry {
    pub fn global() -> &'static TypeRegistry {
        &GLOBAL_TYPES
    }

    /// Registers metadata for its tag exactly once; later registrations for
    /// the same tag are ignored and return `false`.
    pub fn register(&self, meta: TypeMetadata) -> bool {
        let mut types = self
            .types
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if types.contains_key(meta.tag_name()) {
            return false;
        }
        types.insert(meta.tag_name().to_string(), Arc::new(meta));
        true
    }

    pub fn metadata(&self, tag: &str) -> Option<Arc<TypeMetadata>> {
        self.read_types().get(tag).cloned()
    }

    /// Resolves the record type stored under `field` on a record of type
    /// `owner_tag`, for the relation transform.
    ///
    /// Explicit relation declarations win. Failing that, a capitalized field
    /// name falls back to the naming convention: the singularized field plus
    /// the `Entity` suffix must name a registered type (`Comments` ->
    /// `CommentEntity`). `None` means "store the value raw".
    pub fn resolve_relation(&self, owner_tag: &str, field: &str) -> Option<Arc<TypeMetadata>> {
        let types = self.read_types();

        if let Some(owner) = types.get(owner_tag) {
            if let Some(target) = owner.relation_target(field) {
                return types.get(target).cloned();
            }
        }

        if field.starts_with(|c: char| c.is_ascii_uppercase()) {
            let tag = format!("{}{}", singularize(field), ENTITY_SUFFIX);
            return types.get(&tag).cloned();
        }

        None
    }

    fn read_types(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<TypeMetadata>>> {
        self.types.read().unwrap_or_else(PoisonError::into_inner)
    }
}
