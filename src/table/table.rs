use std::sync::Arc;

use log::{debug, warn};

use crate::core::{EntityError, Result, Value};
use crate::record::{BuildOptions, Record};
use crate::registry::{TypeMetadata, TypeRegistry};
use crate::table::client::{
    FindQuery, FindResult, PersistenceClient, RawRow, SaveOutcome, Validator,
};

/// Timestamp fields owned by the persistence layer. Client-held values are
/// never sent on save; generated values are re-absorbed afterwards.
const SERVER_TIMESTAMPS: [&str; 3] = ["created", "modified", "updated"];

/// Options for [`Table::build_new`].
#[derive(Debug, Clone)]
pub struct BuildNewOptions {
    pub mutate: bool,
    /// Associations whitelist. Not supported by this core: passing one
    /// fails loudly instead of silently skipping association hydration.
    pub associations: Option<Vec<String>>,
}

impl Default for BuildNewOptions {
    fn default() -> Self {
        Self {
            mutate: true,
            associations: None,
        }
    }
}

impl BuildNewOptions {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Table-side hydrator: builds [`Record`] graphs out of raw associative
/// rows, converts them back to plain data for persistence, and wraps the
/// save lifecycle.
///
/// Holds no entity state of its own beyond the per-call hydrate-mode
/// stack, which must survive reentrant finds (a count issued while an
/// outer find resolves must not corrupt the outer call's intended output
/// shape).
pub struct Table {
    meta: Arc<TypeMetadata>,
    client: Box<dyn PersistenceClient>,
    hydrate_modes: Vec<bool>,
}

impl Table {
    /// Creates a hydrator for one record type. The metadata is registered
    /// in the global type registry so relation transforms targeting this
    /// type resolve.
    pub fn new(meta: TypeMetadata, client: Box<dyn PersistenceClient>) -> Self {
        TypeRegistry::global().register(meta.clone());
        let meta = TypeRegistry::global()
            .metadata(meta.tag_name())
            .unwrap_or_else(|| Arc::new(meta));
        Self {
            meta,
            client,
            hydrate_modes: Vec::new(),
        }
    }

    pub fn meta(&self) -> &TypeMetadata {
        &self.meta
    }

    pub fn table_name(&self) -> &str {
        self.meta.table_name()
    }

    pub fn alias(&self) -> &str {
        self.meta.alias_name()
    }

    pub fn primary_key(&self) -> &str {
        self.meta.primary_key_name()
    }

    /// Hydrates one raw row into a record marked persisted and clean.
    ///
    /// Accepts both alias-nested and flat rows. A row without a non-null
    /// primary key yields `None`: nothing to hydrate, not an error.
    pub fn hydrate(&self, row: RawRow) -> Option<Record> {
        let key = self.primary_key();
        let present = match row.get(self.alias()) {
            Some(Value::Map(own)) => own.get(key).is_some_and(|v| !v.is_null()),
            _ => row.get(key).is_some_and(|v| !v.is_null()),
        };
        if !present {
            return None;
        }

        let mut record = Record::build(
            self.meta.tag_name(),
            row,
            BuildOptions {
                mutate: false,
                ..BuildOptions::default()
            },
        );
        record.mark_new(false);
        record.clean();
        Some(record)
    }

    /// Element-wise [`hydrate`](Table::hydrate) over a raw result set.
    ///
    /// Raw query layers return a bare map for single-row results and an
    /// array otherwise; a `Map` input is therefore treated as the
    /// single-row case, never as an empty sequence.
    pub fn hydrate_many(&self, data: Value) -> Vec<Record> {
        match data {
            Value::Map(row) => self.hydrate(row).into_iter().collect(),
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Map(row) => self.hydrate(row),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Builds a new, dirty-by-default record from request-shaped input,
    /// unwrapping a map nested under the type's alias key. The record's
    /// persisted state stays unknown until it is saved.
    pub fn build_new(&self, data: RawRow, options: BuildNewOptions) -> Result<Record> {
        if options.associations.is_some() {
            return Err(EntityError::NotImplemented("Table::build_new associations"));
        }
        Ok(Record::build(
            self.meta.tag_name(),
            data,
            BuildOptions {
                mutate: options.mutate,
                ..BuildOptions::default()
            },
        ))
    }

    /// Builds a list of new records from request-shaped input. Reserved.
    pub fn build_many(&self, _data: Vec<RawRow>) -> Result<Vec<Record>> {
        Err(EntityError::NotImplemented("Table::build_many"))
    }

    /// Runs a find, yielding records or raw rows per the `as_records`
    /// intent. The intent is pushed onto the mode stack around the call so
    /// nested finds each resolve with their own.
    pub fn find(&mut self, query: &FindQuery, as_records: bool) -> Result<FindResult> {
        self.hydrate_modes.push(as_records);
        let result = self.run_find(query);
        self.hydrate_modes.pop();
        result
    }

    fn run_find(&mut self, query: &FindQuery) -> Result<FindResult> {
        let rows = self.client.find(self.meta.table_name(), query)?;
        debug!(
            "find on \"{}\": {} row(s), hydrate={}",
            self.meta.table_name(),
            rows.len(),
            self.hydrate_mode()
        );

        if self.hydrate_mode() {
            let records = rows.into_iter().filter_map(|row| self.hydrate(row)).collect();
            Ok(FindResult::Records(records))
        } else {
            Ok(FindResult::Rows(rows))
        }
    }

    fn hydrate_mode(&self) -> bool {
        self.hydrate_modes.last().copied().unwrap_or(false)
    }

    /// First matching record, if any.
    pub fn first(&mut self, query: &FindQuery) -> Result<Option<Record>> {
        let query = FindQuery {
            conditions: query.conditions.clone(),
            limit: Some(1),
        };
        let mut records = self.find(&query, true)?.into_records();
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.remove(0))
        })
    }

    /// Fetches one record by primary key; a miss is a distinct not-found
    /// condition carrying the attempted key and the table identity.
    pub fn get(&mut self, key: impl Into<Value>) -> Result<Record> {
        let key = key.into();
        let query = FindQuery::new().condition(self.primary_key(), key.clone());
        self.first(&query)?.ok_or_else(|| EntityError::RecordNotFound {
            key: key.to_string(),
            table: self.meta.table_name().to_string(),
        })
    }

    /// Number of rows matching the query. Always resolves raw rows; the
    /// mode stack keeps an enclosing record-shaped find unaffected.
    pub fn count(&mut self, query: &FindQuery) -> Result<usize> {
        Ok(self.find(query, false)?.len())
    }

    pub fn exists(&mut self, query: &FindQuery) -> Result<bool> {
        Ok(self.count(query)? > 0)
    }

    /// The save lifecycle.
    ///
    /// A record with nothing dirty never reaches the collaborator: known
    /// persisted, that is [`SaveOutcome::Unchanged`]; never persisted, it
    /// is a [`SaveOutcome::Failed`] since there is nothing to write.
    /// Otherwise server-managed timestamps are stripped, the record's own scalar
    /// fields go to the persistence collaborator under a field whitelist,
    /// and on success the generated primary key and timestamps are
    /// re-absorbed and the record marked persisted. A reported write
    /// failure comes back as [`SaveOutcome::Failed`] with the record's
    /// dirty and error state untouched.
    pub fn save(&mut self, record: &mut Record) -> Result<SaveOutcome> {
        if !record.is_dirty() {
            debug!(
                "save on \"{}\": nothing dirty, skipping write",
                self.meta.table_name()
            );
            // A persisted record with no changes is a no-op; one that was
            // never persisted has nothing to write, which is a failure.
            return Ok(if record.is_new() == Some(false) {
                SaveOutcome::Unchanged
            } else {
                SaveOutcome::Failed
            });
        }

        if record.is_new() == Some(false) {
            record.unset_many(&["modified", "updated"]);
        } else {
            record.unset_many(&SERVER_TIMESTAMPS);
        }

        let data = match record.to_map().shift_remove(self.alias()) {
            Some(Value::Map(own)) => own,
            _ => RawRow::new(),
        };
        let fields: Vec<String> = data.keys().cloned().collect();

        let persisted = match self.client.save(self.meta.table_name(), &data, &fields)? {
            Some(persisted) => persisted,
            None => {
                warn!("save on \"{}\" failed", self.meta.table_name());
                return Ok(SaveOutcome::Failed);
            }
        };

        for field in SERVER_TIMESTAMPS {
            if let Some(value) = persisted.get(field) {
                record.set(field, value.clone());
            }
        }
        if let Some(key) = persisted.get(self.primary_key()) {
            record.set(self.primary_key(), key.clone());
        }
        record.mark_new(false);

        Ok(SaveOutcome::Saved)
    }

    /// Association lookup hook. Association resolution lives in the
    /// excluded table registry.
    pub fn association(&self, _name: &str) -> Result<Arc<TypeMetadata>> {
        Err(EntityError::NotImplemented("Table::association"))
    }

    /// Default validator hook for records built by this table. The
    /// validation engine is an external collaborator.
    pub fn validator(&self) -> Result<Box<dyn Validator>> {
        Err(EntityError::NotImplemented("Table::validator"))
    }

    /// Schema customization hook, called by hosts that alter column
    /// definitions after introspection.
    pub fn schema_hook(&self) -> Result<()> {
        Err(EntityError::NotImplemented("Table::schema_hook"))
    }
}
