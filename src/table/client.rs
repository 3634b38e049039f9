use indexmap::IndexMap;

use crate::core::{Result, Value};
use crate::record::Record;

/// One raw associative row, as returned by a query layer. Either flat
/// (`field -> value`) or alias-nested (`Alias -> {field -> value}`).
pub type RawRow = IndexMap<String, Value>;

/// The minimal find shape the persistence collaborator consumes. Query
/// building beyond equality conditions and a limit is not this crate's
/// concern.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub conditions: IndexMap<String, Value>,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// The excluded query/persistence engine, specified only by the shape of
/// data it exchanges with the hydrator.
pub trait PersistenceClient {
    /// Executes a find against the named table and returns raw rows.
    fn find(&mut self, table: &str, query: &FindQuery) -> Result<Vec<RawRow>>;

    /// Writes a plain field map restricted to `fields`. `Ok(None)` reports
    /// a non-exceptional write failure; `Ok(Some(map))` carries the
    /// persisted values, including any generated primary key and
    /// timestamps. `Err` is reserved for transport-level faults.
    fn save(
        &mut self,
        table: &str,
        data: &RawRow,
        fields: &[String],
    ) -> Result<Option<RawRow>>;
}

/// The excluded validation engine: given a property map, produces the
/// field -> messages error map the record stores.
pub trait Validator {
    fn errors(&self, properties: &IndexMap<String, Value>) -> IndexMap<String, Vec<String>>;
}

/// Result of a find, shaped by the per-call hydrate intent.
#[derive(Debug)]
pub enum FindResult {
    Rows(Vec<RawRow>),
    Records(Vec<Record>),
}

impl FindResult {
    pub fn len(&self) -> usize {
        match self {
            Self::Rows(rows) => rows.len(),
            Self::Records(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_rows(self) -> Vec<RawRow> {
        match self {
            Self::Rows(rows) => rows,
            Self::Records(_) => Vec::new(),
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Records(records) => records,
            Self::Rows(_) => Vec::new(),
        }
    }
}

/// Outcome of a save: persistence failure is a branchable result, never an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The write succeeded and generated values were re-absorbed.
    Saved,
    /// The record was already persisted with nothing dirty; the
    /// collaborator was never invoked.
    Unchanged,
    /// The collaborator reported a write failure; the record's dirty and
    /// error state is left for the caller to inspect or retry.
    Failed,
}
