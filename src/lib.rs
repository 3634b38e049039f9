// ============================================================================
// rustentity — record/entity abstraction over raw tabular data
// ============================================================================

pub mod core;
pub mod record;
pub mod registry;
pub mod table;

// Re-export main types for convenience
pub use core::{EntityError, Result, Value};
pub use record::{
    BuildOptions, ErrorBag, FieldMethod, MethodRegistry, Record, SetOptions, TypeMethods, WILDCARD,
};
pub use registry::{TypeMetadata, TypeRegistry};
pub use table::{
    BuildNewOptions, FindQuery, FindResult, PersistenceClient, RawRow, SaveOutcome, Table,
    Validator,
};
