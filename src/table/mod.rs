pub mod client;
pub mod table;

pub use client::{FindQuery, FindResult, PersistenceClient, RawRow, SaveOutcome, Validator};
pub use table::{BuildNewOptions, Table};
