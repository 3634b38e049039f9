use thiserror::Error;

#[derive(Error, Debug)]
pub enum EntityError {
    #[error("Record \"{key}\" not found in table \"{table}\"")]
    RecordNotFound { key: String, table: String },

    #[error("Method '{0}' not implemented")]
    NotImplemented(&'static str),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, EntityError>;

impl<T> From<std::sync::PoisonError<T>> for EntityError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
