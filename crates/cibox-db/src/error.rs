//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for cibox_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => cibox_core::Error::NotFound(msg),
            DbError::Duplicate(msg) => cibox_core::Error::Conflict(msg),
            other => cibox_core::Error::Storage(other.to_string()),
        }
    }
}
