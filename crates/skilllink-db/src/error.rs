//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for skilllink_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(msg) => skilllink_core::Error::Conflict(msg),
            other => skilllink_core::Error::Internal(other.to_string()),
        }
    }
}
