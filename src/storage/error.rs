//! Error types for storage operations

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record does not exist
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A uniqueness rule rejected the write (e.g. a second open alert for the same condition)
    #[error("conflicting record: {0}")]
    Conflict(String),

    /// Database connection failed
    #[error("failed to connect to storage backend: {0}")]
    ConnectionFailed(String),

    /// Database query failed
    #[error("storage query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// Row could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend refused the write (used by the in-memory backend's failure injection)
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// I/O error (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::Io(io_err),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                StorageError::Conflict(db_err.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}
