//! Error types for the Fursat synchronization core

use thiserror::Error;

/// Main error type for Fursat core operations
#[derive(Error, Debug)]
pub enum FursatError {
    /// A viewer-scoped operation was attempted with no signed-in identity
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The gateway rejected or failed a query/mutation
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A uniqueness constraint was violated on insert
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Blob upload or removal failed
    #[error("Blob storage error: {0}")]
    Blob(String),

    /// A realtime channel could not be opened or has lagged out
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// A required row was missing where the caller cannot proceed without it
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Error during serialization/deserialization of gateway rows
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FursatError {
    /// Whether this error is the uniqueness-violation case that profile
    /// creation recovers from by updating the existing row.
    pub fn is_conflict(&self) -> bool {
        matches!(self, FursatError::Conflict(_))
    }
}

impl From<serde_json::Error> for FursatError {
    fn from(err: serde_json::Error) -> Self {
        FursatError::Serialization(err.to_string())
    }
}

/// Result type alias using FursatError
pub type FursatResult<T> = Result<T, FursatError>;
