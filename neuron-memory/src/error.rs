//! Error taxonomy for the memory store and embedding cache.

use thiserror::Error;

/// Memory subsystem errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The underlying SQLite database rejected an operation.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A record with the given id was not found in the given scope.
    #[error("not found: {0}")]
    NotFound(String),

    /// An embedding's dimensionality did not match the store's configured
    /// dimension. Fatal — no migration is attempted (see design notes).
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The store's configured embedding dimension.
        expected: usize,
        /// The dimension actually supplied.
        actual: usize,
    },

    /// JSON (de)serialization of a record or embedding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A project-scoped operation was called without a project path.
    #[error("project path required for project-scoped operation")]
    MissingProjectPath,

    /// A global-scoped record carried a project path (§3 invariant: global
    /// records forbid one).
    #[error("global-scoped record must not carry a project path")]
    UnexpectedProjectPath,
}
