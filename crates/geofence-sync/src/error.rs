//! Engine error types.

use thiserror::Error;

/// Error from the persistent store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted data could not be serialized or deserialized.
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted record is present but cannot be reconstructed.
    #[error("malformed record for geofence '{id}': {reason}")]
    MalformedRecord { id: String, reason: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Error from the reconciliation engine's public operations.
///
/// Remote failures never surface here: they are delivered asynchronously
/// through the listener. Only local persistence failures abort an
/// operation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The durable intent write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;
