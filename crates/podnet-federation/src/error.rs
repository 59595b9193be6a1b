//! Error types for the federation core

use thiserror::Error;

use podnet_core::{ItemId, RequestKind, StorageError};

/// Errors that can occur in the federation core
#[derive(Debug, Error)]
pub enum FederationError {
    /// The same change is already pending for this item
    #[error("Cannot insert two same requests: {kind} already pending for {item_id}")]
    DuplicateRequest { item_id: ItemId, kind: RequestKind },

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Stored state is corrupted (e.g. an unknown request kind)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The scheduler timer is already running
    #[error("Scheduler already active")]
    AlreadyActive,

    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FederationError {
    /// Whether the error means local state can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        matches!(self, FederationError::InvariantViolation(_))
    }
}

impl From<StorageError> for FederationError {
    fn from(e: StorageError) -> Self {
        if e.is_corruption() {
            FederationError::InvariantViolation(e.to_string())
        } else {
            FederationError::Storage(e)
        }
    }
}

/// Result type alias for federation operations
pub type FederationResult<T> = Result<T, FederationError>;
