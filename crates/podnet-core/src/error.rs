//! Error types for PodNet

use thiserror::Error;

/// Errors related to persistent storage
///
/// "No rows" is never an error: lookups return `Option` and bulk
/// operations return affected counts.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Stored data violates a structural invariant (e.g. an unknown request kind)
    #[error("Corrupted record: {0}")]
    Corrupted(String),
}

impl StorageError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Create a new Corrupted error
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }

    /// Whether this error indicates corrupted state rather than a transient failure
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupted(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<RequestError> for StorageError {
    fn from(err: RequestError) -> Self {
        StorageError::Corrupted(err.to_string())
    }
}

/// Errors related to pod transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Pod unreachable: {0}")]
    Unreachable(String),
}

/// Errors related to pool request decoding
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Unknown pool request kind: {0}")]
    UnknownKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::database("table missing");
        assert!(err.to_string().contains("table missing"));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_request_error_becomes_corruption() {
        let err: StorageError = RequestError::UnknownKind("update".into()).into();
        assert!(err.is_corruption());
        assert!(err.to_string().contains("update"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_transport_timeout_display() {
        assert!(TransportError::Timeout(250).to_string().contains("250 ms"));
    }
}
