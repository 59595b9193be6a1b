//! Content records owned by remote pods

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A content entry (e.g. a video) announced by a remote pod
///
/// The owner is referenced by URL, not by pod ID; evicting a pod deletes
/// every record whose `owner_pod_url` matches the pod's URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    /// Record identifier
    pub id: String,
    /// URL of the pod that owns this record
    pub owner_pod_url: String,
    /// Display name
    pub name: String,
    /// Application-specific metadata
    pub metadata: Bytes,
    /// When the record was received
    pub received_at: DateTime<Utc>,
}

impl ContentRecord {
    /// Create a new content record
    pub fn new(id: impl Into<String>, owner_pod_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_pod_url: owner_pod_url.into(),
            name: String::new(),
            metadata: Bytes::new(),
            received_at: Utc::now(),
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: impl Into<Bytes>) -> Self {
        self.metadata = metadata.into();
        self
    }
}
