//! Pool requests and outbound batches

use std::fmt::Display;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::identity::{ItemId, RequestId};

/// Kind of change a pool request announces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// A content item was added locally
    Add,
    /// A content item was removed locally
    Remove,
}

impl RequestKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Add => "add",
            RequestKind::Remove => "remove",
        }
    }

    /// Compact tag used in stored rows
    pub fn tag(&self) -> u8 {
        match self {
            RequestKind::Add => 1,
            RequestKind::Remove => 2,
        }
    }

    /// Decode a stored tag
    pub fn from_tag(tag: u8) -> Result<Self, RequestError> {
        match tag {
            1 => Ok(RequestKind::Add),
            2 => Ok(RequestKind::Remove),
            other => Err(RequestError::UnknownKind(format!("tag {other}"))),
        }
    }

    /// The remote endpoint path batches of this kind are posted to
    pub fn path(&self, api_version: &str) -> String {
        format!("/api/{}/remotevideos/{}", api_version, self.as_str())
    }
}

impl Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued change for one content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRequest {
    /// Row identity assigned at insertion
    pub request_id: RequestId,
    /// The content item this change targets
    pub item_id: ItemId,
    /// Add or remove
    pub kind: RequestKind,
    /// Opaque serialized change descriptor
    pub payload: Bytes,
    /// When the request was queued
    pub created_at: DateTime<Utc>,
}

impl PoolRequest {
    /// Create a new pool request
    pub fn new(
        request_id: RequestId,
        item_id: ItemId,
        kind: RequestKind,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            request_id,
            item_id,
            kind,
            payload: payload.into(),
            created_at: Utc::now(),
        }
    }
}

/// Every payload of one request kind, sent to each pod as a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBatch {
    /// Kind shared by every payload in the batch
    pub kind: RequestKind,
    /// Remote path, e.g. `/api/v1/remotevideos/add`
    pub path: String,
    /// Payloads in queue order
    pub requests: Vec<Bytes>,
}

impl RequestBatch {
    /// Build a batch from requests of a single kind
    pub fn new(kind: RequestKind, api_version: &str, requests: &[PoolRequest]) -> Self {
        debug_assert!(requests.iter().all(|r| r.kind == kind));
        Self {
            kind,
            path: kind.path(api_version),
            requests: requests.iter().map(|r| r.payload.clone()).collect(),
        }
    }

    /// Number of payloads
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Whether the batch carries no payloads
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_paths() {
        assert_eq!(RequestKind::Add.path("v1"), "/api/v1/remotevideos/add");
        assert_eq!(RequestKind::Remove.path("v1"), "/api/v1/remotevideos/remove");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert_eq!(
            RequestKind::from_tag(7),
            Err(RequestError::UnknownKind("tag 7".into()))
        );
        assert!(RequestKind::from_tag(0).is_err());
        assert_eq!(RequestKind::from_tag(RequestKind::Remove.tag()), Ok(RequestKind::Remove));
    }

    #[test]
    fn test_batch_keeps_queue_order() {
        let requests = vec![
            PoolRequest::new(RequestId::new(1), "a".into(), RequestKind::Add, &b"first"[..]),
            PoolRequest::new(RequestId::new(2), "b".into(), RequestKind::Add, &b"second"[..]),
        ];
        let batch = RequestBatch::new(RequestKind::Add, "v1", &requests);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.requests[0], Bytes::from_static(b"first"));
        assert_eq!(batch.path, "/api/v1/remotevideos/add");
    }
}
