//! Identifier newtypes
//!
//! Pods, content items and queued requests each get their own identifier
//! type so they cannot be mixed up at call sites.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Identifier of a known pod
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodId(pub String);

impl PodId {
    /// Create a new pod ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logging (first 8 chars)
    pub fn short_id(&self) -> &str {
        let end = self.0.char_indices().nth(8).map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl Display for PodId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PodId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PodId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of the content item a pool request targets
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create a new item ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Row identity of a queued pool request
///
/// Assigned by the store in insertion order. Distinct from [`ItemId`]: the
/// same item may be queued again while an earlier request for it is still
/// being broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Create a new request ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Big-endian bytes, so byte order matches numeric order
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pod_short_id() {
        assert_eq!(PodId::new("abcdef0123456789").short_id(), "abcdef01");
        assert_eq!(PodId::new("abc").short_id(), "abc");
    }

    #[test]
    fn test_request_id_ordering_matches_bytes() {
        let a = RequestId::new(2);
        let b = RequestId::new(300);
        assert!(a < b);
        assert!(a.to_be_bytes() < b.to_be_bytes());
    }
}
