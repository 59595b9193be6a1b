//! # PodNet Core
//!
//! Core traits, types, and errors for the PodNet federation stack.
//!
//! Pods announce and retract content records to each other. This crate holds
//! the vocabulary every other crate speaks: what a pod is, what a pool request
//! is, and the narrow contracts the federation core needs from its
//! collaborators (storage and transport).
//!
//! ## Key Traits
//!
//! - [`PoolRequestStore`]: Pending change notifications, keyed by item
//! - [`PodStore`]: Known pods and their reputation scores
//! - [`ContentStore`]: Content records owned by remote pods
//! - [`PodTransport`]: Signed batch delivery to a single pod
//!
//! ## Key Types
//!
//! - [`PoolRequest`]: A queued change for one content item
//! - [`Pod`]: A remote peer with a reputation score
//! - [`ContentRecord`]: A content entry referencing its owner pod by URL
//! - [`RequestBatch`]: Every payload of one request kind, sent as a unit

pub mod content;
pub mod error;
pub mod identity;
pub mod mock_transport;
pub mod pod;
pub mod request;
pub mod store;
pub mod transport;

// Re-export main types
pub use content::*;
pub use error::*;
pub use identity::*;
pub use mock_transport::*;
pub use pod::*;
pub use request::*;
pub use store::*;
pub use transport::*;
