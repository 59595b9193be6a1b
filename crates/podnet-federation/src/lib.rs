//! # PodNet Federation
//!
//! Keeps a pod's content catalog in sync with its peers.
//!
//! Local changes ("item added", "item removed") are queued in a
//! [`ChangeQueue`], one pending request per item. Periodically, or on
//! demand, the [`BatchDispatcher`] claims the whole queue, sends every add
//! as one batch and every remove as another to each known pod in parallel,
//! and hands the per-pod outcome to the [`ReputationManager`]. Pods that
//! keep failing lose score until they are evicted with the content they
//! own. The [`FederationScheduler`] drives rounds on a timer.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use podnet_core::{MockPodTransport, RequestKind};
//! use podnet_federation::{FederationConfig, FederationScheduler};
//! use podnet_storage::InMemoryFederationStore;
//!
//! let store = Arc::new(InMemoryFederationStore::new());
//! let scheduler = FederationScheduler::new(
//!     FederationConfig::default(),
//!     store.clone(),
//!     store.clone(),
//!     store,
//!     Arc::new(MockPodTransport::new()),
//! )?;
//!
//! scheduler.enqueue("video-1", RequestKind::Add, payload).await?;
//! scheduler.activate().await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod registry;
pub mod reputation;
pub mod scheduler;

pub use config::{
    ConflictPolicy, DEFAULT_API_VERSION, DEFAULT_INTERVAL, EvictionRule, FederationConfig,
    ScoreConfig,
};
pub use dispatcher::{BatchDispatcher, PartitionReport, RoundReport};
pub use error::{FederationError, FederationResult};
pub use queue::{ChangeQueue, DrainedRequests, EnqueueOutcome};
pub use registry::PeerRegistry;
pub use reputation::{ReputationManager, ReputationReport};
pub use scheduler::{FederationEvent, FederationScheduler};
