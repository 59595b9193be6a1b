//! # PodNet Storage
//!
//! Storage backends for the PodNet federation core.
//!
//! Both backends implement all three store contracts from `podnet-core`
//! ([`PoolRequestStore`], [`PodStore`], [`ContentStore`]) on a single value,
//! so one handle can be shared by the queue, the registry and the
//! reputation manager.
//!
//! ## Features
//!
//! - **InMemoryFederationStore**: `DashMap`-backed, for tests and simulation,
//!   with failure injection and an operation log
//! - **RedbFederationStore**: redb-backed persistent store for production
//!
//! ## Example
//!
//! ```rust,ignore
//! use podnet_core::{Pod, PodStore};
//! use podnet_storage::{RedbFederationStore, RedbStorageConfig};
//!
//! let store = RedbFederationStore::open(RedbStorageConfig::with_path("./data/podnet.redb"))?;
//! store.upsert(Pod::new("pod-a", "https://a.example", "key-a")).await?;
//! assert_eq!(PodStore::all(&store).await?.len(), 1);
//! ```

pub mod memory;
pub mod persistent;
pub mod tables;

// Re-exports
pub use memory::{InMemoryFederationStore, StoreOperation};
pub use persistent::RedbFederationStore;
pub use tables::{RedbStorage, RedbStorageConfig};

// Re-export the store contracts for convenience
pub use podnet_core::{ContentStore, PodStore, PoolRequestStore, StorageError};

#[cfg(test)]
mod tests {
    use super::*;

    /// The store traits must stay object-safe; the federation core holds them as `Arc<dyn _>`
    fn _assert_object_safe(
        _: &dyn PoolRequestStore,
        _: &dyn PodStore,
        _: &dyn ContentStore,
    ) {
    }
}
