//! Concurrency stress tests for the federation stores
//!
//! Claims race against inserts and against each other; every request must
//! be claimed exactly once.

use std::collections::HashSet;
use std::sync::Arc;

use podnet_core::{PoolRequest, PoolRequestStore, RequestKind};
use podnet_storage::{InMemoryFederationStore, RedbFederationStore, RedbStorageConfig};
use tempfile::TempDir;

const PRODUCERS: usize = 8;
const PER_PRODUCER: usize = 50;
const CLAIMERS: usize = 4;

async fn race_claims(store: Arc<dyn PoolRequestStore>) {
    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let store = store.clone();
        producers.push(tokio::spawn(async move {
            for i in 0..PER_PRODUCER {
                let id = store.next_request_id().await.unwrap();
                let request = PoolRequest::new(
                    id,
                    format!("item-{p}-{i}").into(),
                    RequestKind::Add,
                    &b"payload"[..],
                );
                store.insert(request).await.unwrap();
                tokio::task::yield_now().await;
            }
        }));
    }

    let mut claimers = Vec::new();
    for _ in 0..CLAIMERS {
        let store = store.clone();
        claimers.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..20 {
                seen.extend(store.claim_all().await.unwrap().into_iter().map(|r| r.request_id));
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    for producer in producers {
        producer.await.unwrap();
    }

    let mut claimed = Vec::new();
    for claimer in claimers {
        claimed.extend(claimer.await.unwrap());
    }
    // Whatever the racing claimers missed
    claimed.extend(store.claim_all().await.unwrap().into_iter().map(|r| r.request_id));

    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(unique.len(), claimed.len(), "a request was claimed twice");
    assert_eq!(claimed.len(), PRODUCERS * PER_PRODUCER, "a request was lost");
    assert_eq!(store.pending_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_in_memory_claims_are_exclusive() {
    race_claims(Arc::new(InMemoryFederationStore::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_redb_claims_are_exclusive() {
    let temp_dir = TempDir::new().unwrap();
    let store =
        RedbFederationStore::open(RedbStorageConfig::with_path(temp_dir.path().join("stress.redb")))
            .unwrap();
    race_claims(Arc::new(store)).await;
}

#[tokio::test]
async fn redb_queue_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reopen.redb");

    {
        let store = RedbFederationStore::open(RedbStorageConfig::with_path(&path)).unwrap();
        for item in ["a", "b", "c"] {
            let id = store.next_request_id().await.unwrap();
            store
                .insert(PoolRequest::new(id, item.into(), RequestKind::Remove, &b"x"[..]))
                .await
                .unwrap();
        }
        // Claim one round's worth, then "crash" before removal
        assert_eq!(store.claim_all().await.unwrap().len(), 3);
    }

    let store = RedbFederationStore::open(RedbStorageConfig::with_path(&path)).unwrap();
    // Claimed rows are purged on restart; the id counter keeps counting
    assert_eq!(store.pending_count().await.unwrap(), 0);
    assert_eq!(store.storage().len("pool_requests").unwrap(), 0);
    assert!(store.next_request_id().await.unwrap().0 > 3);
}
