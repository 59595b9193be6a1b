//! Persistent federation store backed by redb
//!
//! Every operation runs in its own redb transaction. redb serializes write
//! transactions, so read-modify-write operations such as
//! [`claim_all`](PoolRequestStore::claim_all) and
//! [`increment_scores`](PodStore::increment_scores) are atomic.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, instrument};

use podnet_core::{
    ContentRecord, ContentStore, ItemId, Pod, PodId, PodStore, PoolRequest, PoolRequestStore,
    RequestId, RequestKind, StorageError,
};

use crate::tables::{
    COUNTERS, CONTENT, LAST_REQUEST_ID, PODS, POOL_REQUESTS, RedbStorage, RedbStorageConfig,
    Table, db_err,
};

/// Stored form of a pool request
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RequestRow {
    item_id: String,
    kind: u8,
    payload: Vec<u8>,
    created_at_millis: i64,
    claimed: bool,
}

impl RequestRow {
    fn from_request(request: &PoolRequest) -> Self {
        Self {
            item_id: request.item_id.0.clone(),
            kind: request.kind.tag(),
            payload: request.payload.to_vec(),
            created_at_millis: request.created_at.timestamp_millis(),
            claimed: false,
        }
    }

    fn into_request(self, key: &[u8]) -> Result<PoolRequest, StorageError> {
        let kind = RequestKind::from_tag(self.kind)?;
        Ok(PoolRequest {
            request_id: decode_request_id(key)?,
            item_id: ItemId::new(self.item_id),
            kind,
            payload: Bytes::from(self.payload),
            created_at: Utc
                .timestamp_millis_opt(self.created_at_millis)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    postcard::from_bytes(bytes).map_err(|e| StorageError::Deserialization(e.to_string()))
}

fn decode_request_id(key: &[u8]) -> Result<RequestId, StorageError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StorageError::corrupted(format!("request key of {} bytes", key.len())))?;
    Ok(RequestId::new(u64::from_be_bytes(bytes)))
}

/// Find the first unclaimed row for an item
fn find_pending_row<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    item_id: &ItemId,
) -> Result<Option<(Vec<u8>, RequestRow)>, StorageError> {
    for entry in table.iter().map_err(db_err)? {
        let (key, value) = entry.map_err(db_err)?;
        let row: RequestRow = decode(value.value())?;
        if !row.claimed && row.item_id == item_id.0 {
            return Ok(Some((key.value().to_vec(), row)));
        }
    }
    Ok(None)
}

/// redb-backed implementation of the federation stores
#[derive(Clone)]
pub struct RedbFederationStore {
    storage: Arc<RedbStorage>,
}

impl RedbFederationStore {
    /// Open or create the store
    ///
    /// Requests left claimed by a previous process were already sent and
    /// are deleted here.
    pub fn open(config: RedbStorageConfig) -> Result<Self, StorageError> {
        let store = Self::new(Arc::new(RedbStorage::open(config)?));
        let purged = store.purge_claimed_rows()?;
        if purged > 0 {
            info!(count = purged, "Purged pool requests claimed before restart");
        }
        Ok(store)
    }

    /// Wrap an already opened database
    pub fn new(storage: Arc<RedbStorage>) -> Self {
        Self { storage }
    }

    /// The underlying database
    pub fn storage(&self) -> &Arc<RedbStorage> {
        &self.storage
    }

    fn upsert_row<T: Serialize>(&self, table: Table, key: &[u8], value: &T) -> Result<(), StorageError> {
        let value = encode(value)?;
        self.storage.write(|txn| {
            txn.open_table(table)
                .map_err(db_err)?
                .insert(key, value.as_slice())
                .map_err(db_err)?;
            Ok(())
        })
    }

    fn decode_all<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>, StorageError> {
        self.storage
            .entries(table)?
            .into_iter()
            .map(|(_, value)| decode(&value))
            .collect()
    }

    fn purge_claimed_rows(&self) -> Result<usize, StorageError> {
        self.storage.write(|txn| {
            let mut table = txn.open_table(POOL_REQUESTS).map_err(db_err)?;

            let mut claimed = Vec::new();
            for entry in table.iter().map_err(db_err)? {
                let (key, value) = entry.map_err(db_err)?;
                let row: RequestRow = decode(value.value())?;
                if row.claimed {
                    claimed.push(key.value().to_vec());
                }
            }

            for key in &claimed {
                table.remove(key.as_slice()).map_err(db_err)?;
            }
            Ok(claimed.len())
        })
    }

    /// Delete keys from a table, returning how many existed
    fn remove_keys<'k>(
        &self,
        table: Table,
        keys: impl IntoIterator<Item = &'k [u8]>,
    ) -> Result<usize, StorageError> {
        self.storage.write(|txn| {
            let mut table = txn.open_table(table).map_err(db_err)?;
            let mut removed = 0;
            for key in keys {
                if table.remove(key).map_err(db_err)?.is_some() {
                    removed += 1;
                }
            }
            Ok(removed)
        })
    }
}

#[async_trait]
impl PoolRequestStore for RedbFederationStore {
    async fn next_request_id(&self) -> Result<RequestId, StorageError> {
        let next = self.storage.write(|txn| {
            let mut counters = txn.open_table(COUNTERS).map_err(db_err)?;
            let last = match counters.get(LAST_REQUEST_ID).map_err(db_err)? {
                Some(value) => decode_request_id(value.value())?.0,
                None => 0,
            };
            let next = last + 1;
            counters
                .insert(LAST_REQUEST_ID, next.to_be_bytes().as_slice())
                .map_err(db_err)?;
            Ok(next)
        })?;
        Ok(RequestId::new(next))
    }

    async fn find_pending(&self, item_id: &ItemId) -> Result<Option<PoolRequest>, StorageError> {
        self.storage.read(|txn| {
            let table = txn.open_table(POOL_REQUESTS).map_err(db_err)?;
            find_pending_row(&table, item_id)?
                .map(|(key, row)| row.into_request(&key))
                .transpose()
        })
    }

    async fn insert(&self, request: PoolRequest) -> Result<(), StorageError> {
        self.upsert_row(
            POOL_REQUESTS,
            &request.request_id.to_be_bytes(),
            &RequestRow::from_request(&request),
        )
    }

    async fn delete_pending(&self, item_id: &ItemId) -> Result<Option<PoolRequest>, StorageError> {
        self.storage.write(|txn| {
            let mut table = txn.open_table(POOL_REQUESTS).map_err(db_err)?;
            let Some((key, row)) = find_pending_row(&table, item_id)? else {
                return Ok(None);
            };
            table.remove(key.as_slice()).map_err(db_err)?;
            row.into_request(&key).map(Some)
        })
    }

    async fn replace_pending(&self, request: PoolRequest) -> Result<Option<PoolRequest>, StorageError> {
        let row = encode(&RequestRow::from_request(&request))?;
        self.storage.write(|txn| {
            let mut table = txn.open_table(POOL_REQUESTS).map_err(db_err)?;
            let replaced = match find_pending_row(&table, &request.item_id)? {
                Some((key, previous)) => {
                    table.remove(key.as_slice()).map_err(db_err)?;
                    Some(previous.into_request(&key)?)
                }
                None => None,
            };
            table
                .insert(request.request_id.to_be_bytes().as_slice(), row.as_slice())
                .map_err(db_err)?;
            Ok(replaced)
        })
    }

    #[instrument(skip(self))]
    async fn claim_all(&self) -> Result<Vec<PoolRequest>, StorageError> {
        let claimed = self.storage.write(|txn| {
            let mut table = txn.open_table(POOL_REQUESTS).map_err(db_err)?;

            let mut pending = Vec::new();
            for entry in table.iter().map_err(db_err)? {
                let (key, value) = entry.map_err(db_err)?;
                let row: RequestRow = decode(value.value())?;
                if !row.claimed {
                    pending.push((key.value().to_vec(), row));
                }
            }

            let mut claimed = Vec::with_capacity(pending.len());
            for (key, mut row) in pending {
                // An unknown kind fails here and the whole claim is rolled back
                claimed.push(row.clone().into_request(&key)?);
                row.claimed = true;
                table
                    .insert(key.as_slice(), encode(&row)?.as_slice())
                    .map_err(db_err)?;
            }
            Ok(claimed)
        })?;

        debug!(count = claimed.len(), "Claimed pending pool requests");
        Ok(claimed)
    }

    async fn remove(&self, ids: &[RequestId]) -> Result<usize, StorageError> {
        let keys: Vec<[u8; 8]> = ids.iter().map(|id| id.to_be_bytes()).collect();
        self.remove_keys(POOL_REQUESTS, keys.iter().map(|k| k.as_slice()))
    }

    async fn purge_claimed(&self) -> Result<usize, StorageError> {
        self.purge_claimed_rows()
    }

    async fn pending_count(&self) -> Result<usize, StorageError> {
        let rows: Vec<RequestRow> = self.decode_all(POOL_REQUESTS)?;
        Ok(rows.iter().filter(|row| !row.claimed).count())
    }
}

#[async_trait]
impl PodStore for RedbFederationStore {
    async fn upsert(&self, pod: Pod) -> Result<(), StorageError> {
        self.upsert_row(PODS, pod.id.as_str().as_bytes(), &pod)?;
        debug!(pod = %pod.id.short_id(), score = pod.score, "Updated pod record");
        Ok(())
    }

    async fn get(&self, id: &PodId) -> Result<Option<Pod>, StorageError> {
        self.storage.read(|txn| {
            let table = txn.open_table(PODS).map_err(db_err)?;
            let value = table.get(id.as_str().as_bytes()).map_err(db_err)?;
            value.map(|v| decode(v.value())).transpose()
        })
    }

    async fn all(&self) -> Result<Vec<Pod>, StorageError> {
        self.decode_all(PODS)
    }

    async fn increment_scores(&self, ids: &[PodId], delta: i64) -> Result<usize, StorageError> {
        self.storage.write(|txn| {
            let mut table = txn.open_table(PODS).map_err(db_err)?;
            let mut updated = 0;
            for id in ids {
                let key = id.as_str().as_bytes();
                let existing = table.get(key).map_err(db_err)?.map(|v| v.value().to_vec());
                let Some(value) = existing else {
                    continue;
                };
                let mut pod: Pod = decode(&value)?;
                pod.score = pod.score.saturating_add(delta);
                table.insert(key, encode(&pod)?.as_slice()).map_err(db_err)?;
                updated += 1;
            }
            Ok(updated)
        })
    }

    async fn remove(&self, ids: &[PodId]) -> Result<usize, StorageError> {
        self.remove_keys(PODS, ids.iter().map(|id| id.as_str().as_bytes()))
    }
}

#[async_trait]
impl ContentStore for RedbFederationStore {
    async fn insert(&self, record: ContentRecord) -> Result<(), StorageError> {
        self.upsert_row(CONTENT, record.id.as_bytes(), &record)
    }

    async fn all(&self) -> Result<Vec<ContentRecord>, StorageError> {
        self.decode_all(CONTENT)
    }

    async fn count_by_owner(&self, url: &str) -> Result<usize, StorageError> {
        let records: Vec<ContentRecord> = self.decode_all(CONTENT)?;
        Ok(records.iter().filter(|r| r.owner_pod_url == url).count())
    }

    async fn remove_by_owner_urls(&self, urls: &[String]) -> Result<usize, StorageError> {
        self.storage.write(|txn| {
            let mut table = txn.open_table(CONTENT).map_err(db_err)?;

            let mut owned = Vec::new();
            for entry in table.iter().map_err(db_err)? {
                let (key, value) = entry.map_err(db_err)?;
                let record: ContentRecord = decode(value.value())?;
                if urls.iter().any(|u| *u == record.owner_pod_url) {
                    owned.push(key.value().to_vec());
                }
            }

            for key in &owned {
                table.remove(key.as_slice()).map_err(db_err)?;
            }
            Ok(owned.len())
        })
    }
}
