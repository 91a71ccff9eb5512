//! Namespace management
//!
//! A namespace is one isolated partition of records within an index. It
//! exclusively owns its record store, its write-ahead log and its
//! query-visible snapshot; nothing here is shared across namespaces, so
//! operations against different namespaces never contend.
//!
//! Writes are linearized: the WAL mutex admits one writer at a time, the
//! append assigns the sequence number that defines last-writer-wins, and
//! the operation is applied to the authoritative store before the lock is
//! released. Reads serve an immutable snapshot that trails the store by at
//! most one refresh interval; `flush` closes the gap on demand.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::capacity::CapacityModel;
use crate::codec;
use crate::pagination::{self, ListPage};
use crate::query::{Filter, Match, QueryRequest};
use crate::types::{DistanceMetric, Metadata, Record, RecordId, SparseVector, Vector};
use crate::wal::{DeleteSelector, WalManager, WalOperation};
use crate::{Error, Result};

pub mod refresh;
pub mod store;

pub use refresh::{RefreshConfig, RefreshManager};
pub use store::RecordStore;

/// Largest accepted upsert batch.
pub const MAX_UPSERT_BATCH: usize = 1000;

pub struct Namespace {
    name: String,
    dimension: usize,
    metric: DistanceMetric,
    capacity: CapacityModel,

    /// Write path: admits one writer, assigns sequence numbers
    wal: Mutex<WalManager>,

    /// Authoritative state, updated at acknowledgment time
    state: RwLock<RecordStore>,

    /// Query-visible snapshot, refreshed asynchronously
    snapshot: RwLock<Arc<RecordStore>>,
}

impl Namespace {
    /// Open a namespace, replaying its WAL into the authoritative store.
    /// A fresh directory yields an empty namespace.
    pub async fn open(
        name: String,
        dimension: usize,
        metric: DistanceMetric,
        capacity: CapacityModel,
        wal_dir: impl AsRef<Path>,
    ) -> Result<Self> {
        let wal = WalManager::open(wal_dir).await?;

        let mut state = RecordStore::new();
        let entries = wal.replay().await?;
        let replayed = entries.len();
        for entry in &entries {
            state.apply(entry.sequence, &entry.operation);
        }
        if replayed > 0 {
            tracing::info!(
                namespace = %name,
                entries = replayed,
                records = state.len(),
                "Replayed namespace WAL"
            );
        }

        // Everything recovered at startup is immediately visible
        let snapshot = Arc::new(state.clone());

        Ok(Self {
            name,
            dimension,
            metric,
            capacity,
            wal: Mutex::new(wal),
            state: RwLock::new(state),
            snapshot: RwLock::new(snapshot),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Insert or fully replace a batch of records, all-or-nothing.
    ///
    /// The whole batch is validated before the log append, so an invalid
    /// record leaves the namespace untouched. Returns the written count.
    pub async fn upsert(&self, records: Vec<Record>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        if records.len() > MAX_UPSERT_BATCH {
            return Err(Error::invalid_request(format!(
                "upsert batch of {} exceeds the {} record limit",
                records.len(),
                MAX_UPSERT_BATCH
            )));
        }

        for record in &records {
            if record.id.is_empty() {
                return Err(Error::invalid_request("record id must not be empty"));
            }
            codec::validate_dense(&record.values, self.dimension)?;
            if let Some(sparse) = &record.sparse_values {
                codec::validate_sparse(sparse)?;
            }
        }

        let count = records.len();
        let mut wal = self.wal.lock().await;

        {
            let state = self.state.read().await;
            let net_new = state.net_new(&records);
            self.capacity.check_write(state.len(), net_new)?;
        }

        let operation = WalOperation::Upsert { records };
        let sequence = wal.append(&operation).await?;
        self.state.write().await.apply(sequence, &operation);

        tracing::debug!(namespace = %self.name, count, sequence, "Upserted records");
        Ok(count)
    }

    /// Partially update one existing record. `values` and `sparse_values`
    /// replace their fields; `set_metadata` merges key-by-key.
    pub async fn update(
        &self,
        id: RecordId,
        values: Option<Vector>,
        sparse_values: Option<SparseVector>,
        set_metadata: Option<Metadata>,
    ) -> Result<()> {
        if values.is_none() && sparse_values.is_none() && set_metadata.is_none() {
            return Err(Error::invalid_request(
                "update requires at least one of 'values', 'sparse_values' or 'set_metadata'",
            ));
        }
        if let Some(values) = &values {
            codec::validate_dense(values, self.dimension)?;
        }
        if let Some(sparse) = &sparse_values {
            codec::validate_sparse(sparse)?;
        }

        let mut wal = self.wal.lock().await;

        if !self.state.read().await.contains(&id) {
            return Err(Error::not_found(format!(
                "record '{}' not found in namespace '{}'",
                id, self.name
            )));
        }

        let operation = WalOperation::Update {
            id,
            values,
            sparse_values,
            set_metadata,
        };
        let sequence = wal.append(&operation).await?;
        self.state.write().await.apply(sequence, &operation);
        Ok(())
    }

    /// Remove records by explicit IDs, by metadata filter, or wholesale.
    /// Deleting a nonexistent ID is a no-op.
    pub async fn delete(&self, selector: DeleteSelector) -> Result<()> {
        match &selector {
            DeleteSelector::Ids(ids) => {
                if ids.is_empty() {
                    return Ok(());
                }
            }
            DeleteSelector::Filter(filter) => {
                filter.validate()?;
                if !self.capacity.supports_filtered_delete() {
                    return Err(Error::UnsupportedOperation(
                        "delete by metadata filter is not available on serverless indexes; \
                         list by ID prefix and delete by ID instead"
                            .to_string(),
                    ));
                }
            }
            DeleteSelector::All => {}
        }

        let mut wal = self.wal.lock().await;
        let operation = WalOperation::Delete { selector };
        let sequence = wal.append(&operation).await?;
        self.state.write().await.apply(sequence, &operation);
        Ok(())
    }

    /// Make every acknowledged write visible to queries immediately.
    pub async fn flush(&self) {
        let fresh = Arc::new(self.state.read().await.clone());
        *self.snapshot.write().await = fresh;
    }

    /// Refresh the snapshot only if acknowledged writes are not yet
    /// visible. Called by the background refresher.
    pub async fn refresh_if_stale(&self) {
        let stale = {
            let state = self.state.read().await;
            let snapshot = self.snapshot.read().await;
            snapshot.applied_seq() != state.applied_seq()
        };
        if stale {
            self.flush().await;
        }
    }

    async fn visible(&self) -> Arc<RecordStore> {
        self.snapshot.read().await.clone()
    }

    /// Nearest-neighbor query against the visible snapshot. Returns the
    /// ranked matches plus the number of candidates scanned.
    pub async fn query(&self, request: &QueryRequest) -> Result<(Vec<Match>, usize)> {
        request.validate()?;

        if self.metric == DistanceMetric::Euclidean
            && request.sparse_vector.is_some()
            && request.hybrid
        {
            return Err(Error::UnsupportedOperation(
                "hybrid scoring is not defined for euclidean indexes".to_string(),
            ));
        }

        let snapshot = self.visible().await;

        // Resolve a query-by-ID to that record's stored dense vector
        let (dense_query, sparse_query) = match &request.id {
            Some(id) => {
                let record = snapshot.get(id).ok_or_else(|| {
                    Error::not_found(format!(
                        "record '{}' not found in namespace '{}'",
                        id, self.name
                    ))
                })?;
                (Some(record.values.clone()), None)
            }
            None => (request.vector.clone(), request.sparse_vector.clone()),
        };

        if let Some(query) = &dense_query {
            codec::validate_dense(query, self.dimension)?;
        }
        if let Some(sparse) = &sparse_query {
            codec::validate_sparse(sparse)?;
        }

        let scanned = snapshot.len();
        let scored = snapshot.scan(
            self.metric,
            dense_query.as_deref(),
            sparse_query.as_ref(),
            request.hybrid,
            request.filter.as_ref(),
            request.top_k,
        );

        let matches = scored
            .into_iter()
            .map(|(record, score)| Match {
                id: record.id.clone(),
                score,
                values: request.include_values.then(|| record.values.clone()),
                sparse_values: request
                    .include_values
                    .then(|| record.sparse_values.clone())
                    .flatten(),
                metadata: request
                    .include_metadata
                    .then(|| record.metadata.clone())
                    .flatten(),
            })
            .collect();

        Ok((matches, scanned))
    }

    /// Return the stored records for each present ID; absent IDs are
    /// silently omitted.
    pub async fn fetch(&self, ids: &[RecordId]) -> HashMap<RecordId, Record> {
        let snapshot = self.visible().await;
        ids.iter()
            .filter_map(|id| {
                snapshot
                    .get(id)
                    .map(|record| (id.clone(), Record::clone(record)))
            })
            .collect()
    }

    /// Page through record IDs in byte-wise ascending order.
    pub async fn list(
        &self,
        prefix: Option<&str>,
        limit: Option<usize>,
        token: Option<&str>,
    ) -> Result<ListPage> {
        let snapshot = self.visible().await;
        pagination::list_page(snapshot.records(), prefix, limit, token)
    }

    /// Visible record count, optionally restricted to a filter (bounded
    /// capacity models only).
    pub async fn record_count(&self, filter: Option<&Filter>) -> Result<usize> {
        let snapshot = self.visible().await;
        match filter {
            None => Ok(snapshot.len()),
            Some(filter) => {
                if !self.capacity.supports_filtered_stats() {
                    return Err(Error::UnsupportedOperation(
                        "filtered statistics are not available on serverless indexes".to_string(),
                    ));
                }
                filter.validate()?;
                Ok(snapshot.count_matching(filter))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterCondition, FilterOp};
    use crate::types::MetadataValue;
    use tempfile::TempDir;

    fn record(id: &str, values: Vec<f32>) -> Record {
        Record {
            id: id.to_string(),
            values,
            sparse_values: None,
            metadata: None,
        }
    }

    async fn open_namespace(dir: &TempDir, capacity: CapacityModel) -> Namespace {
        Namespace::open(
            "ns1".to_string(),
            2,
            DistanceMetric::Cosine,
            capacity,
            dir.path(),
        )
        .await
        .unwrap()
    }

    fn query_request(vector: Vec<f32>, top_k: usize) -> QueryRequest {
        QueryRequest {
            namespace: "ns1".to_string(),
            vector: Some(vector),
            sparse_vector: None,
            id: None,
            top_k,
            filter: None,
            include_values: false,
            include_metadata: false,
            hybrid: false,
        }
    }

    #[tokio::test]
    async fn test_write_invisible_until_flush() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;

        ns.upsert(vec![record("a", vec![1.0, 0.0])]).await.unwrap();

        // Acknowledged but not yet visible
        let (matches, _) = ns.query(&query_request(vec![1.0, 0.0], 5)).await.unwrap();
        assert!(matches.is_empty());

        ns.flush().await;
        let (matches, _) = ns.query(&query_request(vec![1.0, 0.0], 5)).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "a");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_whole_batch() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;

        let result = ns
            .upsert(vec![
                record("ok", vec![1.0, 0.0]),
                record("bad", vec![1.0, 0.0, 3.0]),
            ])
            .await;
        assert!(matches!(
            result.unwrap_err(),
            Error::DimensionMismatch { expected: 2, actual: 3 }
        ));

        // No partial application
        ns.flush().await;
        assert!(ns.fetch(&["ok".to_string()]).await.is_empty());
        assert_eq!(ns.record_count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_not_found_and_merge() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;

        let missing = ns
            .update("vec1".to_string(), None, None, Some(Metadata::new()))
            .await;
        assert!(matches!(missing.unwrap_err(), Error::NotFound(_)));

        ns.upsert(vec![record("vec1", vec![1.0, 1.5])]).await.unwrap();

        let first: Metadata = [(
            "genre".to_string(),
            MetadataValue::String("comedy".to_string()),
        )]
        .into_iter()
        .collect();
        ns.update("vec1".to_string(), None, None, Some(first))
            .await
            .unwrap();

        let second: Metadata = [("year".to_string(), MetadataValue::Integer(2020))]
            .into_iter()
            .collect();
        ns.update("vec1".to_string(), None, None, Some(second))
            .await
            .unwrap();

        ns.flush().await;
        let fetched = ns.fetch(&["vec1".to_string()]).await;
        let md = fetched["vec1"].metadata.as_ref().unwrap();
        assert_eq!(md.len(), 2);
        assert_eq!(
            md.get("genre"),
            Some(&MetadataValue::String("comedy".to_string()))
        );
        assert_eq!(md.get("year"), Some(&MetadataValue::Integer(2020)));
    }

    #[tokio::test]
    async fn test_update_with_no_fields_rejected() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;
        let result = ns.update("vec1".to_string(), None, None, None).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_filtered_delete_requires_pod_capacity() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;

        let filter = Filter::Condition(FilterCondition {
            field: "genre".to_string(),
            op: FilterOp::Eq,
            value: MetadataValue::String("comedy".to_string()),
        });
        let result = ns.delete(DeleteSelector::Filter(filter)).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::UnsupportedOperation(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_missing_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;
        ns.delete(DeleteSelector::Ids(vec!["ghost".to_string()]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_capacity_exceeded_rejects_batch() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Pod { capacity: 2 }).await;

        ns.upsert(vec![record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .await
            .unwrap();

        let result = ns.upsert(vec![record("c", vec![1.0, 1.0])]).await;
        assert!(matches!(result.unwrap_err(), Error::CapacityExceeded(_)));

        // Replacing an existing ID is not net-new and still fits
        ns.upsert(vec![record("a", vec![0.5, 0.5])]).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_by_id_resolves_stored_vector() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;

        ns.upsert(vec![
            record("vec1", vec![1.0, 1.5]),
            record("vec2", vec![2.0, 1.0]),
        ])
        .await
        .unwrap();
        ns.flush().await;

        let mut request = query_request(vec![], 2);
        request.vector = None;
        request.id = Some("vec1".to_string());
        let (matches, _) = ns.query(&request).await.unwrap();
        assert_eq!(matches[0].id, "vec1");
        assert!((matches[0].score - 1.0).abs() < 1e-6);

        request.id = Some("ghost".to_string());
        assert!(matches!(
            ns.query(&request).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_query_include_flags() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;

        let mut rec = record("a", vec![1.0, 0.0]);
        rec.metadata = Some(
            [(
                "genre".to_string(),
                MetadataValue::String("comedy".to_string()),
            )]
            .into_iter()
            .collect(),
        );
        ns.upsert(vec![rec]).await.unwrap();
        ns.flush().await;

        let bare = ns.query(&query_request(vec![1.0, 0.0], 1)).await.unwrap().0;
        assert!(bare[0].values.is_none());
        assert!(bare[0].metadata.is_none());

        let mut request = query_request(vec![1.0, 0.0], 1);
        request.include_values = true;
        request.include_metadata = true;
        let full = ns.query(&request).await.unwrap().0;
        assert_eq!(full[0].values.as_ref().unwrap(), &vec![1.0, 0.0]);
        assert!(full[0].metadata.is_some());
    }

    #[tokio::test]
    async fn test_refresh_if_stale_advances_snapshot() {
        let dir = TempDir::new().unwrap();
        let ns = open_namespace(&dir, CapacityModel::Serverless).await;

        ns.refresh_if_stale().await; // fresh namespace, nothing to do

        ns.upsert(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
        ns.refresh_if_stale().await;

        let (matches, _) = ns.query(&query_request(vec![1.0, 0.0], 1)).await.unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_replays_wal() {
        let dir = TempDir::new().unwrap();
        {
            let ns = open_namespace(&dir, CapacityModel::Serverless).await;
            ns.upsert(vec![record("a", vec![1.0, 0.0])]).await.unwrap();
            ns.delete(DeleteSelector::Ids(vec!["missing".to_string()]))
                .await
                .unwrap();
        }

        let ns = open_namespace(&dir, CapacityModel::Serverless).await;
        let fetched = ns.fetch(&["a".to_string()]).await;
        assert_eq!(fetched["a"].values, vec![1.0, 0.0]);
    }
}
