//! Authoritative record storage and the similarity scan
//!
//! One `RecordStore` is exclusively owned by its namespace. Records are
//! kept in a `BTreeMap` so the ID space is always iterable in byte order
//! (listing), and wrapped in `Arc` so snapshotting the store for readers
//! is a structural clone, not a deep copy.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::codec;
use crate::query::Filter;
use crate::types::{DistanceMetric, Record, RecordId, SparseVector};
use crate::wal::{DeleteSelector, WalOperation};

#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<RecordId, Arc<Record>>,
    /// Sequence of the last applied write
    applied_seq: Option<u64>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn applied_seq(&self) -> Option<u64> {
        self.applied_seq
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Record>> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn records(&self) -> &BTreeMap<RecordId, Arc<Record>> {
        &self.records
    }

    /// Count the records a batch would insert (as opposed to replace).
    pub fn net_new(&self, records: &[Record]) -> usize {
        records.iter().filter(|r| !self.contains(&r.id)).count()
    }

    /// Count records matching a filter.
    pub fn count_matching(&self, filter: &Filter) -> usize {
        self.records
            .values()
            .filter(|r| filter.matches(r.metadata.as_ref()))
            .count()
    }

    /// Apply one logged operation. Operations arrive in WAL order; the
    /// caller has already validated them.
    pub fn apply(&mut self, sequence: u64, operation: &WalOperation) {
        match operation {
            WalOperation::Upsert { records } => {
                for record in records {
                    self.records
                        .insert(record.id.clone(), Arc::new(record.clone()));
                }
            }
            WalOperation::Update {
                id,
                values,
                sparse_values,
                set_metadata,
            } => {
                if let Some(existing) = self.records.get(id) {
                    let mut updated = Record::clone(existing);
                    if let Some(values) = values {
                        updated.values = values.clone();
                    }
                    if let Some(sparse) = sparse_values {
                        updated.sparse_values = Some(sparse.clone());
                    }
                    if let Some(patch) = set_metadata {
                        let merged = updated.metadata.get_or_insert_with(Default::default);
                        for (key, value) in patch {
                            merged.insert(key.clone(), value.clone());
                        }
                    }
                    self.records.insert(id.clone(), Arc::new(updated));
                }
            }
            WalOperation::Delete { selector } => match selector {
                DeleteSelector::Ids(ids) => {
                    for id in ids {
                        self.records.remove(id);
                    }
                }
                DeleteSelector::Filter(filter) => {
                    self.records
                        .retain(|_, record| !filter.matches(record.metadata.as_ref()));
                }
                DeleteSelector::All => {
                    self.records.clear();
                }
            },
        }
        self.applied_seq = Some(sequence);
    }

    /// Score every record under the metric, drop non-matching candidates,
    /// and keep the `top_k` best. Ties are broken by ascending record ID
    /// so identical queries always rank identically.
    pub fn scan(
        &self,
        metric: DistanceMetric,
        dense_query: Option<&[f32]>,
        sparse_query: Option<&SparseVector>,
        hybrid: bool,
        filter: Option<&Filter>,
        top_k: usize,
    ) -> Vec<(Arc<Record>, f32)> {
        let mut scored: Vec<(Arc<Record>, f32)> = self
            .records
            .values()
            .filter(|record| {
                filter.map_or(true, |f| f.matches(record.metadata.as_ref()))
            })
            .map(|record| {
                let score = codec::score_record(
                    metric,
                    dense_query,
                    sparse_query,
                    hybrid,
                    &record.values,
                    record.sparse_values.as_ref(),
                );
                (record.clone(), score)
            })
            .collect();

        // Sparse-only queries rank by the inner product, which is a
        // similarity regardless of the index metric.
        let ascending = dense_query.is_some() && metric.lower_is_better();
        scored.sort_by(|(ra, sa), (rb, sb)| {
            let by_score = if ascending {
                sa.partial_cmp(sb)
            } else {
                sb.partial_cmp(sa)
            };
            by_score
                .unwrap_or(Ordering::Equal)
                .then_with(|| ra.id.cmp(&rb.id))
        });
        scored.truncate(top_k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{FilterCondition, FilterOp};
    use crate::types::MetadataValue;

    fn record(id: &str, values: Vec<f32>) -> Record {
        Record {
            id: id.to_string(),
            values,
            sparse_values: None,
            metadata: None,
        }
    }

    fn upsert(store: &mut RecordStore, seq: u64, records: Vec<Record>) {
        store.apply(seq, &WalOperation::Upsert { records });
    }

    #[test]
    fn test_upsert_replaces_whole_record() {
        let mut store = RecordStore::new();

        let mut with_md = record("a", vec![1.0, 0.0]);
        with_md.metadata = Some(
            [(
                "genre".to_string(),
                MetadataValue::String("comedy".to_string()),
            )]
            .into_iter()
            .collect(),
        );
        upsert(&mut store, 0, vec![with_md]);

        // Re-upserting the same ID preserves nothing from the old value
        upsert(&mut store, 1, vec![record("a", vec![0.0, 1.0])]);

        let stored = store.get("a").unwrap();
        assert_eq!(stored.values, vec![0.0, 1.0]);
        assert!(stored.metadata.is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.applied_seq(), Some(1));
    }

    #[test]
    fn test_update_merges_metadata_only() {
        let mut store = RecordStore::new();
        upsert(&mut store, 0, vec![record("vec1", vec![1.0, 1.5])]);

        let patch: crate::types::Metadata = [(
            "genre".to_string(),
            MetadataValue::String("comedy".to_string()),
        )]
        .into_iter()
        .collect();
        store.apply(
            1,
            &WalOperation::Update {
                id: "vec1".to_string(),
                values: None,
                sparse_values: None,
                set_metadata: Some(patch),
            },
        );

        let second: crate::types::Metadata =
            [("year".to_string(), MetadataValue::Integer(2020))]
                .into_iter()
                .collect();
        store.apply(
            2,
            &WalOperation::Update {
                id: "vec1".to_string(),
                values: None,
                sparse_values: None,
                set_metadata: Some(second),
            },
        );

        let stored = store.get("vec1").unwrap();
        assert_eq!(stored.values, vec![1.0, 1.5]);
        let md = stored.metadata.as_ref().unwrap();
        assert_eq!(md.len(), 2);
        assert_eq!(
            md.get("genre"),
            Some(&MetadataValue::String("comedy".to_string()))
        );
        assert_eq!(md.get("year"), Some(&MetadataValue::Integer(2020)));
    }

    #[test]
    fn test_delete_selectors() {
        let mut store = RecordStore::new();
        let mut tagged = record("b", vec![0.0]);
        tagged.metadata = Some(
            [("drop".to_string(), MetadataValue::Boolean(true))]
                .into_iter()
                .collect(),
        );
        upsert(
            &mut store,
            0,
            vec![record("a", vec![0.0]), tagged, record("c", vec![0.0])],
        );

        store.apply(
            1,
            &WalOperation::Delete {
                selector: DeleteSelector::Ids(vec!["a".to_string(), "missing".to_string()]),
            },
        );
        assert_eq!(store.len(), 2);

        let filter = Filter::Condition(FilterCondition {
            field: "drop".to_string(),
            op: FilterOp::Eq,
            value: MetadataValue::Boolean(true),
        });
        store.apply(
            2,
            &WalOperation::Delete {
                selector: DeleteSelector::Filter(filter),
            },
        );
        assert_eq!(store.len(), 1);
        assert!(store.contains("c"));

        store.apply(
            3,
            &WalOperation::Delete {
                selector: DeleteSelector::All,
            },
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_scan_euclidean_ascending() {
        let mut store = RecordStore::new();
        upsert(
            &mut store,
            0,
            vec![
                record("far", vec![10.0, 10.0]),
                record("near", vec![1.0, 1.0]),
                record("mid", vec![4.0, 4.0]),
            ],
        );

        let results = store.scan(
            DistanceMetric::Euclidean,
            Some(&[0.0, 0.0]),
            None,
            false,
            None,
            2,
        );
        let ids: Vec<_> = results.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        // Squared distance, not square-rooted
        assert!((results[0].1 - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_scan_tie_break_by_id() {
        let mut store = RecordStore::new();
        // Same direction, same cosine score
        upsert(
            &mut store,
            0,
            vec![
                record("b", vec![2.0, 0.0]),
                record("a", vec![1.0, 0.0]),
                record("c", vec![3.0, 0.0]),
            ],
        );

        let results = store.scan(
            DistanceMetric::Cosine,
            Some(&[1.0, 0.0]),
            None,
            false,
            None,
            3,
        );
        let ids: Vec<_> = results.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_scan_applies_filter() {
        let mut store = RecordStore::new();
        let mut keep = record("keep", vec![1.0, 0.0]);
        keep.metadata = Some(
            [(
                "genre".to_string(),
                MetadataValue::String("comedy".to_string()),
            )]
            .into_iter()
            .collect(),
        );
        upsert(&mut store, 0, vec![keep, record("skip", vec![1.0, 0.0])]);

        let filter = Filter::Condition(FilterCondition {
            field: "genre".to_string(),
            op: FilterOp::Eq,
            value: MetadataValue::String("comedy".to_string()),
        });
        let results = store.scan(
            DistanceMetric::Cosine,
            Some(&[1.0, 0.0]),
            None,
            false,
            Some(&filter),
            10,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.id, "keep");
    }

    #[test]
    fn test_snapshot_clone_is_isolated() {
        let mut store = RecordStore::new();
        upsert(&mut store, 0, vec![record("a", vec![1.0])]);

        let snapshot = store.clone();
        store.apply(
            1,
            &WalOperation::Delete {
                selector: DeleteSelector::All,
            },
        );

        assert!(store.is_empty());
        assert_eq!(snapshot.len(), 1);
    }
}
