//! Index container and catalog
//!
//! An `Index` owns a fixed dimension, a fixed distance metric, a capacity
//! model and a name→namespace map; namespaces come into existence on first
//! write. The `IndexManager` is the catalog: it creates, deletes, lists
//! and reloads indexes, and routes every operation to the right namespace.
//!
//! Namespaces are referenced only through the name→partition lookup here;
//! no cross-partition pointers exist, and lookups go through `DashMap` so
//! operations against different namespaces never block each other.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::capacity::CapacityModel;
use crate::codec;
use crate::manifest::{IndexManifest, ManifestManager};
use crate::namespace::{Namespace, RefreshManager};
use crate::pagination::ListPage;
use crate::query::{Filter, QueryRequest, QueryResponse};
use crate::types::{
    DistanceMetric, IndexStats, Metadata, NamespaceStats, Record, RecordId, SparseVector, Usage,
    Vector,
};
use crate::wal::DeleteSelector;
use crate::{Error, Result};

/// Names become directory components, so only a conservative charset is
/// accepted.
fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(Error::invalid_request(format!(
            "{} name must be between 1 and 255 characters",
            kind
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(Error::invalid_request(format!(
            "{} name '{}' contains characters outside [A-Za-z0-9._-]",
            kind, name
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::invalid_request(format!(
            "{} name '{}' is reserved",
            kind, name
        )));
    }
    Ok(())
}

pub struct Index {
    manifest: IndexManifest,
    root: PathBuf,
    namespaces: DashMap<String, Arc<Namespace>>,
    /// Serializes namespace creation only; writes never take this
    creation: Mutex<()>,
    refresh: RefreshManager,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.manifest.name)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Index {
    fn new(manifest: IndexManifest, root: PathBuf, refresh: RefreshManager) -> Self {
        Self {
            manifest,
            root,
            namespaces: DashMap::new(),
            creation: Mutex::new(()),
            refresh,
        }
    }

    /// Reload an index from disk: open every namespace directory and
    /// replay its WAL.
    async fn load(
        manifest: IndexManifest,
        root: PathBuf,
        namespace_names: Vec<String>,
        refresh: RefreshManager,
    ) -> Result<Self> {
        let index = Self::new(manifest, root, refresh);
        for name in namespace_names {
            index.open_namespace(&name).await?;
        }
        Ok(index)
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    pub fn metric(&self) -> DistanceMetric {
        self.manifest.metric
    }

    pub fn capacity(&self) -> CapacityModel {
        self.manifest.capacity
    }

    pub fn describe(&self) -> IndexManifest {
        self.manifest.clone()
    }

    fn namespace_dir(&self, name: &str) -> PathBuf {
        self.root.join("namespaces").join(name)
    }

    async fn open_namespace(&self, name: &str) -> Result<Arc<Namespace>> {
        let namespace = Arc::new(
            Namespace::open(
                name.to_string(),
                self.manifest.dimension,
                self.manifest.metric,
                self.manifest.capacity,
                self.namespace_dir(name),
            )
            .await?,
        );
        self.refresh.start_for_namespace(&namespace);
        self.namespaces.insert(name.to_string(), namespace.clone());
        Ok(namespace)
    }

    /// Read-path lookup: absence is not an error.
    fn namespace_read(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(name).map(|e| e.value().clone())
    }

    /// Write-path lookup: the namespace comes into existence on first use.
    async fn namespace_write(&self, name: &str) -> Result<Arc<Namespace>> {
        if let Some(ns) = self.namespace_read(name) {
            return Ok(ns);
        }

        validate_name("namespace", name)?;
        let _guard = self.creation.lock().await;
        // Another writer may have created it while we waited
        if let Some(ns) = self.namespace_read(name) {
            return Ok(ns);
        }
        let ns = self.open_namespace(name).await?;
        tracing::info!(index = %self.manifest.name, namespace = name, "Created namespace");
        Ok(ns)
    }

    pub async fn upsert(&self, namespace: &str, records: Vec<Record>) -> Result<usize> {
        let ns = self.namespace_write(namespace).await?;
        ns.upsert(records).await
    }

    pub async fn update(
        &self,
        namespace: &str,
        id: RecordId,
        values: Option<Vector>,
        sparse_values: Option<SparseVector>,
        set_metadata: Option<Metadata>,
    ) -> Result<()> {
        match self.namespace_read(namespace) {
            Some(ns) => ns.update(id, values, sparse_values, set_metadata).await,
            None => Err(Error::not_found(format!(
                "namespace '{}' not found in index '{}'",
                namespace, self.manifest.name
            ))),
        }
    }

    pub async fn delete(&self, namespace: &str, selector: DeleteSelector) -> Result<()> {
        match self.namespace_read(namespace) {
            Some(ns) => ns.delete(selector).await,
            // Deleting from a namespace that was never written is a no-op,
            // but a malformed filter is still rejected.
            None => {
                if let DeleteSelector::Filter(filter) = &selector {
                    filter.validate()?;
                }
                Ok(())
            }
        }
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        match self.namespace_read(&request.namespace) {
            Some(ns) => {
                let (matches, scanned) = ns.query(request).await?;
                Ok(QueryResponse {
                    matches,
                    namespace: request.namespace.clone(),
                    usage: Usage::for_scan(scanned),
                })
            }
            None => {
                request.validate()?;
                if let Some(vector) = &request.vector {
                    codec::validate_dense(vector, self.manifest.dimension)?;
                }
                Ok(QueryResponse {
                    matches: Vec::new(),
                    namespace: request.namespace.clone(),
                    usage: Usage::for_scan(0),
                })
            }
        }
    }

    pub async fn fetch(
        &self,
        namespace: &str,
        ids: &[RecordId],
    ) -> Result<(HashMap<RecordId, Record>, Usage)> {
        match self.namespace_read(namespace) {
            Some(ns) => {
                let records = ns.fetch(ids).await;
                Ok((records, Usage::for_scan(ids.len())))
            }
            None => Ok((HashMap::new(), Usage::for_scan(0))),
        }
    }

    pub async fn list(
        &self,
        namespace: &str,
        prefix: Option<&str>,
        limit: Option<usize>,
        token: Option<&str>,
    ) -> Result<ListPage> {
        match self.namespace_read(namespace) {
            Some(ns) => ns.list(prefix, limit, token).await,
            None => Ok(ListPage {
                ids: Vec::new(),
                pagination_token: None,
            }),
        }
    }

    /// Aggregate statistics across namespaces, optionally restricted to a
    /// metadata filter (bounded capacity models only).
    pub async fn stats(&self, filter: Option<&Filter>) -> Result<IndexStats> {
        let mut namespaces = HashMap::new();
        let mut total = 0;

        // Collect handles first; counting awaits must not hold map shards
        let handles: Vec<Arc<Namespace>> =
            self.namespaces.iter().map(|e| e.value().clone()).collect();
        for ns in handles {
            let count = ns.record_count(filter).await?;
            total += count;
            namespaces.insert(
                ns.name().to_string(),
                NamespaceStats {
                    record_count: count,
                },
            );
        }

        Ok(IndexStats {
            namespaces,
            dimension: self.manifest.dimension,
            index_fullness: self.manifest.capacity.fullness(total),
            total_record_count: total,
        })
    }

    /// Force every namespace's acknowledged writes to become visible.
    pub async fn flush(&self) {
        let handles: Vec<Arc<Namespace>> =
            self.namespaces.iter().map(|e| e.value().clone()).collect();
        for ns in handles {
            ns.flush().await;
        }
    }
}

/// The index catalog: create/delete/describe/list plus startup reload.
pub struct IndexManager {
    manifests: ManifestManager,
    indexes: DashMap<String, Arc<Index>>,
    refresh: RefreshManager,
    creation: Mutex<()>,
}

impl IndexManager {
    /// Open the catalog under `data_dir`, reloading every index manifest
    /// and replaying namespace WALs.
    pub async fn open(data_dir: impl Into<PathBuf>, refresh: RefreshManager) -> Result<Self> {
        let manifests = ManifestManager::new(data_dir);
        let indexes = DashMap::new();

        for name in manifests.list().await? {
            let manifest = manifests.load(&name).await?;
            let namespace_names = manifests.list_namespaces(&name).await?;
            let index = Index::load(
                manifest,
                manifests.index_dir(&name),
                namespace_names,
                refresh.clone(),
            )
            .await?;
            tracing::info!(index = %name, "Loaded index");
            indexes.insert(name, Arc::new(index));
        }

        Ok(Self {
            manifests,
            indexes,
            refresh,
            creation: Mutex::new(()),
        })
    }

    pub async fn create_index(
        &self,
        name: String,
        dimension: usize,
        metric: DistanceMetric,
        capacity: CapacityModel,
    ) -> Result<Arc<Index>> {
        validate_name("index", &name)?;
        if dimension == 0 {
            return Err(Error::invalid_request("dimension must be positive"));
        }
        if let CapacityModel::Pod { capacity: 0 } = capacity {
            return Err(Error::invalid_request(
                "pod capacity must be positive",
            ));
        }

        let _guard = self.creation.lock().await;
        if self.indexes.contains_key(&name) {
            return Err(Error::AlreadyExists(format!(
                "index '{}' already exists",
                name
            )));
        }

        let manifest = IndexManifest::new(name.clone(), dimension, metric, capacity);
        self.manifests.create(&manifest).await?;

        let index = Arc::new(Index::new(
            manifest,
            self.manifests.index_dir(&name),
            self.refresh.clone(),
        ));
        self.indexes.insert(name.clone(), index.clone());
        tracing::info!(index = %name, dimension, %metric, "Created index");
        Ok(index)
    }

    /// Irreversibly destroy an index and everything in it.
    pub async fn delete_index(&self, name: &str) -> Result<()> {
        let _guard = self.creation.lock().await;
        let removed = self.indexes.remove(name);
        let on_disk = self.manifests.exists(name).await;
        if removed.is_none() && !on_disk {
            return Err(Error::not_found(format!("index '{}' not found", name)));
        }
        if on_disk {
            self.manifests.delete(name).await?;
        }
        tracing::info!(index = %name, "Deleted index");
        Ok(())
    }

    pub fn get_index(&self, name: &str) -> Result<Arc<Index>> {
        self.indexes
            .get(name)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::not_found(format!("index '{}' not found", name)))
    }

    pub fn list_indexes(&self) -> Vec<IndexManifest> {
        let mut manifests: Vec<IndexManifest> =
            self.indexes.iter().map(|e| e.value().describe()).collect();
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        manifests
    }
}
