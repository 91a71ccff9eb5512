//! Index manifest persistence
//!
//! Each index is described by a small JSON manifest in its directory under
//! the data root. Manifests are what survive a restart: `IndexManager`
//! rebuilds its catalog by scanning them, then replays each namespace WAL.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capacity::CapacityModel;
use crate::types::DistanceMetric;
use crate::{Error, Result};

const MANIFEST_FILE: &str = "manifest.json";

/// Immutable descriptor of one index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u64,
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub capacity: CapacityModel,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    pub fn new(
        name: String,
        dimension: usize,
        metric: DistanceMetric,
        capacity: CapacityModel,
    ) -> Self {
        Self {
            version: 1,
            name,
            dimension,
            metric,
            capacity,
            created_at: Utc::now(),
        }
    }
}

/// Loads and saves index manifests under the data root
pub struct ManifestManager {
    root: PathBuf,
}

impl ManifestManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one index's manifest and namespaces.
    pub fn index_dir(&self, index: &str) -> PathBuf {
        self.root.join("indexes").join(index)
    }

    fn manifest_path(&self, index: &str) -> PathBuf {
        self.index_dir(index).join(MANIFEST_FILE)
    }

    pub async fn exists(&self, index: &str) -> bool {
        tokio::fs::try_exists(self.manifest_path(index))
            .await
            .unwrap_or(false)
    }

    /// Persist a new index's manifest. Fails if the index already exists.
    pub async fn create(&self, manifest: &IndexManifest) -> Result<()> {
        if self.exists(&manifest.name).await {
            return Err(Error::AlreadyExists(format!(
                "index '{}' already exists",
                manifest.name
            )));
        }
        tokio::fs::create_dir_all(self.index_dir(&manifest.name)).await?;
        self.save(manifest).await
    }

    /// Write the manifest atomically: temp file then rename.
    pub async fn save(&self, manifest: &IndexManifest) -> Result<()> {
        let path = self.manifest_path(&manifest.name);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(manifest)?;
        tokio::fs::write(&tmp, json.as_bytes()).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn load(&self, index: &str) -> Result<IndexManifest> {
        let data = tokio::fs::read(self.manifest_path(index))
            .await
            .map_err(|_| Error::not_found(format!("index '{}' not found", index)))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Remove an index's whole directory: manifest, namespaces, WALs.
    pub async fn delete(&self, index: &str) -> Result<()> {
        let dir = self.index_dir(index);
        if !self.exists(index).await {
            return Err(Error::not_found(format!("index '{}' not found", index)));
        }
        tokio::fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    /// Names of every index with a manifest on disk, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let indexes_dir = self.root.join("indexes");
        if !tokio::fs::try_exists(&indexes_dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&indexes_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.join(MANIFEST_FILE).exists() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Directory holding one namespace's WAL within an index.
    pub fn namespace_dir(&self, index: &str, namespace: &str) -> PathBuf {
        self.index_dir(index).join("namespaces").join(namespace)
    }

    /// Names of every namespace directory present for an index, sorted.
    pub async fn list_namespaces(&self, index: &str) -> Result<Vec<String>> {
        let dir = self.index_dir(index).join("namespaces");
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(name: &str) -> IndexManifest {
        IndexManifest::new(
            name.to_string(),
            128,
            DistanceMetric::Cosine,
            CapacityModel::Serverless,
        )
    }

    #[tokio::test]
    async fn test_create_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let manager = ManifestManager::new(dir.path());

        manager.create(&manifest("movies")).await.unwrap();
        let loaded = manager.load("movies").await.unwrap();
        assert_eq!(loaded.name, "movies");
        assert_eq!(loaded.dimension, 128);
        assert_eq!(loaded.metric, DistanceMetric::Cosine);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = ManifestManager::new(dir.path());

        manager.create(&manifest("movies")).await.unwrap();
        let err = manager.create(&manifest("movies")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let dir = TempDir::new().unwrap();
        let manager = ManifestManager::new(dir.path());

        manager.create(&manifest("a")).await.unwrap();
        manager.create(&manifest("b")).await.unwrap();
        assert_eq!(manager.list().await.unwrap(), vec!["a", "b"]);

        manager.delete("a").await.unwrap();
        assert_eq!(manager.list().await.unwrap(), vec!["b"]);
        assert!(matches!(
            manager.load("a").await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            manager.delete("a").await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_namespace_dirs() {
        let dir = TempDir::new().unwrap();
        let manager = ManifestManager::new(dir.path());
        manager.create(&manifest("movies")).await.unwrap();

        assert!(manager.list_namespaces("movies").await.unwrap().is_empty());

        let ns_dir = manager.namespace_dir("movies", "ns1");
        tokio::fs::create_dir_all(&ns_dir).await.unwrap();
        assert_eq!(
            manager.list_namespaces("movies").await.unwrap(),
            vec!["ns1"]
        );
    }
}
