//! Background snapshot refresh
//!
//! Acknowledged writes land in a namespace's authoritative store but are
//! served to queries from an immutable snapshot. The refresher is the
//! propagation half of that contract: one background task per namespace
//! republishes the snapshot on an interval, which bounds the delay between
//! a write's acknowledgment and its visibility.
//!
//! The task holds only a weak reference to its namespace, so dropping the
//! namespace (namespace purge, index deletion) ends the task.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};

use crate::namespace::Namespace;

/// Configuration for visibility propagation
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Interval between snapshot refreshes in milliseconds. Zero disables
    /// the background task; writes then become visible only via `flush`.
    pub interval_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_ms: 100 }
    }
}

impl RefreshConfig {
    pub fn disabled() -> Self {
        Self { interval_ms: 0 }
    }

    /// Faster interval for tests
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self { interval_ms: 5 }
    }
}

/// Spawns and configures per-namespace refresh tasks
#[derive(Debug, Clone)]
pub struct RefreshManager {
    config: RefreshConfig,
}

impl RefreshManager {
    pub fn new(config: RefreshConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.interval_ms > 0
    }

    /// Start the refresh task for one namespace.
    pub fn start_for_namespace(&self, namespace: &Arc<Namespace>) {
        if !self.is_enabled() {
            return;
        }

        let weak: Weak<Namespace> = Arc::downgrade(namespace);
        let interval_ms = self.config.interval_ms;

        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(namespace) => namespace.refresh_if_stale().await,
                    None => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capacity::CapacityModel;
    use crate::query::QueryRequest;
    use crate::types::{DistanceMetric, Record};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_background_refresh_makes_writes_visible() {
        let dir = TempDir::new().unwrap();
        let namespace = Arc::new(
            Namespace::open(
                "ns1".to_string(),
                2,
                DistanceMetric::Cosine,
                CapacityModel::Serverless,
                dir.path(),
            )
            .await
            .unwrap(),
        );

        let manager = RefreshManager::new(RefreshConfig::for_testing());
        manager.start_for_namespace(&namespace);

        namespace
            .upsert(vec![Record {
                id: "a".to_string(),
                values: vec![1.0, 0.0],
                sparse_values: None,
                metadata: None,
            }])
            .await
            .unwrap();

        let request = QueryRequest {
            namespace: "ns1".to_string(),
            vector: Some(vec![1.0, 0.0]),
            sparse_vector: None,
            id: None,
            top_k: 1,
            filter: None,
            include_values: false,
            include_metadata: false,
            hybrid: false,
        };

        // Bounded propagation: visible within a few intervals
        let mut visible = false;
        for _ in 0..100 {
            time::sleep(Duration::from_millis(5)).await;
            let (matches, _) = namespace.query(&request).await.unwrap();
            if !matches.is_empty() {
                visible = true;
                break;
            }
        }
        assert!(visible, "write never became visible to queries");
    }

    #[tokio::test]
    async fn test_disabled_refresher_spawns_nothing() {
        let manager = RefreshManager::new(RefreshConfig::disabled());
        assert!(!manager.is_enabled());
    }
}
