//! Core types for quiver

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Error, Result};

/// Record ID type: opaque string, unique within a namespace
pub type RecordId = String;

/// Dense vector type
pub type Vector = Vec<f32>;

/// Metadata mapping attached to a record
pub type Metadata = HashMap<String, MetadataValue>;

/// Metadata value types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    StringArray(Vec<String>),
}

/// Sparse companion vector: parallel index/value lists, indices strictly
/// increasing within a record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn new(indices: Vec<u32>, values: Vec<f32>) -> Self {
        Self { indices, values }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterate (index, value) pairs in index order.
    pub fn pairs(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

/// Record represents a single stored vector with its companions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub values: Vector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_values: Option<SparseVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Distance metric for vector search
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

impl DistanceMetric {
    /// Euclidean ranks by ascending distance; the similarity metrics rank
    /// by descending score.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, DistanceMetric::Euclidean)
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::DotProduct => "dotproduct",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "dotproduct" => Ok(DistanceMetric::DotProduct),
            other => Err(Error::invalid_request(format!(
                "unknown distance metric: {}",
                other
            ))),
        }
    }
}

/// Per-namespace statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NamespaceStats {
    pub record_count: usize,
}

/// Index-level statistics aggregated across namespaces
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexStats {
    pub namespaces: HashMap<String, NamespaceStats>,
    pub dimension: usize,
    pub index_fullness: f32,
    pub total_record_count: usize,
}

/// Usage accounting attached to read responses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Usage {
    pub read_units: u64,
}

impl Usage {
    /// One read unit per thousand records scanned, minimum one per call.
    pub fn for_scan(scanned: usize) -> Self {
        Self {
            read_units: (scanned as u64).div_ceil(1000).max(1),
        }
    }
}
