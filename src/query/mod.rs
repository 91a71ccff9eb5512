//! Query request/response types

use serde::{Deserialize, Serialize};

use crate::types::{Metadata, RecordId, SparseVector, Usage, Vector};
use crate::{Error, Result};

pub mod filter;

pub use filter::{Filter, FilterCondition, FilterOp};

/// Largest accepted `top_k`.
pub const MAX_TOP_K: usize = 10_000;

/// Query request
///
/// Exactly one of `vector` or `id` must be supplied. `sparse_vector` may
/// accompany a dense vector (with `hybrid` set) or stand alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_vector: Option<SparseVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub include_values: bool,
    #[serde(default)]
    pub include_metadata: bool,
    /// Add the sparse inner product to the dense score.
    #[serde(default)]
    pub hybrid: bool,
}

fn default_top_k() -> usize {
    10
}

impl QueryRequest {
    /// Structural validation independent of namespace state.
    pub fn validate(&self) -> Result<()> {
        match (&self.vector, &self.id, &self.sparse_vector) {
            (Some(_), Some(_), _) => {
                return Err(Error::invalid_request(
                    "supply either 'vector' or 'id', not both",
                ))
            }
            (None, None, None) => {
                return Err(Error::invalid_request(
                    "one of 'vector', 'id' or 'sparse_vector' is required",
                ))
            }
            (None, Some(_), Some(_)) => {
                return Err(Error::invalid_request(
                    "'sparse_vector' cannot accompany a query by 'id'",
                ))
            }
            _ => {}
        }

        if self.hybrid && (self.vector.is_none() || self.sparse_vector.is_none()) {
            return Err(Error::invalid_request(
                "hybrid scoring requires both 'vector' and 'sparse_vector'",
            ));
        }

        if self.top_k == 0 || self.top_k > MAX_TOP_K {
            return Err(Error::invalid_request(format!(
                "top_k must be between 1 and {}",
                MAX_TOP_K
            )));
        }

        if let Some(filter) = &self.filter {
            filter.validate()?;
        }

        Ok(())
    }
}

/// Single query match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: RecordId,
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_values: Option<SparseVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// Query response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub matches: Vec<Match>,
    pub namespace: String,
    pub usage: Usage,
}
