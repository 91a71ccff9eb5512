//! API handlers

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, AppState};
use crate::capacity::CapacityModel;
use crate::manifest::IndexManifest;
use crate::query::{Filter, QueryRequest, QueryResponse};
use crate::types::{
    DistanceMetric, IndexStats, Metadata, Record, RecordId, SparseVector, Usage, Vector,
};
use crate::wal::DeleteSelector;
use crate::Error;

/// Health check with catalog summary
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        indexes: state.manager.list_indexes().len(),
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub indexes: usize,
}

/// Create an index
pub async fn create_index(
    State(state): State<AppState>,
    Json(payload): Json<CreateIndexRequest>,
) -> Result<Json<IndexManifest>, ApiError> {
    let index = state
        .manager
        .create_index(
            payload.name,
            payload.dimension,
            payload.metric,
            payload.capacity,
        )
        .await?;
    Ok(Json(index.describe()))
}

#[derive(Debug, Deserialize)]
pub struct CreateIndexRequest {
    pub name: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
    #[serde(default)]
    pub capacity: CapacityModel,
}

/// List index descriptors
pub async fn list_indexes(State(state): State<AppState>) -> Json<ListIndexesResponse> {
    Json(ListIndexesResponse {
        indexes: state.manager.list_indexes(),
    })
}

#[derive(Debug, Serialize)]
pub struct ListIndexesResponse {
    pub indexes: Vec<IndexManifest>,
}

/// Describe one index
pub async fn describe_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> Result<Json<IndexManifest>, ApiError> {
    let index = state.manager.get_index(&index)?;
    Ok(Json(index.describe()))
}

/// Destroy an index and everything in it
pub async fn delete_index(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> Result<Json<Empty>, ApiError> {
    state.manager.delete_index(&index).await?;
    Ok(Json(Empty {}))
}

#[derive(Debug, Serialize)]
pub struct Empty {}

/// Upsert records into a namespace
pub async fn upsert(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(payload): Json<UpsertRequest>,
) -> Result<Json<UpsertResponse>, ApiError> {
    let index = state.manager.get_index(&index)?;
    let upserted_count = index.upsert(&payload.namespace, payload.records).await?;
    Ok(Json(UpsertResponse { upserted_count }))
}

#[derive(Debug, Deserialize)]
pub struct UpsertRequest {
    pub namespace: String,
    pub records: Vec<Record>,
}

#[derive(Debug, Serialize)]
pub struct UpsertResponse {
    pub upserted_count: usize,
}

/// Partially update one record
pub async fn update(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(payload): Json<UpdateRequest>,
) -> Result<Json<Empty>, ApiError> {
    let index = state.manager.get_index(&index)?;
    index
        .update(
            &payload.namespace,
            payload.id,
            payload.values,
            payload.sparse_values,
            payload.set_metadata,
        )
        .await?;
    Ok(Json(Empty {}))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub namespace: String,
    pub id: RecordId,
    #[serde(default)]
    pub values: Option<Vector>,
    #[serde(default)]
    pub sparse_values: Option<SparseVector>,
    #[serde(default)]
    pub set_metadata: Option<Metadata>,
}

/// Delete records by IDs, by filter, or namespace-wide
pub async fn delete(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(payload): Json<DeleteRequest>,
) -> Result<Json<Empty>, ApiError> {
    let index = state.manager.get_index(&index)?;
    let selector = payload.selector()?;
    index.delete(&payload.namespace, selector).await?;
    Ok(Json(Empty {}))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub namespace: String,
    #[serde(default)]
    pub ids: Option<Vec<RecordId>>,
    #[serde(default)]
    pub filter: Option<Filter>,
    #[serde(default)]
    pub delete_all: bool,
}

impl DeleteRequest {
    /// The three modes are mutually exclusive.
    fn selector(&self) -> Result<DeleteSelector, Error> {
        let modes =
            self.ids.is_some() as u8 + self.filter.is_some() as u8 + self.delete_all as u8;
        if modes != 1 {
            return Err(Error::invalid_request(
                "specify exactly one of 'ids', 'filter' or 'delete_all'",
            ));
        }
        Ok(if let Some(ids) = &self.ids {
            DeleteSelector::Ids(ids.clone())
        } else if let Some(filter) = &self.filter {
            DeleteSelector::Filter(filter.clone())
        } else {
            DeleteSelector::All
        })
    }
}

/// Fetch records by ID
pub async fn fetch(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(payload): Json<FetchRequest>,
) -> Result<Json<FetchResponse>, ApiError> {
    let index = state.manager.get_index(&index)?;
    let (records, usage) = index.fetch(&payload.namespace, &payload.ids).await?;
    Ok(Json(FetchResponse {
        records,
        namespace: payload.namespace,
        usage,
    }))
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub namespace: String,
    pub ids: Vec<RecordId>,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    pub records: HashMap<RecordId, Record>,
    pub namespace: String,
    pub usage: Usage,
}

/// Page through record IDs
pub async fn list_ids(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(payload): Json<ListRequest>,
) -> Result<Json<ListResponse>, ApiError> {
    let index = state.manager.get_index(&index)?;
    let page = index
        .list(
            &payload.namespace,
            payload.prefix.as_deref(),
            payload.limit,
            payload.pagination_token.as_deref(),
        )
        .await?;
    Ok(Json(ListResponse {
        ids: page.ids,
        pagination_token: page.pagination_token,
        namespace: payload.namespace,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListRequest {
    pub namespace: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub pagination_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub ids: Vec<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination_token: Option<String>,
    pub namespace: String,
}

/// Nearest-neighbor query
pub async fn query(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let index = state.manager.get_index(&index)?;
    let response = index.query(&payload).await?;
    Ok(Json(response))
}

/// Aggregate statistics, optionally filtered
pub async fn describe_index_stats(
    State(state): State<AppState>,
    Path(index): Path<String>,
    Json(payload): Json<StatsRequest>,
) -> Result<Json<IndexStats>, ApiError> {
    let index = state.manager.get_index(&index)?;
    let stats = index.stats(payload.filter.as_ref()).await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize, Default)]
pub struct StatsRequest {
    #[serde(default)]
    pub filter: Option<Filter>,
}

/// Make all acknowledged writes visible to queries immediately
pub async fn flush(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> Result<Json<Empty>, ApiError> {
    let index = state.manager.get_index(&index)?;
    index.flush().await;
    Ok(Json(Empty {}))
}
