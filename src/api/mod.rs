//! HTTP API server

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::Error;

pub mod handlers;
pub mod state;

pub use state::AppState;

/// Build the API router using the provided application state.
///
/// `request_timeout` bounds every request; a timed-out caller gets a 408
/// while any in-flight namespace write completes server-side untouched.
pub fn create_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/indexes",
            post(handlers::create_index).get(handlers::list_indexes),
        )
        .route(
            "/indexes/:index",
            get(handlers::describe_index).delete(handlers::delete_index),
        )
        .route("/indexes/:index/vectors/upsert", post(handlers::upsert))
        .route("/indexes/:index/vectors/update", post(handlers::update))
        .route("/indexes/:index/vectors/delete", post(handlers::delete))
        .route("/indexes/:index/vectors/fetch", post(handlers::fetch))
        .route("/indexes/:index/vectors/list", post(handlers::list_ids))
        .route("/indexes/:index/query", post(handlers::query))
        .route(
            "/indexes/:index/describe_index_stats",
            post(handlers::describe_index_stats),
        )
        .route("/indexes/:index/flush", post(handlers::flush))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Engine error mapped onto a transport status plus a machine-checkable
/// `code` and a human-readable `message`.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::DimensionMismatch { .. }
            | Error::InvalidRequest(_)
            | Error::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::UnsupportedOperation(_) => StatusCode::PRECONDITION_FAILED,
            Error::CapacityExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::Serialization(_) | Error::Io(_) | Error::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            tracing::error!(code = self.0.kind(), error = %self.0, "Request failed");
        }

        let body = Json(serde_json::json!({
            "code": self.0.kind(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
