//! API server state

use std::sync::Arc;

use crate::index::IndexManager;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    /// Index catalog
    pub manager: Arc<IndexManager>,
}

impl AppState {
    pub fn new(manager: Arc<IndexManager>) -> Self {
        Self { manager }
    }
}
