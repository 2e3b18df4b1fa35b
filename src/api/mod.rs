pub mod documents;
pub mod query;
pub mod stats;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// All API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/documents/add", post(documents::add_document))
        .route("/api/documents", delete(documents::clear_documents))
        .route("/api/search", post(query::search))
        .route("/api/answer", post(query::answer))
        .route("/api/stats", get(stats::stats))
        .route("/api/health", get(stats::health))
        .with_state(state)
}
