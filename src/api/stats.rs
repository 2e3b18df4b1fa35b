use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::models::{parse_category, CategoryQuery, Statistics};
use crate::state::AppState;

/// GET /api/stats?category= - Ledger entries and live chunk count
pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<CategoryQuery>,
) -> Result<Json<Statistics>, (StatusCode, String)> {
    let category = parse_category(params.category.as_deref())?;
    Ok(Json(state.rag.get_statistics(category)))
}

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
