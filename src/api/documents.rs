use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::models::{parse_category, AcceptedResponse, AddUrlRequest, CategoryQuery, ClearResponse};
use crate::service::validate_url;
use crate::state::AppState;

/// POST /api/documents/add - Ingest a URL in the background
pub async fn add_document(
    State(state): State<AppState>,
    Json(req): Json<AddUrlRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), (StatusCode, String)> {
    let url = validate_url(&req.url)?;
    let category = parse_category(req.category.as_deref())?.unwrap_or_default();

    let url = url.to_string();
    let rag = state.rag.clone();
    let task_url = url.clone();
    tokio::spawn(async move {
        if !rag.add_from_url(&task_url, category).await {
            tracing::warn!("Background ingest of {task_url} stored nothing");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "accepted",
            url,
            category,
        }),
    ))
}

/// DELETE /api/documents?category= - Clear one category, or everything
pub async fn clear_documents(
    State(state): State<AppState>,
    Query(params): Query<CategoryQuery>,
) -> Result<Json<ClearResponse>, (StatusCode, String)> {
    let category = parse_category(params.category.as_deref())?;
    let success = state.rag.clear_database(category).await;
    Ok(Json(ClearResponse { success }))
}
