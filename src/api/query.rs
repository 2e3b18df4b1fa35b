use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::models::{parse_category, AnswerResponse, QueryRequest, SearchResponse, SourceView};
use crate::state::AppState;

/// POST /api/answer - Retrieve, filter and generate a grounded answer
pub async fn answer(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<AnswerResponse>, (StatusCode, String)> {
    let category = parse_category(req.category.as_deref())?;
    let answer = state
        .rag
        .generate_answer(&req.query, req.k, category, req.model_type.as_deref())
        .await?;
    Ok(Json(AnswerResponse::from(answer)))
}

/// POST /api/search - Raw similarity hits, no filtering or generation
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let category = parse_category(req.category.as_deref())?;
    let hits = state.rag.search(&req.query, req.k, category).await?;
    Ok(Json(SearchResponse {
        query: req.query.trim().to_string(),
        results: hits.iter().map(SourceView::from).collect(),
    }))
}
