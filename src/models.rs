use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RagError;

/// Partition of the vector store. Queries never cross categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[default]
    General,
    Code,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::General, Category::Code];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Code => "code",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "general" => Ok(Category::General),
            "code" => Ok(Category::Code),
            other => Err(RagError::validation(format!(
                "Unknown category '{other}' (expected 'general' or 'code')"
            ))),
        }
    }
}

/// Parse an optional category string coming from a request.
pub fn parse_category(raw: Option<&str>) -> Result<Option<Category>, RagError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Web,
    Pdf,
}

/// Metadata stored alongside every chunk and returned with every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_url: String,
    pub title: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    pub content_type: ContentType,
}

/// A bounded span of source text stored as one retrievable unit.
///
/// Identity is `(source_url, chunk_index)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Stable identifier derived from the chunk's identity.
    pub fn id(&self) -> String {
        format!(
            "{}::{}::{}",
            self.metadata.category, self.metadata.source_url, self.metadata.chunk_index
        )
    }
}

/// A chunk with its embedding, as held by a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVector {
    pub id: String,
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

/// A retrieval hit flowing through filtering and answer composition.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateResult {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the query, clamped to [0, 1]
    pub similarity_score: f32,
    /// Distinct words shared with the query
    pub keyword_overlap: usize,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Per-URL ingestion bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub url: String,
    pub title: String,
    pub chunk_count: usize,
    pub added_at: DateTime<Utc>,
    pub category: Category,
    pub content_type: ContentType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub sources: Vec<SourceEntry>,
}

/// Output of the content-extraction collaborator.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub title: String,
    /// Ordered raw text blocks
    pub blocks: Vec<String>,
    pub content_type: ContentType,
}

/// Source reference returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct SourceView {
    pub content: String,
    pub metadata: ChunkMetadata,
    pub relevance_score: f32,
}

impl From<&CandidateResult> for SourceView {
    fn from(c: &CandidateResult) -> Self {
        Self {
            content: c.content.clone(),
            metadata: c.metadata.clone(),
            relevance_score: c.similarity_score,
        }
    }
}

/// Grounded answer plus the sources it was grounded on
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<CandidateResult>,
}

/// Add-document request
#[derive(Debug, Clone, Deserialize)]
pub struct AddUrlRequest {
    pub url: String,
    pub category: Option<String>,
}

/// Search / answer request
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub k: Option<usize>,
    pub category: Option<String>,
    /// Overrides the configured chat model for this request
    pub model_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryQuery {
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<SourceView>,
}

impl From<Answer> for AnswerResponse {
    fn from(answer: Answer) -> Self {
        Self {
            sources: answer.sources.iter().map(SourceView::from).collect(),
            answer: answer.answer,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SourceView>,
}

/// Acknowledgement for a background ingest
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
    pub url: String,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub success: bool,
}
