//! The retrieval-augmented QA pipeline as one explicitly constructed object.
//!
//! ```text
//!  URL ──► ContentExtractor ──► Chunker ──► VectorStoreAdapter ──► SourceLedger
//!
//!  query ──► embed ──► MMR search ──► RelevanceFilter ──► AnswerComposer ──► answer + sources
//! ```
//!
//! Backend failures are logged and turned into safe defaults here; only
//! validation errors leave the service as errors.

use chrono::Utc;
use std::sync::Arc;

use crate::answer::{AnswerComposer, PromptTemplate};
use crate::chunking::{Chunker, TokenCodec};
use crate::config::Config;
use crate::error::RagError;
use crate::extract::ContentExtractor;
use crate::ledger::SourceLedger;
use crate::llm::embeddings::Embedder;
use crate::llm::generate::Generator;
use crate::models::{Answer, CandidateResult, Category, Chunk, ChunkMetadata, Statistics};
use crate::search::adapter::VectorStoreAdapter;
use crate::search::filter::filter_candidates;

const MAX_QUERY_LEN: usize = 2000;
const MAX_MODEL_TYPE_LEN: usize = 128;

pub struct RagService {
    config: Config,
    chunker: Chunker,
    store: VectorStoreAdapter,
    ledger: SourceLedger,
    composer: AnswerComposer,
    extractor: Arc<dyn ContentExtractor>,
}

impl RagService {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        extractor: Arc<dyn ContentExtractor>,
        codec: Arc<dyn TokenCodec>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(config.collections_dir())?;

        let chunker = Chunker::new(codec, config.rag.chunk_size, config.rag.chunk_overlap);
        let store = VectorStoreAdapter::open(&config, embedder)?;
        let ledger = SourceLedger::open(&config.ledger_path())?;
        let composer = AnswerComposer::new(generator, config.generation.clone());

        Ok(Self {
            config,
            chunker,
            store,
            ledger,
            composer,
            extractor,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingest a URL. Returns false when nothing was stored.
    pub async fn add_from_url(&self, url: &str, category: Category) -> bool {
        match self.ingest(url, category).await {
            Ok(n) => {
                tracing::info!("Ingested {url} into '{category}': {n} chunks");
                true
            }
            Err(e) => {
                tracing::warn!("Ingest of {url} into '{category}' failed: {e}");
                false
            }
        }
    }

    async fn ingest(&self, url: &str, category: Category) -> Result<usize, RagError> {
        let url = validate_url(url)?.to_string();
        let url = url.as_str();

        // A re-add must see the page as it is now, not a remembered copy.
        let prior = self.ledger.get(url);
        if prior.is_some() {
            self.extractor.forget(url);
        }

        let doc = self.extractor.extract(url).await.map_err(|e| {
            tracing::warn!("Extraction failed for {url}: {e:#}");
            RagError::Extraction {
                url: url.to_string(),
            }
        })?;
        if doc.blocks.is_empty() {
            return Err(RagError::Extraction {
                url: url.to_string(),
            });
        }

        let text = doc.blocks.join("\n\n");
        let chunker = self.chunker.clone();
        let pieces = tokio::task::spawn_blocking(move || chunker.chunk(&text))
            .await
            .map_err(|e| RagError::StoreWrite(format!("chunking task failed: {e}")))?;
        if pieces.is_empty() {
            return Err(RagError::Extraction {
                url: url.to_string(),
            });
        }

        let total_chunks = pieces.len();
        let timestamp = Utc::now();
        let chunks: Vec<Chunk> = pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| Chunk {
                text,
                metadata: ChunkMetadata {
                    source_url: url.to_string(),
                    title: doc.title.clone(),
                    chunk_index,
                    total_chunks,
                    timestamp,
                    category,
                    content_type: doc.content_type,
                },
            })
            .collect();

        // Vectors from an earlier ingest of this URL are replaced, wherever they were filed.
        let mut stale = vec![category];
        if let Some(prior) = prior {
            if prior.category != category {
                stale.push(prior.category);
            }
        }

        let written = self.store.replace_source(url, &stale, chunks).await?;

        self.ledger
            .record(url, &doc.title, written, category, doc.content_type)
            .map_err(|e| RagError::StoreWrite(format!("ledger write failed: {e:#}")))?;
        Ok(written)
    }

    /// Answer `query` from the documents of `category`.
    ///
    /// Only validation problems are returned as errors; every backend
    /// failure degrades to one of the fixed answers.
    pub async fn generate_answer(
        &self,
        query: &str,
        k: Option<usize>,
        category: Option<Category>,
        model_type: Option<&str>,
    ) -> Result<Answer, RagError> {
        let query = validate_query(query)?;
        let k = validate_k(k.unwrap_or(self.config.rag.default_k), self.config.rag.max_k)?;
        let model = model_type.map(validate_model_type).transpose()?;
        let category = category.unwrap_or_default();
        let rag = &self.config.rag;

        let filtered = match self.store.embed_query(query).await {
            Ok(query_embedding) => {
                let candidates = self
                    .store
                    .search_by_embedding(
                        category,
                        &query_embedding,
                        k,
                        rag.fetch_k,
                        rag.diversity_weight,
                    )
                    .await;
                let retrieved = candidates.len();
                let kept =
                    filter_candidates(candidates, query, &query_embedding, rag.similarity_threshold);
                tracing::info!(
                    "Query in '{category}': {retrieved} retrieved, {} after relevance filter",
                    kept.len()
                );
                kept
            }
            Err(e) => {
                tracing::warn!("Search in '{category}' failed, answering without sources: {e}");
                Vec::new()
            }
        };

        Ok(self
            .composer
            .compose(query, filtered, PromptTemplate::from(category), model)
            .await)
    }

    /// Raw scored hits without diversity re-ranking or filtering.
    pub async fn search(
        &self,
        query: &str,
        k: Option<usize>,
        category: Option<Category>,
    ) -> Result<Vec<CandidateResult>, RagError> {
        let query = validate_query(query)?;
        let k = validate_k(k.unwrap_or(self.config.rag.default_k), self.config.rag.max_k)?;
        let category = category.unwrap_or_default();

        match self.store.search_with_scores(category, query, k).await {
            Ok(hits) => Ok(hits),
            Err(e) => {
                tracing::warn!("Search in '{category}' failed: {e}");
                Ok(Vec::new())
            }
        }
    }

    /// Delete stored documents of one category, or of all categories.
    pub async fn clear_database(&self, category: Option<Category>) -> bool {
        let scope = category.map_or("all categories".to_string(), |c| format!("'{c}'"));

        if let Err(e) = self.store.clear(category).await {
            tracing::error!("Clearing {scope} failed: {e}");
            return false;
        }
        if let Err(e) = self.ledger.remove_category(category) {
            tracing::error!("Resetting ledger for {scope} failed: {e:#}");
            return false;
        }
        self.extractor.clear_cache();
        tracing::info!("Cleared {scope}");
        true
    }

    /// Ledger entries plus the live chunk count of the store.
    pub fn get_statistics(&self, category: Option<Category>) -> Statistics {
        let sources = self.ledger.entries(category);
        Statistics {
            total_documents: sources.len(),
            total_chunks: self.store.count(category),
            sources,
        }
    }

    /// Re-read collections and the ledger from disk.
    pub async fn reload(&self) -> anyhow::Result<()> {
        self.store.reload().await?;
        self.ledger.reload()?;
        tracing::info!(
            "Reloaded: {} documents, {} chunks",
            self.ledger.entries(None).len(),
            self.store.count(None)
        );
        Ok(())
    }

    /// Persist the ledger and stop accepting generations.
    pub fn shutdown(&self) {
        self.composer.close();
        if let Err(e) = self.ledger.persist() {
            tracing::error!("Failed to persist source ledger on shutdown: {e:#}");
        }
        tracing::info!("RAG service shut down");
    }
}

// ─── Validation ──────────────────────────────────────────

pub fn validate_url(url: &str) -> Result<url::Url, RagError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(RagError::validation("URL is required"));
    }
    let parsed =
        url::Url::parse(url).map_err(|e| RagError::validation(format!("Invalid URL: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(RagError::validation("Only http:// and https:// URLs are allowed"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(RagError::validation("URL must have a host"));
    }
    Ok(parsed)
}

pub fn validate_query(query: &str) -> Result<&str, RagError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(RagError::validation("Query is required"));
    }
    if query.chars().count() > MAX_QUERY_LEN {
        return Err(RagError::validation(format!(
            "Query exceeds {MAX_QUERY_LEN} characters"
        )));
    }
    Ok(query)
}

pub fn validate_k(k: usize, max_k: usize) -> Result<usize, RagError> {
    if k == 0 || k > max_k {
        return Err(RagError::validation(format!("k must be within 1..={max_k}")));
    }
    Ok(k)
}

pub fn validate_model_type(model: &str) -> Result<String, RagError> {
    let model = model.trim();
    if model.is_empty() || model.len() > MAX_MODEL_TYPE_LEN {
        return Err(RagError::validation(format!(
            "model_type must be 1..={MAX_MODEL_TYPE_LEN} characters"
        )));
    }
    if !model
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '/' | '-'))
    {
        return Err(RagError::validation("model_type contains invalid characters"));
    }
    Ok(model.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.org/a").is_ok());
        assert!(validate_url("  http://example.org  ").is_ok());
        assert!(validate_url("").is_err());
        assert!(validate_url("ftp://example.org/file").is_err());
        assert!(validate_url("file:///etc/passwd").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_validate_query() {
        assert_eq!(validate_query("  what is rust?  ").unwrap(), "what is rust?");
        assert!(validate_query("   ").is_err());
        assert!(validate_query(&"a".repeat(MAX_QUERY_LEN)).is_ok());
        assert!(validate_query(&"a".repeat(MAX_QUERY_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_k() {
        assert_eq!(validate_k(3, 20).unwrap(), 3);
        assert!(validate_k(0, 20).is_err());
        assert!(validate_k(21, 20).is_err());
    }

    #[test]
    fn test_validate_model_type() {
        assert_eq!(validate_model_type("llama3.2:1b").unwrap(), "llama3.2:1b");
        assert!(validate_model_type("org/model-name_v2").is_ok());
        assert!(validate_model_type("").is_err());
        assert!(validate_model_type("rm -rf /").is_err());
        assert!(validate_model_type(&"m".repeat(MAX_MODEL_TYPE_LEN + 1)).is_err());
    }

    #[test]
    fn test_validation_errors_are_client_errors() {
        let err = validate_k(0, 5).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
