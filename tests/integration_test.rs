//! Integration tests for the ingest → retrieve → answer pipeline.
//!
//! The embedder, generator and extractor are in-process fakes, so these
//! tests run without a network or a model.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use web_rag::answer::{GENERATION_ERROR, NO_RELEVANT_INFO};
use web_rag::chunking::WordTokenizer;
use web_rag::config::{CollectionMode, Config};
use web_rag::error::RagError;
use web_rag::extract::ContentExtractor;
use web_rag::llm::embeddings::Embedder;
use web_rag::llm::generate::{GenerationParams, Generator};
use web_rag::models::{Category, ContentType, ExtractedDocument};
use web_rag::service::RagService;

const VOCAB: &[&str] = &["rust", "ownership", "borrow", "tokio", "pasta", "garden"];

/// One dimension per vocabulary word plus one for everything else.
struct VocabEmbedder {
    fail: AtomicBool,
}

impl VocabEmbedder {
    fn dim() -> usize {
        VOCAB.len() + 1
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding provider unavailable");
        }
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; Self::dim()];
                for word in t.split_whitespace() {
                    let word = word
                        .trim_matches(|c: char| !c.is_alphanumeric())
                        .to_lowercase();
                    let slot = VOCAB
                        .iter()
                        .position(|w| *w == word)
                        .unwrap_or(VOCAB.len());
                    v[slot] += 1.0;
                }
                v
            })
            .collect())
    }
}

struct CountingGenerator {
    calls: AtomicUsize,
    last_prompt: Mutex<String>,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = prompt.to_string();
        Ok("Rust enforces ownership at compile time.".to_string())
    }
}

/// Serves configured pages and remembers non-empty results like a caching fetcher.
#[derive(Default)]
struct FakeExtractor {
    pages: Mutex<HashMap<String, ExtractedDocument>>,
    remembered: Mutex<HashMap<String, ExtractedDocument>>,
    fetches: AtomicUsize,
}

impl FakeExtractor {
    fn set(&self, url: &str, title: &str, blocks: &[&str]) {
        self.pages.lock().insert(
            url.to_string(),
            ExtractedDocument {
                title: title.to_string(),
                blocks: blocks.iter().map(|b| b.to_string()).collect(),
                content_type: ContentType::Web,
            },
        );
    }
}

#[async_trait]
impl ContentExtractor for FakeExtractor {
    async fn extract(&self, url: &str) -> anyhow::Result<ExtractedDocument> {
        if let Some(doc) = self.remembered.lock().get(url).cloned() {
            return Ok(doc);
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let doc = self
            .pages
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("fetch failed for {url}"))?;
        if !doc.blocks.is_empty() {
            self.remembered.lock().insert(url.to_string(), doc.clone());
        }
        Ok(doc)
    }

    fn forget(&self, url: &str) {
        self.remembered.lock().remove(url);
    }

    fn clear_cache(&self) {
        self.remembered.lock().clear();
    }
}

struct Harness {
    service: RagService,
    embedder: Arc<VocabEmbedder>,
    generator: Arc<CountingGenerator>,
    extractor: Arc<FakeExtractor>,
}

fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.data_dir = dir.to_path_buf();
    config.llm.embedding_dim = VocabEmbedder::dim();
    config.rag.chunk_size = 4;
    config.rag.chunk_overlap = 0;
    config.rag.similarity_threshold = 0.5;
    config
}

fn harness(config: Config) -> Harness {
    let embedder = Arc::new(VocabEmbedder {
        fail: AtomicBool::new(false),
    });
    let generator = Arc::new(CountingGenerator {
        calls: AtomicUsize::new(0),
        last_prompt: Mutex::new(String::new()),
    });
    let extractor = Arc::new(FakeExtractor::default());
    let service = RagService::new(
        config,
        embedder.clone(),
        generator.clone(),
        extractor.clone(),
        Arc::new(WordTokenizer::new()),
    )
    .unwrap();
    Harness {
        service,
        embedder,
        generator,
        extractor,
    }
}

const URL_A: &str = "https://example.org/a";

/// Twelve words → three 4-token chunks; only the first mentions rust ownership.
const PAGE_A: &str = "rust ownership rules memory \
                      cooking pasta needs water \
                      gardening tomatoes needs sunshine";

#[tokio::test]
async fn test_ingest_then_answer_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Page A", &[PAGE_A]);

    assert!(h.service.add_from_url(URL_A, Category::General).await);

    let stats = h.service.get_statistics(Some(Category::General));
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.sources[0].chunk_count, 3);
    assert_eq!(stats.sources[0].title, "Page A");

    let answer = h
        .service
        .generate_answer("rust ownership", Some(2), Some(Category::General), None)
        .await
        .unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].metadata.chunk_index, 0);
    assert_eq!(answer.sources[0].metadata.total_chunks, 3);
    assert!(answer.sources[0].similarity_score >= 0.5);
    assert_eq!(answer.answer, "Rust enforces ownership at compile time.");
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);

    let prompt = h.generator.last_prompt.lock().clone();
    assert!(prompt.contains("[Source 1: Page A (https://example.org/a)]"));
    assert!(prompt.contains("Question: rust ownership"));
}

#[tokio::test]
async fn test_empty_extraction_leaves_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Empty", &[]);

    assert!(!h.service.add_from_url(URL_A, Category::General).await);
    assert!(!h
        .service
        .add_from_url("https://example.org/missing", Category::General)
        .await);

    let stats = h.service.get_statistics(None);
    assert_eq!(stats.total_documents, 0);
    assert_eq!(stats.total_chunks, 0);
    assert!(!dir.path().join("sources.json").exists());
}

#[tokio::test]
async fn test_invalid_url_is_not_ingested() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set("ftp://example.org/a", "A", &[PAGE_A]);

    assert!(!h.service.add_from_url("ftp://example.org/a", Category::General).await);
    assert_eq!(h.service.get_statistics(None).total_chunks, 0);
}

#[tokio::test]
async fn test_empty_collection_answers_without_model() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));

    let answer = h
        .service
        .generate_answer("rust ownership", None, None, None)
        .await
        .unwrap();
    assert_eq!(answer.answer, NO_RELEVANT_INFO);
    assert!(answer.sources.is_empty());
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unrelated_query_skips_model() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Page A", &[PAGE_A]);
    assert!(h.service.add_from_url(URL_A, Category::General).await);

    let answer = h
        .service
        .generate_answer("tokio borrow", Some(3), None, None)
        .await
        .unwrap();
    assert_eq!(answer.answer, NO_RELEVANT_INFO);
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_clear_category_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Page A", &[PAGE_A]);
    h.extractor
        .set("https://example.org/code", "Code", &["tokio borrow checker rules"]);

    assert!(h.service.add_from_url(URL_A, Category::General).await);
    assert!(h
        .service
        .add_from_url("https://example.org/code", Category::Code)
        .await);

    assert!(h.service.clear_database(Some(Category::General)).await);

    let general = h.service.get_statistics(Some(Category::General));
    assert_eq!(general.total_documents, 0);
    assert_eq!(general.total_chunks, 0);

    let code = h.service.get_statistics(Some(Category::Code));
    assert_eq!(code.total_documents, 1);
    assert_eq!(code.total_chunks, 1);

    assert!(h.service.clear_database(None).await);
    let all = h.service.get_statistics(None);
    assert_eq!(all.total_documents, 0);
    assert_eq!(all.total_chunks, 0);
}

#[tokio::test]
async fn test_categories_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    for mode in [CollectionMode::PerCategory, CollectionMode::Single] {
        let mut config = test_config(&dir.path().join(format!("{mode:?}")));
        config.rag.collection_mode = mode;
        let h = harness(config);
        h.extractor.set(URL_A, "Page A", &[PAGE_A]);
        assert!(h.service.add_from_url(URL_A, Category::General).await);

        let answer = h
            .service
            .generate_answer("rust ownership", Some(2), Some(Category::Code), None)
            .await
            .unwrap();
        assert_eq!(answer.answer, NO_RELEVANT_INFO, "mode {mode:?}");

        let hits = h
            .service
            .search("rust ownership", Some(5), Some(Category::Code))
            .await
            .unwrap();
        assert!(hits.is_empty(), "mode {mode:?}");
    }
}

#[tokio::test]
async fn test_reingest_replaces_previous_vectors() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Page A", &[PAGE_A]);
    assert!(h.service.add_from_url(URL_A, Category::General).await);

    h.extractor.set(URL_A, "Page A v2", &["rust ownership rules"]);
    assert!(h.service.add_from_url(URL_A, Category::General).await);

    let stats = h.service.get_statistics(Some(Category::General));
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.total_chunks, 1);
    assert_eq!(stats.sources[0].title, "Page A v2");

    // Moving the URL to another category leaves nothing behind
    assert!(h.service.add_from_url(URL_A, Category::Code).await);
    assert_eq!(h.service.get_statistics(Some(Category::General)).total_chunks, 0);
    assert_eq!(h.service.get_statistics(Some(Category::Code)).total_chunks, 1);
}

#[tokio::test]
async fn test_readd_fetches_current_page() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Page A", &[PAGE_A]);
    assert!(h.service.add_from_url(URL_A, Category::General).await);

    h.extractor.set(URL_A, "Page A v2", &["rust ownership rules"]);
    assert!(h.service.add_from_url(URL_A, Category::General).await);
    assert_eq!(h.extractor.fetches.load(Ordering::SeqCst), 2);
    let stats = h.service.get_statistics(Some(Category::General));
    assert_eq!(stats.sources[0].title, "Page A v2");
    assert_eq!(stats.total_chunks, 1);

    // After a clear nothing remembered survives either
    assert!(h.service.clear_database(None).await);
    h.extractor.set(URL_A, "Page A v3", &[PAGE_A]);
    assert!(h.service.add_from_url(URL_A, Category::General).await);
    assert_eq!(h.extractor.fetches.load(Ordering::SeqCst), 3);
    let stats = h.service.get_statistics(Some(Category::General));
    assert_eq!(stats.sources[0].title, "Page A v3");
    assert_eq!(stats.total_chunks, 3);
}

#[tokio::test]
async fn test_retry_after_failed_ingest_reuses_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Page A", &[PAGE_A]);

    h.embedder.fail.store(true, Ordering::SeqCst);
    assert!(!h.service.add_from_url(URL_A, Category::General).await);
    h.embedder.fail.store(false, Ordering::SeqCst);
    assert!(h.service.add_from_url(URL_A, Category::General).await);

    assert_eq!(h.extractor.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(h.service.get_statistics(None).total_chunks, 3);
}

#[tokio::test]
async fn test_embedding_failure_keeps_previous_ingest() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Page A", &[PAGE_A]);
    assert!(h.service.add_from_url(URL_A, Category::General).await);

    h.embedder.fail.store(true, Ordering::SeqCst);
    h.extractor.set(URL_A, "Page A v2", &["rust ownership rules"]);
    assert!(!h.service.add_from_url(URL_A, Category::General).await);

    let stats = h.service.get_statistics(Some(Category::General));
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.sources[0].title, "Page A");

    // Query embedding fails too: degrade to the not-found answer
    let answer = h
        .service
        .generate_answer("rust ownership", None, None, None)
        .await
        .unwrap();
    assert_eq!(answer.answer, NO_RELEVANT_INFO);
    let hits = h.service.search("rust", None, None).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_validation_errors_surface() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));

    let err = h
        .service
        .generate_answer("   ", None, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let err = h
        .service
        .generate_answer("rust", Some(0), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let err = h
        .service
        .generate_answer("rust", Some(1), None, Some("bad model; rm"))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let err = h.service.search("rust", Some(1000), None).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));
}

#[tokio::test]
async fn test_state_survives_restart_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    {
        let h = harness(test_config(dir.path()));
        h.extractor.set(URL_A, "Page A", &[PAGE_A]);
        assert!(h.service.add_from_url(URL_A, Category::General).await);
        h.service.shutdown();
    }

    let reopened = harness(test_config(dir.path()));
    let stats = reopened.service.get_statistics(None);
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.total_chunks, 3);

    // A second instance writes; reload picks it up.
    let other = harness(test_config(dir.path()));
    assert!(other.service.clear_database(None).await);
    assert_eq!(reopened.service.get_statistics(None).total_chunks, 3);
    reopened.service.reload().await.unwrap();
    assert_eq!(reopened.service.get_statistics(None).total_chunks, 0);
    assert_eq!(reopened.service.get_statistics(None).total_documents, 0);
}

#[tokio::test]
async fn test_generation_after_shutdown_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(test_config(dir.path()));
    h.extractor.set(URL_A, "Page A", &[PAGE_A]);
    assert!(h.service.add_from_url(URL_A, Category::General).await);

    h.service.shutdown();
    let answer = h
        .service
        .generate_answer("rust ownership", Some(2), None, None)
        .await
        .unwrap();
    assert_eq!(answer.answer, GENERATION_ERROR);
    assert!(answer.sources.is_empty());
    assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
}
