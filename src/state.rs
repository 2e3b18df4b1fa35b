use anyhow::Context;
use std::sync::Arc;

use crate::chunking::{HfTokenizer, TokenCodec, WordTokenizer};
use crate::config::Config;
use crate::extract::HttpExtractor;
use crate::llm::embeddings::HttpEmbedder;
use crate::llm::generate::HttpGenerator;
use crate::service::RagService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<RagService>,
}

impl AppState {
    /// Wire the HTTP-backed collaborators described by `config`.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(
                config.generation.timeout_secs.saturating_add(10),
            ))
            .build()?;

        let codec: Arc<dyn TokenCodec> = match &config.rag.tokenizer_path {
            Some(path) => {
                tracing::info!("Loading tokenizer from {}", path.display());
                Arc::new(HfTokenizer::from_file(path)?)
            }
            None => {
                tracing::warn!("RAG_TOKENIZER_PATH not set, chunking on whitespace words");
                Arc::new(WordTokenizer::new())
            }
        };

        let embedder = Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let generator = Arc::new(HttpGenerator::new(http_client, config.llm.clone()));
        let extractor = Arc::new(HttpExtractor::new(&config.extract)?);

        let rag = RagService::new(config, embedder, generator, extractor, codec)
            .context("Failed to initialise RAG service")?;
        Ok(Self::from_service(Arc::new(rag)))
    }

    pub fn from_service(rag: Arc<RagService>) -> Self {
        Self { rag }
    }
}
