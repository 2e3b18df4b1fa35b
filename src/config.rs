use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where collections and the source ledger are stored
    pub data_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Chunking and retrieval settings
    pub rag: RagConfig,
    /// Generation bounds and worker pool size
    pub generation: GenerationConfig,
    /// Content extraction settings
    pub extract: ExtractConfig,
}

/// How categories map onto durable collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// One collection directory per category.
    PerCategory,
    /// One shared collection; the category is still enforced as a filter.
    Single,
}

impl FromStr for CollectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_category" | "category" => Ok(CollectionMode::PerCategory),
            "single" => Ok(CollectionMode::Single),
            other => Err(format!("unknown collection mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for answer generation
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension
    pub embedding_dim: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub collection_mode: CollectionMode,
    /// `tokenizer.json` of the embedding model. Falls back to word tokens when unset.
    pub tokenizer_path: Option<PathBuf>,
    /// Chunk window, in tokens
    pub chunk_size: usize,
    /// Tokens shared with the previous chunk
    pub chunk_overlap: usize,
    pub default_k: usize,
    pub max_k: usize,
    /// Candidate pool handed to MMR selection
    pub fetch_k: usize,
    /// MMR weight: 1.0 = pure similarity, 0.0 = pure diversity
    pub diversity_weight: f32,
    /// Minimum query similarity a source needs to survive filtering
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_length: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Concurrent generations allowed per model instance
    pub max_concurrent: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub timeout_secs: u64,
    /// Text blocks shorter than this (in chars) are dropped
    pub min_text_length: usize,
    pub user_agent: String,
    /// Extracted documents kept in memory; 0 disables the cache
    pub cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8000".to_string(),
            llm: LlmConfig::default(),
            rag: RagConfig::default(),
            generation: GenerationConfig::default(),
            extract: ExtractConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama3.2:1b".to_string(),
            embedding_model: "all-minilm".to_string(),
            api_key: None,
            embedding_dim: 384,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            collection_mode: CollectionMode::PerCategory,
            tokenizer_path: None,
            chunk_size: 256,
            chunk_overlap: 32,
            default_k: 3,
            max_k: 20,
            fetch_k: 20,
            diversity_weight: 0.5,
            similarity_threshold: 0.5,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 300,
            temperature: 0.7,
            top_p: 0.9,
            max_concurrent: 1,
            timeout_secs: 120,
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            min_text_length: 50,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36"
                .to_string(),
            cache_size: 100,
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("RAG_BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Some(dim) = env_parse("LLM_EMBEDDING_DIM") {
            config.llm.embedding_dim = dim;
        }

        if let Some(mode) = env_parse("RAG_COLLECTION_MODE") {
            config.rag.collection_mode = mode;
        }
        if let Ok(path) = std::env::var("RAG_TOKENIZER_PATH") {
            config.rag.tokenizer_path = Some(PathBuf::from(path));
        }
        if let Some(v) = env_parse("RAG_CHUNK_SIZE") {
            config.rag.chunk_size = v;
        }
        if let Some(v) = env_parse("RAG_CHUNK_OVERLAP") {
            config.rag.chunk_overlap = v;
        }
        if let Some(v) = env_parse("RAG_DEFAULT_K") {
            config.rag.default_k = v;
        }
        if let Some(v) = env_parse("RAG_MAX_K") {
            config.rag.max_k = v;
        }
        if let Some(v) = env_parse("RAG_FETCH_K") {
            config.rag.fetch_k = v;
        }
        if let Some(v) = env_parse("RAG_DIVERSITY_WEIGHT") {
            config.rag.diversity_weight = v;
        }
        if let Some(v) = env_parse("RAG_SIMILARITY_THRESHOLD") {
            config.rag.similarity_threshold = v;
        }

        if let Some(v) = env_parse("GEN_MAX_LENGTH") {
            config.generation.max_length = v;
        }
        if let Some(v) = env_parse("GEN_TEMPERATURE") {
            config.generation.temperature = v;
        }
        if let Some(v) = env_parse("GEN_TOP_P") {
            config.generation.top_p = v;
        }
        if let Some(v) = env_parse("GEN_MAX_CONCURRENT") {
            config.generation.max_concurrent = v;
        }
        if let Some(v) = env_parse::<u64>("GEN_TIMEOUT_SECS") {
            config.generation.timeout_secs = v.max(1);
        }

        if let Some(v) = env_parse("EXTRACT_TIMEOUT_SECS") {
            config.extract.timeout_secs = v;
        }
        if let Some(v) = env_parse("EXTRACT_MIN_TEXT_LEN") {
            config.extract.min_text_length = v;
        }
        if let Ok(ua) = std::env::var("EXTRACT_USER_AGENT") {
            config.extract.user_agent = ua;
        }
        if let Some(v) = env_parse("EXTRACT_CACHE_SIZE") {
            config.extract.cache_size = v;
        }

        config
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let rag = &self.rag;
        if rag.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than zero");
        }
        if rag.chunk_overlap >= rag.chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                rag.chunk_overlap,
                rag.chunk_size
            );
        }
        if rag.max_k == 0 || rag.default_k == 0 || rag.default_k > rag.max_k {
            anyhow::bail!("default_k must be within 1..={}", rag.max_k);
        }
        if !(0.0..=1.0).contains(&rag.diversity_weight) {
            anyhow::bail!("diversity_weight must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&rag.similarity_threshold) {
            anyhow::bail!("similarity_threshold must be within [0, 1]");
        }
        if !(self.generation.top_p > 0.0 && self.generation.top_p <= 1.0) {
            anyhow::bail!("top_p must be within (0, 1]");
        }
        if self.generation.max_concurrent == 0 {
            anyhow::bail!("generation pool needs at least one slot");
        }
        if self.llm.embedding_dim == 0 {
            anyhow::bail!("embedding_dim must be greater than zero");
        }
        Ok(())
    }

    pub fn collections_dir(&self) -> PathBuf {
        self.data_dir.join("collections")
    }

    /// Directory holding the durable collection a category is stored in.
    pub fn collection_dir(&self, category: Category) -> PathBuf {
        match self.rag.collection_mode {
            CollectionMode::PerCategory => self.collections_dir().join(category.as_str()),
            CollectionMode::Single => self.collections_dir().join("default"),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("sources.json")
    }
}
