//! Vector Store Adapter: routes categories onto durable collections and
//! turns text into embeddings on the way in and on the way out.
//!
//! Every collection is guarded by an async read/write gate. Inserts and
//! searches share it; `clear` and source replacement take it exclusively so
//! nothing observes a collection while it is being rewritten.

use std::sync::Arc;
use tokio::sync::RwLock as AsyncRwLock;

use super::mmr::mmr_select;
use super::vector::VectorStore;
use crate::config::{CollectionMode, Config};
use crate::error::RagError;
use crate::llm::embeddings::Embedder;
use crate::models::{CandidateResult, Category, Chunk, StoredVector};

#[derive(Clone)]
struct Collection {
    store: Arc<VectorStore>,
    gate: Arc<AsyncRwLock<()>>,
}

impl Collection {
    fn same_as(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }

    fn open(dir: &std::path::Path) -> anyhow::Result<Self> {
        Ok(Self {
            store: Arc::new(VectorStore::open_or_create(dir)?),
            gate: Arc::new(AsyncRwLock::new(())),
        })
    }
}

pub struct VectorStoreAdapter {
    embedder: Arc<dyn Embedder>,
    embedding_dim: usize,
    mode: CollectionMode,
    general: Collection,
    code: Collection,
}

impl VectorStoreAdapter {
    /// Open (or create) the collections described by `config`.
    pub fn open(config: &Config, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
        let mode = config.rag.collection_mode;
        let general = Collection::open(&config.collection_dir(Category::General))?;
        let code = match mode {
            CollectionMode::PerCategory => Collection::open(&config.collection_dir(Category::Code))?,
            CollectionMode::Single => general.clone(),
        };

        tracing::info!(
            "Vector store opened ({:?} mode): {} general, {} code vectors",
            mode,
            general.store.count(Some(Category::General)),
            code.store.count(Some(Category::Code))
        );

        Ok(Self {
            embedder,
            embedding_dim: config.llm.embedding_dim,
            mode,
            general,
            code,
        })
    }

    fn collection(&self, category: Category) -> &Collection {
        match category {
            Category::General => &self.general,
            Category::Code => &self.code,
        }
    }

    /// Each durable collection exactly once.
    fn distinct_collections(&self) -> Vec<&Collection> {
        match self.mode {
            CollectionMode::PerCategory => vec![&self.general, &self.code],
            CollectionMode::Single => vec![&self.general],
        }
    }

    /// Embed and store `chunks`. Returns how many vectors were written.
    pub async fn insert(&self, chunks: Vec<Chunk>) -> Result<usize, RagError> {
        let vectors = self.embed_chunks(chunks).await?;
        self.write_vectors(vectors).await
    }

    /// Replace everything stored for `url` with `chunks`.
    ///
    /// The new chunks are embedded before anything is deleted, so an
    /// embedding failure leaves the previous vectors in place. Every touched
    /// collection is held exclusively while its stale vectors are swapped for
    /// the new ones, so concurrent re-ingests of one URL cannot interleave.
    pub async fn replace_source(
        &self,
        url: &str,
        stale_categories: &[Category],
        chunks: Vec<Chunk>,
    ) -> Result<usize, RagError> {
        let mut vectors = self.embed_chunks(chunks).await?;

        // Fixed category order keeps gate acquisition deadlock free.
        let mut targets: Vec<&Collection> = Vec::new();
        for category in Category::ALL {
            let touched = stale_categories.contains(&category)
                || vectors.iter().any(|v| v.chunk.metadata.category == category);
            let collection = self.collection(category);
            if touched && !targets.iter().any(|t| t.same_as(collection)) {
                targets.push(collection);
            }
        }

        let mut guards = Vec::with_capacity(targets.len());
        for collection in targets.iter().copied() {
            guards.push(collection.gate.write().await);
        }

        let mut written = 0;
        for collection in targets {
            let stale: Vec<Category> = stale_categories
                .iter()
                .copied()
                .filter(|&c| self.collection(c).same_as(collection))
                .collect();
            let (fresh, rest): (Vec<StoredVector>, Vec<StoredVector>) = vectors
                .into_iter()
                .partition(|v| self.collection(v.chunk.metadata.category).same_as(collection));
            vectors = rest;

            let n = fresh.len();
            let removed = collection
                .store
                .replace_source(&stale, url, fresh)
                .map_err(|e| {
                    tracing::error!("Replacing vectors for {url} failed: {e:#}");
                    RagError::StoreWrite(format!("{e:#}"))
                })?;
            if removed > 0 {
                tracing::info!("Removed {removed} stale vectors for {url}");
            }
            written += n;
        }
        Ok(written)
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<StoredVector>, RagError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await.map_err(|e| {
            tracing::error!("Embedding {} chunks failed: {e:#}", texts.len());
            RagError::StoreWrite(RagError::Embedding(format!("{e:#}")).to_string())
        })?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::StoreWrite(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.embedding_dim) {
            return Err(RagError::StoreWrite(format!(
                "embedding dimension {} does not match configured {}",
                bad.len(),
                self.embedding_dim
            )));
        }

        Ok(chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| StoredVector {
                id: chunk.id(),
                embedding,
                chunk,
            })
            .collect())
    }

    async fn write_vectors(&self, vectors: Vec<StoredVector>) -> Result<usize, RagError> {
        let mut by_category: Vec<(Category, Vec<StoredVector>)> = Vec::new();
        for vector in vectors {
            let category = vector.chunk.metadata.category;
            match by_category.iter_mut().find(|(c, _)| *c == category) {
                Some((_, group)) => group.push(vector),
                None => by_category.push((category, vec![vector])),
            }
        }

        let mut written = 0;
        for (category, vectors) in by_category {
            let collection = self.collection(category);
            let _guard = collection.gate.read().await;
            let n = vectors.len();
            collection.store.add(vectors).map_err(|e| {
                tracing::error!("Writing {n} vectors to '{category}' failed: {e:#}");
                RagError::StoreWrite(format!("{e:#}"))
            })?;
            written += n;
        }
        Ok(written)
    }

    /// Embed a query for search and filtering.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        self.embedder.embed(query).await.map_err(|e| {
            tracing::error!("Embedding query ({} chars) failed: {e:#}", query.len());
            RagError::StoreRead(RagError::Embedding(format!("{e:#}")).to_string())
        })
    }

    /// Diversity-aware search: `fetch_k` nearest neighbours, then MMR down to `k`.
    ///
    /// `diversity_weight` is the MMR λ: 1.0 ranks purely by similarity.
    pub async fn search(
        &self,
        category: Category,
        query: &str,
        k: usize,
        fetch_k: usize,
        diversity_weight: f32,
    ) -> Result<Vec<CandidateResult>, RagError> {
        let query_embedding = self.embed_query(query).await?;
        Ok(self
            .search_by_embedding(category, &query_embedding, k, fetch_k, diversity_weight)
            .await)
    }

    /// [`Self::search`] with an already embedded query.
    pub async fn search_by_embedding(
        &self,
        category: Category,
        query_embedding: &[f32],
        k: usize,
        fetch_k: usize,
        diversity_weight: f32,
    ) -> Vec<CandidateResult> {
        let collection = self.collection(category);
        let _guard = collection.gate.read().await;

        let hits = collection
            .store
            .nearest(query_embedding, fetch_k.max(k), category);
        let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
        let embeddings: Vec<&[f32]> = hits.iter().map(|h| h.vector.embedding.as_slice()).collect();
        let picked = mmr_select(&scores, &embeddings, k, diversity_weight);

        tracing::debug!(
            "MMR picked {} of {} candidates in '{category}'",
            picked.len(),
            hits.len()
        );

        picked
            .into_iter()
            .map(|i| {
                let hit = &hits[i];
                to_candidate(hit.score, &hit.vector)
            })
            .collect()
    }

    /// Raw nearest neighbours with their similarity, no diversity re-ranking.
    pub async fn search_with_scores(
        &self,
        category: Category,
        query: &str,
        k: usize,
    ) -> Result<Vec<CandidateResult>, RagError> {
        let query_embedding = self.embed_query(query).await?;
        let collection = self.collection(category);
        let _guard = collection.gate.read().await;

        Ok(collection
            .store
            .nearest(&query_embedding, k, category)
            .iter()
            .map(|hit| to_candidate(hit.score, &hit.vector))
            .collect())
    }

    /// Delete every vector of one category, or of all categories.
    ///
    /// A per-category collection is dropped and recreated as a whole; in
    /// single-collection mode only the category's vectors are removed.
    pub async fn clear(&self, category: Option<Category>) -> Result<(), RagError> {
        let targets: Vec<(&Collection, Option<Category>)> = match (category, self.mode) {
            (Some(cat), CollectionMode::Single) => vec![(self.collection(cat), Some(cat))],
            (Some(cat), CollectionMode::PerCategory) => vec![(self.collection(cat), None)],
            (None, _) => self.distinct_collections().into_iter().map(|c| (c, None)).collect(),
        };

        for (collection, scope) in targets {
            let _guard = collection.gate.write().await;
            collection.store.clear(scope).map_err(|e| {
                tracing::error!("Clearing collection failed: {e:#}");
                RagError::StoreWrite(format!("{e:#}"))
            })?;
        }
        Ok(())
    }

    /// Remove a source's vectors from one category.
    pub async fn delete_source(&self, category: Category, url: &str) -> Result<usize, RagError> {
        let collection = self.collection(category);
        let _guard = collection.gate.read().await;
        collection
            .store
            .delete_source(category, url)
            .map_err(|e| RagError::StoreWrite(format!("{e:#}")))
    }

    /// Live vector count for a category, or across all of them.
    pub fn count(&self, category: Option<Category>) -> usize {
        match category {
            Some(cat) => self.collection(cat).store.count(Some(cat)),
            None => Category::ALL
                .iter()
                .map(|&cat| self.collection(cat).store.count(Some(cat)))
                .sum(),
        }
    }

    /// Re-read every collection from disk.
    pub async fn reload(&self) -> anyhow::Result<()> {
        for collection in self.distinct_collections() {
            let _guard = collection.gate.write().await;
            collection.store.reload()?;
        }
        Ok(())
    }
}

fn to_candidate(score: f32, vector: &StoredVector) -> CandidateResult {
    CandidateResult {
        content: vector.chunk.text.clone(),
        metadata: vector.chunk.metadata.clone(),
        similarity_score: score.clamp(0.0, 1.0),
        keyword_overlap: 0,
        embedding: vector.embedding.clone(),
    }
}
