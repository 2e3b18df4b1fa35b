use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};

use crate::models::{Category, StoredVector};

/// A nearest-neighbour hit: the stored vector and its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub score: f32,
    pub vector: StoredVector,
}

/// One durable collection: in-memory vectors persisted as JSON in their own directory.
pub struct VectorStore {
    entries: RwLock<Vec<StoredVector>>,
    dir: PathBuf,
    persist_path: PathBuf,
}

impl VectorStore {
    pub fn open_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create collection dir {}", dir.display()))?;
        let persist_path = dir.join("vectors.json");
        let entries = load_entries(&persist_path)?;

        Ok(Self {
            entries: RwLock::new(entries),
            dir: dir.to_path_buf(),
            persist_path,
        })
    }

    /// Append vectors and persist the collection.
    pub fn add(&self, vectors: Vec<StoredVector>) -> Result<()> {
        let mut entries = self.entries.write();
        entries.extend(vectors);
        self.persist(&entries)
    }

    /// Delete every vector ingested from `url` under `category`. Returns how many were removed.
    pub fn delete_source(&self, category: Category, url: &str) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| !(e.chunk.metadata.category == category && e.chunk.metadata.source_url == url));
        let removed = before - entries.len();
        if removed > 0 {
            self.persist(&entries)?;
        }
        Ok(removed)
    }

    /// Swap `url`'s vectors under `stale_categories` for `vectors` in one write.
    ///
    /// Returns how many stale vectors were removed.
    pub fn replace_source(
        &self,
        stale_categories: &[Category],
        url: &str,
        vectors: Vec<StoredVector>,
    ) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| {
            !(e.chunk.metadata.source_url == url
                && stale_categories.contains(&e.chunk.metadata.category))
        });
        let removed = before - entries.len();
        if removed == 0 && vectors.is_empty() {
            return Ok(0);
        }
        entries.extend(vectors);
        self.persist(&entries)?;
        Ok(removed)
    }

    /// Delete vectors of one category, or the whole collection.
    ///
    /// Clearing everything removes the collection directory and recreates it empty.
    pub fn clear(&self, category: Option<Category>) -> Result<()> {
        let mut entries = self.entries.write();
        match category {
            Some(cat) => {
                entries.retain(|e| e.chunk.metadata.category != cat);
                self.persist(&entries)
            }
            None => {
                entries.clear();
                if self.dir.exists() {
                    std::fs::remove_dir_all(&self.dir).with_context(|| {
                        format!("Failed to remove collection dir {}", self.dir.display())
                    })?;
                }
                std::fs::create_dir_all(&self.dir).with_context(|| {
                    format!("Failed to recreate collection dir {}", self.dir.display())
                })?;
                Ok(())
            }
        }
    }

    /// Re-read the collection from disk, dropping in-memory state.
    pub fn reload(&self) -> Result<()> {
        let fresh = load_entries(&self.persist_path)?;
        *self.entries.write() = fresh;
        Ok(())
    }

    /// Cosine nearest neighbours within `category`, best first.
    pub fn nearest(&self, query_embedding: &[f32], limit: usize, category: Category) -> Vec<VectorHit> {
        let entries = self.entries.read();

        let mut scored: Vec<(f32, &StoredVector)> = entries
            .iter()
            .filter(|e| e.chunk.metadata.category == category)
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(score, e)| VectorHit {
                score,
                vector: e.clone(),
            })
            .collect()
    }

    pub fn count(&self, category: Option<Category>) -> usize {
        let entries = self.entries.read();
        match category {
            Some(cat) => entries
                .iter()
                .filter(|e| e.chunk.metadata.category == cat)
                .count(),
            None => entries.len(),
        }
    }

    /// Atomic write via temp file + rename.
    fn persist(&self, entries: &[StoredVector]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let data = serde_json::to_string(entries)?;
        let tmp_path = self.persist_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.persist_path)
            .with_context(|| format!("Failed to replace {}", self.persist_path.display()))?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<Vec<StoredVector>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = std::fs::read_to_string(path).context("Failed to read vector store")?;
    match serde_json::from_str(&data) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            tracing::warn!("Ignoring unreadable vector store {}: {e}", path.display());
            Ok(Vec::new())
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
