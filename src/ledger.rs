use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{Category, ContentType, SourceEntry};

/// Per-URL ingestion bookkeeping, persisted as JSON.
///
/// Keyed by URL: recording a URL again overwrites its entry.
pub struct SourceLedger {
    entries: RwLock<HashMap<String, SourceEntry>>,
    path: PathBuf,
}

impl SourceLedger {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            entries: RwLock::new(load_ledger(path)?),
            path: path.to_path_buf(),
        })
    }

    pub fn record(
        &self,
        url: &str,
        title: &str,
        chunk_count: usize,
        category: Category,
        content_type: ContentType,
    ) -> Result<()> {
        let entry = SourceEntry {
            url: url.to_string(),
            title: title.to_string(),
            chunk_count,
            added_at: Utc::now(),
            category,
            content_type,
        };
        let mut entries = self.entries.write();
        entries.insert(url.to_string(), entry);
        self.write_file(&entries)
    }

    pub fn get(&self, url: &str) -> Option<SourceEntry> {
        self.entries.read().get(url).cloned()
    }

    /// Entries of one category (or all), oldest first.
    pub fn entries(&self, category: Option<Category>) -> Vec<SourceEntry> {
        let mut out: Vec<SourceEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| category.map_or(true, |c| e.category == c))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.url.cmp(&b.url)));
        out
    }

    /// Forget every entry of one category, or all of them. Returns how many were dropped.
    pub fn remove_category(&self, category: Option<Category>) -> Result<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| category.is_some_and(|c| e.category != c));
        let removed = before - entries.len();
        if removed > 0 {
            self.write_file(&entries)?;
        }
        Ok(removed)
    }

    pub fn reload(&self) -> Result<()> {
        let fresh = load_ledger(&self.path)?;
        *self.entries.write() = fresh;
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        let entries = self.entries.read();
        self.write_file(&entries)
    }

    /// Atomic write via temp file + rename.
    fn write_file(&self, entries: &HashMap<String, SourceEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, data)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

fn load_ledger(path: &Path) -> Result<HashMap<String, SourceEntry>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path).context("Failed to read source ledger")?;
    match serde_json::from_str(&data) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            tracing::warn!("Ignoring unreadable source ledger {}: {e}", path.display());
            Ok(HashMap::new())
        }
    }
}
