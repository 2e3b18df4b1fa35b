use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;

/// Tokenizer capability the chunker depends on.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>>;
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// A private codec for one encode/decode pass, for codecs that learn
    /// state while encoding. Stateless codecs return `None` and are used directly.
    fn scoped(&self) -> Option<Box<dyn TokenCodec>> {
        None
    }
}

/// The embedding model's own tokenizer, loaded from a `tokenizer.json`.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer {}: {e}", path.display()))?;
        Ok(Self { inner })
    }
}

impl TokenCodec for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        // No special tokens: windows are re-encoded by the embedder anyway.
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow!("Tokenization failed: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.inner
            .decode(ids, true)
            .map_err(|e| anyhow!("Detokenization failed: {e}"))
    }
}

/// Whitespace word tokenizer used when no model tokenizer is configured.
///
/// Ids are assigned on first sight, so decoding only works for ids this
/// instance produced. The chunker works on a [`TokenCodec::scoped`] copy,
/// so a shared instance never accumulates words.
#[derive(Default)]
pub struct WordTokenizer {
    vocab: RwLock<Vocab>,
}

#[derive(Default)]
struct Vocab {
    ids: HashMap<String, u32>,
    words: Vec<String>,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct words this instance has assigned ids to.
    pub fn vocab_len(&self) -> usize {
        self.vocab.read().words.len()
    }
}

impl TokenCodec for WordTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut vocab = self.vocab.write();
        let mut out = Vec::new();
        for word in text.split_whitespace() {
            let id = match vocab.ids.get(word) {
                Some(id) => *id,
                None => {
                    let id = u32::try_from(vocab.words.len())
                        .map_err(|_| anyhow!("Word vocabulary exhausted"))?;
                    vocab.words.push(word.to_string());
                    vocab.ids.insert(word.to_string(), id);
                    id
                }
            };
            out.push(id);
        }
        Ok(out)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let vocab = self.vocab.read();
        let words = ids
            .iter()
            .map(|id| {
                vocab
                    .words
                    .get(*id as usize)
                    .map(String::as_str)
                    .ok_or_else(|| anyhow!("Unknown token id {id}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(words.join(" "))
    }

    fn scoped(&self) -> Option<Box<dyn TokenCodec>> {
        Some(Box::new(WordTokenizer::new()))
    }
}
