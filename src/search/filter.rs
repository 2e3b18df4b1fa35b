//! Relevance filter: a stricter second gate over retrieved candidates.
//!
//! 1. Recompute cosine similarity between the query embedding and each
//!    candidate's own embedding; drop anything under the threshold.
//! 2. Drop candidates sharing no words with the query.
//! 3. Stable-sort by (similarity, keyword overlap) descending.

use std::collections::HashSet;

use super::vector::cosine_similarity;
use crate::models::CandidateResult;

/// Lower-cased, whitespace-delimited words with surrounding punctuation trimmed.
pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Number of distinct words shared by `query_words` and `content`.
pub fn keyword_overlap(query_words: &HashSet<String>, content: &str) -> usize {
    word_set(content)
        .iter()
        .filter(|w| query_words.contains(*w))
        .count()
}

pub fn filter_candidates(
    candidates: Vec<CandidateResult>,
    query: &str,
    query_embedding: &[f32],
    similarity_threshold: f32,
) -> Vec<CandidateResult> {
    let query_words = word_set(query);

    let mut kept: Vec<CandidateResult> = candidates
        .into_iter()
        .filter_map(|mut c| {
            let similarity = cosine_similarity(query_embedding, &c.embedding).clamp(0.0, 1.0);
            // NaN compares false against any threshold
            if similarity.is_nan() || similarity < similarity_threshold {
                return None;
            }
            let overlap = keyword_overlap(&query_words, &c.content);
            if overlap == 0 {
                return None;
            }
            c.similarity_score = similarity;
            c.keyword_overlap = overlap;
            Some(c)
        })
        .collect();

    kept.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.keyword_overlap.cmp(&a.keyword_overlap))
    });

    tracing::debug!("Relevance filter kept {} candidates", kept.len());
    kept
}
