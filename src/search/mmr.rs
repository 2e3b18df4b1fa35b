//! Maximal marginal relevance selection.
//!
//! Each step picks the candidate maximising
//! `λ · sim(query, c) − (1 − λ) · max sim(c, selected)`; the first pick is
//! the candidate most similar to the query.

use super::vector::cosine_similarity;

/// Select up to `k` candidate indices, in selection order.
///
/// `query_scores[i]` is the similarity of candidate `i` to the query and
/// `embeddings[i]` its vector. `lambda` = 1.0 ranks purely by similarity,
/// 0.0 purely by diversity. Ties go to the earlier candidate.
pub fn mmr_select(
    query_scores: &[f32],
    embeddings: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let n = query_scores.len().min(embeddings.len());
    let k = k.min(n);
    if k == 0 {
        return Vec::new();
    }
    let lambda = lambda.clamp(0.0, 1.0);

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..n).collect();
    // Highest similarity to anything already selected, per candidate
    let mut max_redundancy = vec![f32::NEG_INFINITY; n];

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for (pos, &i) in remaining.iter().enumerate() {
            // The first pick is always the most similar candidate
            let score = if selected.is_empty() {
                query_scores[i]
            } else {
                lambda * query_scores[i] - (1.0 - lambda) * max_redundancy[i]
            };
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((pos, score)),
            }
        }

        let Some((pos, _)) = best else { break };
        let chosen = remaining.remove(pos);
        selected.push(chosen);

        for &i in &remaining {
            let sim = cosine_similarity(embeddings[i], embeddings[chosen]);
            if sim > max_redundancy[i] {
                max_redundancy[i] = sim;
            }
        }
    }

    selected
}
