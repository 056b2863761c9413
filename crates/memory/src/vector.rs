//! Vector similarity and ranking.

use std::cmp::Ordering;

use rookery_core::memory::{MemoryFact, ScoredFact};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 for mismatched lengths, empty input, or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank facts by cosine similarity to `query`, keeping the top `k`.
///
/// Most similar first; equal scores put the newer fact first so the
/// ordering is stable across backends.
pub fn rank_facts<I>(facts: I, query: &[f32], k: usize) -> Vec<ScoredFact>
where
    I: IntoIterator<Item = MemoryFact>,
{
    let mut scored: Vec<ScoredFact> = facts
        .into_iter()
        .map(|fact| ScoredFact {
            score: cosine_similarity(&fact.embedding, query),
            fact,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.fact.created_at.cmp(&a.fact.created_at))
    });
    scored.truncate(k);
    scored
}
