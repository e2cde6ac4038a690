//! Vector similarity helpers.

use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::types::SimilarMessage;

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Merge hits from several queries, keeping each message's best score, and
/// return the `top_k` best.
pub fn merge_hits(hits: Vec<SimilarMessage>, top_k: usize) -> Vec<SimilarMessage> {
    let mut best: HashMap<String, f32> = HashMap::new();
    for hit in hits {
        best.entry(hit.message_id)
            .and_modify(|s| *s = s.max(hit.score))
            .or_insert(hit.score);
    }

    let mut merged: Vec<SimilarMessage> = best
        .into_iter()
        .map(|(message_id, score)| SimilarMessage { message_id, score })
        .collect();
    merged.sort_by(|a, b| {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| a.message_id.cmp(&b.message_id))
    });
    merged.truncate(top_k);
    merged
}
