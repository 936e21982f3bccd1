//! Reciprocal Rank Fusion: score = Σ 1/(k + rank + 1), rank 0-based.

use std::sync::Arc;

use indexmap::IndexMap;

use ccba_core::{Chunk, RetrievalResult};

pub const DEFAULT_RRF_K: u32 = 60;

/// Fuse ranked lists into one, deduplicated by chunk id.
///
/// The first occurrence of a chunk supplies the chunk value. Ties keep the
/// order in which chunks were first seen. Output ranks are 1-based.
pub fn reciprocal_rank_fusion(lists: &[&[RetrievalResult]], k: u32) -> Vec<RetrievalResult> {
    let mut fused: IndexMap<String, (Arc<Chunk>, f64)> = IndexMap::new();

    for list in lists {
        for (rank, result) in list.iter().enumerate() {
            let contribution = 1.0 / (k as f64 + rank as f64 + 1.0);
            fused
                .entry(result.chunk.id.clone())
                .or_insert_with(|| (Arc::clone(&result.chunk), 0.0))
                .1 += contribution;
        }
    }

    let mut ranked: Vec<(Arc<Chunk>, f64)> = fused.into_values().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (chunk, score))| RetrievalResult::new(chunk, score, i + 1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(ids: &[&str]) -> Vec<RetrievalResult> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                let mut chunk = Chunk::new("doc", "doc.pdf", format!("text of {id}")).unwrap();
                chunk.id = id.to_string();
                RetrievalResult::new(Arc::new(chunk), 1.0 - i as f64 * 0.1, i + 1)
            })
            .collect()
    }

    fn score_of(fused: &[RetrievalResult], id: &str) -> f64 {
        fused.iter().find(|r| r.chunk.id == id).map(|r| r.score).unwrap()
    }

    #[test]
    fn scores_sum_over_lists() {
        let dense = results(&["d1", "d2", "d3"]);
        let sparse = results(&["d1", "d4"]);
        let fused = reciprocal_rank_fusion(&[&dense, &sparse], 60);

        assert_eq!(fused.len(), 4);
        assert!((score_of(&fused, "d1") - (1.0 / 61.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((score_of(&fused, "d3") - 1.0 / 63.0).abs() < 1e-12);
        assert_eq!(fused[0].chunk.id, "d1");
        assert_eq!(fused[0].rank, 1);
        assert!(fused.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let dense = results(&["a", "b"]);
        let sparse = results(&["c", "d"]);
        let fused = reciprocal_rank_fusion(&[&dense, &sparse], 60);
        let ids: Vec<&str> = fused.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, ["a", "c", "b", "d"]);
        assert_eq!(fused.iter().map(|r| r.rank).collect::<Vec<_>>(), [1, 2, 3, 4]);
    }

    #[test]
    fn first_seen_chunk_wins() {
        let dense = results(&["x"]);
        let mut sparse = results(&["x"]);
        Arc::make_mut(&mut sparse[0].chunk).text = "other copy".into();
        let fused = reciprocal_rank_fusion(&[&dense, &sparse], 60);
        assert_eq!(fused[0].chunk.text, "text of x");
    }

    #[test]
    fn empty_lists_fuse_to_nothing() {
        assert!(reciprocal_rank_fusion(&[&[], &[]], 60).is_empty());
    }
}
