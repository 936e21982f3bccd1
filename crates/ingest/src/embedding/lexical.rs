//! Hashed lexical weights for the sparse half of hybrid search.
//!
//! Vietnamese words are mostly multi-syllable (`thoát nạn`, `hành lang`),
//! so adjacent syllable pairs are indexed next to the single syllables.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use ccba_core::SparseVector;

use super::traits::SparseEncoder;

/// Vocabulary size of the bge-m3 sparse head.
pub const DEFAULT_SPARSE_DIMENSIONS: usize = 250_002;

pub struct LexicalEncoder {
    dimensions: u32,
}

impl LexicalEncoder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = u32::try_from(dimensions.max(1)).unwrap_or(u32::MAX);
        Self { dimensions }
    }

    fn token_id(&self, token: &str) -> u32 {
        let digest = Sha256::digest(token.as_bytes());
        let head = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        head % self.dimensions
    }
}

impl Default for LexicalEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_SPARSE_DIMENSIONS)
    }
}

/// Lowercased alphanumeric syllables.
pub fn syllables(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Syllables followed by `a_b` bigrams of adjacent syllables.
pub fn terms(text: &str) -> Vec<String> {
    let syllables = syllables(text);
    let bigrams: Vec<String> = syllables.windows(2).map(|w| format!("{}_{}", w[0], w[1])).collect();
    let mut out = syllables;
    out.extend(bigrams);
    out
}

impl SparseEncoder for LexicalEncoder {
    fn encode(&self, text: &str) -> SparseVector {
        let mut counts: HashMap<u32, u32> = HashMap::new();
        for term in terms(text) {
            *counts.entry(self.token_id(&term)).or_insert(0) += 1;
        }

        let mut weights: SparseVector = counts
            .into_iter()
            .map(|(id, tf)| (id, 1.0 + (tf as f32).ln()))
            .collect();

        let norm = weights.values().map(|w| w * w).sum::<f32>().sqrt();
        if norm > 0.0 {
            for w in weights.values_mut() {
                *w /= norm;
            }
        }
        weights
    }

    fn dimensions(&self) -> usize {
        self.dimensions as usize
    }
}
