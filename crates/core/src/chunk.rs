use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::retrieval::ContextRecord;

/// Sparse lexical vector: token id → weight.
pub type SparseVector = BTreeMap<u32, f32>;

/// Storage limit for short label fields (document id/name, chapter, article, clause).
pub const MAX_LABEL_CHARS: usize = 500;

/// Storage limit for chunk text.
pub const MAX_TEXT_CHARS: usize = 20_000;

/// Storage limit for the breadcrumb context.
pub const MAX_CONTEXT_CHARS: usize = 65_535;

/// Length of a chunk id in hex characters.
pub const CHUNK_ID_LEN: usize = 16;

/// Hierarchical level of a chunk within a regulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkLevel {
    Document,
    Chapter,
    Article,
    Section,
    #[default]
    Clause,
}

impl ChunkLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkLevel::Document => "document",
            ChunkLevel::Chapter => "chapter",
            ChunkLevel::Article => "article",
            ChunkLevel::Section => "section",
            ChunkLevel::Clause => "clause",
        }
    }

    /// Parse a stored level label. Unknown labels map to `Clause`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "document" => ChunkLevel::Document,
            "chapter" => ChunkLevel::Chapter,
            "article" => ChunkLevel::Article,
            "section" => ChunkLevel::Section,
            _ => ChunkLevel::Clause,
        }
    }
}

impl fmt::Display for ChunkLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored, independently retrievable unit of regulation text.
///
/// Created by the structural splitter, vectors attached by the embed stage,
/// persisted by the store stage. Never created with blank text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    pub text: String,
    /// 1-based page the chunk starts on.
    pub page_number: u32,

    pub chapter: Option<String>,
    pub article: Option<String>,
    pub clause: Option<String>,
    pub level: ChunkLevel,
    /// Weak reference to an enclosing chunk; never owned.
    pub parent_id: Option<String>,
    /// Breadcrumb, e.g. `Chương I: QUY ĐỊNH CHUNG > Điều 5`.
    pub full_context: Option<String>,

    /// e.g. `QCVN 06:2022/BXD`
    pub document_code: Option<String>,
    /// `original` or `amendment`
    pub document_type: Option<String>,
    pub amendment_number: Option<String>,
    pub amends_document: Option<String>,

    /// `[x0, y0, x1, y1]` highlight rectangle.
    pub bbox: Option<[f32; 4]>,
    pub token_count: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dense_vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_vector: Option<SparseVector>,
}

impl Chunk {
    /// Create a chunk. Returns `None` when `text` is blank.
    ///
    /// The id is left empty; the splitter assigns it once the final ordinal
    /// of the chunk within its document is known.
    pub fn new(
        document_id: impl Into<String>,
        document_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        let token_count = count_tokens(&text);
        Some(Self {
            id: String::new(),
            document_id: document_id.into(),
            document_name: document_name.into(),
            text,
            page_number: 1,
            chapter: None,
            article: None,
            clause: None,
            level: ChunkLevel::Document,
            parent_id: None,
            full_context: None,
            document_code: None,
            document_type: None,
            amendment_number: None,
            amends_document: None,
            bbox: None,
            token_count,
            dense_vector: None,
            sparse_vector: None,
        })
    }

    /// Append text to this chunk (newline-joined) and refresh the token count.
    pub fn append_text(&mut self, extra: &str) {
        self.text.push('\n');
        self.text.push_str(extra);
        self.token_count = count_tokens(&self.text);
    }

    /// Length of the text in Unicode scalar values.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn has_vectors(&self) -> bool {
        self.dense_vector.is_some() && self.sparse_vector.is_some()
    }

    /// Citation for display: `[doc - Chương I - Điều 5 - Khoản 2]`.
    pub fn citation(&self) -> String {
        let mut parts = vec![self.document_name.clone()];
        if let Some(chapter) = &self.chapter {
            parts.push(format!("Chương {chapter}"));
        }
        if let Some(article) = &self.article {
            parts.push(format!("Điều {article}"));
        }
        if let Some(clause) = &self.clause {
            parts.push(format!("Khoản {clause}"));
        }
        format!("[{}]", parts.join(" - "))
    }

    /// Build the breadcrumb shown to the reranker and the user.
    pub fn breadcrumb(chapter: Option<&str>, article: Option<&str>) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(chapter) = chapter {
            parts.push(format!("Chương {chapter}"));
        }
        if let Some(article) = article {
            parts.push(format!("Điều {article}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" > "))
        }
    }

    /// Plain record handed to generation.
    pub fn to_context(&self, retrieval_score: f64, rerank_score: Option<f64>) -> ContextRecord {
        ContextRecord {
            id: self.id.clone(),
            text: self.text.clone(),
            document_name: self.document_name.clone(),
            document_id: self.document_id.clone(),
            page_number: self.page_number,
            chapter: self.chapter.clone(),
            article: self.article.clone(),
            clause: self.clause.clone(),
            full_context: self.full_context.clone(),
            bbox: self.bbox,
            retrieval_score,
            rerank_score,
        }
    }

    /// Copy with every field clipped to the storage schema limits.
    pub fn truncated_for_storage(&self) -> Chunk {
        let label = |v: &Option<String>| v.as_deref().map(|s| truncate_chars(s, MAX_LABEL_CHARS).to_string());
        Chunk {
            id: truncate_chars(&self.id, 100).to_string(),
            document_id: truncate_chars(&self.document_id, MAX_LABEL_CHARS).to_string(),
            document_name: truncate_chars(&self.document_name, MAX_LABEL_CHARS).to_string(),
            text: truncate_chars(&self.text, MAX_TEXT_CHARS).to_string(),
            chapter: label(&self.chapter),
            article: label(&self.article),
            clause: label(&self.clause),
            full_context: self
                .full_context
                .as_deref()
                .map(|s| truncate_chars(s, MAX_CONTEXT_CHARS).to_string()),
            document_code: label(&self.document_code),
            ..self.clone()
        }
    }
}

/// Stable chunk id: first 16 hex chars of `sha256("{document_id}_{index}")`.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    let digest = Sha256::digest(format!("{document_id}_{index}").as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(CHUNK_ID_LEN);
    hex
}

/// Truncate to at most `max` Unicode scalar values.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}

/// Approximate token count via whitespace splitting.
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_rejected() {
        assert!(Chunk::new("doc", "Doc", "").is_none());
        assert!(Chunk::new("doc", "Doc", "  \n\t ").is_none());
        assert!(Chunk::new("doc", "Doc", "Điều 1.").is_some());
    }

    #[test]
    fn chunk_id_is_stable_and_short() {
        let a = chunk_id("qcvn_06_2022_bxd", 3);
        let b = chunk_id("qcvn_06_2022_bxd", 3);
        let c = chunk_id("qcvn_06_2022_bxd", 4);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), CHUNK_ID_LEN);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "Điều khoản";
        assert_eq!(truncate_chars(s, 4), "Điều");
        assert_eq!(truncate_chars(s, 100), s);
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn append_refreshes_token_count() {
        let mut chunk = Chunk::new("d", "D", "một hai").unwrap();
        assert_eq!(chunk.token_count, 2);
        chunk.append_text("ba");
        assert_eq!(chunk.text, "một hai\nba");
        assert_eq!(chunk.token_count, 3);
    }

    #[test]
    fn citation_and_breadcrumb() {
        let mut chunk = Chunk::new("d", "QCVN 06", "nội dung").unwrap();
        chunk.chapter = Some("I".into());
        chunk.article = Some("5".into());
        chunk.clause = Some("2".into());
        assert_eq!(chunk.citation(), "[QCVN 06 - Chương I - Điều 5 - Khoản 2]");
        assert_eq!(
            Chunk::breadcrumb(Some("I"), Some("5")).as_deref(),
            Some("Chương I > Điều 5")
        );
        assert_eq!(Chunk::breadcrumb(None, None), None);
    }

    #[test]
    fn storage_truncation_clips_labels_and_text() {
        let mut chunk = Chunk::new("d", "D", "x".repeat(MAX_TEXT_CHARS + 10)).unwrap();
        chunk.chapter = Some("c".repeat(MAX_LABEL_CHARS + 1));
        let stored = chunk.truncated_for_storage();
        assert_eq!(stored.text.chars().count(), MAX_TEXT_CHARS);
        assert_eq!(stored.chapter.unwrap().chars().count(), MAX_LABEL_CHARS);
        assert_eq!(stored.document_name, "D");
    }

    #[test]
    fn level_labels_round_trip_with_lossy_default() {
        assert_eq!(ChunkLevel::from_label("article"), ChunkLevel::Article);
        assert_eq!(ChunkLevel::from_label("ARTICLE"), ChunkLevel::Article);
        assert_eq!(ChunkLevel::from_label("bogus"), ChunkLevel::Clause);
        assert_eq!(ChunkLevel::Chapter.to_string(), "chapter");
    }
}
