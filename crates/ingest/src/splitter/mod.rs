//! Structure-aware splitter for Vietnamese regulation text.
//!
//! Tracks `Chương` (chapter) and `Điều` (article) headers line by line,
//! flushes one block per header, splits oversized blocks and merges
//! undersized ones into the previous chunk. Nothing is dropped.

mod pages;
mod patterns;
mod recursive;

use tracing::{debug, info, warn};

use ccba_core::config::ChunkingConfig;
use ccba_core::{chunk_id, truncate_chars, Chunk, ChunkLevel, MAX_LABEL_CHARS};

use crate::document::PageContent;
use pages::PageMap;
use recursive::{char_len, recursive_split};

#[derive(Debug, Clone, PartialEq)]
pub struct SplitterConfig {
    /// Maximum chunk size in characters.
    pub max_chars: usize,
    /// Blocks shorter than this are merged into the previous chunk.
    pub min_chars: usize,
    /// Characters carried from one split segment into the next.
    pub overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self { max_chars: 2000, min_chars: 100, overlap: 200 }
    }
}

impl From<&ChunkingConfig> for SplitterConfig {
    fn from(c: &ChunkingConfig) -> Self {
        Self { max_chars: c.max_chars, min_chars: c.min_chars, overlap: c.overlap_chars }
    }
}

impl SplitterConfig {
    /// `max_chars` at least 1, `overlap` strictly below `max_chars`.
    fn normalized(mut self) -> Self {
        self.max_chars = self.max_chars.max(1);
        if self.overlap >= self.max_chars {
            self.overlap = self.max_chars - 1;
        }
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct SplitOutput {
    pub chunks: Vec<Chunk>,
    /// `Σ len(chunk.text) / len(text)`; can exceed 1.0 with overlap.
    pub coverage: f64,
}

/// Hierarchy context a block is flushed with.
struct Context<'a> {
    chapter: Option<&'a str>,
    article: Option<&'a str>,
    page: u32,
}

pub struct StructuralSplitter {
    config: SplitterConfig,
}

impl StructuralSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config: config.normalized() }
    }

    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    pub fn split(
        &self,
        text: &str,
        document_id: &str,
        document_name: &str,
        pages: &[PageContent],
    ) -> SplitOutput {
        if text.trim().is_empty() {
            warn!(document = %document_name, "document is empty, nothing to split");
            return SplitOutput::default();
        }

        let page_map = PageMap::build(text, pages);
        let mut builder = Builder {
            config: &self.config,
            document_id,
            document_name,
            chunks: Vec::new(),
        };

        let mut chapter: Option<String> = None;
        let mut article: Option<String> = None;
        let mut block: Vec<&str> = Vec::new();
        let mut block_page = 1;

        let mut offset = 0;
        for raw in text.split('\n') {
            let line_offset = offset;
            offset += raw.len() + 1;

            let line = raw.trim();
            if line.is_empty() {
                // Paragraph separator, collapsed and only inside a block.
                if block.last().is_some_and(|l| !l.is_empty()) {
                    block.push("");
                }
                continue;
            }

            let chapter_marker = patterns::chapter(line);
            let article_marker = if chapter_marker.is_none() { patterns::article(line) } else { None };

            if chapter_marker.is_some() || article_marker.is_some() {
                builder.flush(
                    &block,
                    &Context { chapter: chapter.as_deref(), article: article.as_deref(), page: block_page },
                );
                block.clear();
                if let Some(m) = chapter_marker {
                    chapter = Some(m.label());
                    article = None;
                } else if let Some(m) = article_marker {
                    article = Some(m.label());
                }
            }

            if block.is_empty() {
                block_page = page_map.page_at(line_offset);
            }
            block.push(line);
        }
        builder.flush(
            &block,
            &Context { chapter: chapter.as_deref(), article: article.as_deref(), page: block_page },
        );

        let mut chunks = builder.chunks;
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.id = chunk_id(document_id, i);
            for label in [&mut chunk.chapter, &mut chunk.article, &mut chunk.clause] {
                if let Some(v) = label.as_mut() {
                    *v = truncate_chars(v, MAX_LABEL_CHARS).to_string();
                }
            }
        }

        let chunk_chars: usize = chunks.iter().map(|c| c.char_len()).sum();
        let coverage = chunk_chars as f64 / char_len(text) as f64;
        info!(
            document = %document_name,
            chunks = chunks.len(),
            coverage = %format!("{:.1}%", coverage * 100.0),
            "split document"
        );

        SplitOutput { chunks, coverage }
    }
}

struct Builder<'a> {
    config: &'a SplitterConfig,
    document_id: &'a str,
    document_name: &'a str,
    chunks: Vec<Chunk>,
}

impl Builder<'_> {
    fn flush(&mut self, lines: &[&str], ctx: &Context<'_>) {
        let text = lines.join("\n");
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if char_len(text) <= self.config.max_chars {
            let level = if ctx.article.is_some() {
                ChunkLevel::Article
            } else if ctx.chapter.is_some() {
                ChunkLevel::Chapter
            } else {
                ChunkLevel::Document
            };
            self.emit_or_merge(text, ctx, level, None);
            return;
        }

        let parts = recursive_split(text, self.config.max_chars, self.config.overlap);
        debug!(parts = parts.len(), chars = char_len(text), "split oversized block");
        let numbered = parts.len() > 1;
        for (i, part) in parts.iter().enumerate() {
            let clause = numbered.then(|| (i + 1).to_string());
            self.emit_or_merge(part, ctx, ChunkLevel::Clause, clause);
        }
    }

    fn emit_or_merge(&mut self, text: &str, ctx: &Context<'_>, level: ChunkLevel, clause: Option<String>) {
        if char_len(text) < self.config.min_chars {
            if let Some(prev) = self.chunks.last_mut() {
                prev.append_text(text);
                return;
            }
        }

        let Some(mut chunk) = Chunk::new(self.document_id, self.document_name, text) else {
            return;
        };
        chunk.page_number = ctx.page;
        chunk.chapter = ctx.chapter.map(str::to_string);
        chunk.article = ctx.article.map(str::to_string);
        chunk.clause = clause;
        chunk.level = level;
        chunk.full_context = Chunk::breadcrumb(ctx.chapter, ctx.article);
        self.chunks.push(chunk);
    }
}
