use crate::document::PageContent;

/// Byte spans of each page's text inside the full document text.
pub(crate) struct PageMap {
    spans: Vec<(usize, u32)>,
}

impl PageMap {
    /// Locate each page's text in `text`, in order. Pages that cannot be
    /// found (or are blank) are skipped.
    pub fn build(text: &str, pages: &[PageContent]) -> Self {
        let mut spans = Vec::with_capacity(pages.len());
        let mut cursor = 0;
        for page in pages {
            let needle = page.text.trim();
            if needle.is_empty() {
                continue;
            }
            if let Some(pos) = text[cursor..].find(needle) {
                let start = cursor + pos;
                spans.push((start, page.page_number.max(1)));
                cursor = start + needle.len();
            }
        }
        Self { spans }
    }

    /// Page containing byte `offset`; text before the first located page
    /// belongs to page 1.
    pub fn page_at(&self, offset: usize) -> u32 {
        self.spans
            .iter()
            .take_while(|(start, _)| *start <= offset)
            .last()
            .map(|(_, page)| *page)
            .unwrap_or(1)
    }
}
