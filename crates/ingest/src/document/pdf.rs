use super::{ExtractionError, PageContent};

/// Text-layer PDF extraction. Scanned PDFs yield no text; the loader chain
/// then moves on to the external parser if one is configured.
pub fn extract_pdf(bytes: &[u8]) -> Result<Vec<PageContent>, ExtractionError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractionError::PdfError(e.to_string()))?;

    Ok(split_pages(&text))
}

/// pdf-extract returns all text as one string, with form feeds (`\x0C`)
/// between pages.
fn split_pages(text: &str) -> Vec<PageContent> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if !text.contains('\x0C') {
        return vec![PageContent::new(1, text.trim())];
    }
    text.split('\x0C')
        .enumerate()
        .filter(|(_, page_text)| !page_text.trim().is_empty())
        .map(|(i, page_text)| PageContent::new(i as u32 + 1, page_text.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feeds_keep_original_page_numbers() {
        let pages = split_pages("Trang một\x0C   \x0CTrang ba\n");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].page_number, 3);
        assert_eq!(pages[1].text, "Trang ba");
    }

    #[test]
    fn no_form_feed_is_single_page() {
        let pages = split_pages("  Điều 1.  ");
        assert_eq!(pages, vec![PageContent::new(1, "Điều 1.")]);
    }

    #[test]
    fn blank_text_has_no_pages() {
        assert!(split_pages(" \n\x0C ").is_empty());
    }

    #[test]
    fn garbage_bytes_are_a_pdf_error() {
        assert!(matches!(extract_pdf(b"not a pdf"), Err(ExtractionError::PdfError(_))));
    }
}
