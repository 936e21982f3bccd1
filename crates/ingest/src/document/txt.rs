use super::{ExtractionError, PageContent};

pub fn extract_txt(bytes: &[u8]) -> Result<Vec<PageContent>, ExtractionError> {
    // Try UTF-8 first, fall back to lossy conversion
    let text = String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned());
    let text = text.replace("\r\n", "\n");

    // Form feeds mark page breaks in text exported from PDFs.
    if text.contains('\x0C') {
        return Ok(text
            .split('\x0C')
            .enumerate()
            .map(|(i, page)| PageContent::new(i as u32 + 1, page.trim()))
            .collect());
    }

    Ok(vec![PageContent::new(1, text.trim())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_simple_text() {
        let content = "Chương I\nQUY ĐỊNH CHUNG".as_bytes();
        let pages = extract_txt(content).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].text, "Chương I\nQUY ĐỊNH CHUNG");
        assert_eq!(pages[0].char_count, 23);
    }

    #[test]
    fn invalid_utf8_is_lossy() {
        let pages = extract_txt(&[b'a', 0xFF, b'b']).unwrap();
        assert_eq!(pages[0].text, "a\u{FFFD}b");
    }

    #[test]
    fn form_feed_splits_pages() {
        let pages = extract_txt(b"one\x0Ctwo\r\nlines").unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].page_number, 2);
        assert_eq!(pages[1].text, "two\nlines");
    }

    #[test]
    fn trims_whitespace() {
        let pages = extract_txt(b"  \n  Hello  \n  ").unwrap();
        assert_eq!(pages[0].text, "Hello");
    }
}
