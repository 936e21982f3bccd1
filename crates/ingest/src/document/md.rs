use super::{ExtractionError, PageContent};

/// Markdown is read as plain text with heading markers removed, so
/// `## Chương II` is seen by the splitter as a chapter line.
pub fn extract_md(bytes: &[u8]) -> Result<Vec<PageContent>, ExtractionError> {
    let text = String::from_utf8(bytes.to_vec())
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned());

    let body = text
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                trimmed.trim_start_matches('#').trim()
            } else {
                line.trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(vec![PageContent::new(1, body.trim())])
}
