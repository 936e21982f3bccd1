mod loader;
mod md;
mod pdf;
mod txt;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use loader::{CommandLoader, DocumentLoader, LoaderChain, LocalFileLoader};

/// File extensions the built-in loaders understand.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "text", "md", "markdown"];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("PDF extraction failed: {0}")]
    PdfError(String),
    #[error("no extractable text in {0}")]
    NoText(String),
    #[error("external parser failed: {0}")]
    External(String),
    #[error("all loaders failed: {}", .0.join("; "))]
    AllFailed(Vec<String>),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A page of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// 1-based page number (for PDFs). For TXT/MD, always 1.
    pub page_number: u32,
    pub text: String,
    pub char_count: usize,
}

impl PageContent {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        let char_count = text.chars().count();
        Self { page_number, text, char_count }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadStats {
    pub total_pages: usize,
    pub total_chars: usize,
}

/// Loader output: full text plus the page map it was assembled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedDocument {
    pub text: String,
    pub pages: Vec<PageContent>,
    pub stats: LoadStats,
}

impl LoadedDocument {
    /// Join pages with a blank line so page breaks read as paragraph breaks.
    pub fn from_pages(pages: Vec<PageContent>) -> Self {
        let text = pages
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let stats = LoadStats {
            total_pages: pages.len(),
            total_chars: text.chars().count(),
        };
        Self { text, pages, stats }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Lowercased extension of `path`, if any.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

pub fn is_supported(path: &Path) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(path).as_str())
}

/// Extract text from file bytes based on file type.
pub fn extract_text(bytes: &[u8], filename: &str) -> Result<LoadedDocument, ExtractionError> {
    let ext = extension_of(Path::new(filename));

    let pages = match ext.as_str() {
        "pdf" => pdf::extract_pdf(bytes)?,
        "txt" | "text" => txt::extract_txt(bytes)?,
        "md" | "markdown" => md::extract_md(bytes)?,
        other => return Err(ExtractionError::UnsupportedType(other.to_string())),
    };

    Ok(LoadedDocument::from_pages(pages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_join_with_blank_line() {
        let doc = LoadedDocument::from_pages(vec![
            PageContent::new(1, "Chương I"),
            PageContent::new(2, ""),
            PageContent::new(3, "Điều 1. Phạm vi"),
        ]);
        assert_eq!(doc.text, "Chương I\n\nĐiều 1. Phạm vi");
        assert_eq!(doc.stats.total_pages, 3);
        assert_eq!(doc.stats.total_chars, doc.text.chars().count());
        assert!(doc.has_text());
    }

    #[test]
    fn dispatch_by_extension() {
        let doc = extract_text("Điều 1. Phạm vi".as_bytes(), "QCVN.TXT").unwrap();
        assert_eq!(doc.text, "Điều 1. Phạm vi");
        assert!(matches!(
            extract_text(b"x", "file.docx"),
            Err(ExtractionError::UnsupportedType(e)) if e == "docx"
        ));
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported(Path::new("a/b/QCVN 06.pdf")));
        assert!(is_supported(Path::new("notes.MD")));
        assert!(!is_supported(Path::new("scan.png")));
        assert!(!is_supported(Path::new("README")));
    }
}
