use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use ccba_core::fallback::try_in_order;

use super::{extract_text, is_supported, ExtractionError, LoadedDocument, PageContent};

/// A source of raw text + page map for a file.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, path: &Path) -> bool;

    async fn load(&self, path: &Path) -> Result<LoadedDocument, ExtractionError>;
}

// ── Built-in extraction ─────────────────────────────────────────

/// Reads the file and extracts text in-process (pdf / txt / md).
pub struct LocalFileLoader;

#[async_trait]
impl DocumentLoader for LocalFileLoader {
    fn name(&self) -> &str {
        "local"
    }

    fn supports(&self, path: &Path) -> bool {
        is_supported(path)
    }

    async fn load(&self, path: &Path) -> Result<LoadedDocument, ExtractionError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path.to_string_lossy().into_owned();
        // PDF parsing is CPU-bound.
        tokio::task::spawn_blocking(move || extract_text(&bytes, &filename))
            .await
            .map_err(|e| ExtractionError::PdfError(format!("extraction task failed: {e}")))?
    }
}

// ── External parser ─────────────────────────────────────────────

#[derive(Deserialize)]
struct ExternalPage {
    page_number: u32,
    text: String,
}

#[derive(Deserialize)]
struct ExternalResult {
    pages: Vec<ExternalPage>,
}

/// Runs an external parser (OCR, layout service client, ...) with the file
/// path appended to its arguments and reads JSON pages from stdout.
pub struct CommandLoader {
    program: String,
    args: Vec<String>,
}

impl CommandLoader {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// Parse a whitespace-separated command line. Returns `None` when blank.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    fn parse_output(stdout: &[u8]) -> Result<LoadedDocument, ExtractionError> {
        let result: ExternalResult = serde_json::from_slice(stdout)
            .map_err(|e| ExtractionError::External(format!("bad parser output: {e}")))?;
        let pages = result
            .pages
            .into_iter()
            .map(|p| PageContent::new(p.page_number.max(1), p.text.trim()))
            .collect();
        Ok(LoadedDocument::from_pages(pages))
    }
}

#[async_trait]
impl DocumentLoader for CommandLoader {
    fn name(&self) -> &str {
        &self.program
    }

    fn supports(&self, path: &Path) -> bool {
        path.is_file()
    }

    async fn load(&self, path: &Path) -> Result<LoadedDocument, ExtractionError> {
        debug!(program = %self.program, file = %path.display(), "running external parser");
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .await
            .map_err(|e| ExtractionError::External(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::External(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Self::parse_output(&output.stdout)
    }
}

// ── Chain ───────────────────────────────────────────────────────

/// Ordered loaders tried until one yields text.
#[derive(Clone)]
pub struct LoaderChain {
    loaders: Vec<Arc<dyn DocumentLoader>>,
}

impl LoaderChain {
    pub fn new(loaders: Vec<Arc<dyn DocumentLoader>>) -> Self {
        Self { loaders }
    }

    /// Built-in extraction, then the external parser when one is configured.
    pub fn with_defaults(ocr_command: Option<&str>) -> Self {
        let mut loaders: Vec<Arc<dyn DocumentLoader>> = vec![Arc::new(LocalFileLoader)];
        if let Some(cmd) = ocr_command.and_then(CommandLoader::from_command_line) {
            loaders.push(Arc::new(cmd));
        }
        Self::new(loaders)
    }

    pub fn names(&self) -> Vec<&str> {
        self.loaders.iter().map(|l| l.name()).collect()
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.loaders.iter().any(|l| l.supports(path))
    }

    pub async fn load(&self, path: &Path) -> Result<LoadedDocument, ExtractionError> {
        let candidates: Vec<&Arc<dyn DocumentLoader>> =
            self.loaders.iter().filter(|l| l.supports(path)).collect();
        if candidates.is_empty() {
            return Err(ExtractionError::UnsupportedType(super::extension_of(path)));
        }

        let shown = path.display().to_string();
        let outcome = try_in_order(
            candidates,
            |loader| loader.name().to_string(),
            |loader| {
                let shown = shown.clone();
                async move {
                    let doc = loader.load(path).await?;
                    if doc.has_text() {
                        Ok(doc)
                    } else {
                        Err(ExtractionError::NoText(shown))
                    }
                }
            },
            |_| true,
        )
        .await;

        match outcome {
            Ok(success) => {
                info!(loader = %success.name, file = %shown, pages = success.value.stats.total_pages, "document loaded");
                Ok(success.value)
            }
            Err(exhausted) => Err(ExtractionError::AllFailed(
                exhausted
                    .attempts
                    .into_iter()
                    .map(|a| format!("{}: {}", a.name, a.error))
                    .collect(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLoader {
        name: &'static str,
        text: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FakeLoader {
        fn new(name: &'static str, text: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self { name, text, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl DocumentLoader for FakeLoader {
        fn name(&self) -> &str {
            self.name
        }

        fn supports(&self, _path: &Path) -> bool {
            true
        }

        async fn load(&self, _path: &Path) -> Result<LoadedDocument, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.text {
                Some(t) => Ok(LoadedDocument::from_pages(vec![PageContent::new(1, t)])),
                None => Err(ExtractionError::PdfError("broken".into())),
            }
        }
    }

    #[tokio::test]
    async fn falls_through_failures_and_empty_text() {
        let broken = FakeLoader::new("broken", None);
        let blank = FakeLoader::new("blank", Some("   "));
        let good = FakeLoader::new("good", Some("Điều 1."));
        let never = FakeLoader::new("never", Some("unused"));
        let chain = LoaderChain::new(vec![broken.clone(), blank.clone(), good.clone(), never.clone()]);

        let doc = chain.load(Path::new("x.pdf")).await.unwrap();
        assert_eq!(doc.text, "Điều 1.");
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(blank.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn collects_every_failure() {
        let chain = LoaderChain::new(vec![FakeLoader::new("a", None), FakeLoader::new("b", Some(""))]);
        let err = chain.load(Path::new("x.pdf")).await.unwrap_err();
        match err {
            ExtractionError::AllFailed(reasons) => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].starts_with("a: "));
                assert!(reasons[1].starts_with("b: no extractable text"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn local_loader_reads_text_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qcvn.txt");
        std::fs::write(&path, "Chương I\nĐiều 1. Phạm vi").unwrap();

        let chain = LoaderChain::with_defaults(None);
        assert_eq!(chain.names(), ["local"]);
        let doc = chain.load(&path).await.unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert!(doc.text.starts_with("Chương I"));
    }

    #[tokio::test]
    async fn unsupported_extension_without_fallback() {
        let chain = LoaderChain::with_defaults(None);
        let err = chain.load(Path::new("scan.png")).await.unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedType(ext) if ext == "png"));
    }

    #[test]
    fn command_line_parsing() {
        let loader = CommandLoader::from_command_line("uv run python scripts/ocr_pdf.py").unwrap();
        assert_eq!(loader.program, "uv");
        assert_eq!(loader.args, ["run", "python", "scripts/ocr_pdf.py"]);
        assert!(CommandLoader::from_command_line("   ").is_none());
    }

    #[test]
    fn external_output_parses_pages() {
        let json = r#"{"pages": [{"page_number": 1, "text": " Chương I "}, {"page_number": 2, "text": "Điều 1."}]}"#.as_bytes();
        let doc = CommandLoader::parse_output(json).unwrap();
        assert_eq!(doc.text, "Chương I\n\nĐiều 1.");
        assert_eq!(doc.stats.total_pages, 2);
        assert!(CommandLoader::parse_output(b"not json").is_err());
    }
}
