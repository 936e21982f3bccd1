use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use ccba_ingest::embedding::{Embedder, EmbeddingError, HybridEmbedder, LexicalEncoder};
use ccba_ingest::pipeline::{
    ChunkStage, EmbedStage, FileReport, FileStatus, IngestionPipeline, LoadStage, Outcome, Payload, PipelineContext,
    PipelineStage, StageError, StoreStage, VerifyStage,
};
use ccba_ingest::{IndexingService, LoadedDocument, LoaderChain, PageContent, SplitterConfig, StructuralSplitter};
use ccba_storage::{InMemoryVectorStore, VectorStore};

const DIMS: usize = 3;

struct FakeEmbedder {
    call_count: AtomicUsize,
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn name(&self) -> &str {
        "fake"
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0, 0.5]).collect())
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

fn embedder() -> HybridEmbedder {
    HybridEmbedder::new(
        Arc::new(FakeEmbedder { call_count: AtomicUsize::new(0) }),
        Arc::new(LexicalEncoder::new(10_000)),
        8,
    )
}

fn splitter() -> StructuralSplitter {
    StructuralSplitter::new(SplitterConfig { max_chars: 400, min_chars: 20, overlap: 40 })
}

fn pipeline(store: Arc<dyn VectorStore>) -> IngestionPipeline {
    IngestionPipeline::standard(LoaderChain::with_defaults(None), splitter(), embedder(), store, true, 0.9)
}

const QCVN_06: &str = "\
QCVN 06:2022/BXD
QUY CHUẨN KỸ THUẬT QUỐC GIA VỀ AN TOÀN CHÁY CHO NHÀ VÀ CÔNG TRÌNH
Chương I: QUY ĐỊNH CHUNG
Điều 1. Phạm vi điều chỉnh
Quy chuẩn này quy định các yêu cầu chung về an toàn cháy cho các gian phòng, nhà và công trình xây dựng.
Điều 2. Đối tượng áp dụng
Quy chuẩn này áp dụng đối với tổ chức, cá nhân có liên quan đến hoạt động xây dựng.
Chương II: BẢO ĐẢM AN TOÀN CHO NGƯỜI
Điều 3. Lối ra thoát nạn
Mỗi tầng của nhà phải có không ít hơn hai lối ra thoát nạn.";

const QCVN_01: &str = "\
QCVN 01:2021/BXD
QUY CHUẨN KỸ THUẬT QUỐC GIA VỀ QUY HOẠCH XÂY DỰNG
Điều 1. Phạm vi điều chỉnh
Quy chuẩn này quy định các mức giới hạn của đặc tính kỹ thuật trong đồ án quy hoạch.";

fn write_corpus(dir: &Path) {
    std::fs::write(dir.join("qcvn_06.txt"), QCVN_06).unwrap();
    std::fs::create_dir(dir.join("quy_hoach")).unwrap();
    std::fs::write(dir.join("quy_hoach").join("qcvn_01.md"), QCVN_01).unwrap();
    std::fs::write(dir.join("blank.txt"), "   \n\n  ").unwrap();
    std::fs::write(dir.join("scan.png"), [0u8, 1, 2]).unwrap();
}

#[tokio::test]
async fn single_file_runs_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let store = Arc::new(InMemoryVectorStore::new(DIMS));

    let ctx = pipeline(store.clone()).run(&dir.path().join("qcvn_06.txt")).await;

    assert_eq!(ctx.outcome, Outcome::Completed);
    assert!(ctx.errors.is_empty());
    assert_eq!(ctx.metadata_str("document_id"), Some("qcvn_06_2022_bxd"));
    assert_eq!(ctx.metadata_str("document_code"), Some("QCVN 06:2022/BXD"));
    for key in ["pages", "total_chars", "chunks_created", "split_coverage", "embed_ms", "store_ms", "coverage", "chunks_indexed"] {
        assert!(ctx.stat(key).is_some(), "missing stat {key}");
    }

    let indexed = ctx.stat("chunks_indexed").unwrap() as u64;
    assert!(indexed >= 3);
    assert_eq!(store.count().await.unwrap(), indexed);

    let docs = store.list_documents().await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].document_id, "qcvn_06_2022_bxd");
}

#[tokio::test]
async fn reindexing_replaces_previous_chunks() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let store = Arc::new(InMemoryVectorStore::new(DIMS));
    let pipeline = pipeline(store.clone());
    let path = dir.path().join("qcvn_06.txt");

    pipeline.run(&path).await;
    let first = store.count().await.unwrap();
    pipeline.run(&path).await;
    assert_eq!(store.count().await.unwrap(), first);
}

#[tokio::test]
async fn load_failure_marks_file_failed() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let store = Arc::new(InMemoryVectorStore::new(DIMS));

    let ctx = pipeline(store.clone()).run(&dir.path().join("blank.txt")).await;
    assert_eq!(ctx.outcome, Outcome::Failed { stage: "load".into() });
    assert_eq!(ctx.errors.len(), 1);
    assert!(ctx.errors[0].starts_with("load: "));
    assert_eq!(store.count().await.unwrap(), 0);
}

struct StopStage;

#[async_trait]
impl PipelineStage for StopStage {
    fn name(&self) -> &str {
        "stop"
    }

    async fn run(&self, _ctx: &mut PipelineContext, _payload: Payload) -> Result<Option<Payload>, StageError> {
        Ok(None)
    }
}

struct CountingStage {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PipelineStage for CountingStage {
    fn name(&self) -> &str {
        "counting"
    }

    async fn run(&self, _ctx: &mut PipelineContext, payload: Payload) -> Result<Option<Payload>, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(payload))
    }
}

#[tokio::test]
async fn short_circuit_is_reported_as_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = IngestionPipeline::new(vec![
        Box::new(LoadStage::new(LoaderChain::with_defaults(None))),
        Box::new(StopStage),
        Box::new(CountingStage { calls: calls.clone() }),
    ]);

    let ctx = pipeline.run(&dir.path().join("qcvn_06.txt")).await;
    assert_eq!(ctx.outcome, Outcome::ShortCircuited { stage: "stop".into() });
    assert!(ctx.stat("pages").is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(FileReport::from_context(&ctx).status, FileStatus::Skipped);
}

/// Hands the chunk stage a document whose pages hold only whitespace.
struct BlankDocumentStage;

#[async_trait]
impl PipelineStage for BlankDocumentStage {
    fn name(&self) -> &str {
        "blank"
    }

    async fn run(&self, _ctx: &mut PipelineContext, _payload: Payload) -> Result<Option<Payload>, StageError> {
        let doc = LoadedDocument::from_pages(vec![PageContent::new(1, "  \n\t "), PageContent::new(2, "\n")]);
        Ok(Some(Payload::Document(doc)))
    }
}

#[tokio::test]
async fn empty_split_skips_embed_store_and_verify() {
    let dense = Arc::new(FakeEmbedder { call_count: AtomicUsize::new(0) });
    let embedder = HybridEmbedder::new(dense.clone(), Arc::new(LexicalEncoder::new(10_000)), 8);
    let store = Arc::new(InMemoryVectorStore::new(DIMS));
    let pipeline = IngestionPipeline::new(vec![
        Box::new(BlankDocumentStage),
        Box::new(ChunkStage::new(splitter())),
        Box::new(EmbedStage::new(embedder)),
        Box::new(StoreStage::new(store.clone(), true)),
        Box::new(VerifyStage::new(0.9)),
    ]);

    let ctx = pipeline.run(Path::new("/tmp/trang_trang.pdf")).await;

    assert_eq!(ctx.outcome, Outcome::ShortCircuited { stage: "chunk".into() });
    assert!(ctx.errors.is_empty());
    assert!(ctx.stat("chunks_created").is_none());
    assert!(ctx.stat("chunks_indexed").is_none());
    assert_eq!(dense.call_count.load(Ordering::SeqCst), 0);
    assert_eq!(store.count().await.unwrap(), 0);

    let report = FileReport::from_context(&ctx);
    assert_eq!(report.status, FileStatus::Skipped);
    assert_eq!(report.chunks, 0);
}

#[tokio::test]
async fn directory_indexing_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let reports = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let store = Arc::new(InMemoryVectorStore::new(DIMS));
    let service = IndexingService::new(pipeline(store.clone()), store.clone(), Some(reports.path().to_path_buf()));

    let report = service.index_directory(dir.path(), true).await.unwrap();

    // scan.png is not a supported type and is never attempted.
    assert_eq!(report.summary.total_files, 3);
    assert_eq!(report.summary.success, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.skipped, 0);
    assert_eq!(report.summary.total_chunks, store.count().await.unwrap());
    assert!(report.end_time.is_some());

    let files: Vec<&str> = report.files.iter().map(|f| f.file.as_str()).collect();
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);

    let saved = reports.path().join(report.file_name());
    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(saved).unwrap()).unwrap();
    assert_eq!(json["summary"]["success"], 2);
    assert_eq!(json["details"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn indexing_rejects_missing_directory() {
    let store = Arc::new(InMemoryVectorStore::new(DIMS));
    let service = IndexingService::new(pipeline(store.clone()), store, None);
    assert!(service.index_directory(Path::new("/definitely/not/here"), false).await.is_err());
}
