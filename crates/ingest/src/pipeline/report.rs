use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use super::context::{Outcome, PipelineContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub status: FileStatus,
    pub chunks: u64,
    pub coverage: f64,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<String, f64>,
}

impl FileReport {
    pub fn from_context(ctx: &PipelineContext) -> Self {
        let status = match &ctx.outcome {
            Outcome::Failed { .. } => FileStatus::Failed,
            Outcome::ShortCircuited { .. } => FileStatus::Skipped,
            _ if ctx.has_errors() => FileStatus::Failed,
            _ => FileStatus::Success,
        };
        Self {
            file: ctx.file_path.display().to_string(),
            status,
            chunks: ctx.stat("chunks_indexed").unwrap_or(0.0) as u64,
            coverage: ctx.stat("coverage").unwrap_or(0.0),
            errors: ctx.errors.clone(),
            stats: ctx.stats.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_files: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_chunks: u64,
}

/// One indexing run over a set of files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionReport {
    pub run_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub summary: ReportSummary,
    #[serde(rename = "details")]
    pub files: Vec<FileReport>,
}

impl Default for IngestionReport {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionReport {
    pub fn new() -> Self {
        Self {
            run_id: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            start_time: Utc::now(),
            end_time: None,
            summary: ReportSummary::default(),
            files: Vec::new(),
        }
    }

    pub fn add(&mut self, file: FileReport) {
        self.summary.total_files += 1;
        match file.status {
            FileStatus::Success => self.summary.success += 1,
            FileStatus::Failed => self.summary.failed += 1,
            FileStatus::Skipped => self.summary.skipped += 1,
        }
        self.summary.total_chunks += file.chunks;
        self.files.push(file);
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    pub fn file_name(&self) -> String {
        format!("ingestion_report_{}.json", self.run_id)
    }

    /// Write the report as pretty JSON into `dir`, creating it if needed.
    pub async fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(outcome: Outcome, errors: &[&str], chunks: f64) -> PipelineContext {
        let mut ctx = PipelineContext::new("data/qcvn06.pdf");
        ctx.outcome = outcome;
        for e in errors {
            ctx.add_error(*e);
        }
        ctx.set_stat("chunks_indexed", chunks);
        ctx.set_stat("coverage", 0.97);
        ctx
    }

    #[test]
    fn status_follows_outcome() {
        let cases = [
            (context(Outcome::Completed, &[], 10.0), FileStatus::Success),
            (context(Outcome::Completed, &["Verification: No chunks indexed"], 0.0), FileStatus::Failed),
            (context(Outcome::Failed { stage: "load".into() }, &["load: bad pdf"], 0.0), FileStatus::Failed),
            (context(Outcome::ShortCircuited { stage: "chunk".into() }, &[], 0.0), FileStatus::Skipped),
        ];
        for (ctx, expected) in cases {
            assert_eq!(FileReport::from_context(&ctx).status, expected, "{:?}", ctx.outcome);
        }
    }

    #[test]
    fn summary_aggregates_files() {
        let mut report = IngestionReport::new();
        report.add(FileReport::from_context(&context(Outcome::Completed, &[], 12.0)));
        report.add(FileReport::from_context(&context(Outcome::Completed, &[], 3.0)));
        report.add(FileReport::from_context(&context(Outcome::ShortCircuited { stage: "chunk".into() }, &[], 0.0)));
        report.add(FileReport::from_context(&context(Outcome::Failed { stage: "store".into() }, &["store: down"], 0.0)));

        assert_eq!(
            report.summary,
            ReportSummary { total_files: 4, success: 2, failed: 1, skipped: 1, total_chunks: 15 }
        );
    }

    #[tokio::test]
    async fn saves_json_with_details() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = IngestionReport::new();
        report.add(FileReport::from_context(&context(Outcome::Completed, &[], 5.0)));
        report.finish();

        let path = report.save(dir.path()).await.unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("ingestion_report_"));

        let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["summary"]["total_files"], 1);
        assert_eq!(json["summary"]["skipped"], 0);
        assert_eq!(json["details"][0]["status"], "success");
        assert_eq!(json["details"][0]["chunks"], 5);
        assert!(json["end_time"].is_string());
    }
}
