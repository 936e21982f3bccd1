//! Document-level metadata pulled from the head of a regulation.
//!
//! Codes look like `QCVN 06:2022/BXD`; amendments read
//! `Sửa đổi 1:2023 của QCVN 06:2022/BXD`.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use ccba_core::Chunk;

/// Only this many leading characters are scanned.
pub const METADATA_SCAN_CHARS: usize = 3000;

static DOCUMENT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(QCVN|TCVN)\s*(\d+)\s*[:\-]\s*(\d{4})(?:/(\w+))?").expect("document code pattern")
});

static AMENDMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)sửa\s+đổi\s+(\d+)\s*[:\-]\s*(\d{4})").expect("amendment pattern")
});

static AMENDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:của|cho)\s+(QCVN|TCVN)\s*(\d+)\s*[:\-]\s*(\d{4})(?:/(\w+))?")
        .expect("amends pattern")
});

static REPLACES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)thay\s+thế\s+(QCVN|TCVN)\s*(\d+)\s*[:\-]\s*(\d{4})").expect("replaces pattern")
});

static EFFECTIVE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)hiệu\s+lực\s+(?:từ\s+ngày|kể\s+từ)\s*(\d{1,2}[/\-]\d{1,2}[/\-]\d{4})")
        .expect("effective date pattern")
});

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:theo|căn\s+cứ|tham\s+chiếu)\s+((?:QCVN|TCVN)\s*\d+\s*[:\-]\s*\d{4})")
        .expect("reference pattern")
});

static CODE_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[:\-/\\\s]+").expect("code separator pattern"));

static UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").expect("underscore pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Original,
    Amendment,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Original => "original",
            DocumentType::Amendment => "amendment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document_id: String,
    pub document_name: String,
    pub document_code: Option<String>,
    pub document_type: DocumentType,
    pub amendment_number: Option<String>,
    pub amends_document: Option<String>,
    pub replaces_document: Option<String>,
    pub issuing_body: Option<String>,
    pub effective_date: Option<String>,
    pub references: Vec<String>,
}

impl DocumentMetadata {
    /// Stamp document-level fields onto every chunk.
    pub fn apply_to(&self, chunks: &mut [Chunk]) {
        for chunk in chunks {
            chunk.document_code = self.document_code.clone();
            chunk.document_type = Some(self.document_type.as_str().to_string());
            chunk.amendment_number = self.amendment_number.clone();
            chunk.amends_document = self.amends_document.clone();
        }
    }

    /// Flattened key/value view for the pipeline context.
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

/// `QCVN 06:2022/BXD` from the regex groups.
fn format_code(caps: &regex::Captures<'_>) -> String {
    let mut code = format!("{} {}:{}", caps[1].to_uppercase(), &caps[2], &caps[3]);
    if let Some(body) = caps.get(4) {
        code.push('/');
        code.push_str(&body.as_str().to_uppercase());
    }
    code
}

fn collapse_spaces(code: &str) -> String {
    code.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `QCVN 06:2022/BXD` → `qcvn_06_2022_bxd`.
pub fn normalize_document_code(code: &str) -> String {
    let lowered = code.trim().to_lowercase();
    let replaced = CODE_SEPARATORS.replace_all(&lowered, "_");
    UNDERSCORES.replace_all(&replaced, "_").trim_matches('_').to_string()
}

/// Normalized code when known, else a path-derived hash.
pub fn generate_document_id(path: &Path, code: Option<&str>) -> String {
    if let Some(code) = code {
        let normalized = normalize_document_code(code);
        if !normalized.is_empty() {
            return normalized;
        }
    }
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, text: &str, path: &Path) -> DocumentMetadata {
        let head: String = text.chars().take(METADATA_SCAN_CHARS).collect();

        let code_caps = DOCUMENT_CODE.captures(&head);
        let document_code = code_caps.as_ref().map(format_code);
        let issuing_body = code_caps
            .as_ref()
            .and_then(|c| c.get(4))
            .map(|m| m.as_str().to_uppercase());

        let amendment_number = AMENDMENT
            .captures(&head)
            .map(|c| format!("{}:{}", &c[1], &c[2]));
        let document_type = if amendment_number.is_some() {
            DocumentType::Amendment
        } else {
            DocumentType::Original
        };

        let amends_document = match document_type {
            DocumentType::Amendment => AMENDS.captures(&head).map(|c| format_code(&c)),
            DocumentType::Original => None,
        };

        let replaces_document = REPLACES
            .captures(&head)
            .map(|c| format!("{} {}:{}", c[1].to_uppercase(), &c[2], &c[3]));

        let effective_date = EFFECTIVE_DATE.captures(&head).map(|c| c[1].to_string());

        let mut references: Vec<String> = Vec::new();
        for caps in REFERENCE.captures_iter(&head) {
            let reference = collapse_spaces(&caps[1].to_uppercase());
            if !references.contains(&reference) {
                references.push(reference);
            }
        }

        let document_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        DocumentMetadata {
            document_id: generate_document_id(path, document_code.as_deref()),
            document_name,
            document_code,
            document_type,
            amendment_number,
            amends_document,
            replaces_document,
            issuing_body,
            effective_date,
            references,
        }
    }
}
