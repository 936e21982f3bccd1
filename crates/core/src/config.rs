use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub store: StoreConfig,
    pub ingestion: IngestionConfig,
}

/// Well-known env keys that identify a profile when prefixed.
const PROFILE_MARKER_KEYS: &[&str] = &[
    "PG_HOST",
    "VECTOR_STORE",
    "EMBEDDING_URL",
    "GEMINI_API_KEY",
    "GROQ_API_KEY",
    "OPENAI_API_KEY",
];

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `CCBA_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("CCBA_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            chunking: ChunkingConfig::from_env_profiled(p),
            embedding: EmbeddingConfig::from_env_profiled(p),
            reranker: RerankerConfig::from_env_profiled(p),
            retrieval: RetrievalConfig::from_env_profiled(p),
            generation: GenerationConfig::from_env_profiled(p),
            store: StoreConfig::from_env_profiled(p),
            ingestion: IngestionConfig::from_env_profiled(p),
        }
    }

    /// Discover available profiles by scanning env vars for `{PREFIX}_{MARKER_KEY}` patterns.
    /// Always includes "default" (the unprefixed config).
    pub fn available_profiles() -> Vec<String> {
        let mut profiles = std::collections::BTreeSet::new();
        profiles.insert("default".to_string());

        for (key, _) in env::vars() {
            for marker in PROFILE_MARKER_KEYS {
                if let Some(prefix) = key.strip_suffix(&format!("_{}", marker)) {
                    if !prefix.is_empty()
                        && prefix.chars().all(|c| c.is_ascii_uppercase() || c == '_')
                    {
                        profiles.insert(prefix.to_string());
                    }
                }
            }
        }

        profiles.into_iter().collect()
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  chunking:    max={}, min={}, overlap={}",
            self.chunking.max_chars, self.chunking.min_chars, self.chunking.overlap_chars
        );
        tracing::info!(
            "  embedding:   provider={}, model={}, dims={}, sparse_dims={}",
            self.embedding.provider, self.embedding.model, self.embedding.dimensions, self.embedding.sparse_dimensions
        );
        tracing::info!(
            "  reranker:    enabled={}, url={}",
            self.reranker.enabled, self.reranker.url
        );
        tracing::info!(
            "  retrieval:   rrf_k={}, cache={}",
            self.retrieval.rrf_k, self.retrieval.query_cache_size
        );
        tracing::info!(
            "  generation:  primary={}, fallback={}",
            self.generation.primary_provider,
            self.generation.fallback_provider.as_deref().unwrap_or("(none)")
        );
        tracing::info!("  store:       backend={}", self.store.backend);
        tracing::info!(
            "  ingestion:   report_dir={}",
            self.ingestion.report_dir.as_ref().map(|d| d.display().to_string()).unwrap_or_else(|| "(none)".into())
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        let g = &self.generation;
        serde_json::json!({
            "profile": self.profile_label(),
            "chunking": self.chunking,
            "embedding": {
                "provider": self.embedding.provider,
                "url": self.embedding.url,
                "model": self.embedding.model,
                "dimensions": self.embedding.dimensions,
                "sparse_dimensions": self.embedding.sparse_dimensions,
                "configured": self.embedding.is_configured(),
            },
            "reranker": {
                "enabled": self.reranker.enabled,
                "url": self.reranker.url,
                "top_k": self.reranker.top_k,
                "top_n": self.reranker.top_n,
            },
            "retrieval": self.retrieval,
            "generation": {
                "primary": g.primary_provider,
                "fallback": g.fallback_provider,
                "gemini": { "model": g.gemini.model, "configured": g.gemini.is_configured() },
                "groq": { "model": g.groq.model, "configured": g.groq.is_configured() },
                "deepseek": { "model": g.deepseek.model, "configured": g.deepseek.is_configured() },
                "openai": { "model": g.openai.model, "configured": g.openai.is_configured() },
                "ollama": { "model": g.ollama.model, "url": g.ollama.base_url },
            },
            "store": {
                "backend": self.store.backend,
                "host": self.store.postgres.host,
                "database": self.store.postgres.database,
                "table": self.store.postgres.table,
                "configured": self.store.postgres.is_configured(),
            },
        })
    }
}

impl Config {
    /// Reject settings that would only fail later, mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let g = &self.generation;
        for name in std::iter::once(g.primary_provider.as_str()).chain(g.fallback_provider.as_deref()) {
            if g.provider(name).is_none() {
                return Err(ConfigError::UnknownProvider(name.to_string()));
            }
        }
        if !matches!(self.embedding.provider.as_str(), "ollama" | "openai") {
            return Err(ConfigError::UnknownProvider(self.embedding.provider.clone()));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid { key: "EMBEDDING_DIMENSIONS".into(), value: "0".into() });
        }
        if self.chunking.max_chars == 0 {
            return Err(ConfigError::Invalid { key: "MAX_CHUNK_CHARS".into(), value: "0".into() });
        }
        if !(0.0..=1.0).contains(&self.ingestion.coverage_warn_ratio) {
            return Err(ConfigError::Invalid {
                key: "COVERAGE_WARN_RATIO".into(),
                value: self.ingestion.coverage_warn_ratio.to_string(),
            });
        }
        match self.store.backend.as_str() {
            "memory" => {}
            "pgvector" | "postgres" if self.store.postgres.is_configured() => {}
            "pgvector" | "postgres" => {
                return Err(ConfigError::Missing { provider: "pgvector".into(), key: "PG_USERNAME".into() });
            }
            other => return Err(ConfigError::UnknownProvider(other.to_string())),
        }
        Ok(())
    }
}

// ── Chunking ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub min_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 2000, min_chars: 100, overlap_chars: 200 }
    }
}

impl ChunkingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            max_chars: profiled_env_parse(p, "MAX_CHUNK_CHARS", d.max_chars),
            min_chars: profiled_env_parse(p, "MIN_CHUNK_CHARS", d.min_chars),
            overlap_chars: profiled_env_parse(p, "CHUNK_OVERLAP_CHARS", d.overlap_chars),
        }
    }
}

// ── Embedding ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama", "openai"
    pub provider: String,
    pub url: String,
    pub model: String,
    pub dimensions: u32,
    pub batch_size: u32,
    /// Size of the hashed lexical vocabulary for sparse vectors.
    pub sparse_dimensions: u32,
    pub api_key: Option<String>,
}

impl EmbeddingConfig {
    fn from_env_profiled(p: &str) -> Self {
        let provider = profiled_env_or(p, "EMBEDDING_PROVIDER", "ollama");
        let (default_url, default_model) = match provider.as_str() {
            "openai" => ("https://api.openai.com", "text-embedding-3-small"),
            _ => ("http://localhost:11434", "bge-m3"),
        };
        Self {
            url: profiled_env_or(p, "EMBEDDING_URL", default_url),
            model: profiled_env_or(p, "EMBEDDING_MODEL", default_model),
            dimensions: profiled_env_parse(p, "EMBEDDING_DIMENSIONS", 1024),
            batch_size: profiled_env_parse(p, "EMBEDDING_BATCH_SIZE", 32),
            sparse_dimensions: profiled_env_parse(p, "SPARSE_DIMENSIONS", 250_002),
            api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            provider,
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}

// ── Reranker ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub url: String,
    pub model: String,
    /// Candidates pulled from each search leg.
    pub top_k: usize,
    /// Results kept after fusion/rerank.
    pub top_n: usize,
}

impl RerankerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            enabled: profiled_env_bool(p, "ENABLE_RERANKER", true),
            url: profiled_env_or(p, "RERANKER_URL", "http://localhost:8080"),
            model: profiled_env_or(p, "RERANKER_MODEL", "BAAI/bge-reranker-v2-m3"),
            top_k: profiled_env_parse(p, "RERANKER_TOP_K", 20),
            top_n: profiled_env_parse(p, "RERANKER_TOP_N", 5),
        }
    }
}

// ── Retrieval ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Reciprocal-rank-fusion damping constant.
    pub rrf_k: u32,
    /// Query embedding LRU capacity (0 disables the cache).
    pub query_cache_size: usize,
}

impl RetrievalConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            rrf_k: profiled_env_parse(p, "RRF_K", 60),
            query_cache_size: profiled_env_parse(p, "QUERY_CACHE_SIZE", 256),
        }
    }
}

// ── Generation ────────────────────────────────────────────────

/// Connection settings for one generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl ProviderConfig {
    fn from_env_profiled(p: &str, prefix: &str, default_model: &str, default_url: &str) -> Self {
        Self {
            api_key: profiled_env_opt(p, &format!("{prefix}_API_KEY")),
            model: profiled_env_or(p, &format!("{prefix}_MODEL"), default_model),
            base_url: profiled_env_or(p, &format!("{prefix}_BASE_URL"), default_url),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// "gemini", "groq", "deepseek", "openai", "ollama"
    pub primary_provider: String,
    pub fallback_provider: Option<String>,
    pub gemini: ProviderConfig,
    pub groq: ProviderConfig,
    pub deepseek: ProviderConfig,
    pub openai: ProviderConfig,
    pub ollama: ProviderConfig,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            primary_provider: profiled_env_or(p, "PRIMARY_PROVIDER", "gemini"),
            fallback_provider: profiled_env_opt(p, "FALLBACK_PROVIDER")
                .filter(|v| !v.eq_ignore_ascii_case("none")),
            gemini: ProviderConfig::from_env_profiled(
                p,
                "GEMINI",
                "gemini-2.0-flash",
                "https://generativelanguage.googleapis.com",
            ),
            groq: ProviderConfig::from_env_profiled(
                p,
                "GROQ",
                "llama-3.3-70b-versatile",
                "https://api.groq.com/openai",
            ),
            deepseek: ProviderConfig::from_env_profiled(
                p,
                "DEEPSEEK",
                "deepseek-chat",
                "https://api.deepseek.com",
            ),
            openai: ProviderConfig::from_env_profiled(
                p,
                "OPENAI",
                "gpt-4o-mini",
                "https://api.openai.com",
            ),
            ollama: ProviderConfig::from_env_profiled(
                p,
                "OLLAMA",
                "qwen2.5:7b",
                "http://localhost:11434",
            ),
            temperature: profiled_env_parse(p, "GENERATION_TEMPERATURE", 0.1),
            max_tokens: profiled_env_parse(p, "GENERATION_MAX_TOKENS", 2048),
        }
    }

    /// Settings block for a provider name, if known.
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        match name.to_ascii_lowercase().as_str() {
            "gemini" => Some(&self.gemini),
            "groq" => Some(&self.groq),
            "deepseek" => Some(&self.deepseek),
            "openai" => Some(&self.openai),
            "ollama" => Some(&self.ollama),
            _ => None,
        }
    }
}

// ── Vector store ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "memory" or "pgvector"
    pub backend: String,
    pub postgres: PostgresConfig,
}

impl StoreConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            backend: profiled_env_or(p, "VECTOR_STORE", "memory"),
            postgres: PostgresConfig::from_env_profiled(p),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
    pub table: String,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_parse(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "ccba"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_parse(p, "PG_MAX_CONNECTIONS", 10),
            table: profiled_env_or(p, "PG_TABLE", "chunks"),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Ingestion ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Directory for run reports; `None` disables report files.
    pub report_dir: Option<PathBuf>,
    /// Coverage below this ratio is logged as a warning.
    pub coverage_warn_ratio: f64,
    /// External parser tried after the built-in loaders, e.g. `uv run python scripts/ocr_pdf.py`.
    /// Invoked with the file path appended; must print `{"pages": [{"page_number", "text"}]}`.
    pub ocr_command: Option<String>,
}

impl IngestionConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            report_dir: profiled_env_opt(p, "REPORT_DIR").map(PathBuf::from),
            coverage_warn_ratio: profiled_env_parse(p, "COVERAGE_WARN_RATIO", 0.9),
            ocr_command: profiled_env_opt(p, "OCR_COMMAND"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests use unique key prefixes so they stay independent under
    // the parallel test runner.

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        env::set_var("CFGTEST_A_MAX_CHUNK_CHARS", "1500");
        let c = ChunkingConfig::from_env_profiled("CFGTEST_A");
        assert_eq!(c.max_chars, 1500);
        env::remove_var("CFGTEST_A_MAX_CHUNK_CHARS");
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        env::set_var("CFGTEST_B_RRF_K", "sixty");
        let r = RetrievalConfig::from_env_profiled("CFGTEST_B");
        assert_eq!(r.rrf_k, 60);
        env::remove_var("CFGTEST_B_RRF_K");
    }

    #[test]
    fn bool_flags_accept_common_spellings() {
        env::set_var("CFGTEST_C_ENABLE_RERANKER", "off");
        assert!(!RerankerConfig::from_env_profiled("CFGTEST_C").enabled);
        env::set_var("CFGTEST_C_ENABLE_RERANKER", "Yes");
        assert!(RerankerConfig::from_env_profiled("CFGTEST_C").enabled);
        env::remove_var("CFGTEST_C_ENABLE_RERANKER");
    }

    #[test]
    fn fallback_none_means_disabled() {
        env::set_var("CFGTEST_D_FALLBACK_PROVIDER", "none");
        let g = GenerationConfig::from_env_profiled("CFGTEST_D");
        assert!(g.fallback_provider.is_none());
        env::remove_var("CFGTEST_D_FALLBACK_PROVIDER");
    }

    #[test]
    fn provider_lookup_by_name() {
        let g = GenerationConfig::from_env_profiled("CFGTEST_E");
        assert!(g.provider("Groq").is_some());
        assert!(g.provider("claude").is_none());
    }

    #[test]
    fn validate_rejects_unknown_providers_and_bad_ratios() {
        let mut config = Config::for_profile("CFGTEST_F");
        config.generation.primary_provider = "gemini".into();
        config.generation.fallback_provider = Some("groq".into());
        config.embedding.provider = "ollama".into();
        config.embedding.dimensions = 1024;
        config.store.backend = "memory".into();
        config.ingestion.coverage_warn_ratio = 0.9;
        assert!(config.validate().is_ok());

        config.generation.fallback_provider = Some("claude".into());
        assert!(matches!(config.validate(), Err(ConfigError::UnknownProvider(p)) if p == "claude"));

        config.generation.fallback_provider = None;
        config.ingestion.coverage_warn_ratio = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn connection_string_uses_defaults() {
        let pg = PostgresConfig {
            host: "db".into(),
            port: 5433,
            database: "ccba".into(),
            username: Some("u".into()),
            password: Some("p".into()),
            ssl_mode: "disable".into(),
            max_connections: 4,
            table: "chunks".into(),
        };
        assert_eq!(pg.connection_string(), "postgres://u:p@db:5433/ccba?sslmode=disable");
    }
}
