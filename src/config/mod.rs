//! Configuration management.
//!
//! Configuration is read from an optional TOML file and then overridden by
//! environment variables prefixed with `CITATION_HARVEST_`, using `__` between
//! section and key (`CITATION_HARVEST_PIPELINE__DOWNLOAD_CONCURRENCY=8`).

mod file_config;

pub use file_config::{default_config_toml, find_config_file, write_default_config, CONFIG_ENV_VAR};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::{RetryOn, RetryPolicy};

/// Extraction backends known to the pipeline
pub const KNOWN_BACKENDS: &[&str] = &["pdf-extract", "lopdf"];

/// Source ids that can be configured
pub const KNOWN_SOURCES: &[&str] = &["semantic", "openalex", "unpaywall"];

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pipeline stage gates and worker limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_true")]
    pub enable_citation_discovery: bool,

    #[serde(default = "default_true")]
    pub enable_pdf_download: bool,

    #[serde(default = "default_true")]
    pub enable_fulltext: bool,

    /// Maximum download tasks in flight
    #[serde(default = "default_concurrency")]
    pub download_concurrency: usize,

    /// Retries per candidate URL after the first attempt
    #[serde(default = "default_retry_limit")]
    pub download_retry_limit: u32,

    /// Extraction backends in fallback order
    #[serde(default = "default_backend_order")]
    pub extraction_backend_order: Vec<String>,

    /// Citing papers kept per seed
    #[serde(default = "default_max_citing")]
    pub max_citing_papers: usize,

    /// Maximum extraction jobs in flight
    #[serde(default = "default_concurrency")]
    pub extraction_concurrency: usize,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_extraction_timeout")]
    pub extraction_timeout_secs: u64,

    #[serde(default = "default_initial_delay")]
    pub retry_initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub retry_max_delay_ms: u64,

    /// Extractions with fewer words count as malformed
    #[serde(default = "default_min_words")]
    pub min_word_count: usize,

    #[serde(default = "default_max_pdf_size")]
    pub max_pdf_size_mb: u64,

    /// Ceiling for citation index requests, per source
    #[serde(default = "default_rps")]
    pub citation_requests_per_second: f64,

    /// Treat an unreachable citation index as "discovery skipped" for the seed
    #[serde(default = "default_true")]
    pub continue_on_citation_failure: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_citation_discovery: true,
            enable_pdf_download: true,
            enable_fulltext: true,
            download_concurrency: default_concurrency(),
            download_retry_limit: default_retry_limit(),
            extraction_backend_order: default_backend_order(),
            max_citing_papers: default_max_citing(),
            extraction_concurrency: default_concurrency(),
            download_timeout_secs: default_download_timeout(),
            extraction_timeout_secs: default_extraction_timeout(),
            retry_initial_delay_ms: default_initial_delay(),
            retry_max_delay_ms: default_max_delay(),
            min_word_count: default_min_words(),
            max_pdf_size_mb: default_max_pdf_size(),
            citation_requests_per_second: default_rps(),
            continue_on_citation_failure: true,
        }
    }
}

impl PipelineConfig {
    /// Download retry policy derived from the configured limits
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.download_retry_limit,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff_multiplier: 2.0,
            retry_on: RetryOn::AnyTransient,
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_secs)
    }

    pub fn max_pdf_bytes(&self) -> u64 {
        self.max_pdf_size_mb.saturating_mul(1024 * 1024)
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    5
}

fn default_retry_limit() -> u32 {
    3
}

fn default_backend_order() -> Vec<String> {
    KNOWN_BACKENDS.iter().map(|s| s.to_string()).collect()
}

fn default_max_citing() -> usize {
    100
}

fn default_download_timeout() -> u64 {
    30
}

fn default_extraction_timeout() -> u64 {
    60
}

fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_min_words() -> usize {
    20
}

fn default_max_pdf_size() -> u64 {
    100
}

fn default_rps() -> f64 {
    1.0
}

/// Citation indexes and PDF resolvers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Citation indexes in preference order
    #[serde(default = "default_citation_sources")]
    pub citation_sources: Vec<String>,

    /// PDF URL resolvers in preference order
    #[serde(default = "default_pdf_resolvers")]
    pub pdf_resolvers: Vec<String>,

    /// Semantic Scholar API key (optional, for higher rate limits)
    #[serde(default)]
    pub semantic_scholar_api_key: Option<String>,

    /// Contact email for the OpenAlex polite pool
    #[serde(default)]
    pub openalex_email: Option<String>,

    /// Contact email required by Unpaywall
    #[serde(default)]
    pub unpaywall_email: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            citation_sources: default_citation_sources(),
            pdf_resolvers: default_pdf_resolvers(),
            semantic_scholar_api_key: None,
            openalex_email: None,
            unpaywall_email: None,
        }
    }
}

fn default_citation_sources() -> Vec<String> {
    vec!["semantic".to_string(), "openalex".to_string()]
}

fn default_pdf_resolvers() -> Vec<String> {
    vec![
        "semantic".to_string(),
        "openalex".to_string(),
        "unpaywall".to_string(),
    ]
}

/// Artifact store location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_dir")]
    pub directory: PathBuf,

    /// Fingerprint index manifest; defaults to `<directory>/index.json`
    #[serde(default)]
    pub manifest: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: default_store_dir(),
            manifest: None,
        }
    }
}

impl StoreConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.manifest
            .clone()
            .unwrap_or_else(|| self.directory.join("index.json"))
    }
}

fn default_store_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("citation-harvest")
        .join("artifacts")
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Configuration errors; fatal, raised before a run starts
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

impl Config {
    /// Check every invariant the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.download_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.download_concurrency must be at least 1".to_string(),
            ));
        }
        if p.extraction_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.extraction_concurrency must be at least 1".to_string(),
            ));
        }
        if p.download_timeout_secs == 0 || p.extraction_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        if !p.citation_requests_per_second.is_finite() || p.citation_requests_per_second <= 0.0 {
            return Err(ConfigError::Invalid(
                "pipeline.citation_requests_per_second must be positive".to_string(),
            ));
        }
        if p.max_citing_papers == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_citing_papers must be at least 1".to_string(),
            ));
        }
        if p.extraction_backend_order.is_empty() {
            return Err(ConfigError::Invalid(
                "pipeline.extraction_backend_order is empty".to_string(),
            ));
        }
        if let Some(unknown) = p
            .extraction_backend_order
            .iter()
            .find(|b| !KNOWN_BACKENDS.contains(&b.as_str()))
        {
            return Err(ConfigError::Invalid(format!(
                "unknown extraction backend '{}' (known: {})",
                unknown,
                KNOWN_BACKENDS.join(", ")
            )));
        }
        if let Some(unknown) = self
            .sources
            .citation_sources
            .iter()
            .chain(&self.sources.pdf_resolvers)
            .find(|s| !KNOWN_SOURCES.contains(&s.as_str()))
        {
            return Err(ConfigError::Invalid(format!(
                "unknown source '{}' (known: {})",
                unknown,
                KNOWN_SOURCES.join(", ")
            )));
        }
        Ok(())
    }
}

/// Load configuration from an optional file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }
    let settings = builder
        .add_source(
            config::Environment::with_prefix("CITATION_HARVEST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("pipeline.extraction_backend_order")
                .with_list_parse_key("sources.citation_sources")
                .with_list_parse_key("sources.pdf_resolvers"),
        )
        .build()?;

    let config: Config = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Get the configuration from the discovered config file, or defaults
pub fn get_config() -> Result<Config, ConfigError> {
    load_config(find_config_file().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.pipeline.enable_citation_discovery);
        assert_eq!(config.pipeline.download_concurrency, 5);
        assert_eq!(config.pipeline.download_retry_limit, 3);
        assert_eq!(
            config.pipeline.extraction_backend_order,
            vec!["pdf-extract", "lopdf"]
        );
        assert_eq!(config.pipeline.max_citing_papers, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.pipeline.download_concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validation_rejects_unknown_backend() {
        let mut config = Config::default();
        config.pipeline.extraction_backend_order = vec!["poppler".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poppler"));
    }

    #[test]
    fn test_validation_rejects_bad_rate() {
        let mut config = Config::default();
        config.pipeline.citation_requests_per_second = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("citation-harvest.toml");
        std::fs::write(
            &path,
            r#"
[pipeline]
enable_fulltext = false
download_concurrency = 2
extraction_backend_order = ["lopdf"]

[sources]
citation_sources = ["openalex"]
openalex_email = "lab@example.org"
"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert!(!config.pipeline.enable_fulltext);
        assert_eq!(config.pipeline.download_concurrency, 2);
        assert_eq!(config.pipeline.extraction_backend_order, vec!["lopdf"]);
        assert_eq!(config.sources.citation_sources, vec!["openalex"]);
        assert_eq!(config.pipeline.download_retry_limit, 3);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let pipeline = PipelineConfig {
            download_retry_limit: 5,
            retry_initial_delay_ms: 10,
            ..PipelineConfig::default()
        };
        let policy = pipeline.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
        assert_eq!(pipeline.max_pdf_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_manifest_defaults_into_store_dir() {
        let store = StoreConfig {
            directory: PathBuf::from("/data/artifacts"),
            manifest: None,
        };
        assert_eq!(
            store.manifest_path(),
            PathBuf::from("/data/artifacts/index.json")
        );
    }
}
