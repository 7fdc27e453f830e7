//! Citation indexes and PDF resolvers with a trait-based plugin architecture.
//!
//! This module defines the [`Source`] trait that every external index
//! implements. A source can answer "who cites this publication?"
//! ([`SourceCapabilities::CITATIONS`]), "where can I download this
//! publication's PDF?" ([`SourceCapabilities::PDF_RESOLUTION`]), or both.
//! Sources are grouped into ordered [`SourceRegistry`] instances; order is
//! preference.
//!
//! # Built-in Sources
//!
//! - `semantic` - Semantic Scholar graph API (citations, PDF resolution)
//! - `openalex` - OpenAlex works API (citations, PDF resolution)
//! - `unpaywall` - Unpaywall open access lookup by DOI (PDF resolution)
//!
//! [`MockSource`] serves scripted responses for tests.

mod mock;
mod openalex;
mod registry;
mod semantic;
mod unpaywall;

pub use mock::MockSource;
pub use openalex::OpenAlexSource;
pub use registry::{SourceCapabilities, SourceRegistry};
pub use semantic::SemanticScholarSource;
pub use unpaywall::UnpaywallSource;

use async_trait::async_trait;

use crate::models::{CitationHit, Publication};

/// The Source trait defines the interface for all external index plugins.
///
/// # Implementing a New Source
///
/// 1. Create a struct that implements `Source`
/// 2. Implement `id`, `name` and `capabilities`
/// 3. Implement the lookup methods matching the declared capabilities
/// 4. Register it in [`SourceRegistry::from_ids`] or push it into a registry
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source (used in configuration, e.g. "openalex")
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Describe the capabilities of this source
    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::CITATIONS
    }

    /// Whether this source can list citing papers
    fn supports_citations(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::CITATIONS)
    }

    /// Whether this source can resolve PDF URLs
    fn supports_pdf_resolution(&self) -> bool {
        self.capabilities()
            .contains(SourceCapabilities::PDF_RESOLUTION)
    }

    /// Papers citing `publication_id`, at most `max_results` of them
    async fn citing_papers(
        &self,
        _publication_id: &str,
        _max_results: usize,
    ) -> Result<Vec<CitationHit>, SourceError> {
        Err(SourceError::NotImplemented)
    }

    /// Candidate PDF URLs for a publication, best first
    async fn resolve_pdf_urls(
        &self,
        _publication: &Publication,
    ) -> Result<Vec<String>, SourceError> {
        Err(SourceError::NotImplemented)
    }
}

/// Errors that can occur when interacting with a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The requested operation is not implemented for this source
    #[error("Operation not implemented for this source")]
    NotImplemented,

    /// Network or HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded, with the server's retry-after hint in seconds
    #[error("Rate limit exceeded")]
    RateLimit(Option<u64>),

    /// Publication not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// API error from the source
    #[error("API error: {0}")]
    Api(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_decode() {
            SourceError::Parse(err.to_string())
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

/// Map non-success HTTP responses onto [`SourceError`]
pub(crate) async fn check_response(
    source: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        return Err(SourceError::RateLimit(retry_after));
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(format!(
            "{} has no record ({})",
            source,
            response.url().path()
        )));
    }

    let text = response.text().await.unwrap_or_default();
    let snippet: String = text.chars().take(200).collect();
    if status.is_server_error() {
        Err(SourceError::Api(format!(
            "{} service unavailable (status {}): {}",
            source, status, snippet
        )))
    } else {
        Err(SourceError::Api(format!(
            "{} returned status {}: {}",
            source, status, snippet
        )))
    }
}

/// Strip resolver prefixes from a DOI and lowercase it
pub fn normalize_doi(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let stripped = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| lower.strip_prefix(*prefix))
        .unwrap_or(lower.as_str());
    stripped.starts_with("10.").then(|| stripped.to_string())
}
