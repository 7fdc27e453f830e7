//! OpenAlex source implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::models::{CitationHit, CitingMetadata, Publication};
use crate::sources::{check_response, normalize_doi, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Largest page size the works endpoint accepts
const MAX_PER_PAGE: usize = 200;

/// OpenAlex source
///
/// Uses the OpenAlex REST API. Citation lookups need the OpenAlex work id,
/// so DOIs are resolved to a work first.
#[derive(Debug, Clone)]
pub struct OpenAlexSource {
    client: HttpClient,
    base_url: String,
    email: Option<String>,
}

impl OpenAlexSource {
    /// Create a new OpenAlex source
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: OPENALEX_API_BASE.to_string(),
            email: std::env::var("OPENALEX_EMAIL").ok(),
        }
    }

    /// Contact email (recommended, grants the polite pool)
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Point the source at another API root (mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, endpoint: &str) -> String {
        let mut url = format!("{}{}", self.base_url, endpoint);
        if let Some(ref email) = self.email {
            url.push(if endpoint.contains('?') { '&' } else { '?' });
            url.push_str("mailto=");
            url.push_str(&urlencoding::encode(email));
        }
        url
    }

    /// Short work id (`W123`) if `id` already is one
    fn work_id(id: &str) -> Option<&str> {
        let short = id.trim().trim_start_matches("https://openalex.org/");
        let mut chars = short.chars();
        (chars.next() == Some('W') && short.len() > 1 && chars.all(|c| c.is_ascii_digit()))
            .then_some(short)
    }

    async fn fetch_work(&self, id: &str) -> Result<OAWork, SourceError> {
        let key = match normalize_doi(id) {
            Some(doi) => format!("doi:{}", doi),
            None => id.to_string(),
        };
        let response = self
            .client
            .get(&self.url(&format!("/works/{}", key)))
            .send()
            .await?;
        let response = check_response(self.name(), response).await?;
        response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse JSON: {}", e)))
    }

    fn parse_hit(work: OAWork) -> Option<CitationHit> {
        let doi = work.doi.as_deref().and_then(normalize_doi);
        let citing_id = doi.clone().or_else(|| {
            work.id
                .as_deref()
                .and_then(Self::work_id)
                .map(|s| s.to_string())
        })?;

        let metadata = CitingMetadata {
            title: work.display_name.clone().unwrap_or_default(),
            r#abstract: work
                .abstract_inverted_index
                .as_ref()
                .map(rebuild_abstract)
                .filter(|a| !a.is_empty()),
            doi,
            pdf_urls: work.pdf_urls(),
            source: "openalex".to_string(),
        };
        Some(CitationHit::new(citing_id, metadata))
    }
}

/// OpenAlex ships abstracts as word -> positions
fn rebuild_abstract(index: &BTreeMap<String, Vec<usize>>) -> String {
    let mut words: BTreeMap<usize, &str> = BTreeMap::new();
    for (word, positions) in index {
        for position in positions {
            words.insert(*position, word);
        }
    }
    words.into_values().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Source for OpenAlexSource {
    fn id(&self) -> &str {
        "openalex"
    }

    fn name(&self) -> &str {
        "OpenAlex"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::CITATIONS | SourceCapabilities::PDF_RESOLUTION
    }

    async fn citing_papers(
        &self,
        publication_id: &str,
        max_results: usize,
    ) -> Result<Vec<CitationHit>, SourceError> {
        let work_id = match Self::work_id(publication_id) {
            Some(id) => id.to_string(),
            None => {
                let work = self.fetch_work(publication_id).await?;
                work.id
                    .as_deref()
                    .and_then(Self::work_id)
                    .map(|s| s.to_string())
                    .ok_or_else(|| {
                        SourceError::Parse(format!("OpenAlex work without id for {}", publication_id))
                    })?
            }
        };

        let endpoint = format!(
            "/works?filter=cites:{}&per-page={}",
            work_id,
            max_results.clamp(1, MAX_PER_PAGE)
        );
        let response = self.client.get(&self.url(&endpoint)).send().await?;
        let response = check_response(self.name(), response).await?;
        let data: WorksResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse JSON: {}", e)))?;

        Ok(data
            .results
            .into_iter()
            .filter_map(Self::parse_hit)
            .take(max_results)
            .collect())
    }

    async fn resolve_pdf_urls(&self, publication: &Publication) -> Result<Vec<String>, SourceError> {
        match self.fetch_work(publication.primary_id()).await {
            Ok(work) => Ok(work.pdf_urls()),
            Err(SourceError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

// ===== OpenAlex API Types =====

#[derive(Debug, Deserialize)]
struct OAWork {
    id: Option<String>,
    display_name: Option<String>,
    doi: Option<String>,
    abstract_inverted_index: Option<BTreeMap<String, Vec<usize>>>,
    best_oa_location: Option<OALocation>,
    #[serde(default)]
    locations: Vec<OALocation>,
}

impl OAWork {
    /// Best location first, then every other location with a PDF
    fn pdf_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for url in self
            .best_oa_location
            .iter()
            .chain(&self.locations)
            .filter_map(|loc| loc.pdf_url.as_deref())
        {
            if !url.is_empty() && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }
}

#[derive(Debug, Deserialize)]
struct OALocation {
    pdf_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<OAWork>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_id() {
        assert_eq!(OpenAlexSource::work_id("W2741809807"), Some("W2741809807"));
        assert_eq!(
            OpenAlexSource::work_id("https://openalex.org/W42"),
            Some("W42")
        );
        assert_eq!(OpenAlexSource::work_id("10.1/x"), None);
        assert_eq!(OpenAlexSource::work_id("W"), None);
    }

    #[test]
    fn test_rebuild_abstract() {
        let mut index = BTreeMap::new();
        index.insert("cites".to_string(), vec![1]);
        index.insert("This".to_string(), vec![0]);
        index.insert("this".to_string(), vec![2]);
        assert_eq!(rebuild_abstract(&index), "This cites this");
    }

    #[test]
    fn test_pdf_urls_deduplicated_in_order() {
        let json = r#"{
            "id": "https://openalex.org/W1",
            "display_name": "A work",
            "doi": "https://doi.org/10.9/W1",
            "best_oa_location": {"pdf_url": "https://a.org/1.pdf"},
            "locations": [
                {"pdf_url": "https://a.org/1.pdf"},
                {"pdf_url": null},
                {"pdf_url": "https://b.org/1.pdf"}
            ]
        }"#;
        let work: OAWork = serde_json::from_str(json).unwrap();
        assert_eq!(
            work.pdf_urls(),
            vec!["https://a.org/1.pdf", "https://b.org/1.pdf"]
        );
        let hit = OpenAlexSource::parse_hit(work).unwrap();
        assert_eq!(hit.citing_id, "10.9/w1");
    }
}
