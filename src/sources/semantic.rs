//! Semantic Scholar source implementation.

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{CitationHit, CitingMetadata, Publication};
use crate::sources::{check_response, normalize_doi, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const SEMANTIC_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Largest page the citations endpoint accepts
const MAX_PAGE: usize = 1000;

const CITATION_FIELDS: &str = "title,abstract,externalIds,openAccessPdf";

/// Semantic Scholar source
///
/// Uses the Semantic Scholar graph API.
#[derive(Debug, Clone)]
pub struct SemanticScholarSource {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarSource {
    /// Create a new Semantic Scholar source
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: SEMANTIC_API_BASE.to_string(),
            api_key: std::env::var("SEMANTIC_SCHOLAR_API_KEY").ok(),
        }
    }

    /// Use an API key (optional, for higher rate limits)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Point the source at another API root (mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Semantic Scholar wants DOIs prefixed with `DOI:`
    fn paper_key(id: &str) -> String {
        match normalize_doi(id) {
            Some(doi) => format!("DOI:{}", doi),
            None => id.to_string(),
        }
    }

    fn get(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let builder = self.client.get(&format!("{}{}", self.base_url, endpoint));
        if let Some(ref key) = self.api_key {
            builder.header("x-api-key", key)
        } else {
            builder
        }
    }

    fn parse_hit(paper: S2Paper) -> Option<CitationHit> {
        let doi = paper
            .external_ids
            .as_ref()
            .and_then(|ids| ids.doi.as_deref())
            .and_then(normalize_doi);
        let citing_id = doi.clone().or(paper.paper_id)?;

        let metadata = CitingMetadata {
            title: paper.title.unwrap_or_default(),
            r#abstract: paper.r#abstract.filter(|a| !a.is_empty()),
            doi,
            pdf_urls: paper
                .open_access_pdf
                .and_then(|pdf| pdf.url)
                .filter(|url| !url.is_empty())
                .into_iter()
                .collect(),
            source: "semantic".to_string(),
        };
        Some(CitationHit::new(citing_id, metadata))
    }
}

#[async_trait]
impl Source for SemanticScholarSource {
    fn id(&self) -> &str {
        "semantic"
    }

    fn name(&self) -> &str {
        "Semantic Scholar"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::CITATIONS | SourceCapabilities::PDF_RESOLUTION
    }

    async fn citing_papers(
        &self,
        publication_id: &str,
        max_results: usize,
    ) -> Result<Vec<CitationHit>, SourceError> {
        let endpoint = format!(
            "/paper/{}/citations?fields={}&limit={}",
            urlencoding::encode(&Self::paper_key(publication_id)),
            CITATION_FIELDS,
            max_results.clamp(1, MAX_PAGE)
        );

        let response = self.get(&endpoint).send().await?;
        let response = check_response(self.name(), response).await?;
        let data: CitationsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse JSON: {}", e)))?;

        Ok(data
            .data
            .into_iter()
            .filter_map(|edge| edge.citing_paper)
            .filter_map(Self::parse_hit)
            .take(max_results)
            .collect())
    }

    async fn resolve_pdf_urls(&self, publication: &Publication) -> Result<Vec<String>, SourceError> {
        let endpoint = format!(
            "/paper/{}?fields=openAccessPdf",
            urlencoding::encode(&Self::paper_key(publication.primary_id()))
        );

        let response = self.get(&endpoint).send().await?;
        let response = match check_response(self.name(), response).await {
            Ok(response) => response,
            Err(SourceError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let paper: S2Paper = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse JSON: {}", e)))?;

        Ok(paper
            .open_access_pdf
            .and_then(|pdf| pdf.url)
            .filter(|url| !url.is_empty())
            .into_iter()
            .collect())
    }
}

// ===== Semantic Scholar API Types =====

#[derive(Debug, Deserialize)]
struct S2Paper {
    #[serde(rename = "paperId")]
    paper_id: Option<String>,
    title: Option<String>,
    r#abstract: Option<String>,
    #[serde(rename = "externalIds")]
    external_ids: Option<S2ExternalIds>,
    #[serde(rename = "openAccessPdf")]
    open_access_pdf: Option<S2OpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct S2ExternalIds {
    #[serde(rename = "DOI")]
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct S2OpenAccessPdf {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CitationEdge {
    #[serde(rename = "citingPaper")]
    citing_paper: Option<S2Paper>,
}

#[derive(Debug, Deserialize)]
struct CitationsResponse {
    #[serde(default)]
    data: Vec<CitationEdge>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_key() {
        assert_eq!(
            SemanticScholarSource::paper_key("10.1000/XYZ"),
            "DOI:10.1000/xyz"
        );
        assert_eq!(SemanticScholarSource::paper_key("abc123"), "abc123");
    }

    #[test]
    fn test_parse_hit_prefers_doi() {
        let json = r#"{
            "paperId": "s2id",
            "title": "Citing work",
            "abstract": "",
            "externalIds": {"DOI": "10.2/B"},
            "openAccessPdf": {"url": "https://example.org/b.pdf"}
        }"#;
        let paper: S2Paper = serde_json::from_str(json).unwrap();
        let hit = SemanticScholarSource::parse_hit(paper).unwrap();
        assert_eq!(hit.citing_id, "10.2/b");
        assert_eq!(hit.metadata.r#abstract, None);
        assert_eq!(hit.metadata.pdf_urls, vec!["https://example.org/b.pdf"]);
    }

    #[test]
    fn test_parse_hit_without_any_id_is_dropped() {
        let paper: S2Paper = serde_json::from_str(r#"{"title": "orphan"}"#).unwrap();
        assert!(SemanticScholarSource::parse_hit(paper).is_none());
    }
}
