//! Unpaywall source implementation.
//!
//! Uses the Unpaywall API to find open access copies of a DOI.
//! API documentation: <https://unpaywall.org/products/api>

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::Publication;
use crate::sources::{check_response, normalize_doi, Source, SourceCapabilities, SourceError};
use crate::utils::HttpClient;

const UNPAYWALL_API_BASE: &str = "https://api.unpaywall.org/v2";

/// Unpaywall PDF resolver
///
/// Requires an email address (free, no key needed). Publications without a
/// DOI resolve to no URLs.
#[derive(Debug, Clone)]
pub struct UnpaywallSource {
    client: HttpClient,
    base_url: String,
    email: Option<String>,
}

impl UnpaywallSource {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: UNPAYWALL_API_BASE.to_string(),
            email: std::env::var("UNPAYWALL_EMAIL").ok(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Point the source at another API root (mirrors, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Source for UnpaywallSource {
    fn id(&self) -> &str {
        "unpaywall"
    }

    fn name(&self) -> &str {
        "Unpaywall"
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::PDF_RESOLUTION
    }

    async fn resolve_pdf_urls(&self, publication: &Publication) -> Result<Vec<String>, SourceError> {
        let Some(doi) = publication
            .doi
            .as_deref()
            .and_then(normalize_doi)
            .or_else(|| normalize_doi(publication.id()))
        else {
            return Ok(Vec::new());
        };

        let Some(email) = self.email.as_deref() else {
            return Err(SourceError::InvalidRequest(
                "Unpaywall requires a contact email (sources.unpaywall_email)".to_string(),
            ));
        };

        let url = format!(
            "{}/{}?email={}",
            self.base_url,
            doi,
            urlencoding::encode(email)
        );
        let response = self.client.get(&url).send().await?;
        let response = match check_response(self.name(), response).await {
            Ok(response) => response,
            Err(SourceError::NotFound(_)) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let record: UnpaywallResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("Failed to parse Unpaywall response: {}", e)))?;
        Ok(record.pdf_urls())
    }
}

/// Unpaywall API response
#[derive(Debug, Deserialize)]
struct UnpaywallResponse {
    best_oa_location: Option<UnpaywallLocation>,
    #[serde(default)]
    oa_locations: Vec<UnpaywallLocation>,
}

impl UnpaywallResponse {
    fn pdf_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for url in self
            .best_oa_location
            .iter()
            .chain(&self.oa_locations)
            .filter_map(|loc| loc.url_for_pdf.as_deref())
        {
            if !url.is_empty() && !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }
}

#[derive(Debug, Deserialize)]
struct UnpaywallLocation {
    url_for_pdf: Option<String>,
}
