//! Publication model flowing through the acquisition pipeline.

use serde::{Deserialize, Serialize};

use super::{ExtractionStats, TerminalStatus};

/// How a publication entered the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "cited_id")]
pub enum Origin {
    /// Supplied by the caller as a seed
    Seed,
    /// Discovered because it cites the given publication
    CitingPaper(String),
}

/// Acquisition status of a publication within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "status")]
pub enum AcquisitionStatus {
    /// Not processed yet
    Pending,
    /// Pipeline is working on it
    InProgress,
    /// Processing finished with the given terminal status
    Finished(TerminalStatus),
}

impl Default for AcquisitionStatus {
    fn default() -> Self {
        AcquisitionStatus::Pending
    }
}

/// A publication from any citation index or seed list
///
/// The identifier is opaque (DOI, arXiv id, Semantic Scholar id, ...) and
/// never changes. Everything else is filled in by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    /// Unique identifier (DOI, accession number, source-specific id)
    id: String,

    /// Publication title
    pub title: String,

    /// Abstract text
    pub r#abstract: Option<String>,

    /// Digital Object Identifier, when known separately from `id`
    pub doi: Option<String>,

    /// Candidate PDF URLs in order of preference
    pub pdf_urls: Vec<String>,

    /// Extracted and cleaned full text
    pub full_text: Option<String>,

    /// Statistics of the extraction that produced `full_text`
    pub extraction_stats: Option<ExtractionStats>,

    /// Where this publication came from
    pub origin: Origin,

    /// Acquisition status
    #[serde(default)]
    pub status: AcquisitionStatus,
}

impl Publication {
    /// Create a new seed publication
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            r#abstract: None,
            doi: None,
            pdf_urls: Vec::new(),
            full_text: None,
            extraction_stats: None,
            origin: Origin::Seed,
            status: AcquisitionStatus::Pending,
        }
    }

    /// Immutable identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the DOI if known, else the identifier
    pub fn primary_id(&self) -> &str {
        self.doi.as_deref().unwrap_or(&self.id)
    }

    /// Check if the publication has at least one candidate PDF URL
    pub fn has_pdf(&self) -> bool {
        !self.pdf_urls.is_empty()
    }

    /// Whether this publication was supplied as a seed
    pub fn is_seed(&self) -> bool {
        matches!(self.origin, Origin::Seed)
    }

    /// Add a candidate PDF URL unless it is already listed
    pub fn push_pdf_url(&mut self, url: impl Into<String>) {
        let url = url.into();
        if !url.is_empty() && !self.pdf_urls.contains(&url) {
            self.pdf_urls.push(url);
        }
    }
}

/// Builder for constructing Publication objects
#[derive(Debug, Clone)]
pub struct PublicationBuilder {
    publication: Publication,
}

impl PublicationBuilder {
    /// Create a new builder with required fields
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            publication: Publication::new(id, title),
        }
    }

    /// Set abstract
    pub fn abstract_text(mut self, abstract_text: impl Into<String>) -> Self {
        let text = abstract_text.into();
        if !text.is_empty() {
            self.publication.r#abstract = Some(text);
        }
        self
    }

    /// Set DOI
    pub fn doi(mut self, doi: impl Into<String>) -> Self {
        let doi = doi.into();
        if !doi.is_empty() {
            self.publication.doi = Some(doi);
        }
        self
    }

    /// Append a candidate PDF URL
    pub fn pdf_url(mut self, url: impl Into<String>) -> Self {
        self.publication.push_pdf_url(url);
        self
    }

    /// Append several candidate PDF URLs, keeping their order
    pub fn pdf_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for url in urls {
            self.publication.push_pdf_url(url);
        }
        self
    }

    /// Mark the publication as a citing paper of `cited_id`
    pub fn citing(mut self, cited_id: impl Into<String>) -> Self {
        self.publication.origin = Origin::CitingPaper(cited_id.into());
        self
    }

    /// Build the Publication
    pub fn build(self) -> Publication {
        self.publication
    }
}
