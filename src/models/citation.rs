//! Citation records produced by citation discovery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Publication, PublicationBuilder};

/// A single "citing cites cited" edge found during one discovery run
///
/// Records are never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    citing_id: String,
    cited_id: String,
    discovered_at: DateTime<Utc>,
}

impl CitationRecord {
    /// Create a record stamped with the current time
    pub fn new(citing_id: impl Into<String>, cited_id: impl Into<String>) -> Self {
        Self::at(citing_id, cited_id, Utc::now())
    }

    /// Create a record with an explicit discovery timestamp
    pub fn at(
        citing_id: impl Into<String>,
        cited_id: impl Into<String>,
        discovered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            citing_id: citing_id.into(),
            cited_id: cited_id.into(),
            discovered_at,
        }
    }

    pub fn citing_id(&self) -> &str {
        &self.citing_id
    }

    pub fn cited_id(&self) -> &str {
        &self.cited_id
    }

    pub fn discovered_at(&self) -> DateTime<Utc> {
        self.discovered_at
    }

    /// Deduplication key
    pub fn pair(&self) -> (&str, &str) {
        (&self.citing_id, &self.cited_id)
    }
}

/// Metadata a citation source returns about a citing paper
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitingMetadata {
    pub title: String,
    pub r#abstract: Option<String>,
    pub doi: Option<String>,
    pub pdf_urls: Vec<String>,
    /// Id of the source that reported it
    pub source: String,
}

/// Raw lookup hit from a citation source: `{citing_id, metadata}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationHit {
    pub citing_id: String,
    pub metadata: CitingMetadata,
}

impl CitationHit {
    pub fn new(citing_id: impl Into<String>, metadata: CitingMetadata) -> Self {
        Self {
            citing_id: citing_id.into(),
            metadata,
        }
    }
}

/// A normalized citation together with what is known about the citing paper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitingPaper {
    pub record: CitationRecord,
    pub metadata: CitingMetadata,
}

impl CitingPaper {
    /// Turn the citing paper into a publication for the rest of the pipeline
    pub fn to_publication(&self) -> Publication {
        let mut builder = PublicationBuilder::new(self.record.citing_id(), &self.metadata.title)
            .pdf_urls(self.metadata.pdf_urls.iter().cloned())
            .citing(self.record.cited_id());
        if let Some(ref abstract_text) = self.metadata.r#abstract {
            builder = builder.abstract_text(abstract_text.clone());
        }
        if let Some(ref doi) = self.metadata.doi {
            builder = builder.doi(doi.clone());
        }
        builder.build()
    }
}
