//! Mock source for testing purposes.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::models::{CitationHit, CitingMetadata, Publication};
use crate::sources::{Source, SourceCapabilities, SourceError};

/// A mock source that returns predefined responses.
///
/// Queued errors for an id are returned (one per call) before its scripted
/// citations; an unavailable mock fails every call with a network error.
#[derive(Debug)]
pub struct MockSource {
    id: String,
    capabilities: SourceCapabilities,
    citations: Mutex<HashMap<String, Vec<CitationHit>>>,
    pdf_urls: Mutex<HashMap<String, Vec<String>>>,
    errors: Mutex<HashMap<String, VecDeque<SourceError>>>,
    unavailable: bool,
    calls: AtomicUsize,
}

impl MockSource {
    /// Create a new mock source with both capabilities.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            capabilities: SourceCapabilities::CITATIONS | SourceCapabilities::PDF_RESOLUTION,
            citations: Mutex::new(HashMap::new()),
            pdf_urls: Mutex::new(HashMap::new()),
            errors: Mutex::new(HashMap::new()),
            unavailable: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// A mock whose every call fails
    pub fn unavailable(id: impl Into<String>) -> Self {
        Self {
            unavailable: true,
            ..Self::new(id)
        }
    }

    pub fn with_capabilities(mut self, capabilities: SourceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Script the citing papers of `cited_id`
    pub fn with_citations<I, S>(self, cited_id: &str, citing_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hits = citing_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                let metadata = CitingMetadata {
                    title: format!("Paper {}", id),
                    source: self.id.clone(),
                    ..CitingMetadata::default()
                };
                CitationHit::new(id, metadata)
            })
            .collect();
        self.with_hits(cited_id, hits)
    }

    /// Script full citation hits for `cited_id`
    pub fn with_hits(self, cited_id: &str, hits: Vec<CitationHit>) -> Self {
        self.citations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cited_id.to_string(), hits);
        self
    }

    /// Script resolved PDF URLs for a publication id
    pub fn with_pdf_urls<I, S>(self, publication_id: &str, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pdf_urls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                publication_id.to_string(),
                urls.into_iter().map(Into::into).collect(),
            );
        self
    }

    /// Queue an error for the next call concerning `id`
    pub fn queue_error(&self, id: &str, error: SourceError) {
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id.to_string())
            .or_default()
            .push_back(error);
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin_call(&self, id: &str) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(SourceError::Network(format!("{} is unreachable", self.id)));
        }
        let queued = self
            .errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Source for MockSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Mock Source"
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    async fn citing_papers(
        &self,
        publication_id: &str,
        max_results: usize,
    ) -> Result<Vec<CitationHit>, SourceError> {
        self.begin_call(publication_id)?;
        let citations = self.citations.lock().unwrap_or_else(|e| e.into_inner());
        Ok(citations
            .get(publication_id)
            .map(|hits| hits.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }

    async fn resolve_pdf_urls(&self, publication: &Publication) -> Result<Vec<String>, SourceError> {
        self.begin_call(publication.id())?;
        let urls = self.pdf_urls.lock().unwrap_or_else(|e| e.into_inner());
        Ok(urls.get(publication.id()).cloned().unwrap_or_default())
    }
}
