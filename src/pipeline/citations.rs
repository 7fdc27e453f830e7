//! Citation discovery across one or more citation indexes.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{CitationHit, CitationRecord, CitingPaper};
use crate::sources::{Source, SourceCapabilities, SourceError, SourceRegistry};
use crate::utils::{citation_retry_policy, with_retry, RateLimiter, RetryPolicy};

/// Every citation source failed for a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnavailable {
    /// `(source id, diagnostic)` per failed source
    pub failures: Vec<(String, String)>,
}

impl std::fmt::Display for SourceUnavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.failures.is_empty() {
            return f.write_str("no citation sources configured");
        }
        let parts: Vec<String> = self
            .failures
            .iter()
            .map(|(source, message)| format!("{}: {}", source, message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Result of [`CitationFinder::find_citing_papers`]
///
/// `unavailable` is set only when no source could be reached; the citing list
/// is then empty. Callers decide what an unavailable index means for them.
#[derive(Debug, Clone, Default)]
pub struct CitationLookup {
    pub citing: Vec<CitingPaper>,
    pub unavailable: Option<SourceUnavailable>,
}

impl CitationLookup {
    /// The normalized citation records
    pub fn records(&self) -> Vec<CitationRecord> {
        self.citing.iter().map(|c| c.record.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.citing.is_empty()
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable.is_some()
    }
}

struct PacedSource {
    source: Arc<dyn Source>,
    limiter: Option<RateLimiter>,
}

/// Queries citation indexes in preference order and merges their answers
pub struct CitationFinder {
    sources: Vec<PacedSource>,
    retry: RetryPolicy,
}

impl CitationFinder {
    /// Use every citation-capable source of `registry`, each paced to
    /// `requests_per_second`
    pub fn new(registry: &SourceRegistry, requests_per_second: f64) -> Self {
        let sources = registry
            .with_capability(SourceCapabilities::CITATIONS)
            .into_iter()
            .map(|source| PacedSource {
                source: Arc::clone(source),
                limiter: RateLimiter::per_second(requests_per_second),
            })
            .collect();
        Self {
            sources,
            retry: citation_retry_policy(),
        }
    }

    /// Override the rate-limit retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.source.id()).collect()
    }

    /// Papers citing `publication_id`, deduplicated and capped at `max_results`
    pub async fn find_citing_papers(
        &self,
        publication_id: &str,
        max_results: usize,
    ) -> CitationLookup {
        if max_results == 0 {
            return CitationLookup::default();
        }

        let mut merged: Vec<CitingPaper> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut failures = Vec::new();
        let mut reachable = 0usize;

        for paced in &self.sources {
            match self.lookup(paced, publication_id, max_results).await {
                Ok(hits) => {
                    reachable += 1;
                    tracing::debug!(
                        "{} reported {} citing papers for {}",
                        paced.source.id(),
                        hits.len(),
                        publication_id
                    );
                    for hit in hits {
                        merge_hit(&mut merged, &mut positions, publication_id, hit);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Citation lookup for {} failed on {}: {}",
                        publication_id,
                        paced.source.id(),
                        e
                    );
                    failures.push((paced.source.id().to_string(), e.to_string()));
                }
            }
        }

        if reachable == 0 {
            return CitationLookup {
                citing: Vec::new(),
                unavailable: Some(SourceUnavailable { failures }),
            };
        }

        merged.truncate(max_results);
        CitationLookup {
            citing: merged,
            unavailable: None,
        }
    }

    async fn lookup(
        &self,
        paced: &PacedSource,
        publication_id: &str,
        max_results: usize,
    ) -> Result<Vec<CitationHit>, SourceError> {
        let source = &paced.source;
        let limiter = paced.limiter.as_ref();
        let result = with_retry(self.retry, || async move {
            if let Some(limiter) = limiter {
                limiter.acquire().await;
            }
            source.citing_papers(publication_id, max_results).await
        })
        .await;

        match result {
            // The index is reachable, it just does not know this publication
            Err(SourceError::NotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }
}

impl std::fmt::Debug for CitationFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CitationFinder")
            .field("sources", &self.source_ids())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Insert a hit unless its (citing, cited) pair is already present, in which
/// case missing metadata is filled in from the later source
fn merge_hit(
    merged: &mut Vec<CitingPaper>,
    positions: &mut HashMap<String, usize>,
    cited_id: &str,
    hit: CitationHit,
) {
    let citing_id = hit.citing_id.trim();
    if citing_id.is_empty() || citing_id == cited_id {
        return;
    }

    match positions.get(citing_id) {
        Some(&index) => {
            let existing = &mut merged[index].metadata;
            if existing.title.is_empty() {
                existing.title = hit.metadata.title;
            }
            if existing.r#abstract.is_none() {
                existing.r#abstract = hit.metadata.r#abstract;
            }
            if existing.doi.is_none() {
                existing.doi = hit.metadata.doi;
            }
            for url in hit.metadata.pdf_urls {
                if !existing.pdf_urls.contains(&url) {
                    existing.pdf_urls.push(url);
                }
            }
        }
        None => {
            positions.insert(citing_id.to_string(), merged.len());
            merged.push(CitingPaper {
                record: CitationRecord::new(citing_id, cited_id),
                metadata: hit.metadata,
            });
        }
    }
}
