//! Ordered registry of source plugins.

use std::sync::Arc;

use super::{OpenAlexSource, SemanticScholarSource, Source, SourceError, UnpaywallSource};
use crate::config::SourcesConfig;
use crate::utils::HttpClient;

bitflags::bitflags! {
    /// Capabilities that a source can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const CITATIONS = 1 << 0;
        const PDF_RESOLUTION = 1 << 1;
    }
}

/// Sources in preference order
///
/// Registering a source whose id is already present replaces it in place.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in sources named by `ids`, in that order
    pub fn from_ids(
        ids: &[String],
        settings: &SourcesConfig,
        client: &HttpClient,
    ) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        for id in ids {
            let source: Arc<dyn Source> = match id.as_str() {
                "semantic" => {
                    let mut source = SemanticScholarSource::new(client.clone());
                    if let Some(ref key) = settings.semantic_scholar_api_key {
                        source = source.with_api_key(key.clone());
                    }
                    Arc::new(source)
                }
                "openalex" => {
                    let mut source = OpenAlexSource::new(client.clone());
                    if let Some(ref email) = settings.openalex_email {
                        source = source.with_email(email.clone());
                    }
                    Arc::new(source)
                }
                "unpaywall" => {
                    let mut source = UnpaywallSource::new(client.clone());
                    if let Some(ref email) = settings.unpaywall_email {
                        source = source.with_email(email.clone());
                    }
                    Arc::new(source)
                }
                other => {
                    return Err(SourceError::InvalidRequest(format!(
                        "Source '{}' not found",
                        other
                    )))
                }
            };
            registry.register(source);
        }
        Ok(registry)
    }

    /// Append a source, or replace the one with the same id
    pub fn register(&mut self, source: Arc<dyn Source>) {
        match self.sources.iter().position(|s| s.id() == source.id()) {
            Some(index) => self.sources[index] = source,
            None => self.sources.push(source),
        }
    }

    /// Builder-style [`SourceRegistry::register`]
    pub fn with(mut self, source: Arc<dyn Source>) -> Self {
        self.register(source);
        self
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// All sources in preference order
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    /// Source IDs in preference order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id())
    }

    /// Sources that support a specific capability, order preserved
    pub fn with_capability(&self, capability: SourceCapabilities) -> Vec<&Arc<dyn Source>> {
        self.all()
            .filter(|s| s.capabilities().contains(capability))
            .collect()
    }

    /// Check if a source exists
    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;

    #[test]
    fn test_from_ids_preserves_order() {
        let client = HttpClient::new().unwrap();
        let ids = vec!["openalex".to_string(), "semantic".to_string()];
        let registry = SourceRegistry::from_ids(&ids, &SourcesConfig::default(), &client).unwrap();

        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["openalex", "semantic"]);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let client = HttpClient::new().unwrap();
        let ids = vec!["scholar".to_string()];
        assert!(SourceRegistry::from_ids(&ids, &SourcesConfig::default(), &client).is_err());
    }

    #[test]
    fn test_capability_filter() {
        let client = HttpClient::new().unwrap();
        let registry = SourceRegistry::from_ids(
            &SourcesConfig::default().pdf_resolvers,
            &SourcesConfig::default(),
            &client,
        )
        .unwrap();

        let citation_capable: Vec<_> = registry
            .with_capability(SourceCapabilities::CITATIONS)
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        assert_eq!(citation_capable, vec!["semantic", "openalex"]);
        assert_eq!(
            registry
                .with_capability(SourceCapabilities::PDF_RESOLUTION)
                .len(),
            3
        );
    }

    #[test]
    fn test_register_replaces_same_id() {
        let registry = SourceRegistry::new()
            .with(Arc::new(MockSource::new("a")))
            .with(Arc::new(MockSource::new("b")))
            .with(Arc::new(MockSource::unavailable("a")));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
