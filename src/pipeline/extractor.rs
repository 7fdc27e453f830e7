//! Full-text extraction with ordered backend fallback.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{clean_text, detect_sections, PipelineError};
use crate::models::{ArtifactRef, ContentFingerprint, ExtractionResult};
use crate::store::ArtifactStore;

/// Why a backend produced no usable text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("parse failed: {0}")]
    Parse(String),

    #[error("backend panicked")]
    Panicked,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("only {words} words extracted")]
    TooShort { words: usize },

    #[error("no text extracted")]
    Empty,
}

/// A text extraction implementation
///
/// Implementations are synchronous and may be slow or panic on hostile input;
/// [`FullTextExtractor`] runs them on the blocking pool under a timeout.
pub trait ExtractionBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    fn extract(&self, bytes: &[u8]) -> Result<String, BackendError>;
}

/// Backend built on the `pdf-extract` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractBackend;

impl ExtractionBackend for PdfExtractBackend {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, BackendError> {
        pdf_extract::extract_text_from_mem(bytes).map_err(|e| BackendError::Parse(e.to_string()))
    }
}

/// Backend built on `lopdf` page text extraction
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfBackend;

impl ExtractionBackend for LopdfBackend {
    fn name(&self) -> &str {
        "lopdf"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, BackendError> {
        let document =
            lopdf::Document::load_mem(bytes).map_err(|e| BackendError::Parse(e.to_string()))?;
        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        if pages.is_empty() {
            return Err(BackendError::Empty);
        }
        document
            .extract_text(&pages)
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

/// Look up a built-in backend by its configuration name
pub fn backend_by_name(name: &str) -> Option<Arc<dyn ExtractionBackend>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "pdf-extract" | "pdf_extract" => Some(Arc::new(PdfExtractBackend)),
        "lopdf" => Some(Arc::new(LopdfBackend)),
        _ => None,
    }
}

/// Turns stored PDF artifacts into [`ExtractionResult`]s
///
/// Backends are tried in order. Output that is empty or shorter than the
/// minimum word count counts as a failure and moves on to the next backend.
#[derive(Debug, Clone)]
pub struct FullTextExtractor {
    backends: Vec<Arc<dyn ExtractionBackend>>,
    timeout: Duration,
    min_word_count: usize,
}

impl FullTextExtractor {
    pub fn new(backends: Vec<Arc<dyn ExtractionBackend>>) -> Result<Self, PipelineError> {
        if backends.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one extraction backend is required".to_string(),
            ));
        }
        Ok(Self {
            backends,
            timeout: Duration::from_secs(60),
            min_word_count: 20,
        })
    }

    /// Build from backend names such as `["pdf-extract", "lopdf"]`
    pub fn from_names(names: &[String]) -> Result<Self, PipelineError> {
        let backends = names
            .iter()
            .map(|name| {
                backend_by_name(name).ok_or_else(|| {
                    PipelineError::InvalidConfig(format!("unknown extraction backend '{}'", name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(backends)
    }

    /// Hard timeout per backend attempt
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_min_word_count(mut self, min_word_count: usize) -> Self {
        self.min_word_count = min_word_count;
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Extract the artifact referenced by `artifact` from `store`
    pub async fn extract(&self, store: &dyn ArtifactStore, artifact: &ArtifactRef) -> ExtractionResult {
        match store.get(&artifact.fingerprint).await {
            Ok(bytes) => {
                self.extract_bytes(artifact.fingerprint.clone(), Arc::new(bytes))
                    .await
            }
            Err(e) => ExtractionResult::failure(
                artifact.fingerprint.clone(),
                format!("artifact unreadable: {}", e),
            ),
        }
    }

    /// Extract a PDF from the local filesystem
    pub async fn extract_file(&self, path: &Path) -> std::io::Result<ExtractionResult> {
        let bytes = tokio::fs::read(path).await?;
        let fingerprint = ContentFingerprint::of(&bytes);
        Ok(self.extract_bytes(fingerprint, Arc::new(bytes)).await)
    }

    /// Run the backend chain over raw bytes
    pub async fn extract_bytes(
        &self,
        fingerprint: ContentFingerprint,
        bytes: Arc<Vec<u8>>,
    ) -> ExtractionResult {
        let mut errors = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            match self.attempt(backend, Arc::clone(&bytes)).await {
                Ok(text) => {
                    let sections = detect_sections(&text);
                    let result =
                        ExtractionResult::success(fingerprint, text, sections, backend.name());
                    tracing::info!(
                        "Extracted {} words in {} sections from {} with {}",
                        result.word_count(),
                        result.sections().len(),
                        result.artifact().short(),
                        backend.name()
                    );
                    return result;
                }
                Err(e) => {
                    tracing::debug!(
                        "{} failed on {}: {}",
                        backend.name(),
                        fingerprint.short(),
                        e
                    );
                    errors.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        tracing::warn!("All extraction backends failed for {}", fingerprint.short());
        ExtractionResult::failure(fingerprint, errors.join("; "))
    }

    async fn attempt(
        &self,
        backend: &Arc<dyn ExtractionBackend>,
        bytes: Arc<Vec<u8>>,
    ) -> Result<String, BackendError> {
        let worker = Arc::clone(backend);
        // A timed-out blocking task keeps running until the backend returns.
        let raw = match tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || worker.extract(&bytes)),
        )
        .await
        {
            Err(_) => return Err(BackendError::Timeout(self.timeout)),
            Ok(Err(join)) if join.is_panic() => return Err(BackendError::Panicked),
            Ok(Err(join)) => return Err(BackendError::Parse(join.to_string())),
            Ok(Ok(result)) => result?,
        };

        let text = clean_text(&raw);
        let words = text.split_whitespace().count();
        if words == 0 {
            Err(BackendError::Empty)
        } else if words < self.min_word_count {
            Err(BackendError::TooShort { words })
        } else {
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryArtifactStore;

    #[derive(Debug)]
    struct FixedBackend {
        name: &'static str,
        output: Result<String, BackendError>,
        delay: Duration,
    }

    impl FixedBackend {
        fn ok(name: &'static str, text: &str) -> Arc<dyn ExtractionBackend> {
            Arc::new(Self {
                name,
                output: Ok(text.to_string()),
                delay: Duration::ZERO,
            })
        }

        fn failing(name: &'static str) -> Arc<dyn ExtractionBackend> {
            Arc::new(Self {
                name,
                output: Err(BackendError::Parse("bad xref".to_string())),
                delay: Duration::ZERO,
            })
        }
    }

    impl ExtractionBackend for FixedBackend {
        fn name(&self) -> &str {
            self.name
        }

        fn extract(&self, _bytes: &[u8]) -> Result<String, BackendError> {
            std::thread::sleep(self.delay);
            self.output.clone()
        }
    }

    #[derive(Debug)]
    struct PanickingBackend;

    impl ExtractionBackend for PanickingBackend {
        fn name(&self) -> &str {
            "panicky"
        }

        fn extract(&self, _bytes: &[u8]) -> Result<String, BackendError> {
            panic!("malformed stream");
        }
    }

    const PAPER: &str = "Title line\n\nAbstract\nWe describe a method for things.\n\nMethods\nWe did several careful steps here.\n\nResults\nThe outcome was good and repeatable.";

    fn fp() -> ContentFingerprint {
        ContentFingerprint::of(b"%PDF-1.7 test")
    }

    #[tokio::test]
    async fn test_primary_backend_used_when_it_succeeds() {
        let extractor = FullTextExtractor::new(vec![
            FixedBackend::ok("first", PAPER),
            FixedBackend::ok("second", "other text"),
        ])
        .unwrap()
        .with_min_word_count(5);

        let result = extractor.extract_bytes(fp(), Arc::new(Vec::new())).await;
        assert!(result.is_success());
        assert_eq!(result.backend(), Some("first"));
        assert_eq!(
            result.section_labels(),
            vec!["preamble", "Abstract", "Methods", "Results"]
        );
        let stats = result.stats().unwrap();
        assert_eq!(stats.section_count, 4);
        assert_eq!(stats.word_count, result.word_count());
    }

    #[tokio::test]
    async fn test_falls_back_on_short_or_broken_output() {
        let extractor = FullTextExtractor::new(vec![
            FixedBackend::failing("broken"),
            FixedBackend::ok("short", "two words"),
            FixedBackend::ok("good", PAPER),
        ])
        .unwrap()
        .with_min_word_count(5);

        let result = extractor.extract_bytes(fp(), Arc::new(Vec::new())).await;
        assert_eq!(result.backend(), Some("good"));
    }

    #[tokio::test]
    async fn test_total_failure_is_a_result_not_an_error() {
        let extractor = FullTextExtractor::new(vec![
            FixedBackend::failing("one"),
            Arc::new(PanickingBackend),
        ])
        .unwrap();

        let result = extractor.extract_bytes(fp(), Arc::new(Vec::new())).await;
        assert!(!result.is_success());
        assert!(result.stats().is_none());
        let reason = result.failure_reason().unwrap();
        assert!(reason.contains("one: parse failed"));
        assert!(reason.contains("panicky: backend panicked"));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let slow: Arc<dyn ExtractionBackend> = Arc::new(FixedBackend {
            name: "slow",
            output: Ok(PAPER.to_string()),
            delay: Duration::from_millis(300),
        });
        let extractor = FullTextExtractor::new(vec![slow, FixedBackend::ok("fast", PAPER)])
            .unwrap()
            .with_timeout(Duration::from_millis(50))
            .with_min_word_count(5);

        let result = extractor.extract_bytes(fp(), Arc::new(Vec::new())).await;
        assert_eq!(result.backend(), Some("fast"));
    }

    #[tokio::test]
    async fn test_missing_artifact_reported() {
        let extractor = FullTextExtractor::new(vec![FixedBackend::ok("any", PAPER)]).unwrap();
        let store = MemoryArtifactStore::new();
        let artifact = ArtifactRef {
            fingerprint: fp(),
            size_bytes: 0,
            source_url: None,
        };
        let result = extractor.extract(&store, &artifact).await;
        assert!(!result.is_success());
        assert!(result.failure_reason().unwrap().contains("unreadable"));
    }

    #[test]
    fn test_backend_names() {
        assert!(backend_by_name("pdf-extract").is_some());
        assert!(backend_by_name("LOPDF").is_some());
        assert!(backend_by_name("tesseract").is_none());
        assert!(FullTextExtractor::from_names(&["nope".to_string()]).is_err());
        assert!(FullTextExtractor::new(Vec::new()).is_err());
    }

    fn hello_world_pdf() -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal("Hello World")]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_lopdf_backend_reads_generated_pdf() {
        let text = LopdfBackend.extract(&hello_world_pdf()).unwrap();
        assert!(text.contains("Hello"));
    }

    #[test]
    fn test_lopdf_backend_rejects_garbage() {
        assert!(matches!(
            LopdfBackend.extract(b"%PDF-1.7 not really"),
            Err(BackendError::Parse(_))
        ));
    }
}
