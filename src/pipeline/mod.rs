//! The acquisition pipeline and its three stages.
//!
//! - [`CitationFinder`]: who cites a publication
//! - [`PdfDownloader`]: concurrent, deduplicated, retrying PDF retrieval
//! - [`FullTextExtractor`]: text extraction with backend fallback, cleaning and
//!   section detection
//! - [`AcquisitionPipeline`]: per-publication state machine tying them together
//!
//! Stage-local failures are recorded on the affected publication. Only
//! construction-time problems surface as [`PipelineError`].

mod citations;
mod cleaning;
mod downloader;
mod extractor;
mod orchestrator;
mod sections;

pub use citations::{CitationFinder, CitationLookup, SourceUnavailable};
pub use cleaning::clean_text;
pub use downloader::{validate_pdf, FetchError, HttpFetcher, PdfDownloader, PdfFetcher};
pub use extractor::{
    backend_by_name, BackendError, ExtractionBackend, FullTextExtractor, LopdfBackend,
    PdfExtractBackend,
};
pub use orchestrator::{AcquisitionPipeline, AcquisitionPipelineBuilder, Stage, StageGates};
pub use sections::detect_sections;

use crate::config::ConfigError;
use crate::sources::SourceError;
use crate::store::StoreError;

/// Fatal errors raised while constructing or starting a pipeline
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
