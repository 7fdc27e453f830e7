//! # Citation Harvest
//!
//! Discovers the papers citing a publication, fetches their PDFs and extracts
//! normalized full text.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Core data structures (Publication, DownloadTask, PipelineRun, etc.)
//! - [`sources`]: Citation indexes and PDF resolvers behind the [`Source`] trait
//! - [`store`]: Content-addressed artifact storage and the fingerprint index
//! - [`pipeline`]: Citation discovery, downloading, extraction and orchestration
//! - [`utils`]: HTTP client, retry policy and rate limiting
//! - [`config`]: Configuration management

pub mod config;
pub mod models;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use models::{PipelineRun, Publication, TerminalStatus};
pub use pipeline::{AcquisitionPipeline, PipelineError};
pub use sources::{Source, SourceRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
