//! Core data models for publications, downloads, extraction and runs.

mod citation;
mod download;
mod extraction;
mod fingerprint;
mod publication;
mod run;
mod status;

pub use citation::{CitationHit, CitationRecord, CitingMetadata, CitingPaper};
pub use download::{ArtifactRef, DownloadTask, InvalidTransition, TaskState, UrlFailure};
pub use extraction::{ExtractionResult, ExtractionStats, Section, PREAMBLE_LABEL};
pub use fingerprint::{ContentFingerprint, InvalidFingerprint};
pub use publication::{AcquisitionStatus, Origin, Publication, PublicationBuilder};
pub use run::{OutcomeError, PipelineRun, PublicationOutcome, RunCounters, RunFileError};
pub use status::{ErrorKind, TerminalStatus};
