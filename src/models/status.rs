//! Terminal statuses and the user-visible error taxonomy.

use serde::{Deserialize, Serialize};

/// Final outcome recorded for a publication at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    /// No citing papers were discovered for this publication
    NotCited,
    /// Cited (or discovery skipped) but no PDF could be acquired
    CitedNoPdf,
    /// PDF acquired but no full text was produced
    DownloadedNoText,
    /// PDF acquired and full text extracted
    Complete,
    /// Processing failed; see the attached error
    Error,
}

impl TerminalStatus {
    /// All statuses in display order
    pub const ALL: [TerminalStatus; 5] = [
        TerminalStatus::NotCited,
        TerminalStatus::CitedNoPdf,
        TerminalStatus::DownloadedNoText,
        TerminalStatus::Complete,
        TerminalStatus::Error,
    ];

    /// Machine identifier
    pub fn id(&self) -> &'static str {
        match self {
            TerminalStatus::NotCited => "not_cited",
            TerminalStatus::CitedNoPdf => "cited_no_pdf",
            TerminalStatus::DownloadedNoText => "downloaded_no_text",
            TerminalStatus::Complete => "complete",
            TerminalStatus::Error => "error",
        }
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            TerminalStatus::NotCited => "no citing papers found",
            TerminalStatus::CitedNoPdf => "no PDF acquired",
            TerminalStatus::DownloadedNoText => "PDF acquired, no full text",
            TerminalStatus::Complete => "full text extracted",
            TerminalStatus::Error => "failed",
        }
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Kind of failure attached to a task or publication outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Citation or resolution source unreachable or rate limited past the retry budget
    SourceUnavailable,
    /// Timeout, 5xx, connection reset; retried automatically
    TransientFetchError,
    /// 4xx or otherwise non-retriable fetch failure
    PermanentFetchError,
    /// Downloaded bytes are not an acceptable PDF
    ValidationError,
    /// Every configured extraction backend failed
    ExtractionBackendFailure,
    /// Content already stored; informational only
    DuplicateArtifact,
    /// The artifact store rejected the write
    StorageFailure,
    /// The batch was cancelled before this item finished
    Cancelled,
}

impl ErrorKind {
    /// Whether this kind denotes an actual failure
    pub fn is_failure(&self) -> bool {
        !matches!(self, ErrorKind::DuplicateArtifact)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::SourceUnavailable => "SourceUnavailable",
            ErrorKind::TransientFetchError => "TransientFetchError",
            ErrorKind::PermanentFetchError => "PermanentFetchError",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::ExtractionBackendFailure => "ExtractionBackendFailure",
            ErrorKind::DuplicateArtifact => "DuplicateArtifact",
            ErrorKind::StorageFailure => "StorageFailure",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}
