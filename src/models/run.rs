//! Batch execution record returned by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{
    AcquisitionStatus, ArtifactRef, CitationRecord, ErrorKind, Publication, TerminalStatus,
};

/// Failure attached to a publication outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OutcomeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Final record for a single publication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationOutcome {
    pub publication_id: String,
    pub status: TerminalStatus,
    pub error: Option<OutcomeError>,
    pub artifact: Option<ArtifactRef>,
    /// Final download task state name, when a task was created
    pub download_state: Option<String>,
    /// Fetch attempts spent by the download task
    pub attempts: u32,
}

impl PublicationOutcome {
    pub fn new(publication_id: impl Into<String>, status: TerminalStatus) -> Self {
        Self {
            publication_id: publication_id.into(),
            status,
            error: None,
            artifact: None,
            download_state: None,
            attempts: 0,
        }
    }

    pub fn with_error(mut self, error: OutcomeError) -> Self {
        self.error = Some(error);
        self
    }

    /// Whether a re-run could change this outcome
    pub fn needs_rerun(&self) -> bool {
        self.status == TerminalStatus::Error
            || self.error.as_ref().is_some_and(|e| e.kind.is_failure())
    }

    /// One-line status for humans
    pub fn describe(&self) -> String {
        match &self.error {
            Some(error) => format!(
                "{} ({}): {}",
                self.status.description(),
                error.kind,
                error.message
            ),
            None => self.status.description().to_string(),
        }
    }
}

/// Aggregate download counters for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    /// Download tasks dispatched
    pub attempted: usize,
    /// Tasks that fetched and stored new content
    pub succeeded: usize,
    /// Tasks that exhausted every candidate URL
    pub failed: usize,
    /// Tasks resolved to an already stored artifact
    pub deduplicated: usize,
    /// Tasks skipped because the batch was cancelled
    pub skipped: usize,
}

/// Errors reading or writing a run file
#[derive(Debug, thiserror::Error)]
pub enum RunFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Run has not been finalized")]
    NotFinalized,
}

/// A batch execution context
///
/// Created at batch start and finalized at batch end. Only finalized runs
/// can be written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Seeds plus discovered citing papers, enriched in place
    pub publications: Vec<Publication>,
    pub outcomes: BTreeMap<String, PublicationOutcome>,
    pub citations: Vec<CitationRecord>,
    pub counters: RunCounters,
    pub cancelled: bool,
}

impl PipelineRun {
    /// Start a run over the given publications
    pub fn start(publications: Vec<Publication>) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: format!("run-{}", started_at.format("%Y%m%dT%H%M%S%.3fZ")),
            started_at,
            finished_at: None,
            publications,
            outcomes: BTreeMap::new(),
            citations: Vec::new(),
            counters: RunCounters::default(),
            cancelled: false,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Record the terminal outcome of a publication
    pub fn record(&mut self, outcome: PublicationOutcome) {
        if let Some(publication) = self
            .publications
            .iter_mut()
            .find(|p| p.id() == outcome.publication_id)
        {
            publication.status = AcquisitionStatus::Finished(outcome.status);
        }
        self.outcomes.insert(outcome.publication_id.clone(), outcome);
    }

    /// Seal the run
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn publication(&self, id: &str) -> Option<&Publication> {
        self.publications.iter().find(|p| p.id() == id)
    }

    pub fn outcome(&self, id: &str) -> Option<&PublicationOutcome> {
        self.outcomes.get(id)
    }

    pub fn status_of(&self, id: &str) -> Option<TerminalStatus> {
        self.outcome(id).map(|o| o.status)
    }

    /// Number of publications per terminal status
    pub fn summary(&self) -> BTreeMap<TerminalStatus, usize> {
        let mut summary: BTreeMap<TerminalStatus, usize> =
            TerminalStatus::ALL.iter().map(|s| (*s, 0)).collect();
        for outcome in self.outcomes.values() {
            *summary.entry(outcome.status).or_default() += 1;
        }
        summary
    }

    /// Publications whose outcome should be retried in a follow-up run
    pub fn rerun_candidates(&self) -> Vec<Publication> {
        self.publications
            .iter()
            .filter(|p| self.outcome(p.id()).map_or(true, |o| o.needs_rerun()))
            .cloned()
            .map(|mut p| {
                p.status = AcquisitionStatus::Pending;
                p
            })
            .collect()
    }

    /// Fraction of publications that reached `complete` (0.0 to 1.0)
    pub fn completion_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            let complete = self
                .outcomes
                .values()
                .filter(|o| o.status == TerminalStatus::Complete)
                .count();
            complete as f64 / self.outcomes.len() as f64
        }
    }

    /// Write a finalized run as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), RunFileError> {
        if !self.is_finalized() {
            return Err(RunFileError::NotFinalized);
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a run written by [`PipelineRun::save`]
    pub fn load(path: &Path) -> Result<Self, RunFileError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
