//! Download tasks and their state machine.

use serde::{Deserialize, Serialize};

use super::{ContentFingerprint, ErrorKind};

/// Handle to an artifact in the content-addressed store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub fingerprint: ContentFingerprint,
    pub size_bytes: u64,
    /// URL the bytes were fetched from (absent when reused from an earlier run)
    pub source_url: Option<String>,
}

/// Last error observed for one candidate URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlFailure {
    pub url: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Attempts spent on this URL
    pub attempts: u32,
}

/// State of a download task
///
/// `Pending -> InFlight -> {Succeeded, Failed, SkippedDuplicate, Skipped}`.
/// `Pending -> Skipped` happens when the batch is cancelled before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "detail")]
pub enum TaskState {
    Pending,
    InFlight,
    /// Bytes fetched, validated and stored by this task
    Succeeded(ArtifactRef),
    /// All candidate URLs exhausted
    Failed(Vec<UrlFailure>),
    /// Content was already stored; references the existing artifact
    SkippedDuplicate(ArtifactRef),
    /// Batch cancelled before this task finished
    Skipped,
}

impl TaskState {
    fn rank(&self) -> u8 {
        match self {
            TaskState::Pending => 0,
            TaskState::InFlight => 1,
            _ => 2,
        }
    }

    /// Whether the task reached a final state
    pub fn is_resolved(&self) -> bool {
        self.rank() == 2
    }

    /// Short machine name
    pub fn name(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InFlight => "in_flight",
            TaskState::Succeeded(_) => "succeeded",
            TaskState::Failed(_) => "failed",
            TaskState::SkippedDuplicate(_) => "skipped_duplicate",
            TaskState::Skipped => "skipped",
        }
    }
}

/// Rejected state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub to: &'static str,
}

/// A request to acquire one publication's PDF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub publication_id: String,
    /// Tried strictly in this order
    pub candidate_urls: Vec<String>,
    /// Fetch attempts issued so far, across all URLs
    pub attempts: u32,
    state: TaskState,
}

impl DownloadTask {
    pub fn new(publication_id: impl Into<String>, candidate_urls: Vec<String>) -> Self {
        Self {
            publication_id: publication_id.into(),
            candidate_urls,
            attempts: 0,
            state: TaskState::Pending,
        }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// Move to `next`; states never revert and resolved states are final
    pub fn transition(&mut self, next: TaskState) -> Result<(), InvalidTransition> {
        let allowed = match (&self.state, &next) {
            (TaskState::Pending, TaskState::InFlight) => true,
            (TaskState::Pending, TaskState::Skipped) => true,
            (TaskState::InFlight, n) => n.is_resolved(),
            _ => false,
        };
        if !allowed || next.rank() <= self.state.rank() {
            return Err(InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Artifact produced or referenced by the task, if any
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        match &self.state {
            TaskState::Succeeded(artifact) | TaskState::SkippedDuplicate(artifact) => Some(artifact),
            _ => None,
        }
    }

    /// Last failure recorded, for diagnostics
    pub fn last_failure(&self) -> Option<&UrlFailure> {
        match &self.state {
            TaskState::Failed(failures) => failures.last(),
            _ => None,
        }
    }
}
