//! Concurrent PDF retrieval with validation, retry and content deduplication.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::PipelineError;
use crate::models::{ArtifactRef, ContentFingerprint, DownloadTask, ErrorKind, TaskState, UrlFailure};
use crate::store::{ArtifactStore, Claim, FingerprintIndex, StoreError};
use crate::utils::{retry_decision, HttpClient, RetryDecision, RetryPolicy, TransientError};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Failure of a single fetch attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("HTTP status {status}")]
    Status { status: u16, retry_after: Option<u64> },

    #[error("response is not a PDF ({0})")]
    NotPdf(String),

    #[error("artifact exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Transient classification used by the retry decision
    pub fn transient(&self) -> Option<TransientError> {
        match self {
            FetchError::Timeout => Some(TransientError::Timeout),
            FetchError::Connection(_) => Some(TransientError::Network),
            FetchError::Status {
                status,
                retry_after,
            } => reqwest::StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| TransientError::from_status(s, *retry_after)),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient().is_some()
    }

    /// User-visible error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            _ if self.is_transient() => ErrorKind::TransientFetchError,
            FetchError::NotPdf(_) | FetchError::TooLarge { .. } => ErrorKind::ValidationError,
            _ => ErrorKind::PermanentFetchError,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                retry_after: None,
            }
        } else if err.is_builder() {
            FetchError::InvalidUrl(err.to_string())
        } else if err.is_connect() || err.is_request() || err.is_body() {
            FetchError::Connection(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

/// Check the PDF magic header and the size cap
///
/// Leading whitespace and a byte-order mark before `%PDF-` are tolerated.
pub fn validate_pdf(bytes: &[u8], max_bytes: u64) -> Result<(), FetchError> {
    if bytes.len() as u64 > max_bytes {
        return Err(FetchError::TooLarge { limit: max_bytes });
    }
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    if body[start..].starts_with(PDF_MAGIC) {
        Ok(())
    } else if bytes.is_empty() {
        Err(FetchError::NotPdf("empty body".to_string()))
    } else {
        let head: String = String::from_utf8_lossy(&body[start..body.len().min(start + 16)])
            .chars()
            .filter(|c| !c.is_control())
            .collect();
        Err(FetchError::NotPdf(format!("starts with {:?}", head)))
    }
}

/// Retrieves raw bytes for one URL
#[async_trait]
pub trait PdfFetcher: Send + Sync + std::fmt::Debug {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP implementation of [`PdfFetcher`]
///
/// Streams the body so oversized responses are abandoned early.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: HttpClient,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(client: HttpClient, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }
}

#[async_trait]
impl PdfFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let mut response = self
            .client
            .get(parsed.as_str())
            .header(reqwest::header::ACCEPT, "application/pdf,*/*;q=0.8")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(FetchError::Status {
                status: status.as_u16(),
                retry_after,
            });
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes)
        {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

/// Resolves [`DownloadTask`]s against a content-addressed store
///
/// Each candidate URL gets one attempt plus up to `max_retries` retries on
/// transient errors. Fetched bytes are deduplicated through the shared
/// [`FingerprintIndex`], so identical content is stored once per index.
#[derive(Debug, Clone)]
pub struct PdfDownloader {
    fetcher: Arc<dyn PdfFetcher>,
    store: Arc<dyn ArtifactStore>,
    index: Arc<FingerprintIndex>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    max_bytes: u64,
}

impl PdfDownloader {
    pub fn new(
        fetcher: Arc<dyn PdfFetcher>,
        store: Arc<dyn ArtifactStore>,
        index: Arc<FingerprintIndex>,
    ) -> Self {
        Self {
            fetcher,
            store,
            index,
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(30),
            max_bytes: 100 * 1024 * 1024,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Hard timeout for every single fetch attempt
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn index(&self) -> &Arc<FingerprintIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Resolve every task with at most `concurrency_limit` in flight
    ///
    /// Results come back in input order.
    pub async fn download_batch(
        &self,
        tasks: Vec<DownloadTask>,
        concurrency_limit: usize,
    ) -> Result<Vec<DownloadTask>, PipelineError> {
        self.download_batch_with_cancel(tasks, concurrency_limit, CancellationToken::new())
            .await
    }

    /// [`PdfDownloader::download_batch`] with a batch cancellation signal
    pub async fn download_batch_with_cancel(
        &self,
        tasks: Vec<DownloadTask>,
        concurrency_limit: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<DownloadTask>, PipelineError> {
        let order: HashMap<String, usize> = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.publication_id.clone(), i))
            .collect();
        let expected = tasks.len();

        let mut receiver = Arc::new(self.clone()).spawn_batch(tasks, concurrency_limit, cancel)?;
        let mut resolved = Vec::with_capacity(expected);
        while let Some(task) = receiver.recv().await {
            resolved.push(task);
        }
        resolved.sort_by_key(|t| order.get(&t.publication_id).copied().unwrap_or(usize::MAX));
        Ok(resolved)
    }

    /// Dispatch tasks in the background and stream them back as they resolve
    ///
    /// Tasks still waiting for a worker when `cancel` fires come back as
    /// `Skipped`. Completion order is arbitrary.
    pub fn spawn_batch(
        self: Arc<Self>,
        tasks: Vec<DownloadTask>,
        concurrency_limit: usize,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<DownloadTask>, PipelineError> {
        if concurrency_limit == 0 {
            return Err(PipelineError::InvalidConfig(
                "download concurrency must be at least 1".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel(tasks.len().max(1));
        let semaphore = Arc::new(Semaphore::new(concurrency_limit));

        tokio::spawn(async move {
            let mut workers = JoinSet::new();
            for mut task in tasks {
                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                };
                let Some(permit) = permit else {
                    if let Err(e) = task.transition(TaskState::Skipped) {
                        tracing::warn!("{}: {}", task.publication_id, e);
                    }
                    tracing::debug!("Skipping {} (batch cancelled)", task.publication_id);
                    let _ = sender.send(task).await;
                    continue;
                };

                let downloader = Arc::clone(&self);
                let sender = sender.clone();
                let cancel = cancel.clone();
                workers.spawn(async move {
                    let task = downloader.process(task, &cancel).await;
                    // permit is released before the result is handed over
                    drop(permit);
                    let _ = sender.send(task).await;
                });
            }

            while let Some(joined) = workers.join_next().await {
                if let Err(e) = joined {
                    tracing::error!("Download worker failed: {}", e);
                }
            }
        });

        Ok(receiver)
    }

    async fn process(&self, mut task: DownloadTask, cancel: &CancellationToken) -> DownloadTask {
        if let Err(e) = task.transition(TaskState::InFlight) {
            tracing::warn!("{}: {}", task.publication_id, e);
            return task;
        }

        if let Some(existing) = self.known_artifact(&task.publication_id).await {
            tracing::debug!(
                "{} already resolved to {}, not fetching",
                task.publication_id,
                existing.fingerprint.short()
            );
            resolve(&mut task, TaskState::SkippedDuplicate(existing));
            return task;
        }

        let mut failures = Vec::new();
        for url in task.candidate_urls.clone() {
            let mut url_attempts = 0u32;
            loop {
                if cancel.is_cancelled() {
                    resolve(&mut task, TaskState::Skipped);
                    return task;
                }

                url_attempts += 1;
                task.attempts += 1;
                tracing::debug!(
                    "{}: attempt {} on {}",
                    task.publication_id,
                    url_attempts,
                    url
                );

                let fetched = match tokio::time::timeout(self.attempt_timeout, self.fetcher.fetch(&url)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout),
                };
                let error = match fetched.and_then(|bytes| {
                    validate_pdf(&bytes, self.max_bytes)?;
                    Ok(bytes)
                }) {
                    Ok(bytes) => {
                        match self.store_artifact(&task.publication_id, &url, bytes).await {
                            Ok(state) => resolve(&mut task, state),
                            Err(e) => {
                                tracing::warn!("{}: storing artifact failed: {}", task.publication_id, e);
                                failures.push(UrlFailure {
                                    url,
                                    kind: ErrorKind::StorageFailure,
                                    message: e.to_string(),
                                    attempts: url_attempts,
                                });
                                resolve(&mut task, TaskState::Failed(failures));
                            }
                        }
                        return task;
                    }
                    Err(error) => error,
                };

                let transient = error.transient();
                match retry_decision(&self.retry, url_attempts, transient.as_ref()) {
                    RetryDecision::Retry { delay } => {
                        tracing::debug!(
                            "{}: {} on {}, retrying in {:?}",
                            task.publication_id,
                            error,
                            url,
                            delay
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                resolve(&mut task, TaskState::Skipped);
                                return task;
                            }
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    RetryDecision::GiveUp => {
                        tracing::debug!("{}: giving up on {}: {}", task.publication_id, url, error);
                        failures.push(UrlFailure {
                            kind: error.kind(),
                            message: error.to_string(),
                            url,
                            attempts: url_attempts,
                        });
                        break;
                    }
                }
            }
        }

        tracing::warn!(
            "{}: all {} candidate URLs failed",
            task.publication_id,
            task.candidate_urls.len()
        );
        resolve(&mut task, TaskState::Failed(failures));
        task
    }

    /// Artifact stored for this publication by an earlier task or run
    async fn known_artifact(&self, publication_id: &str) -> Option<ArtifactRef> {
        let artifact = self.index.artifact_for_publication(publication_id)?;
        match self.store.exists(&artifact.fingerprint).await {
            Ok(true) => Some(artifact),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!("Store lookup for {} failed: {}", artifact.fingerprint.short(), e);
                None
            }
        }
    }

    async fn store_artifact(
        &self,
        publication_id: &str,
        url: &str,
        bytes: Vec<u8>,
    ) -> Result<TaskState, StoreError> {
        let fingerprint = ContentFingerprint::of(&bytes);
        let state = match self.index.claim(&fingerprint).await {
            Claim::Stored(existing) => TaskState::SkippedDuplicate(existing),
            Claim::Owner(guard) => {
                if self.store.exists(&fingerprint).await? {
                    // stored by an earlier run the index did not know about
                    let existing = ArtifactRef {
                        fingerprint: fingerprint.clone(),
                        size_bytes: bytes.len() as u64,
                        source_url: None,
                    };
                    guard.commit(existing.clone());
                    TaskState::SkippedDuplicate(existing)
                } else {
                    let stored = self.store.put(&bytes).await?;
                    let artifact = ArtifactRef {
                        fingerprint: stored,
                        size_bytes: bytes.len() as u64,
                        source_url: Some(url.to_string()),
                    };
                    guard.commit(artifact.clone());
                    tracing::info!(
                        "{}: stored {} ({} bytes)",
                        publication_id,
                        artifact.fingerprint.short(),
                        artifact.size_bytes
                    );
                    TaskState::Succeeded(artifact)
                }
            }
        };
        self.index.remember(publication_id, &fingerprint);
        Ok(state)
    }
}

fn resolve(task: &mut DownloadTask, state: TaskState) {
    if let Err(e) = task.transition(state) {
        tracing::error!("{}: {}", task.publication_id, e);
    }
}
