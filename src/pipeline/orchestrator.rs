//! Per-publication orchestration of discovery, download and extraction.

use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{
    CitationFinder, ExtractionBackend, FullTextExtractor, HttpFetcher, PdfDownloader, PdfFetcher,
    PipelineError,
};
use crate::config::{Config, PipelineConfig};
use crate::models::{
    ArtifactRef, ContentFingerprint, DownloadTask, ErrorKind, ExtractionResult, OutcomeError,
    PipelineRun, Publication, PublicationOutcome, TaskState, TerminalStatus,
};
use crate::sources::{Source, SourceCapabilities, SourceError, SourceRegistry};
use crate::store::{ArtifactStore, FingerprintIndex, FsArtifactStore, MemoryArtifactStore};
use crate::utils::{citation_retry_policy, with_retry, HttpClient, RateLimiter};

/// Where a publication is in the pipeline
///
/// Stages only move forward. Which transitions are reachable is decided by
/// [`StageGates`]; see [`Stage::next`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Stage {
    #[default]
    Seeded,
    CitationDiscovered,
    CitationSkipped,
    DownloadPending,
    DownloadResolved,
    ExtractionPending,
    ExtractionResolved,
    Terminal,
}

impl Stage {
    fn rank(self) -> u8 {
        match self {
            Stage::Seeded => 0,
            Stage::CitationDiscovered | Stage::CitationSkipped => 1,
            Stage::DownloadPending => 2,
            Stage::DownloadResolved => 3,
            Stage::ExtractionPending => 4,
            Stage::ExtractionResolved => 5,
            Stage::Terminal => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Stage::Terminal
    }

    /// Whether moving from `self` to `next` goes forward
    pub fn precedes(self, next: Stage) -> bool {
        next.rank() > self.rank()
    }

    /// Following stage on the success path
    pub fn next(self, gates: StageGates) -> Stage {
        match self {
            Stage::Seeded if gates.citation_discovery => Stage::CitationDiscovered,
            Stage::Seeded => Stage::CitationSkipped,
            Stage::CitationDiscovered | Stage::CitationSkipped if gates.pdf_download => {
                Stage::DownloadPending
            }
            Stage::DownloadPending => Stage::DownloadResolved,
            Stage::DownloadResolved if gates.fulltext => Stage::ExtractionPending,
            Stage::ExtractionPending => Stage::ExtractionResolved,
            _ => Stage::Terminal,
        }
    }
}

/// Which pipeline stages are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageGates {
    pub citation_discovery: bool,
    pub pdf_download: bool,
    pub fulltext: bool,
}

impl StageGates {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            citation_discovery: config.enable_citation_discovery,
            pdf_download: config.enable_pdf_download,
            fulltext: config.enable_fulltext,
        }
    }
}

impl Default for StageGates {
    fn default() -> Self {
        Self {
            citation_discovery: true,
            pdf_download: true,
            fulltext: true,
        }
    }
}

#[derive(Debug, Default)]
struct Draft {
    stage: Stage,
    artifact: Option<ArtifactRef>,
    download_state: Option<&'static str>,
    attempts: u32,
    note: Option<OutcomeError>,
}

/// Run under construction plus the per-publication stage of every item
struct Ledger {
    run: PipelineRun,
    drafts: HashMap<String, Draft>,
    /// Ids settled by an earlier run; never admitted again
    settled: HashSet<String>,
}

impl Ledger {
    fn new(publications: Vec<Publication>) -> Self {
        let mut seen = HashSet::new();
        let publications: Vec<Publication> = publications
            .into_iter()
            .filter(|p| seen.insert(p.id().to_string()))
            .collect();
        let drafts = publications
            .iter()
            .map(|p| (p.id().to_string(), Draft::default()))
            .collect();
        Self {
            run: PipelineRun::start(publications),
            drafts,
            settled: HashSet::new(),
        }
    }

    fn excluding(mut self, settled: HashSet<String>) -> Self {
        self.settled = settled;
        self
    }

    /// Add a discovered publication; false when the id is already in the run
    /// or was settled by the run being retried
    fn admit(&mut self, publication: Publication) -> bool {
        let id = publication.id().to_string();
        if self.drafts.contains_key(&id) || self.settled.contains(&id) {
            return false;
        }
        self.drafts.insert(
            id,
            Draft {
                stage: Stage::CitationSkipped,
                ..Draft::default()
            },
        );
        self.run.publications.push(publication);
        true
    }

    fn advance(&mut self, id: &str, next: Stage) {
        let Some(draft) = self.drafts.get_mut(id) else {
            return;
        };
        if draft.stage.precedes(next) {
            draft.stage = next;
        } else {
            tracing::error!("{}: refused stage change {:?} -> {:?}", id, draft.stage, next);
        }
    }

    fn note(&mut self, id: &str, error: OutcomeError) {
        if let Some(draft) = self.drafts.get_mut(id) {
            draft.note.get_or_insert(error);
        }
    }

    fn publication_mut(&mut self, id: &str) -> Option<&mut Publication> {
        self.run.publications.iter_mut().find(|p| p.id() == id)
    }

    fn record_task(&mut self, task: &DownloadTask) {
        if let Some(draft) = self.drafts.get_mut(&task.publication_id) {
            draft.artifact = task.artifact().cloned();
            draft.download_state = Some(task.state().name());
            draft.attempts = task.attempts;
        }
    }

    fn finish(&mut self, id: &str, status: TerminalStatus, error: Option<OutcomeError>) {
        let Some(draft) = self.drafts.get_mut(id) else {
            return;
        };
        if draft.stage.is_terminal() {
            tracing::error!("{} finished twice", id);
            return;
        }
        draft.stage = Stage::Terminal;

        let mut outcome = PublicationOutcome::new(id, status);
        outcome.error = error.or_else(|| draft.note.take());
        outcome.artifact = draft.artifact.take();
        outcome.download_state = draft.download_state.map(str::to_string);
        outcome.attempts = draft.attempts;
        tracing::debug!("{}: {}", id, outcome.describe());
        self.run.record(outcome);
    }

    fn unfinished(&self) -> Vec<String> {
        self.drafts
            .iter()
            .filter(|(_, d)| !d.stage.is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// What a re-run inherits from the run it retries
#[derive(Debug, Default)]
struct RerunScope {
    /// Publications whose outcome stands
    settled: HashSet<String>,
    /// Seeds whose citation lookup already succeeded
    looked_up: HashSet<String>,
}

impl RerunScope {
    fn of(previous: &PipelineRun) -> Self {
        Self {
            settled: previous
                .outcomes
                .values()
                .filter(|o| !o.needs_rerun())
                .map(|o| o.publication_id.clone())
                .collect(),
            looked_up: previous
                .citations
                .iter()
                .map(|c| c.cited_id().to_string())
                .collect(),
        }
    }
}

fn cancelled() -> OutcomeError {
    OutcomeError::new(ErrorKind::Cancelled, "batch cancelled")
}

#[derive(Debug)]
struct Resolver {
    source: Arc<dyn Source>,
    limiter: Option<RateLimiter>,
}

struct Resolution {
    urls: Vec<String>,
    failure: Option<OutcomeError>,
}

enum Event {
    Downloaded(Option<DownloadTask>),
    Extracted(Result<ExtractionResult, tokio::task::JoinError>),
}

/// Extraction jobs in flight and results already produced, keyed by fingerprint
struct ExtractionQueue {
    jobs: JoinSet<ExtractionResult>,
    slots: Arc<Semaphore>,
    done: HashMap<ContentFingerprint, ExtractionResult>,
    waiting: HashMap<ContentFingerprint, Vec<String>>,
}

/// End-to-end acquisition for a batch of publications
///
/// ```no_run
/// use citation_harvest::config::Config;
/// use citation_harvest::models::Publication;
/// use citation_harvest::pipeline::AcquisitionPipeline;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = AcquisitionPipeline::from_config(&Config::default())?;
/// let run = pipeline
///     .run(vec![Publication::new("10.1038/nature14539", "Deep learning")])
///     .await;
/// for (status, count) in run.summary() {
///     println!("{}: {}", status, count);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AcquisitionPipeline {
    gates: StageGates,
    finder: CitationFinder,
    resolvers: Vec<Resolver>,
    downloader: Arc<PdfDownloader>,
    extractor: Arc<FullTextExtractor>,
    store: Arc<dyn ArtifactStore>,
    index: Arc<FingerprintIndex>,
    manifest: Option<PathBuf>,
    max_citing_papers: usize,
    continue_on_citation_failure: bool,
    download_concurrency: usize,
    extraction_concurrency: usize,
}

impl AcquisitionPipeline {
    pub fn builder(config: PipelineConfig) -> AcquisitionPipelineBuilder {
        AcquisitionPipelineBuilder::new(config)
    }

    /// Wire up the built-in sources, filesystem store and HTTP fetcher
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = HttpClient::new()?;
        let citation_sources =
            SourceRegistry::from_ids(&config.sources.citation_sources, &config.sources, &client)?;
        let resolvers =
            SourceRegistry::from_ids(&config.sources.pdf_resolvers, &config.sources, &client)?;

        let store = FsArtifactStore::open(&config.store.directory)?;
        let manifest = config.store.manifest_path();
        let index = FingerprintIndex::load(&manifest)?;
        tracing::debug!(
            "Loaded fingerprint index with {} artifacts from {}",
            index.len(),
            manifest.display()
        );

        let fetcher = HttpFetcher::new(client, config.pipeline.max_pdf_bytes());
        Self::builder(config.pipeline.clone())
            .citation_sources(citation_sources)
            .pdf_resolvers(resolvers)
            .store(Arc::new(store))
            .index(index)
            .fetcher(Arc::new(fetcher))
            .manifest(manifest)
            .build()
    }

    pub fn gates(&self) -> StageGates {
        self.gates
    }

    pub fn citation_finder(&self) -> &CitationFinder {
        &self.finder
    }

    pub fn extractor(&self) -> &FullTextExtractor {
        &self.extractor
    }

    pub fn index(&self) -> &Arc<FingerprintIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Process a batch of seed publications
    pub async fn run(&self, publications: Vec<Publication>) -> PipelineRun {
        self.run_with_cancel(publications, CancellationToken::new())
            .await
    }

    /// Re-process only the publications of `previous` that failed or were
    /// cancelled; stored content is reused, not fetched again
    pub async fn rerun(&self, previous: &PipelineRun) -> PipelineRun {
        self.rerun_with_cancel(previous, CancellationToken::new())
            .await
    }

    /// [`AcquisitionPipeline::rerun`] with a batch cancellation signal
    pub async fn rerun_with_cancel(
        &self,
        previous: &PipelineRun,
        cancel: CancellationToken,
    ) -> PipelineRun {
        let candidates = previous.rerun_candidates();
        tracing::info!(
            "Re-running {} of {} publications from {}",
            candidates.len(),
            previous.publications.len(),
            previous.run_id
        );
        self.execute(candidates, RerunScope::of(previous), cancel)
            .await
    }

    /// [`AcquisitionPipeline::run`] with a batch cancellation signal
    pub async fn run_with_cancel(
        &self,
        publications: Vec<Publication>,
        cancel: CancellationToken,
    ) -> PipelineRun {
        self.execute(publications, RerunScope::default(), cancel)
            .await
    }

    async fn execute(
        &self,
        publications: Vec<Publication>,
        scope: RerunScope,
        cancel: CancellationToken,
    ) -> PipelineRun {
        let mut ledger = Ledger::new(publications).excluding(scope.settled);
        tracing::info!(
            "Starting {} with {} publications",
            ledger.run.run_id,
            ledger.run.publications.len()
        );

        let (seeds, discovered): (Vec<&Publication>, Vec<&Publication>) =
            ledger.run.publications.iter().partition(|p| p.is_seed());
        let seeds: Vec<String> = seeds.iter().map(|p| p.id().to_string()).collect();
        let discovered: Vec<String> = discovered.iter().map(|p| p.id().to_string()).collect();
        for id in &discovered {
            ledger.advance(id, Stage::CitationSkipped);
        }

        let mut queue = if self.gates.citation_discovery {
            // Citing papers of these seeds were found last time; only their
            // own acquisition is retried
            let (known, seeds): (Vec<String>, Vec<String>) = seeds
                .into_iter()
                .partition(|id| scope.looked_up.contains(id));
            for id in &known {
                ledger.advance(id, Stage::CitationDiscovered);
            }
            let mut queue = known;
            queue.extend(self.discover_citations(&mut ledger, seeds, &cancel).await);
            queue
        } else {
            for id in &seeds {
                ledger.advance(id, Stage::Seeded.next(self.gates));
            }
            seeds
        };
        queue.extend(discovered);

        if Stage::CitationSkipped.next(self.gates) == Stage::DownloadPending {
            self.acquire(&mut ledger, queue, &cancel).await;
        } else {
            for id in &queue {
                ledger.finish(id, TerminalStatus::CitedNoPdf, None);
            }
        }

        for id in ledger.unfinished() {
            ledger.finish(
                &id,
                TerminalStatus::Error,
                Some(OutcomeError::new(
                    ErrorKind::PermanentFetchError,
                    "processing did not complete",
                )),
            );
        }

        let mut run = ledger.run;
        run.cancelled = cancel.is_cancelled();
        run.finalize();

        if let Some(ref path) = self.manifest {
            if let Err(e) = self.index.save(path) {
                tracing::warn!("Failed to save fingerprint index to {}: {}", path.display(), e);
            }
        }

        tracing::info!(
            "{} finished: {} publications, {} complete, {} citations{}",
            run.run_id,
            run.publications.len(),
            run.summary()
                .get(&TerminalStatus::Complete)
                .copied()
                .unwrap_or(0),
            run.citations.len(),
            if run.cancelled { " (cancelled)" } else { "" }
        );
        run
    }

    /// Returns the ids that continue to the download stage: seeds with
    /// citations (or whose lookup failed, when allowed) followed by newly
    /// discovered citing papers
    async fn discover_citations(
        &self,
        ledger: &mut Ledger,
        seeds: Vec<String>,
        cancel: &CancellationToken,
    ) -> Vec<String> {
        let mut queue = Vec::new();
        let mut citing = Vec::new();

        for id in seeds {
            if cancel.is_cancelled() {
                ledger.finish(&id, TerminalStatus::Error, Some(cancelled()));
                continue;
            }

            let lookup = self
                .finder
                .find_citing_papers(&id, self.max_citing_papers)
                .await;
            ledger.advance(&id, Stage::CitationDiscovered);

            if let Some(unavailable) = lookup.unavailable {
                let error = OutcomeError::new(ErrorKind::SourceUnavailable, unavailable.to_string());
                if self.continue_on_citation_failure {
                    ledger.note(&id, error);
                    queue.push(id);
                } else {
                    ledger.finish(&id, TerminalStatus::Error, Some(error));
                }
                continue;
            }

            if lookup.citing.is_empty() {
                ledger.finish(&id, TerminalStatus::NotCited, None);
                continue;
            }

            tracing::info!("{} is cited by {} papers", id, lookup.citing.len());
            ledger.run.citations.extend(lookup.records());
            for paper in &lookup.citing {
                let publication = paper.to_publication();
                let citing_id = publication.id().to_string();
                if ledger.admit(publication) {
                    citing.push(citing_id);
                }
            }
            queue.push(id);
        }

        queue.extend(citing);
        queue
    }

    async fn acquire(&self, ledger: &mut Ledger, queue: Vec<String>, cancel: &CancellationToken) {
        let publications: Vec<Publication> = queue
            .iter()
            .filter_map(|id| ledger.run.publication(id).cloned())
            .collect();
        for id in &queue {
            ledger.advance(id, Stage::DownloadPending);
        }

        let resolved: Vec<(String, Resolution)> = stream::iter(publications)
            .map(|publication| async move {
                let resolution = self.resolve_candidates(&publication, cancel).await;
                (publication.id().to_string(), resolution)
            })
            .buffered(self.download_concurrency)
            .collect()
            .await;

        let mut tasks = Vec::new();
        for (id, resolution) in resolved {
            if let Some(publication) = ledger.publication_mut(&id) {
                for url in &resolution.urls {
                    publication.push_pdf_url(url.clone());
                }
            }
            if let Some(failure) = resolution.failure {
                ledger.note(&id, failure);
            }
            if resolution.urls.is_empty() && self.index.artifact_for_publication(&id).is_none() {
                tracing::debug!("{}: no candidate PDF URLs", id);
                ledger.advance(&id, Stage::DownloadResolved);
                ledger.finish(&id, TerminalStatus::CitedNoPdf, None);
                continue;
            }
            tasks.push(DownloadTask::new(id, resolution.urls));
        }

        ledger.run.counters.attempted += tasks.len();
        let ids: Vec<String> = tasks.iter().map(|t| t.publication_id.clone()).collect();
        let mut downloads = match Arc::clone(&self.downloader).spawn_batch(
            tasks,
            self.download_concurrency,
            cancel.clone(),
        ) {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::error!("Could not start downloads: {}", e);
                for id in ids {
                    ledger.finish(
                        &id,
                        TerminalStatus::Error,
                        Some(OutcomeError::new(ErrorKind::PermanentFetchError, e.to_string())),
                    );
                }
                return;
            }
        };

        let mut extraction = ExtractionQueue {
            jobs: JoinSet::new(),
            slots: Arc::new(Semaphore::new(self.extraction_concurrency)),
            done: HashMap::new(),
            waiting: HashMap::new(),
        };
        let mut downloads_open = true;

        loop {
            let event = tokio::select! {
                received = downloads.recv(), if downloads_open => Event::Downloaded(received),
                Some(joined) = extraction.jobs.join_next() => Event::Extracted(joined),
                else => break,
            };
            match event {
                Event::Downloaded(Some(task)) => {
                    self.on_download(ledger, &mut extraction, task, cancel)
                }
                Event::Downloaded(None) => downloads_open = false,
                Event::Extracted(Ok(result)) => {
                    let fingerprint = result.artifact().clone();
                    for id in extraction.waiting.remove(&fingerprint).unwrap_or_default() {
                        apply_extraction(ledger, &id, &result);
                    }
                    extraction.done.insert(fingerprint, result);
                }
                Event::Extracted(Err(e)) => tracing::error!("Extraction job failed: {}", e),
            }
        }

        for (_, ids) in extraction.waiting.drain() {
            for id in ids {
                ledger.advance(&id, Stage::ExtractionResolved);
                ledger.finish(
                    &id,
                    TerminalStatus::DownloadedNoText,
                    Some(OutcomeError::new(
                        ErrorKind::ExtractionBackendFailure,
                        "extraction job aborted",
                    )),
                );
            }
        }
    }

    fn on_download(
        &self,
        ledger: &mut Ledger,
        extraction: &mut ExtractionQueue,
        task: DownloadTask,
        cancel: &CancellationToken,
    ) {
        let id = task.publication_id.clone();
        ledger.record_task(&task);
        ledger.advance(&id, Stage::DownloadResolved);

        let counters = &mut ledger.run.counters;
        let artifact = match task.state() {
            TaskState::Succeeded(artifact) => {
                counters.succeeded += 1;
                artifact.clone()
            }
            TaskState::SkippedDuplicate(artifact) => {
                counters.deduplicated += 1;
                artifact.clone()
            }
            TaskState::Failed(failures) => {
                counters.failed += 1;
                let (status, error) = match failures.last() {
                    Some(last) if last.kind == ErrorKind::StorageFailure => (
                        TerminalStatus::Error,
                        OutcomeError::new(last.kind, format!("{}: {}", last.url, last.message)),
                    ),
                    Some(last) => (
                        TerminalStatus::CitedNoPdf,
                        OutcomeError::new(last.kind, format!("{}: {}", last.url, last.message)),
                    ),
                    None => (
                        TerminalStatus::CitedNoPdf,
                        OutcomeError::new(
                            ErrorKind::PermanentFetchError,
                            "stored artifact missing and no candidate URLs",
                        ),
                    ),
                };
                ledger.finish(&id, status, Some(error));
                return;
            }
            TaskState::Skipped => {
                counters.skipped += 1;
                ledger.finish(&id, TerminalStatus::Error, Some(cancelled()));
                return;
            }
            TaskState::Pending | TaskState::InFlight => {
                ledger.finish(
                    &id,
                    TerminalStatus::Error,
                    Some(OutcomeError::new(
                        ErrorKind::PermanentFetchError,
                        format!("download returned in state {}", task.state().name()),
                    )),
                );
                return;
            }
        };

        if Stage::DownloadResolved.next(self.gates) != Stage::ExtractionPending {
            ledger.finish(&id, TerminalStatus::DownloadedNoText, None);
            return;
        }
        ledger.advance(&id, Stage::ExtractionPending);

        let fingerprint = artifact.fingerprint.clone();
        if let Some(result) = extraction.done.get(&fingerprint) {
            apply_extraction(ledger, &id, result);
            return;
        }
        if let Some(waiting) = extraction.waiting.get_mut(&fingerprint) {
            waiting.push(id);
            return;
        }
        if cancel.is_cancelled() {
            ledger.finish(&id, TerminalStatus::DownloadedNoText, Some(cancelled()));
            return;
        }

        extraction.waiting.insert(fingerprint, vec![id]);
        let extractor = Arc::clone(&self.extractor);
        let store = Arc::clone(&self.store);
        let slots = Arc::clone(&extraction.slots);
        extraction.jobs.spawn(async move {
            let _permit = slots.acquire_owned().await;
            extractor.extract(store.as_ref(), &artifact).await
        });
    }

    /// The publication's own URLs followed by each resolver's, in preference
    /// order, without duplicates or unparseable entries
    async fn resolve_candidates(
        &self,
        publication: &Publication,
        cancel: &CancellationToken,
    ) -> Resolution {
        let mut urls: Vec<String> = Vec::new();
        for raw in &publication.pdf_urls {
            push_candidate(&mut urls, raw);
        }

        let mut failures = Vec::new();
        for resolver in &self.resolvers {
            if cancel.is_cancelled() {
                break;
            }
            let source = &resolver.source;
            let limiter = resolver.limiter.as_ref();
            let result = with_retry(citation_retry_policy(), || async move {
                if let Some(limiter) = limiter {
                    limiter.acquire().await;
                }
                source.resolve_pdf_urls(publication).await
            })
            .await;

            match result {
                Ok(found) => {
                    for raw in &found {
                        push_candidate(&mut urls, raw);
                    }
                }
                Err(SourceError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(
                        "{}: PDF resolution via {} failed: {}",
                        publication.id(),
                        resolver.source.id(),
                        e
                    );
                    failures.push(format!("{}: {}", resolver.source.id(), e));
                }
            }
        }

        let failure = (!failures.is_empty() && failures.len() == self.resolvers.len())
            .then(|| OutcomeError::new(ErrorKind::SourceUnavailable, failures.join("; ")));
        Resolution { urls, failure }
    }
}

/// Keep absolute http(s) URLs, first occurrence wins
fn push_candidate(urls: &mut Vec<String>, raw: &str) {
    let Ok(parsed) = url::Url::parse(raw.trim()) else {
        return;
    };
    let normalized = parsed.to_string();
    if matches!(parsed.scheme(), "http" | "https") && !urls.contains(&normalized) {
        urls.push(normalized);
    }
}

fn apply_extraction(ledger: &mut Ledger, id: &str, result: &ExtractionResult) {
    ledger.advance(id, Stage::ExtractionResolved);
    if result.is_success() {
        if let Some(publication) = ledger.publication_mut(id) {
            publication.full_text = Some(result.text().to_string());
            publication.extraction_stats = result.stats();
        }
        ledger.finish(id, TerminalStatus::Complete, None);
    } else {
        let reason = result.failure_reason().unwrap_or("no text extracted");
        ledger.finish(
            id,
            TerminalStatus::DownloadedNoText,
            Some(OutcomeError::new(ErrorKind::ExtractionBackendFailure, reason)),
        );
    }
}

/// Builder for [`AcquisitionPipeline`]
///
/// Anything not supplied falls back to an in-memory store, a fresh index, an
/// HTTP fetcher and the backends named in the configuration.
#[derive(Debug)]
pub struct AcquisitionPipelineBuilder {
    config: PipelineConfig,
    citation_sources: SourceRegistry,
    resolvers: SourceRegistry,
    store: Option<Arc<dyn ArtifactStore>>,
    index: Option<Arc<FingerprintIndex>>,
    fetcher: Option<Arc<dyn PdfFetcher>>,
    backends: Option<Vec<Arc<dyn ExtractionBackend>>>,
    manifest: Option<PathBuf>,
}

impl AcquisitionPipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            citation_sources: SourceRegistry::new(),
            resolvers: SourceRegistry::new(),
            store: None,
            index: None,
            fetcher: None,
            backends: None,
            manifest: None,
        }
    }

    /// Citation indexes, queried in registry order
    pub fn citation_sources(mut self, registry: SourceRegistry) -> Self {
        self.citation_sources = registry;
        self
    }

    /// PDF resolvers, queried in registry order
    pub fn pdf_resolvers(mut self, registry: SourceRegistry) -> Self {
        self.resolvers = registry;
        self
    }

    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn index(mut self, index: Arc<FingerprintIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PdfFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Override the configured extraction backend order
    pub fn backends(mut self, backends: Vec<Arc<dyn ExtractionBackend>>) -> Self {
        self.backends = Some(backends);
        self
    }

    /// Save the fingerprint index here after every run
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    pub fn build(self) -> Result<AcquisitionPipeline, PipelineError> {
        let config = self.config;
        if config.download_concurrency == 0 || config.extraction_concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "download and extraction concurrency must be at least 1".to_string(),
            ));
        }
        if config.max_citing_papers == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_citing_papers must be at least 1".to_string(),
            ));
        }

        let fetcher: Arc<dyn PdfFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(HttpClient::new()?, config.max_pdf_bytes())),
        };
        let store: Arc<dyn ArtifactStore> = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryArtifactStore::new()));
        let index = self.index.unwrap_or_else(FingerprintIndex::new);

        let downloader = PdfDownloader::new(fetcher, Arc::clone(&store), Arc::clone(&index))
            .with_retry_policy(config.retry_policy())
            .with_attempt_timeout(config.download_timeout())
            .with_max_bytes(config.max_pdf_bytes());

        let extractor = match self.backends {
            Some(backends) => FullTextExtractor::new(backends)?,
            None => FullTextExtractor::from_names(&config.extraction_backend_order)?,
        }
        .with_timeout(config.extraction_timeout())
        .with_min_word_count(config.min_word_count);

        let finder = CitationFinder::new(&self.citation_sources, config.citation_requests_per_second);
        let resolvers = self
            .resolvers
            .with_capability(SourceCapabilities::PDF_RESOLUTION)
            .into_iter()
            .map(|source| Resolver {
                source: Arc::clone(source),
                limiter: RateLimiter::per_second(config.citation_requests_per_second),
            })
            .collect();

        Ok(AcquisitionPipeline {
            gates: StageGates::from_config(&config),
            finder,
            resolvers,
            downloader: Arc::new(downloader),
            extractor: Arc::new(extractor),
            store,
            index,
            manifest: self.manifest,
            max_citing_papers: config.max_citing_papers,
            continue_on_citation_failure: config.continue_on_citation_failure,
            download_concurrency: config.download_concurrency,
            extraction_concurrency: config.extraction_concurrency,
        })
    }
}
