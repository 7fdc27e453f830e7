//! Integration tests for Citation Harvest
//!
//! HTTP sources and the PDF fetcher run against mockito servers; pipeline
//! behaviour is driven by scripted fetchers and mock sources.

use async_trait::async_trait;
use citation_harvest::config::PipelineConfig;
use citation_harvest::models::{ErrorKind, Publication, PublicationBuilder, TerminalStatus};
use citation_harvest::pipeline::{
    AcquisitionPipeline, BackendError, ExtractionBackend, FetchError, FullTextExtractor,
    HttpFetcher, PdfFetcher,
};
use citation_harvest::sources::{
    MockSource, OpenAlexSource, SemanticScholarSource, Source, SourceError, SourceRegistry,
    UnpaywallSource,
};
use citation_harvest::store::{ArtifactStore, FingerprintIndex, FsArtifactStore, MemoryArtifactStore};
use citation_harvest::utils::{HttpClient, TransientError};
use mockito::Matcher;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

const PAPER_TEXT: &str = "Front matter\n\nAbstract\nA short abstract.\n\nMethods\nWhat was done.\n\nResults\nWhat was found.";

fn client() -> HttpClient {
    HttpClient::new().unwrap()
}

fn pdf(body: &str) -> Vec<u8> {
    format!("%PDF-1.7\n{}\n%%EOF", body).into_bytes()
}

/// Scripted responses per URL; the last response repeats, unknown URLs 404
#[derive(Debug, Default)]
struct ScriptedFetcher {
    script: Mutex<HashMap<String, VecDeque<Result<Vec<u8>, FetchError>>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedFetcher {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn respond(self, url: &str, responses: Vec<Result<Vec<u8>, FetchError>>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
        self
    }

    fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PdfFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut script = self.script.lock().unwrap();
        match script.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Err(FetchError::Status {
                status: 404,
                retry_after: None,
            }),
        }
    }
}

/// Returns fixed text and counts invocations
#[derive(Debug)]
struct CountingBackend {
    text: String,
    calls: AtomicUsize,
}

impl CountingBackend {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractionBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn extract(&self, _bytes: &[u8]) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        enable_citation_discovery: false,
        retry_initial_delay_ms: 1,
        retry_max_delay_ms: 5,
        min_word_count: 3,
        citation_requests_per_second: 1000.0,
        ..PipelineConfig::default()
    }
}

struct Harness {
    pipeline: AcquisitionPipeline,
    fetcher: Arc<ScriptedFetcher>,
    backend: Arc<CountingBackend>,
}

fn harness(config: PipelineConfig, fetcher: ScriptedFetcher, store: Arc<dyn ArtifactStore>) -> Harness {
    harness_with_sources(config, fetcher, store, SourceRegistry::new(), FingerprintIndex::new())
}

fn harness_with_sources(
    config: PipelineConfig,
    fetcher: ScriptedFetcher,
    store: Arc<dyn ArtifactStore>,
    sources: SourceRegistry,
    index: Arc<FingerprintIndex>,
) -> Harness {
    let fetcher = Arc::new(fetcher);
    let backend = CountingBackend::new(PAPER_TEXT);
    let pipeline = AcquisitionPipeline::builder(config)
        .citation_sources(sources.clone())
        .pdf_resolvers(sources)
        .store(store)
        .index(index)
        .fetcher(fetcher.clone())
        .backends(vec![backend.clone() as Arc<dyn ExtractionBackend>])
        .build()
        .unwrap();
    Harness {
        pipeline,
        fetcher,
        backend,
    }
}

fn seed(id: &str, urls: &[&str]) -> Publication {
    PublicationBuilder::new(id, format!("Title of {}", id))
        .pdf_urls(urls.iter().copied())
        .build()
}

// ===== Sources over HTTP =====

#[tokio::test]
async fn test_semantic_scholar_citations() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", Matcher::Regex(r"^/paper/DOI%3A10\.1000%2Fseed/citations".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"data": [
                {"citingPaper": {"paperId": "abc", "title": "Citing One",
                    "externalIds": {"DOI": "10.2000/ONE"},
                    "openAccessPdf": {"url": "https://example.org/one.pdf"}}},
                {"citingPaper": {"paperId": "def", "title": "Citing Two"}}
            ]}"#,
        )
        .create_async()
        .await;

    let source = SemanticScholarSource::new(client()).with_base_url(server.url());
    let hits = source.citing_papers("10.1000/seed", 10).await.unwrap();

    mock.assert_async().await;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].citing_id, "10.2000/one");
    assert_eq!(hits[0].metadata.pdf_urls, vec!["https://example.org/one.pdf"]);
    assert_eq!(hits[1].citing_id, "def");
}

#[tokio::test]
async fn test_semantic_scholar_rate_limit_surfaces_retry_after() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/paper/.*/citations".to_string()))
        .with_status(429)
        .with_header("retry-after", "12")
        .create_async()
        .await;

    let source = SemanticScholarSource::new(client()).with_base_url(server.url());
    let err = source.citing_papers("10.1000/seed", 10).await.unwrap_err();
    assert!(matches!(err, SourceError::RateLimit(Some(12))));
}

#[tokio::test]
async fn test_openalex_citations_via_doi_lookup() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", Matcher::Regex(r"^/works/doi:10\.1000/seed".to_string()))
        .with_status(200)
        .with_body(r#"{"id": "https://openalex.org/W42", "display_name": "Seed"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/works")
        .match_query(Matcher::UrlEncoded("filter".into(), "cites:W42".into()))
        .with_status(200)
        .with_body(
            r#"{"results": [{
                "id": "https://openalex.org/W7",
                "doi": "https://doi.org/10.3000/cite",
                "display_name": "Citing Work",
                "abstract_inverted_index": {"Hello": [0], "world": [1]},
                "best_oa_location": {"pdf_url": "https://repo.org/w7.pdf"}
            }]}"#,
        )
        .create_async()
        .await;

    let source = OpenAlexSource::new(client()).with_base_url(server.url());
    let hits = source.citing_papers("10.1000/seed", 5).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].citing_id, "10.3000/cite");
    assert_eq!(hits[0].metadata.r#abstract.as_deref(), Some("Hello world"));
    assert_eq!(hits[0].metadata.pdf_urls, vec!["https://repo.org/w7.pdf"]);
}

#[tokio::test]
async fn test_unpaywall_resolves_pdf_urls() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/10.1000/oa")
        .match_query(Matcher::UrlEncoded("email".into(), "me@example.org".into()))
        .with_status(200)
        .with_body(
            r#"{"best_oa_location": {"url_for_pdf": "https://oa.org/a.pdf"},
                "oa_locations": [{"url_for_pdf": "https://oa.org/a.pdf"}, {"url_for_pdf": "https://mirror.org/a.pdf"}]}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/10.1000/missing")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;

    let source = UnpaywallSource::new(client())
        .with_base_url(server.url())
        .with_email("me@example.org");

    let found = source
        .resolve_pdf_urls(&PublicationBuilder::new("x", "X").doi("10.1000/oa").build())
        .await
        .unwrap();
    assert_eq!(found, vec!["https://oa.org/a.pdf", "https://mirror.org/a.pdf"]);

    let missing = source
        .resolve_pdf_urls(&Publication::new("10.1000/missing", "M"))
        .await
        .unwrap();
    assert!(missing.is_empty());
}

// ===== HTTP fetcher =====

#[tokio::test]
async fn test_http_fetcher_status_handling() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/ok.pdf")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body(pdf("body"))
        .create_async()
        .await;
    server.mock("GET", "/gone.pdf").with_status(404).create_async().await;
    server.mock("GET", "/busy.pdf").with_status(503).create_async().await;
    server
        .mock("GET", "/slow-down.pdf")
        .with_status(429)
        .with_header("retry-after", "7")
        .create_async()
        .await;

    let fetcher = HttpFetcher::new(client(), 1024 * 1024);
    let base = server.url();

    let bytes = assert_ok!(fetcher.fetch(&format!("{}/ok.pdf", base)).await);
    assert!(bytes.starts_with(b"%PDF-"));

    let gone = assert_err!(fetcher.fetch(&format!("{}/gone.pdf", base)).await);
    assert_eq!(gone.kind(), ErrorKind::PermanentFetchError);

    let busy = fetcher.fetch(&format!("{}/busy.pdf", base)).await.unwrap_err();
    assert!(busy.is_transient());

    let limited = fetcher.fetch(&format!("{}/slow-down.pdf", base)).await.unwrap_err();
    assert_eq!(limited.transient(), Some(TransientError::RateLimit(Some(7))));
}

#[tokio::test]
async fn test_http_fetcher_size_cap() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/big.pdf")
        .with_status(200)
        .with_body(pdf(&"x".repeat(4096)))
        .create_async()
        .await;

    let fetcher = HttpFetcher::new(client(), 1024);
    let err = fetcher
        .fetch(&format!("{}/big.pdf", server.url()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::TooLarge { limit: 1024 }));
    assert_eq!(err.kind(), ErrorKind::ValidationError);
}

#[tokio::test]
async fn test_http_fetcher_rejects_bad_url() {
    let fetcher = HttpFetcher::new(client(), 1024);
    let err = fetcher.fetch("not a url").await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidUrl(_)));
}

// ===== Pipeline properties =====

#[tokio::test]
async fn test_uncited_seed_creates_no_download() {
    let mock = Arc::new(MockSource::new("mock").with_pdf_urls("lonely", ["https://a.org/l.pdf"]));
    let sources = SourceRegistry::new().with(mock);
    let config = PipelineConfig {
        enable_citation_discovery: true,
        ..test_config()
    };
    let h = harness_with_sources(
        config,
        ScriptedFetcher::default().respond("https://a.org/l.pdf", vec![Ok(pdf("l"))]),
        Arc::new(MemoryArtifactStore::new()),
        sources,
        FingerprintIndex::new(),
    );

    let run = h.pipeline.run(vec![Publication::new("lonely", "Lonely")]).await;

    assert_eq!(run.status_of("lonely"), Some(TerminalStatus::NotCited));
    assert_eq!(run.counters.attempted, 0);
    assert_eq!(h.fetcher.total_calls(), 0);
    assert!(run.outcome("lonely").unwrap().download_state.is_none());
}

#[tokio::test]
async fn test_citing_papers_with_identical_pdfs_stored_and_extracted_once() {
    let mock = Arc::new(
        MockSource::new("mock")
            .with_citations("seed", ["c1", "c2"])
            .with_pdf_urls("c1", ["https://preprints.org/c.pdf"])
            .with_pdf_urls("c2", ["https://journal.org/c.pdf"]),
    );
    let sources = SourceRegistry::new().with(mock);
    let config = PipelineConfig {
        enable_citation_discovery: true,
        ..test_config()
    };
    let store = Arc::new(MemoryArtifactStore::new());
    let h = harness_with_sources(
        config,
        ScriptedFetcher::with_delay(Duration::from_millis(10))
            .respond("https://preprints.org/c.pdf", vec![Ok(pdf("same"))])
            .respond("https://journal.org/c.pdf", vec![Ok(pdf("same"))]),
        store.clone(),
        sources,
        FingerprintIndex::new(),
    );

    let run = h.pipeline.run(vec![Publication::new("seed", "Seed")]).await;

    assert_eq!(run.citations.len(), 2);
    assert!(run.citations.iter().all(|c| c.cited_id() == "seed"));
    assert_eq!(run.status_of("seed"), Some(TerminalStatus::CitedNoPdf));
    assert_eq!(run.status_of("c1"), Some(TerminalStatus::Complete));
    assert_eq!(run.status_of("c2"), Some(TerminalStatus::Complete));

    assert_eq!(store.writes(), 1);
    assert_eq!(h.backend.calls(), 1);
    assert_eq!(run.counters.succeeded, 1);
    assert_eq!(run.counters.deduplicated, 1);

    let a = run.outcome("c1").unwrap().artifact.clone().unwrap();
    let b = run.outcome("c2").unwrap().artifact.clone().unwrap();
    assert_eq!(a.fingerprint, b.fingerprint);

    let c1 = run.publication("c1").unwrap();
    assert!(c1.full_text.as_deref().unwrap().contains("A short abstract."));
    assert_eq!(c1.extraction_stats.as_ref().unwrap().section_count, 4);
}

#[tokio::test]
async fn test_rerun_does_not_refetch_stored_content() {
    let dir = TempDir::new().unwrap();
    let manifest = dir.path().join("index.json");
    let good = "https://a.org/good.pdf";
    let flaky = "https://b.org/flaky.pdf";

    let first = {
        let store = Arc::new(FsArtifactStore::open(dir.path().join("artifacts")).unwrap());
        let fetcher = ScriptedFetcher::default().respond(good, vec![Ok(pdf("good"))]);
        let h = harness(test_config(), fetcher, store);
        let pipeline_run = h.pipeline.run(vec![seed("p1", &[good]), seed("p2", &[flaky])]).await;
        h.pipeline.index().save(&manifest).unwrap();
        assert_eq!(h.fetcher.calls_to(good), 1);
        pipeline_run
    };
    assert_eq!(first.status_of("p1"), Some(TerminalStatus::Complete));
    assert_eq!(first.status_of("p2"), Some(TerminalStatus::CitedNoPdf));
    assert_eq!(
        first.rerun_candidates().iter().map(|p| p.id()).collect::<Vec<_>>(),
        vec!["p2"]
    );

    // A fresh process: new fetcher, index restored from the manifest.
    let store = Arc::new(FsArtifactStore::open(dir.path().join("artifacts")).unwrap());
    let fetcher = ScriptedFetcher::default()
        .respond(good, vec![Ok(pdf("good"))])
        .respond(flaky, vec![Ok(pdf("flaky"))]);
    let h = harness_with_sources(
        test_config(),
        fetcher,
        store,
        SourceRegistry::new(),
        FingerprintIndex::load(&manifest).unwrap(),
    );

    let second = h.pipeline.run(vec![seed("p1", &[good]), seed("p2", &[flaky])]).await;
    assert_eq!(h.fetcher.calls_to(good), 0);
    assert_eq!(h.fetcher.calls_to(flaky), 1);
    assert_eq!(second.status_of("p1"), Some(TerminalStatus::Complete));
    assert_eq!(second.status_of("p2"), Some(TerminalStatus::Complete));
    assert_eq!(second.outcome("p1").unwrap().download_state.as_deref(), Some("skipped_duplicate"));

    let rerun = h.pipeline.rerun(&first).await;
    assert_eq!(rerun.publications.len(), 1);
    assert_eq!(h.fetcher.calls_to(flaky), 1);
    assert_eq!(rerun.status_of("p2"), Some(TerminalStatus::Complete));
}

#[tokio::test]
async fn test_download_concurrency_is_bounded() {
    let mut fetcher = ScriptedFetcher::with_delay(Duration::from_millis(25));
    let mut seeds = Vec::new();
    for i in 0..12 {
        let url = format!("https://host.org/{}.pdf", i);
        fetcher = fetcher.respond(&url, vec![Ok(pdf(&format!("paper {}", i)))]);
        seeds.push(seed(&format!("p{}", i), &[url.as_str()]));
    }
    let config = PipelineConfig {
        download_concurrency: 3,
        ..test_config()
    };
    let h = harness(config, fetcher, Arc::new(MemoryArtifactStore::new()));

    let run = h.pipeline.run(seeds).await;

    assert!(h.fetcher.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(run.summary()[&TerminalStatus::Complete], 12);
    assert_eq!(h.backend.calls(), 12);
}

#[tokio::test]
async fn test_all_not_found_fails_without_backoff() {
    let config = PipelineConfig {
        retry_initial_delay_ms: 10_000,
        retry_max_delay_ms: 10_000,
        ..test_config()
    };
    let h = harness(config, ScriptedFetcher::default(), Arc::new(MemoryArtifactStore::new()));

    let started = Instant::now();
    let run = h
        .pipeline
        .run(vec![seed("p1", &["https://a.org/1.pdf", "https://b.org/1.pdf", "https://c.org/1.pdf"])])
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    let outcome = run.outcome("p1").unwrap();
    assert_eq!(outcome.status, TerminalStatus::CitedNoPdf);
    assert_eq!(outcome.download_state.as_deref(), Some("failed"));
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::PermanentFetchError);
    assert_eq!(run.counters.failed, 1);
}

#[tokio::test]
async fn test_third_url_succeeds_after_two_timing_out() {
    let fetcher = ScriptedFetcher::default()
        .respond("https://a.org/x.pdf", vec![Err(FetchError::Timeout)])
        .respond("https://b.org/x.pdf", vec![Err(FetchError::Timeout)])
        .respond("https://c.org/x.pdf", vec![Ok(pdf("x"))]);
    let h = harness(test_config(), fetcher, Arc::new(MemoryArtifactStore::new()));

    let run = h
        .pipeline
        .run(vec![seed("p1", &["https://a.org/x.pdf", "https://b.org/x.pdf", "https://c.org/x.pdf"])])
        .await;

    let outcome = run.outcome("p1").unwrap();
    assert_eq!(outcome.download_state.as_deref(), Some("succeeded"));
    // (1 + 3 retries) on each timing-out URL, then one success
    assert_eq!(outcome.attempts, 9);
    assert_eq!(h.fetcher.calls_to("https://a.org/x.pdf"), 4);
    assert_eq!(
        outcome.artifact.as_ref().unwrap().source_url.as_deref(),
        Some("https://c.org/x.pdf")
    );
}

#[tokio::test]
async fn test_section_detection_through_extractor() {
    let extractor = FullTextExtractor::new(vec![CountingBackend::new(PAPER_TEXT) as Arc<dyn ExtractionBackend>])
        .unwrap()
        .with_min_word_count(3);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.pdf");
    std::fs::write(&path, pdf("anything")).unwrap();

    let result = extractor.extract_file(&path).await.unwrap();
    assert!(result.is_success());
    assert_eq!(
        result.section_labels(),
        vec!["preamble", "Abstract", "Methods", "Results"]
    );
    assert_eq!(result.backend(), Some("counting"));
}

#[tokio::test]
async fn test_cancellation_skips_undispatched_tasks() {
    let mut fetcher = ScriptedFetcher::with_delay(Duration::from_millis(100));
    let mut seeds = Vec::new();
    for i in 0..5 {
        let url = format!("https://host.org/{}.pdf", i);
        fetcher = fetcher.respond(&url, vec![Ok(pdf(&format!("paper {}", i)))]);
        seeds.push(seed(&format!("p{}", i), &[url.as_str()]));
    }
    let config = PipelineConfig {
        download_concurrency: 1,
        ..test_config()
    };
    let h = harness(config, fetcher, Arc::new(MemoryArtifactStore::new()));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let run = h.pipeline.run_with_cancel(seeds, cancel).await;

    assert!(run.cancelled);
    assert_eq!(run.outcomes.len(), 5);
    assert_eq!(run.status_of("p0"), Some(TerminalStatus::Complete));

    let skipped: Vec<_> = run
        .outcomes
        .values()
        .filter(|o| o.download_state.as_deref() == Some("skipped"))
        .collect();
    assert!(!skipped.is_empty());
    for outcome in &skipped {
        assert_eq!(outcome.status, TerminalStatus::Error);
        assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
        assert_eq!(outcome.attempts, 0);
    }
    assert_eq!(run.counters.skipped, skipped.len());
    assert!(h.fetcher.total_calls() < 5);

    let again: Vec<_> = run.rerun_candidates().iter().map(|p| p.id().to_string()).collect();
    assert!(!again.contains(&"p0".to_string()));
    assert!(skipped.iter().all(|o| again.contains(&o.publication_id)));
}

#[tokio::test]
async fn test_disabled_stages_short_circuit() {
    let fetcher = ScriptedFetcher::default().respond("https://a.org/p.pdf", vec![Ok(pdf("p"))]);
    let config = PipelineConfig {
        enable_pdf_download: false,
        ..test_config()
    };
    let h = harness(config, fetcher, Arc::new(MemoryArtifactStore::new()));
    let run = h.pipeline.run(vec![seed("p1", &["https://a.org/p.pdf"])]).await;
    assert_eq!(run.status_of("p1"), Some(TerminalStatus::CitedNoPdf));
    assert_eq!(h.fetcher.total_calls(), 0);

    let fetcher = ScriptedFetcher::default().respond("https://a.org/p.pdf", vec![Ok(pdf("p"))]);
    let config = PipelineConfig {
        enable_fulltext: false,
        ..test_config()
    };
    let h = harness(config, fetcher, Arc::new(MemoryArtifactStore::new()));
    let run = h.pipeline.run(vec![seed("p1", &["https://a.org/p.pdf"])]).await;
    assert_eq!(run.status_of("p1"), Some(TerminalStatus::DownloadedNoText));
    assert_eq!(h.backend.calls(), 0);
}

#[tokio::test]
async fn test_unreachable_citation_index_policy() {
    let down = Arc::new(MockSource::unavailable("down"));
    let fetcher = || ScriptedFetcher::default().respond("https://a.org/s.pdf", vec![Ok(pdf("s"))]);

    let strict = PipelineConfig {
        enable_citation_discovery: true,
        continue_on_citation_failure: false,
        ..test_config()
    };
    let h = harness_with_sources(
        strict,
        fetcher(),
        Arc::new(MemoryArtifactStore::new()),
        SourceRegistry::new().with(down.clone()),
        FingerprintIndex::new(),
    );
    let run = h.pipeline.run(vec![seed("s", &["https://a.org/s.pdf"])]).await;
    let outcome = run.outcome("s").unwrap();
    assert_eq!(outcome.status, TerminalStatus::Error);
    assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::SourceUnavailable);

    let lenient = PipelineConfig {
        enable_citation_discovery: true,
        ..test_config()
    };
    let h = harness_with_sources(
        lenient,
        fetcher(),
        Arc::new(MemoryArtifactStore::new()),
        SourceRegistry::new().with(down),
        FingerprintIndex::new(),
    );
    let run = h.pipeline.run(vec![seed("s", &["https://a.org/s.pdf"])]).await;
    let outcome = run.outcome("s").unwrap();
    assert_eq!(outcome.status, TerminalStatus::Complete);
    assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::SourceUnavailable);
    assert!(outcome.needs_rerun());
}

#[tokio::test]
async fn test_storage_failure_is_isolated() {
    let fetcher = ScriptedFetcher::default()
        .respond("https://a.org/1.pdf", vec![Ok(pdf("one"))])
        .respond("https://a.org/2.pdf", vec![Ok(pdf("two"))]);
    let h = harness(test_config(), fetcher, Arc::new(MemoryArtifactStore::failing()));

    let run = h
        .pipeline
        .run(vec![seed("p1", &["https://a.org/1.pdf"]), seed("p2", &["https://a.org/2.pdf"])])
        .await;

    for id in ["p1", "p2"] {
        let outcome = run.outcome(id).unwrap();
        assert_eq!(outcome.status, TerminalStatus::Error);
        assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::StorageFailure);
    }
    assert!(run.is_finalized());
}

#[tokio::test]
async fn test_rerun_retries_only_failed_seed() {
    let mock = Arc::new(
        MockSource::new("mock")
            .with_citations("seed", ["c1"])
            .with_pdf_urls("c1", ["https://journal.org/c1.pdf"]),
    );
    let config = PipelineConfig {
        enable_citation_discovery: true,
        ..test_config()
    };
    let h = harness_with_sources(
        config,
        ScriptedFetcher::default().respond("https://journal.org/c1.pdf", vec![Ok(pdf("c1"))]),
        Arc::new(MemoryArtifactStore::new()),
        SourceRegistry::new().with(mock),
        FingerprintIndex::new(),
    );

    let first = h
        .pipeline
        .run(vec![seed("seed", &["https://publisher.org/seed.pdf"])])
        .await;
    assert_eq!(first.status_of("seed"), Some(TerminalStatus::CitedNoPdf));
    assert_eq!(first.status_of("c1"), Some(TerminalStatus::Complete));
    assert_eq!(h.backend.calls(), 1);

    let rerun = h.pipeline.rerun(&first).await;

    let ids: Vec<&str> = rerun.publications.iter().map(|p| p.id()).collect();
    assert_eq!(ids, vec!["seed"]);
    assert!(rerun.citations.is_empty());
    assert_eq!(rerun.status_of("seed"), Some(TerminalStatus::CitedNoPdf));
    assert_eq!(h.fetcher.calls_to("https://publisher.org/seed.pdf"), 2);
    assert_eq!(h.fetcher.calls_to("https://journal.org/c1.pdf"), 1);
    assert_eq!(h.backend.calls(), 1);
}
