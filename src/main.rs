use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use citation_harvest::config::{
    find_config_file, load_config, write_default_config, LoggingConfig,
};
use citation_harvest::models::{ExtractionResult, PipelineRun, Publication, PublicationBuilder};
use citation_harvest::pipeline::{AcquisitionPipeline, CitationFinder, CitationLookup, FullTextExtractor};
use citation_harvest::sources::{normalize_doi, SourceRegistry};
use citation_harvest::utils::HttpClient;
use comfy_table::{Attribute, Cell, Table};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Citation Harvest - find citing papers, fetch their PDFs and extract full text
#[derive(Parser, Debug)]
#[command(name = "citation-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find citing papers, fetch their PDFs and extract full text", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, short, value_enum, global = true, default_value_t = OutputFormat::Auto)]
    output: OutputFormat,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Output format for results
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Table on a terminal, JSON otherwise
    Auto,
    /// Table format (human-readable)
    Table,
    /// JSON format (machine-readable)
    Json,
}

impl OutputFormat {
    fn resolve(self) -> OutputFormat {
        match self {
            OutputFormat::Auto if std::io::stdout().is_terminal() => OutputFormat::Table,
            OutputFormat::Auto => OutputFormat::Json,
            other => other,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the acquisition pipeline over seed publications
    Run {
        /// Seed publication ids (DOIs or source ids)
        ids: Vec<String>,

        /// File with one seed id per line ('#' starts a comment)
        #[arg(long)]
        seeds_file: Option<PathBuf>,

        /// Skip citation discovery
        #[arg(long)]
        no_citations: bool,

        /// Skip PDF download
        #[arg(long)]
        no_download: bool,

        /// Skip full-text extraction
        #[arg(long)]
        no_fulltext: bool,

        /// Maximum concurrent downloads
        #[arg(long)]
        concurrency: Option<usize>,

        /// Maximum citing papers per seed
        #[arg(long)]
        max_citing: Option<usize>,

        /// Write the finished run as JSON
        #[arg(long)]
        save: Option<PathBuf>,

        /// Re-run the failed publications of a saved run
        #[arg(long, conflicts_with_all = ["ids", "seeds_file"])]
        rerun: Option<PathBuf>,
    },

    /// List papers citing a publication
    Citations {
        /// Publication id (DOI or source id)
        id: String,

        /// Maximum number of citing papers
        #[arg(long, short, default_value_t = 20)]
        max_results: usize,
    },

    /// Extract full text from a local PDF
    Extract {
        /// Path to the PDF
        pdf: PathBuf,
    },

    /// Write a default configuration file
    InitConfig {
        /// Target path (default: <config dir>/citation-harvest/config.toml)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(find_config_file);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    init_tracing(&cli, &config.logging);
    if let Some(ref path) = config_path {
        tracing::debug!("Using config file: {}", path.display());
    }

    let format = cli.output.resolve();
    match cli.command {
        Commands::Run {
            ids,
            seeds_file,
            no_citations,
            no_download,
            no_fulltext,
            concurrency,
            max_citing,
            save,
            rerun,
        } => {
            let mut config = config;
            let pipeline_config = &mut config.pipeline;
            pipeline_config.enable_citation_discovery &= !no_citations;
            pipeline_config.enable_pdf_download &= !no_download;
            pipeline_config.enable_fulltext &= !no_fulltext;
            if let Some(n) = concurrency {
                pipeline_config.download_concurrency = n;
            }
            if let Some(n) = max_citing {
                pipeline_config.max_citing_papers = n;
            }

            let pipeline = AcquisitionPipeline::from_config(&config)?;
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling outstanding work");
                    ctrl_c.cancel();
                }
            });

            let run = match rerun {
                Some(path) => {
                    let previous = PipelineRun::load(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    pipeline.rerun_with_cancel(&previous, cancel).await
                }
                None => {
                    let mut seeds = ids;
                    if let Some(ref path) = seeds_file {
                        seeds.extend(read_seeds_file(path)?);
                    }
                    if seeds.is_empty() {
                        bail!("no seed publications given; pass ids or --seeds-file");
                    }
                    let publications = seeds.iter().map(|id| seed_publication(id)).collect();
                    pipeline.run_with_cancel(publications, cancel).await
                }
            };

            if let Some(ref path) = save {
                run.save(path)
                    .with_context(|| format!("writing {}", path.display()))?;
                tracing::info!("Run saved to {}", path.display());
            }
            output_run(&run, format)?;
        }

        Commands::Citations { id, max_results } => {
            let client = HttpClient::new()?;
            let registry =
                SourceRegistry::from_ids(&config.sources.citation_sources, &config.sources, &client)?;
            let finder = CitationFinder::new(&registry, config.pipeline.citation_requests_per_second);
            let lookup = finder.find_citing_papers(&id, max_results).await;
            if let Some(ref unavailable) = lookup.unavailable {
                bail!("citation sources unavailable: {}", unavailable);
            }
            output_citations(&lookup, format)?;
        }

        Commands::Extract { pdf } => {
            let extractor = FullTextExtractor::from_names(&config.pipeline.extraction_backend_order)?
                .with_timeout(config.pipeline.extraction_timeout())
                .with_min_word_count(config.pipeline.min_word_count);
            let result = extractor
                .extract_file(&pdf)
                .await
                .with_context(|| format!("reading {}", pdf.display()))?;
            output_extraction(&result, format)?;
            if !result.is_success() {
                std::process::exit(1);
            }
        }

        Commands::InitConfig { path } => {
            let path = match path {
                Some(path) => path,
                None => dirs::config_dir()
                    .context("no configuration directory on this platform")?
                    .join("citation-harvest")
                    .join("config.toml"),
            };
            write_default_config(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

/// Logs go to stderr so JSON on stdout stays parseable
fn init_tracing(cli: &Cli, logging: &LoggingConfig) {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => logging.level.as_str(),
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| format!("citation_harvest={}", level)),
    );

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn seed_publication(id: &str) -> Publication {
    let id = id.trim();
    match normalize_doi(id) {
        Some(doi) => PublicationBuilder::new(id, "").doi(doi).build(),
        None => Publication::new(id, ""),
    }
}

fn read_seeds_file(path: &Path) -> Result<Vec<String>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse_seeds(&content))
}

fn parse_seeds(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

fn output_run(run: &PipelineRun, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(run)?);
        return Ok(());
    }

    let mut outcomes = Table::new();
    outcomes.load_preset(comfy_table::presets::UTF8_FULL);
    outcomes.set_header(vec!["Publication", "Title", "Status", "Attempts", "Detail"]);
    for publication in &run.publications {
        let Some(outcome) = run.outcome(publication.id()) else {
            continue;
        };
        let detail = match outcome.error {
            Some(ref error) => format!("{}: {}", error.kind, shorten(&error.message, 60)),
            None => outcome.status.description().to_string(),
        };
        outcomes.add_row(vec![
            Cell::new(shorten(publication.id(), 40)).add_attribute(Attribute::Bold),
            Cell::new(shorten(&publication.title, 40)),
            Cell::new(outcome.status.id()),
            Cell::new(outcome.attempts),
            Cell::new(detail),
        ]);
    }
    println!("{outcomes}");

    let mut summary = Table::new();
    summary.load_preset(comfy_table::presets::UTF8_FULL);
    summary.set_header(vec!["Status", "Publications"]);
    for (status, count) in run.summary() {
        summary.add_row(vec![Cell::new(status.id()), Cell::new(count)]);
    }
    println!("{summary}");

    let c = run.counters;
    println!(
        "Downloads: {} attempted, {} stored, {} duplicates, {} failed, {} skipped",
        c.attempted, c.succeeded, c.deduplicated, c.failed, c.skipped
    );
    println!("Citations discovered: {}", run.citations.len());
    if run.cancelled {
        println!("Run was cancelled; re-run with --rerun to finish the remaining publications");
    }
    Ok(())
}

fn output_citations(lookup: &CitationLookup, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&lookup.citing)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Citing paper", "Title", "PDF URLs", "Source"]);
    for paper in &lookup.citing {
        table.add_row(vec![
            Cell::new(shorten(paper.record.citing_id(), 40)).add_attribute(Attribute::Bold),
            Cell::new(shorten(&paper.metadata.title, 60)),
            Cell::new(paper.metadata.pdf_urls.len()),
            Cell::new(&paper.metadata.source),
        ]);
    }
    println!("{table}");
    println!("{} citing papers", lookup.citing.len());
    Ok(())
}

fn output_extraction(result: &ExtractionResult, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if let Some(reason) = result.failure_reason() {
        println!("Extraction failed: {}", reason);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Section", "Words", "Begins"]);
    for section in result.sections() {
        table.add_row(vec![
            Cell::new(&section.label).add_attribute(Attribute::Bold),
            Cell::new(section.body.split_whitespace().count()),
            Cell::new(shorten(&section.body.replace('\n', " "), 60)),
        ]);
    }
    println!("{table}");
    println!(
        "{} words via {} (fingerprint {})",
        result.word_count(),
        result.backend().unwrap_or("unknown"),
        result.artifact().short()
    );
    Ok(())
}
