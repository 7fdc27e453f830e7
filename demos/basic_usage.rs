//! Basic usage example for the Citation Harvest library.
//!
//! Finds papers citing a DOI, downloads their open-access PDFs into a
//! temporary store and prints what was extracted.

use citation_harvest::config::Config;
use citation_harvest::models::Publication;
use citation_harvest::AcquisitionPipeline;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let doi = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "10.1038/nature14539".to_string());

    let store_dir = std::env::temp_dir().join("citation-harvest-demo");

    let mut config = Config::default();
    config.store.directory = store_dir.clone();
    config.pipeline.max_citing_papers = 5;
    config.pipeline.download_concurrency = 2;

    let pipeline = AcquisitionPipeline::from_config(&config)?;
    println!("Artifacts are stored in {}\n", store_dir.display());

    let run = pipeline.run(vec![Publication::new(doi.as_str(), "Seed")]).await;

    println!("Citations discovered: {}", run.citations.len());
    for (status, count) in run.summary() {
        println!("  {:<20} {}", status.id(), count);
    }
    println!();

    for publication in &run.publications {
        let Some(outcome) = run.outcome(publication.id()) else {
            continue;
        };
        println!("{} - {}", publication.id(), outcome.describe());
        if let Some(stats) = &publication.extraction_stats {
            println!(
                "    {} words in {} sections ({})",
                stats.word_count, stats.section_count, stats.backend
            );
        }
    }

    Ok(())
}
