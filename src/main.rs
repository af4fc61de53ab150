use clap::Parser;
use gradcafe_crawler::augment::{augment_record, LlmStandardizer};
use gradcafe_crawler::gate::CrawlGate;
use gradcafe_crawler::gradcafe::save_results;
use gradcafe_crawler::{GradCafeCrawler, Persistent, RecordStore};
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

/// Scraper for TheGradCafe admissions results.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// The page on which to start crawling.
    #[arg(long, default_value_t = 1)]
    page: u32,

    /// The maximum number of records to collect.
    #[arg(long)]
    limit: Option<usize>,

    /// Stop once the newest already-stored id shows up.
    #[arg(long)]
    incremental: bool,

    /// Database name; records go into <name>.db.
    #[arg(long, default_value = "gradcafe")]
    db: String,

    /// Also write the scraped records to a JSON file.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Standardize program/university names after scraping.
    #[arg(long)]
    augment: bool,

    /// Endpoint of the name-standardization service.
    #[arg(long)]
    llm_endpoint: Option<String>,

    /// Courtesy delay between page fetches, in milliseconds.
    #[arg(long, default_value_t = 200)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "debug,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let args = Args::parse();

    let store = Persistent::new(&args.db).await?;

    let gate = CrawlGate::new();
    let Some(_permit) = gate.try_acquire() else {
        error!("A crawl is already in progress");
        return Ok(());
    };

    let stop_at_id = if args.incremental {
        store.latest_id().await?
    } else {
        None
    };
    info!(
        "Starting crawl at page {} (limit: {:?}, stop_at_id: {:?})",
        args.page, args.limit, stop_at_id
    );

    let mut crawler =
        GradCafeCrawler::new().with_request_delay(Duration::from_millis(args.delay_ms));
    let mut records = crawler.crawl(args.page, args.limit, stop_at_id).await;

    if args.augment {
        let standardizer = LlmStandardizer::new(args.llm_endpoint.clone());
        for record in &mut records {
            augment_record(record, &standardizer).await;
        }
    }

    for record in &records {
        RecordStore::upsert(&store, record).await?;
    }
    info!("Stored {} records in {}.db", records.len(), args.db);

    if let Some(out) = &args.out {
        save_results(&records, out)?;
        info!("Saved results to {}", out.display());
    }

    Ok(())
}
