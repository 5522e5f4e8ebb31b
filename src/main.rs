//! filecrawl CLI: drive the crawl engine against one root directory for
//! local operation and debugging, standing in for the out-of-scope HTTP
//! surface (spec §1, §2).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use filecrawl::config::{ConfigRepository, InMemoryConfigRepository, Settings};
use filecrawl::crawl::CrawlManager;
use filecrawl::extract::basic::BasicStrategy;
use filecrawl::extract::rich_document::{HttpRichDocumentService, RichDocumentStrategy};
use filecrawl::extract::Chain;
use filecrawl::indexer::Indexer;
use filecrawl::search_client::http::HttpSearchClient;
use filecrawl::search_client::SearchClient;
use filecrawl::utils::setup_logging;

const DEFAULT_WORKER_COUNT: usize = 4;

/// Crawl a directory tree into an external search engine, optionally
/// watching it live.
#[derive(Parser)]
#[command(name = "filecrawl")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose (debug-level) logging. Default: false.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Base URL of the search-engine collection API.
    #[arg(long, global = true, default_value = "http://localhost:8108")]
    search_engine_url: String,

    /// Collection name in the search engine.
    #[arg(long, global = true, default_value = "filecrawl")]
    collection: String,

    /// Base URL of the rich-document extraction service. Omit to run with
    /// only the basic text-extraction strategy.
    #[arg(long, global = true)]
    rich_document_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl `dir` once, then keep watching it for changes until interrupted.
    Crawl {
        /// Directory to crawl and watch.
        dir: PathBuf,

        /// Skip the index-verification pass before discovery.
        #[arg(long)]
        no_verify: bool,
    },

    /// Crawl `dir` once and exit; does not start filesystem watching.
    /// Intended for scripting (cron, CI, one-shot reindex).
    Once {
        /// Directory to crawl.
        dir: PathBuf,

        /// Skip the index-verification pass before discovery.
        #[arg(long)]
        no_verify: bool,
    },

    /// Print the last persisted crawler state as JSON and exit.
    Status {
        /// Directory whose watch configuration to report on.
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let start_time = Instant::now();

    match &cli.command {
        Commands::Crawl { dir, no_verify } => run_crawl(&cli, dir, *no_verify, true)?,
        Commands::Once { dir, no_verify } => run_crawl(&cli, dir, *no_verify, false)?,
        Commands::Status { dir } => run_status(dir)?,
    }

    log::debug!("total time: {:?}", start_time.elapsed());
    Ok(())
}

fn build_manager(cli: &Cli, dir: &PathBuf, no_verify: bool) -> Result<Arc<CrawlManager>> {
    let settings = Settings {
        verify_index_on_crawl: !no_verify,
        ..Settings::default()
    };
    let config = Arc::new(
        InMemoryConfigRepository::single_root_with_settings(dir, settings.clone()).context("resolving watch root")?,
    );

    let search_client: Arc<dyn SearchClient> = Arc::new(HttpSearchClient::new(&cli.search_engine_url, &cli.collection));
    search_client.initialize_collection().context("initializing search-engine collection")?;

    let chain = match &cli.rich_document_url {
        Some(endpoint) => {
            let service = HttpRichDocumentService::new(endpoint.clone());
            Chain::default_chain(RichDocumentStrategy::new(service, true))
        }
        None => Chain::new(vec![Box::new(BasicStrategy::default())]),
    };

    let chunk_config = filecrawl::chunk::ChunkConfig::default();
    let indexer = Arc::new(Indexer::new(chain, search_client.clone(), chunk_config, settings.max_file_size_mb));
    Ok(Arc::new(CrawlManager::new(config, search_client, indexer, DEFAULT_WORKER_COUNT)))
}

fn run_crawl(cli: &Cli, dir: &PathBuf, no_verify: bool, watch: bool) -> Result<()> {
    let manager = build_manager(cli, dir, no_verify)?;

    let stop_manager = manager.clone();
    ctrlc::set_handler(move || {
        info!("received interrupt, stopping crawl");
        stop_manager.stop_crawl();
    })
    .context("installing Ctrl+C handler")?;

    if !manager.start_crawl(watch)? {
        anyhow::bail!("a crawl is already running");
    }

    loop {
        let snapshot = manager.snapshot();
        println!(
            "{} verify={}% discovery={}% indexing={}% indexed={} skipped={} error={} deleted={} queue={}",
            snapshot.phase,
            snapshot.verification_progress,
            snapshot.discovery_progress,
            snapshot.indexing_progress,
            snapshot.files_indexed,
            snapshot.files_skipped,
            snapshot.files_error,
            snapshot.files_deleted,
            snapshot.queue_size,
        );
        if !snapshot.running && !snapshot.monitoring_active {
            break;
        }
        std::thread::sleep(Duration::from_secs(1));
    }

    Ok(())
}

fn run_status(dir: &PathBuf) -> Result<()> {
    let config = InMemoryConfigRepository::single_root(dir).context("resolving watch root")?;
    let state = config.load_crawler_state();
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
