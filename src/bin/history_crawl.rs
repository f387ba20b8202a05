//! Crawl the sk-ah.com sale history into the local price database.
//!
//! Resumes from the checkpoint ledger when the page plan is unchanged.
//! Ctrl-C stops the workers after they flush what they have.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sk_market_scout::application::HistoryCrawl;
use sk_market_scout::crawling::CrawlSummary;
use sk_market_scout::infrastructure::config::{AppConfig, ConfigManager};
use sk_market_scout::infrastructure::page_source::replay_source::ReplayPages;
use sk_market_scout::infrastructure::page_source::{
    HttpPageSourceFactory, PageSourceFactory, ReplayPageSourceFactory,
};
use sk_market_scout::infrastructure::parsing::PageNavigator;
use sk_market_scout::infrastructure::{init_logging, log_system_info};

#[derive(Debug, Parser)]
#[command(name = "history_crawl", version, about = "Crawl auction sale history into the local database")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Last history page to crawl
    #[arg(long)]
    total_pages: Option<u32>,

    /// Pages per worker between flushes
    #[arg(long)]
    batch_size: Option<u32>,

    #[arg(long)]
    worker_count: Option<usize>,

    #[arg(long)]
    start_page: Option<u32>,

    /// Directory holding item_database.json and the checkpoint ledger
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Serve pages from saved `history_{N}.html` files instead of the site
    #[arg(long)]
    replay_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(total_pages) = self.total_pages {
            config.crawl.total_pages = total_pages;
        }
        if let Some(batch_size) = self.batch_size {
            config.crawl.batch_size = batch_size;
        }
        if let Some(worker_count) = self.worker_count {
            config.crawl.worker_count = worker_count;
        }
        if let Some(start_page) = self.start_page {
            config.crawl.start_page = start_page;
        }
        if let Some(data_dir) = &self.data_dir {
            config.storage.data_dir.clone_from(data_dir);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(summary) if summary.has_halted_workers() => {
            error!("❌ {} worker(s) halted; rerun to resume", summary.halted_workers().len());
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ History crawl failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<CrawlSummary> {
    let mut config = ConfigManager::new(cli.config.as_deref()).load()?;
    cli.apply(&mut config);

    init_logging(&config.logging)?;
    log_system_info();

    let navigator = Arc::new(
        PageNavigator::with_config(&config.selectors).context("Invalid navigation selectors")?,
    );
    let factory: Arc<dyn PageSourceFactory> = match &cli.replay_dir {
        Some(dir) => {
            let pages = ReplayPages::from_dir(dir)?;
            Arc::new(ReplayPageSourceFactory::new(pages, navigator))
        }
        None => Arc::new(HttpPageSourceFactory::new(config.site.clone(), navigator)),
    };

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, flushing workers");
            signal_token.cancel();
        }
    });

    let crawl = HistoryCrawl::new(config, factory);
    let summary = crawl.run(cancel).await?;

    info!("🏁 History crawl finished");
    println!("{summary}");
    Ok(summary)
}
