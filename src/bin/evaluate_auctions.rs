//! Evaluate the live auction listings against the stored sale history.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use sk_market_scout::application::{EvaluationReport, render_table, run_auction_evaluation};
use sk_market_scout::domain::{EvaluationStrictness, Verdict};
use sk_market_scout::infrastructure::config::{AppConfig, ConfigManager};
use sk_market_scout::infrastructure::page_source::replay_source::ReplayPages;
use sk_market_scout::infrastructure::page_source::{
    HttpPageSourceFactory, PageSourceFactory, ReplayPageSourceFactory,
};
use sk_market_scout::infrastructure::parsing::PageNavigator;
use sk_market_scout::infrastructure::{init_logging, log_system_info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Strictness {
    /// Price must be below the median
    Strict,
    /// Price at the median also qualifies
    Inclusive,
}

impl From<Strictness> for EvaluationStrictness {
    fn from(value: Strictness) -> Self {
        match value {
            Strictness::Strict => Self::Strict,
            Strictness::Inclusive => Self::Inclusive,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "evaluate_auctions", version, about = "Flag auction listings priced below their historical median")]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many listing pages
    #[arg(long)]
    max_pages: Option<u32>,

    #[arg(long, value_enum)]
    strictness: Option<Strictness>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory for the CSV exports
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Skip writing the CSV exports
    #[arg(long)]
    no_export: bool,

    /// Serve pages from saved `listings_{N}.html` files instead of the site
    #[arg(long)]
    replay_dir: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(max_pages) = self.max_pages {
            config.evaluation.max_pages = Some(max_pages);
        }
        if let Some(strictness) = self.strictness {
            config.evaluation.strictness = strictness.into();
        }
        if let Some(data_dir) = &self.data_dir {
            config.storage.data_dir.clone_from(data_dir);
        }
        if let Some(export_dir) = &self.export_dir {
            config.evaluation.export_dir.clone_from(export_dir);
        }
        if self.no_export {
            config.evaluation.export_csv = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Auction evaluation failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<EvaluationReport> {
    let mut config = ConfigManager::new(cli.config.as_deref()).load()?;
    cli.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging)?;
    log_system_info();

    let navigator = Arc::new(
        PageNavigator::with_config(&config.selectors).context("Invalid navigation selectors")?,
    );
    let factory: Box<dyn PageSourceFactory> = match &cli.replay_dir {
        Some(dir) => Box::new(ReplayPageSourceFactory::new(ReplayPages::from_dir(dir)?, navigator)),
        None => Box::new(HttpPageSourceFactory::new(config.site.clone(), navigator)),
    };
    let mut source = factory.create(0)?;

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, evaluating listings collected so far");
            signal_token.cancel();
        }
    });

    let report = run_auction_evaluation(&config, source.as_mut(), cancel).await?;

    println!("{}", render_table(&report.recommendations));
    println!(
        "{} listings from {} pages: {} BUYOUT, {} BID, {} SKIP ({} rows dropped)",
        report.recommendations.len(),
        report.pages,
        report.count(Verdict::Buyout),
        report.count(Verdict::Bid),
        report.count(Verdict::Skip),
        report.rows_dropped
    );
    for path in &report.exports {
        info!("💾 Exported {:?}", path);
    }
    Ok(report)
}
