//! Live auction evaluation use case
//!
//! Walks the listings with the "Next" control, extracts every row, evaluates
//! each listing against the stored history and optionally exports both the
//! raw listings and the recommendations as CSV.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::evaluator::Evaluator;
use crate::crawling::{ListingEnd, ListingPaginator};
use crate::domain::listing::{CurrentListing, ListingRow};
use crate::domain::recommendation::{Recommendation, RecommendationRow, Verdict};
use crate::infrastructure::config::{AppConfig, sk_ah};
use crate::infrastructure::history_store::HistoryStore;
use crate::infrastructure::page_source::PageSource;
use crate::infrastructure::parsing::{ContextualParser, ListingExtractor, PageNavigator, ParseContext};
use crate::infrastructure::retry_manager::RetryPolicy;

/// Everything scraped from the listings in one walk
#[derive(Debug)]
pub struct ListingCollection {
    pub listings: Vec<CurrentListing>,
    pub pages: u32,
    pub rows_dropped: usize,
    pub end: ListingEnd,
}

/// Outcome of one evaluator run
#[derive(Debug)]
pub struct EvaluationReport {
    pub recommendations: Vec<Recommendation>,
    pub pages: u32,
    pub rows_dropped: usize,
    pub end: ListingEnd,
    pub exports: Vec<PathBuf>,
}

impl EvaluationReport {
    pub fn count(&self, verdict: Verdict) -> usize {
        self.recommendations.iter().filter(|r| r.verdict == verdict).count()
    }
}

/// Walk the listings until exhausted, capped, cancelled or failed
pub async fn collect_listings<S: PageSource + ?Sized>(
    source: &mut S,
    navigator: &PageNavigator,
    extractor: &ListingExtractor,
    retry: RetryPolicy,
    cancel: CancellationToken,
    max_pages: Option<u32>,
) -> ListingCollection {
    let mut paginator = ListingPaginator::new(source, navigator, retry, cancel, max_pages);
    let mut listings = Vec::new();
    let mut pages = 0;
    let mut rows_dropped = 0;

    while let Some(listing_page) = paginator.next().await {
        let context = ParseContext::new(listing_page.page_number, listing_page.page.url.as_str());
        let extraction = extractor.parse_str(&listing_page.page.html, &context);
        info!(
            "Extracted {} listings from page {}",
            extraction.records.len(),
            listing_page.page_number
        );
        pages += 1;
        rows_dropped += extraction.dropped.len();
        listings.extend(extraction.records);
    }

    let end = paginator.end().cloned().unwrap_or(ListingEnd::Exhausted);
    ListingCollection {
        listings,
        pages,
        rows_dropped,
        end,
    }
}

/// Load history, scrape listings through `source`, evaluate and export
pub async fn run_auction_evaluation<S: PageSource + ?Sized>(
    config: &AppConfig,
    source: &mut S,
    cancel: CancellationToken,
) -> Result<EvaluationReport> {
    let store = HistoryStore::new(config.storage.data_dir.clone());
    let history = store
        .load()
        .await
        .with_context(|| format!("Failed to load history from {:?}", store.store_path()))?;
    if history.is_empty() {
        warn!("History database is empty; every listing will be skipped");
    }

    let evaluator = Evaluator::from_history(&history, config.evaluation.strictness);
    info!(
        "📈 Loaded history for {} items (strictness: {:?})",
        evaluator.item_count(),
        evaluator.strictness()
    );

    let navigator = PageNavigator::with_config(&config.selectors).context("Invalid navigation selectors")?;
    let extractor = ListingExtractor::with_config(&config.selectors).context("Invalid listing selectors")?;

    let collection = collect_listings(
        source,
        &navigator,
        &extractor,
        RetryPolicy::from_config(&config.crawl),
        cancel,
        config.evaluation.max_pages,
    )
    .await;

    if let ListingEnd::NavigationFailed(error) = &collection.end {
        if collection.pages == 0 {
            bail!("Could not open the auction listings: {error}");
        }
        warn!(
            "⚠️ Listing navigation failed after {} pages ({}); evaluating what was collected",
            collection.pages, error
        );
    }

    let recommendations = evaluator.evaluate_all(&collection.listings);

    let exports = if config.evaluation.export_csv && !collection.listings.is_empty() {
        write_exports(&config.evaluation.export_dir, &collection.listings, &recommendations)?
    } else {
        Vec::new()
    };

    Ok(EvaluationReport {
        recommendations,
        pages: collection.pages,
        rows_dropped: collection.rows_dropped,
        end: collection.end,
        exports,
    })
}

/// Write `auction_full_listings.csv` and `auction_recommendations.csv` into `dir`
pub fn write_exports(
    dir: &Path,
    listings: &[CurrentListing],
    recommendations: &[Recommendation],
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create export directory {:?}", dir))?;

    let listings_path = dir.join(sk_ah::FULL_LISTINGS_EXPORT);
    write_csv(&listings_path, listings.iter().map(ListingRow::from))?;
    info!("All auction listings saved to {:?}", listings_path);

    let recommendations_path = dir.join(sk_ah::RECOMMENDATIONS_EXPORT);
    write_csv(&recommendations_path, recommendations.iter().map(RecommendationRow::from))?;
    info!("Recommendations saved to {:?}", recommendations_path);

    Ok(vec![listings_path, recommendations_path])
}

fn write_csv<T: serde::Serialize>(path: &Path, rows: impl Iterator<Item = T>) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write row to {:?}", path))?;
    }
    writer.flush().with_context(|| format!("Failed to flush {:?}", path))?;
    Ok(())
}

/// Console table of listings and verdicts
pub fn render_table(recommendations: &[Recommendation]) -> String {
    RecommendationTable(recommendations).to_string()
}

/// Fixed-width table over a slice of recommendations
pub struct RecommendationTable<'a>(pub &'a [Recommendation]);

impl fmt::Display for RecommendationTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_width = self
            .0
            .iter()
            .map(|r| r.listing.item_name.chars().count())
            .max()
            .unwrap_or(4)
            .clamp(4, 48);

        writeln!(
            f,
            "{:<name_width$}  {:>10}  {:>10}  {:>8}  {:>10}  {:<7} REASON",
            "ITEM", "BID", "BUYOUT", "LEFT", "MEDIAN", "VERDICT"
        )?;

        let price = |p: Option<rust_decimal::Decimal>| p.map_or_else(|| "-".to_string(), |d| d.to_string());
        for rec in self.0 {
            let name: String = rec.listing.item_name.chars().take(name_width).collect();
            writeln!(
                f,
                "{:<name_width$}  {:>10}  {:>10}  {:>8}  {:>10}  {:<7} {}",
                name,
                price(rec.listing.bid_price),
                price(rec.listing.buyout_price),
                format!("{}m", rec.listing.time_left_minutes()),
                price(rec.reference_median),
                rec.verdict.to_string(),
                rec.reason.map(|r| r.code()).unwrap_or_default(),
            )?;
        }
        Ok(())
    }
}
