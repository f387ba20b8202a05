//! Evaluation against stored history, from a single listing up to the full use case

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

use sk_market_scout::application::{Evaluator, run_auction_evaluation};
use sk_market_scout::crawling::ListingEnd;
use sk_market_scout::domain::{
    CurrentListing, EvaluationStrictness, HistoryRecord, ItemHistory, SkipReason, Verdict,
};
use sk_market_scout::infrastructure::config::{AppConfig, sk_ah};
use sk_market_scout::infrastructure::history_store::HistoryStore;
use sk_market_scout::infrastructure::page_source::ReplayPageSource;
use sk_market_scout::infrastructure::page_source::replay_source::ReplayPages;
use sk_market_scout::infrastructure::parsing::{
    ContextualParser, HistoryExtractor, ListingExtractor, PageNavigator, ParseContext,
};

fn sale(name: &str, price: i64, day: u32) -> HistoryRecord {
    let ts = NaiveDate::from_ymd_opt(2025, 3, day)
        .unwrap()
        .and_hms_opt(17, 0, 0)
        .unwrap();
    HistoryRecord::new(name, Decimal::from(price), ts)
}

fn piercer_history() -> ItemHistory {
    let mut history = ItemHistory::new();
    sk_market_scout::domain::merge_records(
        &mut history,
        &[
            sale("Heavy Alchemer Piercer", 4000, 1),
            sale("Heavy Alchemer Piercer", 4500, 2),
            sale("Heavy Alchemer Piercer", 5000, 3),
        ],
    );
    history
}

fn listing(name: &str, bid: Option<i64>, buyout: Option<i64>) -> CurrentListing {
    CurrentListing {
        item_name: name.to_string(),
        bid_price: bid.map(Decimal::from),
        buyout_price: buyout.map(Decimal::from),
        time_left: Duration::from_secs(90 * 60),
        raw_time_left: "1h30m".to_string(),
    }
}

#[test]
fn buyout_below_median_is_recommended() {
    let evaluator = Evaluator::from_history(&piercer_history(), EvaluationStrictness::Strict);
    assert_eq!(
        evaluator.aggregate_for("Heavy Alchemer Piercer").unwrap().median_price,
        Decimal::from(4500)
    );

    let rec = evaluator.evaluate(&listing("Heavy Alchemer Piercer", Some(4800), Some(4200)));
    assert_eq!(rec.verdict, Verdict::Buyout);
    assert_eq!(rec.reason, None);
}

#[test]
fn price_equal_to_median_depends_on_strictness() {
    let at_median = listing("Heavy Alchemer Piercer", None, Some(4500));

    let strict = Evaluator::from_history(&piercer_history(), EvaluationStrictness::Strict);
    let rec = strict.evaluate(&at_median);
    assert_eq!(rec.verdict, Verdict::Skip);
    assert_eq!(rec.reason, Some(SkipReason::NotBelowMedian));
    assert_eq!(rec.reference_median, Some(Decimal::from(4500)));

    let inclusive = Evaluator::from_history(&piercer_history(), EvaluationStrictness::Inclusive);
    assert_eq!(inclusive.evaluate(&at_median).verdict, Verdict::Buyout);
}

#[test]
fn unknown_item_is_skipped_without_median() {
    let evaluator = Evaluator::from_history(&piercer_history(), EvaluationStrictness::Strict);
    let rec = evaluator.evaluate(&listing("Sun Shards", Some(1), Some(2)));

    assert_eq!(rec.verdict, Verdict::Skip);
    assert_eq!(rec.reason, Some(SkipReason::NoHistory));
    assert_eq!(rec.reason.unwrap().to_string(), "no history");
    assert!(rec.reference_median.is_none());
}

#[test]
fn listing_without_prices_is_skipped() {
    let evaluator = Evaluator::from_history(&piercer_history(), EvaluationStrictness::Inclusive);
    let rec = evaluator.evaluate(&listing("Heavy Alchemer Piercer", None, None));
    assert_eq!(rec.verdict, Verdict::Skip);
    assert_eq!(rec.reason, Some(SkipReason::NotBelowMedian));
}

#[test]
fn quality_variant_listing_matches_its_history() {
    let name_cell = "<td><span>Heavy Alchemer Piercer <small><span>UV</span></small></span></td>";
    let history_html = format!(
        "<html><body><main><div>Sales</div><div><table><tbody>{}</tbody></table></div></main></body></html>",
        ["4000", "4500", "5000"]
            .iter()
            .enumerate()
            .map(|(i, price)| {
                format!(
                    r#"<tr>{name_cell}<td><div class="flex justify-end">{price}</div></td>
                       <td><div class="flex justify-end">03/0{}/2025</div><small>5:00:00 PM</small></td></tr>"#,
                    i + 1
                )
            })
            .collect::<String>()
    );
    let listings_html = format!(
        "<html><body><main><div></div><div><table><tbody>\
           <tr>{name_cell}<td>-</td><td>4,100</td><td>1h</td></tr>\
         </tbody></table></div></main></body></html>"
    );

    let sales = HistoryExtractor::new()
        .unwrap()
        .parse_str(&history_html, &ParseContext::new(1, "replay://history/1"));
    assert_eq!(sales.records.len(), 3);
    let listings = ListingExtractor::new()
        .unwrap()
        .parse_str(&listings_html, &ParseContext::new(1, "replay://listings/1"));
    assert_eq!(listings.records.len(), 1);

    let mut history = ItemHistory::new();
    sk_market_scout::domain::merge_records(&mut history, &sales.records);
    let evaluator = Evaluator::from_history(&history, EvaluationStrictness::Strict);

    let rec = evaluator.evaluate(&listings.records[0]);
    assert_eq!(rec.verdict, Verdict::Buyout);
    assert_eq!(rec.reference_median, Some(Decimal::from(4500)));
}

const NEXT_ENABLED: &str = r#"<button aria-label="Next page">Next</button>"#;
const NEXT_DISABLED: &str = r#"<button aria-label="Next page" disabled>Next</button>"#;

fn listings_page(current: u32, total: u32, next: &str, rows: &str) -> String {
    format!(
        "<html><body><main>\
           <div><p>Page {current} of {total}</p>{next}</div>\
           <div><table><tbody>{rows}</tbody></table></div>\
         </main></body></html>"
    )
}

#[tokio::test]
async fn evaluation_walks_listings_and_exports_csv() {
    let data_dir = tempfile::tempdir().unwrap();
    let export_dir = tempfile::tempdir().unwrap();

    let store = HistoryStore::new(data_dir.path());
    assert_ok!(
        store
            .merge_and_save(
                &[
                    sale("Heavy Alchemer Piercer", 4000, 1),
                    sale("Heavy Alchemer Piercer", 4500, 2),
                    sale("Heavy Alchemer Piercer", 5000, 3),
                    sale("Sun Shards", 10, 1),
                ],
                "seed",
            )
            .await
    );

    let replay = ReplayPages::new()
        .with_listings_page(
            1,
            listings_page(
                1,
                2,
                NEXT_ENABLED,
                "<tr><td><span>Heavy Alchemer Piercer</span></td><td>4,800</td><td>4,200</td><td>1h30m</td></tr>\
                 <tr><td><span>Sun Shards</span></td><td>12</td><td>-</td><td>5m</td></tr>",
            ),
        )
        .with_listings_page(
            2,
            listings_page(
                2,
                2,
                NEXT_DISABLED,
                "<tr><td><span>Gremlin Hat</span></td><td>100</td><td>200</td><td>Very Short</td></tr>\
                 <tr><td><span>Broken</span></td><td>lots</td><td>-</td><td>5m</td></tr>",
            ),
        );
    let mut source = ReplayPageSource::new(Arc::new(replay), Arc::new(PageNavigator::new().unwrap()));

    let mut config = AppConfig::default();
    config.storage.data_dir = data_dir.path().to_path_buf();
    config.evaluation.export_dir = export_dir.path().to_path_buf();
    config.crawl.retry_base_delay_ms = 0;

    let report = run_auction_evaluation(&config, &mut source, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.end, ListingEnd::Exhausted);
    assert_eq!(report.rows_dropped, 1);
    assert_eq!(report.recommendations.len(), 3);
    assert_eq!(report.count(Verdict::Buyout), 1);
    assert_eq!(report.count(Verdict::Skip), 2);

    let gremlin = &report.recommendations[2];
    assert_eq!(gremlin.listing.item_name, "Gremlin Hat");
    assert_eq!(gremlin.reason, Some(SkipReason::NoHistory));

    assert_eq!(report.exports.len(), 2);
    let recommendations =
        std::fs::read_to_string(export_dir.path().join(sk_ah::RECOMMENDATIONS_EXPORT)).unwrap();
    let mut lines = recommendations.lines();
    assert_eq!(
        lines.next(),
        Some("item_name,bid_price,buyout_price,time_left_minutes,raw_time_left,historical_median,verdict,reason")
    );
    assert_eq!(
        lines.next(),
        Some("Heavy Alchemer Piercer,4800,4200,90,1h30m,4500,BUYOUT,")
    );

    let full = std::fs::read_to_string(export_dir.path().join(sk_ah::FULL_LISTINGS_EXPORT)).unwrap();
    assert_eq!(full.lines().count(), 4);
}

#[tokio::test]
async fn empty_listings_yield_an_empty_report() {
    let data_dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.storage.data_dir = data_dir.path().to_path_buf();
    config.evaluation.export_csv = false;

    let mut source = ReplayPageSource::new(
        Arc::new(ReplayPages::new()),
        Arc::new(PageNavigator::new().unwrap()),
    );
    let report = run_auction_evaluation(&config, &mut source, CancellationToken::new())
        .await
        .unwrap();

    // An empty listings table is not a navigation failure
    assert_eq!(report.pages, 0);
    assert!(report.recommendations.is_empty());
    assert!(report.exports.is_empty());
}
