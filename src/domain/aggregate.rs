//! Per-item aggregates derived from the stored history

use rust_decimal::Decimal;

use super::history::{ItemHistory, PriceEntry};
use super::price::median;

/// Summary statistics for one item. Never stored; always recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAggregate {
    pub item_name: String,
    pub median_price: Decimal,
    pub sample_count: usize,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub mean_price: Decimal,
    /// Most recent sale by timestamp, or the last appended one if none carry a timestamp
    pub last_sold: Option<PriceEntry>,
}

impl ItemAggregate {
    /// Build the aggregate for one item. `None` when there are no samples.
    pub fn from_entries(item_name: &str, entries: &[PriceEntry]) -> Option<Self> {
        let prices: Vec<Decimal> = entries.iter().map(|e| e.price).collect();
        let median_price = median(&prices)?;

        let min_price = prices.iter().min().copied()?;
        let max_price = prices.iter().max().copied()?;
        let sum: Decimal = prices.iter().copied().sum();
        let mean_price = (sum / Decimal::from(prices.len())).round_dp(2);

        let last_sold = entries
            .iter()
            .filter(|e| e.timestamp.is_some())
            .max_by_key(|e| e.timestamp)
            .or_else(|| entries.last())
            .cloned();

        Some(Self {
            item_name: item_name.to_string(),
            median_price,
            sample_count: prices.len(),
            min_price,
            max_price,
            mean_price,
            last_sold,
        })
    }
}

/// Aggregates for every item with at least one sample
pub fn build_aggregates(history: &ItemHistory) -> Vec<ItemAggregate> {
    history
        .iter()
        .filter_map(|(name, entries)| ItemAggregate::from_entries(name, entries))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(price: i64, day: Option<u32>) -> PriceEntry {
        PriceEntry {
            price: Decimal::from(price),
            timestamp: day.map(|d| {
                NaiveDate::from_ymd_opt(2025, 2, d)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap()
            }),
        }
    }

    #[test]
    fn heavy_alchemer_piercer_example() {
        let entries = vec![entry(4000, Some(1)), entry(4500, Some(3)), entry(5000, Some(2))];
        let agg = ItemAggregate::from_entries("Heavy Alchemer Piercer", &entries).unwrap();

        assert_eq!(agg.median_price, Decimal::from(4500));
        assert_eq!(agg.sample_count, 3);
        assert_eq!(agg.min_price, Decimal::from(4000));
        assert_eq!(agg.max_price, Decimal::from(5000));
        assert_eq!(agg.mean_price, Decimal::from(4500));
        assert_eq!(agg.last_sold.unwrap().price, Decimal::from(4500));
    }

    #[test]
    fn empty_history_has_no_aggregate() {
        assert!(ItemAggregate::from_entries("Nothing", &[]).is_none());

        let mut history = ItemHistory::new();
        history.insert("Nothing".into(), vec![]);
        history.insert("Something".into(), vec![entry(10, None)]);
        let aggregates = build_aggregates(&history);
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].item_name, "Something");
        assert_eq!(aggregates[0].last_sold.as_ref().unwrap().price, Decimal::from(10));
    }
}
