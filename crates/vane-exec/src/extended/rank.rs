use std::cmp::Ordering;

use crate::extended::{RankedSector, SectorDay};

/// Sectors with at least one limit-up, best limit-up ratio first.
///
/// Stocks inside a sector are ordered by their trailing limit-up count.
/// Ties keep the input order.
pub fn rank_sectors(days: Vec<SectorDay>) -> Vec<RankedSector> {
    let mut ranked: Vec<RankedSector> = days
        .into_iter()
        .filter(|day| day.total_stocks > 0 && !day.limit_ups.is_empty())
        .map(|day| {
            let count = day.limit_ups.len();
            let mut stocks = day.limit_ups;
            stocks.sort_by(|a, b| b.limit_up_count.cmp(&a.limit_up_count));

            RankedSector {
                sector_code: day.sector_code,
                sector_name: day.sector_name,
                total_stocks: day.total_stocks,
                limit_up_count_today: count,
                limit_up_ratio: round2(count as f64 / day.total_stocks as f64 * 100.0),
                stocks,
                summary: None,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.limit_up_ratio
            .partial_cmp(&a.limit_up_ratio)
            .unwrap_or(Ordering::Equal)
    });
    ranked
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
