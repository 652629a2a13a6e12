//! `summary_stats.json`: the headline numbers behind the report.

use anyhow::{Context, Result};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::path::Path;

use crate::analyzers::types::{MarketAnalysis, Segment};

/// Label → count pairs serialized as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedCounts(pub Vec<(String, usize)>);

impl Serialize for OrderedCounts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, count) in &self.0 {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_listings: usize,
    pub valid_prices: usize,
    pub median_price: Option<u64>,
    pub average_price: Option<u64>,
    pub price_min: Option<u64>,
    pub price_max: Option<u64>,
    pub top_regions: OrderedCounts,
    pub property_types: OrderedCounts,
    pub seller_distribution: OrderedCounts,
}

impl SummaryStats {
    pub fn from_analysis(a: &MarketAnalysis) -> Self {
        let counts = |segments: &[Segment], n: usize| {
            OrderedCounts(
                segments
                    .iter()
                    .take(n)
                    .map(|s| (s.label.clone(), s.count))
                    .collect(),
            )
        };

        // truncation mirrors an integer cast of the mean
        let overall = a.overall.as_ref();
        SummaryStats {
            total_listings: a.total_listings,
            valid_prices: a.priced_listings,
            median_price: overall.map(|p| p.median as u64),
            average_price: overall.map(|p| p.mean as u64),
            price_min: overall.map(|p| p.min as u64),
            price_max: overall.map(|p| p.max as u64),
            top_regions: counts(a.by_region.segments(), 5),
            property_types: OrderedCounts(a.property_type_counts.clone()),
            seller_distribution: counts(a.by_seller.segments(), usize::MAX),
        }
    }
}

/// Writes the summary as pretty JSON, creating parent directories.
pub fn write_summary(path: &Path, summary: &SummaryStats) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
