//! Data types produced by the aggregation pipeline.

use chrono::NaiveDate;

/// Central tendency and spread of a set of AZN prices.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSummary {
    pub count: usize,
    pub median: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

impl PriceSummary {
    /// Mean above median: a long tail of expensive listings.
    pub fn is_right_skewed(&self) -> bool {
        self.mean > self.median
    }

    /// Standard deviation relative to the mean; 0.0 for a zero mean.
    pub fn coefficient_of_variation(&self) -> f64 {
        if self.mean == 0.0 {
            0.0
        } else {
            self.stddev / self.mean
        }
    }
}

/// Listings sharing one value of a categorical dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub label: String,
    pub count: usize,
    /// Share of the dimension's eligible listings, 0–100.
    pub share_pct: f64,
    /// `None` when no listing in the segment carries an AZN price.
    pub price: Option<PriceSummary>,
}

impl Segment {
    pub fn median_price(&self) -> Option<f64> {
        self.price.as_ref().map(|p| p.median)
    }
}

/// All segments of one dimension, or an explicit marker that there was not
/// enough data to say anything.
#[derive(Debug, Clone, PartialEq)]
pub enum Breakdown {
    NoData,
    Segments(Vec<Segment>),
}

impl Breakdown {
    pub(crate) fn from_segments(segments: Vec<Segment>) -> Self {
        if segments.is_empty() {
            Breakdown::NoData
        } else {
            Breakdown::Segments(segments)
        }
    }

    pub fn segments(&self) -> &[Segment] {
        match self {
            Breakdown::NoData => &[],
            Breakdown::Segments(s) => s,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, Breakdown::NoData)
    }

    pub fn get(&self, label: &str) -> Option<&Segment> {
        self.segments().iter().find(|s| s.label == label)
    }

    /// The segment with the most listings; first wins on ties.
    pub fn largest(&self) -> Option<&Segment> {
        self.segments()
            .iter()
            .reduce(|best, s| if s.count > best.count { s } else { best })
    }

    pub fn total_count(&self) -> usize {
        self.segments().iter().map(|s| s.count).sum()
    }
}

/// Everything the report and charts need, computed in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketAnalysis {
    pub total_listings: usize,
    pub priced_listings: usize,
    pub overall: Option<PriceSummary>,
    /// Latest posting date among the input listings.
    pub data_through: Option<NaiveDate>,

    pub by_property_type: Breakdown,
    pub by_region: Breakdown,
    pub by_rooms: Breakdown,
    pub by_size: Breakdown,
    pub by_price: Breakdown,
    pub by_engagement: Breakdown,
    pub by_seller: Breakdown,
    pub by_month: Breakdown,

    /// Listing counts per property type over all listings, priced or not.
    pub property_type_counts: Vec<(String, usize)>,
}
