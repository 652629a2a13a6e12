//! Fixed bucket schemes for size, price and engagement segments.
//!
//! Buckets are right-inclusive: a value lands in the first bucket whose
//! upper edge it does not exceed. Values above the last edge are outliers
//! and belong to no bucket.

/// An ordered bucket scheme with one upper edge per label.
#[derive(Debug)]
pub struct Buckets {
    pub labels: &'static [&'static str],
    pub upper_edges: &'static [f64],
}

/// | Area (m²)   | Bucket     |
/// |-------------|------------|
/// | <= 50       | <50m²      |
/// | <= 75       | 50-75m²    |
/// | <= 100      | 75-100m²   |
/// | <= 150      | 100-150m²  |
/// | <= 200      | 150-200m²  |
/// | <= 500      | >200m²     |
pub static SIZE: Buckets = Buckets {
    labels: &["<50m²", "50-75m²", "75-100m²", "100-150m²", "150-200m²", ">200m²"],
    upper_edges: &[50.0, 75.0, 100.0, 150.0, 200.0, 500.0],
};

pub static PRICE: Buckets = Buckets {
    labels: &[
        "<50K", "50-100K", "100-150K", "150-200K", "200-300K", "300-500K", "500K-1M", ">1M",
    ],
    upper_edges: &[
        50_000.0,
        100_000.0,
        150_000.0,
        200_000.0,
        300_000.0,
        500_000.0,
        1_000_000.0,
        5_000_000.0,
    ],
};

/// Engagement is the listing's view counter on the site.
pub static ENGAGEMENT: Buckets = Buckets {
    labels: &[
        "Low (<100)",
        "Medium (100-500)",
        "High (500-1K)",
        "Very High (1K-2K)",
        "Viral (>2K)",
    ],
    upper_edges: &[100.0, 500.0, 1000.0, 2000.0, 10_000.0],
};

impl Buckets {
    /// Index of the bucket holding `value`; `None` for non-positive values
    /// and for values above the last edge.
    pub fn index_of(&self, value: f64) -> Option<usize> {
        if !(value > 0.0) {
            return None;
        }
        self.upper_edges.iter().position(|edge| value <= *edge)
    }

    pub fn label_of(&self, value: f64) -> Option<&'static str> {
        self.index_of(value).map(|i| self.labels[i])
    }
}
