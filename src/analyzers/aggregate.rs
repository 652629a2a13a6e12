use crate::analyzers::buckets::{self, Buckets};
use crate::analyzers::types::{Breakdown, MarketAnalysis, PriceSummary, Segment};
use crate::analyzers::utility::{mean, median_sorted, pct, stddev};
use crate::listing::Listing;
use chrono::Datelike;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Thresholds that decide when a segment or a whole breakdown is too thin
/// to report on. Row minimums are exclusive: a breakdown needs *more* than
/// that many eligible listings.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Smallest segment kept in the property-type and room breakdowns.
    pub min_segment: usize,
    pub top_regions: usize,
    pub max_rooms: u32,
    pub min_room_rows: usize,
    pub min_size_rows: usize,
    pub min_engagement_rows: usize,
    pub min_dated_rows: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            min_segment: 10,
            top_regions: 15,
            max_rooms: 6,
            min_room_rows: 50,
            min_size_rows: 100,
            min_engagement_rows: 100,
            min_dated_rows: 50,
        }
    }
}

impl AggregateOptions {
    /// No minimums at all; every non-empty segment is reported.
    pub fn permissive() -> Self {
        Self {
            min_segment: 1,
            min_room_rows: 0,
            min_size_rows: 0,
            min_engagement_rows: 0,
            min_dated_rows: 0,
            ..Self::default()
        }
    }
}

/// Summarises a set of prices; `None` for an empty set.
pub fn summarize_prices(prices: &[f64]) -> Option<PriceSummary> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let avg = mean(&sorted);
    Some(PriceSummary {
        count: sorted.len(),
        median: median_sorted(&sorted),
        mean: avg,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        stddev: stddev(&sorted, avg),
    })
}

/// Groups `rows` by `key`, in key order. Shares are relative to the rows
/// that produced a key.
fn segments_by<K: Ord>(
    rows: &[&Listing],
    key: impl Fn(&Listing) -> Option<K>,
    label: impl Fn(&K) -> String,
) -> Vec<Segment> {
    let mut groups: BTreeMap<K, (usize, Vec<f64>)> = BTreeMap::new();
    let mut total = 0;

    for row in rows {
        let Some(k) = key(row) else { continue };
        total += 1;
        let entry = groups.entry(k).or_default();
        entry.0 += 1;
        if let Some(price) = row.price {
            entry.1.push(price as f64);
        }
    }

    groups
        .into_iter()
        .map(|(k, (count, prices))| Segment {
            label: label(&k),
            count,
            share_pct: pct(count, total),
            price: summarize_prices(&prices),
        })
        .collect()
}

fn by_count_desc(a: &Segment, b: &Segment) -> Ordering {
    b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label))
}

fn by_median_desc(a: &Segment, b: &Segment) -> Ordering {
    let (ma, mb) = (a.median_price().unwrap_or(0.0), b.median_price().unwrap_or(0.0));
    mb.partial_cmp(&ma)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.label.cmp(&b.label))
}

fn bucketed(rows: &[&Listing], scheme: &Buckets, value: impl Fn(&Listing) -> Option<f64>) -> Breakdown {
    let segments = segments_by(
        rows,
        |l| value(l).and_then(|v| scheme.index_of(v)),
        |i| scheme.labels[*i].to_string(),
    );
    Breakdown::from_segments(segments)
}

fn rooms_label(rooms: &u32) -> String {
    if *rooms == 0 {
        "Studio".to_string()
    } else {
        rooms.to_string()
    }
}

/// Computes every breakdown of the market report from cleaned listings.
#[tracing::instrument(skip_all, fields(listings = listings.len()))]
pub fn aggregate_market(listings: &[Listing], opts: &AggregateOptions) -> MarketAnalysis {
    let all: Vec<&Listing> = listings.iter().collect();
    let priced: Vec<&Listing> = listings.iter().filter(|l| l.price.is_some()).collect();

    let prices: Vec<f64> = priced.iter().filter_map(|l| l.price).map(|p| p as f64).collect();

    let mut by_property_type = segments_by(&priced, |l| Some(l.property_type), |t| t.label().to_string());
    by_property_type.retain(|s| s.count >= opts.min_segment);
    by_property_type.sort_by(by_median_desc);

    let mut by_region = segments_by(&all, |l| Some(l.region.clone()), Clone::clone);
    by_region.sort_by(by_count_desc);
    by_region.truncate(opts.top_regions);

    let room_rows: Vec<&Listing> = priced
        .iter()
        .copied()
        .filter(|l| l.rooms.is_some_and(|r| r <= opts.max_rooms))
        .collect();
    let by_rooms = if room_rows.len() > opts.min_room_rows {
        let mut segments = segments_by(&room_rows, |l| l.rooms, rooms_label);
        segments.retain(|s| s.count >= opts.min_segment);
        Breakdown::from_segments(segments)
    } else {
        Breakdown::NoData
    };

    let sized = priced.iter().filter(|l| l.area.is_some()).count();
    let by_size = if sized > opts.min_size_rows {
        bucketed(&priced, &buckets::SIZE, |l| l.area)
    } else {
        Breakdown::NoData
    };

    let by_price = bucketed(&priced, &buckets::PRICE, |l| l.price.map(|p| p as f64));

    let viewed = priced.iter().filter(|l| l.views.is_some()).count();
    let by_engagement = if viewed > opts.min_engagement_rows {
        bucketed(&priced, &buckets::ENGAGEMENT, |l| l.views.map(|v| v as f64))
    } else {
        Breakdown::NoData
    };

    let mut by_seller = segments_by(&all, |l| Some(l.seller), |s| s.label().to_string());
    by_seller.sort_by(by_count_desc);

    let dated = listings.iter().filter(|l| l.posted.is_some()).count();
    let by_month = if dated > opts.min_dated_rows {
        Breakdown::from_segments(segments_by(
            &all,
            |l| l.posted.map(|d| (d.year(), d.month())),
            |(y, m)| format!("{y:04}-{m:02}"),
        ))
    } else {
        Breakdown::NoData
    };

    let mut type_counts = segments_by(&all, |l| Some(l.property_type), |t| t.label().to_string());
    type_counts.sort_by(by_count_desc);

    MarketAnalysis {
        total_listings: listings.len(),
        priced_listings: priced.len(),
        overall: summarize_prices(&prices),
        data_through: listings.iter().filter_map(|l| l.posted).max(),
        by_property_type: Breakdown::from_segments(by_property_type),
        by_region: Breakdown::from_segments(by_region),
        by_rooms,
        by_size,
        by_price,
        by_engagement,
        by_seller: Breakdown::from_segments(by_seller),
        by_month,
        property_type_counts: type_counts.into_iter().map(|s| (s.label, s.count)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{PropertyType, SellerType};
    use chrono::NaiveDate;

    fn listing(id: usize, price: Option<u64>) -> Listing {
        Listing {
            id: id.to_string(),
            price,
            area: Some(60.0 + (id % 5) as f64 * 20.0),
            region: if id % 3 == 0 { "Yasamal r." } else { "Nəsimi r." }.to_string(),
            rooms: Some((id % 4) as u32),
            seller: if id % 2 == 0 { SellerType::Owner } else { SellerType::Agent },
            views: Some(50 + id as u64 * 40),
            posted: NaiveDate::from_ymd_opt(2024, 1 + (id % 3) as u32, 10),
            property_type: if id % 2 == 0 { PropertyType::NewBuilding } else { PropertyType::Apartment },
        }
    }

    fn market(n: usize) -> Vec<Listing> {
        (0..n).map(|i| listing(i, Some(60_000 + (i as u64 * 7_919) % 400_000))).collect()
    }

    #[test]
    fn test_empty_input_is_no_data() {
        let a = aggregate_market(&[], &AggregateOptions::default());
        assert_eq!(a.total_listings, 0);
        assert!(a.overall.is_none());
        for b in [
            &a.by_property_type,
            &a.by_region,
            &a.by_rooms,
            &a.by_size,
            &a.by_price,
            &a.by_engagement,
            &a.by_seller,
            &a.by_month,
        ] {
            assert!(b.is_no_data());
        }
    }

    #[test]
    fn test_summarize_prices() {
        let s = summarize_prices(&[300.0, 100.0, 200.0, 1000.0]).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.median, 250.0);
        assert_eq!(s.mean, 400.0);
        assert_eq!(s.min, 100.0);
        assert_eq!(s.max, 1000.0);
        assert!(s.is_right_skewed());
        assert!(summarize_prices(&[]).is_none());
    }

    #[test]
    fn test_full_partition_shares_sum_to_100() {
        let a = aggregate_market(&market(240), &AggregateOptions::default());
        for b in [&a.by_size, &a.by_price, &a.by_engagement, &a.by_seller, &a.by_month] {
            let total: f64 = b.segments().iter().map(|s| s.share_pct).sum();
            assert!((total - 100.0).abs() < 1e-6, "shares summed to {total}");
        }
    }

    #[test]
    fn test_property_types_sorted_by_median_and_filtered() {
        let mut listings = market(40);
        // a lone commercial listing is below the minimum segment size
        let mut odd = listing(999, Some(5_000_000));
        odd.property_type = PropertyType::Commercial;
        listings.push(odd);

        let a = aggregate_market(&listings, &AggregateOptions::default());
        let segs = a.by_property_type.segments();
        assert!(segs.iter().all(|s| s.label != "Commercial"));
        assert!(segs.windows(2).all(|w| w[0].median_price() >= w[1].median_price()));
    }

    #[test]
    fn test_outliers_drop_out_of_bucketed_distributions() {
        let mut listings = market(20);
        let mut mansion = listing(500, Some(6_000_000));
        mansion.area = Some(700.0);
        listings.push(mansion);

        let a = aggregate_market(&listings, &AggregateOptions::permissive());
        let sized: usize = a.by_size.segments().iter().map(|s| s.count).sum();
        let bucketed: usize = a.by_price.segments().iter().map(|s| s.count).sum();

        assert_eq!(a.priced_listings, 21);
        assert_eq!(sized, 20);
        assert_eq!(bucketed, 20);
    }

    #[test]
    fn test_thin_breakdowns_report_no_data() {
        let a = aggregate_market(&market(20), &AggregateOptions::default());
        assert!(a.by_rooms.is_no_data());
        assert!(a.by_size.is_no_data());
        assert!(a.by_engagement.is_no_data());
        assert!(a.by_month.is_no_data());
        assert!(!a.by_price.is_no_data());
    }

    #[test]
    fn test_unpriced_listings_count_for_supply_not_prices() {
        let mut listings = market(10);
        listings.push(listing(100, None));
        let a = aggregate_market(&listings, &AggregateOptions::permissive());
        assert_eq!(a.total_listings, 11);
        assert_eq!(a.priced_listings, 10);
        assert_eq!(a.by_region.total_count(), 11);
        assert_eq!(a.by_price.total_count(), 10);
    }

    #[test]
    fn test_regions_ranked_by_count() {
        let a = aggregate_market(&market(30), &AggregateOptions::permissive());
        let regions = a.by_region.segments();
        assert_eq!(regions[0].label, "Nəsimi r.");
        assert_eq!(regions[0].count, 20);
        assert_eq!(regions[1].count, 10);
    }

    #[test]
    fn test_rooms_labelled_and_capped() {
        let mut listings = market(12);
        let mut mansion = listing(50, Some(900_000));
        mansion.rooms = Some(9);
        listings.push(mansion);

        let a = aggregate_market(&listings, &AggregateOptions::permissive());
        let labels: Vec<_> = a.by_rooms.segments().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Studio", "1", "2", "3"]);
    }

    #[test]
    fn test_months_in_order() {
        let a = aggregate_market(&market(9), &AggregateOptions::permissive());
        let labels: Vec<_> = a.by_month.segments().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03"]);
        assert_eq!(a.data_through, NaiveDate::from_ymd_opt(2024, 3, 10));
    }
}
