//! One PNG chart per report finding.
//!
//! Charts are drawn with the plotters bitmap backend. Text needs a TrueType
//! font; the first one found on the system is registered once, and without
//! one the bars are drawn unlabelled.

use anyhow::{Context, Result};
use plotters::prelude::*;
use plotters::style::{FontStyle, register_font};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::analyzers::types::{Breakdown, MarketAnalysis, Segment};

const BLUE: RGBColor = RGBColor(0x2E, 0x86, 0xAB);
const PLUM: RGBColor = RGBColor(0xA2, 0x3B, 0x72);
const GREEN: RGBColor = RGBColor(0x06, 0xA7, 0x7D);
const ORANGE: RGBColor = RGBColor(0xF1, 0x8F, 0x01);
const PURPLE: RGBColor = RGBColor(0x72, 0x09, 0xB7);

const SIZE: (u32, u32) = (1200, 700);
/// Share of a category slot covered by its bars.
const BAR_SPAN: f64 = 0.8;

const FONT_FAMILY: &str = "sans-serif";
const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

static FONT_READY: LazyLock<bool> = LazyLock::new(register_system_font);

fn register_system_font() -> bool {
    let candidates = std::env::var("CHART_FONT")
        .ok()
        .into_iter()
        .chain(FONT_PATHS.iter().map(|p| p.to_string()));

    for path in candidates {
        let Ok(bytes) = fs::read(&path) else { continue };
        // registered fonts live for the whole process
        let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
        if register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok() {
            debug!(font = %path, "Chart font registered");
            return true;
        }
    }
    warn!("No TrueType font found, charts are drawn without labels");
    false
}

/// The findings of the report, in report order. Each owns one chart file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Finding {
    PriceByPropertyType,
    SupplyByRegion,
    PriceByRooms,
    Engagement,
    ListingsOverTime,
    SizeDistribution,
    SellerType,
    PriceRange,
}

impl Finding {
    pub const ALL: [Finding; 8] = [
        Finding::PriceByPropertyType,
        Finding::SupplyByRegion,
        Finding::PriceByRooms,
        Finding::Engagement,
        Finding::ListingsOverTime,
        Finding::SizeDistribution,
        Finding::SellerType,
        Finding::PriceRange,
    ];

    pub fn file_stem(&self) -> &'static str {
        match self {
            Finding::PriceByPropertyType => "01_price_by_property_type",
            Finding::SupplyByRegion => "02_supply_by_region",
            Finding::PriceByRooms => "03_price_by_rooms",
            Finding::Engagement => "04_engagement_analysis",
            Finding::ListingsOverTime => "05_listings_over_time",
            Finding::SizeDistribution => "06_property_size_distribution",
            Finding::SellerType => "07_seller_type_analysis",
            Finding::PriceRange => "08_price_range_distribution",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.png", self.file_stem())
    }

    pub fn breakdown<'a>(&self, analysis: &'a MarketAnalysis) -> &'a Breakdown {
        match self {
            Finding::PriceByPropertyType => &analysis.by_property_type,
            Finding::SupplyByRegion => &analysis.by_region,
            Finding::PriceByRooms => &analysis.by_rooms,
            Finding::Engagement => &analysis.by_engagement,
            Finding::ListingsOverTime => &analysis.by_month,
            Finding::SizeDistribution => &analysis.by_size,
            Finding::SellerType => &analysis.by_seller,
            Finding::PriceRange => &analysis.by_price,
        }
    }
}

/// Chart files that were written, keyed by finding. Paths are relative to
/// the directory the report is written into.
pub type ChartIndex = BTreeMap<Finding, String>;

#[derive(Debug, Clone)]
pub struct Series {
    pub name: &'static str,
    pub values: Vec<f64>,
    pub color: RGBColor,
}

/// A grouped bar chart: one slot per category, one bar per series.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub title: &'static str,
    pub x_desc: &'static str,
    pub y_desc: &'static str,
    pub categories: Vec<String>,
    pub series: Vec<Series>,
}

fn labels(segments: &[Segment]) -> Vec<String> {
    segments.iter().map(|s| s.label.clone()).collect()
}

fn counts(segments: &[Segment]) -> Vec<f64> {
    segments.iter().map(|s| s.count as f64).collect()
}

fn thousands(segments: &[Segment], pick: impl Fn(&Segment) -> Option<f64>) -> Vec<f64> {
    segments
        .iter()
        .map(|s| (pick(s).unwrap_or(0.0) / 1000.0).round())
        .collect()
}

fn medians(segments: &[Segment]) -> Vec<f64> {
    thousands(segments, |s| s.median_price())
}

fn single(
    title: &'static str,
    x_desc: &'static str,
    y_desc: &'static str,
    segments: &[Segment],
    series: Series,
) -> ChartSpec {
    ChartSpec {
        title,
        x_desc,
        y_desc,
        categories: labels(segments),
        series: vec![series],
    }
}

/// Describes the chart for `finding`; `None` when its breakdown has no data.
pub fn build_chart(finding: Finding, analysis: &MarketAnalysis) -> Option<ChartSpec> {
    let segments = finding.breakdown(analysis).segments();
    if segments.is_empty() {
        return None;
    }

    let listings = |color| Series {
        name: "Listings",
        values: counts(segments),
        color,
    };
    let median = |color| Series {
        name: "Median price (thousand AZN)",
        values: medians(segments),
        color,
    };

    let spec = match finding {
        Finding::PriceByPropertyType => ChartSpec {
            title: "Property Prices by Type",
            x_desc: "Property type",
            y_desc: "Price (thousand AZN)",
            categories: labels(segments),
            series: vec![
                Series {
                    name: "Median price",
                    values: medians(segments),
                    color: BLUE,
                },
                Series {
                    name: "Average price",
                    values: thousands(segments, |s| s.price.as_ref().map(|p| p.mean)),
                    color: PLUM,
                },
            ],
        },
        Finding::SupplyByRegion => single(
            "Market Supply by Region",
            "Region",
            "Number of listings",
            segments,
            listings(GREEN),
        ),
        Finding::PriceByRooms => single(
            "Property Prices by Number of Rooms",
            "Number of rooms",
            "Median price (thousand AZN)",
            segments,
            median(BLUE),
        ),
        Finding::Engagement => ChartSpec {
            title: "Listing Engagement: Views vs Price",
            x_desc: "Engagement level",
            y_desc: "Listings / thousand AZN",
            categories: labels(segments),
            series: vec![listings(ORANGE), median(BLUE)],
        },
        Finding::ListingsOverTime => single(
            "New Listings per Month",
            "Month",
            "Number of new listings",
            segments,
            listings(GREEN),
        ),
        Finding::SizeDistribution => single(
            "Property Size Distribution",
            "Property size",
            "Number of properties",
            segments,
            listings(PURPLE),
        ),
        Finding::SellerType => ChartSpec {
            title: "Listings and Median Price by Seller Type",
            x_desc: "Seller type",
            y_desc: "Listings / thousand AZN",
            categories: labels(segments),
            series: vec![listings(BLUE), median(ORANGE)],
        },
        Finding::PriceRange => single(
            "Property Price Range Distribution",
            "Price range (AZN)",
            "Number of properties",
            segments,
            listings(GREEN),
        ),
    };

    Some(spec)
}

/// Category label for an x position; only slot centres are labelled.
fn category_at(categories: &[String], x: f64) -> String {
    let i = x.round();
    if (x - i).abs() > 1e-6 || i < 0.0 {
        return String::new();
    }
    categories.get(i as usize).cloned().unwrap_or_default()
}

fn draw_chart(spec: &ChartSpec, path: &Path, labelled: bool) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let n = spec.categories.len();
    let y_max = spec
        .series
        .iter()
        .flat_map(|s| s.values.iter().copied())
        .fold(0.0, f64::max)
        .max(1.0)
        * 1.15;

    let mut builder = ChartBuilder::on(&root);
    builder.margin(24);
    if labelled {
        builder
            .caption(spec.title, (FONT_FAMILY, 30))
            .x_label_area_size(70)
            .y_label_area_size(90);
    }
    let mut chart = builder.build_cartesian_2d(-0.5f64..(n as f64 - 0.5), 0f64..y_max)?;

    if labelled {
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(n.max(2))
            .x_label_formatter(&|x: &f64| category_at(&spec.categories, *x))
            .x_desc(spec.x_desc)
            .y_desc(spec.y_desc)
            .label_style((FONT_FAMILY, 15))
            .draw()?;
    }

    let grouped = spec.series.len() > 1;
    let width = BAR_SPAN / spec.series.len() as f64;
    for (k, series) in spec.series.iter().enumerate() {
        let color = series.color;
        let drawn = chart.draw_series(series.values.iter().enumerate().map(|(i, v)| {
            let left = i as f64 - BAR_SPAN / 2.0 + k as f64 * width;
            Rectangle::new([(left, 0.0), (left + width, *v)], color.filled())
        }))?;
        if labelled && grouped {
            drawn
                .label(series.name)
                .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 12, y + 6)], color.filled()));
        }
    }

    if labelled && grouped {
        chart
            .configure_series_labels()
            .label_font((FONT_FAMILY, 15))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}

fn write_chart(spec: &ChartSpec, path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    draw_chart(spec, path, *FONT_READY).with_context(|| format!("drawing {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Writes one chart per finding into `charts_dir`.
///
/// A chart that cannot be written is logged and left out of the index so the
/// report falls back to text for that finding.
#[tracing::instrument(skip(analysis, charts_dir), fields(charts_dir = %charts_dir.display()))]
pub fn render_all(analysis: &MarketAnalysis, charts_dir: &Path, link_prefix: &str) -> ChartIndex {
    let mut index = ChartIndex::new();

    for finding in Finding::ALL {
        let Some(spec) = build_chart(finding, analysis) else {
            info!(chart = finding.file_stem(), "Skipping chart, insufficient data");
            continue;
        };
        match write_chart(&spec, &charts_dir.join(finding.file_name())) {
            Ok(path) => {
                info!(chart = %path.display(), "Generated chart");
                index.insert(finding, format!("{link_prefix}{}", finding.file_name()));
            }
            Err(e) => warn!(chart = finding.file_stem(), error = %format!("{e:#}"), "Chart rendering failed"),
        }
    }

    index
}
