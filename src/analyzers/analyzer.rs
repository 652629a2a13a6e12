use crate::analyzers::aggregate::{AggregateOptions, aggregate_market};
use crate::analyzers::types::MarketAnalysis;
use crate::charts::render_all;
use crate::listing::{Listing, ScrapedListing};
use crate::report::{SummaryStats, compose_report, write_summary};
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where the report pipeline reads from and writes to.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub charts_dir: PathBuf,
    pub options: AggregateOptions,
}

#[derive(Debug)]
pub struct ReportOutcome {
    pub analysis: MarketAnalysis,
    pub charts_written: usize,
    pub report_path: PathBuf,
    /// `None` when the summary could not be written.
    pub summary_path: Option<PathBuf>,
}

/// Reads every row of a scraped listings CSV.
///
/// # Errors
///
/// A missing file or any row that does not fit the listing columns is fatal.
pub fn load_rows(path: &Path) -> Result<Vec<ScrapedListing>> {
    if !path.exists() {
        bail!("input dataset {} does not exist", path.display());
    }
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        // header is line 1
        let record: ScrapedListing =
            result.with_context(|| format!("malformed row at line {} of {}", i + 2, path.display()))?;
        rows.push(record);
    }

    Ok(rows)
}

pub fn load_listings(path: &Path) -> Result<Vec<Listing>> {
    let rows = load_rows(path)?;
    let listings: Vec<Listing> = rows.iter().map(Listing::from_record).collect();
    info!(
        rows = rows.len(),
        priced = listings.iter().filter(|l| l.price.is_some()).count(),
        "Listings loaded"
    );
    Ok(listings)
}

/// Chart links are written relative to the report's own directory.
fn chart_link_prefix(report: &Path, charts_dir: &Path) -> String {
    let base = report.parent().unwrap_or(Path::new(""));
    let rel = charts_dir.strip_prefix(base).unwrap_or(charts_dir);
    let mut prefix = rel.to_string_lossy().replace('\\', "/");
    if !prefix.is_empty() && !prefix.ends_with('/') {
        prefix.push('/');
    }
    prefix
}

/// Runs the whole offline pipeline: load, aggregate, chart, compose, write.
#[tracing::instrument(skip(config), fields(input = %config.input.display(), output = %config.output.display()))]
pub fn generate_report(config: &ReportConfig) -> Result<ReportOutcome> {
    let listings = load_listings(&config.input)?;
    let analysis = aggregate_market(&listings, &config.options);

    let prefix = chart_link_prefix(&config.output, &config.charts_dir);
    let charts = render_all(&analysis, &config.charts_dir, &prefix);

    let report = compose_report(&analysis, &charts);
    if let Some(dir) = config.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(&config.output, report)
        .with_context(|| format!("writing {}", config.output.display()))?;

    // the summary lives beside the charts and shares their failure mode
    let summary_path = config.charts_dir.join("summary_stats.json");
    let summary_path = match write_summary(&summary_path, &SummaryStats::from_analysis(&analysis)) {
        Ok(()) => Some(summary_path),
        Err(e) => {
            warn!(path = %summary_path.display(), error = %format!("{e:#}"), "Summary not written");
            None
        }
    };

    info!(
        total = analysis.total_listings,
        priced = analysis.priced_listings,
        charts = charts.len(),
        "Report written"
    );

    Ok(ReportOutcome {
        analysis,
        charts_written: charts.len(),
        report_path: config.output.clone(),
        summary_path,
    })
}
