//! CLI entry point for the Baku listings market tool.
//!
//! Provides subcommands for scraping birja-in.az sale listings, retrying
//! URLs that failed in an earlier run, and turning the scraped CSV into a
//! Markdown market report with charts.

use anyhow::Result;
use birja_market::analyzers::aggregate::AggregateOptions;
use birja_market::analyzers::analyzer::{ReportConfig, generate_report};
use birja_market::fetch::{BrowserClient, RetryPolicy};
use birja_market::scrape::{DEFAULT_BASE_URL, ScrapeConfig, ScrapeSummary, Scraper};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "birja_market")]
#[command(about = "Scrape Baku property listings and report on the market", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command that talks to the site.
#[derive(Args)]
struct SiteArgs {
    /// Site root, without a trailing slash
    #[arg(long, env = "BIRJA_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// CSV file scraped listings are appended to
    #[arg(short, long, default_value = "scraped_data.csv")]
    output: PathBuf,

    /// Maximum number of concurrent requests
    #[arg(short, long, default_value_t = 5)]
    concurrency: usize,

    /// Attempts per URL before it is recorded as failed
    #[arg(long, default_value_t = 5)]
    max_retries: u32,

    #[arg(long, default_value = "scraper_progress.json")]
    progress_file: PathBuf,

    #[arg(long, default_value = "failed_urls.json")]
    failed_file: PathBuf,
}

impl SiteArgs {
    fn into_config(self) -> ScrapeConfig {
        ScrapeConfig {
            base_url: self.base_url.trim_end_matches('/').to_string(),
            max_concurrent: self.concurrency,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
            output_file: self.output,
            progress_file: self.progress_file,
            failed_file: self.failed_file,
            ..ScrapeConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a range of listing pages and their detail pages
    Scrape {
        #[arg(long, default_value_t = 1)]
        start_page: u32,

        #[arg(long, default_value_t = 100)]
        end_page: u32,

        /// Seconds to wait between listing pages
        #[arg(long, default_value_t = 2)]
        page_delay: u64,

        #[command(flatten)]
        site: SiteArgs,
    },
    /// Re-fetch URLs recorded as failed by an earlier run
    RetryFailed {
        #[command(flatten)]
        site: SiteArgs,
    },
    /// Build the Markdown market report and charts from a scraped CSV
    Report {
        /// Scraped listings CSV
        #[arg(short, long, default_value = "scraped_data.csv")]
        input: PathBuf,

        /// Markdown report to write
        #[arg(short, long, default_value = "market_report.md")]
        output: PathBuf,

        /// Directory for chart files and summary_stats.json
        #[arg(long, default_value = "charts")]
        charts_dir: PathBuf,

        /// Smallest segment reported in the property-type and room findings
        #[arg(long, default_value_t = 10)]
        min_segment: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/birja_market.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("birja_market.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            start_page,
            end_page,
            page_delay,
            site,
        } => {
            let config = ScrapeConfig {
                start_page,
                end_page,
                page_delay: Duration::from_secs(page_delay),
                ..site.into_config()
            };
            run_scraper(config, false).await?;
        }
        Commands::RetryFailed { site } => {
            run_scraper(site.into_config(), true).await?;
        }
        Commands::Report {
            input,
            output,
            charts_dir,
            min_segment,
        } => {
            let config = ReportConfig {
                input,
                output,
                charts_dir,
                options: AggregateOptions {
                    min_segment,
                    ..AggregateOptions::default()
                },
            };
            let outcome = generate_report(&config)?;
            info!(
                report = %outcome.report_path.display(),
                summary_written = outcome.summary_path.is_some(),
                charts = outcome.charts_written,
                "Report generated"
            );
        }
    }

    Ok(())
}

/// Runs a scrape or a retry pass until it finishes or Ctrl+C arrives. On
/// Ctrl+C the in-flight listing tasks are aborted and no further rows are
/// written before state is saved.
#[tracing::instrument(skip(config), fields(base_url = %config.base_url))]
async fn run_scraper(config: ScrapeConfig, retry: bool) -> Result<()> {
    let client = BrowserClient::new()?;
    let scraper = Arc::new(Scraper::new(client, config)?);

    let work = async {
        if retry {
            scraper.retry_failed().await
        } else {
            scraper.run().await
        }
    };

    let finished = tokio::select! {
        result = work => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match finished {
        Some(result) => {
            let ScrapeSummary { saved, total_scraped, failed } = result?;
            info!(
                saved,
                total_scraped,
                failed,
                output = %scraper.config().output_file.display(),
                "Done"
            );
        }
        None => {
            warn!("Interrupted, saving progress");
            scraper.shutdown()?;
            info!(
                total_scraped = scraper.scraped_count(),
                failed = scraper.failed_urls().len(),
                "Progress saved"
            );
        }
    }

    Ok(())
}
