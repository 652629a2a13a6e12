use anyhow::Result;
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, warn};

use super::parser::{ListingParser, page_number, page_url};
use super::progress::{FailedUrl, load_failed, load_progress, save_failed, save_progress};
use crate::fetch::{FetchOutcome, HttpClient, RetryPolicy, fetch_with_retry};
use crate::listing::ScrapedListing;
use crate::output::save_record;

pub const DEFAULT_BASE_URL: &str = "https://birja-in.az";

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub base_url: String,
    pub start_page: u32,
    pub end_page: u32,
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
    /// Pause between two listing pages.
    pub page_delay: Duration,
    pub output_file: PathBuf,
    pub progress_file: PathBuf,
    pub failed_file: PathBuf,
    /// Progress is flushed every time this many new ids have been saved.
    pub progress_every: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            start_page: 1,
            end_page: 100,
            max_concurrent: 5,
            retry: RetryPolicy::default(),
            page_delay: Duration::from_secs(2),
            output_file: PathBuf::from("scraped_data.csv"),
            progress_file: PathBuf::from("scraper_progress.json"),
            failed_file: PathBuf::from("failed_urls.json"),
            progress_every: 10,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub saved: usize,
    pub total_scraped: usize,
    pub failed: usize,
}

/// Scrapes listing pages and their detail pages into the output CSV.
///
/// Shared behind an [`Arc`] so that detail pages of one listing page can be
/// fetched from spawned tasks.
pub struct Scraper<C> {
    client: C,
    config: ScrapeConfig,
    parser: ListingParser,
    semaphore: Semaphore,
    scraped_ids: Mutex<HashSet<String>>,
    failed: Mutex<Vec<FailedUrl>>,
    csv_lock: Mutex<()>,
    /// Set by [`Scraper::shutdown`]; no row is written once it is set.
    stopped: AtomicBool,
}

impl<C: HttpClient + 'static> Scraper<C> {
    pub fn new(client: C, config: ScrapeConfig) -> Result<Self> {
        let parser = ListingParser::new(&config.base_url)?;
        let scraped_ids = load_progress(&config.progress_file);
        Ok(Self {
            client,
            semaphore: Semaphore::new(config.max_concurrent.max(1)),
            parser,
            scraped_ids: Mutex::new(scraped_ids),
            failed: Mutex::new(Vec::new()),
            csv_lock: Mutex::new(()),
            stopped: AtomicBool::new(false),
            config,
        })
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    pub fn scraped_count(&self) -> usize {
        self.scraped_ids.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn failed_urls(&self) -> Vec<FailedUrl> {
        self.failed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn is_scraped(&self, id: &str) -> bool {
        self.scraped_ids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    /// Writes the progress and failed-URL files.
    pub fn save_state(&self) -> Result<()> {
        let ids = self.scraped_ids.lock().unwrap_or_else(PoisonError::into_inner).clone();
        save_progress(&self.config.progress_file, &ids)?;
        save_failed(&self.config.failed_file, &self.failed_urls())?;
        debug!(scraped = ids.len(), "State saved");
        Ok(())
    }

    /// Stops any further row from being written, then saves state. Every
    /// row already in the CSV has its id in the saved progress file.
    pub fn shutdown(&self) -> Result<()> {
        let _guard = self.csv_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.stopped.store(true, Ordering::SeqCst);
        self.save_state()
    }

    /// Fetches a page under the concurrency limit. Only exhausted retries
    /// are recorded as failures; a 404 is not.
    async fn fetch(&self, url: &str) -> Option<String> {
        match fetch_with_retry(&self.client, url, &self.config.retry, &self.semaphore).await {
            FetchOutcome::Body(body) => Some(body),
            FetchOutcome::NotFound => None,
            FetchOutcome::Failed(e) => {
                error!(url, error = %e, "Giving up on URL");
                self.failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(FailedUrl {
                        url: url.to_string(),
                        time: Utc::now(),
                    });
                None
            }
        }
    }

    /// Appends the row and records its id. Returns `false` without writing
    /// once the scraper has been shut down.
    fn persist(&self, listing: &ScrapedListing) -> Result<bool> {
        // row, id and periodic flush all happen under the CSV lock so that
        // shutdown never saves progress missing a written row
        let _guard = self.csv_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(false);
        }
        save_record(&self.config.output_file, listing)?;

        let snapshot = {
            let mut ids = self.scraped_ids.lock().unwrap_or_else(PoisonError::into_inner);
            ids.insert(listing.elan_id.clone());
            let every = self.config.progress_every.max(1);
            (ids.len() % every == 0).then(|| ids.clone())
        };
        if let Some(ids) = snapshot {
            save_progress(&self.config.progress_file, &ids)?;
        }
        Ok(true)
    }

    /// Fetches the detail page for a card and saves the completed row.
    /// Returns whether a row was saved.
    async fn scrape_listing(self: Arc<Self>, card: ScrapedListing) -> Result<bool> {
        let Some(url) = card.url.clone() else {
            return Ok(false);
        };
        let Some(html) = self.fetch(&url).await else {
            warn!("Detail page unavailable");
            return Ok(false);
        };

        let listing = self
            .parser
            .parse_detail(&html, card, &Utc::now().to_rfc3339());
        if !self.persist(&listing)? {
            return Ok(false);
        }
        info!(title = listing.title.as_deref().unwrap_or(""), "Listing saved");
        Ok(true)
    }

    /// Scrapes one listing page, fetching the detail pages of unseen cards
    /// concurrently. Returns the number of rows saved.
    #[tracing::instrument(skip(self))]
    pub async fn scrape_page(self: &Arc<Self>, page: u32) -> Result<usize> {
        let url = page_url(&self.config.base_url, page);
        let Some(html) = self.fetch(&url).await else {
            warn!(url = %url, "Listing page unavailable");
            return Ok(0);
        };

        let cards = self.parser.parse_cards(&html);
        let found = cards.len();
        let fresh: Vec<ScrapedListing> = cards
            .into_iter()
            .filter(|c| c.url.is_some() && !self.is_scraped(&c.elan_id))
            .collect();
        info!(found, fresh = fresh.len(), "Listing page parsed");

        // dropping the set aborts listing tasks still in flight
        let mut tasks = JoinSet::new();
        for card in fresh {
            let span = tracing::info_span!("scrape_listing", elan_id = %card.elan_id);
            tasks.spawn(Arc::clone(self).scrape_listing(card).instrument(span));
        }

        let mut saved = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(true)) => saved += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => error!(error = %e, "Failed to save listing"),
                Err(e) => error!(error = %e, "Listing task panicked"),
            }
        }

        info!(saved, "Page done");
        Ok(saved)
    }

    /// Scrapes the configured page range in order, then saves state.
    pub async fn run(self: &Arc<Self>) -> Result<ScrapeSummary> {
        let (start, end) = (self.config.start_page, self.config.end_page);
        info!(start, end, max_concurrent = self.config.max_concurrent, "Starting scrape");

        let mut saved = 0;
        for page in start..=end {
            match self.scrape_page(page).await {
                Ok(n) => saved += n,
                Err(e) => error!(page, error = %e, "Page failed"),
            }
            if page < end && !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }
        }

        self.save_state()?;
        let summary = ScrapeSummary {
            saved,
            total_scraped: self.scraped_count(),
            failed: self.failed_urls().len(),
        };
        info!(
            saved = summary.saved,
            total_scraped = summary.total_scraped,
            failed = summary.failed,
            "Scraping completed"
        );
        Ok(summary)
    }

    async fn retry_detail(self: &Arc<Self>, url: &str) -> Result<bool> {
        let Some(html) = self.fetch(url).await else {
            return Ok(false);
        };
        let Some(elan_id) = self.parser.find_elan_id(&html) else {
            warn!(url, "No elan id on detail page");
            return Ok(false);
        };
        if self.is_scraped(&elan_id) {
            debug!(elan_id = %elan_id, "Already scraped");
            return Ok(false);
        }

        let card = ScrapedListing {
            elan_id,
            url: Some(url.to_string()),
            ..Default::default()
        };
        let listing = self.parser.parse_detail(&html, card, &Utc::now().to_rfc3339());
        self.persist(&listing)
    }

    /// Re-fetches every URL in the failed-URL file. Listing pages are
    /// scraped as pages, everything else as a detail page. URLs that fail
    /// again are written back to the file. An entry stays pending until its
    /// own retry has finished, so an interrupted pass loses nothing.
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed(self: &Arc<Self>) -> Result<ScrapeSummary> {
        let pending = load_failed(&self.config.failed_file)?;
        if pending.is_empty() {
            info!("No failed URLs to retry");
            return Ok(ScrapeSummary {
                total_scraped: self.scraped_count(),
                ..Default::default()
            });
        }
        info!(count = pending.len(), "Retrying failed URLs");
        *self.failed.lock().unwrap_or_else(PoisonError::into_inner) = pending.clone();

        let mut saved = 0;
        for entry in pending {
            let result = match page_number(&entry.url) {
                Some(page) => self.scrape_page(page).await,
                None => self.retry_detail(&entry.url).await.map(usize::from),
            };
            // a repeat failure was recorded afresh by the fetch
            self.failed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|f| *f != entry);
            match result {
                Ok(n) => saved += n,
                Err(e) => error!(url = %entry.url, error = %e, "Retry failed"),
            }
        }

        self.save_state()?;
        let summary = ScrapeSummary {
            saved,
            total_scraped: self.scraped_count(),
            failed: self.failed_urls().len(),
        };
        info!(saved = summary.saved, still_failing = summary.failed, "Retry completed");
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedClient;

    const BASE: &str = "https://birja-in.az";

    fn card(id: &str) -> String {
        format!(
            r#"<div class="block_one_synopsis_advert">
                 <h2><a href="/elan/{id}.html"><span itemprop="name">Mənzil {id}</span></a></h2>
                 <span class="value_cost_adv">100 000</span><span class="value_currency">azn</span>
                 <span>Elan № {id}</span>
               </div>"#
        )
    }

    fn listing_page(ids: &[&str]) -> String {
        let cards: String = ids.iter().map(|id| card(id)).collect();
        format!("<html><body>{cards}</body></html>")
    }

    fn detail_page(id: &str) -> String {
        format!(
            r#"<html><body><table>
                 <tr><td>Otaq sayı</td><td>2</td></tr>
                 <tr><td class="history">Baxış sayı: 10</td></tr>
               </table><span>Elan № {id}</span></body></html>"#
        )
    }

    fn config(dir: &std::path::Path) -> ScrapeConfig {
        ScrapeConfig {
            base_url: BASE.to_string(),
            start_page: 1,
            end_page: 1,
            max_concurrent: 2,
            retry: RetryPolicy::immediate(2),
            page_delay: Duration::ZERO,
            output_file: dir.join("scraped_data.csv"),
            progress_file: dir.join("scraper_progress.json"),
            failed_file: dir.join("failed_urls.json"),
            progress_every: 10,
        }
    }

    fn csv_ids(path: &std::path::Path) -> Vec<String> {
        let mut rdr = csv::Reader::from_path(path).unwrap();
        let mut ids: Vec<String> = rdr
            .deserialize::<ScrapedListing>()
            .map(|r| r.unwrap().elan_id)
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_scrapes_page_and_details() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new()
            .route(&page_url(BASE, 1), 200, &listing_page(&["1", "2"]))
            .route(&format!("{BASE}/elan/1.html"), 200, &detail_page("1"))
            .route(&format!("{BASE}/elan/2.html"), 200, &detail_page("2"));

        let scraper = Arc::new(Scraper::new(client, config(dir.path())).unwrap());
        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.saved, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(csv_ids(&dir.path().join("scraped_data.csv")), vec!["1", "2"]);

        let mut rdr = csv::Reader::from_path(dir.path().join("scraped_data.csv")).unwrap();
        let row: ScrapedListing = rdr.deserialize().next().unwrap().unwrap();
        assert_eq!(row.room_count.as_deref(), Some("2"));
        assert_eq!(row.view_count.as_deref(), Some("10"));
        assert!(dir.path().join("scraper_progress.json").exists());
    }

    #[tokio::test]
    async fn test_rerun_skips_known_ids() {
        let dir = tempfile::tempdir().unwrap();
        let routes = || {
            ScriptedClient::new()
                .route(&page_url(BASE, 1), 200, &listing_page(&["1", "2"]))
                .route(&format!("{BASE}/elan/1.html"), 200, &detail_page("1"))
                .route(&format!("{BASE}/elan/2.html"), 200, &detail_page("2"))
        };

        let first = Arc::new(Scraper::new(routes(), config(dir.path())).unwrap());
        first.run().await.unwrap();

        let second = Arc::new(Scraper::new(routes(), config(dir.path())).unwrap());
        let summary = second.run().await.unwrap();

        assert_eq!(summary.saved, 0);
        assert_eq!(summary.total_scraped, 2);
        assert_eq!(csv_ids(&dir.path().join("scraped_data.csv")).len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_recorded_but_404_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new()
            .route(&page_url(BASE, 1), 200, &listing_page(&["1", "2"]))
            .route(&format!("{BASE}/elan/1.html"), 503, "")
            .route(&format!("{BASE}/elan/2.html"), 404, "");

        let scraper = Arc::new(Scraper::new(client, config(dir.path())).unwrap());
        let summary = scraper.run().await.unwrap();

        assert_eq!(summary.saved, 0);
        let failed = load_failed(&dir.path().join("failed_urls.json")).unwrap();
        let urls: Vec<_> = failed.iter().map(|f| f.url.as_str()).collect();
        assert_eq!(urls, vec!["https://birja-in.az/elan/1.html"]);
    }

    #[tokio::test]
    async fn test_retry_failed_handles_pages_and_details() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        save_failed(
            &cfg.failed_file,
            &[
                FailedUrl {
                    url: page_url(BASE, 4),
                    time: Utc::now(),
                },
                FailedUrl {
                    url: format!("{BASE}/elan/9.html"),
                    time: Utc::now(),
                },
                FailedUrl {
                    url: format!("{BASE}/elan/10.html"),
                    time: Utc::now(),
                },
            ],
        )
        .unwrap();

        let client = ScriptedClient::new()
            .route(&page_url(BASE, 4), 200, &listing_page(&["5"]))
            .route(&format!("{BASE}/elan/5.html"), 200, &detail_page("5"))
            .route(&format!("{BASE}/elan/9.html"), 200, &detail_page("9"))
            .route(&format!("{BASE}/elan/10.html"), 500, "");

        let scraper = Arc::new(Scraper::new(client, cfg).unwrap());
        let summary = scraper.retry_failed().await.unwrap();

        assert_eq!(summary.saved, 2);
        assert_eq!(csv_ids(&dir.path().join("scraped_data.csv")), vec!["5", "9"]);
        let still: Vec<_> = load_failed(&dir.path().join("failed_urls.json"))
            .unwrap()
            .into_iter()
            .map(|f| f.url)
            .collect();
        assert_eq!(still, vec!["https://birja-in.az/elan/10.html"]);
    }

    #[tokio::test]
    async fn test_progress_flushed_every_n_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.progress_every = 2;
        let client = ScriptedClient::new()
            .route(&page_url(BASE, 1), 200, &listing_page(&["1", "2"]))
            .route(&format!("{BASE}/elan/1.html"), 200, &detail_page("1"))
            .route(&format!("{BASE}/elan/2.html"), 200, &detail_page("2"));

        let scraper = Arc::new(Scraper::new(client, cfg).unwrap());
        scraper.scrape_page(1).await.unwrap();

        // no save_state yet, the periodic flush wrote the file
        let saved = load_progress(&dir.path().join("scraper_progress.json"));
        assert_eq!(saved.len(), 2);
    }

    fn sorted_urls(failed: Vec<FailedUrl>) -> Vec<String> {
        let mut urls: Vec<String> = failed.into_iter().map(|f| f.url).collect();
        urls.sort();
        urls
    }

    #[tokio::test]
    async fn test_interrupted_retry_keeps_pending_urls() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let urls: Vec<String> = ["1", "2", "3"]
            .iter()
            .map(|id| format!("{BASE}/elan/{id}.html"))
            .collect();
        let entries: Vec<FailedUrl> = urls
            .iter()
            .map(|url| FailedUrl {
                url: url.clone(),
                time: Utc::now(),
            })
            .collect();
        save_failed(&cfg.failed_file, &entries).unwrap();

        // 1 fails again, 2 never answers, 3 is never reached
        let client = ScriptedClient::new()
            .route(&urls[0], 500, "")
            .stall(&urls[1])
            .route(&urls[2], 200, &detail_page("3"));

        let scraper = Arc::new(Scraper::new(client, cfg).unwrap());
        let finished =
            tokio::time::timeout(Duration::from_millis(300), scraper.retry_failed()).await;
        assert!(finished.is_err());
        scraper.shutdown().unwrap();

        let still = load_failed(&dir.path().join("failed_urls.json")).unwrap();
        assert_eq!(sorted_urls(still), urls);
        assert!(!dir.path().join("scraped_data.csv").exists());
    }

    #[tokio::test]
    async fn test_interrupted_run_saves_progress_of_written_rows() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new()
            .route(&page_url(BASE, 1), 200, &listing_page(&["1", "2"]))
            .route(&format!("{BASE}/elan/1.html"), 200, &detail_page("1"))
            .stall(&format!("{BASE}/elan/2.html"));

        let scraper = Arc::new(Scraper::new(client, config(dir.path())).unwrap());
        let finished = tokio::time::timeout(Duration::from_millis(300), scraper.run()).await;
        assert!(finished.is_err());
        scraper.shutdown().unwrap();

        let progress = load_progress(&dir.path().join("scraper_progress.json"));
        assert_eq!(progress, HashSet::from(["1".to_string()]));
        assert_eq!(csv_ids(&dir.path().join("scraped_data.csv")), vec!["1"]);
    }

    #[tokio::test]
    async fn test_no_rows_written_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new()
            .route(&page_url(BASE, 1), 200, &listing_page(&["1", "2"]))
            .route(&format!("{BASE}/elan/1.html"), 200, &detail_page("1"))
            .route(&format!("{BASE}/elan/2.html"), 200, &detail_page("2"));

        let scraper = Arc::new(Scraper::new(client, config(dir.path())).unwrap());
        scraper.shutdown().unwrap();
        let saved = scraper.scrape_page(1).await.unwrap();

        assert_eq!(saved, 0);
        assert_eq!(scraper.scraped_count(), 0);
        assert!(!dir.path().join("scraped_data.csv").exists());
    }
}
