//! Collection of listings from birja-in.az into the scraped CSV.
//!
//! Listing pages are walked in order; each unseen card's detail page is
//! fetched concurrently and the merged row appended to the CSV. Progress and
//! failed URLs are kept on disk so an interrupted run can resume.

pub mod parser;
pub mod progress;
pub mod scraper;

pub use parser::ListingParser;
pub use scraper::{DEFAULT_BASE_URL, ScrapeConfig, ScrapeSummary, Scraper};
