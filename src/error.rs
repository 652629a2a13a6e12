//! Error type for the scraping side of the tool.
//!
//! Report generation works on `anyhow::Result`; the scraper keeps a typed
//! error so the retry loop can tell a missing page from a flaky one.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },

    #[error("bad selector '{0}'")]
    Selector(String),

    #[error("listing card has no elan id")]
    MissingId,

    #[error("request limiter closed")]
    LimiterClosed(#[from] tokio::sync::AcquireError),
}

impl ScrapeError {
    /// Errors that another attempt cannot fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ScrapeError::InvalidUrl { .. } | ScrapeError::Status { status: 404, .. }
        )
    }
}
