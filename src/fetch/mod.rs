//! HTTP access for the scraper.
//!
//! Everything goes through the [`HttpClient`] trait so tests can script
//! responses without a network.

mod browser;
mod retry;

pub use browser::BrowserClient;
pub use retry::{FetchOutcome, RetryPolicy, fetch_with_retry};

use async_trait::async_trait;
use reqwest::{Request, Response, StatusCode};

use crate::error::ScrapeError;

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Performs a single GET and returns the body of a `200 OK` response.
///
/// # Errors
///
/// Any non-200 status is reported as [`ScrapeError::Status`].
pub async fn fetch_text<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<String, ScrapeError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ScrapeError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let req = Request::new(reqwest::Method::GET, parsed);

    let resp = client.execute(req).await?;
    let status = resp.status();
    if status != StatusCode::OK {
        return Err(ScrapeError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    Ok(resp.text().await?)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedClient;
    use super::*;

    #[tokio::test]
    async fn test_fetch_text_ok() {
        let client = ScriptedClient::new().route("https://birja-in.az/a", 200, "<html></html>");
        let body = fetch_text(&client, "https://birja-in.az/a").await.unwrap();
        assert_eq!(body, "<html></html>");
    }

    #[tokio::test]
    async fn test_fetch_text_non_200_is_status_error() {
        let client = ScriptedClient::new().route("https://birja-in.az/a", 500, "boom");
        let err = fetch_text(&client, "https://birja-in.az/a").await.unwrap_err();
        assert!(matches!(err, ScrapeError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_text_rejects_bad_url() {
        let client = ScriptedClient::new();
        let err = fetch_text(&client, "not a url").await.unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidUrl { .. }));
        assert_eq!(client.calls(), 0);
    }
}
