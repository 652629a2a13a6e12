//! Resume state kept between scraping runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Progress {
    pub scraped_ids: Vec<String>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUrl {
    pub url: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FailedLog {
    pub failed_urls: Vec<FailedUrl>,
    pub count: usize,
}

/// Ids already written by earlier runs. A missing or unreadable file starts
/// from scratch.
pub fn load_progress(path: &Path) -> HashSet<String> {
    if !path.exists() {
        return HashSet::new();
    }
    let parsed = fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|s| serde_json::from_str::<Progress>(&s).map_err(anyhow::Error::from));
    match parsed {
        Ok(progress) => {
            info!(count = progress.scraped_ids.len(), "Loaded progress");
            progress.scraped_ids.into_iter().collect()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Error loading progress");
            HashSet::new()
        }
    }
}

pub fn save_progress(path: &Path, ids: &HashSet<String>) -> Result<()> {
    let mut scraped_ids: Vec<String> = ids.iter().cloned().collect();
    scraped_ids.sort();
    let progress = Progress {
        scraped_ids,
        last_update: Some(Utc::now()),
    };
    let json = serde_json::to_string_pretty(&progress)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

pub fn load_failed(path: &Path) -> Result<Vec<FailedUrl>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let s = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let log: FailedLog =
        serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(log.failed_urls)
}

pub fn save_failed(path: &Path, failed: &[FailedUrl]) -> Result<()> {
    let log = FailedLog {
        failed_urls: failed.to_vec(),
        count: failed.len(),
    };
    let json = serde_json::to_string_pretty(&log)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
