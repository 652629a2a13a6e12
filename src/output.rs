//! Persistence for scraped listings.
//!
//! Rows are appended to a CSV that grows across runs; when the CSV cannot be
//! written the row goes to a JSON-lines backup instead of being lost.

use anyhow::Result;
use chrono::Local;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Appends a record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(record)?;
    writer.flush()?;

    Ok(())
}

/// Appends a record as one JSON line to a timestamped backup file in `dir`.
pub fn append_backup<T: Serialize>(dir: &Path, record: &T) -> Result<PathBuf> {
    let path = dir.join(format!("backup_{}.json", Local::now().format("%Y%m%d_%H%M%S")));
    let mut file = OpenOptions::new().append(true).create(true).open(&path)?;
    serde_json::to_writer(&mut file, record)?;
    file.write_all(b"\n")?;
    Ok(path)
}

/// Appends to the CSV, falling back to a JSON-lines backup next to it.
///
/// Returns `false` when the row only made it into the backup.
pub fn save_record<T: Serialize>(path: &Path, record: &T) -> Result<bool> {
    match append_record(path, record) {
        Ok(()) => Ok(true),
        Err(e) => {
            error!(path = %path.display(), error = %e, "Error writing to CSV");
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let backup = append_backup(dir, record)?;
            info!(backup = %backup.display(), "Saved record to backup");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::ScrapedListing;
    use std::fs;

    fn row(id: &str) -> ScrapedListing {
        ScrapedListing {
            elan_id: id.to_string(),
            title: Some("3 otaqlı mənzil".into()),
            price: Some("125000".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_append_record_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraped_data.csv");

        append_record(&path, &row("1")).unwrap();

        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("elan_id,title,url,price,currency"));
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraped_data.csv");

        append_record(&path, &row("1")).unwrap();
        append_record(&path, &row("2")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.starts_with("elan_id")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_appended_rows_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraped_data.csv");
        append_record(&path, &row("11")).unwrap();

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let back: Vec<ScrapedListing> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(back, vec![row("11")]);
    }

    #[test]
    fn test_save_record_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the CSV should be makes the append fail
        let path = dir.path().join("scraped_data.csv");
        fs::create_dir(&path).unwrap();

        let written = save_record(&path, &row("5")).unwrap();
        assert!(!written);

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("backup_"))
            .collect();
        assert_eq!(backups.len(), 1);
        let line = fs::read_to_string(backups[0].path()).unwrap();
        assert!(line.contains("\"elan_id\":\"5\""));
    }
}
