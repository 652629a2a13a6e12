pub mod analyzers;
pub mod charts;
pub mod clean;
pub mod error;
pub mod fetch;
pub mod listing;
pub mod output;
pub mod report;
pub mod scrape;
