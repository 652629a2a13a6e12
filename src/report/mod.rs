//! Report composition: Markdown narrative plus the summary JSON.

pub mod composer;
pub mod format;
pub mod summary;

pub use composer::compose_report;
pub use summary::{SummaryStats, write_summary};
