//! Listing aggregation and the report pipeline.
//!
//! This module loads the scraped CSV, cleans each row into a listing,
//! computes segment statistics per dimension and hands them to the chart
//! renderer and the report composer.

pub mod aggregate;
pub mod analyzer;
pub mod buckets;
pub mod types;
pub mod utility;
