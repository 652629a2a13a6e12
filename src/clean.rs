//! Normalisation of raw scraped strings into typed values.
//!
//! Each function takes the cell as it came off the site and returns `None`
//! (or a fallback label) when the value is missing or outside the plausible
//! range, so a single odd listing never poisons the statistics.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

use crate::listing::{PropertyType, SellerType};

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static WORD_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\s+(\p{L}+)\s+(\d{4})$").unwrap());

const MAX_ROOMS: u32 = 20;
const MIN_AREA: f64 = 10.0;
const MAX_AREA: f64 = 1000.0;

/// Extracts the first integer from a price cell such as `"125 000"`.
pub fn clean_price(raw: &str) -> Option<u64> {
    let compact: String = raw.chars().filter(|c| *c != ' ' && *c != ',').collect();
    DIGITS.find(&compact)?.as_str().parse().ok()
}

/// Keeps the district part of a location such as `"Yasamal r.‚ Elmlər m."`.
pub fn extract_region(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "Unknown".to_string();
    };
    let head = if raw.contains('‚') {
        raw.split('‚').next()
    } else {
        raw.split(',').next()
    };
    head.unwrap_or(raw).trim().to_string()
}

/// Studios count as zero rooms; implausible counts are dropped.
pub fn extract_rooms(raw: &str) -> Option<u32> {
    if raw.to_lowercase().contains("studio") {
        return Some(0);
    }
    let rooms: u32 = DIGITS.find(raw)?.as_str().parse().ok()?;
    (rooms < MAX_ROOMS).then_some(rooms)
}

pub fn clean_area(raw: &str) -> Option<f64> {
    let normalised = raw.replace(',', ".");
    let area: f64 = DECIMAL.find(&normalised)?.as_str().parse().ok()?;
    (area > MIN_AREA && area < MAX_AREA).then_some(area)
}

pub fn property_type(category: Option<&str>) -> PropertyType {
    let Some(category) = category else {
        return PropertyType::Other;
    };
    let c = category.to_lowercase();
    if c.contains("yeni tikili") {
        PropertyType::NewBuilding
    } else if c.contains("həyət") || c.contains("villa") || c.contains("bağ") {
        PropertyType::HouseVilla
    } else if c.contains("kirayə") {
        PropertyType::Rental
    } else if c.contains("obyekt") || c.contains("ofis") {
        PropertyType::Commercial
    } else {
        PropertyType::Apartment
    }
}

pub fn seller_type(advertiser: Option<&str>) -> SellerType {
    match advertiser {
        Some(a) if a.contains("ƏMLAK sahibi") => SellerType::Owner,
        Some(a) if a.contains("Vasitəçi") => SellerType::Agent,
        _ => SellerType::Unknown,
    }
}

pub fn parse_views(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok().filter(|v| *v > 0)
}

/// Parses `"12 Mart 2024"`, `"12 March 2024"` or `"12.03.2024"`.
pub fn parse_posted_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d.%m.%Y") {
        return Some(date);
    }

    let caps = WORD_DATE.captures(raw)?;
    let day: u32 = caps[1].parse().ok()?;
    let month = month_number(&caps[2])?;
    let year: i32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_number(name: &str) -> Option<u32> {
    // "İyun".to_lowercase() keeps a combining dot above the i
    let name: String = name.to_lowercase().chars().filter(|c| *c != '\u{307}').collect();
    let month = match name.as_str() {
        "yanvar" | "january" | "jan" => 1,
        "fevral" | "february" | "feb" => 2,
        "mart" | "march" | "mar" => 3,
        "aprel" | "april" | "apr" => 4,
        "may" => 5,
        "iyun" | "june" | "jun" => 6,
        "iyul" | "july" | "jul" => 7,
        "avqust" | "august" | "aug" => 8,
        "sentyabr" | "september" | "sep" => 9,
        "oktyabr" | "october" | "oct" => 10,
        "noyabr" | "november" | "nov" => 11,
        "dekabr" | "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}
