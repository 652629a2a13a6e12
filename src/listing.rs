//! Listing records: the raw scraped row and the cleaned analysis model.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clean;

/// One row of `scraped_data.csv`. Field order is the CSV column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedListing {
    pub elan_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub price: Option<String>,
    pub currency: Option<String>,
    pub location: Option<String>,
    pub region: Option<String>,
    pub metro: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub elan_type: Option<String>,
    pub property_type: Option<String>,
    pub rental_period: Option<String>,
    pub room_count: Option<String>,
    pub floor: Option<String>,
    pub total_floors: Option<String>,
    pub area_sqm: Option<String>,
    pub repair_status: Option<String>,
    pub land_area_sot: Option<String>,
    pub house_area_sqm: Option<String>,
    pub advertiser_type: Option<String>,
    pub description: Option<String>,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub date_posted: Option<String>,
    pub view_count: Option<String>,
    pub images: Option<String>,
    pub all_properties: Option<String>,
    pub scraped_at: Option<String>,

    // card-only field, not persisted
    #[serde(skip)]
    pub short_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum PropertyType {
    NewBuilding,
    HouseVilla,
    Rental,
    Commercial,
    Apartment,
    Other,
}

impl PropertyType {
    pub fn label(&self) -> &'static str {
        match self {
            PropertyType::NewBuilding => "New Building",
            PropertyType::HouseVilla => "House/Villa",
            PropertyType::Rental => "Rental",
            PropertyType::Commercial => "Commercial",
            PropertyType::Apartment => "Apartment",
            PropertyType::Other => "Other",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SellerType {
    Owner,
    Agent,
    Unknown,
}

impl SellerType {
    pub fn label(&self) -> &'static str {
        match self {
            SellerType::Owner => "Owner",
            SellerType::Agent => "Agent",
            SellerType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for SellerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A cleaned listing, immutable for the rest of the run.
///
/// `price` is only set for AZN listings with a positive price, so every
/// price statistic is in manat. `area` is in square metres and always > 0
/// when present.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: String,
    pub price: Option<u64>,
    pub area: Option<f64>,
    pub region: String,
    pub rooms: Option<u32>,
    pub seller: SellerType,
    pub views: Option<u64>,
    pub posted: Option<NaiveDate>,
    pub property_type: PropertyType,
}

impl Listing {
    pub fn from_record(raw: &ScrapedListing) -> Self {
        let is_azn = raw
            .currency
            .as_deref()
            .is_some_and(|c| c.trim().eq_ignore_ascii_case("azn"));
        let price = if is_azn {
            raw.price.as_deref().and_then(clean::clean_price).filter(|p| *p > 0)
        } else {
            None
        };

        Listing {
            id: raw.elan_id.clone(),
            price,
            area: raw.area_sqm.as_deref().and_then(clean::clean_area),
            region: clean::extract_region(raw.region.as_deref()),
            rooms: raw.room_count.as_deref().and_then(clean::extract_rooms),
            seller: clean::seller_type(raw.advertiser_type.as_deref()),
            views: raw.view_count.as_deref().and_then(clean::parse_views),
            posted: raw.date_posted.as_deref().and_then(clean::parse_posted_date),
            property_type: clean::property_type(raw.category.as_deref()),
        }
    }
}
