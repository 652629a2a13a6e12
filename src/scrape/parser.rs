//! HTML extraction for birja-in.az listing pages and detail pages.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::ScrapeError;
use crate::listing::ScrapedListing;

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static CATEGORY_STYLE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"color.*#ea6f24").unwrap());
static ADVERTISER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"ƏMLAK|Vasitəçi").unwrap());
static PAGE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/num(\d+)\.html$").unwrap());

const ELAN_MARKER: &str = "Elan №";
const VIEWS_MARKER: &str = "Baxış sayı";

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|_| ScrapeError::Selector(css.to_string()))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// URL of the `page`-th page of sale listings.
pub fn page_url(base_url: &str, page: u32) -> String {
    format!("{base_url}/elanlar/ev-alqi-satqisi/num{page}.html")
}

/// Page number of a listing-page URL, `None` for any other URL.
pub fn page_number(url: &str) -> Option<u32> {
    PAGE_NUMBER.captures(url)?.get(1)?.as_str().parse().ok()
}

/// Compiled selectors for the site's markup.
pub struct ListingParser {
    base_url: String,
    card: Selector,
    span: Selector,
    h2: Selector,
    link: Selector,
    item_name: Selector,
    price: Selector,
    currency: Selector,
    location: Selector,
    category: Selector,
    short_text: Selector,
    date_posted: Selector,
    description: Selector,
    row: Selector,
    cell: Selector,
    contact: Selector,
    phone_label: Selector,
    history: Selector,
    gallery: Selector,
}

impl ListingParser {
    pub fn new(base_url: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            card: selector("div.block_one_synopsis_advert")?,
            span: selector("span")?,
            h2: selector("h2")?,
            link: selector("a")?,
            item_name: selector(r#"span[itemprop="name"]"#)?,
            price: selector("span.value_cost_adv")?,
            currency: selector("span.value_currency")?,
            location: selector("div.block_name_region_adv")?,
            category: selector("div.block_name_category_adv")?,
            short_text: selector("div.short-text-ads")?,
            date_posted: selector(r#"span[itemprop="datePosted"]"#)?,
            description: selector(r#"td[itemprop="description"]"#)?,
            row: selector("tr")?,
            cell: selector("td")?,
            contact: selector("td.name_adder")?,
            phone_label: selector("td.td_name_param_phone")?,
            history: selector("td.history")?,
            gallery: selector("a.fancybox-buttons")?,
        })
    }

    fn absolute(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else {
            format!("{}{}", self.base_url, href)
        }
    }

    fn first_text(&self, root: ElementRef<'_>, sel: &Selector) -> Option<String> {
        root.select(sel).next().map(text_of).and_then(non_empty)
    }

    fn elan_id(&self, root: ElementRef<'_>) -> Option<String> {
        root.select(&self.span)
            .map(text_of)
            .find(|t| t.contains(ELAN_MARKER))
            .and_then(|t| DIGITS.find(&t).map(|m| m.as_str().to_string()))
    }

    /// Extracts every listing card on a listing page. Cards without an
    /// elan id are dropped.
    pub fn parse_cards(&self, html: &str) -> Vec<ScrapedListing> {
        let doc = Html::parse_document(html);
        doc.select(&self.card)
            .filter_map(|card| self.parse_card(card).ok())
            .collect()
    }

    fn parse_card(&self, card: ElementRef<'_>) -> Result<ScrapedListing, ScrapeError> {
        let elan_id = self.elan_id(card).ok_or(ScrapeError::MissingId)?;
        let mut listing = ScrapedListing {
            elan_id,
            ..Default::default()
        };

        if let Some(link) = card
            .select(&self.h2)
            .next()
            .and_then(|h2| h2.select(&self.link).next())
        {
            let title = link
                .select(&self.item_name)
                .next()
                .map(text_of)
                .unwrap_or_else(|| text_of(link));
            listing.title = non_empty(title);
            listing.url = Some(format!(
                "{}{}",
                self.base_url,
                link.value().attr("href").unwrap_or("")
            ));
        }

        listing.price = self
            .first_text(card, &self.price)
            .map(|p| p.replace(' ', ""));
        listing.currency = self.first_text(card, &self.currency);
        listing.location = self.first_text(card, &self.location);
        listing.category = card.select(&self.category).next().and_then(|block| {
            block
                .select(&self.span)
                .find(|s| s.value().attr("style").is_some_and(|st| CATEGORY_STYLE.is_match(st)))
                .map(text_of)
                .and_then(non_empty)
        });
        listing.short_description = self.first_text(card, &self.short_text);
        listing.date_posted = self.first_text(card, &self.date_posted);

        Ok(listing)
    }

    /// Finds the elan id anywhere on a page; used when a detail page is
    /// re-fetched without its listing card.
    pub fn find_elan_id(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        self.elan_id(doc.root_element())
    }

    /// Completes `card` with everything on its detail page.
    pub fn parse_detail(&self, html: &str, card: ScrapedListing, scraped_at: &str) -> ScrapedListing {
        let doc = Html::parse_document(html);
        let root = doc.root_element();
        let mut data = card;

        if let Some(desc) = self.first_text(root, &self.description) {
            data.description = Some(desc);
        }

        let mut properties = BTreeMap::new();
        for row in root.select(&self.row) {
            let cells: Vec<String> = row.select(&self.cell).map(text_of).collect();
            if let [key, value] = cells.as_slice() {
                if !key.is_empty() && !value.is_empty() {
                    properties.insert(key.clone(), value.clone());
                }
            }
        }

        let prop = |key: &str| properties.get(key).cloned();
        data.region = prop("Şəhər/ərazi");
        data.elan_type = prop("Elan növü");
        data.property_type = prop("Əmlak növü");
        data.rental_period = prop("Kirayə müddəti");
        data.room_count = prop("Otaq sayı");
        data.floor = prop("Mərtəbə");
        data.total_floors = prop("Mərtəbəli bina");
        data.area_sqm = prop("Sahəsi (m²)");
        data.repair_status = prop("Təmiri");
        data.land_area_sot = prop("Ümumi-sahə (sot)");
        data.house_area_sqm = prop("Evin-sahəsi (m²)");

        if let Some(advertiser) = root
            .select(&self.span)
            .map(text_of)
            .find(|t| ADVERTISER.is_match(t))
        {
            data.advertiser_type = Some(advertiser);
        }

        if let Some(contact) = root.select(&self.contact).next() {
            let name = text_of(contact);
            data.contact_name = non_empty(name.lines().next().unwrap_or("").trim().to_string());
        }

        data.phone = root.select(&self.phone_label).next().and_then(|label| {
            label
                .next_siblings()
                .filter_map(ElementRef::wrap)
                .find(|e| e.value().name() == "td")
                .map(text_of)
                .and_then(non_empty)
        });

        data.view_count = root
            .select(&self.history)
            .map(text_of)
            .find(|t| t.contains(VIEWS_MARKER))
            .and_then(|t| DIGITS.find(&t).map(|m| m.as_str().to_string()));

        let images: Vec<String> = root
            .select(&self.gallery)
            .filter_map(|a| a.value().attr("href"))
            .map(|href| self.absolute(href))
            .collect();
        data.images = non_empty(images.join("|"));

        // BTreeMap<String, String> always serializes
        data.all_properties = serde_json::to_string(&properties).ok();
        data.scraped_at = Some(scraped_at.to_string());

        data
    }
}
