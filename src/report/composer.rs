//! Markdown composition of the market report.
//!
//! The narrative is fixed; only the figures change. Nothing here reads the
//! clock or iterates a hash map, so the same analysis always yields the same
//! bytes.

use crate::analyzers::types::{Breakdown, MarketAnalysis, Segment};
use crate::charts::{ChartIndex, Finding};
use crate::report::format::{azn, azn_short, count, percent};

const INSUFFICIENT: &str = "_Insufficient data for this finding._\n\n";

/// Builds the complete report document.
pub fn compose_report(analysis: &MarketAnalysis, charts: &ChartIndex) -> String {
    let mut output = String::new();

    output.push_str("# Baku Real Estate Market Analysis\n\n");
    output.push_str(&generate_byline(analysis));
    output.push_str(&generate_executive_summary(analysis));
    output.push_str(&generate_key_figures(analysis));

    for (n, finding) in Finding::ALL.iter().enumerate() {
        output.push_str(&format!("## {}. {}\n\n", n + 1, finding_title(*finding)));
        let breakdown = finding.breakdown(analysis);
        if breakdown.is_no_data() {
            output.push_str(INSUFFICIENT);
            continue;
        }
        if let Some(link) = charts.get(finding) {
            output.push_str(&format!("![{}]({})\n\n", finding.file_stem(), link));
        }
        output.push_str(&generate_finding(*finding, breakdown));
    }

    output.push_str(&generate_recommendations(analysis));
    output.push_str(&generate_risks(analysis));
    output.push_str(&generate_methodology(analysis));

    output
}

fn finding_title(finding: Finding) -> &'static str {
    match finding {
        Finding::PriceByPropertyType => "Prices by Property Type",
        Finding::SupplyByRegion => "Market Supply by Region",
        Finding::PriceByRooms => "Prices by Number of Rooms",
        Finding::Engagement => "Listing Engagement",
        Finding::ListingsOverTime => "Market Activity Over Time",
        Finding::SizeDistribution => "Property Size Distribution",
        Finding::SellerType => "Owners vs Agents",
        Finding::PriceRange => "Price Range Distribution",
    }
}

fn generate_byline(a: &MarketAnalysis) -> String {
    let through = a
        .data_through
        .map(|d| format!(" · data through {}", d.format("%Y-%m-%d")))
        .unwrap_or_default();
    format!(
        "_Source: birja-in.az listings · {} listings analysed{}_\n\n",
        count(a.total_listings),
        through
    )
}

fn generate_executive_summary(a: &MarketAnalysis) -> String {
    let mut section = String::from("## Executive Summary\n\n");

    let Some(overall) = &a.overall else {
        section.push_str(&format!(
            "None of the {} listings carried a usable manat price, so no price findings can be drawn.\n\n",
            count(a.total_listings)
        ));
        return section;
    };

    section.push_str(&format!(
        "Across {} listings priced in manat, the market shows a median of {} against an average of {}.",
        count(a.priced_listings),
        azn_short(overall.median),
        azn_short(overall.mean)
    ));
    if overall.is_right_skewed() {
        section.push_str(
            " The average sits above the median: a tail of premium properties pulls it upward, so the median is the better guide to a typical asking price.",
        );
    }
    section.push_str("\n\n");

    let mut bullets = Vec::new();
    if let Some(top) = a.by_region.segments().first() {
        bullets.push(format!(
            "**{}** is the largest supply hub with {} listings ({} of the market).",
            top.label,
            count(top.count),
            percent(top.share_pct)
        ));
    }
    if let Some(top) = a.by_property_type.segments().first() {
        if let Some(median) = top.median_price() {
            bullets.push(format!(
                "**{}** commands the highest median price of {}.",
                top.label,
                azn_short(median)
            ));
        }
    }
    if let Some(band) = a.by_price.largest() {
        bullets.push(format!(
            "The most common price band is **{} AZN**, holding {} of priced listings.",
            band.label,
            percent(band.share_pct)
        ));
    }
    if let Some(size) = a.by_size.largest() {
        bullets.push(format!(
            "**{}** is the most listed size class ({}).",
            size.label,
            percent(size.share_pct)
        ));
    }
    for b in bullets {
        section.push_str(&format!("- {b}\n"));
    }
    section.push('\n');
    section
}

fn generate_key_figures(a: &MarketAnalysis) -> String {
    let mut section = String::from("## Key Figures\n\n| Metric | Value |\n|---|---|\n");
    section.push_str(&format!("| Total listings | {} |\n", count(a.total_listings)));
    section.push_str(&format!(
        "| Listings with AZN price | {} |\n",
        count(a.priced_listings)
    ));
    if let Some(p) = &a.overall {
        section.push_str(&format!("| Median price | {} |\n", azn(p.median)));
        section.push_str(&format!("| Average price | {} |\n", azn(p.mean)));
        section.push_str(&format!("| Price range | {} – {} |\n", azn(p.min), azn(p.max)));
    }
    section.push('\n');
    section
}

fn price_line(s: &Segment) -> String {
    match &s.price {
        Some(p) => format!(
            "- **{}**: median of {}, average of {} ({} listings)\n",
            s.label,
            azn_short(p.median),
            azn_short(p.mean),
            count(s.count)
        ),
        None => format!("- **{}**: {} listings, no manat prices\n", s.label, count(s.count)),
    }
}

fn share_line(s: &Segment) -> String {
    format!(
        "- **{}**: {} listings ({})\n",
        s.label,
        count(s.count),
        percent(s.share_pct)
    )
}

fn generate_finding(finding: Finding, breakdown: &Breakdown) -> String {
    let segments = breakdown.segments();
    let mut section = String::new();

    match finding {
        Finding::PriceByPropertyType => {
            for s in segments {
                section.push_str(&price_line(s));
            }
            if let (Some(top), Some(bottom)) = (segments.first(), segments.last()) {
                if let (Some(hi), Some(lo)) = (top.median_price(), bottom.median_price()) {
                    if segments.len() > 1 && lo > 0.0 {
                        section.push_str(&format!(
                            "\n{} listings ask {:.1}x the median of {} listings.\n",
                            top.label,
                            hi / lo,
                            bottom.label
                        ));
                    }
                }
            }
        }
        Finding::SupplyByRegion => {
            for s in segments {
                section.push_str(&share_line(s));
            }
            let top3: f64 = segments.iter().take(3).map(|s| s.share_pct).sum();
            section.push_str(&format!(
                "\nThe top {} regions account for {} of all listings.\n",
                segments.len().min(3),
                percent(top3)
            ));
        }
        Finding::PriceByRooms => {
            for s in segments {
                let label = if s.label == "Studio" {
                    "Studio".to_string()
                } else {
                    format!("{}-room", s.label)
                };
                if let Some(m) = s.median_price() {
                    section.push_str(&format!(
                        "- **{}**: median of {} ({} listings)\n",
                        label,
                        azn_short(m),
                        count(s.count)
                    ));
                }
            }
            if let Some(most) = breakdown.largest() {
                section.push_str(&format!(
                    "\nSupply is deepest in the {} segment ({}).\n",
                    if most.label == "Studio" { "studio".to_string() } else { format!("{}-room", most.label) },
                    percent(most.share_pct)
                ));
            }
        }
        Finding::Engagement => {
            for s in segments {
                section.push_str(&format!(
                    "- **{}**: {} listings ({}), median of {}\n",
                    s.label,
                    count(s.count),
                    percent(s.share_pct),
                    s.median_price().map(azn_short).unwrap_or_else(|| "n/a".into())
                ));
            }
            if let (Some(low), Some(high)) = (segments.first(), segments.last()) {
                if let (Some(lm), Some(hm)) = (low.median_price(), high.median_price()) {
                    if segments.len() > 1 {
                        let direction = if hm < lm { "cheaper" } else { "pricier" };
                        section.push_str(&format!(
                            "\nThe most viewed listings are {} than the least viewed ({} vs {}).\n",
                            direction,
                            azn_short(hm),
                            azn_short(lm)
                        ));
                    }
                }
            }
        }
        Finding::ListingsOverTime => {
            for s in segments {
                section.push_str(&format!("- **{}**: {} new listings\n", s.label, count(s.count)));
            }
            if let Some(peak) = breakdown.largest() {
                section.push_str(&format!(
                    "\nActivity peaked in {} with {} new listings.\n",
                    peak.label,
                    count(peak.count)
                ));
            }
        }
        Finding::SizeDistribution | Finding::PriceRange => {
            for s in segments {
                section.push_str(&share_line(s));
            }
        }
        Finding::SellerType => {
            for s in segments {
                section.push_str(&share_line(s));
            }
            let owner = breakdown.get("Owner").and_then(Segment::median_price);
            let agent = breakdown.get("Agent").and_then(Segment::median_price);
            if let (Some(o), Some(g)) = (owner, agent) {
                section.push_str(&format!(
                    "\nOwners ask a median of {}, agents a median of {}.\n",
                    azn_short(o),
                    azn_short(g)
                ));
            }
        }
    }

    section.push('\n');
    section
}

fn generate_recommendations(a: &MarketAnalysis) -> String {
    let mut recs = Vec::new();

    if let Some(band) = a.by_price.largest() {
        recs.push(format!(
            "**Developers and sellers**: the {} AZN band is where most stock competes; pricing just below its upper edge widens the buyer pool.",
            band.label
        ));
    }
    let owner = a.by_seller.get("Owner").and_then(Segment::median_price);
    let agent = a.by_seller.get("Agent").and_then(Segment::median_price);
    if let (Some(o), Some(g)) = (owner, agent) {
        if o < g {
            recs.push(format!(
                "**Buyers**: owner listings ask {} less at the median than agent listings; direct deals leave room to negotiate.",
                azn_short(g - o)
            ));
        } else if g < o {
            recs.push(format!(
                "**Buyers**: agent listings ask {} less at the median than owner listings; agency stock is not a premium channel here.",
                azn_short(o - g)
            ));
        }
    }
    if let Some(region) = a.by_region.segments().first() {
        recs.push(format!(
            "**Investors**: {} has the deepest supply, which means more comparables and faster price discovery.",
            region.label
        ));
    }
    if let Some(size) = a.by_size.largest() {
        recs.push(format!(
            "**Agencies**: stock is concentrated in {} properties; marketing differentiation matters most there.",
            size.label
        ));
    }

    let mut section = String::from("## Recommendations\n\n");
    if recs.is_empty() {
        section.push_str(INSUFFICIENT);
        return section;
    }
    for r in recs {
        section.push_str(&format!("- {r}\n"));
    }
    section.push('\n');
    section
}

fn generate_risks(a: &MarketAnalysis) -> String {
    let mut section = String::from("## Risks and Caveats\n\n");

    section.push_str("- Prices are asking prices, not closed transactions.\n");

    let unpriced = a.total_listings - a.priced_listings;
    if unpriced > 0 {
        section.push_str(&format!(
            "- {} listings had no manat price (other currency or price on request) and are excluded from price figures.\n",
            count(unpriced)
        ));
    }
    if let Some(p) = &a.overall {
        let cv = p.coefficient_of_variation();
        if cv > 1.0 {
            section.push_str(&format!(
                "- Prices are highly dispersed (standard deviation {} on a mean of {}); segment medians are more reliable than averages.\n",
                azn_short(p.stddev),
                azn_short(p.mean)
            ));
        }
    }
    if let Some(unknown) = a.by_seller.get("Unknown") {
        if unknown.share_pct > 0.0 {
            section.push_str(&format!(
                "- Seller type is unknown for {} of listings.\n",
                percent(unknown.share_pct)
            ));
        }
    }
    section.push('\n');
    section
}

fn generate_methodology(a: &MarketAnalysis) -> String {
    format!(
        "## Methodology\n\n\
         - {} listings were cleaned; {} carried a positive price in AZN.\n\
         - Medians and averages are computed over AZN prices only.\n\
         - Areas outside 10–1000 m² and room counts of 20 or more are treated as data-entry errors.\n\
         - Segment shares are relative to the listings that have the attribute in question.\n",
        count(a.total_listings),
        count(a.priced_listings)
    )
}
