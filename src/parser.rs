//! Listing extraction from nepremicnine.net search result pages.
//!
//! Each result card sits under `#vsebina760 > div.seznam` and carries its data
//! in schema.org microdata (`itemprop`) attributes, which change far less
//! often than the surrounding layout classes.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

use crate::error::{BotError, Result};
use crate::types::Listing;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css:?}: {e:?}"))
}

static CARD: Lazy<Selector> =
    Lazy::new(|| selector("#vsebina760 > div.seznam div.col-md-6.position-relative"));
static DETAILS: Lazy<Selector> = Lazy::new(|| selector(".property-details"));
static IMAGE_SECOND_LINK: Lazy<Selector> =
    Lazy::new(|| selector(".property-image > a:nth-of-type(2) img"));
static IMAGE_ANY: Lazy<Selector> = Lazy::new(|| selector(".property-image img"));
static LINK: Lazy<Selector> = Lazy::new(|| selector(".property-details > a[href]"));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("h2"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector("p[itemprop=\"description\"]"));
static PROPERTIES: Lazy<Selector> =
    Lazy::new(|| selector("ul[itemprop=\"disambiguatingDescription\"] > li"));
static PRICE_META: Lazy<Selector> = Lazy::new(|| selector("meta[itemprop=\"price\"]"));
static NEXT_PAGE: Lazy<Selector> =
    Lazy::new(|| selector("link[rel=\"next\"], a[rel=\"next\"], a.next"));

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d.,]*").expect("valid regex"));
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(1[89]\d{2}|2\d{3})\b").expect("valid regex"));
static TRAILING_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"_(\d+)$").expect("valid regex"));

/// Result of parsing one search results page
#[derive(Debug, Default)]
pub struct ParsedPage {
    pub listings: Vec<Listing>,
    /// Cards that could not be turned into a listing, with the reason
    pub errors: Vec<String>,
    pub cards_found: usize,
    pub has_next_page: bool,
}

pub struct ListingParser;

impl ListingParser {
    pub fn parse_page(html: &str, page_url: &str) -> Result<ParsedPage> {
        let base = Url::parse(page_url).map_err(|e| BotError::Parse {
            message: format!("invalid page url {page_url}: {e}"),
        })?;
        let document = Html::parse_document(html);

        let mut page = ParsedPage {
            has_next_page: document.select(&NEXT_PAGE).next().is_some(),
            ..ParsedPage::default()
        };

        for (index, card) in document
            .select(&CARD)
            .filter(|card| card.select(&DETAILS).next().is_some())
            .enumerate()
        {
            page.cards_found += 1;
            match Self::parse_card(&card, &base) {
                Ok(listing) => {
                    debug!(id = %listing.id, title = %listing.title, price = listing.price, "Parsed listing");
                    page.listings.push(listing);
                }
                Err(e) => {
                    warn!(card = index, error = %e, "Skipping listing card");
                    page.errors.push(format!("card {index}: {e}"));
                }
            }
        }

        Ok(page)
    }

    fn parse_card(card: &ElementRef, base: &Url) -> Result<Listing> {
        let link = card
            .select(&LINK)
            .next()
            .ok_or_else(|| BotError::MissingField("listing link".into()))?;
        let href = link
            .value()
            .attr("href")
            .ok_or_else(|| BotError::MissingField("listing href".into()))?;
        let url = resolve_url(base, href)?;
        let id = listing_id_from_url(&url)
            .ok_or_else(|| BotError::MissingField(format!("listing id in {url}")))?;

        let title = link
            .select(&TITLE)
            .next()
            .or_else(|| card.select(&TITLE).next())
            .map(|h| element_text(&h))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BotError::MissingField("title".into()))?;

        let price = card
            .select(&PRICE_META)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .and_then(parse_number)
            .ok_or_else(|| BotError::MissingField("price".into()))?;

        let description = card
            .select(&DESCRIPTION)
            .next()
            .map(|p| element_text(&p))
            .filter(|d| !d.is_empty());

        let image_url = card
            .select(&IMAGE_SECOND_LINK)
            .next()
            .or_else(|| card.select(&IMAGE_ANY).next())
            .and_then(|img| image_source(&img))
            .and_then(|src| resolve_url(base, &src).ok());

        // Size, year built and floor, in that order
        let properties: Vec<String> = card.select(&PROPERTIES).map(|li| element_text(&li)).collect();
        let size_m2 = properties.first().and_then(|s| parse_number(s));
        let year_built = properties.get(1).and_then(|s| parse_year(s));
        let floor = properties
            .get(2)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Listing {
            id,
            url,
            title,
            description,
            image_url,
            price,
            size_m2,
            year_built,
            floor,
        })
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn image_source(img: &ElementRef) -> Option<String> {
    let src = img.value().attr("src").filter(|s| !s.starts_with("data:"));
    src.or_else(|| img.value().attr("data-src"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn resolve_url(base: &Url, href: &str) -> Result<String> {
    base.join(href.trim())
        .map(|u| u.to_string())
        .map_err(|e| BotError::Parse {
            message: format!("invalid url {href}: {e}"),
        })
}

/// The site's listing id: the last path segment, or just its trailing
/// `_<digits>` part when it has one.
pub fn listing_id_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .last()?
        .to_string();
    match TRAILING_ID.captures(&segment) {
        Some(caps) => Some(caps[1].to_string()),
        None => Some(segment),
    }
}

/// Parses the first number in `text`, accepting both `1.250,50` and `1250.50`.
pub fn parse_number(text: &str) -> Option<f64> {
    let raw = NUMBER.find(text)?.as_str().trim_end_matches(['.', ',']);
    let normalized = if raw.contains(',') {
        raw.replace('.', "").replace(',', ".")
    } else if raw.matches('.').count() > 1 || is_thousands_group(raw) {
        raw.replace('.', "")
    } else {
        raw.to_string()
    };
    normalized.parse().ok()
}

// "1.250" is one thousand two hundred fifty, not one and a quarter
fn is_thousands_group(raw: &str) -> bool {
    match raw.split_once('.') {
        Some((_, fraction)) => fraction.len() == 3,
        None => false,
    }
}

pub fn parse_year(text: &str) -> Option<i32> {
    YEAR.captures(text).and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const PAGE_URL: &str = "https://www.nepremicnine.net/oglasi-oddaja/ljubljana-mesto/stanovanje/";

    pub(crate) fn card(href: &str, title: &str, price: Option<&str>, props: &[&str]) -> String {
        let price = price
            .map(|p| format!(r#"<meta itemprop="price" content="{p}">"#))
            .unwrap_or_default();
        let props: String = props.iter().map(|p| format!("<li>{p}</li>")).collect();
        format!(
            r#"<div class="col-md-6 col-md-12 position-relative">
                 <div class="property-box">
                   <div class="property-image">
                     <a href="{href}" class="favourite"></a>
                     <a href="{href}"><img src="https://img.nepremicnine.net/slonep_oglasi2/123.jpg"></a>
                   </div>
                   <div class="property-details">
                     <a href="{href}"><h2>{title}</h2></a>
                     <p itemprop="description">Lepo   stanovanje
                        blizu centra.</p>
                     <ul itemprop="disambiguatingDescription">{props}</ul>
                     {price}
                   </div>
                 </div>
               </div>"#
        )
    }

    pub(crate) fn page(cards: &[String], next: bool) -> String {
        let next = if next {
            r#"<a rel="next" href="2/">Naprej</a>"#
        } else {
            ""
        };
        format!(
            r#"<html><body><div id="vsebina760"><div class="seznam"><div><div><div>{}</div></div></div></div>{next}</div></body></html>"#,
            cards.concat()
        )
    }

    #[test]
    fn parses_a_complete_card() {
        let html = page(
            &[card(
                "/oglasi-oddaja/ljubljana-bezigrad-stanovanje_6812345/",
                "LJ. BEŽIGRAD, 55 m2, 2-sobno",
                Some("850.00"),
                &["55,00 m2", "2005", "3/4"],
            )],
            true,
        );

        let parsed = ListingParser::parse_page(&html, PAGE_URL).unwrap();
        assert!(parsed.errors.is_empty());
        assert!(parsed.has_next_page);
        assert_eq!(parsed.listings.len(), 1);

        let listing = &parsed.listings[0];
        assert_eq!(listing.id, "6812345");
        assert_eq!(
            listing.url,
            "https://www.nepremicnine.net/oglasi-oddaja/ljubljana-bezigrad-stanovanje_6812345/"
        );
        assert_eq!(listing.title, "LJ. BEŽIGRAD, 55 m2, 2-sobno");
        assert_eq!(listing.description.as_deref(), Some("Lepo stanovanje blizu centra."));
        assert_eq!(
            listing.image_url.as_deref(),
            Some("https://img.nepremicnine.net/slonep_oglasi2/123.jpg")
        );
        assert_eq!(listing.price, 850.0);
        assert_eq!(listing.size_m2, Some(55.0));
        assert_eq!(listing.year_built, Some(2005));
        assert_eq!(listing.floor.as_deref(), Some("3/4"));
    }

    #[test]
    fn card_without_price_is_reported_and_skipped() {
        let html = page(
            &[
                card("/oglasi-oddaja/a_1/", "Brez cene", None, &["40 m2"]),
                card("/oglasi-oddaja/b_2/", "S ceno", Some("700"), &[]),
            ],
            false,
        );

        let parsed = ListingParser::parse_page(&html, PAGE_URL).unwrap();
        assert_eq!(parsed.cards_found, 2);
        assert_eq!(parsed.listings.len(), 1);
        assert_eq!(parsed.listings[0].id, "2");
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].contains("price"));
        assert!(!parsed.has_next_page);
    }

    #[test]
    fn missing_properties_are_none() {
        let html = page(&[card("/oglasi-oddaja/c_3/", "Samo cena", Some("500"), &[])], false);
        let listing = &ListingParser::parse_page(&html, PAGE_URL).unwrap().listings[0];
        assert_eq!(listing.size_m2, None);
        assert_eq!(listing.year_built, None);
        assert_eq!(listing.floor, None);
    }

    #[test]
    fn page_without_results_is_empty() {
        let parsed =
            ListingParser::parse_page("<html><body><p>Ni zadetkov</p></body></html>", PAGE_URL)
                .unwrap();
        assert_eq!(parsed.cards_found, 0);
        assert!(parsed.listings.is_empty());
    }

    #[test]
    fn listing_ids() {
        assert_eq!(
            listing_id_from_url("https://www.nepremicnine.net/oglasi-oddaja/lj-stanovanje_6812345/").as_deref(),
            Some("6812345")
        );
        assert_eq!(
            listing_id_from_url("https://www.nepremicnine.net/oglasi-oddaja/abc-def/").as_deref(),
            Some("abc-def")
        );
        assert_eq!(listing_id_from_url("https://www.nepremicnine.net/"), None);
    }

    #[test]
    fn numbers_in_local_formats() {
        assert_eq!(parse_number("55,00 m2"), Some(55.0));
        assert_eq!(parse_number("1.250,50 m²"), Some(1250.5));
        assert_eq!(parse_number("850.00"), Some(850.0));
        assert_eq!(parse_number("1.250 €"), Some(1250.0));
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number("po dogovoru"), None);
    }

    #[test]
    fn years() {
        assert_eq!(parse_year("2005"), Some(2005));
        assert_eq!(parse_year("zgrajeno l. 1974, adaptirano 2019"), Some(1974));
        assert_eq!(parse_year("3/4"), None);
    }
}
