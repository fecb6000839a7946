use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_PRICE_MAX, DEFAULT_PRICE_MIN, DEFAULT_REGION, DEFAULT_ROOMS, DEFAULT_SIZE_MIN,
    SITE_BASE_URL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    #[serde(alias = "oddaja")]
    Renting,
    #[serde(alias = "prodaja")]
    Selling,
}

impl ListingType {
    pub fn slug(&self) -> &'static str {
        match self {
            ListingType::Renting => "oddaja",
            ListingType::Selling => "prodaja",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    #[serde(alias = "stanovanje")]
    Apartment,
    #[serde(alias = "hisa")]
    House,
}

impl PropertyType {
    pub fn slug(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "stanovanje",
            PropertyType::House => "hisa",
        }
    }
}

/// Search parameters, rendered into the site's path-encoded search URLs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub base_url: String,
    pub listing_type: ListingType,
    pub region: String,
    pub property_type: PropertyType,
    pub rooms: Vec<String>,
    pub price_min: Option<u32>,
    pub price_max: Option<u32>,
    pub size_min: Option<u32>,
    /// Use this exact first-page URL instead of building one
    pub url_override: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            base_url: SITE_BASE_URL.to_string(),
            listing_type: ListingType::Renting,
            region: DEFAULT_REGION.to_string(),
            property_type: PropertyType::Apartment,
            rooms: DEFAULT_ROOMS.iter().map(|r| r.to_string()).collect(),
            price_min: Some(DEFAULT_PRICE_MIN),
            price_max: Some(DEFAULT_PRICE_MAX),
            size_min: Some(DEFAULT_SIZE_MIN),
            url_override: None,
        }
    }
}

impl SearchQuery {
    /// URL of the given 1-based results page.
    pub fn page_url(&self, page: u32) -> String {
        let first = match &self.url_override {
            Some(url) => ensure_trailing_slash(url.trim()),
            None => self.first_page_url(),
        };
        if page <= 1 {
            first
        } else {
            format!("{first}{page}/")
        }
    }

    fn first_page_url(&self) -> String {
        let mut segments = vec![
            format!("oglasi-{}", self.listing_type.slug()),
            self.region.trim_matches('/').to_string(),
            self.property_type.slug().to_string(),
        ];

        let rooms: Vec<&str> = self
            .rooms
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect();
        if !rooms.is_empty() {
            segments.push(rooms.join(","));
        }

        let filters = self.filter_segment();
        if !filters.is_empty() {
            segments.push(filters);
        }

        let segments: Vec<String> = segments.into_iter().filter(|s| !s.is_empty()).collect();
        format!(
            "{}/{}/",
            self.base_url.trim_end_matches('/'),
            segments.join("/")
        )
    }

    fn filter_segment(&self) -> String {
        let mut filters = Vec::new();

        let price_unit = match self.listing_type {
            ListingType::Renting => "eur-na-mesec",
            ListingType::Selling => "eur",
        };
        match (self.price_min, self.price_max) {
            (Some(min), Some(max)) => filters.push(format!("cena-od-{min}-do-{max}-{price_unit}")),
            (Some(min), None) => filters.push(format!("cena-od-{min}-{price_unit}")),
            (None, Some(max)) => filters.push(format!("cena-do-{max}-{price_unit}")),
            (None, None) => {}
        }

        if let Some(size) = self.size_min {
            filters.push(format!("velikost-od-{size}-m2"));
        }

        filters.join(",")
    }
}

fn ensure_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_query_builds_the_ljubljana_rental_search_url() {
        let query = SearchQuery::default();
        assert_eq!(
            query.page_url(1),
            "https://www.nepremicnine.net/oglasi-oddaja/ljubljana-mesto/stanovanje/\
             2-sobno,2.5-sobno,3-sobno,3.5-sobno,4-sobno,4.5-sobno,5-in-vecsobno,apartma/\
             cena-od-300-do-900-eur-na-mesec,velikost-od-30-m2/"
        );
    }

    #[test]
    fn later_pages_append_the_page_number() {
        let query = SearchQuery::default();
        assert!(query.page_url(3).ends_with("velikost-od-30-m2/3/"));
        assert_eq!(query.page_url(0), query.page_url(1));
    }

    #[test]
    fn selling_houses_without_filters() {
        let query = SearchQuery {
            listing_type: ListingType::Selling,
            property_type: PropertyType::House,
            region: "lj-okolica".to_string(),
            rooms: vec![],
            price_min: None,
            price_max: Some(450000),
            size_min: None,
            ..SearchQuery::default()
        };
        assert_eq!(
            query.page_url(1),
            "https://www.nepremicnine.net/oglasi-prodaja/lj-okolica/hisa/cena-do-450000-eur/"
        );
    }

    #[test]
    fn override_is_used_verbatim_for_the_first_page() {
        let query = SearchQuery {
            url_override: Some("https://www.nepremicnine.net/oglasi-oddaja/maribor".to_string()),
            ..SearchQuery::default()
        };
        assert_eq!(
            query.page_url(1),
            "https://www.nepremicnine.net/oglasi-oddaja/maribor/"
        );
        assert_eq!(
            query.page_url(2),
            "https://www.nepremicnine.net/oglasi-oddaja/maribor/2/"
        );
    }

    #[test]
    fn slugs_deserialize_from_site_names() {
        let query: SearchQuery =
            toml::from_str("listing_type = \"prodaja\"\nproperty_type = \"hisa\"").unwrap();
        assert_eq!(query.listing_type, ListingType::Selling);
        assert_eq!(query.property_type, PropertyType::House);
        assert_eq!(query.region, DEFAULT_REGION);
    }
}
