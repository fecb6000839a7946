use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A listing card as scraped from a search results page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    /// EUR; monthly rent for rentals
    pub price: f64,
    pub size_m2: Option<f64>,
    pub year_built: Option<i32>,
    pub floor: Option<String>,
}

/// A listing as persisted, with the times it was first and last seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredListing {
    pub listing: Listing,
    pub first_seen: DateTime<Utc>,
    pub accessed_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub accessed_time: DateTime<Utc>,
}

/// What saving a scraped listing did to the store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SaveOutcome {
    New,
    PriceChanged { previous: f64 },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceChange {
    pub listing: Listing,
    pub previous: f64,
}

/// Something worth telling the channel about
#[derive(Debug, Clone, PartialEq)]
pub enum ListingNotice {
    New(Listing),
    PriceChanged(PriceChange),
}

impl ListingNotice {
    pub fn listing(&self) -> &Listing {
        match self {
            ListingNotice::New(listing) => listing,
            ListingNotice::PriceChanged(change) => &change.listing,
        }
    }
}

/// Prices closer than a cent are the same price
pub fn prices_differ(a: f64, b: f64) -> bool {
    (a - b).abs() >= 0.005
}
