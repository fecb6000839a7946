use crate::error::Result;
use crate::types::{prices_differ, Listing, PricePoint, SaveOutcome, StoredListing};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Persistence for scraped listings and their price history
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Inserts or refreshes a listing, matched by id or url.
    ///
    /// A price point is recorded for new listings and whenever the price moved
    /// since the last recorded point.
    async fn save_listing(&self, listing: &Listing, seen_at: DateTime<Utc>) -> Result<SaveOutcome>;

    async fn get_listing(&self, id: &str) -> Result<Option<StoredListing>>;

    /// Oldest first
    async fn price_history(&self, id: &str) -> Result<Vec<PricePoint>>;

    /// Most recently seen first
    async fn recent_listings(&self, limit: usize) -> Result<Vec<StoredListing>>;

    async fn count_listings(&self) -> Result<usize>;
}

#[derive(Default)]
struct MemoryState {
    listings: HashMap<String, StoredListing>,
    history: HashMap<String, Vec<PricePoint>>,
}

/// In-memory store for dry runs and tests
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means another test thread panicked mid-write
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ListingStore for InMemoryStore {
    async fn save_listing(&self, listing: &Listing, seen_at: DateTime<Utc>) -> Result<SaveOutcome> {
        let mut state = self.lock();

        let existing_id = if state.listings.contains_key(&listing.id) {
            Some(listing.id.clone())
        } else {
            state
                .listings
                .values()
                .find(|s| s.listing.url == listing.url)
                .map(|s| s.listing.id.clone())
        };

        let Some(id) = existing_id else {
            state.listings.insert(
                listing.id.clone(),
                StoredListing {
                    listing: listing.clone(),
                    first_seen: seen_at,
                    accessed_time: seen_at,
                },
            );
            state.history.insert(
                listing.id.clone(),
                vec![PricePoint {
                    price: listing.price,
                    accessed_time: seen_at,
                }],
            );
            debug!(id = %listing.id, "Created listing");
            return Ok(SaveOutcome::New);
        };

        let last_price = state
            .history
            .get(&id)
            .and_then(|points| points.last())
            .map(|p| p.price);

        // The url stays unique: keep the stored one if another listing owns the new url
        let url_taken = state
            .listings
            .values()
            .any(|s| s.listing.url == listing.url && s.listing.id != id);

        if let Some(stored) = state.listings.get_mut(&id) {
            let url = if url_taken {
                stored.listing.url.clone()
            } else {
                listing.url.clone()
            };
            stored.listing = Listing {
                id: stored.listing.id.clone(),
                url,
                ..listing.clone()
            };
            stored.accessed_time = seen_at;
        }

        match last_price {
            Some(previous) if !prices_differ(previous, listing.price) => Ok(SaveOutcome::Unchanged),
            previous => {
                state.history.entry(id.clone()).or_default().push(PricePoint {
                    price: listing.price,
                    accessed_time: seen_at,
                });
                debug!(id = %id, "Recorded price change");
                match previous {
                    Some(previous) => Ok(SaveOutcome::PriceChanged { previous }),
                    None => Ok(SaveOutcome::Unchanged),
                }
            }
        }
    }

    async fn get_listing(&self, id: &str) -> Result<Option<StoredListing>> {
        Ok(self.lock().listings.get(id).cloned())
    }

    async fn price_history(&self, id: &str) -> Result<Vec<PricePoint>> {
        Ok(self.lock().history.get(id).cloned().unwrap_or_default())
    }

    async fn recent_listings(&self, limit: usize) -> Result<Vec<StoredListing>> {
        let state = self.lock();
        let mut listings: Vec<StoredListing> = state.listings.values().cloned().collect();
        listings.sort_by(|a, b| {
            b.accessed_time
                .cmp(&a.accessed_time)
                .then_with(|| a.listing.id.cmp(&b.listing.id))
        });
        listings.truncate(limit);
        Ok(listings)
    }

    async fn count_listings(&self) -> Result<usize> {
        Ok(self.lock().listings.len())
    }
}
