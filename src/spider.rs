use crate::app::ports::PageSource;
use crate::error::Result;
use crate::metrics::SpiderMetrics;
use crate::parser::ListingParser;
use crate::rate_limiter::RateLimiter;
use crate::search::SearchQuery;
use crate::storage::ListingStore;
use crate::types::{Listing, PriceChange, SaveOutcome};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Result of one pass over the search results
#[derive(Debug, Default, Serialize)]
pub struct SpiderReport {
    pub pages_visited: u32,
    pub listings_seen: usize,
    pub new_listings: Vec<Listing>,
    pub price_changes: Vec<PriceChange>,
    pub unchanged: usize,
    /// Skipped cards and pages, for the run log
    pub errors: Vec<String>,
}

/// Walks the paged search results and records what it finds.
pub struct Spider {
    source: Arc<dyn PageSource>,
    store: Arc<dyn ListingStore>,
    limiter: RateLimiter,
    max_pages: u32,
}

impl Spider {
    pub fn new(
        source: Arc<dyn PageSource>,
        store: Arc<dyn ListingStore>,
        limiter: RateLimiter,
        max_pages: u32,
    ) -> Self {
        Self {
            source,
            store,
            limiter,
            max_pages: max_pages.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn ListingStore> {
        &self.store
    }

    #[instrument(skip(self, query), fields(source = %self.source.name()))]
    pub async fn run(&self, query: &SearchQuery) -> Result<SpiderReport> {
        let started = Instant::now();
        let run_at = Utc::now();
        let mut report = SpiderReport::default();
        let mut seen_ids = HashSet::new();

        for page in 1..=self.max_pages {
            let url = query.page_url(page);
            self.limiter.acquire().await;

            let html = match self.source.fetch(&url).await {
                Ok(html) => html,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(page, url = %url, error = %e, "Page fetch failed, stopping here");
                    report.errors.push(format!("page {page}: {e}"));
                    break;
                }
            };
            report.pages_visited += 1;

            let parsed = ListingParser::parse_page(&html, &url)?;
            SpiderMetrics::record_page(parsed.errors.len());
            report
                .errors
                .extend(parsed.errors.iter().map(|e| format!("page {page}: {e}")));
            debug!(
                page,
                cards = parsed.cards_found,
                listings = parsed.listings.len(),
                "Parsed results page"
            );

            if parsed.cards_found == 0 {
                info!(page, "No listings on page, stopping");
                break;
            }

            for listing in parsed.listings {
                if !seen_ids.insert(listing.id.clone()) {
                    continue;
                }
                report.listings_seen += 1;
                match self.store.save_listing(&listing, run_at).await? {
                    SaveOutcome::New => report.new_listings.push(listing),
                    SaveOutcome::PriceChanged { previous } => {
                        report.price_changes.push(PriceChange { listing, previous })
                    }
                    SaveOutcome::Unchanged => report.unchanged += 1,
                }
            }

            if !parsed.has_next_page {
                break;
            }
        }

        SpiderMetrics::record_run(
            report.listings_seen,
            report.new_listings.len(),
            report.price_changes.len(),
            started.elapsed().as_secs_f64(),
        );
        info!(
            pages = report.pages_visited,
            seen = report.listings_seen,
            new = report.new_listings.len(),
            price_changes = report.price_changes.len(),
            errors = report.errors.len(),
            "Spider run finished"
        );
        Ok(report)
    }
}
