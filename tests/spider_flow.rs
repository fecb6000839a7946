use async_trait::async_trait;
use nepremicnine_bot::app::ports::{Notifier, PageSource};
use nepremicnine_bot::bot::{Bot, BotOptions};
use nepremicnine_bot::db::SqliteStore;
use nepremicnine_bot::error::{BotError, Result};
use nepremicnine_bot::rate_limiter::{Limits, RateLimiter};
use nepremicnine_bot::search::SearchQuery;
use nepremicnine_bot::spider::Spider;
use nepremicnine_bot::storage::ListingStore;
use nepremicnine_bot::types::ListingNotice;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FIRST_PAGE: &str = include_str!("fixtures/listings_page.html");
const LAST_PAGE: &str = include_str!("fixtures/last_page.html");

struct FixtureSource {
    pages: Mutex<HashMap<String, String>>,
}

impl FixtureSource {
    fn new(query: &SearchQuery) -> Self {
        let pages = HashMap::from([
            (query.page_url(1), FIRST_PAGE.to_string()),
            (query.page_url(2), LAST_PAGE.to_string()),
        ]);
        Self {
            pages: Mutex::new(pages),
        }
    }

    fn edit(&self, page: &str, from: &str, to: &str) {
        let mut pages = self.pages.lock().unwrap();
        let html = pages.get_mut(page).unwrap();
        *html = html.replace(from, to);
    }
}

#[async_trait]
impl PageSource for FixtureSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| BotError::Api {
                message: format!("GET {url} returned 404 Not Found"),
            })
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

#[derive(Default)]
struct ChannelLog {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for ChannelLog {
    async fn send_text(&self, content: &str) -> Result<()> {
        self.messages.lock().unwrap().push(content.to_string());
        Ok(())
    }

    async fn send_listing(&self, notice: &ListingNotice) -> Result<()> {
        let line = match notice {
            ListingNotice::New(l) => format!("new {} {:.2}", l.id, l.price),
            ListingNotice::PriceChanged(c) => {
                format!("changed {} {:.2} -> {:.2}", c.listing.id, c.previous, c.listing.price)
            }
        };
        self.messages.lock().unwrap().push(line);
        Ok(())
    }
}

impl ChannelLog {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }
}

fn bot(source: Arc<FixtureSource>, store: SqliteStore, channel: Arc<ChannelLog>) -> Bot {
    let limiter = RateLimiter::new(Limits {
        requests_per_min: 60_000,
        burst: 5,
    });
    let spider = Spider::new(source, Arc::new(store), limiter, 5);
    Bot::new(
        spider,
        SearchQuery::default(),
        channel,
        BotOptions {
            interval: Duration::from_secs(3600),
            notify_price_changes: true,
            announce_empty_runs: false,
        },
    )
}

#[tokio::test]
async fn scrape_store_and_announce_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("nepremicnine_database.sqlite")).unwrap();
    let query = SearchQuery::default();
    let source = Arc::new(FixtureSource::new(&query));
    let channel = Arc::new(ChannelLog::default());

    // First run: everything parseable is new
    let report = bot(source.clone(), store.clone(), channel.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.pages_visited, 2);
    assert_eq!(report.listings_seen, 3);
    assert_eq!(report.errors.len(), 1, "the card without a price is skipped");
    assert_eq!(
        channel.take(),
        vec![
            "Found 3 new listings.",
            "new 6812345 850.00",
            "new 6790011 690.00",
            "new 6755555 1250.00",
        ]
    );

    let stored = store.get_listing("6812345").await.unwrap().unwrap();
    assert_eq!(stored.listing.size_m2, Some(55.0));
    assert_eq!(stored.listing.year_built, Some(2005));
    assert_eq!(stored.listing.floor.as_deref(), Some("3/4"));
    assert_eq!(
        stored.listing.image_url.as_deref(),
        Some("https://img.nepremicnine.net/slonep_oglasi2/14523872.jpg")
    );

    // Second run: nothing changed, nothing said
    let report = bot(source.clone(), store.clone(), channel.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.unchanged, 3);
    assert!(channel.take().is_empty());

    // Third run: one listing got cheaper
    source.edit(&query.page_url(1), r#"content="690""#, r#"content="650""#);
    let report = bot(source.clone(), store.clone(), channel.clone())
        .run_once()
        .await
        .unwrap();
    assert_eq!(report.price_changes.len(), 1);
    assert_eq!(channel.take(), vec!["changed 6790011 690.00 -> 650.00"]);

    let history = store.price_history("6790011").await.unwrap();
    let prices: Vec<f64> = history.iter().map(|p| p.price).collect();
    assert_eq!(prices, vec![690.0, 650.0]);
    assert_eq!(store.count_listings().await.unwrap(), 3);
}
