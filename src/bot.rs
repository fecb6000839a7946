use crate::app::ports::Notifier;
use crate::config::Config;
use crate::error::Result;
use crate::metrics::SpiderMetrics;
use crate::search::SearchQuery;
use crate::spider::{Spider, SpiderReport};
use crate::types::ListingNotice;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct BotOptions {
    pub interval: Duration,
    pub notify_price_changes: bool,
    pub announce_empty_runs: bool,
}

impl BotOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.schedule.interval_minutes * 60),
            notify_price_changes: config.discord.notify_price_changes,
            announce_empty_runs: config.schedule.announce_empty_runs,
        }
    }
}

/// Runs the spider on a schedule and announces what it finds.
pub struct Bot {
    spider: Spider,
    query: SearchQuery,
    notifier: Arc<dyn Notifier>,
    options: BotOptions,
}

impl Bot {
    pub fn new(
        spider: Spider,
        query: SearchQuery,
        notifier: Arc<dyn Notifier>,
        options: BotOptions,
    ) -> Self {
        Self {
            spider,
            query,
            notifier,
            options,
        }
    }

    /// One scrape followed by its announcements.
    ///
    /// Delivery failures are logged and counted but do not fail the run; the
    /// listings are already stored and will not be announced again.
    pub async fn run_once(&self) -> Result<SpiderReport> {
        let report = self.spider.run(&self.query).await?;

        let found = report.new_listings.len();
        if found > 0 || self.options.announce_empty_runs {
            self.deliver_text(&format!("Found {found} new listings.")).await;
        }

        for listing in &report.new_listings {
            self.deliver(&ListingNotice::New(listing.clone())).await;
        }

        if self.options.notify_price_changes {
            for change in &report.price_changes {
                self.deliver(&ListingNotice::PriceChanged(change.clone())).await;
            }
        }

        Ok(report)
    }

    /// Runs until `shutdown` resolves. The first run starts immediately.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.notifier.wait_until_ready().await?;
        info!(
            interval_secs = self.options.interval.as_secs(),
            "Bot ready, starting scheduled scraping"
        );

        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping bot");
                    break;
                }
                _ = ticker.tick() => {
                    // A run in progress is abandoned on shutdown; saved listings stay saved
                    tokio::select! {
                        _ = &mut shutdown => {
                            info!("Shutdown requested during a run, stopping bot");
                            break;
                        }
                        result = self.run_once() => match result {
                            Ok(report) => info!(
                                new = report.new_listings.len(),
                                price_changes = report.price_changes.len(),
                                "Scheduled run complete"
                            ),
                            Err(e) => {
                                SpiderMetrics::record_run_failure();
                                error!(error = %e, "Scheduled run failed");
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn deliver_text(&self, content: &str) {
        if let Err(e) = self.notifier.send_text(content).await {
            SpiderMetrics::record_notification_failure();
            warn!(error = %e, "Failed to send summary");
        }
    }

    async fn deliver(&self, notice: &ListingNotice) {
        if let Err(e) = self.notifier.send_listing(notice).await {
            SpiderMetrics::record_notification_failure();
            warn!(listing_id = %notice.listing().id, error = %e, "Failed to announce listing");
        }
    }
}
