//! Prometheus metrics for scrape runs and notifications.
//!
//! Recording goes through the `metrics` facade, so the calls are no-ops until
//! `init_metrics` installs the exporter.

use ::metrics::{counter, describe_counter, describe_histogram, histogram};
use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

pub const SPIDER_RUNS: &str = "nepremicnine_spider_runs_total";
pub const PAGES_FETCHED: &str = "nepremicnine_pages_fetched_total";
pub const LISTINGS_SEEN: &str = "nepremicnine_listings_seen_total";
pub const LISTINGS_NEW: &str = "nepremicnine_listings_new_total";
pub const PRICE_CHANGES: &str = "nepremicnine_price_changes_total";
pub const PARSE_ERRORS: &str = "nepremicnine_parse_errors_total";
pub const RUN_FAILURES: &str = "nepremicnine_run_failures_total";
pub const NOTIFICATIONS_FAILED: &str = "nepremicnine_notifications_failed_total";
pub const RUN_DURATION: &str = "nepremicnine_spider_run_duration_seconds";

static INIT: Once = Once::new();

/// Installs the Prometheus exporter on `0.0.0.0:port`. Does nothing without a
/// port, and only the first call has any effect.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else {
        return;
    };
    INIT.call_once(|| {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => {
                describe_all();
                info!("Prometheus exporter listening on http://{}/metrics", addr);
            }
            Err(e) => warn!("Prometheus exporter install failed: {}", e),
        }
    });
}

fn describe_all() {
    describe_counter!(SPIDER_RUNS, "Completed spider runs");
    describe_counter!(PAGES_FETCHED, "Search result pages fetched");
    describe_counter!(LISTINGS_SEEN, "Listings parsed from result pages");
    describe_counter!(LISTINGS_NEW, "Listings stored for the first time");
    describe_counter!(PRICE_CHANGES, "Listings whose price moved");
    describe_counter!(PARSE_ERRORS, "Result cards or pages that could not be used");
    describe_counter!(RUN_FAILURES, "Spider runs that failed outright");
    describe_counter!(NOTIFICATIONS_FAILED, "Messages that could not be delivered");
    describe_histogram!(RUN_DURATION, "Wall time of a spider run");
}

/// Recorders for the spider and the bot loop
pub struct SpiderMetrics;

impl SpiderMetrics {
    pub fn record_page(parse_errors: usize) {
        counter!(PAGES_FETCHED).increment(1);
        if parse_errors > 0 {
            counter!(PARSE_ERRORS).increment(parse_errors as u64);
        }
    }

    /// `listings_seen` counts distinct listings, as in the run report.
    pub fn record_run(
        listings_seen: usize,
        new_listings: usize,
        price_changes: usize,
        duration_secs: f64,
    ) {
        counter!(SPIDER_RUNS).increment(1);
        counter!(LISTINGS_SEEN).increment(listings_seen as u64);
        counter!(LISTINGS_NEW).increment(new_listings as u64);
        counter!(PRICE_CHANGES).increment(price_changes as u64);
        histogram!(RUN_DURATION).record(duration_secs);
    }

    pub fn record_run_failure() {
        counter!(RUN_FAILURES).increment(1);
    }

    pub fn record_notification_failure() {
        counter!(NOTIFICATIONS_FAILED).increment(1);
    }
}
