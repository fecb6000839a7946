use crate::app::ports::Notifier;
use crate::error::Result;
use crate::types::ListingNotice;
use async_trait::async_trait;
use tracing::info;

/// Writes announcements to the log instead of a channel.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_text(&self, content: &str) -> Result<()> {
        info!("{}", content);
        Ok(())
    }

    async fn send_listing(&self, notice: &ListingNotice) -> Result<()> {
        match notice {
            ListingNotice::New(listing) => info!(
                id = %listing.id,
                price = listing.price,
                url = %listing.url,
                "New listing: {}", listing.title
            ),
            ListingNotice::PriceChanged(change) => info!(
                id = %change.listing.id,
                previous = change.previous,
                price = change.listing.price,
                url = %change.listing.url,
                "Price changed: {}", change.listing.title
            ),
        }
        Ok(())
    }
}
