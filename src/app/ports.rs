use async_trait::async_trait;

use crate::error::Result;
use crate::types::ListingNotice;

/// Fetches the rendered HTML of a search results page
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;

    fn name(&self) -> &str;
}

/// Where announcements go
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Resolves once the notifier can deliver messages.
    async fn wait_until_ready(&self) -> Result<()> {
        Ok(())
    }

    async fn send_text(&self, content: &str) -> Result<()>;

    async fn send_listing(&self, notice: &ListingNotice) -> Result<()>;
}
