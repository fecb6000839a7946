use crate::app::ports::PageSource;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;
use tracing::debug;

/// Fetches pages with a plain HTTP client.
pub struct HttpPageSource {
    client: reqwest::Client,
}

impl HttpPageSource {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, "Fetching page over HTTP");
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, "text/html,application/xhtml+xml")
            .header(ACCEPT_LANGUAGE, "sl-SI,sl;q=0.9,en;q=0.5")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Api {
                message: format!("GET {url} returned {status}"),
            });
        }
        Ok(resp.text().await?)
    }

    fn name(&self) -> &str {
        "http"
    }
}
