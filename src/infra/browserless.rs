//! Page rendering through a browserless Chromium service.
//!
//! The service is addressed by `CHROME_URL`, usually its websocket endpoint
//! (`ws://browser:3000`). Its REST API lives on the same host and port, so
//! the scheme is mapped to HTTP and the `/content` endpoint is used to get
//! the fully rendered HTML of a page. Any `token` query parameter is kept.

use crate::app::ports::PageSource;
use crate::constants::REJECTED_RESOURCE_TYPES;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct BrowserlessPageSource {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser")]
    pub browser: String,
}

impl BrowserlessPageSource {
    pub fn new(chrome_url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = http_endpoint(chrome_url)?;
        // Leave headroom over the in-browser navigation timeout
        let client = reqwest::Client::builder()
            .timeout(timeout + Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Asks the service for its browser version; used as a health check.
    pub async fn ping(&self) -> Result<BrowserVersion> {
        let url = endpoint_path(&self.endpoint, "json/version");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BotError::Browser {
                message: format!("version endpoint returned {status}"),
            });
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl PageSource for BrowserlessPageSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, endpoint = %self.endpoint, "Rendering page in browser service");
        let resp = self
            .client
            .post(endpoint_path(&self.endpoint, "content"))
            .json(&content_request(url, self.timeout))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Browser {
                message: format!("rendering {url} failed with {status}: {}", body.trim()),
            });
        }
        Ok(resp.text().await?)
    }

    fn name(&self) -> &str {
        "browserless"
    }
}

/// Maps a websocket endpoint onto the service's HTTP API.
pub fn http_endpoint(chrome_url: &str) -> Result<Url> {
    let mut url = Url::parse(chrome_url.trim()).map_err(|e| BotError::Browser {
        message: format!("invalid CHROME_URL '{chrome_url}': {e}"),
    })?;
    let scheme = match url.scheme() {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(BotError::Browser {
                message: format!("unsupported CHROME_URL scheme '{other}'"),
            })
        }
    };
    url.set_scheme(scheme).map_err(|_| BotError::Browser {
        message: format!("cannot use '{chrome_url}' over {scheme}"),
    })?;
    Ok(url)
}

fn endpoint_path(endpoint: &Url, path: &str) -> Url {
    let mut url = endpoint.clone();
    let base = endpoint.path().trim_end_matches('/').to_string();
    url.set_path(&format!("{base}/{path}"));
    url
}

fn content_request(url: &str, timeout: Duration) -> Value {
    json!({
        "url": url,
        "gotoOptions": {
            "waitUntil": "domcontentloaded",
            "timeout": timeout.as_millis() as u64,
        },
        "rejectResourceTypes": REJECTED_RESOURCE_TYPES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_endpoints_map_to_http() {
        assert_eq!(
            http_endpoint("ws://browser:3000").unwrap().as_str(),
            "http://browser:3000/"
        );
        assert_eq!(
            http_endpoint("wss://chrome.example.com?token=secret").unwrap().as_str(),
            "https://chrome.example.com/?token=secret"
        );
        assert_eq!(
            http_endpoint("http://localhost:3000").unwrap().as_str(),
            "http://localhost:3000/"
        );
    }

    #[test]
    fn unsupported_schemes_are_rejected() {
        assert!(matches!(
            http_endpoint("ftp://browser:3000"),
            Err(BotError::Browser { .. })
        ));
        assert!(http_endpoint("not a url").is_err());
    }

    #[test]
    fn paths_keep_prefix_and_token() {
        let endpoint = http_endpoint("wss://host/chromium?token=t").unwrap();
        assert_eq!(
            endpoint_path(&endpoint, "content").as_str(),
            "https://host/chromium/content?token=t"
        );
        let endpoint = http_endpoint("ws://browser:3000").unwrap();
        assert_eq!(
            endpoint_path(&endpoint, "json/version").as_str(),
            "http://browser:3000/json/version"
        );
    }

    #[test]
    fn content_request_blocks_heavy_resources() {
        let body = content_request("https://www.nepremicnine.net/", Duration::from_secs(30));
        assert_eq!(body["url"], "https://www.nepremicnine.net/");
        assert_eq!(body["gotoOptions"]["timeout"], 30000);
        assert_eq!(body["gotoOptions"]["waitUntil"], "domcontentloaded");
        let rejected = body["rejectResourceTypes"].as_array().unwrap();
        assert!(rejected.iter().any(|t| t == "image"));
    }
}
