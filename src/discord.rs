//! Discord delivery over the REST API.
//!
//! The bot never opens a gateway connection: it only needs to post into one
//! channel, which the REST endpoint `POST /channels/{id}/messages` covers with
//! a bot token. Each listing goes out as its own message with one embed.

use crate::app::ports::Notifier;
use crate::constants::{
    DISCORD_MAX_ATTEMPTS, EMBED_COLOR_NEW, EMBED_COLOR_PRICE_CHANGE, EMBED_DESCRIPTION_LIMIT,
    EMBED_TITLE_LIMIT, MISSING_VALUE,
};
use crate::error::{BotError, Result};
use crate::types::{Listing, ListingNotice};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

pub struct DiscordNotifier {
    client: reqwest::Client,
    api_base: String,
    channel_id: String,
    token: String,
}

impl DiscordNotifier {
    pub fn new(token: &str, channel_id: &str, api_base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            channel_id: channel_id.to_string(),
            token: token.to_string(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// The bot's own account; fails when the token is rejected.
    pub async fn current_user(&self) -> Result<DiscordUser> {
        let resp = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .header(AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BotError::Discord {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json().await?)
    }

    /// Posts a message body, waiting out rate limits.
    pub async fn post_message(&self, body: &Value) -> Result<()> {
        let url = format!("{}/channels/{}/messages", self.api_base, self.channel_id);

        for attempt in 1..=DISCORD_MAX_ATTEMPTS {
            let resp = self
                .client
                .post(&url)
                .header(AUTHORIZATION, self.auth_header())
                .json(body)
                .send()
                .await?;
            let status = resp.status();

            if status.is_success() {
                return Ok(());
            }

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < DISCORD_MAX_ATTEMPTS {
                let header_wait = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<f64>().ok());
                let text = resp.text().await.unwrap_or_default();
                let wait = serde_json::from_str::<RateLimited>(&text)
                    .map(|r| r.retry_after)
                    .ok()
                    .or(header_wait)
                    .unwrap_or(1.0);
                warn!(attempt, wait_secs = wait, "Rate limited by Discord, retrying");
                tokio::time::sleep(Duration::from_secs_f64(wait.clamp(0.0, 60.0))).await;
                continue;
            }

            let message = resp.text().await.unwrap_or_default();
            return Err(BotError::Discord {
                status: status.as_u16(),
                message,
            });
        }

        Err(BotError::Discord {
            status: StatusCode::TOO_MANY_REQUESTS.as_u16(),
            message: format!("still rate limited after {DISCORD_MAX_ATTEMPTS} attempts"),
        })
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn wait_until_ready(&self) -> Result<()> {
        let user = self.current_user().await?;
        info!("Logged in as {} (ID: {})", user.username, user.id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn send_text(&self, content: &str) -> Result<()> {
        self.post_message(&json!({ "content": content })).await
    }

    #[instrument(skip(self, notice), fields(listing_id = %notice.listing().id))]
    async fn send_listing(&self, notice: &ListingNotice) -> Result<()> {
        self.post_message(&json!({ "embeds": [listing_embed(notice)] }))
            .await
    }
}

/// Builds the embed announcing a listing.
pub fn listing_embed(notice: &ListingNotice) -> Value {
    let listing = notice.listing();

    let (color, description) = match notice {
        ListingNotice::New(_) => (EMBED_COLOR_NEW, listing.description.clone()),
        ListingNotice::PriceChanged(change) => {
            let line = format!(
                "Cena spremenjena: {} → {}",
                format_price(change.previous),
                format_price(listing.price)
            );
            let description = match &listing.description {
                Some(d) => format!("{line}\n\n{d}"),
                None => line,
            };
            (EMBED_COLOR_PRICE_CHANGE, Some(description))
        }
    };

    let mut fields = listing_fields(listing);
    if let ListingNotice::PriceChanged(change) = notice {
        fields.push(field("**Prejšnja cena**", format_price(change.previous)));
    }

    let mut embed = json!({
        "title": truncate(&listing.title, EMBED_TITLE_LIMIT),
        "url": listing.url,
        "color": color,
        "fields": fields,
    });
    if let Some(description) = description {
        embed["description"] = json!(truncate(&description, EMBED_DESCRIPTION_LIMIT));
    }
    if let Some(image) = &listing.image_url {
        embed["image"] = json!({ "url": image });
    }
    embed
}

fn listing_fields(listing: &Listing) -> Vec<Value> {
    vec![
        field("**Cena**", format_price(listing.price)),
        field(
            "**Velikost**",
            listing
                .size_m2
                .map(|s| format!("{s:.2} m²"))
                .unwrap_or_else(|| MISSING_VALUE.to_string()),
        ),
        field(
            "**Zgrajeno leta**",
            listing
                .year_built
                .map(|y| y.to_string())
                .unwrap_or_else(|| MISSING_VALUE.to_string()),
        ),
        field(
            "**Nadstropje**",
            listing
                .floor
                .clone()
                .unwrap_or_else(|| MISSING_VALUE.to_string()),
        ),
    ]
}

fn field(name: &str, value: String) -> Value {
    json!({ "name": name, "value": value, "inline": true })
}

pub fn format_price(price: f64) -> String {
    format!("{price:.2} €")
}

/// Cuts `text` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Masks a token for display, keeping only its ends.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() >= 15 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}
