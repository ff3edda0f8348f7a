//! Discord Channel Implementation
//!
//! Vote surface backed by the Discord Bot REST API.
//! Posts tally embeds with keycap buttons, edits them as votes arrive,
//! and answers button interactions with ephemeral replies.

use super::surface::{ChannelError, ChannelResult, VoteSurface};
use crate::polls::config::KEYCAP_GLYPHS;
use crate::polls::intake::{VoteInteraction, VOTE_ACTION};
use crate::polls::render::TallyEmbed;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Discord REST API base URL
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Interaction callback type for "reply with a message"
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;

/// Message flag marking a reply as visible only to the invoking user
const EPHEMERAL_FLAG: u64 = 1 << 6;

/// Discord allows at most five buttons per action row
const BUTTONS_PER_ROW: usize = 5;

/// Discord channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token from Discord Developer Portal
    pub bot_token: String,
    /// REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    DISCORD_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl DiscordConfig {
    /// Create a configuration for the given bot token
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Discord-backed vote surface
#[derive(Debug)]
pub struct DiscordChannel {
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordChannel {
    /// Create a new Discord channel
    pub fn new(config: DiscordConfig) -> ChannelResult<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(ChannelError::InvalidConfig("bot token is empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChannelError::InvalidConfig(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), endpoint)
    }

    /// Send a request and check the status, leaving the body unread
    async fn send(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: serde_json::Value,
    ) -> ChannelResult<reqwest::Response> {
        let response = self
            .client
            .request(method, self.url(endpoint))
            .header("Authorization", format!("Bot {}", self.config.bot_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64)
                .unwrap_or(1);
            return Err(ChannelError::RateLimited(retry_after));
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ChannelError::MessageNotFound(body));
        }

        Err(ChannelError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Send a request to the Discord API and decode the JSON response
    async fn api_request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: serde_json::Value,
    ) -> ChannelResult<T> {
        self.send(method, endpoint, body)
            .await?
            .json()
            .await
            .map_err(|e| ChannelError::Parse(e.to_string()))
    }
}

#[async_trait]
impl VoteSurface for DiscordChannel {
    async fn post_tally(
        &self,
        channel_id: &str,
        embed: &TallyEmbed,
        option_count: usize,
    ) -> ChannelResult<String> {
        let body = serde_json::json!({
            "embeds": [embed],
            "components": vote_buttons(option_count),
        });

        let message: DiscordMessageResponse = self
            .api_request(
                reqwest::Method::POST,
                &format!("channels/{}/messages", channel_id),
                body,
            )
            .await?;

        info!(channel_id = %channel_id, message_id = %message.id, "Posted vote message");
        Ok(message.id)
    }

    async fn edit_tally(
        &self,
        channel_id: &str,
        message_id: &str,
        embed: &TallyEmbed,
    ) -> ChannelResult<()> {
        let body = serde_json::json!({ "embeds": [embed] });
        self.send(
            reqwest::Method::PATCH,
            &format!("channels/{}/messages/{}", channel_id, message_id),
            body,
        )
        .await?;

        debug!(channel_id = %channel_id, message_id = %message_id, "Edited vote message");
        Ok(())
    }

    async fn reply_private(
        &self,
        interaction: &VoteInteraction,
        text: &str,
    ) -> ChannelResult<()> {
        self.send(
            reqwest::Method::POST,
            &format!(
                "interactions/{}/{}/callback",
                interaction.interaction_id, interaction.interaction_token
            ),
            ephemeral_reply(text),
        )
        .await?;
        Ok(())
    }
}

/// Body of an ephemeral interaction reply
fn ephemeral_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": CHANNEL_MESSAGE_WITH_SOURCE,
        "data": {
            "content": text,
            "flags": EPHEMERAL_FLAG,
        },
    })
}

/// Action rows holding one vote button per option
fn vote_buttons(option_count: usize) -> Vec<serde_json::Value> {
    let buttons: Vec<DiscordComponent> = (0..option_count.min(KEYCAP_GLYPHS.len()))
        .map(DiscordComponent::vote_button)
        .collect();

    buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            serde_json::json!({
                "type": 1,
                "components": row.iter().map(DiscordComponent::to_json).collect::<Vec<_>>(),
            })
        })
        .collect()
}

// Discord API response types
#[derive(Debug, Deserialize)]
struct DiscordMessageResponse {
    id: String,
}

#[derive(Debug, Clone)]
struct DiscordComponent {
    component_type: u8,
    custom_id: String,
    style: Option<u8>,
    label: Option<String>,
    emoji: Option<DiscordEmoji>,
}

impl DiscordComponent {
    fn vote_button(ordinal: usize) -> Self {
        Self {
            component_type: 2,
            custom_id: format!("{}_{}", VOTE_ACTION, ordinal),
            style: Some(1),
            label: Some(format!("Image {}", ordinal + 1)),
            emoji: KEYCAP_GLYPHS.get(ordinal).map(|glyph| DiscordEmoji {
                id: None,
                name: glyph.to_string(),
            }),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.component_type,
            "custom_id": self.custom_id,
            "style": self.style,
            "label": self.label,
            "emoji": self.emoji,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiscordEmoji {
    id: Option<String>,
    name: String,
}
