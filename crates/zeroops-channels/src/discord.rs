//! Discord transport — outbound calls over the Discord HTTP API.
//!
//! Only the REST side lives here. Inbound events reach the relay through an
//! [`EventFeed`](crate::feed::EventFeed).

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;

use zeroops_core::config::DiscordConfig;
use zeroops_core::error::{RelayError, Result};
use zeroops_core::traits::ChatTransport;

/// Discord rejects thread names longer than this.
const MAX_THREAD_NAME: usize = 100;

pub struct DiscordRest {
    client: reqwest::Client,
    token: String,
    api_base: Url,
}

impl DiscordRest {
    pub fn new(token: &str, api_base: &str) -> Result<Self> {
        let api_base = Url::parse(api_base)
            .map_err(|e| RelayError::Config(format!("invalid Discord API base '{api_base}': {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(RelayError::Config(format!(
                "Discord API base '{api_base}' cannot take a path"
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("DiscordBot (zeroops, ", env!("CARGO_PKG_VERSION"), ")"))
            .build()
            .map_err(|e| RelayError::Channel(format!("Discord client init failed: {e}")))?;

        Ok(Self {
            client,
            token: token.to_string(),
            api_base,
        })
    }

    pub fn from_config(config: &DiscordConfig) -> Result<Self> {
        Self::new(&config.token, &config.api_base)
    }

    /// `api_base` plus percent-encoded path segments.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn call(
        &self,
        op: &str,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .request(method, url)
            .header("Authorization", format!("Bot {}", self.token));
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("Discord {op} failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("⚠️ Discord rate limited {}", op);
        }
        let text = response.text().await.unwrap_or_default();
        Err(RelayError::Channel(format!(
            "Discord {op} failed: {status}: {}",
            text.trim()
        )))
    }

    async fn call_for_id(
        &self,
        op: &str,
        url: Url,
        body: serde_json::Value,
    ) -> Result<String> {
        let response = self.call(op, Method::POST, url, Some(body)).await?;
        let created: Snowflake = response
            .json()
            .await
            .map_err(|e| RelayError::Channel(format!("Invalid Discord {op} response: {e}")))?;
        Ok(created.id)
    }

    /// The bot's own user, for mention detection.
    pub async fn current_user(&self) -> Result<DiscordUser> {
        let response = self
            .call("get current user", Method::GET, self.endpoint(&["users", "@me"]), None)
            .await?;
        response
            .json()
            .await
            .map_err(|e| RelayError::Channel(format!("Invalid Discord user response: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct Snowflake {
    id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
}

#[async_trait]
impl ChatTransport for DiscordRest {
    fn name(&self) -> &str {
        "discord"
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String> {
        let url = self.endpoint(&["channels", channel_id, "messages"]);
        self.call_for_id("send message", url, serde_json::json!({ "content": content }))
            .await
    }

    async fn create_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        name: &str,
        auto_archive_minutes: u32,
    ) -> Result<String> {
        let url = self.endpoint(&["channels", channel_id, "messages", message_id, "threads"]);
        let name: String = name.chars().take(MAX_THREAD_NAME).collect();
        let thread_id = self
            .call_for_id(
                "create thread",
                url,
                serde_json::json!({
                    "name": name,
                    "auto_archive_duration": auto_archive_minutes,
                }),
            )
            .await?;
        tracing::debug!("Thread {} started from message {}", thread_id, message_id);
        Ok(thread_id)
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        let url = self.endpoint(&[
            "channels", channel_id, "messages", message_id, "reactions", emoji, "@me",
        ]);
        self.call("add reaction", Method::PUT, url, None).await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let url = self.endpoint(&[
            "channels", channel_id, "messages", message_id, "reactions", emoji, "@me",
        ]);
        self.call("remove reaction", Method::DELETE, url, None).await?;
        Ok(())
    }
}
