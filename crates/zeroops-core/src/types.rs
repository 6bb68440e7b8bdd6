//! Wire and event types shared across crates.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Repository metadata attached to jobs so the automation engine knows
/// which codebases exist on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMeta {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path: String,
}

impl RepoMeta {
    /// Render as a single `- name (path): description` line.
    pub fn render_line(&self) -> String {
        format!("- {} ({}): {}", self.name, self.path, self.description)
    }
}

/// Job descriptor POSTed to the automation webhook.
///
/// `timestamp` and `source` are stamped by the dispatch client at send time;
/// whatever the caller puts there is overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub command: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_name: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thread_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<RepoMeta>,
}

impl JobPayload {
    /// Start a payload of the given job type (`"command"`, `"mention"`,
    /// `"message"`, `"schedule"`).
    pub fn new(kind: &str, channel_id: &str) -> Self {
        Self {
            kind: kind.to_string(),
            channel_id: channel_id.to_string(),
            ..Default::default()
        }
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = command.to_string();
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_user(mut self, user_id: &str, user_name: &str) -> Self {
        self.user_id = user_id.to_string();
        self.user_name = user_name.to_string();
        self
    }

    pub fn with_repos(mut self, repos: Vec<RepoMeta>) -> Self {
        self.repos = repos;
        self
    }
}

/// Result returned by the automation engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebhookResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

fn default_success() -> bool {
    true
}

impl WebhookResponse {
    /// A successful response carrying plain text.
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn has_message(&self) -> bool {
        !self.message.trim().is_empty()
    }
}

/// An inbound chat event as delivered by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Slash-command invocation.
    Command(CommandInvocation),
    /// Any posted message (mention, thread reply, or plain channel chatter).
    Message(IncomingMessage),
}

/// A slash command such as `/note add text:... category:...`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub name: String,
    #[serde(default)]
    pub subcommand: Option<String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub channel_id: String,
}

impl CommandInvocation {
    /// Non-empty option value, if present.
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// A chat message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_is_bot: bool,
    pub content: String,
    /// User IDs mentioned in the message.
    #[serde(default)]
    pub mentions: Vec<String>,
    /// Whether `channel_id` is a thread.
    #[serde(default)]
    pub in_thread: bool,
}
