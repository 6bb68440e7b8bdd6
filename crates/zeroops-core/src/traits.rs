//! Collaborator seams: the chat platform and the automation engine.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{JobPayload, WebhookResponse};

/// Outbound capabilities of the chat platform.
///
/// Every call is a fallible remote call. Callers log failures; nothing in
/// the relay retries them.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Transport name, used in logs.
    fn name(&self) -> &str;

    /// Post `content` to a channel or thread. Returns the new message ID.
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String>;

    /// Start a thread rooted at an existing message. Returns the thread ID.
    async fn create_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        name: &str,
        auto_archive_minutes: u32,
    ) -> Result<String>;

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()>;

    /// Remove the relay's own reaction.
    async fn remove_reaction(&self, channel_id: &str, message_id: &str, emoji: &str)
    -> Result<()>;
}

/// Something that can hand a job to the automation engine.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Send the job and wait for the result, bounded by `timeout`.
    async fn dispatch(&self, payload: JobPayload, timeout: Duration) -> Result<WebhookResponse>;

    /// Send the job in the background. The result is logged, never returned.
    fn dispatch_detached(&self, payload: JobPayload);
}
