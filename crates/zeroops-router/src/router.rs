//! Event Router — decides what each inbound chat event turns into.
//!
//! - slash commands → notes / schedules / repos / blocking workflow calls
//! - bot mentions and active-thread replies → the analyze/execute
//!   conversation flow
//! - any other human message in an allowed channel → fire-and-forget
//!   `"message"` job

use std::sync::Arc;
use std::time::Duration;

use zeroops_core::config::RelayConfig;
use zeroops_core::{
    ActiveThreads, ChatTransport, Dispatcher, InboundEvent, IncomingMessage, JobPayload,
    send_chunked,
};
use zeroops_notes::NotesStore;
use zeroops_scheduler::{MetadataStore, Scheduler};

/// Router settings, usually derived from [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// The bot's own user ID.
    pub bot_id: String,
    /// The bot's username, for plain-text `@name` mentions.
    pub bot_name: String,
    /// Channels whose plain messages are forwarded. Empty = all.
    pub allowed_channels: Vec<String>,
    /// Bound on interactive webhook calls.
    pub command_timeout: Duration,
    pub thread_auto_archive_minutes: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bot_id: String::new(),
            bot_name: "zeroops".into(),
            allowed_channels: Vec::new(),
            command_timeout: Duration::from_secs(30),
            thread_auto_archive_minutes: 60,
        }
    }
}

impl RouterConfig {
    pub fn from_relay(config: &RelayConfig) -> Self {
        Self {
            bot_id: config.discord.application_id.clone(),
            bot_name: config.discord.bot_name.clone(),
            allowed_channels: config.allowed_channels.clone(),
            command_timeout: Duration::from_secs(config.webhook.command_timeout_secs),
            thread_auto_archive_minutes: config.discord.thread_auto_archive_minutes,
        }
    }
}

/// What happened to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRoute {
    Ignored,
    Conversation,
    Forwarded,
}

pub struct EventRouter {
    pub(crate) dispatcher: Arc<dyn Dispatcher>,
    pub(crate) transport: Arc<dyn ChatTransport>,
    pub(crate) metadata: Arc<MetadataStore>,
    pub(crate) notes: Option<Arc<NotesStore>>,
    pub(crate) scheduler: Option<Arc<Scheduler>>,
    pub(crate) threads: Arc<ActiveThreads>,
    pub(crate) config: RouterConfig,
}

impl EventRouter {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        transport: Arc<dyn ChatTransport>,
        metadata: Arc<MetadataStore>,
        config: RouterConfig,
    ) -> Self {
        Self {
            dispatcher,
            transport,
            metadata,
            notes: None,
            scheduler: None,
            threads: Arc::new(ActiveThreads::new()),
            config,
        }
    }

    pub fn with_notes(mut self, notes: Arc<NotesStore>) -> Self {
        self.notes = Some(notes);
        self
    }

    /// Schedule edits reload this scheduler.
    pub fn with_scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Share an existing active-thread registry.
    pub fn with_threads(mut self, threads: Arc<ActiveThreads>) -> Self {
        self.threads = threads;
        self
    }

    pub fn threads(&self) -> &Arc<ActiveThreads> {
        &self.threads
    }

    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Command(cmd) => {
                tracing::debug!(
                    "Command /{} {} from {}",
                    cmd.name,
                    cmd.subcommand.as_deref().unwrap_or(""),
                    cmd.user_id
                );
                let reply = self.command_reply(&cmd).await;
                if let Err(e) = send_chunked(self.transport.as_ref(), &cmd.channel_id, &reply).await
                {
                    tracing::warn!("⚠️ Reply to /{} failed: {}", cmd.name, e);
                }
            }
            InboundEvent::Message(msg) => {
                self.handle_message(msg).await;
            }
        }
    }

    pub async fn handle_message(&self, msg: IncomingMessage) -> MessageRoute {
        if msg.author_is_bot {
            return MessageRoute::Ignored;
        }

        let in_active_thread = msg.in_thread && self.threads.is_active(&msg.channel_id);
        if self.is_mentioned(&msg) || in_active_thread {
            self.converse(&msg).await;
            return MessageRoute::Conversation;
        }

        if !self.channel_allowed(&msg.channel_id) {
            return MessageRoute::Ignored;
        }

        let mut payload = JobPayload::new("message", &msg.channel_id)
            .with_command("chat")
            .with_content(msg.content.as_str())
            .with_user(&msg.author_id, &msg.author_name);
        payload.message_id = msg.id;
        self.dispatcher.dispatch_detached(payload);
        MessageRoute::Forwarded
    }

    fn channel_allowed(&self, channel_id: &str) -> bool {
        self.config.allowed_channels.is_empty()
            || self.config.allowed_channels.iter().any(|c| c == channel_id)
    }

    /// Mentioned by ID (mention list or raw `<@id>` token) or by plain
    /// `@name` text.
    pub fn is_mentioned(&self, msg: &IncomingMessage) -> bool {
        let id = &self.config.bot_id;
        if !id.is_empty() {
            if msg.mentions.iter().any(|m| m == id) {
                return true;
            }
            if msg.content.contains(&format!("<@{id}>"))
                || msg.content.contains(&format!("<@!{id}>"))
            {
                return true;
            }
        }
        let name = &self.config.bot_name;
        !name.is_empty()
            && msg
                .content
                .to_ascii_lowercase()
                .contains(&format!("@{}", name.to_ascii_lowercase()))
    }

    /// Remove mention tokens and the first plain `@name`, then trim.
    pub fn strip_mention(&self, content: &str) -> String {
        let mut out = content.to_string();
        let id = &self.config.bot_id;
        if !id.is_empty() {
            out = out.replace(&format!("<@{id}>"), "").replace(&format!("<@!{id}>"), "");
        }
        let name = &self.config.bot_name;
        if !name.is_empty() {
            let needle = format!("@{}", name.to_ascii_lowercase());
            if let Some(idx) = out.to_ascii_lowercase().find(&needle) {
                out.replace_range(idx..idx + needle.len(), "");
            }
        }
        out.trim().to_string()
    }
}
