//! In-memory collaborators for tests in downstream crates.
//!
//! Enabled with the `testing` feature.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RelayError, Result};
use crate::traits::{ChatTransport, Dispatcher};
use crate::types::{JobPayload, WebhookResponse};

/// Everything a [`RecordingTransport`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Send { channel_id: String, content: String },
    CreateThread { channel_id: String, message_id: String, name: String },
    AddReaction { message_id: String, emoji: String },
    RemoveReaction { message_id: String, emoji: String },
}

#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    /// Fail every send after this many successful ones.
    fail_after: Mutex<Option<usize>>,
    sends: AtomicUsize,
    next_id: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(sends: usize) -> Self {
        let t = Self::default();
        *t.fail_after.lock().unwrap() = Some(sends);
        t
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Contents sent to `channel_id`, in order.
    pub fn sent_to(&self, channel_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Send { channel_id: ch, content } if ch == channel_id => {
                    Some(content)
                }
                _ => None,
            })
            .collect()
    }

    /// Emoji currently on `message_id` (added and not removed).
    pub fn reactions_on(&self, message_id: &str) -> Vec<String> {
        let mut current: Vec<String> = Vec::new();
        for call in self.calls() {
            match call {
                TransportCall::AddReaction { message_id: m, emoji } if m == message_id => {
                    current.push(emoji)
                }
                TransportCall::RemoveReaction { message_id: m, emoji } if m == message_id => {
                    current.retain(|e| *e != emoji)
                }
                _ => {}
            }
        }
        current
    }

    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn new_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send_message(&self, channel_id: &str, content: &str) -> Result<String> {
        let sent = self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = *self.fail_after.lock().unwrap() {
            if sent >= limit {
                return Err(RelayError::Channel("send rejected".into()));
            }
        }
        self.record(TransportCall::Send {
            channel_id: channel_id.to_string(),
            content: content.to_string(),
        });
        Ok(self.new_id("msg"))
    }

    async fn create_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        name: &str,
        _auto_archive_minutes: u32,
    ) -> Result<String> {
        self.record(TransportCall::CreateThread {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
            name: name.to_string(),
        });
        Ok(self.new_id("thread"))
    }

    async fn add_reaction(&self, _channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        self.record(TransportCall::AddReaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()> {
        self.record(TransportCall::RemoveReaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }
}

/// Records every job; answers from a queue of scripted results, then with
/// the fallback (an empty success).
#[derive(Debug, Default)]
pub struct ScriptedDispatcher {
    jobs: Mutex<Vec<JobPayload>>,
    detached: Mutex<Vec<JobPayload>>,
    replies: Mutex<VecDeque<Result<WebhookResponse>>>,
    latency: Mutex<Duration>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, response: WebhookResponse) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn reply_text(&self, message: &str) -> &Self {
        self.reply(WebhookResponse::text(message))
    }

    pub fn fail(&self, error: RelayError) -> &Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    /// Make each `dispatch` take `latency` before it records the job.
    pub fn delay(&self, latency: Duration) -> &Self {
        *self.latency.lock().unwrap() = latency;
        self
    }

    /// Jobs sent with [`Dispatcher::dispatch`].
    pub fn jobs(&self) -> Vec<JobPayload> {
        self.jobs.lock().unwrap().clone()
    }

    /// Jobs sent with [`Dispatcher::dispatch_detached`].
    pub fn detached(&self) -> Vec<JobPayload> {
        self.detached.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatcher for ScriptedDispatcher {
    async fn dispatch(&self, payload: JobPayload, _timeout: Duration) -> Result<WebhookResponse> {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.jobs.lock().unwrap().push(payload);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(WebhookResponse::text("")))
    }

    fn dispatch_detached(&self, payload: JobPayload) {
        self.detached.lock().unwrap().push(payload);
    }
}
