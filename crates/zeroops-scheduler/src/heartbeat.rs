//! Periodic heartbeat job, fired on wall-clock-aligned ticks
//! (an hourly heartbeat fires at :00, not an hour after startup).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use zeroops_core::{ChatTransport, Dispatcher, JobPayload, Result, send_chunked};

use crate::engine::SCHEDULE_JOB_TIMEOUT;
use crate::metadata::MetadataStore;

pub struct Heartbeat {
    dispatcher: Arc<dyn Dispatcher>,
    transport: Arc<dyn ChatTransport>,
    metadata: Arc<MetadataStore>,
    channel_id: String,
    interval: Duration,
    timeout: Duration,
}

impl Heartbeat {
    pub fn new(
        dispatcher: Arc<dyn Dispatcher>,
        transport: Arc<dyn ChatTransport>,
        metadata: Arc<MetadataStore>,
        channel_id: &str,
        interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            transport,
            metadata,
            channel_id: channel_id.to_string(),
            interval: interval.max(Duration::from_secs(1)),
            timeout: SCHEDULE_JOB_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// One heartbeat: dispatch the heartbeat prompt, post any reply.
    pub async fn beat(&self) -> Result<usize> {
        let snapshot = self.metadata.snapshot().await;
        let payload = JobPayload::new("command", &self.channel_id)
            .with_command("heartbeat")
            .with_content(snapshot.heartbeat_prompt)
            .with_repos(snapshot.repos);

        let response = self.dispatcher.dispatch(payload, self.timeout).await?;
        if !response.has_message() {
            return Ok(0);
        }
        send_chunked(self.transport.as_ref(), &self.channel_id, &response.message).await
    }

    /// Beat on every aligned tick until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut next = next_aligned_tick(Utc::now(), self.interval);
        tracing::info!(
            "💓 Heartbeat started (every {:?}, channel {}, next {})",
            self.interval,
            self.channel_id,
            next.to_rfc3339()
        );

        loop {
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.beat().await {
                        tracing::warn!("⚠️ Heartbeat failed: {e}");
                    }
                    next = next_aligned_tick(Utc::now(), self.interval);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("💓 Heartbeat stopped");
    }

    pub fn spawn(self) -> HeartbeatHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(stop_rx));
        HeartbeatHandle { stop_tx, handle }
    }
}

pub struct HeartbeatHandle {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Signal the heartbeat and wait for it to exit. A beat in progress is
    /// allowed to finish first.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("⚠️ Heartbeat task ended abnormally: {e}");
        }
    }
}

/// The first multiple of `interval` (counted from the Unix epoch) strictly
/// after `now`, at whole-second resolution.
pub fn next_aligned_tick(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let step = interval.as_secs().max(1) as i64;
    let secs = now.timestamp();
    let next = secs + step - secs.rem_euclid(step);
    DateTime::from_timestamp(next, 0).unwrap_or(now)
}
