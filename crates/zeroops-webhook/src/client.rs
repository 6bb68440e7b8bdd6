//! Automation webhook client.
//!
//! One endpoint, one POST per job. Two modes:
//! - [`WebhookClient::trigger`] waits for the result, bounded by a timeout.
//! - [`WebhookClient::trigger_async`] fires in the background; the call is
//!   tracked so [`WebhookClient::shutdown`] can drain it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use zeroops_core::config::WebhookConfig;
use zeroops_core::error::{RelayError, Result};
use zeroops_core::traits::Dispatcher;
use zeroops_core::tracker::WorkTracker;
use zeroops_core::types::{JobPayload, WebhookResponse};

/// Value of the `source` field on every job.
pub const SOURCE_TAG: &str = "zeroops";

/// Longest error body kept on an upstream failure.
const MAX_ERROR_BODY: usize = 512;

#[derive(Clone)]
pub struct WebhookClient {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    secret: Option<String>,
    secret_header: String,
    http: reqwest::Client,
    async_timeout: Duration,
    in_flight: Arc<WorkTracker>,
}

impl WebhookClient {
    pub fn new(url: &str, secret: Option<&str>) -> Self {
        Self::with_options(url, secret, "x-api-key", Duration::from_secs(30))
    }

    pub fn from_config(config: &WebhookConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(RelayError::Config("webhook.url is required".into()));
        }
        Ok(Self::with_options(
            &config.url,
            Some(config.secret.as_str()),
            &config.secret_header,
            Duration::from_secs(config.async_timeout_secs),
        ))
    }

    pub fn with_options(
        url: &str,
        secret: Option<&str>,
        secret_header: &str,
        async_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                url: url.to_string(),
                secret: secret.filter(|s| !s.is_empty()).map(String::from),
                secret_header: secret_header.to_string(),
                http: reqwest::Client::new(),
                async_timeout,
                in_flight: WorkTracker::new(),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// POST the job and wait for the engine's answer.
    ///
    /// Non-2xx is [`RelayError::UpstreamStatus`]; exceeding `timeout` is
    /// [`RelayError::Timeout`]. Dropping the future abandons the wait, not
    /// whatever the engine already started.
    pub async fn trigger(&self, payload: JobPayload, timeout: Duration) -> Result<WebhookResponse> {
        match tokio::time::timeout(timeout, self.inner.send(payload)).await {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout(format!(
                "webhook call exceeded {timeout:?}"
            ))),
        }
    }

    /// Fire and forget. Failures are logged.
    pub fn trigger_async(&self, payload: JobPayload) {
        let guard = self.inner.in_flight.enter();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let _guard = guard;
            let kind = payload.kind.clone();
            match tokio::time::timeout(inner.async_timeout, inner.send(payload)).await {
                Ok(Ok(_)) => tracing::debug!("✅ Async webhook ({}) delivered", kind),
                Ok(Err(e)) => tracing::warn!("⚠️ Async webhook ({}) failed: {}", kind, e),
                Err(_) => tracing::warn!(
                    "⚠️ Async webhook ({}) timed out after {:?}",
                    kind,
                    inner.async_timeout
                ),
            }
        });
    }

    /// Background calls still running.
    pub fn outstanding(&self) -> usize {
        self.inner.in_flight.outstanding()
    }

    /// Wait for every [`trigger_async`](Self::trigger_async) call to finish.
    ///
    /// Past `deadline` this returns [`RelayError::Timeout`]; the calls keep
    /// running in the background.
    pub async fn shutdown(&self, deadline: Duration) -> Result<()> {
        let pending = self.outstanding();
        if pending > 0 {
            tracing::info!("⏳ Draining {} async webhook call(s)", pending);
        }
        self.inner.in_flight.wait_idle_timeout(deadline).await
    }
}

impl Inner {
    async fn send(&self, mut payload: JobPayload) -> Result<WebhookResponse> {
        payload.timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        payload.source = SOURCE_TAG.to_string();

        let body = serde_json::to_vec(&payload)?;
        let mut req = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(secret) = &self.secret {
            req = req.header(self.secret_header.as_str(), secret.as_str());
        }

        tracing::debug!(
            "🌐 POST {} (type={}, command={})",
            self.url,
            payload.kind,
            payload.command
        );

        let resp = req
            .send()
            .await
            .map_err(|e| RelayError::Http(format!("POST {}: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            truncate_chars(&mut body, MAX_ERROR_BODY);
            return Err(RelayError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = resp
            .text()
            .await
            .map_err(|e| RelayError::Http(format!("read response from {}: {e}", self.url)))?;
        Ok(parse_response_body(&text))
    }
}

/// Interpret a 2xx response body.
///
/// A JSON object is read as `{success, message, data}`, and a JSON string
/// as the message. Anything else (plain text, HTML, an empty body) counts
/// as success with the raw body as the message.
pub fn parse_response_body(body: &str) -> WebhookResponse {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return WebhookResponse::text("");
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value @ serde_json::Value::Object(_)) => serde_json::from_value(value)
            .unwrap_or_else(|_| WebhookResponse::text(trimmed)),
        Ok(serde_json::Value::String(message)) => WebhookResponse::text(message),
        _ => WebhookResponse::text(trimmed),
    }
}

fn truncate_chars(s: &mut String, max: usize) {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
}

#[async_trait]
impl Dispatcher for WebhookClient {
    async fn dispatch(&self, payload: JobPayload, timeout: Duration) -> Result<WebhookResponse> {
        self.trigger(payload, timeout).await
    }

    fn dispatch_detached(&self, payload: JobPayload) {
        self.trigger_async(payload);
    }
}
