//! Split long replies into transport-sized messages.
//!
//! Limits count characters, not bytes. A chunk ends at the last newline in
//! the back half of its window when there is one; otherwise it is cut hard
//! at the limit.

use crate::error::Result;
use crate::traits::ChatTransport;

/// Per-message limit used for every outbound reply.
pub const MAX_MESSAGE_LENGTH: usize = 1800;

/// Split using [`MAX_MESSAGE_LENGTH`].
pub fn split_message(content: &str) -> Vec<String> {
    split_message_with_limit(content, MAX_MESSAGE_LENGTH)
}

/// Split `content` into chunks of at most `limit` characters.
///
/// Content within the limit comes back as a single chunk, even when empty.
pub fn split_message_with_limit(content: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= limit {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = &chars[..];

    while !rest.is_empty() {
        let mut end = limit.min(rest.len());

        if end < rest.len() {
            let floor = end / 2;
            if let Some(pos) = rest[floor..end].iter().rposition(|c| *c == '\n') {
                end = floor + pos + 1;
            }
        }

        chunks.push(rest[..end].iter().collect());
        rest = &rest[end..];
    }

    chunks
}

/// Send `text` to `channel_id` as consecutive chunks, stopping at the first
/// failed send. Empty text sends nothing. Returns the number of chunks sent.
pub async fn send_chunked(
    transport: &dyn ChatTransport,
    channel_id: &str,
    text: &str,
) -> Result<usize> {
    if text.is_empty() {
        return Ok(0);
    }
    let chunks = split_message(text);
    for (sent, chunk) in chunks.iter().enumerate() {
        if let Err(e) = transport.send_message(channel_id, chunk).await {
            tracing::warn!(
                "⚠️ Send to {} failed after {}/{} chunks: {}",
                channel_id,
                sent,
                chunks.len(),
                e
            );
            return Err(e);
        }
    }
    Ok(chunks.len())
}
