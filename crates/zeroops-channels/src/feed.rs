//! Inbound event feed: newline-delimited JSON [`InboundEvent`]s from any
//! reader, exposed as a stream.
//!
//! The binary reads stdin, so a gateway bridge can pipe events in:
//! ```text
//! {"kind":"message","id":"m1","channel_id":"c1","author_id":"u1","content":"@zeroops status?","mentions":["b1"]}
//! {"kind":"command","name":"note","subcommand":"today","user_id":"u1","channel_id":"c1"}
//! ```

use std::io::BufRead;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use zeroops_core::InboundEvent;

const FEED_BUFFER: usize = 256;

/// Stream of inbound events; ends when the reader reaches EOF.
pub struct EventFeed {
    inner: ReceiverStream<InboundEvent>,
}

impl EventFeed {
    /// Spawn a task that reads `reader` line by line. Blank and malformed
    /// lines are skipped (malformed ones with a warning).
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut line_no = 0usize;
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("Event feed read error: {e}");
                        break;
                    }
                };
                line_no += 1;

                if let Some(event) = decode_line(&line, line_no) {
                    if tx.send(event).await.is_err() {
                        tracing::info!("Event feed stopped (receiver dropped)");
                        return;
                    }
                }
            }
            tracing::info!("Event feed reached end of input");
        });

        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Like [`from_reader`](Self::from_reader), but reads on a dedicated OS
    /// thread. A read that never returns does not hold up runtime shutdown;
    /// the thread is left behind and exits with the process.
    pub fn from_blocking_reader<R>(reader: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(FEED_BUFFER);

        let spawned = std::thread::Builder::new()
            .name("zeroops-event-feed".into())
            .spawn(move || {
                for (idx, line) in reader.lines().enumerate() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            tracing::error!("Event feed read error: {e}");
                            return;
                        }
                    };
                    if let Some(event) = decode_line(&line, idx + 1) {
                        if tx.blocking_send(event).is_err() {
                            tracing::info!("Event feed stopped (receiver dropped)");
                            return;
                        }
                    }
                }
                tracing::info!("Event feed reached end of input");
            });
        if let Err(e) = spawned {
            tracing::error!("Failed to start event feed reader: {e}");
        }

        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    pub fn stdin() -> Self {
        Self::from_blocking_reader(std::io::BufReader::new(std::io::stdin()))
    }
}

impl Stream for EventFeed {
    type Item = InboundEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

fn decode_line(line: &str, line_no: usize) -> Option<InboundEvent> {
    match parse_event_line(line)? {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!("⚠️ Skipping malformed event on line {}: {}", line_no, e);
            None
        }
    }
}

/// `None` for blank lines.
pub fn parse_event_line(line: &str) -> Option<Result<InboundEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_feed_yields_events_and_skips_junk() {
        let input = concat!(
            r#"{"kind":"command","name":"note","subcommand":"today","user_id":"u1","channel_id":"c1"}"#,
            "\n",
            "\n",
            "this is not json\n",
            r#"{"kind":"message","id":"m1","channel_id":"c1","author_id":"u2","content":"hi"}"#,
            "\n",
            r#"{"kind":"reaction","id":"x"}"#,
            "\n",
        );

        let events: Vec<InboundEvent> =
            EventFeed::from_reader(Cursor::new(input.as_bytes().to_vec()))
                .collect()
                .await;

        assert_eq!(events.len(), 2);
        match &events[0] {
            InboundEvent::Command(cmd) => {
                assert_eq!(cmd.name, "note");
                assert_eq!(cmd.subcommand.as_deref(), Some("today"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match &events[1] {
            InboundEvent::Message(msg) => {
                assert_eq!(msg.content, "hi");
                assert!(!msg.author_is_bot);
                assert!(msg.mentions.is_empty());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_feed_ends_on_empty_input() {
        let mut feed = EventFeed::from_reader(Cursor::new(Vec::new()));
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_blocking_reader_yields_events() {
        let input = concat!(
            "garbage\n",
            r#"{"kind":"command","name":"check-health","user_id":"u1","channel_id":"c1"}"#,
            "\n",
        );

        let events: Vec<InboundEvent> =
            EventFeed::from_blocking_reader(Cursor::new(input.as_bytes().to_vec()))
                .collect()
                .await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], InboundEvent::Command(cmd) if cmd.name == "check-health"));
    }

    /// Blocks in `read` until the paired sender is dropped.
    struct Stalled(std::sync::mpsc::Receiver<()>);

    impl std::io::Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            let _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn test_stalled_input_does_not_block_runtime_shutdown() {
        let (hold_open, stalled) = std::sync::mpsc::channel::<()>();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let feed = runtime.block_on(async {
            EventFeed::from_blocking_reader(std::io::BufReader::new(Stalled(stalled)))
        });

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(runtime);
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok(),
            "runtime shutdown waited on a pending read"
        );

        drop(feed);
        drop(hold_open);
    }

    #[test]
    fn test_parse_event_line() {
        assert!(parse_event_line("   ").is_none());
        assert!(parse_event_line("{").unwrap().is_err());
        let line = r#"{"kind":"command","name":"check-health","user_id":"u","channel_id":"c"}"#;
        assert!(parse_event_line(line).unwrap().is_ok());
    }
}
