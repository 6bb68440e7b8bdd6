//! # ZeroOps Channels
//!
//! Chat-platform plumbing: the Discord REST transport behind
//! [`ChatTransport`](zeroops_core::ChatTransport), and the inbound
//! JSON-lines event feed.

pub mod discord;
pub mod feed;

pub use discord::{DiscordRest, DiscordUser};
pub use feed::{EventFeed, parse_event_line};
