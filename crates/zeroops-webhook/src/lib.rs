//! # ZeroOps Webhook
//!
//! Client for the external automation engine: a single HTTP endpoint that
//! takes a JSON job descriptor and answers with JSON or plain text.

pub mod client;

pub use client::{SOURCE_TAG, WebhookClient, parse_response_body};
