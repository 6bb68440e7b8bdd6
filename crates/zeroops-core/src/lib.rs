//! # ZeroOps Core
//!
//! Shared building blocks for the ZeroOps chat-ops relay.
//!
//! ## Architecture
//! ```text
//! chat event ──► EventRouter ──┬──► NotesStore (daily/, categories/)
//!                              ├──► Scheduler control ──► MetadataStore
//!                              └──► Dispatcher (webhook) ──► automation engine
//!                                        │
//!                 ChatTransport ◄────────┘  (chunked replies, reactions, threads)
//! ```
//!
//! Everything cross-crate lives here: the error taxonomy, the job descriptor
//! sent to the automation engine, the two collaborator traits
//! ([`traits::ChatTransport`], [`traits::Dispatcher`]), message chunking,
//! session identity, and configuration.

pub mod chunk;
pub mod config;
pub mod error;
pub mod session;
pub mod tracker;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use chunk::{MAX_MESSAGE_LENGTH, send_chunked, split_message, split_message_with_limit};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use session::{ActiveThreads, thread_to_session};
pub use tracker::WorkTracker;
pub use traits::{ChatTransport, Dispatcher};
pub use types::{
    CommandInvocation, InboundEvent, IncomingMessage, JobPayload, RepoMeta, WebhookResponse,
};
