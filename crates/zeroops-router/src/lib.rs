//! # ZeroOps Router
//!
//! Maps inbound chat events onto the notes store, the schedule/repository
//! metadata, and the automation webhook.
//!
//! ```text
//! InboundEvent::Command ──► /note  ──► NotesStore
//!                           /schedule ──► MetadataStore ──► Scheduler::reload
//!                           /repo  ──► MetadataStore
//!                           /check-health, /infra ──► Dispatcher (blocking)
//! InboundEvent::Message ──► mention / active thread ──► analyze ──► note | reject | execute
//!                       └─► plain chatter ──► Dispatcher (fire-and-forget)
//! ```

pub mod commands;
pub mod mention;
pub mod router;

#[cfg(test)]
mod tests_support;

pub use mention::{NoteAction, RouteDecision, analyze_prompt, parse_route_decision};
pub use router::{EventRouter, MessageRoute, RouterConfig};
