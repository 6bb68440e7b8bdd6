//! # ZeroOps Notes
//!
//! Plain-markdown notes, partitioned by day and by category. Files stay
//! human-readable and safe to edit by hand while the relay runs.

pub mod document;
pub mod store;

pub use store::{DAILY_CATEGORY, MAX_RECENT_DAYS, NotesStore, today, validate_date};
