//! # ZeroOps Scheduler
//!
//! Cron-triggered webhook jobs, the periodic heartbeat, and the metadata
//! they read (schedules, registered repositories, prompts).
//!
//! ## Architecture
//! ```text
//! MetadataStore (metadata.json)
//!   ├── schedules ──reload──► Scheduler ──dispatch loop──► JobRunner
//!   │                                                        ├── Dispatcher ("schedule")
//!   │                                                        └── ChatTransport (chunked reply)
//!   ├── repos ─────────────► job content / payload repos
//!   └── heartbeat_prompt ──► Heartbeat (aligned ticks, "command"/"heartbeat")
//! ```

pub mod cron;
pub mod engine;
pub mod heartbeat;
pub mod metadata;

pub use cron::{CronExpr, Zone};
pub use engine::{JobRunner, NotesPointer, SCHEDULE_JOB_TIMEOUT, Scheduler, render_job_content};
pub use heartbeat::{Heartbeat, HeartbeatHandle, next_aligned_tick};
pub use metadata::{Metadata, MetadataStore, ScheduleDef};
