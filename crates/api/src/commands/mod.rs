//! External interface commands
//!
//! Thin wrappers over the orchestrator and sync engine with structured
//! logging; the external gateway calls these.

pub mod calendar;
pub mod jobs;

pub use calendar::{connect_calendar, run_calendar_sync, set_calendar_sync_enabled};
pub use jobs::{
    approve_job, cancel_job, ingest_syllabus, job_status, reject_job, resubmit_job,
};
