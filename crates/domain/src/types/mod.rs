//! Domain data types
//!
//! Pure data structures shared across the pipeline, the materialized
//! course model, and the calendar sync engine.

pub mod calendar;
pub mod course;
pub mod draft;
pub mod job;

pub use calendar::{
    CalendarEventMapping, CalendarIntegration, CalendarProviderKind, ConflictRecord,
    ConflictWinner, MappingSyncStatus, SyncDirection,
};
pub use course::{Course, CourseEvent, DuplicateCandidate, EventCategory, Recurrence};
pub use draft::{
    CourseDraft, DraftConfidence, DraftCorrections, DraftEvent, ExtractedDraft, MeetingTime,
};
pub use job::{DocumentType, FileReference, JobErrorRecord, JobStatus, StatusTransition, UploadJob};
