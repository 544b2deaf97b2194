//! # Semestra Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - The extraction pipeline (text extractor, extraction engine,
//!   confidence scorer, duplicate detector, materializer)
//! - The job orchestrator state machine
//! - The calendar sync engine
//! - Port/adapter interfaces (traits)
//! - The typed domain-event bus
//!
//! ## Architecture Principles
//! - Only depends on `semestra-common` and `semestra-domain`
//! - No database or HTTP code
//! - All external collaborators behind traits
//! - Pure, testable business logic

pub mod dedup;
pub mod events;
pub mod extraction;
pub mod materialize;
pub mod pipeline;
pub mod scoring;
pub mod sync;
pub mod util;

// Re-export specific items to avoid ambiguity
pub use dedup::DuplicateDetector;
pub use events::{DomainEvent, EventBus, EventTopic};
pub use extraction::engine::ExtractionEngine;
pub use extraction::ports::{
    ExtractionRequest, ExtractionResponse, TokenUsageRecorder, UnderstandingService,
};
pub use extraction::text::{extract_text, TextExtraction};
pub use materialize::{MaterializeOutcome, Materializer};
pub use pipeline::ports::{CourseRepository, DocumentStore, UploadJobRepository};
pub use pipeline::{JobOrchestrator, JobStatusView};
pub use scoring::ConfidenceScorer;
pub use sync::error::{SyncError, SyncResult};
pub use sync::ports::{
    CalendarProvider, CredentialProvider, ExternalEventPayload, IntegrationRepository,
    MappingRepository, RemoteChanges, RemoteEventChange,
};
pub use sync::{CalendarSyncEngine, SyncPassSummary};
pub use util::locks::KeyedLocks;
