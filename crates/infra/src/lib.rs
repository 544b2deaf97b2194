//! # Semestra Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - Database implementations (SQLite via an r2d2 pool)
//! - HTTP client with retry support
//! - External service integrations (understanding service, calendar
//!   providers)
//! - The periodic sync scheduler
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `semestra-core`
//! - Depends on `semestra-domain` and `semestra-core`
//! - Contains all "impure" code (I/O, network)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;
pub mod storage;

// Re-export commonly used items
pub use database::{
    DatabaseManager, SqliteCourseRepository, SqliteIntegrationRepository, SqliteJobRepository,
    SqliteMappingRepository, SqliteTokenUsageRepository,
};
pub use errors::InfraError;
pub use http::HttpClient;
pub use integrations::calendar::providers::{GoogleCalendarProvider, MicrosoftCalendarProvider};
pub use integrations::calendar::StaticCredentialProvider;
pub use integrations::understanding::UnderstandingClient;
pub use scheduling::{CalendarSyncScheduler, SyncSchedulerConfig};
pub use storage::FsDocumentStore;
