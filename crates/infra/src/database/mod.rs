//! SQLite-backed implementations of the core repository ports

pub mod calendar_repository;
pub mod course_repository;
pub mod job_repository;
pub mod manager;
pub mod token_usage_repository;

pub use calendar_repository::{SqliteIntegrationRepository, SqliteMappingRepository};
pub use course_repository::SqliteCourseRepository;
pub use job_repository::SqliteJobRepository;
pub use manager::DatabaseManager;
pub use token_usage_repository::SqliteTokenUsageRepository;
