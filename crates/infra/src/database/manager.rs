//! Database pool construction and schema migrations

use std::sync::Arc;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use semestra_domain::{DatabaseConfig, Result, SemestraError};
use tracing::info;

use crate::errors::InfraError;

/// Schema, applied idempotently at pool construction.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS upload_jobs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    file_location TEXT NOT NULL,
    file_name TEXT NOT NULL,
    declared_type TEXT NOT NULL,
    course_title_hint TEXT,
    status TEXT NOT NULL,
    extracted_draft_json TEXT,
    duplicate_candidates_json TEXT NOT NULL DEFAULT '[]',
    errors_json TEXT NOT NULL DEFAULT '[]',
    retry_count INTEGER NOT NULL DEFAULT 0,
    bypass_duplicates INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS upload_job_transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL REFERENCES upload_jobs(id) ON DELETE CASCADE,
    from_status TEXT NOT NULL,
    to_status TEXT NOT NULL,
    occurred_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_job_transitions_job
    ON upload_job_transitions(job_id);

CREATE TABLE IF NOT EXISTS courses (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    code TEXT NOT NULL,
    code_normalized TEXT NOT NULL,
    instructor TEXT,
    credits REAL,
    term TEXT NOT NULL,
    term_normalized TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT,
    grading_weights_json TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_courses_user_term
    ON courses(user_id, term_normalized);

CREATE TABLE IF NOT EXISTS course_events (
    id TEXT PRIMARY KEY,
    course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    category TEXT NOT NULL,
    starts_at INTEGER NOT NULL,
    ends_at INTEGER NOT NULL,
    weight REAL,
    points REAL,
    location TEXT,
    recurrence_json TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_course_events_course
    ON course_events(course_id);

CREATE TABLE IF NOT EXISTS calendar_integrations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    calendar_id TEXT NOT NULL,
    sync_direction TEXT NOT NULL,
    last_sync_token TEXT,
    sync_enabled INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS calendar_event_mappings (
    id TEXT PRIMARY KEY,
    course_event_id TEXT NOT NULL REFERENCES course_events(id) ON DELETE CASCADE,
    integration_id TEXT NOT NULL REFERENCES calendar_integrations(id) ON DELETE CASCADE,
    external_event_id TEXT NOT NULL,
    sync_status TEXT NOT NULL,
    last_synced_at INTEGER,
    last_error TEXT,
    conflict_log_json TEXT NOT NULL DEFAULT '[]',
    UNIQUE(course_event_id, integration_id)
);

CREATE TABLE IF NOT EXISTS token_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id TEXT NOT NULL,
    prompt_tokens INTEGER NOT NULL,
    completion_tokens INTEGER NOT NULL,
    recorded_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_token_usage_job ON token_usage(job_id);
";

/// Owns the connection pool and applies migrations on startup.
#[derive(Clone)]
pub struct DatabaseManager {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl DatabaseManager {
    /// Open (or create) the database and apply the schema.
    pub fn new(config: &DatabaseConfig) -> Result<Self> {
        let manager = SqliteConnectionManager::file(&config.path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )
        });

        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .build(manager)
            .map_err(InfraError::from)?;

        let conn = pool.get().map_err(InfraError::from)?;
        conn.execute_batch(SCHEMA).map_err(InfraError::from)?;
        drop(conn);

        info!(path = %config.path, pool_size = config.pool_size, "database ready");

        Ok(Self { pool: Arc::new(pool) })
    }

    /// Check out a pooled connection.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| SemestraError::Database(format!("pool error: {}", e)))
    }
}
