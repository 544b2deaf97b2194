//! SQLite-backed implementation of the TokenUsageRecorder port.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::ToSql;
use semestra_core::TokenUsageRecorder;
use semestra_domain::Result;
use tracing::instrument;

use crate::errors::InfraError;

use super::manager::DatabaseManager;

/// Records understanding-service token usage per job.
pub struct SqliteTokenUsageRepository {
    db: DatabaseManager,
}

impl SqliteTokenUsageRepository {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    /// Total (prompt, completion) tokens recorded for a job.
    pub fn totals_for_job(&self, job_id: &str) -> Result<(u64, u64)> {
        let conn = self.db.connection()?;

        conn.query_row(
            "SELECT COALESCE(SUM(prompt_tokens), 0), COALESCE(SUM(completion_tokens), 0)
             FROM token_usage WHERE job_id = ?1",
            [&job_id],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64)),
        )
        .map_err(|e| InfraError::from(e).into())
    }
}

#[async_trait]
impl TokenUsageRecorder for SqliteTokenUsageRepository {
    #[instrument(skip(self))]
    async fn record_usage(
        &self,
        job_id: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Result<()> {
        let conn = self.db.connection()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "INSERT INTO token_usage (job_id, prompt_tokens, completion_tokens, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            [&job_id as &dyn ToSql, &prompt_tokens, &completion_tokens, &now].as_ref(),
        )
        .map_err(InfraError::from)?;

        Ok(())
    }
}
