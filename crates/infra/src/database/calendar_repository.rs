//! SQLite-backed implementations of the calendar sync ports.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Row, ToSql};
use semestra_core::{IntegrationRepository, MappingRepository};
use semestra_domain::{
    CalendarEventMapping, CalendarIntegration, CalendarProviderKind, ConflictRecord,
    MappingSyncStatus, Result, SemestraError, SyncDirection,
};
use tracing::{debug, instrument};

use crate::errors::InfraError;

use super::manager::DatabaseManager;

/// SQLite implementation of IntegrationRepository.
pub struct SqliteIntegrationRepository {
    db: DatabaseManager,
}

impl SqliteIntegrationRepository {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    /// Persist a new integration.
    pub fn create_integration(&self, integration: &CalendarIntegration) -> Result<()> {
        let conn = self.db.connection()?;

        conn.execute(
            "INSERT INTO calendar_integrations (
                id, user_id, provider, calendar_id, sync_direction,
                last_sync_token, sync_enabled, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            [
                &integration.id as &dyn ToSql,
                &integration.user_id,
                &integration.provider.as_str(),
                &integration.calendar_id,
                &integration.sync_direction.as_str(),
                &integration.last_sync_token,
                &integration.sync_enabled,
                &integration.created_at,
                &integration.updated_at,
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        Ok(())
    }
}

const INTEGRATION_COLUMNS: &str = "id, user_id, provider, calendar_id, sync_direction,
     last_sync_token, sync_enabled, created_at, updated_at";

#[async_trait]
impl IntegrationRepository for SqliteIntegrationRepository {
    #[instrument(skip(self))]
    async fn get_integration(&self, integration_id: &str) -> Result<CalendarIntegration> {
        let conn = self.db.connection()?;

        conn.query_row(
            &format!("SELECT {} FROM calendar_integrations WHERE id = ?1", INTEGRATION_COLUMNS),
            [&integration_id],
            integration_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                SemestraError::NotFound(format!("integration {} not found", integration_id))
            }
            other => InfraError::from(other).into(),
        })?
    }

    #[instrument(skip(self))]
    async fn list_enabled(&self) -> Result<Vec<CalendarIntegration>> {
        let conn = self.db.connection()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM calendar_integrations WHERE sync_enabled = 1",
                INTEGRATION_COLUMNS
            ))
            .map_err(InfraError::from)?;

        let rows = stmt.query_map([], integration_from_row).map_err(InfraError::from)?;
        collect_integrations(rows)
    }

    #[instrument(skip(self))]
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<CalendarIntegration>> {
        let conn = self.db.connection()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM calendar_integrations WHERE user_id = ?1",
                INTEGRATION_COLUMNS
            ))
            .map_err(InfraError::from)?;

        let rows = stmt.query_map([&user_id], integration_from_row).map_err(InfraError::from)?;
        collect_integrations(rows)
    }

    #[instrument(skip(self, token))]
    async fn update_sync_token(&self, integration_id: &str, token: &str) -> Result<()> {
        let conn = self.db.connection()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "UPDATE calendar_integrations
             SET last_sync_token = ?1, updated_at = ?2 WHERE id = ?3",
            [&token as &dyn ToSql, &now, &integration_id].as_ref(),
        )
        .map_err(InfraError::from)?;

        debug!(integration_id, "sync token updated");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_sync_token(&self, integration_id: &str) -> Result<()> {
        let conn = self.db.connection()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "UPDATE calendar_integrations
             SET last_sync_token = NULL, updated_at = ?1 WHERE id = ?2",
            [&now as &dyn ToSql, &integration_id].as_ref(),
        )
        .map_err(InfraError::from)?;

        debug!(integration_id, "sync token cleared");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_sync_enabled(&self, integration_id: &str, enabled: bool) -> Result<()> {
        let conn = self.db.connection()?;
        let now = Utc::now().timestamp();

        conn.execute(
            "UPDATE calendar_integrations
             SET sync_enabled = ?1, updated_at = ?2 WHERE id = ?3",
            [&enabled as &dyn ToSql, &now, &integration_id].as_ref(),
        )
        .map_err(InfraError::from)?;

        Ok(())
    }
}

/// SQLite implementation of MappingRepository. The unique index on
/// (course_event_id, integration_id) enforces at most one mapping per
/// pair.
pub struct SqliteMappingRepository {
    db: DatabaseManager,
}

impl SqliteMappingRepository {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }
}

const MAPPING_COLUMNS: &str = "id, course_event_id, integration_id, external_event_id,
     sync_status, last_synced_at, last_error, conflict_log_json";

#[async_trait]
impl MappingRepository for SqliteMappingRepository {
    #[instrument(skip(self))]
    async fn mapping_for(
        &self,
        course_event_id: &str,
        integration_id: &str,
    ) -> Result<Option<CalendarEventMapping>> {
        let conn = self.db.connection()?;

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM calendar_event_mappings
                 WHERE course_event_id = ?1 AND integration_id = ?2",
                MAPPING_COLUMNS
            ),
            [course_event_id, integration_id],
            mapping_from_row,
        );

        optional_mapping(result)
    }

    #[instrument(skip(self))]
    async fn find_by_external_id(
        &self,
        integration_id: &str,
        external_event_id: &str,
    ) -> Result<Option<CalendarEventMapping>> {
        let conn = self.db.connection()?;

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM calendar_event_mappings
                 WHERE integration_id = ?1 AND external_event_id = ?2",
                MAPPING_COLUMNS
            ),
            [integration_id, external_event_id],
            mapping_from_row,
        );

        optional_mapping(result)
    }

    #[instrument(skip(self, mapping), fields(mapping_id = %mapping.id))]
    async fn upsert_mapping(&self, mapping: &CalendarEventMapping) -> Result<()> {
        let conn = self.db.connection()?;

        conn.execute(
            "INSERT INTO calendar_event_mappings (
                id, course_event_id, integration_id, external_event_id,
                sync_status, last_synced_at, last_error, conflict_log_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(course_event_id, integration_id) DO UPDATE SET
                external_event_id = excluded.external_event_id,
                sync_status = excluded.sync_status,
                last_synced_at = excluded.last_synced_at,
                last_error = excluded.last_error,
                conflict_log_json = excluded.conflict_log_json",
            [
                &mapping.id as &dyn ToSql,
                &mapping.course_event_id,
                &mapping.integration_id,
                &mapping.external_event_id,
                &mapping.sync_status.as_str(),
                &mapping.last_synced_at,
                &mapping.last_error,
                &serde_json::to_string(&mapping.conflict_log).map_err(InfraError::from)?,
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_status(
        &self,
        mapping_id: &str,
        status: MappingSyncStatus,
        last_error: Option<&str>,
        last_synced_at: Option<i64>,
    ) -> Result<()> {
        let conn = self.db.connection()?;

        let updated = conn
            .execute(
                "UPDATE calendar_event_mappings SET
                    sync_status = ?1,
                    last_error = ?2,
                    last_synced_at = COALESCE(?3, last_synced_at)
                 WHERE id = ?4",
                [
                    &status.as_str() as &dyn ToSql,
                    &last_error,
                    &last_synced_at,
                    &mapping_id,
                ]
                .as_ref(),
            )
            .map_err(InfraError::from)?;

        if updated == 0 {
            return Err(SemestraError::NotFound(format!("mapping {} not found", mapping_id)));
        }
        Ok(())
    }

    #[instrument(skip(self, record))]
    async fn record_conflict(&self, mapping_id: &str, record: &ConflictRecord) -> Result<()> {
        let conn = self.db.connection()?;

        let log_raw: String = conn
            .query_row(
                "SELECT conflict_log_json FROM calendar_event_mappings WHERE id = ?1",
                [&mapping_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    SemestraError::NotFound(format!("mapping {} not found", mapping_id))
                }
                other => InfraError::from(other).into(),
            })?;

        let mut log: Vec<ConflictRecord> =
            serde_json::from_str(&log_raw).map_err(InfraError::from)?;
        log.push(record.clone());

        conn.execute(
            "UPDATE calendar_event_mappings SET conflict_log_json = ?1 WHERE id = ?2",
            [
                &serde_json::to_string(&log).map_err(InfraError::from)? as &dyn ToSql,
                &mapping_id,
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        Ok(())
    }
}

fn integration_from_row(row: &Row<'_>) -> rusqlite::Result<Result<CalendarIntegration>> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let provider_raw: String = row.get(2)?;
    let calendar_id: String = row.get(3)?;
    let direction_raw: String = row.get(4)?;
    let last_sync_token: Option<String> = row.get(5)?;
    let sync_enabled: bool = row.get(6)?;
    let created_at: i64 = row.get(7)?;
    let updated_at: i64 = row.get(8)?;

    let Some(provider) = CalendarProviderKind::parse(&provider_raw) else {
        return Ok(Err(SemestraError::Database(format!(
            "unknown provider '{}'",
            provider_raw
        ))));
    };
    let Some(sync_direction) = SyncDirection::parse(&direction_raw) else {
        return Ok(Err(SemestraError::Database(format!(
            "unknown sync direction '{}'",
            direction_raw
        ))));
    };

    Ok(Ok(CalendarIntegration {
        id,
        user_id,
        provider,
        calendar_id,
        sync_direction,
        last_sync_token,
        sync_enabled,
        created_at,
        updated_at,
    }))
}

fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<Result<CalendarEventMapping>> {
    let id: String = row.get(0)?;
    let course_event_id: String = row.get(1)?;
    let integration_id: String = row.get(2)?;
    let external_event_id: String = row.get(3)?;
    let status_raw: String = row.get(4)?;
    let last_synced_at: Option<i64> = row.get(5)?;
    let last_error: Option<String> = row.get(6)?;
    let log_raw: String = row.get(7)?;

    let Some(sync_status) = MappingSyncStatus::parse(&status_raw) else {
        return Ok(Err(SemestraError::Database(format!(
            "unknown sync status '{}'",
            status_raw
        ))));
    };
    let conflict_log = match serde_json::from_str(&log_raw) {
        Ok(log) => log,
        Err(e) => {
            return Ok(Err(SemestraError::Database(format!("invalid conflict log: {}", e))));
        }
    };

    Ok(Ok(CalendarEventMapping {
        id,
        course_event_id,
        integration_id,
        external_event_id,
        sync_status,
        last_synced_at,
        last_error,
        conflict_log,
    }))
}

fn optional_mapping(
    result: rusqlite::Result<Result<CalendarEventMapping>>,
) -> Result<Option<CalendarEventMapping>> {
    match result {
        Ok(mapping) => Ok(Some(mapping?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(other) => Err(InfraError::from(other).into()),
    }
}

fn collect_integrations<I>(rows: I) -> Result<Vec<CalendarIntegration>>
where
    I: Iterator<Item = rusqlite::Result<Result<CalendarIntegration>>>,
{
    let mut integrations = Vec::new();
    for row in rows {
        integrations.push(row.map_err(InfraError::from)??);
    }
    Ok(integrations)
}
