//! Port interfaces for calendar synchronization

use async_trait::async_trait;
use semestra_domain::{
    CalendarEventMapping, CalendarIntegration, ConflictRecord, CourseEvent, MappingSyncStatus,
    Recurrence, Result,
};
use serde::{Deserialize, Serialize};

use super::error::SyncResult;

/// Payload for an external calendar event, provider-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEventPayload {
    pub title: String,
    pub description: Option<String>,
    pub starts_at: i64,
    pub ends_at: i64,
    pub location: Option<String>,
    /// Weekly recurrence; providers expand this into a single
    /// recurring event, never one event per occurrence
    pub recurrence: Option<Recurrence>,
}

impl ExternalEventPayload {
    /// Build the payload for a course event.
    pub fn from_course_event(event: &CourseEvent) -> Self {
        Self {
            title: event.title.clone(),
            description: None,
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            location: event.location.clone(),
            recurrence: event.recurrence.clone(),
        }
    }
}

/// One remote change reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEventChange {
    pub external_event_id: String,
    /// The remote event was deleted
    pub removed: bool,
    pub title: Option<String>,
    pub starts_at: Option<i64>,
    pub ends_at: Option<i64>,
    pub location: Option<String>,
    /// Remote modification timestamp; drives last-writer-wins
    pub modified_at: i64,
}

/// Remote changes since a sync token, plus the fresh token.
#[derive(Debug, Clone)]
pub struct RemoteChanges {
    pub changes: Vec<RemoteEventChange>,
    pub next_sync_token: String,
}

/// Trait for external calendar provider operations, each scoped to one
/// calendar id. Implementations own no retries.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Create an event, returning the provider-assigned event id
    async fn create_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        payload: &ExternalEventPayload,
    ) -> SyncResult<String>;

    /// Update an existing event
    async fn update_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        external_event_id: &str,
        payload: &ExternalEventPayload,
    ) -> SyncResult<()>;

    /// Delete an event
    async fn delete_event(
        &self,
        access_token: &str,
        calendar_id: &str,
        external_event_id: &str,
    ) -> SyncResult<()>;

    /// Changes since the given sync token; `None` requests a full
    /// window fetch. A stale token fails with `TokenInvalid`.
    async fn list_changes_since(
        &self,
        access_token: &str,
        calendar_id: &str,
        sync_token: Option<&str>,
    ) -> SyncResult<RemoteChanges>;
}

/// Trait for calendar integration persistence.
#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn get_integration(&self, integration_id: &str) -> Result<CalendarIntegration>;

    /// Integrations with sync enabled, for the scheduler
    async fn list_enabled(&self) -> Result<Vec<CalendarIntegration>>;

    /// Integrations for one user, for event-driven sync
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<CalendarIntegration>>;

    async fn update_sync_token(&self, integration_id: &str, token: &str) -> Result<()>;

    /// Clear an invalidated sync token so the next pass re-fetches
    async fn clear_sync_token(&self, integration_id: &str) -> Result<()>;

    /// Toggle sync; authentication failures disable until re-auth
    async fn set_sync_enabled(&self, integration_id: &str, enabled: bool) -> Result<()>;
}

/// Trait for event-mapping persistence.
#[async_trait]
pub trait MappingRepository: Send + Sync {
    async fn mapping_for(
        &self,
        course_event_id: &str,
        integration_id: &str,
    ) -> Result<Option<CalendarEventMapping>>;

    async fn find_by_external_id(
        &self,
        integration_id: &str,
        external_event_id: &str,
    ) -> Result<Option<CalendarEventMapping>>;

    /// Insert or update; at most one mapping per (course_event,
    /// integration) pair
    async fn upsert_mapping(&self, mapping: &CalendarEventMapping) -> Result<()>;

    /// Update status, error, and last-synced metadata
    async fn set_status(
        &self,
        mapping_id: &str,
        status: MappingSyncStatus,
        last_error: Option<&str>,
        last_synced_at: Option<i64>,
    ) -> Result<()>;

    /// Append a resolved conflict to the mapping's log
    async fn record_conflict(&self, mapping_id: &str, record: &ConflictRecord) -> Result<()>;
}

/// Trait for the authentication collaborator: supplies a valid access
/// credential per integration and signals when re-authorization is
/// required via `SyncError::Auth`.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn access_token(&self, integration: &CalendarIntegration) -> SyncResult<String>;
}
