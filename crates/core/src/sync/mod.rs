//! Calendar sync engine
//!
//! Keeps course events and their external calendar representations
//! consistent under the integration's sync direction. One pass per
//! integration: create externals for unmapped events, push local
//! updates, and - for pulling directions - fetch remote changes since
//! the sync token and reconcile. When both sides changed since the
//! mapping's last sync, the mapping is marked `Conflict` and resolved
//! last-writer-wins; the losing edit is appended to the mapping's
//! conflict log, never silently dropped.
//!
//! Passes for one integration are serialized through a keyed lock;
//! passes across integrations run concurrently, rate-limited per
//! provider. Quota exhaustion ends the pass early with a retry delay;
//! authentication failure disables the integration until external
//! re-authorization.

pub mod error;
pub mod ports;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use semestra_common::resilience::TokenBucket;
use semestra_domain::{
    CalendarEventMapping, CalendarIntegration, CalendarProviderKind, ConflictRecord,
    ConflictWinner, CourseEvent, MappingSyncStatus,
};

use crate::pipeline::ports::CourseRepository;
use crate::util::locks::KeyedLocks;

use self::error::{SyncError, SyncResult};
use self::ports::{
    CalendarProvider, CredentialProvider, ExternalEventPayload, IntegrationRepository,
    MappingRepository, RemoteEventChange,
};

/// Outcome of one sync pass.
#[derive(Debug, Clone, Default)]
pub struct SyncPassSummary {
    pub created: usize,
    pub updated: usize,
    pub pulled: usize,
    pub conflicts: usize,
    pub errors: usize,
    /// Set when the provider quota ran out mid-pass; the scheduler
    /// retries after this delay
    pub retry_after: Option<Duration>,
}

/// Calendar sync engine over the sync ports.
pub struct CalendarSyncEngine {
    integrations: Arc<dyn IntegrationRepository>,
    mappings: Arc<dyn MappingRepository>,
    courses: Arc<dyn CourseRepository>,
    credentials: Arc<dyn CredentialProvider>,
    providers: HashMap<CalendarProviderKind, Arc<dyn CalendarProvider>>,
    limiters: HashMap<CalendarProviderKind, Arc<TokenBucket>>,
    pass_locks: KeyedLocks,
}

impl CalendarSyncEngine {
    pub fn new(
        integrations: Arc<dyn IntegrationRepository>,
        mappings: Arc<dyn MappingRepository>,
        courses: Arc<dyn CourseRepository>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            integrations,
            mappings,
            courses,
            credentials,
            providers: HashMap::new(),
            limiters: HashMap::new(),
            pass_locks: KeyedLocks::new(),
        }
    }

    /// Register a provider implementation with its request budget.
    pub fn with_provider(
        mut self,
        kind: CalendarProviderKind,
        provider: Arc<dyn CalendarProvider>,
        limiter: Arc<TokenBucket>,
    ) -> Self {
        self.providers.insert(kind, provider);
        self.limiters.insert(kind, limiter);
        self
    }

    /// Run one sync pass for an integration. Passes against the same
    /// integration never overlap.
    #[instrument(skip(self), fields(integration_id))]
    pub async fn sync_pass(&self, integration_id: &str) -> SyncResult<SyncPassSummary> {
        let _guard = self.pass_locks.acquire(integration_id).await;

        let integration =
            self.integrations.get_integration(integration_id).await.map_err(SyncError::from)?;

        let mut summary = SyncPassSummary::default();

        if !integration.sync_enabled {
            debug!(integration_id, "sync disabled; skipping pass");
            return Ok(summary);
        }

        let provider = self
            .providers
            .get(&integration.provider)
            .ok_or_else(|| {
                SyncError::Config(format!(
                    "no provider registered for {}",
                    integration.provider.as_str()
                ))
            })?
            .clone();

        let access_token = match self.credentials.access_token(&integration).await {
            Ok(token) => token,
            Err(SyncError::Auth(message)) => {
                return self.disable_for_reauth(&integration, message).await;
            }
            Err(other) => return Err(other),
        };

        // Pull the remote delta first so conflicts are visible while
        // deciding what to push.
        let mut remote_changes: HashMap<String, RemoteEventChange> = HashMap::new();
        let mut next_sync_token = None;
        if integration.sync_direction.pulls() {
            if !self.throttle(&integration, &mut summary) {
                return Ok(summary);
            }
            match self.fetch_remote_changes(provider.as_ref(), &access_token, &integration).await {
                Ok(changes) => {
                    next_sync_token = Some(changes.next_sync_token);
                    for change in changes.changes {
                        remote_changes.insert(change.external_event_id.clone(), change);
                    }
                }
                Err(SyncError::Auth(message)) => {
                    return self.disable_for_reauth(&integration, message).await;
                }
                Err(err @ SyncError::RateLimit { .. }) => {
                    summary.retry_after = Some(Duration::from_secs(err.retry_delay_secs()));
                    return Ok(summary);
                }
                Err(other) => return Err(other),
            }
        }

        let events =
            self.courses.events_for_user(&integration.user_id).await.map_err(SyncError::from)?;

        let now = Utc::now().timestamp();

        'events: for event in &events {
            let mapping = self
                .mappings
                .mapping_for(&event.id, &integration.id)
                .await
                .map_err(SyncError::from)?;

            match mapping {
                None => {
                    if !integration.sync_direction.pushes() {
                        continue;
                    }
                    if !self.throttle(&integration, &mut summary) {
                        break 'events;
                    }
                    match self
                        .create_external(provider.as_ref(), &access_token, &integration, event, now)
                        .await
                    {
                        Ok(()) => summary.created += 1,
                        Err(SyncError::Auth(message)) => {
                            return self.disable_for_reauth(&integration, message).await;
                        }
                        Err(err @ SyncError::RateLimit { .. }) => {
                            summary.retry_after =
                                Some(Duration::from_secs(err.retry_delay_secs()));
                            break 'events;
                        }
                        Err(other) => {
                            warn!(event_id = %event.id, error = %other, "failed to create external event");
                            summary.errors += 1;
                        }
                    }
                }
                Some(mapping) => {
                    let local_changed = event.updated_at > mapping.last_synced_at.unwrap_or(0);
                    let remote = remote_changes.remove(&mapping.external_event_id);

                    match (local_changed, remote) {
                        (true, Some(remote_change)) if !integration.sync_direction.pushes() => {
                            // From-external integrations treat the
                            // remote side as authoritative
                            match self.apply_remote(event, &mapping, remote_change, now).await {
                                Ok(applied) => {
                                    if applied {
                                        summary.pulled += 1;
                                    }
                                }
                                Err(err) => {
                                    summary.errors += 1;
                                    self.record_mapping_error(&mapping, &err).await;
                                }
                            }
                        }
                        (true, Some(remote_change)) => {
                            if !self.throttle(&integration, &mut summary) {
                                break 'events;
                            }
                            summary.conflicts += 1;
                            if let Err(err) = self
                                .resolve_conflict(
                                    provider.as_ref(),
                                    &access_token,
                                    &integration,
                                    event,
                                    &mapping,
                                    remote_change,
                                    now,
                                )
                                .await
                            {
                                warn!(mapping_id = %mapping.id, error = %err, "conflict resolution failed");
                                summary.errors += 1;
                                self.record_mapping_error(&mapping, &err).await;
                            }
                        }
                        (true, None) if integration.sync_direction.pushes() => {
                            if !self.throttle(&integration, &mut summary) {
                                break 'events;
                            }
                            match self
                                .push_update(
                                    provider.as_ref(),
                                    &access_token,
                                    &integration,
                                    event,
                                    &mapping,
                                    now,
                                )
                                .await
                            {
                                Ok(()) => summary.updated += 1,
                                Err(SyncError::Auth(message)) => {
                                    return self.disable_for_reauth(&integration, message).await;
                                }
                                Err(err @ SyncError::RateLimit { .. }) => {
                                    summary.retry_after =
                                        Some(Duration::from_secs(err.retry_delay_secs()));
                                    break 'events;
                                }
                                Err(other) => {
                                    // Not-found and similar stay on the
                                    // mapping; the pass continues
                                    summary.errors += 1;
                                    self.record_mapping_error(&mapping, &other).await;
                                }
                            }
                        }
                        (false, Some(remote_change)) if integration.sync_direction.pulls() => {
                            match self.apply_remote(event, &mapping, remote_change, now).await {
                                Ok(applied) => {
                                    if applied {
                                        summary.pulled += 1;
                                    }
                                }
                                Err(err) => {
                                    summary.errors += 1;
                                    self.record_mapping_error(&mapping, &err).await;
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        // Remote changes with no mapping belong to events not managed
        // here; they are ignored by design of the mapping table.

        if let Some(token) = next_sync_token {
            self.integrations
                .update_sync_token(&integration.id, &token)
                .await
                .map_err(SyncError::from)?;
        }

        info!(
            integration_id,
            created = summary.created,
            updated = summary.updated,
            pulled = summary.pulled,
            conflicts = summary.conflicts,
            errors = summary.errors,
            "sync pass completed"
        );

        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Pass internals
    // ------------------------------------------------------------------

    /// Consume one request token; on exhaustion set the retry delay
    /// and signal the pass to stop.
    fn throttle(&self, integration: &CalendarIntegration, summary: &mut SyncPassSummary) -> bool {
        let Some(limiter) = self.limiters.get(&integration.provider) else {
            return true;
        };
        if limiter.try_acquire(1) {
            return true;
        }
        let delay = limiter.delay_until_available(1);
        debug!(
            provider = integration.provider.as_str(),
            delay_ms = delay.as_millis() as u64,
            "provider request budget exhausted"
        );
        summary.retry_after = Some(delay);
        false
    }

    async fn fetch_remote_changes(
        &self,
        provider: &dyn CalendarProvider,
        access_token: &str,
        integration: &CalendarIntegration,
    ) -> SyncResult<ports::RemoteChanges> {
        match provider
            .list_changes_since(
                access_token,
                &integration.calendar_id,
                integration.last_sync_token.as_deref(),
            )
            .await
        {
            Ok(changes) => Ok(changes),
            Err(SyncError::TokenInvalid) => {
                // Stale token: clear it and fall back to a full fetch
                warn!(integration_id = %integration.id, "sync token invalid; clearing for full re-fetch");
                self.integrations
                    .clear_sync_token(&integration.id)
                    .await
                    .map_err(SyncError::from)?;
                provider.list_changes_since(access_token, &integration.calendar_id, None).await
            }
            Err(other) => Err(other),
        }
    }

    async fn create_external(
        &self,
        provider: &dyn CalendarProvider,
        access_token: &str,
        integration: &CalendarIntegration,
        event: &CourseEvent,
        now: i64,
    ) -> SyncResult<()> {
        let payload = ExternalEventPayload::from_course_event(event);
        let external_event_id =
            provider.create_event(access_token, &integration.calendar_id, &payload).await?;

        let mapping = CalendarEventMapping {
            id: Uuid::now_v7().to_string(),
            course_event_id: event.id.clone(),
            integration_id: integration.id.clone(),
            external_event_id,
            sync_status: MappingSyncStatus::Synced,
            last_synced_at: Some(now),
            last_error: None,
            conflict_log: Vec::new(),
        };
        self.mappings.upsert_mapping(&mapping).await.map_err(SyncError::from)?;
        Ok(())
    }

    async fn push_update(
        &self,
        provider: &dyn CalendarProvider,
        access_token: &str,
        integration: &CalendarIntegration,
        event: &CourseEvent,
        mapping: &CalendarEventMapping,
        now: i64,
    ) -> SyncResult<()> {
        let payload = ExternalEventPayload::from_course_event(event);
        provider
            .update_event(access_token, &integration.calendar_id, &mapping.external_event_id, &payload)
            .await?;
        self.mappings
            .set_status(&mapping.id, MappingSyncStatus::Synced, None, Some(now))
            .await
            .map_err(SyncError::from)?;
        Ok(())
    }

    /// Apply a remote-only change to the local event. A removed remote
    /// event is surfaced on the mapping instead of deleting local data.
    async fn apply_remote(
        &self,
        event: &CourseEvent,
        mapping: &CalendarEventMapping,
        remote: RemoteEventChange,
        now: i64,
    ) -> SyncResult<bool> {
        if remote.removed {
            self.mappings
                .set_status(
                    &mapping.id,
                    MappingSyncStatus::Error,
                    Some("remote event was removed"),
                    None,
                )
                .await
                .map_err(SyncError::from)?;
            return Ok(false);
        }

        let mut updated = event.clone();
        merge_remote_into(&mut updated, &remote, now);
        self.courses.update_event(&updated).await.map_err(SyncError::from)?;
        self.mappings
            .set_status(&mapping.id, MappingSyncStatus::Synced, None, Some(now))
            .await
            .map_err(SyncError::from)?;
        Ok(true)
    }

    /// Both sides changed since the last sync: mark the conflict,
    /// resolve last-writer-wins, and retain the losing edit in the
    /// mapping's conflict log.
    #[allow(clippy::too_many_arguments)]
    async fn resolve_conflict(
        &self,
        provider: &dyn CalendarProvider,
        access_token: &str,
        integration: &CalendarIntegration,
        event: &CourseEvent,
        mapping: &CalendarEventMapping,
        remote: RemoteEventChange,
        now: i64,
    ) -> SyncResult<()> {
        self.mappings
            .set_status(&mapping.id, MappingSyncStatus::Conflict, None, None)
            .await
            .map_err(SyncError::from)?;

        let remote_wins = remote.modified_at > event.updated_at;

        let record = if remote_wins {
            let discarded = ExternalEventPayload::from_course_event(event);
            ConflictRecord {
                local_modified_at: event.updated_at,
                remote_modified_at: remote.modified_at,
                winner: ConflictWinner::Remote,
                discarded_payload_json: serde_json::to_string(&discarded)
                    .unwrap_or_else(|_| "{}".to_string()),
                recorded_at: now,
            }
        } else {
            ConflictRecord {
                local_modified_at: event.updated_at,
                remote_modified_at: remote.modified_at,
                winner: ConflictWinner::Local,
                discarded_payload_json: serde_json::to_string(&remote)
                    .unwrap_or_else(|_| "{}".to_string()),
                recorded_at: now,
            }
        };
        self.mappings.record_conflict(&mapping.id, &record).await.map_err(SyncError::from)?;

        if remote_wins {
            let mut updated = event.clone();
            merge_remote_into(&mut updated, &remote, now);
            self.courses.update_event(&updated).await.map_err(SyncError::from)?;
        } else {
            let payload = ExternalEventPayload::from_course_event(event);
            provider
                .update_event(
                    access_token,
                    &integration.calendar_id,
                    &mapping.external_event_id,
                    &payload,
                )
                .await?;
        }

        self.mappings
            .set_status(&mapping.id, MappingSyncStatus::Synced, None, Some(now))
            .await
            .map_err(SyncError::from)?;

        info!(
            mapping_id = %mapping.id,
            winner = if remote_wins { "remote" } else { "local" },
            "conflict resolved last-writer-wins"
        );

        Ok(())
    }

    async fn record_mapping_error(&self, mapping: &CalendarEventMapping, err: &SyncError) {
        if let Err(record_err) = self
            .mappings
            .set_status(&mapping.id, MappingSyncStatus::Error, Some(&err.to_string()), None)
            .await
        {
            warn!(mapping_id = %mapping.id, error = %record_err, "failed to record mapping error");
        }
    }

    async fn disable_for_reauth(
        &self,
        integration: &CalendarIntegration,
        message: String,
    ) -> SyncResult<SyncPassSummary> {
        warn!(
            integration_id = %integration.id,
            "authentication failed; disabling sync until re-authorization"
        );
        self.integrations
            .set_sync_enabled(&integration.id, false)
            .await
            .map_err(SyncError::from)?;
        Err(SyncError::Auth(message))
    }
}

/// Overwrite local event fields with the remote edit. `updated_at` and
/// `last_synced_at` share the same clock reading so the event does not
/// read as locally-changed on the next pass.
fn merge_remote_into(event: &mut CourseEvent, remote: &RemoteEventChange, now: i64) {
    if let Some(ref title) = remote.title {
        event.title = title.clone();
    }
    if let Some(starts_at) = remote.starts_at {
        event.starts_at = starts_at;
    }
    if let Some(ends_at) = remote.ends_at {
        event.ends_at = ends_at;
    }
    if let Some(ref location) = remote.location {
        event.location = Some(location.clone());
    }
    event.updated_at = now;
}
