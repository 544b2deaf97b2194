//! Calendar sync engine tests over mock ports

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Weekday};

use semestra_common::resilience::TokenBucket;
use semestra_core::sync::error::SyncError;
use semestra_core::sync::ports::{RemoteChanges, RemoteEventChange};
use semestra_core::{CalendarSyncEngine, CourseRepository, IntegrationRepository};
use semestra_domain::{
    CalendarIntegration, CalendarProviderKind, ConflictWinner, Course, CourseEvent, EventCategory,
    MappingSyncStatus, Recurrence, SyncDirection,
};

use support::{
    MockCalendarProvider, MockCourseRepository, MockCredentialProvider, MockIntegrationRepository,
    MockMappingRepository,
};

fn integration(direction: SyncDirection) -> CalendarIntegration {
    CalendarIntegration {
        id: "int-1".into(),
        user_id: "user-1".into(),
        provider: CalendarProviderKind::Google,
        calendar_id: "primary".into(),
        sync_direction: direction,
        last_sync_token: Some("token-0".into()),
        sync_enabled: true,
        created_at: 0,
        updated_at: 0,
    }
}

fn course() -> Course {
    Course {
        id: "course-1".into(),
        user_id: "user-1".into(),
        title: "Intro to CS".into(),
        code: "CS 101".into(),
        instructor: None,
        credits: Some(3.0),
        term: "Fall 2025".into(),
        start_date: None,
        end_date: None,
        grading_weights: BTreeMap::new(),
        created_at: 0,
        updated_at: 0,
    }
}

fn event(id: &str, updated_at: i64) -> CourseEvent {
    CourseEvent {
        id: id.into(),
        course_id: "course-1".into(),
        title: format!("Event {}", id),
        category: EventCategory::Exam,
        starts_at: 1_760_000_000,
        ends_at: 1_760_003_600,
        weight: None,
        points: None,
        location: None,
        recurrence: None,
        created_at: 0,
        updated_at,
    }
}

struct Harness {
    integrations: Arc<MockIntegrationRepository>,
    mappings: Arc<MockMappingRepository>,
    courses: Arc<MockCourseRepository>,
    provider: Arc<MockCalendarProvider>,
    engine: CalendarSyncEngine,
}

fn harness(direction: SyncDirection, rate_per_minute: u32) -> Harness {
    let integrations = Arc::new(MockIntegrationRepository::with(integration(direction)));
    let mappings = Arc::new(MockMappingRepository::new());
    let courses = Arc::new(MockCourseRepository::new());
    courses.seed_course(course());
    let provider = Arc::new(MockCalendarProvider::new());

    let limiter = Arc::new(TokenBucket::per_minute(rate_per_minute).unwrap());
    let engine = CalendarSyncEngine::new(
        integrations.clone(),
        mappings.clone(),
        courses.clone(),
        Arc::new(MockCredentialProvider::ok()),
    )
    .with_provider(CalendarProviderKind::Google, provider.clone(), limiter);

    Harness { integrations, mappings, courses, provider, engine }
}

#[tokio::test]
async fn initial_pass_creates_externals_and_mappings() {
    let h = harness(SyncDirection::ToExternal, 600);
    h.courses.seed_event(event("ev-1", 100));
    h.courses.seed_event(event("ev-2", 100));

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.created, 2);
    assert_eq!(summary.errors, 0);
    let mappings = h.mappings.all();
    assert_eq!(mappings.len(), 2);
    for mapping in &mappings {
        assert_eq!(mapping.sync_status, MappingSyncStatus::Synced);
        assert!(mapping.last_synced_at.is_some());
    }
}

#[tokio::test]
async fn sync_pass_is_idempotent() {
    let h = harness(SyncDirection::Bidirectional, 600);
    h.courses.seed_event(event("ev-1", 100));

    let first = h.engine.sync_pass("int-1").await.unwrap();
    assert_eq!(first.created, 1);

    let mappings_before = h.mappings.all();
    let second = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.pulled, 0);
    assert_eq!(second.conflicts, 0);
    let mappings_after = h.mappings.all();
    assert_eq!(mappings_before.len(), mappings_after.len());
    for (before, after) in mappings_before.iter().zip(mappings_after.iter()) {
        assert_eq!(before.sync_status, after.sync_status);
        assert_eq!(before.external_event_id, after.external_event_id);
    }
}

#[tokio::test]
async fn local_edit_pushes_an_update() {
    let h = harness(SyncDirection::ToExternal, 600);
    h.courses.seed_event(event("ev-1", 100));
    h.engine.sync_pass("int-1").await.unwrap();

    // Edit the local event after the first sync
    let mut edited = h.courses.event("ev-1").unwrap();
    edited.title = "Rescheduled exam".into();
    edited.updated_at = chrono::Utc::now().timestamp() + 10;
    h.courses.update_event(&edited).await.unwrap();

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.updated, 1);
    let updated = h.provider.updated.lock().unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].1.title, "Rescheduled exam");
}

#[tokio::test]
async fn bidirectional_conflict_resolves_to_later_remote_edit() {
    let h = harness(SyncDirection::Bidirectional, 600);
    h.courses.seed_event(event("ev-1", 100));
    h.engine.sync_pass("int-1").await.unwrap();
    let mapping = h.mappings.by_event("ev-1").unwrap();

    // Local edit at T1
    let mut edited = h.courses.event("ev-1").unwrap();
    let t1 = mapping.last_synced_at.unwrap() + 10;
    edited.title = "Local title".into();
    edited.updated_at = t1;
    h.courses.update_event(&edited).await.unwrap();

    // Remote edit at T2 > T1
    let t2 = t1 + 10;
    h.provider.script_changes(Ok(RemoteChanges {
        changes: vec![RemoteEventChange {
            external_event_id: mapping.external_event_id.clone(),
            removed: false,
            title: Some("Remote title".into()),
            starts_at: None,
            ends_at: None,
            location: None,
            modified_at: t2,
        }],
        next_sync_token: "token-2".into(),
    }));

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.conflicts, 1);
    // Remote version prevails locally
    assert_eq!(h.courses.event("ev-1").unwrap().title, "Remote title");

    // The discarded local edit is retained in the conflict log
    let mapping = h.mappings.by_event("ev-1").unwrap();
    assert_eq!(mapping.sync_status, MappingSyncStatus::Synced);
    assert_eq!(mapping.conflict_log.len(), 1);
    let record = &mapping.conflict_log[0];
    assert_eq!(record.winner, ConflictWinner::Remote);
    assert_eq!(record.local_modified_at, t1);
    assert_eq!(record.remote_modified_at, t2);
    assert!(record.discarded_payload_json.contains("Local title"));

    // The fresh sync token is stored
    assert_eq!(
        h.integrations.get("int-1").unwrap().last_sync_token.as_deref(),
        Some("token-2")
    );
}

#[tokio::test]
async fn bidirectional_conflict_keeps_later_local_edit() {
    let h = harness(SyncDirection::Bidirectional, 600);
    h.courses.seed_event(event("ev-1", 100));
    h.engine.sync_pass("int-1").await.unwrap();
    let mapping = h.mappings.by_event("ev-1").unwrap();

    let remote_t = mapping.last_synced_at.unwrap() + 5;
    let local_t = remote_t + 5;

    let mut edited = h.courses.event("ev-1").unwrap();
    edited.title = "Local wins".into();
    edited.updated_at = local_t;
    h.courses.update_event(&edited).await.unwrap();

    h.provider.script_changes(Ok(RemoteChanges {
        changes: vec![RemoteEventChange {
            external_event_id: mapping.external_event_id.clone(),
            removed: false,
            title: Some("Remote loses".into()),
            starts_at: None,
            ends_at: None,
            location: None,
            modified_at: remote_t,
        }],
        next_sync_token: "token-2".into(),
    }));

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.conflicts, 1);
    assert_eq!(h.courses.event("ev-1").unwrap().title, "Local wins");

    let mapping = h.mappings.by_event("ev-1").unwrap();
    let record = &mapping.conflict_log[0];
    assert_eq!(record.winner, ConflictWinner::Local);
    assert!(record.discarded_payload_json.contains("Remote loses"));

    // The winning local edit was pushed outward
    let updated = h.provider.updated.lock().unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].1.title, "Local wins");
}

#[tokio::test]
async fn quota_exhaustion_ends_the_pass_with_retry_delay() {
    // Budget of 1 request per minute; two events to create
    let h = harness(SyncDirection::ToExternal, 1);
    h.courses.seed_event(event("ev-1", 100));
    h.courses.seed_event(event("ev-2", 100));

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.created, 1);
    assert!(summary.retry_after.is_some());
    assert_eq!(h.mappings.all().len(), 1);
}

#[tokio::test]
async fn provider_rate_limit_ends_the_pass_with_retry_delay() {
    let h = harness(SyncDirection::ToExternal, 600);
    h.courses.seed_event(event("ev-1", 100));
    h.provider.script_create(Err(SyncError::RateLimit {
        message: "quota exceeded".into(),
        retry_after_secs: Some(120),
    }));

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.created, 0);
    assert_eq!(summary.retry_after, Some(Duration::from_secs(120)));
    assert!(h.mappings.all().is_empty());
}

#[tokio::test]
async fn auth_failure_disables_the_integration() {
    let integrations = Arc::new(MockIntegrationRepository::with(integration(
        SyncDirection::ToExternal,
    )));
    let mappings = Arc::new(MockMappingRepository::new());
    let courses = Arc::new(MockCourseRepository::new());
    courses.seed_course(course());
    let provider = Arc::new(MockCalendarProvider::new());

    let engine = CalendarSyncEngine::new(
        integrations.clone(),
        mappings,
        courses,
        Arc::new(MockCredentialProvider::failing_auth()),
    )
    .with_provider(
        CalendarProviderKind::Google,
        provider,
        Arc::new(TokenBucket::per_minute(60).unwrap()),
    );

    let result = engine.sync_pass("int-1").await;

    assert!(matches!(result, Err(SyncError::Auth(_))));
    assert!(!integrations.get("int-1").unwrap().sync_enabled);
}

#[tokio::test]
async fn disabled_integration_skips_the_pass() {
    let h = harness(SyncDirection::ToExternal, 600);
    h.courses.seed_event(event("ev-1", 100));
    h.integrations.set_sync_enabled("int-1", false).await.unwrap();

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.created, 0);
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn invalid_sync_token_clears_and_refetches() {
    let h = harness(SyncDirection::Bidirectional, 600);
    h.courses.seed_event(event("ev-1", 100));
    h.provider.script_changes(Err(SyncError::TokenInvalid));
    h.provider.script_changes(Ok(RemoteChanges {
        changes: vec![],
        next_sync_token: "recovered".into(),
    }));

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.created, 1);
    assert_eq!(
        h.integrations.get("int-1").unwrap().last_sync_token.as_deref(),
        Some("recovered")
    );
}

#[tokio::test]
async fn recurring_event_syncs_as_one_recurring_external_event() {
    let h = harness(SyncDirection::ToExternal, 600);
    let mut recurring = event("ev-1", 100);
    recurring.category = EventCategory::Class;
    recurring.recurrence = Some(Recurrence {
        days: vec![Weekday::Mon, Weekday::Wed, Weekday::Fri],
        until: NaiveDate::from_ymd_opt(2025, 12, 12).unwrap(),
    });
    h.courses.seed_event(recurring);

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.created, 1);
    let created = h.provider.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    let payload = &created[0].1;
    assert!(payload.recurrence.is_some());
    assert_eq!(payload.recurrence.as_ref().unwrap().days.len(), 3);
}

#[tokio::test]
async fn not_found_on_update_is_recorded_without_failing_the_pass() {
    let h = harness(SyncDirection::ToExternal, 600);
    h.courses.seed_event(event("ev-1", 100));
    h.courses.seed_event(event("ev-2", 100));
    h.engine.sync_pass("int-1").await.unwrap();

    // Edit both; the first update hits a deleted remote event
    for id in ["ev-1", "ev-2"] {
        let mut edited = h.courses.event(id).unwrap();
        edited.updated_at = chrono::Utc::now().timestamp() + 10;
        h.courses.update_event(&edited).await.unwrap();
    }
    h.provider.script_update(Err(SyncError::NotFound("event gone".into())));

    let summary = h.engine.sync_pass("int-1").await.unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(summary.updated, 1);

    let mappings = h.mappings.all();
    let errored: Vec<_> = mappings
        .iter()
        .filter(|m| m.sync_status == MappingSyncStatus::Error)
        .collect();
    assert_eq!(errored.len(), 1);
    assert!(errored[0].last_error.as_ref().unwrap().contains("event gone"));
}
