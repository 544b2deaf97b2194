//! Repository integration tests against a temporary database

use std::collections::BTreeMap;

use chrono::NaiveDate;
use semestra_core::{
    CourseRepository, IntegrationRepository, MappingRepository, TokenUsageRecorder,
    UploadJobRepository,
};
use semestra_domain::{
    CalendarEventMapping, CalendarIntegration, CalendarProviderKind, ConflictRecord,
    ConflictWinner, Course, CourseEvent, DocumentType, EventCategory, FileReference, JobStatus,
    MappingSyncStatus, SemestraError, SyncDirection, UploadJob,
};
use semestra_infra::{
    DatabaseManager, SqliteCourseRepository, SqliteIntegrationRepository, SqliteJobRepository,
    SqliteMappingRepository, SqliteTokenUsageRepository,
};
use tempfile::TempDir;

fn test_db() -> (TempDir, DatabaseManager) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = semestra_domain::DatabaseConfig {
        path: dir.path().join("semestra.db").to_string_lossy().into_owned(),
        pool_size: 2,
    };
    let db = DatabaseManager::new(&config).expect("database");
    (dir, db)
}

fn sample_job() -> UploadJob {
    UploadJob::new(
        "user-1",
        FileReference {
            location: "uploads/syllabus.pdf".into(),
            filename: "syllabus.pdf".into(),
            declared_type: DocumentType::Pdf,
        },
        Some("Intro to CS".into()),
    )
}

fn sample_course(id: &str) -> Course {
    let mut grading = BTreeMap::new();
    grading.insert("exams".to_string(), 100.0);

    Course {
        id: id.into(),
        user_id: "user-1".into(),
        title: "Intro to CS".into(),
        code: "CS 101".into(),
        instructor: Some("Dr. Reyes".into()),
        credits: Some(3.0),
        term: "Fall 2025".into(),
        start_date: NaiveDate::from_ymd_opt(2025, 9, 2),
        end_date: NaiveDate::from_ymd_opt(2025, 12, 12),
        grading_weights: grading,
        created_at: 1_756_000_000,
        updated_at: 1_756_000_000,
    }
}

fn sample_event(id: &str, course_id: &str) -> CourseEvent {
    CourseEvent {
        id: id.into(),
        course_id: course_id.into(),
        title: "Midterm".into(),
        category: EventCategory::Exam,
        starts_at: 1_760_000_000,
        ends_at: 1_760_003_600,
        weight: Some(30.0),
        points: None,
        location: Some("Room 204".into()),
        recurrence: None,
        created_at: 1_756_000_000,
        updated_at: 1_756_000_000,
    }
}

fn sample_integration(id: &str) -> CalendarIntegration {
    CalendarIntegration {
        id: id.into(),
        user_id: "user-1".into(),
        provider: CalendarProviderKind::Google,
        calendar_id: "primary".into(),
        sync_direction: SyncDirection::Bidirectional,
        last_sync_token: None,
        sync_enabled: true,
        created_at: 1_756_000_000,
        updated_at: 1_756_000_000,
    }
}

#[tokio::test]
async fn job_round_trip_preserves_fields() {
    let (_dir, db) = test_db();
    let repo = SqliteJobRepository::new(db);

    let mut job = sample_job();
    job.record_error(JobStatus::Pending, "first error");
    repo.create_job(&job).await.unwrap();

    let loaded = repo.get_job(&job.id).await.unwrap();
    assert_eq!(loaded.user_id, "user-1");
    assert_eq!(loaded.file.declared_type, DocumentType::Pdf);
    assert_eq!(loaded.course_title_hint.as_deref(), Some("Intro to CS"));
    assert_eq!(loaded.status, JobStatus::Pending);
    assert_eq!(loaded.errors.len(), 1);
    assert_eq!(loaded.errors[0].stage, JobStatus::Pending);
}

#[tokio::test]
async fn missing_job_is_not_found() {
    let (_dir, db) = test_db();
    let repo = SqliteJobRepository::new(db);

    let result = repo.get_job("no-such-job").await;
    assert!(matches!(result, Err(SemestraError::NotFound(_))));
}

#[tokio::test]
async fn transition_is_compare_and_set_with_audit() {
    let (_dir, db) = test_db();
    let repo = SqliteJobRepository::new(db);
    let job = sample_job();
    repo.create_job(&job).await.unwrap();

    // Legal CAS succeeds
    let moved = repo.transition(&job.id, JobStatus::Pending, JobStatus::ExtractingText).await.unwrap();
    assert!(moved);

    // Re-triggering the same transition is a no-op, not an error
    let repeated =
        repo.transition(&job.id, JobStatus::Pending, JobStatus::ExtractingText).await.unwrap();
    assert!(!repeated);

    let moved =
        repo.transition(&job.id, JobStatus::ExtractingText, JobStatus::AiAnalyzing).await.unwrap();
    assert!(moved);

    let history = repo.transitions(&job.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].from, JobStatus::Pending);
    assert_eq!(history[0].to, JobStatus::ExtractingText);
    assert_eq!(history[1].to, JobStatus::AiAnalyzing);
    assert!(history[0].occurred_at <= history[1].occurred_at);

    let loaded = repo.get_job(&job.id).await.unwrap();
    assert_eq!(loaded.status, JobStatus::AiAnalyzing);
}

#[tokio::test]
async fn update_job_does_not_touch_status() {
    let (_dir, db) = test_db();
    let repo = SqliteJobRepository::new(db);
    let mut job = sample_job();
    repo.create_job(&job).await.unwrap();
    repo.transition(&job.id, JobStatus::Pending, JobStatus::ExtractingText).await.unwrap();

    // Stale in-memory copy tries to write
    job.retry_count = 2;
    repo.update_job(&job).await.unwrap();

    let loaded = repo.get_job(&job.id).await.unwrap();
    assert_eq!(loaded.retry_count, 2);
    assert_eq!(loaded.status, JobStatus::ExtractingText);
}

#[tokio::test]
async fn course_and_events_commit_together() {
    let (_dir, db) = test_db();
    let repo = SqliteCourseRepository::new(db);

    let course = sample_course("course-1");
    let events = vec![sample_event("ev-1", "course-1"), sample_event("ev-2", "course-1")];
    repo.create_course_with_events(&course, &events).await.unwrap();

    let loaded = repo.get_course("course-1").await.unwrap();
    assert_eq!(loaded.code, "CS 101");
    assert_eq!(loaded.grading_weights.get("exams"), Some(&100.0));
    assert_eq!(loaded.start_date, NaiveDate::from_ymd_opt(2025, 9, 2));

    let events = repo.events_for_course("course-1").await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].category, EventCategory::Exam);
}

#[tokio::test]
async fn constraint_violation_rolls_back_everything() {
    let (_dir, db) = test_db();
    let repo = SqliteCourseRepository::new(db.clone());

    let course = sample_course("course-1");
    // Last event violates the primary key: duplicate id
    let events = vec![
        sample_event("ev-1", "course-1"),
        sample_event("ev-2", "course-1"),
        sample_event("ev-1", "course-1"),
    ];

    let result = repo.create_course_with_events(&course, &events).await;
    assert!(matches!(result, Err(SemestraError::Database(_))));

    // Nothing persisted: neither the course nor any event
    assert!(matches!(
        repo.get_course("course-1").await,
        Err(SemestraError::NotFound(_))
    ));
    let conn = db.connection().unwrap();
    let event_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM course_events", [], |row| row.get(0)).unwrap();
    assert_eq!(event_count, 0);
}

#[tokio::test]
async fn deleting_a_course_cascades_to_events() {
    let (_dir, db) = test_db();
    let repo = SqliteCourseRepository::new(db.clone());

    let course = sample_course("course-1");
    repo.create_course_with_events(&course, &[sample_event("ev-1", "course-1")]).await.unwrap();

    let conn = db.connection().unwrap();
    conn.execute("DELETE FROM courses WHERE id = 'course-1'", []).unwrap();

    let event_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM course_events", [], |row| row.get(0)).unwrap();
    assert_eq!(event_count, 0);
}

#[tokio::test]
async fn term_lookup_is_normalization_insensitive() {
    let (_dir, db) = test_db();
    let repo = SqliteCourseRepository::new(db);

    repo.create_course_with_events(&sample_course("course-1"), &[]).await.unwrap();

    let found = repo.find_by_user_term("user-1", "fall  2025").await.unwrap();
    assert_eq!(found.len(), 1);

    let other_term = repo.find_by_user_term("user-1", "Spring 2026").await.unwrap();
    assert!(other_term.is_empty());

    let other_user = repo.find_by_user_term("user-2", "Fall 2025").await.unwrap();
    assert!(other_user.is_empty());
}

#[tokio::test]
async fn event_update_round_trip() {
    let (_dir, db) = test_db();
    let repo = SqliteCourseRepository::new(db);

    repo.create_course_with_events(&sample_course("course-1"), &[sample_event("ev-1", "course-1")])
        .await
        .unwrap();

    let mut event = repo.get_event("ev-1").await.unwrap();
    event.title = "Rescheduled midterm".into();
    event.updated_at = 1_760_100_000;
    repo.update_event(&event).await.unwrap();

    let reloaded = repo.get_event("ev-1").await.unwrap();
    assert_eq!(reloaded.title, "Rescheduled midterm");
    assert_eq!(reloaded.updated_at, 1_760_100_000);
}

#[tokio::test]
async fn integration_token_lifecycle() {
    let (_dir, db) = test_db();
    let repo = SqliteIntegrationRepository::new(db);

    repo.create_integration(&sample_integration("int-1")).unwrap();

    repo.update_sync_token("int-1", "token-1").await.unwrap();
    let loaded = repo.get_integration("int-1").await.unwrap();
    assert_eq!(loaded.last_sync_token.as_deref(), Some("token-1"));
    assert_eq!(loaded.provider, CalendarProviderKind::Google);
    assert_eq!(loaded.sync_direction, SyncDirection::Bidirectional);

    repo.clear_sync_token("int-1").await.unwrap();
    assert!(repo.get_integration("int-1").await.unwrap().last_sync_token.is_none());

    repo.set_sync_enabled("int-1", false).await.unwrap();
    assert!(!repo.get_integration("int-1").await.unwrap().sync_enabled);
    assert!(repo.list_enabled().await.unwrap().is_empty());
}

#[tokio::test]
async fn mapping_upsert_enforces_one_per_pair() {
    let (_dir, db) = test_db();
    let courses = SqliteCourseRepository::new(db.clone());
    let integrations = SqliteIntegrationRepository::new(db.clone());
    let repo = SqliteMappingRepository::new(db.clone());

    courses
        .create_course_with_events(&sample_course("course-1"), &[sample_event("ev-1", "course-1")])
        .await
        .unwrap();
    integrations.create_integration(&sample_integration("int-1")).unwrap();

    let mapping = CalendarEventMapping {
        id: "map-1".into(),
        course_event_id: "ev-1".into(),
        integration_id: "int-1".into(),
        external_event_id: "ext-1".into(),
        sync_status: MappingSyncStatus::Synced,
        last_synced_at: Some(1_760_000_000),
        last_error: None,
        conflict_log: vec![],
    };
    repo.upsert_mapping(&mapping).await.unwrap();

    // Upserting the same pair replaces rather than duplicates
    let mut replacement = mapping.clone();
    replacement.external_event_id = "ext-2".into();
    repo.upsert_mapping(&replacement).await.unwrap();

    let conn = db.connection().unwrap();
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM calendar_event_mappings", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);

    let loaded = repo.mapping_for("ev-1", "int-1").await.unwrap().unwrap();
    assert_eq!(loaded.external_event_id, "ext-2");
}

#[tokio::test]
async fn mapping_conflict_log_accumulates() {
    let (_dir, db) = test_db();
    let courses = SqliteCourseRepository::new(db.clone());
    let integrations = SqliteIntegrationRepository::new(db.clone());
    let repo = SqliteMappingRepository::new(db);

    courses
        .create_course_with_events(&sample_course("course-1"), &[sample_event("ev-1", "course-1")])
        .await
        .unwrap();
    integrations.create_integration(&sample_integration("int-1")).unwrap();

    let mapping = CalendarEventMapping {
        id: "map-1".into(),
        course_event_id: "ev-1".into(),
        integration_id: "int-1".into(),
        external_event_id: "ext-1".into(),
        sync_status: MappingSyncStatus::Synced,
        last_synced_at: Some(1_760_000_000),
        last_error: None,
        conflict_log: vec![],
    };
    repo.upsert_mapping(&mapping).await.unwrap();

    let record = ConflictRecord {
        local_modified_at: 1_760_000_100,
        remote_modified_at: 1_760_000_200,
        winner: ConflictWinner::Remote,
        discarded_payload_json: "{\"title\":\"Local title\"}".into(),
        recorded_at: 1_760_000_300,
    };
    repo.record_conflict("map-1", &record).await.unwrap();
    repo.set_status("map-1", MappingSyncStatus::Conflict, None, None).await.unwrap();

    let loaded = repo.mapping_for("ev-1", "int-1").await.unwrap().unwrap();
    assert_eq!(loaded.sync_status, MappingSyncStatus::Conflict);
    assert_eq!(loaded.conflict_log.len(), 1);
    assert_eq!(loaded.conflict_log[0].winner, ConflictWinner::Remote);
    // set_status without a timestamp preserves last_synced_at
    assert_eq!(loaded.last_synced_at, Some(1_760_000_000));
}

#[tokio::test]
async fn token_usage_totals_accumulate() {
    let (_dir, db) = test_db();
    let repo = SqliteTokenUsageRepository::new(db);

    repo.record_usage("job-1", 800, 150).await.unwrap();
    repo.record_usage("job-1", 400, 90).await.unwrap();
    repo.record_usage("job-2", 100, 10).await.unwrap();

    let (prompt, completion) = repo.totals_for_job("job-1").unwrap();
    assert_eq!(prompt, 1200);
    assert_eq!(completion, 240);
}
