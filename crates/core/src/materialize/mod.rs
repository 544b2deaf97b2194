//! Materializer
//!
//! Atomically converts an approved draft into a durable `Course` and
//! its `CourseEvent`s. The repository performs the write as a single
//! transaction; on any constraint violation nothing is persisted and
//! the error surfaces as `Materialization`. Raw event-type strings map
//! onto the closed category set; unrecognized values become `Other`
//! rather than failing. On success a `CourseMaterialized` event is
//! published, the sole input of the calendar sync engine.

use std::sync::Arc;

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use semestra_domain::{
    Course, CourseEvent, EventCategory, ExtractedDraft, Recurrence, Result, SemestraError,
    UploadJob,
};

use crate::events::{DomainEvent, EventBus};
use crate::pipeline::ports::CourseRepository;

/// Result of a successful materialization.
#[derive(Debug, Clone)]
pub struct MaterializeOutcome {
    pub course_id: String,
    pub event_ids: Vec<String>,
    /// Advisory warnings (e.g. grading categories with no events)
    pub warnings: Vec<String>,
}

/// Materializer over the course repository and event bus.
pub struct Materializer {
    courses: Arc<dyn CourseRepository>,
    bus: Arc<EventBus>,
}

impl Materializer {
    pub fn new(courses: Arc<dyn CourseRepository>, bus: Arc<EventBus>) -> Self {
        Self { courses, bus }
    }

    /// Materialize an approved draft for the given job.
    #[instrument(skip(self, draft), fields(job_id = %job.id, user_id = %job.user_id))]
    pub async fn materialize(
        &self,
        job: &UploadJob,
        draft: &ExtractedDraft,
    ) -> Result<MaterializeOutcome> {
        if !draft.grading_weights_valid() {
            return Err(SemestraError::Materialization(format!(
                "grading weights sum to {:.1}, expected 100",
                draft.grading_weights.values().sum::<f64>()
            )));
        }

        let now = Utc::now().timestamp();
        let course = Course {
            id: Uuid::now_v7().to_string(),
            user_id: job.user_id.clone(),
            title: draft.course.title.clone(),
            code: draft.course.code.clone(),
            instructor: draft.course.instructor.clone(),
            credits: draft.course.credits,
            term: draft.course.term.clone(),
            start_date: draft.course.start_date,
            end_date: draft.course.end_date,
            grading_weights: draft.grading_weights.clone(),
            created_at: now,
            updated_at: now,
        };

        let mut events = Vec::new();
        let mut warnings = Vec::new();

        // Dated events from the schedule section
        for draft_event in &draft.events {
            let raw_category =
                draft_event.category.as_deref().unwrap_or(draft_event.event_type.as_str());
            let starts_at = draft_event.starts_at.timestamp();
            let ends_at = draft_event
                .ends_at
                .map_or(starts_at + 3600, |end| end.timestamp());

            events.push(CourseEvent {
                id: Uuid::now_v7().to_string(),
                course_id: course.id.clone(),
                title: draft_event.title.clone(),
                category: EventCategory::from_raw(raw_category),
                starts_at,
                ends_at,
                weight: draft_event.weight,
                points: draft_event.points,
                location: None,
                recurrence: None,
                created_at: now,
                updated_at: now,
            });
        }

        // Weekly meeting patterns become recurring class events
        match (draft.course.start_date, draft.course.end_date) {
            (Some(start), Some(end)) => {
                for meeting in &draft.meeting_times {
                    let Some(first) = first_occurrence(start, end, &meeting.days) else {
                        warn!("meeting pattern has no occurrence inside the course date range");
                        continue;
                    };
                    let starts_at = first.and_time(meeting.start_time).and_utc().timestamp();
                    let ends_at = first.and_time(meeting.end_time).and_utc().timestamp();

                    events.push(CourseEvent {
                        id: Uuid::now_v7().to_string(),
                        course_id: course.id.clone(),
                        title: format!("{} Class", course.code),
                        category: EventCategory::Class,
                        starts_at,
                        ends_at,
                        weight: None,
                        points: None,
                        location: meeting.location.clone(),
                        recurrence: Some(Recurrence { days: meeting.days.clone(), until: end }),
                        created_at: now,
                        updated_at: now,
                    });
                }
            }
            _ if !draft.meeting_times.is_empty() => {
                warnings.push(
                    "meeting times present but course date range is incomplete; \
                     no recurring class events created"
                        .to_string(),
                );
            }
            _ => {}
        }

        // Grading categories should be covered by at least one event;
        // a miss is advisory, never blocking.
        for category_name in draft.grading_weights.keys() {
            let mapped = EventCategory::from_raw(category_name);
            let covered = events.iter().any(|event| event.category == mapped);
            if !covered {
                warnings.push(format!(
                    "grading category '{}' has no matching events",
                    category_name
                ));
            }
        }

        self.courses.create_course_with_events(&course, &events).await.map_err(|e| match e {
            SemestraError::Database(msg) => SemestraError::Materialization(msg),
            other => other,
        })?;

        let event_ids: Vec<String> = events.iter().map(|event| event.id.clone()).collect();

        info!(
            course_id = %course.id,
            events = event_ids.len(),
            warnings = warnings.len(),
            "course materialized"
        );

        self.bus.publish(&DomainEvent::CourseMaterialized {
            course_id: course.id.clone(),
            event_ids: event_ids.clone(),
            user_id: job.user_id.clone(),
        });

        Ok(MaterializeOutcome { course_id: course.id, event_ids, warnings })
    }
}

/// Earliest date within [start, end] falling on one of the given
/// weekdays.
fn first_occurrence(
    start: NaiveDate,
    end: NaiveDate,
    days: &[chrono::Weekday],
) -> Option<NaiveDate> {
    if days.is_empty() || start > end {
        return None;
    }
    let mut date = start;
    // A week is enough to hit any requested weekday
    for _ in 0..7 {
        if days.contains(&date.weekday()) {
            return Some(date);
        }
        date += ChronoDuration::days(1);
        if date > end {
            return None;
        }
    }
    None
}
