//! SQLite-backed implementation of the CourseRepository port.
//!
//! Materialization runs in a single transaction: the course row and
//! every event row commit together or not at all.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, Row, ToSql};
use semestra_core::CourseRepository;
use semestra_domain::{
    normalize_course_code, normalize_term, Course, CourseEvent, EventCategory, Result,
    SemestraError,
};
use tracing::{debug, instrument};

use crate::errors::InfraError;

use super::manager::DatabaseManager;

/// SQLite implementation of CourseRepository.
pub struct SqliteCourseRepository {
    db: DatabaseManager,
}

impl SqliteCourseRepository {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CourseRepository for SqliteCourseRepository {
    #[instrument(skip(self, course, events), fields(course_id = %course.id, events = events.len()))]
    async fn create_course_with_events(
        &self,
        course: &Course,
        events: &[CourseEvent],
    ) -> Result<()> {
        let mut conn = self.db.connection()?;
        let tx = conn.transaction().map_err(InfraError::from)?;

        tx.execute(
            "INSERT INTO courses (
                id, user_id, title, code, code_normalized, instructor,
                credits, term, term_normalized, start_date, end_date,
                grading_weights_json, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            [
                &course.id as &dyn ToSql,
                &course.user_id,
                &course.title,
                &course.code,
                &normalize_course_code(&course.code),
                &course.instructor,
                &course.credits,
                &course.term,
                &normalize_term(&course.term).to_lowercase(),
                &course.start_date.map(|d| d.to_string()),
                &course.end_date.map(|d| d.to_string()),
                &serde_json::to_string(&course.grading_weights).map_err(InfraError::from)?,
                &course.created_at,
                &course.updated_at,
            ]
            .as_ref(),
        )
        .map_err(InfraError::from)?;

        for event in events {
            insert_event(&tx, event)?;
        }

        tx.commit().map_err(InfraError::from)?;
        debug!(course_id = %course.id, "course and events committed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_course(&self, course_id: &str) -> Result<Course> {
        let conn = self.db.connection()?;

        conn.query_row(
            "SELECT id, user_id, title, code, instructor, credits, term,
                    start_date, end_date, grading_weights_json, created_at, updated_at
             FROM courses WHERE id = ?1",
            [&course_id],
            course_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                SemestraError::NotFound(format!("course {} not found", course_id))
            }
            other => InfraError::from(other).into(),
        })?
    }

    #[instrument(skip(self))]
    async fn find_by_user_term(&self, user_id: &str, term: &str) -> Result<Vec<Course>> {
        let conn = self.db.connection()?;
        let normalized = normalize_term(term).to_lowercase();

        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, title, code, instructor, credits, term,
                        start_date, end_date, grading_weights_json, created_at, updated_at
                 FROM courses WHERE user_id = ?1 AND term_normalized = ?2",
            )
            .map_err(InfraError::from)?;

        let rows = stmt
            .query_map([user_id, normalized.as_str()], course_from_row)
            .map_err(InfraError::from)?;

        collect_course_rows(rows)
    }

    #[instrument(skip(self))]
    async fn events_for_course(&self, course_id: &str) -> Result<Vec<CourseEvent>> {
        let conn = self.db.connection()?;

        let mut stmt = conn
            .prepare(
                "SELECT id, course_id, title, category, starts_at, ends_at,
                        weight, points, location, recurrence_json, created_at, updated_at
                 FROM course_events WHERE course_id = ?1 ORDER BY starts_at ASC",
            )
            .map_err(InfraError::from)?;

        let rows = stmt.query_map([&course_id], event_from_row).map_err(InfraError::from)?;
        collect_event_rows(rows)
    }

    #[instrument(skip(self))]
    async fn events_for_user(&self, user_id: &str) -> Result<Vec<CourseEvent>> {
        let conn = self.db.connection()?;

        let mut stmt = conn
            .prepare(
                "SELECT e.id, e.course_id, e.title, e.category, e.starts_at, e.ends_at,
                        e.weight, e.points, e.location, e.recurrence_json, e.created_at, e.updated_at
                 FROM course_events e
                 JOIN courses c ON c.id = e.course_id
                 WHERE c.user_id = ?1
                 ORDER BY e.starts_at ASC",
            )
            .map_err(InfraError::from)?;

        let rows = stmt.query_map([&user_id], event_from_row).map_err(InfraError::from)?;
        collect_event_rows(rows)
    }

    #[instrument(skip(self))]
    async fn get_event(&self, event_id: &str) -> Result<CourseEvent> {
        let conn = self.db.connection()?;

        conn.query_row(
            "SELECT id, course_id, title, category, starts_at, ends_at,
                    weight, points, location, recurrence_json, created_at, updated_at
             FROM course_events WHERE id = ?1",
            [&event_id],
            event_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                SemestraError::NotFound(format!("event {} not found", event_id))
            }
            other => InfraError::from(other).into(),
        })?
    }

    #[instrument(skip(self, event), fields(event_id = %event.id))]
    async fn update_event(&self, event: &CourseEvent) -> Result<()> {
        let conn = self.db.connection()?;

        let updated = conn
            .execute(
                "UPDATE course_events SET
                    title = ?1, category = ?2, starts_at = ?3, ends_at = ?4,
                    weight = ?5, points = ?6, location = ?7,
                    recurrence_json = ?8, updated_at = ?9
                 WHERE id = ?10",
                [
                    &event.title as &dyn ToSql,
                    &event.category.as_str(),
                    &event.starts_at,
                    &event.ends_at,
                    &event.weight,
                    &event.points,
                    &event.location,
                    &recurrence_json(event)?,
                    &event.updated_at,
                    &event.id,
                ]
                .as_ref(),
            )
            .map_err(InfraError::from)?;

        if updated == 0 {
            return Err(SemestraError::NotFound(format!("event {} not found", event.id)));
        }
        Ok(())
    }
}

fn insert_event(conn: &Connection, event: &CourseEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO course_events (
            id, course_id, title, category, starts_at, ends_at,
            weight, points, location, recurrence_json, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        [
            &event.id as &dyn ToSql,
            &event.course_id,
            &event.title,
            &event.category.as_str(),
            &event.starts_at,
            &event.ends_at,
            &event.weight,
            &event.points,
            &event.location,
            &recurrence_json(event)?,
            &event.created_at,
            &event.updated_at,
        ]
        .as_ref(),
    )
    .map_err(InfraError::from)?;
    Ok(())
}

fn recurrence_json(event: &CourseEvent) -> Result<Option<String>> {
    match &event.recurrence {
        Some(recurrence) => {
            Ok(Some(serde_json::to_string(recurrence).map_err(InfraError::from)?))
        }
        None => Ok(None),
    }
}

fn parse_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| s.parse().ok())
}

fn course_from_row(row: &Row<'_>) -> rusqlite::Result<Result<Course>> {
    let grading_raw: String = row.get(9)?;
    let start_raw: Option<String> = row.get(7)?;
    let end_raw: Option<String> = row.get(8)?;

    let course = (|| {
        Ok(Course {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            code: row.get(3)?,
            instructor: row.get(4)?,
            credits: row.get(5)?,
            term: row.get(6)?,
            start_date: parse_date(start_raw),
            end_date: parse_date(end_raw),
            grading_weights: serde_json::from_str(&grading_raw)
                .unwrap_or_default(),
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    })();

    match course {
        Ok(course) => Ok(Ok(course)),
        Err(e) => Err(e),
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Result<CourseEvent>> {
    let category_raw: String = row.get(3)?;
    let recurrence_raw: Option<String> = row.get(9)?;

    let category = EventCategory::parse(&category_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown event category '{}'", category_raw).into(),
        )
    })?;

    let event = CourseEvent {
        id: row.get(0)?,
        course_id: row.get(1)?,
        title: row.get(2)?,
        category,
        starts_at: row.get(4)?,
        ends_at: row.get(5)?,
        weight: row.get(6)?,
        points: row.get(7)?,
        location: row.get(8)?,
        recurrence: recurrence_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    };

    Ok(Ok(event))
}

fn collect_course_rows<I>(rows: I) -> Result<Vec<Course>>
where
    I: Iterator<Item = rusqlite::Result<Result<Course>>>,
{
    let mut courses = Vec::new();
    for row in rows {
        courses.push(row.map_err(InfraError::from)??);
    }
    Ok(courses)
}

fn collect_event_rows<I>(rows: I) -> Result<Vec<CourseEvent>>
where
    I: Iterator<Item = rusqlite::Result<Result<CourseEvent>>>,
{
    let mut events = Vec::new();
    for row in rows {
        events.push(row.map_err(InfraError::from)??);
    }
    Ok(events)
}
