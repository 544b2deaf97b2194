//! Materialized course model
//!
//! Durable entities produced by the materializer. A course owns its
//! events; deleting a course deletes its events (enforced by the
//! repository schema's cascade).

use std::collections::BTreeMap;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Closed set of event categories.
///
/// Raw extracted type strings map onto this set in exactly one place:
/// [`EventCategory::from_raw`]. Unrecognized values become `Other`
/// rather than failing materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Class,
    Assignment,
    Exam,
    Quiz,
    Project,
    Lecture,
    Lab,
    OfficeHours,
    ReviewSession,
    Holiday,
    Break,
    Other,
}

impl EventCategory {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Assignment => "assignment",
            Self::Exam => "exam",
            Self::Quiz => "quiz",
            Self::Project => "project",
            Self::Lecture => "lecture",
            Self::Lab => "lab",
            Self::OfficeHours => "office_hours",
            Self::ReviewSession => "review_session",
            Self::Holiday => "holiday",
            Self::Break => "break",
            Self::Other => "other",
        }
    }

    /// Parse the stable string form.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "class" => Some(Self::Class),
            "assignment" => Some(Self::Assignment),
            "exam" => Some(Self::Exam),
            "quiz" => Some(Self::Quiz),
            "project" => Some(Self::Project),
            "lecture" => Some(Self::Lecture),
            "lab" => Some(Self::Lab),
            "office_hours" => Some(Self::OfficeHours),
            "review_session" => Some(Self::ReviewSession),
            "holiday" => Some(Self::Holiday),
            "break" => Some(Self::Break),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Map a raw extracted type string onto the closed category set.
    pub fn from_raw(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();

        match normalized.as_str() {
            "class" | "session" | "meeting" => Self::Class,
            "assignment" | "homework" | "hw" | "problem set" | "pset" | "reading" => {
                Self::Assignment
            }
            "exam" | "midterm" | "midterm exam" | "final" | "final exam" | "test" => Self::Exam,
            "quiz" | "pop quiz" => Self::Quiz,
            "project" | "presentation" | "paper" | "essay" => Self::Project,
            "lecture" | "seminar" => Self::Lecture,
            "lab" | "laboratory" | "practical" => Self::Lab,
            "office hours" | "office hour" | "oh" => Self::OfficeHours,
            "review" | "review session" | "recitation" | "study session" => Self::ReviewSession,
            "holiday" | "no class" | "university holiday" => Self::Holiday,
            "break" | "spring break" | "fall break" | "recess" | "reading week" => Self::Break,
            _ => Self::Other,
        }
    }
}

/// Weekly recurrence for a course event (meeting pattern).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub days: Vec<Weekday>,
    /// Last date on which the event recurs
    pub until: NaiveDate,
}

/// A materialized course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub code: String,
    pub instructor: Option<String>,
    pub credits: Option<f64>,
    pub term: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub grading_weights: BTreeMap<String, f64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A materialized course event, owned by its course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseEvent {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub category: EventCategory,
    pub starts_at: i64,
    pub ends_at: i64,
    pub weight: Option<f64>,
    pub points: Option<f64>,
    pub location: Option<String>,
    /// Weekly recurrence; expanded to a single recurring external event
    pub recurrence: Option<Recurrence>,
    pub created_at: i64,
    /// Last local modification; drives sync change detection
    pub updated_at: i64,
}

/// An existing course judged similar enough to a draft to require
/// human disambiguation. Computed fresh per job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCandidate {
    pub course_id: String,
    pub title: String,
    pub code: String,
    /// Similarity score in [0, 1]
    pub similarity: f64,
    /// Which fields contributed to the match
    pub matched_fields: Vec<String>,
}
