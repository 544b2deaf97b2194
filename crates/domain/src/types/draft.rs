//! Extracted draft model
//!
//! The in-flight, unmaterialized structured extraction result for one
//! upload. Produced once per job by the extraction engine, amended by
//! user corrections prior to approval, immutable once the job reaches a
//! terminal state.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::constants::GRADING_SUM_TOLERANCE;

/// Course header fields extracted from the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseDraft {
    pub title: String,
    pub code: String,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub credits: Option<f64>,
    pub term: String,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

/// A weekly meeting pattern (e.g. MWF 10:00-10:50).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingTime {
    pub days: Vec<Weekday>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub location: Option<String>,
}

/// One dated event extracted from the schedule section.
///
/// `event_type` is the raw string as extracted; mapping onto the closed
/// category set happens at materialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftEvent {
    pub title: String,
    pub event_type: String,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub points: Option<f64>,
}

/// Per-field confidence attached by the scorer.
///
/// `fields` maps leaf field paths (`course.title`, `meeting_times[0]`,
/// `events[3].starts_at`, ...) to scores in [0, 1]; `overall` is their
/// unweighted mean.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftConfidence {
    pub fields: BTreeMap<String, f32>,
    pub overall: f32,
    pub low_confidence: Vec<String>,
}

/// The complete structured draft for one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDraft {
    pub course: CourseDraft,
    #[serde(default)]
    pub meeting_times: Vec<MeetingTime>,
    /// Category -> percentage; expected to sum to 100 within tolerance
    #[serde(default)]
    pub grading_weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub events: Vec<DraftEvent>,
    #[serde(default)]
    pub confidence: DraftConfidence,
}

impl ExtractedDraft {
    /// Whether low confidence on a critical field forces human review.
    ///
    /// Critical fields: `course.title`, `course.code`, and every
    /// `meeting_times[]` entry.
    pub fn requires_review(&self) -> bool {
        self.confidence.low_confidence.iter().any(|path| {
            path == "course.title" || path == "course.code" || path.starts_with("meeting_times[")
        })
    }

    /// Check the grading weight sum against 100% within tolerance.
    /// An empty map is valid (grading not in use).
    pub fn grading_weights_valid(&self) -> bool {
        if self.grading_weights.is_empty() {
            return true;
        }
        let sum: f64 = self.grading_weights.values().sum();
        (sum - 100.0).abs() <= GRADING_SUM_TOLERANCE
    }
}

/// User corrections merged into a draft at approval time.
///
/// Scalar fields override when present; collection fields replace the
/// draft's collection wholesale when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftCorrections {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub instructor: Option<String>,
    #[serde(default)]
    pub credits: Option<f64>,
    #[serde(default)]
    pub term: Option<String>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub meeting_times: Option<Vec<MeetingTime>>,
    #[serde(default)]
    pub grading_weights: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub events: Option<Vec<DraftEvent>>,
}

impl DraftCorrections {
    /// Apply the corrections to a draft in place.
    pub fn apply(&self, draft: &mut ExtractedDraft) {
        if let Some(ref title) = self.title {
            draft.course.title = title.clone();
        }
        if let Some(ref code) = self.code {
            draft.course.code = code.clone();
        }
        if let Some(ref instructor) = self.instructor {
            draft.course.instructor = Some(instructor.clone());
        }
        if let Some(credits) = self.credits {
            draft.course.credits = Some(credits);
        }
        if let Some(ref term) = self.term {
            draft.course.term = term.clone();
        }
        if let Some(start) = self.start_date {
            draft.course.start_date = Some(start);
        }
        if let Some(end) = self.end_date {
            draft.course.end_date = Some(end);
        }
        if let Some(ref meeting_times) = self.meeting_times {
            draft.meeting_times = meeting_times.clone();
        }
        if let Some(ref weights) = self.grading_weights {
            draft.grading_weights = weights.clone();
        }
        if let Some(ref events) = self.events {
            draft.events = events.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.code.is_none()
            && self.instructor.is_none()
            && self.credits.is_none()
            && self.term.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.meeting_times.is_none()
            && self.grading_weights.is_none()
            && self.events.is_none()
    }
}
