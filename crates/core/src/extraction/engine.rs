//! Extraction engine
//!
//! Produces an `ExtractedDraft` from normalized text by driving the
//! external understanding service with a schema-constrained request.
//! The engine never accepts partial JSON: any response that fails
//! strict conversion is discarded in full and re-requested with a
//! stricter instruction, up to the schema-retry cap. Transport-level
//! failures surface unchanged so the orchestrator owns backoff.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use semestra_domain::constants::MAX_SCHEMA_RETRIES;
use semestra_domain::{
    CourseDraft, DraftConfidence, DraftEvent, ExtractedDraft, MeetingTime, Result, SemestraError,
};

use super::ports::{ExtractionRequest, TokenUsageRecorder, UnderstandingService};

/// Extraction engine over the understanding-service port.
pub struct ExtractionEngine {
    service: Arc<dyn UnderstandingService>,
    usage: Arc<dyn TokenUsageRecorder>,
}

impl ExtractionEngine {
    pub fn new(service: Arc<dyn UnderstandingService>, usage: Arc<dyn TokenUsageRecorder>) -> Self {
        Self { service, usage }
    }

    /// Extract a structured draft from normalized syllabus text.
    ///
    /// # Errors
    /// - `AiProcessing` after the schema-retry cap is exhausted
    /// - `ServiceUnavailable` passed through for orchestrator backoff
    #[instrument(skip(self, normalized_text), fields(job_id))]
    pub async fn extract_draft(
        &self,
        job_id: &str,
        normalized_text: &str,
        course_title_hint: Option<&str>,
    ) -> Result<ExtractedDraft> {
        let mut last_failure = String::new();

        for attempt in 0..=MAX_SCHEMA_RETRIES {
            let request = ExtractionRequest {
                normalized_text: normalized_text.to_string(),
                target_schema: draft_schema(),
                strict_retry: attempt > 0,
                course_title_hint: course_title_hint.map(String::from),
            };

            let response = match self.service.extract(request).await {
                Ok(response) => response,
                Err(SemestraError::AiProcessing(msg)) => {
                    // Unparseable content counts as a schema violation
                    warn!(job_id, attempt, error = %msg, "understanding service returned unparseable content");
                    last_failure = msg;
                    continue;
                }
                // Transport failures are the orchestrator's to retry
                Err(other) => return Err(other),
            };

            if let Err(err) = self
                .usage
                .record_usage(job_id, response.prompt_tokens, response.completion_tokens)
                .await
            {
                // Usage accounting never blocks extraction
                warn!(job_id, error = %err, "failed to record token usage");
            }

            match convert_payload(response.payload) {
                Ok(draft) => {
                    info!(
                        job_id,
                        attempt,
                        events = draft.events.len(),
                        meeting_times = draft.meeting_times.len(),
                        "draft extracted"
                    );
                    return Ok(draft);
                }
                Err(msg) => {
                    warn!(job_id, attempt, error = %msg, "response violated draft schema; discarding");
                    last_failure = msg;
                }
            }
        }

        Err(SemestraError::AiProcessing(format!(
            "response violated the draft schema after {} attempts: {}",
            MAX_SCHEMA_RETRIES + 1,
            last_failure
        )))
    }
}

/// JSON schema the understanding service must conform to.
fn draft_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "course": {
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "code": { "type": "string" },
                    "instructor": { "type": ["string", "null"] },
                    "credits": { "type": ["number", "null"] },
                    "term": { "type": "string" },
                    "start_date": { "type": ["string", "null"], "description": "YYYY-MM-DD" },
                    "end_date": { "type": ["string", "null"], "description": "YYYY-MM-DD" }
                },
                "required": ["title", "code", "term"],
                "additionalProperties": false
            },
            "meeting_times": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "days": {
                            "type": "array",
                            "items": {
                                "type": "string",
                                "enum": ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"]
                            }
                        },
                        "start_time": { "type": "string", "description": "HH:MM 24h" },
                        "end_time": { "type": "string", "description": "HH:MM 24h" },
                        "location": { "type": ["string", "null"] }
                    },
                    "required": ["days", "start_time", "end_time"],
                    "additionalProperties": false
                }
            },
            "grading_weights": {
                "type": "object",
                "additionalProperties": { "type": "number" }
            },
            "events": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "event_type": { "type": "string" },
                        "starts_at": { "type": "string", "description": "RFC 3339" },
                        "ends_at": { "type": ["string", "null"], "description": "RFC 3339" },
                        "category": { "type": ["string", "null"] },
                        "weight": { "type": ["number", "null"] },
                        "points": { "type": ["number", "null"] }
                    },
                    "required": ["title", "event_type", "starts_at"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["course"],
        "additionalProperties": false
    })
}

// Wire types mirror the schema exactly; unknown fields are rejected so
// a drifting response fails loudly instead of half-parsing.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DraftWire {
    course: CourseWire,
    #[serde(default)]
    meeting_times: Vec<MeetingTimeWire>,
    #[serde(default)]
    grading_weights: BTreeMap<String, f64>,
    #[serde(default)]
    events: Vec<EventWire>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CourseWire {
    title: String,
    code: String,
    #[serde(default)]
    instructor: Option<String>,
    #[serde(default)]
    credits: Option<f64>,
    term: String,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MeetingTimeWire {
    days: Vec<String>,
    start_time: String,
    end_time: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventWire {
    title: String,
    event_type: String,
    starts_at: String,
    #[serde(default)]
    ends_at: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    points: Option<f64>,
}

/// Strictly convert a service payload into a draft. Any failure
/// discards the whole response.
fn convert_payload(payload: serde_json::Value) -> std::result::Result<ExtractedDraft, String> {
    let wire: DraftWire =
        serde_json::from_value(payload).map_err(|e| format!("schema mismatch: {}", e))?;

    let course = CourseDraft {
        title: wire.course.title,
        code: wire.course.code,
        instructor: wire.course.instructor,
        credits: wire.course.credits,
        term: wire.course.term,
        start_date: parse_optional_date(wire.course.start_date.as_deref(), "course.start_date")?,
        end_date: parse_optional_date(wire.course.end_date.as_deref(), "course.end_date")?,
    };

    let mut meeting_times = Vec::with_capacity(wire.meeting_times.len());
    for (idx, meeting) in wire.meeting_times.into_iter().enumerate() {
        meeting_times.push(convert_meeting(meeting, idx)?);
    }

    let mut events = Vec::with_capacity(wire.events.len());
    for (idx, event) in wire.events.into_iter().enumerate() {
        events.push(convert_event(event, idx)?);
    }

    debug!(meeting_times = meeting_times.len(), events = events.len(), "payload converted");

    Ok(ExtractedDraft {
        course,
        meeting_times,
        grading_weights: wire.grading_weights,
        events,
        confidence: DraftConfidence::default(),
    })
}

fn convert_meeting(wire: MeetingTimeWire, idx: usize) -> std::result::Result<MeetingTime, String> {
    if wire.days.is_empty() {
        return Err(format!("meeting_times[{}] has no days", idx));
    }

    let mut days = Vec::with_capacity(wire.days.len());
    for day in &wire.days {
        days.push(parse_weekday(day).ok_or_else(|| {
            format!("meeting_times[{}] has unknown day '{}'", idx, day)
        })?);
    }

    Ok(MeetingTime {
        days,
        start_time: parse_clock(&wire.start_time)
            .ok_or_else(|| format!("meeting_times[{}] has invalid start_time", idx))?,
        end_time: parse_clock(&wire.end_time)
            .ok_or_else(|| format!("meeting_times[{}] has invalid end_time", idx))?,
        location: wire.location,
    })
}

fn convert_event(wire: EventWire, idx: usize) -> std::result::Result<DraftEvent, String> {
    Ok(DraftEvent {
        title: wire.title,
        event_type: wire.event_type,
        starts_at: parse_timestamp(&wire.starts_at)
            .ok_or_else(|| format!("events[{}] has invalid starts_at", idx))?,
        ends_at: match wire.ends_at.as_deref() {
            Some(raw) => Some(
                parse_timestamp(raw)
                    .ok_or_else(|| format!("events[{}] has invalid ends_at", idx))?,
            ),
            None => None,
        },
        category: wire.category,
        weight: wire.weight,
        points: wire.points,
    })
}

fn parse_optional_date(
    value: Option<&str>,
    field: &str,
) -> std::result::Result<Option<NaiveDate>, String> {
    match value {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| format!("{} is not a valid date: {}", field, e)),
    }
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_clock(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).ok()
}
