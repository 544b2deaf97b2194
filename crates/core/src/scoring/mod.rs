//! Field confidence scorer
//!
//! Assigns every leaf field of a draft a confidence in [0, 1] as a
//! weighted combination of four signals: explicit mention in the
//! source text, conformance to the field's expected format, proximity
//! to a syntactically relevant document section (a detected "grading"
//! or "schedule" heading), and field-specific validation rules. The
//! `overall` value is the unweighted mean of all leaf confidences.

use chrono::{Datelike, NaiveDate, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use semestra_common::validation::{
    clock_range_ordered, course_code_format, credits_in_range, date_range_ordered,
    percentage_map_sums_to, term_format,
};
use semestra_domain::constants::{
    CONFIDENCE_FORMAT_WEIGHT, CONFIDENCE_MENTION_WEIGHT, CONFIDENCE_RULE_WEIGHT,
    CONFIDENCE_SECTION_WEIGHT, GRADING_SUM_TOLERANCE, LOW_CONFIDENCE_THRESHOLD,
};
use semestra_domain::{DraftConfidence, ExtractedDraft};

static GRADING_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^.{0,40}\b(grading|grade breakdown|assessment|evaluation)\b").unwrap()
});

static SCHEDULE_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^.{0,40}\b(schedule|calendar|course outline|important dates|weekly)\b")
        .unwrap()
});

/// Document regions a field is expected to live near.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// Course header block at the top of the document
    Header,
    /// Detected grading/assessment section
    Grading,
    /// Detected schedule/calendar section
    Schedule,
}

struct SectionIndex {
    has_grading: bool,
    has_schedule: bool,
    header_end: usize,
}

impl SectionIndex {
    fn build(text: &str) -> Self {
        let len = text.chars().count();
        Self {
            has_grading: GRADING_HEADING_RE.is_match(text),
            has_schedule: SCHEDULE_HEADING_RE.is_match(text),
            // Header block: the top of the document
            header_end: (len / 4).clamp(200, 1200).min(len),
        }
    }

    /// Section-proximity signal for one field.
    fn signal(&self, section: Section, mention_pos: Option<usize>) -> f32 {
        match section {
            Section::Header => match mention_pos {
                Some(pos) if pos <= self.header_end => 1.0,
                Some(_) => 0.5,
                None => 0.0,
            },
            Section::Grading => {
                if self.has_grading {
                    1.0
                } else {
                    0.0
                }
            }
            Section::Schedule => {
                if self.has_schedule {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Confidence scorer over a draft and its source text.
#[derive(Debug, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score every leaf field and attach the result to the draft.
    pub fn score(&self, source_text: &str, draft: &mut ExtractedDraft) {
        let lower = source_text.to_lowercase();
        let sections = SectionIndex::build(source_text);

        let mut confidence = DraftConfidence::default();
        let mut record = |path: String, value: f32| {
            let clamped = value.clamp(0.0, 1.0);
            if clamped < LOW_CONFIDENCE_THRESHOLD {
                confidence.low_confidence.push(path.clone());
            }
            confidence.fields.insert(path, clamped);
        };

        // Course header leaves
        let title = &draft.course.title;
        record(
            "course.title".into(),
            combine(
                mention_fraction(&lower, title),
                f32::from(title.trim().len() >= 4 && title.chars().any(|c| c.is_alphabetic())),
                sections.signal(Section::Header, find_pos(&lower, title)),
                1.0,
            ),
        );

        let code = &draft.course.code;
        record(
            "course.code".into(),
            combine(
                code_mention(&lower, code),
                f32::from(course_code_format(code)),
                sections.signal(Section::Header, find_pos(&lower, code)),
                1.0,
            ),
        );

        if let Some(ref instructor) = draft.course.instructor {
            record(
                "course.instructor".into(),
                combine(
                    mention_fraction(&lower, instructor),
                    f32::from(instructor.trim().len() >= 3),
                    sections.signal(Section::Header, find_pos(&lower, instructor)),
                    1.0,
                ),
            );
        }

        if let Some(credits) = draft.course.credits {
            let rendered = format_number(credits);
            record(
                "course.credits".into(),
                combine(
                    f32::from(lower.contains(&rendered)),
                    f32::from(credits_in_range(credits)),
                    sections.signal(Section::Header, find_pos(&lower, &rendered)),
                    1.0,
                ),
            );
        }

        let term = &draft.course.term;
        record(
            "course.term".into(),
            combine(
                mention_fraction(&lower, term),
                f32::from(term_format(term)),
                sections.signal(Section::Header, find_pos(&lower, term)),
                1.0,
            ),
        );

        let range_ok = date_range_ordered(draft.course.start_date, draft.course.end_date);
        for (path, date) in [
            ("course.start_date", draft.course.start_date),
            ("course.end_date", draft.course.end_date),
        ] {
            if let Some(date) = date {
                record(
                    path.into(),
                    combine(
                        date_mention(&lower, date),
                        1.0, // typed value, format always conformant
                        sections.signal(Section::Header, None).max(
                            sections.signal(Section::Schedule, None),
                        ),
                        f32::from(range_ok),
                    ),
                );
            }
        }

        // Meeting time leaves
        for (idx, meeting) in draft.meeting_times.iter().enumerate() {
            let day_hits = meeting
                .days
                .iter()
                .filter(|day| lower.contains(day_name(**day)) || lower.contains(day_abbrev(**day)))
                .count();
            let day_fraction = if meeting.days.is_empty() {
                0.0
            } else {
                day_hits as f32 / meeting.days.len() as f32
            };
            let time_hit = lower.contains(&meeting.start_time.format("%H:%M").to_string())
                || lower.contains(&meeting.start_time.format("%-I:%M").to_string());
            let mention = 0.6 * day_fraction + 0.4 * f32::from(time_hit);

            record(
                format!("meeting_times[{}]", idx),
                combine(
                    mention,
                    f32::from(clock_range_ordered(meeting.start_time, meeting.end_time)),
                    sections.signal(Section::Schedule, None),
                    f32::from(clock_range_ordered(meeting.start_time, meeting.end_time)),
                ),
            );
        }

        // Grading weight leaves
        let sum_ok =
            percentage_map_sums_to(draft.grading_weights.values(), 100.0, GRADING_SUM_TOLERANCE);
        for (category, weight) in &draft.grading_weights {
            let mention = 0.5 * f32::from(lower.contains(&category.to_lowercase()))
                + 0.5 * f32::from(lower.contains(&format_number(*weight)));
            record(
                format!("grading_weights.{}", category),
                combine(
                    mention,
                    f32::from((0.0..=100.0).contains(weight)),
                    sections.signal(Section::Grading, None),
                    f32::from(sum_ok),
                ),
            );
        }

        // Event leaves
        for (idx, event) in draft.events.iter().enumerate() {
            let ends_ok = event.ends_at.map_or(true, |end| end >= event.starts_at);

            record(
                format!("events[{}].title", idx),
                combine(
                    mention_fraction(&lower, &event.title),
                    f32::from(!event.title.trim().is_empty()),
                    sections.signal(Section::Schedule, None),
                    1.0,
                ),
            );

            record(
                format!("events[{}].starts_at", idx),
                combine(
                    date_mention(&lower, event.starts_at.date_naive()),
                    1.0,
                    sections.signal(Section::Schedule, None),
                    f32::from(ends_ok),
                ),
            );

            if let Some(weight) = event.weight {
                record(
                    format!("events[{}].weight", idx),
                    combine(
                        f32::from(lower.contains(&format_number(weight))),
                        f32::from((0.0..=100.0).contains(&weight)),
                        sections.signal(Section::Grading, None),
                        1.0,
                    ),
                );
            }
        }

        confidence.overall = if confidence.fields.is_empty() {
            0.0
        } else {
            confidence.fields.values().sum::<f32>() / confidence.fields.len() as f32
        };

        debug!(
            leaves = confidence.fields.len(),
            low_confidence = confidence.low_confidence.len(),
            overall = confidence.overall,
            "draft scored"
        );

        draft.confidence = confidence;
    }
}

fn combine(mention: f32, format: f32, section: f32, rules: f32) -> f32 {
    CONFIDENCE_MENTION_WEIGHT * mention
        + CONFIDENCE_FORMAT_WEIGHT * format
        + CONFIDENCE_SECTION_WEIGHT * section
        + CONFIDENCE_RULE_WEIGHT * rules
}

/// Full-string hit scores 1.0; otherwise the fraction of significant
/// tokens found in the text.
fn mention_fraction(lower_text: &str, value: &str) -> f32 {
    let needle = value.trim().to_lowercase();
    if needle.is_empty() {
        return 0.0;
    }
    if lower_text.contains(&needle) {
        return 1.0;
    }

    let tokens: Vec<&str> = needle.split_whitespace().filter(|t| t.len() > 3).collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens.iter().filter(|t| lower_text.contains(**t)).count();
    hits as f32 / tokens.len() as f32
}

/// Course codes match with or without their separator ("CS 101", "CS101").
fn code_mention(lower_text: &str, code: &str) -> f32 {
    let as_written = code.trim().to_lowercase();
    let squeezed: String = as_written.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let squeezed_text: String =
        lower_text.chars().filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace()).collect();

    if lower_text.contains(&as_written)
        || squeezed_text.replace(' ', "").contains(&squeezed)
    {
        1.0
    } else {
        0.0
    }
}

fn find_pos(lower_text: &str, value: &str) -> Option<usize> {
    let needle = value.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    lower_text.find(&needle)
}

/// Dates are mentioned in many renderings; try ISO, long month, and
/// numeric US forms.
fn date_mention(lower_text: &str, date: NaiveDate) -> f32 {
    let iso = date.format("%Y-%m-%d").to_string();
    let long = date.format("%B %-d").to_string().to_lowercase();
    let us = format!("{}/{}", date.month(), date.day());

    if lower_text.contains(&iso) || lower_text.contains(&long) || lower_text.contains(&us) {
        1.0
    } else {
        0.0
    }
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn day_abbrev(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Render a number the way a syllabus would print it: integral values
/// without a decimal point.
fn format_number(value: f64) -> String {
    if (value.fract()).abs() < f64::EPSILON {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
