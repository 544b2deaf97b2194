//! Recurrence serialization for provider APIs
//!
//! A weekly meeting pattern becomes one recurring external event: an
//! RRULE string for Google, a structured recurrence object for
//! Microsoft Graph.

use chrono::{DateTime, Weekday};
use semestra_domain::Recurrence;
use serde_json::json;

/// iCalendar BYDAY code for a weekday.
fn byday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Microsoft Graph day name for a weekday.
fn graph_day(day: Weekday) -> &'static str {
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

/// Build the RRULE line for a weekly recurrence.
pub fn to_rrule(recurrence: &Recurrence) -> String {
    let days: Vec<&str> = recurrence.days.iter().map(|d| byday_code(*d)).collect();
    format!(
        "RRULE:FREQ=WEEKLY;BYDAY={};UNTIL={}T235959Z",
        days.join(","),
        recurrence.until.format("%Y%m%d")
    )
}

/// Build the Microsoft Graph recurrence object for a weekly pattern.
/// `starts_at` anchors the range start date.
pub fn to_graph_recurrence(recurrence: &Recurrence, starts_at: i64) -> serde_json::Value {
    let start_date = DateTime::from_timestamp(starts_at, 0)
        .map(|dt| dt.date_naive().to_string())
        .unwrap_or_else(|| recurrence.until.to_string());

    json!({
        "pattern": {
            "type": "weekly",
            "interval": 1,
            "daysOfWeek": recurrence.days.iter().map(|d| graph_day(*d)).collect::<Vec<_>>()
        },
        "range": {
            "type": "endDate",
            "startDate": start_date,
            "endDate": recurrence.until.to_string()
        }
    })
}
