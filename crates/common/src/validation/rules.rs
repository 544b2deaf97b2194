//! Field-format and field-specific validation rules
//!
//! Shared by the confidence scorer (format-conformance signal and
//! per-field rule signal) and by approval-time validation. Rules are
//! plain predicates; interpretation of a failure belongs to callers.

use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Department prefix of 2-5 letters, a 2-4 digit number, optional
/// honors/section suffix: "CS 101", "MATH2210", "BIO-301H".
static COURSE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,5}[\s-]?\d{2,4}[A-Za-z]?$").unwrap());

/// Season word followed by a 4-digit year: "Fall 2025".
static TERM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(fall|spring|summer|winter)\s+\d{4}$").unwrap());

/// Whether a string looks like a course code.
pub fn course_code_format(value: &str) -> bool {
    COURSE_CODE_RE.is_match(value.trim())
}

/// Whether a string looks like an academic term.
pub fn term_format(value: &str) -> bool {
    TERM_RE.is_match(value.trim())
}

/// A date range must be chronologically ordered. Open-ended ranges
/// (either side missing) pass; only a reversed pair fails.
pub fn date_range_ordered(start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    match (start, end) {
        (Some(start), Some(end)) => start <= end,
        _ => true,
    }
}

/// A daily time range must be ordered and non-empty.
pub fn clock_range_ordered(start: NaiveTime, end: NaiveTime) -> bool {
    start < end
}

/// Credit hours within the plausible range for a single course.
pub fn credits_in_range(credits: f64) -> bool {
    (0.5..=12.0).contains(&credits)
}

/// Whether percentage values sum to `expected_total` within tolerance.
/// An empty iterator is accepted (the category is not in use).
pub fn percentage_map_sums_to<'a, I>(values: I, expected_total: f64, tolerance: f64) -> bool
where
    I: IntoIterator<Item = &'a f64>,
{
    let mut sum = 0.0;
    let mut any = false;
    for value in values {
        sum += value;
        any = true;
    }
    !any || (sum - expected_total).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_course_codes() {
        for code in ["CS 101", "cs101", "MATH-2210", "BIO 301H", "PHYS 1112"] {
            assert!(course_code_format(code), "rejected {code}");
        }
    }

    #[test]
    fn rejects_non_codes() {
        for code in ["Introduction", "101", "C 1", "COMPUTERSCI 101", "CS"] {
            assert!(!course_code_format(code), "accepted {code}");
        }
    }

    #[test]
    fn accepts_terms() {
        assert!(term_format("Fall 2025"));
        assert!(term_format("spring 2026"));
        assert!(!term_format("Autumn 2025"));
        assert!(!term_format("Fall25"));
    }

    #[test]
    fn date_range_ordering() {
        let sep = NaiveDate::from_ymd_opt(2025, 9, 2);
        let dec = NaiveDate::from_ymd_opt(2025, 12, 12);
        assert!(date_range_ordered(sep, dec));
        assert!(!date_range_ordered(dec, sep));
        assert!(date_range_ordered(sep, None));
        assert!(date_range_ordered(None, None));
    }

    #[test]
    fn clock_range_ordering() {
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let eleven = NaiveTime::from_hms_opt(11, 0, 0).unwrap();
        assert!(clock_range_ordered(ten, eleven));
        assert!(!clock_range_ordered(eleven, ten));
        assert!(!clock_range_ordered(ten, ten));
    }

    #[test]
    fn percentage_sum_tolerance() {
        let weights = [30.0, 70.2];
        assert!(percentage_map_sums_to(weights.iter(), 100.0, 0.5));
        let off = [30.0, 60.0];
        assert!(!percentage_map_sums_to(off.iter(), 100.0, 0.5));
        let empty: [f64; 0] = [];
        assert!(percentage_map_sums_to(empty.iter(), 100.0, 0.5));
    }

    #[test]
    fn credit_bounds() {
        assert!(credits_in_range(3.0));
        assert!(credits_in_range(0.5));
        assert!(!credits_in_range(0.0));
        assert!(!credits_in_range(30.0));
    }
}
