//! Course code and term normalization
//!
//! Codes arrive in many shapes ("CS 101", "cs-101", "CS101"); the
//! normalized form is uppercase alphanumerics only, so duplicate
//! detection and the advisory lock signature compare like with like.

/// Normalize a course code: uppercase, alphanumerics only.
pub fn normalize_course_code(code: &str) -> String {
    code.chars().filter(|c| c.is_ascii_alphanumeric()).map(|c| c.to_ascii_uppercase()).collect()
}

/// Normalize a term string: collapse whitespace, title-case the season
/// token, keep the year as-is ("fall  2025" -> "Fall 2025").
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(|token| {
            let lower = token.to_ascii_lowercase();
            match lower.as_str() {
                "fall" | "spring" | "summer" | "winter" => {
                    let mut chars = lower.chars();
                    match chars.next() {
                        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                        None => lower,
                    }
                }
                _ => token.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Advisory-lock signature for duplicate detection: two concurrent
/// uploads of the same course must collide on this key.
pub fn duplicate_signature(user_id: &str, term: &str, code: &str) -> String {
    format!("{}:{}:{}", user_id, normalize_term(term).to_ascii_lowercase(), normalize_course_code(code))
}
