//! Duplicate detector
//!
//! Fuzzy-matches a draft against the uploading user's existing courses
//! for the same term. Similarity combines normalized code match
//! (weighted most heavily), normalized title similarity, and
//! instructor-name overlap; components missing on either side drop out
//! and the remaining weights renormalize, so the score stays symmetric.
//! An identical normalized code in the same term always surfaces the
//! course, whatever the titles say.

use tracing::debug;

use semestra_domain::constants::{
    DUPLICATE_SIMILARITY_THRESHOLD, SIMILARITY_CODE_WEIGHT, SIMILARITY_INSTRUCTOR_WEIGHT,
    SIMILARITY_TITLE_WEIGHT,
};
use semestra_domain::{normalize_course_code, Course, CourseDraft, DuplicateCandidate};

use crate::util::similarity::{similarity_ratio, token_overlap};

/// Duplicate detector over a draft and existing courses.
#[derive(Debug, Default)]
pub struct DuplicateDetector;

impl DuplicateDetector {
    pub fn new() -> Self {
        Self
    }

    /// Find existing courses similar enough to require disambiguation,
    /// ordered by descending similarity.
    pub fn find_candidates(
        &self,
        draft: &CourseDraft,
        existing: &[Course],
    ) -> Vec<DuplicateCandidate> {
        let mut candidates: Vec<DuplicateCandidate> = existing
            .iter()
            .filter_map(|course| {
                let (similarity, matched_fields) = self.similarity(draft, course);
                if similarity >= DUPLICATE_SIMILARITY_THRESHOLD {
                    Some(DuplicateCandidate {
                        course_id: course.id.clone(),
                        title: course.title.clone(),
                        code: course.code.clone(),
                        similarity,
                        matched_fields,
                    })
                } else {
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal)
        });

        debug!(existing = existing.len(), candidates = candidates.len(), "duplicate check complete");

        candidates
    }

    /// Similarity between a draft and an existing course in [0, 1],
    /// with the list of matched fields.
    pub fn similarity(&self, draft: &CourseDraft, course: &Course) -> (f64, Vec<String>) {
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        let mut matched_fields = Vec::new();

        let draft_code = normalize_course_code(&draft.code);
        let course_code = normalize_course_code(&course.code);
        let mut exact_code = false;

        if !draft_code.is_empty() && !course_code.is_empty() {
            let code_sim = if draft_code == course_code {
                exact_code = true;
                1.0
            } else {
                similarity_ratio(&draft_code, &course_code)
            };
            weighted_sum += SIMILARITY_CODE_WEIGHT * code_sim;
            weight_total += SIMILARITY_CODE_WEIGHT;
            if code_sim >= 0.9 {
                matched_fields.push("code".to_string());
            }
        }

        let draft_title = normalize_title(&draft.title);
        let course_title = normalize_title(&course.title);
        if !draft_title.is_empty() && !course_title.is_empty() {
            let title_sim = similarity_ratio(&draft_title, &course_title);
            weighted_sum += SIMILARITY_TITLE_WEIGHT * title_sim;
            weight_total += SIMILARITY_TITLE_WEIGHT;
            if title_sim >= 0.8 {
                matched_fields.push("title".to_string());
            }
        }

        if let (Some(draft_instructor), Some(course_instructor)) =
            (&draft.instructor, &course.instructor)
        {
            let instructor_sim = token_overlap(
                &strip_honorifics(draft_instructor),
                &strip_honorifics(course_instructor),
            );
            weighted_sum += SIMILARITY_INSTRUCTOR_WEIGHT * instructor_sim;
            weight_total += SIMILARITY_INSTRUCTOR_WEIGHT;
            if instructor_sim >= 0.8 {
                matched_fields.push("instructor".to_string());
            }
        }

        if weight_total == 0.0 {
            return (0.0, matched_fields);
        }

        let mut similarity = weighted_sum / weight_total;

        // Same code in the same term is a duplicate signal on its own,
        // even when the titles disagree.
        if exact_code {
            similarity = similarity.max(DUPLICATE_SIMILARITY_THRESHOLD);
        }

        (similarity.clamp(0.0, 1.0), matched_fields)
    }
}

fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_honorifics(name: &str) -> String {
    name.split_whitespace()
        .filter(|token| {
            !matches!(
                token.trim_end_matches('.').to_lowercase().as_str(),
                "dr" | "prof" | "professor" | "mr" | "ms" | "mrs"
            )
        })
        .collect::<Vec<_>>()
        .join(" ")
}
