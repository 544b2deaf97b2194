//! Domain constants and thresholds

/// Leaf fields scoring below this confidence are flagged `low_confidence`.
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.70;

/// Duplicate candidates at or above this similarity suspend the job for review.
pub const DUPLICATE_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Maximum transient-failure retries before a job is marked failed.
pub const MAX_TRANSIENT_RETRIES: u32 = 3;

/// Maximum re-requests after a schema-violating understanding-service response.
pub const MAX_SCHEMA_RETRIES: u32 = 2;

/// Allowed deviation when grading weights are checked against a 100% sum.
pub const GRADING_SUM_TOLERANCE: f64 = 0.5;

/// Extracted text shorter than this is treated as blank/corrupt input.
pub const MIN_EXTRACTED_TEXT_LEN: usize = 64;

/// Confidence signal weights; must sum to 1.0.
pub const CONFIDENCE_MENTION_WEIGHT: f32 = 0.4;
pub const CONFIDENCE_FORMAT_WEIGHT: f32 = 0.3;
pub const CONFIDENCE_SECTION_WEIGHT: f32 = 0.2;
pub const CONFIDENCE_RULE_WEIGHT: f32 = 0.1;

/// Duplicate similarity component weights; code match dominates.
pub const SIMILARITY_CODE_WEIGHT: f64 = 0.5;
pub const SIMILARITY_TITLE_WEIGHT: f64 = 0.3;
pub const SIMILARITY_INSTRUCTOR_WEIGHT: f64 = 0.2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_weights_sum_to_one() {
        let sum = CONFIDENCE_MENTION_WEIGHT
            + CONFIDENCE_FORMAT_WEIGHT
            + CONFIDENCE_SECTION_WEIGHT
            + CONFIDENCE_RULE_WEIGHT;
        assert!((sum - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn similarity_weights_sum_to_one() {
        let sum = SIMILARITY_CODE_WEIGHT + SIMILARITY_TITLE_WEIGHT + SIMILARITY_INSTRUCTOR_WEIGHT;
        assert!((sum - 1.0).abs() < f64::EPSILON);
    }
}
