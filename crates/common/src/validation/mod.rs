//! Reusable field validation rules

pub mod rules;

pub use rules::{
    clock_range_ordered, course_code_format, credits_in_range, date_range_ordered,
    percentage_map_sums_to, term_format,
};
