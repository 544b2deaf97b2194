//! String similarity primitives used by duplicate detection

/// Compute Levenshtein edit distance between two strings.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, &a_ch) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &b_ch) in b_chars.iter().enumerate() {
            let cost = usize::from(a_ch != b_ch);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Normalized similarity ratio in [0, 1]: 1 - distance / max_len.
/// Symmetric in its arguments; two empty strings are identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - edit_distance(a, b) as f64 / max_len as f64
}

/// Jaccard overlap of whitespace-separated lowercase tokens.
pub fn token_overlap(a: &str, b: &str) -> f64 {
    let tokens_a: std::collections::BTreeSet<String> =
        a.split_whitespace().map(|t| t.to_lowercase()).collect();
    let tokens_b: std::collections::BTreeSet<String> =
        b.split_whitespace().map(|t| t.to_lowercase()).collect();

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_distance_basics() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("abc", ""), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("intro", "intro"), 0);
    }

    #[test]
    fn ratio_is_symmetric() {
        let pairs = [
            ("Intro to CS", "Introduction to CS"),
            ("CS101", "CS102"),
            ("", "something"),
        ];
        for (a, b) in pairs {
            assert!((similarity_ratio(a, b) - similarity_ratio(b, a)).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn ratio_bounds() {
        assert_eq!(similarity_ratio("same", "same"), 1.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
        let r = similarity_ratio("abcd", "wxyz");
        assert!((0.0..=1.0).contains(&r));
    }

    #[test]
    fn token_overlap_ignores_order_and_case() {
        assert_eq!(token_overlap("Jane Doe", "doe jane"), 1.0);
        assert!(token_overlap("Jane Doe", "Jane Smith") > 0.0);
        assert_eq!(token_overlap("Jane", ""), 0.0);
    }
}
