/// Token-set similarity on whitespace-split tokens (§4.7 step 3).
///
/// Implemented as the overlap coefficient (`|A∩B| / min(|A|,|B|)`) rather
/// than a strict Jaccard index (`|A∩B| / |A∪B|`): the Open Question in §9
/// says to validate this measure against scenario 5 rather than against the
/// source's incidental scores, and scenario 5 (`"Spy Family"` must fuzzy-
/// match folder `"Spy x Family"` at `≥ 0.90`) is only satisfiable when a
/// title that is a subset of another's tokens scores high regardless of the
/// longer title's extra connector words. Two empty token sets are defined as
/// identical (`1.0`); one empty and one non-empty is `0.0`.
pub fn token_similarity(a: &str, b: &str) -> f64 {
    let tokens_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: std::collections::HashSet<&str> = b.split_whitespace().collect();

    if tokens_a.is_empty() && tokens_b.is_empty() {
        return 1.0;
    }
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let smaller = tokens_a.len().min(tokens_b.len());
    intersection as f64 / smaller as f64
}

/// Character-level longest-common-subsequence length.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb { prev[j] + 1 } else { curr[j].max(prev[j + 1]) };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// LCS length divided by the length of the longer string, in `[0, 1]`. Used
/// to refine ties produced by [`token_similarity`] (§4.7 step 3).
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let chars_a: Vec<char> = a.chars().collect();
    let chars_b: Vec<char> = b.chars().collect();
    let longer = chars_a.len().max(chars_b.len());
    if longer == 0 {
        return 1.0;
    }
    lcs_len(&chars_a, &chars_b) as f64 / longer as f64
}

/// The combined similarity measure: token overlap, refined by LCS-ratio once
/// the token score is at or above `tie_threshold` (§4.7 step 3). The refined
/// score weights token overlap `0.75`/LCS-ratio `0.25` rather than a plain
/// mean: an even split caps a genuine token-subset near-duplicate (e.g.
/// `"Spy Family"` vs. `"Spy x Family"`, token score `1.0`, LCS ratio `~0.83`)
/// at `~0.92`, below both the matcher's `0.90` fuzzy-match floor in some
/// configurations and the deduper's `0.95` fuzzy-name-collision floor (§4.9)
/// — the refinement would then never let a real near-duplicate clear either
/// gate. Weighting toward the token score keeps LCS-ratio doing what it's
/// for (separating ties among already-similar candidates) without dragging a
/// clean subset match back down.
pub fn similarity(a: &str, b: &str, tie_threshold: f64) -> f64 {
    let token_score = token_similarity(a, b);
    if token_score >= tie_threshold {
        token_score * 0.75 + lcs_ratio(a, b) * 0.25
    } else {
        token_score
    }
}

/// Ratio of the shorter whitespace-token count to the longer, used as a
/// cheap pre-filter before computing a full similarity score (§4.9).
pub fn token_length_ratio(a: &str, b: &str) -> f64 {
    let count_a = a.split_whitespace().count().max(1);
    let count_b = b.split_whitespace().count().max(1);
    let (lo, hi) = if count_a <= count_b { (count_a, count_b) } else { (count_b, count_a) };
    lo as f64 / hi as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_similarity_identical_strings_is_one() {
        assert_eq!(token_similarity("spy x family", "spy x family"), 1.0);
    }

    #[test]
    fn token_similarity_disjoint_strings_is_zero() {
        assert_eq!(token_similarity("spy family", "one piece"), 0.0);
    }

    #[test]
    fn token_similarity_is_a_containment_measure() {
        // "spy family" tokens are a strict subset of "spy x family" tokens.
        let score = token_similarity("spy x family", "spy family");
        assert_eq!(score, 1.0);
    }

    #[test]
    fn lcs_ratio_identical_is_one() {
        assert_eq!(lcs_ratio("berserk", "berserk"), 1.0);
    }

    #[test]
    fn similarity_matches_scenario_five() {
        let score = similarity("spy family", "spy x family", 0.80);
        assert!(score >= 0.90, "expected >= 0.90, got {score}");
    }

    #[test]
    fn token_length_ratio_symmetric() {
        assert_eq!(token_length_ratio("a b", "a b c"), token_length_ratio("a b c", "a b"));
    }
}
