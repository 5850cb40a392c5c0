use crate::analysis::format_ranges;
use crate::config::Config;
use crate::fuzzy::similarity;
use crate::index::Index;
use crate::models::Series;
use crate::normalize::normalize;
use crate::parser::{Parsed, Range};
use crate::progress::{Phase, ProgressEvent, ProgressSink};

/// Why a match succeeded, or that it didn't (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchReason {
    Id,
    Synonym,
    Fuzzy,
}

/// Outcome of matching a single [`Parsed`] record against an [`Index`].
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched { series: Series, confidence: f64, reason: MatchReason },
    NoMatch,
}

/// Resolve `parsed` against `index`'s cascade: ID hint, then synonym lookup,
/// then fuzzy similarity (§4.7). First hit wins.
pub fn match_one(parsed: &Parsed, hint_id: Option<i64>, index: &Index, config: &Config) -> MatchOutcome {
    if let Some(id) = hint_id {
        if let Some(series) = index.get_by_id(id) {
            return MatchOutcome::Matched { series: series.clone(), confidence: 1.0, reason: MatchReason::Id };
        }
    }

    let normalized_title = normalize(&parsed.cleaned_title);
    let candidates = index.search(&normalized_title);
    match candidates.len() {
        0 => {}
        1 => {
            return MatchOutcome::Matched {
                series: candidates[0].clone(),
                confidence: 0.95,
                reason: MatchReason::Synonym,
            };
        }
        _ => {
            let chosen = break_synonym_tie(candidates, &parsed.cleaned_title);
            return MatchOutcome::Matched { series: chosen.clone(), confidence: 0.85, reason: MatchReason::Synonym };
        }
    }

    fuzzy_match(&parsed.cleaned_title, index, config)
}

/// Tie-break rule for multiple synonym matches: prefer the Series whose
/// folder-name identity matched, then the longest normalized identity, then
/// lexicographically first (§4.7 step 2).
fn break_synonym_tie<'a>(candidates: &'a [Series], cleaned_title: &str) -> &'a Series {
    let normalized_query = normalize(cleaned_title);

    if let Some(folder_match) =
        candidates.iter().find(|s| normalize(&s.folder_name) == normalized_query)
    {
        return folder_match;
    }

    candidates
        .iter()
        .max_by(|a, b| {
            let key_a = (normalize(&a.folder_name).len(), std::cmp::Reverse(a.folder_name.clone()));
            let key_b = (normalize(&b.folder_name).len(), std::cmp::Reverse(b.folder_name.clone()));
            key_a.cmp(&key_b)
        })
        .expect("candidates is non-empty here")
}

fn fuzzy_match(cleaned_title: &str, index: &Index, config: &Config) -> MatchOutcome {
    let normalized_query = normalize(cleaned_title);
    let mut best: Option<(&Series, f64)> = None;

    for series in index.all_series() {
        for identity in series.identities() {
            let normalized_identity = normalize(&identity);
            if normalized_identity.is_empty() {
                continue;
            }
            let score = similarity(&normalized_query, &normalized_identity, config.fuzzy_tie_threshold);
            if best.map(|(_, best_score)| score > best_score).unwrap_or(true) {
                best = Some((series, score));
            }
        }
    }

    match best {
        Some((series, score)) if score >= config.fuzzy_threshold => {
            MatchOutcome::Matched { series: series.clone(), confidence: score, reason: MatchReason::Fuzzy }
        }
        _ => MatchOutcome::NoMatch,
    }
}

/// Match every record in `batch`, reporting progress as each is resolved
/// (§6 "Progress event stream").
pub fn match_batch(
    batch: &[Parsed],
    index: &Index,
    config: &Config,
    progress: &dyn ProgressSink,
) -> Vec<MatchOutcome> {
    let total = batch.len() as u64;
    let mut outcomes = Vec::with_capacity(batch.len());
    for (i, parsed) in batch.iter().enumerate() {
        outcomes.push(match_one(parsed, None, index, config));
        progress.report(ProgressEvent {
            phase: Phase::Match,
            done: i as u64 + 1,
            total: Some(total),
            label: Some(parsed.cleaned_title.clone()),
        });
    }
    outcomes
}

/// One Series' merged volume/chapter coverage after consolidating every
/// `Parsed` record that matched it (§4.7 "Consolidation").
#[derive(Debug, Clone)]
pub struct Consolidated {
    pub series: Series,
    pub volume_ranges: Vec<Range>,
    pub chapter_ranges: Vec<Range>,
}

/// Group `(Parsed, MatchOutcome)` pairs by the Series they matched and merge
/// their ranges via [`format_ranges`]' merge rule. Unmatched records are
/// dropped; the result order follows first-seen Series order.
pub fn consolidate(pairs: &[(Parsed, MatchOutcome)]) -> Vec<Consolidated> {
    let mut groups: Vec<Consolidated> = Vec::new();

    for (parsed, outcome) in pairs {
        let MatchOutcome::Matched { series, .. } = outcome else { continue };

        let existing = groups.iter_mut().find(|g| g.series.path == series.path);
        let target = match existing {
            Some(g) => g,
            None => {
                groups.push(Consolidated { series: series.clone(), volume_ranges: Vec::new(), chapter_ranges: Vec::new() });
                groups.last_mut().unwrap()
            }
        };
        target.volume_ranges.extend(parsed.volume_ranges.iter().copied());
        target.chapter_ranges.extend(parsed.chapter_ranges.iter().copied());
    }

    for group in &mut groups {
        // `format_ranges` performs the merge; re-parsing its own output back
        // into ranges would be circular, so we apply the identical merge
        // rule directly via the same pairwise-adjacency contraction.
        group.volume_ranges = merge_only(&group.volume_ranges);
        group.chapter_ranges = merge_only(&group.chapter_ranges);
    }

    groups
}

fn merge_only(ranges: &[Range]) -> Vec<Range> {
    if ranges.is_empty() {
        return Vec::new();
    }
    let mut sorted: Vec<Range> = ranges.to_vec();
    sorted.sort_by(|a, b| a.low.partial_cmp(&b.low).unwrap());
    let mut merged: Vec<Range> = Vec::new();
    for range in sorted {
        if let Some(last) = merged.last_mut() {
            if range.low <= last.high + 1.0 {
                last.high = last.high.max(range.high);
                continue;
            }
        }
        merged.push(range);
    }
    merged
}
