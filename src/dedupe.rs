use std::collections::HashMap;

use rayon::prelude::*;

use crate::fuzzy::{similarity, token_length_ratio};
use crate::models::{Library, Series, Volume};
use crate::progress::{CancellationToken, Phase, ProgressEvent, ProgressSink};

/// One of the three detectors that flagged a group (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    Id,
    Content,
    FuzzyName,
}

/// A group of Series sharing an external ID (§4.9 "ID collisions").
#[derive(Debug, Clone)]
pub struct IdDuplicateGroup {
    pub mal_id: i64,
    pub series: Vec<Series>,
    pub confidence: f64,
}

/// A group of Volumes that fingerprint-collide, at the Volume level, not
/// the Series level (§4.9 "Content collisions").
#[derive(Debug, Clone)]
pub struct ContentDuplicateGroup {
    pub volumes: Vec<Volume>,
    pub confidence: f64,
}

/// A pair of Series whose identities are fuzzy-similar enough to flag
/// (§4.9 "Fuzzy name collisions").
#[derive(Debug, Clone)]
pub struct FuzzyDuplicatePair {
    pub a: Series,
    pub b: Series,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    pub id_groups: Vec<IdDuplicateGroup>,
    pub content_groups: Vec<ContentDuplicateGroup>,
    pub fuzzy_pairs: Vec<FuzzyDuplicatePair>,
}

impl DuplicateReport {
    pub fn is_empty(&self) -> bool {
        self.id_groups.is_empty() && self.content_groups.is_empty() && self.fuzzy_pairs.is_empty()
    }
}

/// Group Series by non-`None` external ID; groups of size >= 2 are
/// duplicates at confidence 1.0 (§4.9).
fn detect_id_collisions(library: &Library) -> Vec<IdDuplicateGroup> {
    let mut by_id: HashMap<i64, Vec<Series>> = HashMap::new();
    for series in library.series_iter() {
        if let Some(id) = series.metadata.mal_id {
            by_id.entry(id).or_default().push(series.clone());
        }
    }
    let mut groups: Vec<IdDuplicateGroup> = by_id
        .into_iter()
        .filter(|(_, series)| series.len() >= 2)
        .map(|(mal_id, series)| IdDuplicateGroup { mal_id, series, confidence: 1.0 })
        .collect();
    groups.sort_by_key(|g| g.mal_id);
    groups
}

/// Group Volumes (across the whole Library) by `(size, page_count)` when
/// `page_count` is known, else by `size` alone (§4.9).
fn detect_content_collisions(library: &Library) -> Vec<ContentDuplicateGroup> {
    let mut by_size_and_pages: HashMap<(u64, Option<u32>), Vec<Volume>> = HashMap::new();
    for series in library.series_iter() {
        for volume in series.all_volumes() {
            by_size_and_pages.entry((volume.size_bytes, volume.page_count)).or_default().push(volume.clone());
        }
    }

    let mut groups = Vec::new();
    for ((_, page_count), volumes) in by_size_and_pages {
        if volumes.len() < 2 {
            continue;
        }
        let confidence = if page_count.is_some() { 0.95 } else { 0.75 };
        groups.push(ContentDuplicateGroup { volumes, confidence });
    }
    groups.sort_by(|a, b| {
        a.volumes[0]
            .size_bytes
            .cmp(&b.volumes[0].size_bytes)
            .then_with(|| b.confidence.partial_cmp(&a.confidence).unwrap())
    });
    groups
}

/// All-pairs fuzzy comparison across every Series identity, filtered by a
/// cheap token-length-ratio pre-check before the full similarity score is
/// computed, shared across a fixed worker pool (§4.9).
fn detect_fuzzy_collisions(
    library: &Library,
    fuzzy_tie_threshold: f64,
    pool: &rayon::ThreadPool,
    cancel: &CancellationToken,
) -> Vec<FuzzyDuplicatePair> {
    let series: Vec<&Series> = library.series_iter().collect();
    let mut pairs = Vec::new();
    for i in 0..series.len() {
        for j in (i + 1)..series.len() {
            pairs.push((i, j));
        }
    }

    pool.install(|| {
        pairs
            .par_chunks(512)
            .flat_map(|chunk| {
                let mut found = Vec::new();
                if cancel.is_cancelled() {
                    return found;
                }
                for &(i, j) in chunk {
                    let a = &series[i];
                    let b = &series[j];
                    let best = best_identity_pair_score(a, b, fuzzy_tie_threshold);
                    if let Some(score) = best {
                        if score >= 0.95 {
                            found.push(FuzzyDuplicatePair { a: (*a).clone(), b: (*b).clone(), score });
                        }
                    }
                }
                found
            })
            .collect()
    })
}

fn best_identity_pair_score(a: &Series, b: &Series, fuzzy_tie_threshold: f64) -> Option<f64> {
    let mut best: Option<f64> = None;
    for identity_a in a.identities() {
        for identity_b in b.identities() {
            let ratio = token_length_ratio(&identity_a, &identity_b);
            if !(0.5..=2.0).contains(&ratio) {
                continue;
            }
            let score = similarity(&identity_a, &identity_b, fuzzy_tie_threshold);
            if best.map(|b| score > b).unwrap_or(true) {
                best = Some(score);
            }
        }
    }
    best
}

/// Run all three detectors over `library` in parallel on a fixed worker
/// pool (§4.9, §5 "All detectors run in parallel"). The fuzzy detector is
/// the only one that blocks on the pool; ID and content grouping are cheap
/// sequential scans run alongside it.
pub fn detect_duplicates(
    library: &Library,
    worker_pool_size: std::num::NonZeroUsize,
    fuzzy_tie_threshold: f64,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> DuplicateReport {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_pool_size.get())
        .thread_name(|i| format!("vibemanga-dedupe-{i}"))
        .build()
        .expect("thread pool configuration is always valid (non-zero thread count)");

    let ((id_groups, content_groups), fuzzy_pairs) = pool.install(|| {
        rayon::join(
            || rayon::join(|| detect_id_collisions(library), || detect_content_collisions(library)),
            || detect_fuzzy_collisions(library, fuzzy_tie_threshold, &pool, cancel),
        )
    });

    progress.report(ProgressEvent { phase: Phase::Dedupe, done: 1, total: Some(1), label: None });

    DuplicateReport { id_groups, content_groups, fuzzy_pairs }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::models::{Category, CategoryChildren, Metadata};

    fn volume(stem: &str, size: u64, page_count: Option<u32>) -> Volume {
        Volume {
            path: PathBuf::from(format!("/lib/a/b/Series/{stem}.cbz")),
            stem: stem.to_string(),
            size_bytes: size,
            modified_unix_secs: 0,
            page_count,
            corruption: false,
        }
    }

    fn series(folder: &str, id: Option<i64>, volumes: Vec<Volume>) -> Series {
        Series {
            path: PathBuf::from(format!("/lib/a/b/{folder}")),
            folder_name: folder.to_string(),
            volumes,
            subgroups: Vec::new(),
            metadata: Metadata { mal_id: id, ..Metadata::default() },
        }
    }

    fn library_of(series_list: Vec<Series>) -> Library {
        let category = Category {
            name: "b".to_string(),
            path: PathBuf::from("/lib/a/b"),
            children: CategoryChildren::Series(series_list),
        };
        let main = Category {
            name: "a".to_string(),
            path: PathBuf::from("/lib/a"),
            children: CategoryChildren::Categories(vec![category]),
        };
        Library { root: PathBuf::from("/lib"), main_categories: vec![main], complete: true }
    }

    #[test]
    fn id_collisions_group_series_sharing_a_mal_id() {
        let a = series("First", Some(7), vec![]);
        let b = series("Second", Some(7), vec![]);
        let c = series("Third", Some(8), vec![]);
        let library = library_of(vec![a, b, c]);

        let groups = detect_id_collisions(&library);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].mal_id, 7);
        assert_eq!(groups[0].series.len(), 2);
        assert_eq!(groups[0].confidence, 1.0);
    }

    #[test]
    fn content_collisions_prefer_page_count_confidence() {
        let a = series("A", None, vec![volume("A v01", 1000, Some(50))]);
        let b = series("B", None, vec![volume("B v01", 1000, Some(50))]);
        let library = library_of(vec![a, b]);

        let groups = detect_content_collisions(&library);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].volumes.len(), 2);
        assert_eq!(groups[0].confidence, 0.95);
    }

    #[test]
    fn content_collisions_fall_back_to_size_only_at_lower_confidence() {
        let a = series("A", None, vec![volume("A v01", 1000, None)]);
        let b = series("B", None, vec![volume("B v01", 1000, None)]);
        let library = library_of(vec![a, b]);

        let groups = detect_content_collisions(&library);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].confidence, 0.75);
    }

    #[test]
    fn unique_sizes_produce_no_content_groups() {
        let a = series("A", None, vec![volume("A v01", 1000, None)]);
        let b = series("B", None, vec![volume("B v01", 2000, None)]);
        let library = library_of(vec![a, b]);
        assert!(detect_content_collisions(&library).is_empty());
    }

    #[test]
    fn fuzzy_collisions_find_near_identical_names() {
        let a = series("Spy x Family", None, vec![]);
        let b = series("Spy Family", None, vec![]);
        let c = series("Completely Unrelated", None, vec![]);
        let library = library_of(vec![a, b, c]);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();

        let pairs = detect_fuzzy_collisions(&library, 0.80, &pool, &CancellationToken::new());
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].score >= 0.95);
    }

    #[test]
    fn full_report_runs_all_three_detectors() {
        let a = series("One Piece", Some(1), vec![volume("One Piece v01", 1000, Some(10))]);
        let b = series("One Piece Dup", Some(1), vec![volume("One Piece Dup v01", 1000, Some(10))]);
        let library = library_of(vec![a, b]);

        let report = detect_duplicates(
            &library,
            std::num::NonZeroUsize::new(2).unwrap(),
            0.80,
            &crate::progress::NullProgressSink,
            &CancellationToken::new(),
        );
        assert_eq!(report.id_groups.len(), 1);
        assert_eq!(report.content_groups.len(), 1);
        assert!(!report.is_empty());
    }
}
