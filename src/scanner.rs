use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{CoreError, Diagnostic, Diagnostics};
use crate::models::{Category, CategoryChildren, Library, Metadata, SubGroup, Series, Volume};
use crate::progress::{CancellationToken, Phase, ProgressEvent, ProgressSink};

/// Immediate children of `dir`, sorted by file name (§4.5 step 6 "stable
/// alphabetic by folder name at each level"). Unreadable entries are
/// skipped, not failed — only an unreadable `dir` itself is an error.
fn list_dir_sorted(dir: &Path) -> Result<Vec<walkdir::DirEntry>, String> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        match entry {
            Ok(e) => entries.push(e),
            // depth 0 means `dir` itself could not be read; anything deeper
            // is a single bad child, which we skip rather than fail on.
            Err(err) if err.depth() == 0 => return Err(err.to_string()),
            Err(err) => log::warn!("skipping unreadable entry under {}: {err}", dir.display()),
        }
    }
    Ok(entries)
}

fn fingerprint_of(path: &Path) -> Result<(u64, i64), String> {
    let meta = std::fs::metadata(path).map_err(|err| err.to_string())?;
    let size = meta.len();
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok((size, mtime))
}

fn has_volume_extension(path: &Path, config: &Config) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| config.volume_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Build a fresh or reused Volume for `path`, preferring `prior` when the
/// `(size, mtime)` fingerprint is unchanged (§4.5 step 5b).
fn make_volume(path: &Path, prior: Option<&Volume>) -> Result<Volume, String> {
    let (size, mtime) = fingerprint_of(path)?;
    if let Some(prior) = prior {
        if prior.fingerprint() == (size, mtime) {
            return Ok(prior.clone());
        }
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    Ok(Volume {
        path: path.to_path_buf(),
        stem,
        size_bytes: size,
        modified_unix_secs: mtime,
        page_count: None,
        corruption: false,
    })
}

fn load_metadata(series_json: &Path, diagnostics: &mut Vec<Diagnostic>) -> Metadata {
    let text = match std::fs::read_to_string(series_json) {
        Ok(t) => t,
        Err(err) => {
            diagnostics.push(Diagnostic::PerItem {
                path: series_json.to_path_buf(),
                message: format!("reading series.json: {err}"),
            });
            return Metadata::default();
        }
    };
    let mut deserializer = serde_json::Deserializer::from_str(&text);
    match serde_path_to_error::deserialize(&mut deserializer) {
        Ok(metadata) => metadata,
        Err(err) => {
            diagnostics.push(Diagnostic::PerItem {
                path: series_json.to_path_buf(),
                message: format!("parsing series.json: {err}"),
            });
            Metadata::default()
        }
    }
}

/// Scan a Series directory: classify children into Volumes, SubGroups, and
/// an optional `series.json`, reusing Volume objects from `prior` by
/// filename stem (§4.5 step 5).
fn scan_series(path: &Path, prior: Option<&Series>, config: &Config) -> (Series, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let folder_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

    let entries = match list_dir_sorted(path) {
        Ok(e) => e,
        Err(message) => {
            diagnostics.push(Diagnostic::PerItem { path: path.to_path_buf(), message });
            return (
                Series {
                    path: path.to_path_buf(),
                    folder_name,
                    volumes: Vec::new(),
                    subgroups: Vec::new(),
                    metadata: Metadata::default(),
                },
                diagnostics,
            );
        }
    };

    let prior_volumes: HashMap<&str, &Volume> =
        prior.map(|s| s.volumes.iter().map(|v| (v.stem.as_str(), v)).collect()).unwrap_or_default();
    let prior_subgroups: HashMap<&str, &SubGroup> =
        prior.map(|s| s.subgroups.iter().map(|g| (g.name.as_str(), g)).collect()).unwrap_or_default();

    let mut volumes = Vec::new();
    let mut subgroups = Vec::new();
    let mut metadata = Metadata::default();

    for entry in entries {
        let entry_path = entry.path();
        if entry.file_type().is_file() {
            if entry_path.file_name().and_then(|n| n.to_str()) == Some("series.json") {
                metadata = load_metadata(entry_path, &mut diagnostics);
            } else if has_volume_extension(entry_path, config) {
                match make_volume(entry_path, prior_volumes.get(
                    entry_path.file_stem().and_then(|s| s.to_str()).unwrap_or(""),
                ).copied()) {
                    Ok(volume) => volumes.push(volume),
                    Err(message) => {
                        diagnostics.push(Diagnostic::PerItem { path: entry_path.to_path_buf(), message })
                    }
                }
            }
        } else if entry.file_type().is_dir() {
            let name = entry_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let prior_group = prior_subgroups.get(name.as_str()).copied();
            let (subgroup, mut sub_diagnostics) = scan_subgroup(entry_path, &name, prior_group, config);
            diagnostics.append(&mut sub_diagnostics);
            subgroups.push(subgroup);
        }
    }

    (Series { path: path.to_path_buf(), folder_name, volumes, subgroups, metadata }, diagnostics)
}

/// Recurse exactly one level into a SubGroup directory, applying the same
/// reuse rule as top-level Volumes (§4.5 step 5c).
fn scan_subgroup(
    path: &Path,
    name: &str,
    prior: Option<&SubGroup>,
    config: &Config,
) -> (SubGroup, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let entries = match list_dir_sorted(path) {
        Ok(e) => e,
        Err(message) => {
            diagnostics.push(Diagnostic::PerItem { path: path.to_path_buf(), message });
            return (SubGroup { name: name.to_string(), path: path.to_path_buf(), volumes: Vec::new() }, diagnostics);
        }
    };

    let prior_volumes: HashMap<&str, &Volume> =
        prior.map(|g| g.volumes.iter().map(|v| (v.stem.as_str(), v)).collect()).unwrap_or_default();

    let mut volumes = Vec::new();
    for entry in entries {
        let entry_path = entry.path();
        if entry.file_type().is_file() && has_volume_extension(entry_path, config) {
            let stem = entry_path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
            match make_volume(entry_path, prior_volumes.get(stem).copied()) {
                Ok(volume) => volumes.push(volume),
                Err(message) => {
                    diagnostics.push(Diagnostic::PerItem { path: entry_path.to_path_buf(), message })
                }
            }
        }
    }

    (SubGroup { name: name.to_string(), path: path.to_path_buf(), volumes }, diagnostics)
}

fn prior_series_by_path(library: Option<&Library>) -> HashMap<PathBuf, &Series> {
    library.map(|l| l.series_iter().map(|s| (s.path.clone(), s)).collect()).unwrap_or_default()
}

fn build_pool(config: &Config) -> ThreadPool {
    ThreadPoolBuilder::new()
        .num_threads(config.worker_pool_size.get())
        .thread_name(|i| format!("vibemanga-scan-{i}"))
        .build()
        .expect("thread pool configuration is always valid (non-zero thread count)")
}

/// Walk the four-level library hierarchy and produce a new [`Library`],
/// reusing unchanged Volumes from `prior` (§4.5).
///
/// Returns [`CoreError::Precondition`] only if `root` itself is missing or
/// unreadable; every other failure is recovered locally and appended to the
/// returned [`Diagnostics`].
pub fn scan(
    root: &Path,
    prior: Option<&Library>,
    config: &Config,
    progress: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<(Library, Diagnostics), CoreError> {
    if !root.is_dir() {
        return Err(CoreError::Precondition { path: root.to_path_buf() });
    }

    let main_dirs = list_dir_sorted(root).map_err(|_| CoreError::Precondition { path: root.to_path_buf() })?;
    let prior_by_path = prior_series_by_path(prior);

    let mut main_categories_paths = Vec::new();
    for main_entry in &main_dirs {
        if !main_entry.file_type().is_dir() {
            log::warn!("ignoring non-directory at main-category depth: {}", main_entry.path().display());
            continue;
        }
        let sub_dirs = match list_dir_sorted(main_entry.path()) {
            Ok(d) => d,
            Err(message) => {
                log::warn!("skipping main category {}: {message}", main_entry.path().display());
                continue;
            }
        };

        let mut subs_for_main = Vec::new();
        for sub_entry in &sub_dirs {
            if !sub_entry.file_type().is_dir() {
                log::warn!("ignoring non-directory at sub-category depth: {}", sub_entry.path().display());
                continue;
            }
            let series_dirs = match list_dir_sorted(sub_entry.path()) {
                Ok(d) => d,
                Err(message) => {
                    log::warn!("skipping sub category {}: {message}", sub_entry.path().display());
                    continue;
                }
            };
            let series_paths: Vec<PathBuf> = series_dirs
                .into_iter()
                .filter(|e| e.file_type().is_dir())
                .map(|e| e.path().to_path_buf())
                .collect();
            subs_for_main.push((
                sub_entry.path().file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
                sub_entry.path().to_path_buf(),
                series_paths,
            ));
        }
        main_categories_paths.push((
            main_entry.path().file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
            main_entry.path().to_path_buf(),
            subs_for_main,
        ));
    }

    let total_series: u64 = main_categories_paths
        .iter()
        .flat_map(|(_, _, subs)| subs.iter().map(|(_, _, series)| series.len() as u64))
        .sum();
    progress.report(ProgressEvent { phase: Phase::Scan, done: 0, total: Some(total_series), label: None });

    let pool = build_pool(config);
    let done_counter = std::sync::atomic::AtomicU64::new(0);
    let mut diagnostics = Diagnostics::new();

    let main_categories: Vec<Category> = main_categories_paths
        .into_iter()
        .map(|(main_name, main_path, subs_for_main)| {
            let sub_categories: Vec<Category> = subs_for_main
                .into_iter()
                .map(|(sub_name, sub_path, series_paths)| {
                    let results: Vec<(Series, Vec<Diagnostic>)> = pool.install(|| {
                        series_paths
                            .par_iter()
                            .filter_map(|series_path| {
                                if cancel.is_cancelled() {
                                    return None;
                                }
                                let prior_series = prior_by_path.get(series_path).copied();
                                let result = scan_series(series_path, prior_series, config);
                                let done = done_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed) + 1;
                                progress.report(ProgressEvent {
                                    phase: Phase::Scan,
                                    done,
                                    total: Some(total_series),
                                    label: Some(result.0.folder_name.clone()),
                                });
                                Some(result)
                            })
                            .collect()
                    });

                    let mut series = Vec::with_capacity(results.len());
                    for (s, ds) in results {
                        series.push(s);
                        for d in ds {
                            diagnostics.push(d);
                        }
                    }

                    Category { name: sub_name, path: sub_path, children: CategoryChildren::Series(series) }
                })
                .collect();

            Category { name: main_name, path: main_path, children: CategoryChildren::Categories(sub_categories) }
        })
        .collect();

    let complete = !cancel.is_cancelled();
    let library = Library { root: root.to_path_buf(), main_categories, complete };
    Ok((library, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullProgressSink;

    fn write_file(path: &Path, contents: &[u8]) {
        std::fs::write(path, contents).unwrap();
    }

    fn sample_tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let series_dir = tmp.path().join("Main").join("Sub").join("One Piece");
        std::fs::create_dir_all(&series_dir).unwrap();
        write_file(&series_dir.join("One Piece v01.cbz"), b"dummy volume contents");
        write_file(
            &series_dir.join("series.json"),
            br#"{"mal_id": 13, "title_english": "One Piece"}"#,
        );
        tmp
    }

    #[test]
    fn scan_builds_library_in_traversal_order() {
        let tmp = sample_tree();
        let config = Config::default();
        let (library, diagnostics) =
            scan(tmp.path(), None, &config, &NullProgressSink, &CancellationToken::new()).unwrap();

        assert!(diagnostics.is_empty());
        assert!(library.complete);
        assert_eq!(library.series_count(), 1);
        let series = library.series_iter().next().unwrap();
        assert_eq!(series.folder_name, "One Piece");
        assert_eq!(series.volumes.len(), 1);
        assert_eq!(series.metadata.mal_id, Some(13));
    }

    #[test]
    fn rescan_without_changes_reuses_volumes() {
        let tmp = sample_tree();
        let config = Config::default();
        let (first, _) = scan(tmp.path(), None, &config, &NullProgressSink, &CancellationToken::new()).unwrap();
        let (second, _) = scan(tmp.path(), Some(&first), &config, &NullProgressSink, &CancellationToken::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_root_is_a_precondition_error() {
        let config = Config::default();
        let result = scan(
            Path::new("/does/not/exist/at/all"),
            None,
            &config,
            &NullProgressSink,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(CoreError::Precondition { .. })));
    }

    #[test]
    fn cancellation_before_any_series_yields_incomplete_empty_library() {
        let tmp = sample_tree();
        let config = Config::default();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (library, _) = scan(tmp.path(), None, &config, &NullProgressSink, &cancel).unwrap();
        assert!(!library.complete);
        assert_eq!(library.series_count(), 0);
    }

    #[test]
    fn malformed_series_json_is_recovered_with_empty_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let series_dir = tmp.path().join("Main").join("Sub").join("Broken");
        std::fs::create_dir_all(&series_dir).unwrap();
        write_file(&series_dir.join("series.json"), b"{not valid json");
        let config = Config::default();
        let (library, diagnostics) =
            scan(tmp.path(), None, &config, &NullProgressSink, &CancellationToken::new()).unwrap();

        assert_eq!(library.series_count(), 1);
        assert!(library.series_iter().next().unwrap().metadata.is_empty());
        assert!(!diagnostics.is_empty());
    }
}
