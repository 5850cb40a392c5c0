use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::analysis::format_ranges;
use crate::config::{Config, TitlePolicy};
use crate::models::{Series, Volume};
use crate::parser::parse;

// Characters illegal on the strictest supported filesystem (Windows), plus
// the ones the teacher's own `FILENAME_RE` also rejects. Generalized from
// `util.rs::FILENAME_RE`/`HYPHENS`: that pattern allows a wider charset (it
// keeps manga-relevant punctuation like `☆`, `’`); here we only need to
// reject what Windows rejects and collapse whitespace runs, per §4.8 step 1.
static ILLEGAL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]+"#).unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_DOTS_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[. ]+$").unwrap());

/// Strip characters illegal on the strictest supported filesystem and
/// collapse whitespace runs (§4.8 step 1).
pub fn sanitize(name: &str) -> String {
    let stripped = ILLEGAL_CHARS.replace_all(name, "");
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    TRAILING_DOTS_SPACES.replace(collapsed.trim(), "").to_string()
}

/// Which plan-entry shape this is (§3 "Rename plan entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanEntryKind {
    Folder,
    FileExtension,
    FileName,
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub kind: PlanEntryKind,
    pub safety: u8,
    pub uncertain: bool,
    pub collision: bool,
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

/// Pick the preferred title, falling back through the remaining titles and
/// finally the folder name, then sanitize it (§4.8 step 1).
fn target_series_name(series: &Series, policy: TitlePolicy) -> String {
    let metadata = &series.metadata;
    let ordered_titles: [&Option<String>; 3] = match policy {
        TitlePolicy::English => {
            [&metadata.english_title, &metadata.romanized_title, &metadata.native_title]
        }
        TitlePolicy::Romanized => {
            [&metadata.romanized_title, &metadata.english_title, &metadata.native_title]
        }
        TitlePolicy::Native => {
            [&metadata.native_title, &metadata.english_title, &metadata.romanized_title]
        }
        TitlePolicy::Folder => [&None, &None, &None],
    };

    let chosen = ordered_titles
        .into_iter()
        .find_map(|t| t.as_ref().filter(|t| !t.is_empty()))
        .cloned()
        .unwrap_or_else(|| series.folder_name.clone());

    sanitize(&chosen)
}

/// Whether `a` and `b` are equal once case and whitespace runs are
/// normalized away — the "safety 1" case for a folder rename (§4.8 step 2).
fn differs_only_by_whitespace_or_case(a: &str, b: &str) -> bool {
    let fold = |s: &str| s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    fold(a) == fold(b)
}

fn new_extension_for(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "zip" => Some("cbz"),
        "rar" => Some("cbr"),
        _ => None,
    }
}

/// Build the rename plan for `series` under `policy`: folder rename, then
/// extension normalization and file renames for every Volume (§4.8).
pub fn plan_renames(series: &Series, policy: TitlePolicy, config: &Config) -> Vec<PlanEntry> {
    let target_name = target_series_name(series, policy);
    let mut entries = Vec::new();

    if target_name != series.folder_name {
        let safety = if differs_only_by_whitespace_or_case(&target_name, &series.folder_name) { 1 } else { 2 };
        let new_folder_path = series.path.with_file_name(&target_name);
        entries.push(PlanEntry {
            old_path: series.path.clone(),
            new_path: new_folder_path,
            kind: PlanEntryKind::Folder,
            safety,
            uncertain: false,
            collision: false,
        });
    }

    for volume in series.all_volumes() {
        match file_rename_entry(volume, &target_name, config) {
            Some(entry) => entries.push(entry),
            None => {
                if let Some(entry) = extension_only_entry(volume) {
                    entries.push(entry);
                }
            }
        }
    }

    mark_collisions(&mut entries);
    order_plan(&mut entries);
    entries
}

fn extension_only_entry(volume: &Volume) -> Option<PlanEntry> {
    let ext = volume.path.extension().and_then(|e| e.to_str())?;
    let new_ext = new_extension_for(ext)?;
    Some(PlanEntry {
        old_path: volume.path.clone(),
        new_path: volume.path.with_extension(new_ext),
        kind: PlanEntryKind::FileExtension,
        safety: 1,
        uncertain: false,
        collision: false,
    })
}

/// A Volume's parsed title segment differs from `target_name`: emit a
/// `file-name` entry replacing the leading segment and keeping the parsed
/// `vNN`/`cNNN` tail exactly as the parser produced it (§4.8 step 4). The
/// new path also carries the normalized extension, folding step 3's fix in
/// directly rather than describing two renames of the same physical file.
/// Safety is 3 and the entry `uncertain` when the parser found no ranges at
/// all, since there is then no anchor to preserve.
fn file_rename_entry(volume: &Volume, target_name: &str, config: &Config) -> Option<PlanEntry> {
    let parsed = parse(&volume.stem, Some(volume.size_bytes), config);
    if parsed.cleaned_title == target_name {
        return None;
    }

    let has_ranges = !parsed.volume_ranges.is_empty() || !parsed.chapter_ranges.is_empty();
    let (safety, uncertain) = if has_ranges { (2, false) } else { (3, true) };

    let tail = if !parsed.volume_ranges.is_empty() {
        format_ranges(&parsed.volume_ranges, "v", 2)
    } else if !parsed.chapter_ranges.is_empty() {
        format_ranges(&parsed.chapter_ranges, "c", 3)
    } else {
        String::new()
    };

    let new_stem = if tail.is_empty() { target_name.to_string() } else { format!("{target_name} {tail}") };
    let original_ext = volume.path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let corrected_ext = new_extension_for(original_ext).unwrap_or(original_ext);

    let mut new_path = volume.path.clone();
    new_path.set_file_name(format!("{new_stem}.{corrected_ext}"));

    Some(PlanEntry {
        old_path: volume.path.clone(),
        new_path,
        kind: PlanEntryKind::FileName,
        safety,
        uncertain,
        collision: false,
    })
}

fn mark_collisions(entries: &mut [PlanEntry]) {
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            if entries[i].new_path == entries[j].new_path {
                entries[i].collision = true;
                entries[j].collision = true;
            }
        }
    }
}

/// Sort deepest-first, ties broken lexicographically by new path (§4.8 step
/// 6, §5 "Rename-plan ordering").
fn order_plan(entries: &mut [PlanEntry]) {
    entries.sort_by_key(|e| (Reverse(depth(&e.old_path)), e.new_path.clone()));
}

/// Suffix a colliding path with ` (2)`, ` (3)`, … until it no longer
/// collides with `taken` (§4.8 step 5, opt-in suffixing mode).
pub fn suffix_for_collision(path: &Path, taken: &[PathBuf]) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("").to_string();
    let ext = path.extension().and_then(|e| e.to_str()).map(|e| format!(".{e}")).unwrap_or_default();
    let mut n = 2;
    loop {
        let candidate = path.with_file_name(format!("{stem} ({n}){ext}"));
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Consumes a plan in order; stops on the first filesystem error. Both
/// "simulate" and "apply" are this same function, with `simulate` skipping
/// the actual filesystem call (§4.8 "a separate applier consumes the
/// plan... both modes are expressed as the same plan, differently
/// consumed").
pub fn apply_plan(plan: &[PlanEntry], simulate: bool) -> Result<usize, std::io::Error> {
    let mut last_successful = 0;
    for (i, entry) in plan.iter().enumerate() {
        if entry.collision {
            continue;
        }
        if !simulate {
            std::fs::rename(&entry.old_path, &entry.new_path)?;
        }
        last_successful = i;
    }
    Ok(last_successful)
}

pub fn simulate_plan(plan: &[PlanEntry]) -> Result<usize, std::io::Error> {
    apply_plan(plan, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn volume(path: &str) -> Volume {
        let path = PathBuf::from(path);
        let stem = path.file_stem().unwrap().to_string_lossy().to_string();
        Volume { path, stem, size_bytes: 60 * 1024 * 1024, modified_unix_secs: 0, page_count: None, corruption: false }
    }

    fn series_with_volumes(folder: &str, english: &str, volumes: Vec<Volume>) -> Series {
        Series {
            path: PathBuf::from(format!("/lib/a/b/{folder}")),
            folder_name: folder.to_string(),
            volumes,
            subgroups: Vec::new(),
            metadata: Metadata { english_title: Some(english.to_string()), ..Default::default() },
        }
    }

    #[test]
    fn sanitize_strips_windows_illegal_characters() {
        assert_eq!(sanitize(r#"Attack<on>Titan: "Special""#), "AttackonTitan Special");
    }

    #[test]
    fn sanitize_trims_trailing_dots_and_spaces() {
        assert_eq!(sanitize("Berserk. . "), "Berserk");
    }

    #[test]
    fn scenario_six_rename_plan() {
        let volumes = vec![
            volume("/lib/a/b/Shingeki no Kyojin/Shingeki no Kyojin v01.zip"),
            volume("/lib/a/b/Shingeki no Kyojin/Shingeki no Kyojin v02.cbz"),
        ];
        let series = series_with_volumes("Shingeki no Kyojin", "Attack on Titan", volumes);
        let config = Config::default();
        let plan = plan_renames(&series, TitlePolicy::English, &config);

        let folder_entry = plan.iter().find(|e| e.kind == PlanEntryKind::Folder).unwrap();
        assert_eq!(folder_entry.new_path, PathBuf::from("/lib/a/b/Attack on Titan"));
        assert_eq!(folder_entry.safety, 2);

        let file_entries: Vec<_> = plan.iter().filter(|e| e.kind == PlanEntryKind::FileName).collect();
        assert_eq!(file_entries.len(), 2);
        assert!(file_entries.iter().any(|e| e.new_path.ends_with("Attack on Titan v01.cbz")));
        assert!(file_entries.iter().any(|e| e.new_path.ends_with("Attack on Titan v02.cbz")));
        for entry in &file_entries {
            assert_eq!(entry.safety, 2);
        }

        let folder_index = plan.iter().position(|e| e.kind == PlanEntryKind::Folder).unwrap();
        assert!(plan[..folder_index].iter().all(|e| e.kind != PlanEntryKind::Folder));
    }

    #[test]
    fn pure_extension_fix_when_title_already_matches() {
        let volumes = vec![volume("/lib/a/b/Berserk/Berserk v01.zip")];
        let series = series_with_volumes("Berserk", "Berserk", volumes);
        let config = Config::default();
        let plan = plan_renames(&series, TitlePolicy::English, &config);

        assert!(plan.iter().all(|e| e.kind != PlanEntryKind::Folder));
        let ext_entry = plan.iter().find(|e| e.kind == PlanEntryKind::FileExtension).unwrap();
        assert_eq!(ext_entry.new_path.extension().unwrap(), "cbz");
        assert_eq!(ext_entry.safety, 1);
    }

    #[test]
    fn uncertain_when_parser_finds_no_ranges() {
        let volumes = vec![volume("/lib/a/b/Oneshot/Oneshot Special.cbz")];
        let series = series_with_volumes("Oneshot", "Renamed Oneshot", volumes);
        let config = Config::default();
        let plan = plan_renames(&series, TitlePolicy::English, &config);

        let file_entry = plan.iter().find(|e| e.kind == PlanEntryKind::FileName).unwrap();
        assert_eq!(file_entry.safety, 3);
        assert!(file_entry.uncertain);
    }

    #[test]
    fn collisions_are_marked_on_both_entries() {
        let volumes = vec![
            volume("/lib/a/b/Series/Series v01.cbz"),
            volume("/lib/a/b/Series/Series v1.cbz"),
        ];
        let series = series_with_volumes("Series", "Series", volumes);
        let config = Config::default();
        let plan = plan_renames(&series, TitlePolicy::English, &config);
        let file_entries: Vec<_> = plan.iter().filter(|e| e.kind == PlanEntryKind::FileName).collect();
        assert_eq!(file_entries.len(), 2);
        assert!(file_entries.iter().all(|e| e.collision));
    }

    #[test]
    fn suffix_for_collision_finds_first_free_suffix() {
        let taken = vec![PathBuf::from("/lib/Series v01 (2).cbz")];
        let suffixed = suffix_for_collision(Path::new("/lib/Series v01.cbz"), &taken);
        assert_eq!(suffixed, PathBuf::from("/lib/Series v01 (3).cbz"));
    }

    #[test]
    fn apply_plan_in_simulate_mode_touches_nothing() {
        let entry = PlanEntry {
            old_path: PathBuf::from("/does/not/exist.cbz"),
            new_path: PathBuf::from("/does/not/exist-renamed.cbz"),
            kind: PlanEntryKind::FileName,
            safety: 2,
            uncertain: false,
            collision: false,
        };
        let result = simulate_plan(&[entry]);
        assert_eq!(result.unwrap(), 0);
    }
}
