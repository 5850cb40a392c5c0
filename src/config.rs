use std::num::NonZeroUsize;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull, NoneAsEmptyString};

/// Which title field the renamer prefers when naming series folders and files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitlePolicy {
    #[default]
    English,
    Romanized,
    Native,
    Folder,
}

/// Everything the core needs that isn't derivable from the library itself.
///
/// Unlike the teacher's `Config`, this is never a process-wide singleton:
/// callers construct one (typically by deserializing a TOML/JSON file) and
/// pass `&Config` into whichever operations need it.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory of the library (the four-level hierarchy root).
    #[serde_as(as = "NoneAsEmptyString")]
    pub library_root: Option<PathBuf>,

    /// Size of the fixed worker pool used by the scanner and deduper.
    pub worker_pool_size: NonZeroUsize,

    /// Max age, in seconds, that a fast cache snapshot may be trusted
    /// without re-validating every volume's (size, mtime).
    pub cache_max_age_secs: u64,

    /// Minimum fuzzy score (Jaccard, possibly LCS-refined) to accept a match.
    pub fuzzy_threshold: f64,

    /// Jaccard score at or above which the LCS-ratio refinement is applied
    /// to break ties, per §4.7 step 3.
    pub fuzzy_tie_threshold: f64,

    /// Below this size, a Manga entry with a volume range becomes Undersized.
    pub undersized_volume_bytes: u64,

    /// Below this size, a Manga entry with only a chapter range becomes Undersized.
    pub undersized_chapter_bytes: u64,

    /// Maximum allowed span (`high - low`) for any accepted range.
    pub max_range_span: u64,

    /// Inclusive `[low, high]` window of integers treated as probable years.
    pub year_window: (u32, u32),

    /// Release-noise phrases stripped during parsing (§4.2 step 3). New
    /// phrases are added here, as data, never hardcoded into `parser.rs`.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub noise_phrases: Vec<String>,

    /// Regex fragments naming numerals that must survive number extraction
    /// untouched (§4.2 step 5), e.g. `Kaiju No. 8`.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub protected_tokens: Vec<String>,

    /// Which title the renamer should prefer (§4.8 step 1).
    pub preferred_title_policy: TitlePolicy,

    /// Extensions recognized as Volumes at scan time (§6), without the dot,
    /// compared case-insensitively.
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub volume_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_root: None,
            worker_pool_size: NonZeroUsize::new(4).unwrap(),
            cache_max_age_secs: 3_000,
            fuzzy_threshold: 0.90,
            fuzzy_tie_threshold: 0.80,
            undersized_volume_bytes: 35 * 1024 * 1024,
            undersized_chapter_bytes: 4 * 1024 * 1024,
            max_range_span: 200,
            year_window: (1900, 2150),
            noise_phrases: default_noise_phrases(),
            protected_tokens: default_protected_tokens(),
            preferred_title_policy: TitlePolicy::English,
            volume_extensions: default_volume_extensions(),
        }
    }
}

fn default_noise_phrases() -> Vec<String> {
    [
        "complete edition",
        "special issue",
        "official",
        "digital",
        "colored",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_protected_tokens() -> Vec<String> {
    ["Kaiju No. 8"].into_iter().map(String::from).collect()
}

fn default_volume_extensions() -> Vec<String> {
    ["cbz", "cbr", "zip", "rar", "pdf", "epub"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_max_age_secs, 3_000);
        assert_eq!(config.fuzzy_threshold, 0.90);
        assert_eq!(config.max_range_span, 200);
        assert_eq!(config.year_window, (1900, 2150));
        assert_eq!(config.volume_extensions.len(), 6);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cache_max_age_secs, config.cache_max_age_secs);
        assert_eq!(back.noise_phrases, config.noise_phrases);
    }
}
