use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull, NoneAsEmptyString};

/// A manga archive on disk (§3 "Volume").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub path: PathBuf,
    pub stem: String,
    pub size_bytes: u64,
    pub modified_unix_secs: i64,
    pub page_count: Option<u32>,
    pub corruption: bool,
}

impl Volume {
    /// `(size, mtime)` pair used by the scanner's reuse rule and the cache's
    /// validity check (§3, §4.5).
    pub fn fingerprint(&self) -> (u64, i64) {
        (self.size_bytes, self.modified_unix_secs)
    }
}

/// A named subdirectory inside a Series owning an ordered run of Volumes
/// (§3 "SubGroup").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGroup {
    pub name: String,
    pub path: PathBuf,
    pub volumes: Vec<Volume>,
}

/// Publication status enumeration from `series.json` (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    Ongoing,
    Completed,
    Hiatus,
    Cancelled,
    #[default]
    Unknown,
}

/// The source-of-truth external metadata record for a Series (§3, §6).
///
/// Empty metadata (`Metadata::default()`) is `{ID=None, titles=[], ...}`.
/// Serialization round-trips through exactly these fields; unknown JSON keys
/// are ignored on load, matching the teacher's `serde_with` usage for its
/// own API response structs.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metadata {
    #[serde(rename = "mal_id")]
    pub mal_id: Option<i64>,
    #[serde(rename = "title")]
    #[serde_as(as = "NoneAsEmptyString")]
    pub romanized_title: Option<String>,
    #[serde(rename = "title_english")]
    #[serde_as(as = "NoneAsEmptyString")]
    pub english_title: Option<String>,
    #[serde(rename = "title_japanese")]
    #[serde_as(as = "NoneAsEmptyString")]
    pub native_title: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub synonyms: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub authors: Vec<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    pub synopsis: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub genres: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    pub tags: Vec<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    pub demographic: Option<String>,
    pub status: PublicationStatus,
    pub total_volumes: Option<u32>,
    pub total_chapters: Option<u32>,
    pub year: Option<u32>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }
}

/// A single manga title (§3 "Series").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub path: PathBuf,
    pub folder_name: String,
    pub volumes: Vec<Volume>,
    pub subgroups: Vec<SubGroup>,
    pub metadata: Metadata,
}

impl Series {
    /// `{folder_name, romanized, english, native} ∪ synonyms`, empties
    /// removed, used only by the Index (§3 "Identities set of a Series").
    pub fn identities(&self) -> Vec<String> {
        let mut out = vec![self.folder_name.clone()];
        for title in [
            &self.metadata.romanized_title,
            &self.metadata.english_title,
            &self.metadata.native_title,
        ] {
            if let Some(t) = title {
                if !t.is_empty() {
                    out.push(t.clone());
                }
            }
        }
        out.extend(self.metadata.synonyms.iter().filter(|s| !s.is_empty()).cloned());
        out
    }

    /// All volumes in this series, whether stored directly or within a
    /// SubGroup, in traversal order.
    pub fn all_volumes(&self) -> impl Iterator<Item = &Volume> {
        self.volumes.iter().chain(self.subgroups.iter().flat_map(|g| g.volumes.iter()))
    }
}

/// Either a leaf holding Series, or an interior node holding child
/// Categories — the two-level Main/Sub tree in §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CategoryChildren {
    Categories(Vec<Category>),
    Series(Vec<Series>),
}

/// A Main or Sub category node (§3 "Category").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub path: PathBuf,
    pub children: CategoryChildren,
}

impl Category {
    pub fn series_iter(&self) -> Box<dyn Iterator<Item = &Series> + '_> {
        match &self.children {
            CategoryChildren::Series(series) => Box::new(series.iter()),
            CategoryChildren::Categories(categories) => {
                Box::new(categories.iter().flat_map(|c| c.series_iter()))
            }
        }
    }
}

/// Root container for a scanned library (§3 "Library").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub root: PathBuf,
    pub main_categories: Vec<Category>,
    /// `false` when a cancelled scan only produced part of the tree (§4.5);
    /// such a Library is never written to cache.
    pub complete: bool,
}

impl Library {
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), main_categories: Vec::new(), complete: true }
    }

    pub fn series_iter(&self) -> impl Iterator<Item = &Series> {
        self.main_categories.iter().flat_map(|c| c.series_iter())
    }

    pub fn series_count(&self) -> usize {
        self.series_iter().count()
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }
}
