use std::collections::HashMap;

use crate::error::{Diagnostic, Diagnostics};
use crate::models::{Library, Series};
use crate::normalize::normalize;

/// Two maps built from a [`Library`] (§4.6). Immutable once built; a
/// `rebuild` produces a new `Index` rather than mutating this one.
pub struct Index {
    by_id: HashMap<i64, Series>,
    by_title: HashMap<String, Vec<Series>>,
    all: Vec<Series>,
}

impl Index {
    /// Traverse `library` in its stable order, binding each Series' external
    /// ID (first writer wins, collisions recorded) and every non-empty
    /// normalized identity.
    pub fn build(library: &Library) -> (Index, Diagnostics) {
        let mut by_id: HashMap<i64, Series> = HashMap::new();
        let mut by_title: HashMap<String, Vec<Series>> = HashMap::new();
        let mut all: Vec<Series> = Vec::new();
        let mut diagnostics = Diagnostics::new();

        for series in library.series_iter() {
            all.push(series.clone());
            if let Some(id) = series.metadata.mal_id {
                match by_id.get(&id) {
                    None => {
                        by_id.insert(id, series.clone());
                    }
                    Some(kept) => {
                        diagnostics.push(Diagnostic::IndexCollision {
                            id,
                            kept: kept.folder_name.clone(),
                            rejected: series.folder_name.clone(),
                        });
                        log::warn!(
                            "MAL id {id} already bound to {:?}; ignoring {:?}",
                            kept.folder_name,
                            series.folder_name
                        );
                    }
                }
            }

            for identity in series.identities() {
                let key = normalize(&identity);
                if key.is_empty() {
                    continue;
                }
                by_title.entry(key).or_default().push(series.clone());
            }
        }

        (Index { by_id, by_title, all }, diagnostics)
    }

    /// Rebuild from scratch. `O(total identities)`, same cost as `build`
    /// (§4.6 "rebuild is O(total identities)") — there is no incremental path.
    pub fn rebuild(library: &Library) -> (Index, Diagnostics) {
        Self::build(library)
    }

    pub fn get_by_id(&self, id: i64) -> Option<&Series> {
        self.by_id.get(&id)
    }

    /// Normalize `query` and return the matching Series list, in the order
    /// they were inserted during `build` (possibly empty).
    pub fn search(&self, query: &str) -> &[Series] {
        self.by_title.get(&normalize(query)).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn len_by_id(&self) -> usize {
        self.by_id.len()
    }

    /// Every Series in the Library, in traversal order. Used by the fuzzy
    /// matcher and deduper, which must compare against every identity of
    /// every Series rather than just the ones a particular query key hits.
    pub fn all_series(&self) -> impl Iterator<Item = &Series> {
        self.all.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::models::{Category, CategoryChildren, Metadata};

    fn series(folder: &str, id: Option<i64>, english: Option<&str>) -> Series {
        Series {
            path: PathBuf::from(format!("/lib/a/b/{folder}")),
            folder_name: folder.to_string(),
            volumes: Vec::new(),
            subgroups: Vec::new(),
            metadata: Metadata { mal_id: id, english_title: english.map(String::from), ..Metadata::default() },
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
    fn search_finds_every_non_empty_identity() {
        let s = series("One Piece", Some(1), Some("One Piece EN"));
        let library = library_of(vec![s.clone()]);
        let (index, diagnostics) = Index::build(&library);
        assert!(diagnostics.is_empty());

        for identity in s.identities() {
            assert!(index.search(&identity).iter().any(|found| found.folder_name == s.folder_name));
        }
    }

    #[test]
    fn get_by_id_round_trips() {
        let s = series("Berserk", Some(42), None);
        let library = library_of(vec![s.clone()]);
        let (index, _) = Index::build(&library);
        assert_eq!(index.get_by_id(42).unwrap().folder_name, "Berserk");
        assert!(index.get_by_id(99).is_none());
    }

    #[test]
    fn id_collision_keeps_first_and_records_diagnostic() {
        let first = series("First", Some(7), None);
        let second = series("Second", Some(7), None);
        let library = library_of(vec![first.clone(), second.clone()]);
        let (index, diagnostics) = Index::build(&library);

        assert_eq!(index.get_by_id(7).unwrap().folder_name, "First");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn search_is_empty_for_unknown_query() {
        let library = library_of(vec![series("Known", None, None)]);
        let (index, _) = Index::build(&library);
        assert!(index.search("Nothing Like It").is_empty());
    }
}
