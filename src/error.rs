use std::path::PathBuf;

use thiserror::Error;

/// Errors that escape a public operation as a fatal `Err`.
///
/// Every other recoverable condition described in the spec's error design
/// (a malformed `series.json`, an incompatible cache snapshot, a shared MAL
/// ID) is captured into a [`Diagnostics`] record instead and returned
/// alongside the successful result.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("library root {path:?} does not exist or is not a directory")]
    Precondition { path: PathBuf },

    #[error("operation was cancelled")]
    Cancelled,
}

/// One recoverable condition encountered while building a result.
#[derive(Debug, Clone)]
pub enum Diagnostic {
    /// A single series directory was unreadable, or its `series.json` could
    /// not be parsed. The series is still emitted (with empty Metadata or
    /// zero Volumes as appropriate).
    PerItem { path: PathBuf, message: String },
    /// The fast binary cache snapshot could not be used.
    CacheRead { message: String },
    /// Writing the cache failed; the in-memory result is still valid.
    CacheWrite { message: String },
    /// Two Series share a non-None external ID; the first encountered in
    /// traversal order was kept in `by_id`.
    IndexCollision { id: i64, kept: String, rejected: String },
}

/// An ordered, append-only collection of recoverable conditions.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_preserve_insertion_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::CacheRead { message: "a".into() });
        diagnostics.push(Diagnostic::CacheWrite { message: "b".into() });
        let messages: Vec<_> = diagnostics
            .iter()
            .map(|d| match d {
                Diagnostic::CacheRead { message } => message.clone(),
                Diagnostic::CacheWrite { message } => message.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(messages, vec!["a".to_string(), "b".to_string()]);
    }
}
