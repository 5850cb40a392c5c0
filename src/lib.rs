//! Identity-and-parsing engine for large local manga library collections.
//!
//! This crate is the core described in `spec.md`: a hierarchical scanner, a
//! messy-filename parser, a metadata-first identity index, a deterministic
//! matcher, a rename planner, and an intra-library deduper, underpinned by a
//! content-addressed cache. The terminal UI, CLI dispatcher, HTTP client to
//! the remote metadata service, AI-model façade, torrent-client control
//! plane, and archive-integrity inspection are external collaborators
//! reached only through the contracts exposed here; none of them lives in
//! this crate.

#[macro_use]
extern crate log;

pub mod analysis;
pub mod cache;
pub mod config;
pub mod dedupe;
pub mod error;
pub mod fuzzy;
pub mod index;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod parser;
pub mod progress;
pub mod renamer;
pub mod scanner;

pub use config::{Config, TitlePolicy};
pub use error::{CoreError, Diagnostic, Diagnostics};
pub use models::{Category, CategoryChildren, Library, Metadata, PublicationStatus, Series, SubGroup, Volume};
pub use progress::{CancellationToken, NullProgressSink, Phase, ProgressEvent, ProgressSink};
