//! Public and internal types for the relink API and engines.

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::engine::hashing::HashKind;
use crate::filter::FilterRule;

/// Identity of one underlying file object. Two paths alias the same file
/// iff their `FileId`s are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId {
    pub dev: u64,
    pub ino: u64,
}

impl FileId {
    pub fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    /// Synthetic id for files loaded from an offline snapshot (dev 0).
    pub fn offline(ino: u64) -> Self {
        Self { dev: 0, ino }
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}

/// One file within a tree view: size, mtime (integer seconds) and every
/// relative path that links to it. `paths` is non-empty and kept sorted so
/// enumeration order is stable.
#[derive(Clone, Debug)]
pub struct FileNode {
    pub size: u64,
    pub mtime: i64,
    pub paths: Vec<PathBuf>,
}

impl FileNode {
    /// Lexicographically smallest path of this file; used for deterministic
    /// ordering and single-path output.
    pub fn min_path(&self) -> &PathBuf {
        // paths is sorted on insert
        &self.paths[0]
    }
}

/// Content equivalence key: size plus hash, or size alone in size-only mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey {
    pub size: u64,
    pub hash: Option<u64>,
}

/// Stored row of the hash database: (size, mtime, hash).
pub type StoredMeta = (u64, i64, u64);

/// How query results list files that have several hard links.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GroupOutput {
    /// One path per file (the lexicographic minimum).
    #[default]
    File,
    /// Every path of every file, each as its own group member.
    HardLinks,
    /// One member per file, listing all of its paths.
    AllLinks,
}

/// Set of directory paths of a tree, ordered so parents precede children.
pub type DirSet = BTreeSet<PathBuf>;

/// Immutable per-command configuration, merged from `.relink.toml` and the
/// command line and threaded through every entry point.
#[derive(Clone, Debug)]
pub struct Opts {
    /// Ordered include/exclude stack applied to every tree.
    pub filter_rules: Vec<FilterRule>,
    /// Extra rules applied to the first location only.
    pub filter_rules_first: Vec<FilterRule>,
    /// Skip files larger than this many bytes.
    pub max_size: Option<u64>,
    /// Skip files smaller than this many bytes. Default 1, so empty files
    /// stay out of duplicate groups.
    pub min_size: u64,
    /// Match on size alone, without hashing.
    pub size_only: bool,
    /// Build and print the plan without touching the target.
    pub dry_run: bool,
    /// Database basename prefix (`relink-` unless overridden).
    pub db_prefix: String,
    /// Directory holding the databases for all trees, instead of each tree root.
    pub db_root_dir: Option<PathBuf>,
    /// Explicit database file, overriding prefix-based discovery.
    pub db_location: Option<PathBuf>,
    /// Selected hasher; persisted in each database header.
    pub hasher: HashKind,
    /// Hashing worker count. When None, one per hardware thread.
    pub threads: Option<usize>,
    /// Show progress bars.
    pub progress: bool,
    /// Debug-level logging for this crate.
    pub verbose: bool,
    /// Output shape for set queries.
    pub group_output: GroupOutput,
    /// Print each group on a single line.
    pub same_line: bool,
    /// Sort query output by size, largest first.
    pub sort_by_size: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            filter_rules: Vec::new(),
            filter_rules_first: Vec::new(),
            max_size: None,
            min_size: 1,
            size_only: false,
            dry_run: false,
            db_prefix: crate::utils::config::DB_PREFIX.to_string(),
            db_root_dir: None,
            db_location: None,
            hasher: HashKind::default(),
            threads: None,
            progress: false,
            verbose: false,
            group_output: GroupOutput::File,
            same_line: false,
            sort_by_size: false,
        }
    }
}

impl Opts {
    /// Effective hashing worker count.
    pub fn num_threads(&self) -> usize {
        self.threads
            .unwrap_or_else(rayon::current_num_threads)
            .max(1)
    }
}
