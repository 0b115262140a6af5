//! Shared context and message types for the scan and hash pipelines.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::error::RelinkError;
use crate::filter::FilterSet;
use crate::types::FileId;

/// Context passed into the walk thread: root, filter stack and the shared
/// skip log.
pub struct ScanContext {
    pub root: PathBuf,
    pub filter: Arc<FilterSet>,
    /// Basenames matching `<db_prefix>[0-9]+.db` never enter the tree.
    pub db_prefix: String,
    /// The tree's database file (and its sidecars), wherever it lives.
    pub db_canonical: Option<PathBuf>,
    pub max_size: Option<u64>,
    pub skipped: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

/// One item found by the walk: a directory or a regular file, both with
/// their path relative to the tree root.
pub enum WalkItem {
    Dir(PathBuf),
    File { abs: PathBuf, rel: PathBuf },
}

/// Stat result for one regular file.
pub struct ScanEntry {
    pub rel: PathBuf,
    pub dev: u64,
    pub ino: u64,
    pub size: u64,
    pub mtime: i64,
}

/// One file the hash workers must process.
#[derive(Clone)]
pub struct HashJob {
    pub id: FileId,
    pub rel: PathBuf,
    pub size: u64,
    pub mtime: i64,
}

/// Worker result, committed by the single DB writer in arrival order.
pub struct HashOutcome {
    pub job: HashJob,
    pub result: Result<u64, RelinkError>,
}
