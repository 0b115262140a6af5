//! Uniform read-model over a live directory with its database, or an
//! offline snapshot: enumerate files, resolve hard-link classes, serve
//! hashes on demand.

pub mod offline;
pub mod online;

pub use offline::OfflineTree;
pub use online::OnlineTree;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;

use crate::error::RelinkError;
use crate::filter::{FilterRule, FilterSet};
use crate::types::{DirSet, FileId, FileNode, Opts};

/// A tree view. Online trees can hash and be mutated; offline trees are
/// read-only sources.
pub enum Tree {
    Online(OnlineTree),
    Offline(OfflineTree),
}

impl Tree {
    /// Open a location: a directory becomes an online tree (scanning it and
    /// opening its database), a file is loaded as an offline snapshot.
    /// `first` selects whether the first-location-only filter rules apply.
    pub fn open(location: &Path, opts: &Opts, first: bool) -> Result<Tree> {
        let mut rules: Vec<FilterRule> = Vec::new();
        if first {
            rules.extend(opts.filter_rules_first.iter().cloned());
        }
        rules.extend(opts.filter_rules.iter().cloned());
        let filter = Arc::new(FilterSet::compile(&rules)?);

        if location.is_dir() {
            Ok(Tree::Online(OnlineTree::open(location, opts, filter)?))
        } else if location.is_file() {
            Ok(Tree::Offline(OfflineTree::open(location, opts, filter)?))
        } else {
            Err(RelinkError::Usage(format!(
                "expected a directory or an offline database: {}",
                location.display()
            ))
            .into())
        }
    }

    /// Path shown in messages: the root directory or the snapshot file.
    pub fn label(&self) -> &Path {
        match self {
            Tree::Online(t) => t.root(),
            Tree::Offline(t) => t.location(),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Tree::Online(_))
    }

    /// The online view, or a usage error for verbs that mutate or hash.
    pub fn require_online(&mut self) -> Result<&mut OnlineTree> {
        match self {
            Tree::Online(t) => Ok(t),
            Tree::Offline(t) => Err(RelinkError::Usage(format!(
                "{} is an offline tree; this operation needs a live directory",
                t.location().display()
            ))
            .into()),
        }
    }

    pub fn files(&self) -> &HashMap<FileId, FileNode> {
        match self {
            Tree::Online(t) => t.files(),
            Tree::Offline(t) => t.files(),
        }
    }

    pub fn dirs(&self) -> &DirSet {
        match self {
            Tree::Online(t) => t.dirs(),
            Tree::Offline(t) => t.dirs(),
        }
    }

    pub fn node(&self, id: FileId) -> Option<&FileNode> {
        self.files().get(&id)
    }

    pub fn hash_of(&mut self, id: FileId) -> Result<u64> {
        match self {
            Tree::Online(t) => t.hash_of(id),
            Tree::Offline(t) => t.hash_of(id),
        }
    }

    /// Bulk-hash `ids` ahead of matching or grouping. No-op for offline
    /// trees, which always carry their hashes.
    pub fn fill_hashes(
        &mut self,
        ids: &[FileId],
        opts: &Opts,
        cancel: &Arc<AtomicBool>,
        on_progress: Option<Box<dyn FnMut(usize)>>,
    ) -> Result<usize> {
        match self {
            Tree::Online(t) => t.fill_hashes(ids, opts, cancel, on_progress),
            Tree::Offline(_) => Ok(0),
        }
    }

    /// Map of relative path -> owning file id, across every hard link.
    pub fn path_index(&self) -> HashMap<PathBuf, FileId> {
        let mut map = HashMap::new();
        for (id, node) in self.files() {
            for p in &node.paths {
                map.insert(p.clone(), *id);
            }
        }
        map
    }
}
