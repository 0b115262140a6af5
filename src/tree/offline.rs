//! Offline tree view: a database file carrying both hashes and the tree
//! structure, substitutable for a live directory in read-only contexts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;

use crate::engine::db_ops::{Db, DbKind};
use crate::error::RelinkError;
use crate::filter::FilterSet;
use crate::types::{DirSet, FileId, FileNode, Opts};

/// Directory rows in the path table use this file-id sentinel; real file
/// ids are never zero.
pub const DIR_SENTINEL: u64 = 0;

pub struct OfflineTree {
    path: PathBuf,
    files: HashMap<FileId, FileNode>,
    dirs: DirSet,
    hashes: HashMap<FileId, u64>,
}

impl OfflineTree {
    /// Load a snapshot from `path`. The filter stack applies to the stored
    /// paths the same way it applies to a live walk.
    pub fn open(path: &Path, opts: &Opts, filter: Arc<FilterSet>) -> Result<OfflineTree> {
        let db = Db::open(path, &opts.hasher, DbKind::Offline)?;
        if db.kind() != DbKind::Offline {
            return Err(RelinkError::Usage(format!(
                "{} is a hash cache, not an offline tree (run mkoffline first)",
                path.display()
            ))
            .into());
        }
        let entries = db.load_entries()?;
        let mut files: HashMap<FileId, FileNode> = HashMap::new();
        let mut dirs = DirSet::new();
        let mut hashes = HashMap::new();
        for (ino, rel) in db.load_paths()? {
            if ino == DIR_SENTINEL {
                if filter.includes(&rel, true) {
                    dirs.insert(rel);
                }
                continue;
            }
            if !filter.includes(&rel, false) {
                continue;
            }
            let (size, mtime, hash) = match entries.get(&ino) {
                Some(meta) => *meta,
                None => {
                    return Err(RelinkError::DbCorrupt {
                        path: path.to_path_buf(),
                        cause: format!("path row without entry for file id {ino}"),
                    }
                    .into());
                }
            };
            if let Some(cap) = opts.max_size {
                if size > cap {
                    continue;
                }
            }
            let id = FileId::offline(ino);
            files
                .entry(id)
                .or_insert_with(|| FileNode {
                    size,
                    mtime,
                    paths: Vec::new(),
                })
                .paths
                .push(rel);
            hashes.insert(id, hash);
        }
        for node in files.values_mut() {
            node.paths.sort();
        }
        // Parents of every file path belong to the dir set even when the
        // snapshot predates explicit dir rows.
        let prefixes: Vec<PathBuf> = files
            .values()
            .flat_map(|n| n.paths.iter())
            .flat_map(|p| p.ancestors().skip(1))
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect();
        dirs.extend(prefixes);
        Ok(OfflineTree {
            path: path.to_path_buf(),
            files,
            dirs,
            hashes,
        })
    }

    pub fn location(&self) -> &Path {
        &self.path
    }

    pub fn files(&self) -> &HashMap<FileId, FileNode> {
        &self.files
    }

    pub fn dirs(&self) -> &DirSet {
        &self.dirs
    }

    pub fn hash_of(&self, id: FileId) -> Result<u64> {
        self.hashes.get(&id).copied().ok_or_else(|| {
            RelinkError::DbCorrupt {
                path: self.path.clone(),
                cause: format!("no hash for file id {}", id.ino),
            }
            .into()
        })
    }
}
