//! Online tree view: a live directory plus its hash database.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};

use crate::engine::db_ops::{Db, DbKind, db_path_for_root};
use crate::engine::hashing::{HashKind, hash_file};
use crate::filter::FilterSet;
use crate::pipeline::{self, HashJob};
use crate::types::{DirSet, FileId, FileNode, Opts, StoredMeta};

pub struct OnlineTree {
    root: PathBuf,
    db: Db,
    hasher: HashKind,
    files: HashMap<FileId, FileNode>,
    dirs: DirSet,
    /// Stored rows, kept in sync with upserts made through this handle.
    stored: HashMap<u64, StoredMeta>,
    /// Hashes verified fresh during this command.
    fresh: HashMap<FileId, u64>,
    skipped: Vec<(PathBuf, String)>,
}

impl OnlineTree {
    /// Scan `root` and open (or create) its database.
    pub fn open(root: &Path, opts: &Opts, filter: Arc<FilterSet>) -> Result<OnlineTree> {
        let root = root
            .canonicalize()
            .with_context(|| format!("canonicalize tree root {}", root.display()))?;
        let db_path = db_path_for_root(&root, opts)?;
        let db = Db::open(&db_path, &opts.hasher, DbKind::Online)?;
        let db_canonical = db_path.canonicalize().ok();
        let scan = pipeline::scan_tree(
            &root,
            filter,
            &opts.db_prefix,
            db_canonical,
            opts.max_size,
            opts.num_threads(),
        )?;
        let stored = db.load_entries()?;
        log::debug!(
            "{}: {} files, {} dirs, {} cached hashes",
            root.display(),
            scan.files.len(),
            scan.dirs.len(),
            stored.len()
        );
        Ok(OnlineTree {
            root,
            db,
            hasher: opts.hasher.clone(),
            files: scan.files,
            dirs: scan.dirs,
            stored,
            fresh: HashMap::new(),
            skipped: scan.skipped,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &HashMap<FileId, FileNode> {
        &self.files
    }

    pub fn dirs(&self) -> &DirSet {
        &self.dirs
    }

    pub fn skipped(&self) -> &[(PathBuf, String)] {
        &self.skipped
    }

    pub fn abs_path(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    fn stored_fresh(&self, id: FileId, node: &FileNode) -> Option<u64> {
        match self.stored.get(&id.ino) {
            Some((size, mtime, hash)) if *size == node.size && *mtime == node.mtime => Some(*hash),
            _ => None,
        }
    }

    /// Content hash of one file: cached when fresh, computed and committed
    /// otherwise.
    pub fn hash_of(&mut self, id: FileId) -> Result<u64> {
        if let Some(h) = self.fresh.get(&id) {
            return Ok(*h);
        }
        let node = self
            .files
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!("unknown file id {id}"))?;
        if let Some(h) = self.stored_fresh(id, node) {
            self.fresh.insert(id, h);
            return Ok(h);
        }
        let abs = self.root.join(node.min_path());
        let size = node.size;
        let mtime = node.mtime;
        let h = hash_file(&self.hasher, &abs, size)?;
        self.db.upsert_entry(id.ino, size, mtime, h)?;
        self.stored.insert(id.ino, (size, mtime, h));
        self.fresh.insert(id, h);
        Ok(h)
    }

    /// Ids whose stored hash is missing or stale.
    pub fn stale_ids(&self) -> Vec<FileId> {
        let mut ids: Vec<FileId> = self
            .files
            .iter()
            .filter(|(id, node)| self.stored_fresh(**id, node).is_none())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Hash `ids` through the worker pipeline and commit to the database.
    /// Returns how many files were skipped as unreadable.
    pub fn fill_hashes(
        &mut self,
        ids: &[FileId],
        opts: &Opts,
        cancel: &Arc<AtomicBool>,
        on_progress: Option<Box<dyn FnMut(usize)>>,
    ) -> Result<usize> {
        let jobs: Vec<HashJob> = ids
            .iter()
            .filter_map(|id| {
                let node = self.files.get(id)?;
                if self.stored_fresh(*id, node).is_some() {
                    return None;
                }
                Some(HashJob {
                    id: *id,
                    rel: node.min_path().clone(),
                    size: node.size,
                    mtime: node.mtime,
                })
            })
            .collect();
        let summary = pipeline::fill_hashes(
            &self.root,
            &self.hasher,
            jobs,
            &mut self.db,
            opts.num_threads(),
            cancel,
            on_progress,
        )?;
        if summary.hashed > 0 {
            self.stored = self.db.load_entries()?;
        }
        Ok(summary.skipped)
    }

    /// Adopt cached rows from another database's entries for the files of
    /// this tree, keeping rows already present. File identity carries over
    /// because hard links never cross filesystems. Returns how many rows
    /// were adopted.
    pub fn adopt_entries(&mut self, source: &HashMap<u64, StoredMeta>) -> Result<usize> {
        let rows: Vec<(u64, StoredMeta)> = self
            .files
            .keys()
            .filter(|id| !self.stored.contains_key(&id.ino))
            .filter_map(|id| source.get(&id.ino).map(|meta| (id.ino, *meta)))
            .collect();
        self.db.upsert_batch(&rows)?;
        for (ino, meta) in &rows {
            self.stored.insert(*ino, *meta);
        }
        Ok(rows.len())
    }

    /// Drop database entries whose file-id no longer exists in the tree.
    pub fn prune_db(&mut self) -> Result<usize> {
        let live: HashSet<u64> = self.files.keys().map(|id| id.ino).collect();
        let removed = self.db.prune(&live)?;
        self.stored.retain(|ino, _| live.contains(ino));
        Ok(removed)
    }

    /// Forget stored hashes for `ids` so the next fill recomputes them.
    pub fn drop_entries(&mut self, ids: &[FileId]) -> Result<()> {
        let inos: Vec<u64> = ids.iter().map(|id| id.ino).collect();
        self.db.delete_entries(&inos)?;
        for ino in &inos {
            self.stored.remove(ino);
        }
        self.fresh.retain(|id, _| !inos.contains(&id.ino));
        Ok(())
    }

    pub fn vacuum_db(&self) -> Result<()> {
        self.db.vacuum()
    }

    pub fn db_entry_count(&self) -> Result<usize> {
        self.db.entry_count()
    }

    /// Stored hash row for one file, fresh or not (bitrot checks need the
    /// old value even when mtime moved).
    pub fn stored_entry(&self, id: FileId) -> Option<StoredMeta> {
        self.stored.get(&id.ino).copied()
    }
}
