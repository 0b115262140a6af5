//! Scan and hash pipelines: walk thread, stat workers, hash workers, one
//! database writer.

pub mod context;
pub mod hashfill;
pub mod stat;
pub mod walk;

pub use context::{HashJob, HashOutcome, ScanContext, ScanEntry, WalkItem};
pub use hashfill::{FillSummary, fill_hashes};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use crossbeam_channel::bounded;

use crate::filter::FilterSet;
use crate::types::{DirSet, FileId, FileNode};
use crate::utils::config::PIPELINE_CHANNEL_CAP;

/// Everything a scan produces: hard-link-aware file map, directory set, and
/// the paths that had to be skipped.
pub struct ScanResult {
    pub files: HashMap<FileId, FileNode>,
    pub dirs: DirSet,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Enumerate `root` into a tree model: walk thread feeds stat workers, this
/// thread collects and merges hard links by file-id.
pub fn scan_tree(
    root: &Path,
    filter: Arc<FilterSet>,
    db_prefix: &str,
    db_canonical: Option<PathBuf>,
    max_size: Option<u64>,
    num_threads: usize,
) -> Result<ScanResult> {
    let skipped = Arc::new(Mutex::new(Vec::new()));
    let ctx = ScanContext {
        root: root.to_path_buf(),
        filter,
        db_prefix: db_prefix.to_string(),
        db_canonical,
        max_size,
        skipped: Arc::clone(&skipped),
    };

    let (item_tx, item_rx) = bounded::<WalkItem>(PIPELINE_CHANNEL_CAP);
    let (out_tx, out_rx) = bounded::<stat::StatItem>(PIPELINE_CHANNEL_CAP);

    let worker_handles = stat::spawn_stat_workers(item_rx, &out_tx, &ctx, num_threads);
    let walk_handle = walk::spawn_walk_thread(item_tx, ctx);
    // Dropping the last sender closes the channel so the collector exits.
    drop(out_tx);

    let root_dev = root_device(root);
    let mut files: HashMap<FileId, FileNode> = HashMap::new();
    let mut dirs = DirSet::new();
    while let Ok(item) = out_rx.recv() {
        match item {
            stat::StatItem::Dir(rel) => {
                dirs.insert(rel);
            }
            stat::StatItem::File(entry) => {
                if let Some(dev) = root_dev {
                    if entry.dev != dev {
                        log::debug!(
                            "skipping {} (different device, cannot hard link)",
                            entry.rel.display()
                        );
                        continue;
                    }
                }
                let id = FileId::new(entry.dev, entry.ino);
                match files.get_mut(&id) {
                    None => {
                        files.insert(
                            id,
                            FileNode {
                                size: entry.size,
                                mtime: entry.mtime,
                                paths: vec![entry.rel],
                            },
                        );
                    }
                    Some(node) => {
                        // Aliases of one file must agree on size and mtime.
                        if node.size != entry.size || node.mtime != entry.mtime {
                            log::warn!(
                                "metadata changed under scan for {}: keeping first observation",
                                entry.rel.display()
                            );
                        }
                        node.paths.push(entry.rel);
                    }
                }
            }
        }
    }

    walk_handle
        .join()
        .map_err(|_| anyhow::anyhow!("walk thread panicked"))?;
    for h in worker_handles {
        let _ = h.join();
    }

    for node in files.values_mut() {
        node.paths.sort();
    }

    let skipped = std::mem::take(&mut *skipped.lock().unwrap());
    Ok(ScanResult {
        files,
        dirs,
        skipped,
    })
}

#[cfg(unix)]
fn root_device(root: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    std::fs::metadata(root).ok().map(|m| m.dev())
}

#[cfg(not(unix))]
fn root_device(_root: &Path) -> Option<u64> {
    None
}
