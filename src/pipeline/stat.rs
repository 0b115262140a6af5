//! Stat workers: turn walked file paths into scan entries with file-id,
//! size and mtime. Each path is stat'd by exactly one worker.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use super::context::{ScanContext, ScanEntry, WalkItem};

/// Items the collector receives: directories pass straight through, files
/// come back with their metadata.
pub enum StatItem {
    Dir(PathBuf),
    File(ScanEntry),
}

/// Spawn `num_threads` stat workers. The caller must drop its own sender
/// clone after this so the collector sees end-of-stream.
pub fn spawn_stat_workers(
    item_rx: Receiver<WalkItem>,
    out_tx: &Sender<StatItem>,
    ctx: &ScanContext,
    num_threads: usize,
) -> Vec<JoinHandle<()>> {
    (0..num_threads)
        .map(|_| {
            let item_rx = item_rx.clone();
            let out_tx = out_tx.clone();
            let max_size = ctx.max_size;
            let skipped = std::sync::Arc::clone(&ctx.skipped);
            thread::spawn(move || {
                while let Ok(item) = item_rx.recv() {
                    let out = match item {
                        WalkItem::Dir(rel) => StatItem::Dir(rel),
                        WalkItem::File { abs, rel } => {
                            match stat_file(&abs, rel, max_size) {
                                Ok(Some(entry)) => StatItem::File(entry),
                                Ok(None) => continue,
                                Err(msg) => {
                                    log::warn!("cannot stat {}: {}", abs.display(), msg);
                                    skipped.lock().unwrap().push((abs, msg));
                                    continue;
                                }
                            }
                        }
                    };
                    if out_tx.send(out).is_err() {
                        break;
                    }
                }
                drop(out_tx);
            })
        })
        .collect()
}

#[cfg(unix)]
fn stat_file(abs: &Path, rel: PathBuf, max_size: Option<u64>) -> Result<Option<ScanEntry>, String> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::symlink_metadata(abs).map_err(|e| e.to_string())?;
    if !meta.is_file() {
        return Ok(None);
    }
    if let Some(cap) = max_size {
        if meta.len() > cap {
            log::debug!("skipping {} (over size cap)", rel.display());
            return Ok(None);
        }
    }
    Ok(Some(ScanEntry {
        rel,
        dev: meta.dev(),
        ino: meta.ino(),
        size: meta.len(),
        mtime: meta.mtime(),
    }))
}

#[cfg(not(unix))]
fn stat_file(abs: &Path, rel: PathBuf, max_size: Option<u64>) -> Result<Option<ScanEntry>, String> {
    let meta = std::fs::symlink_metadata(abs).map_err(|e| e.to_string())?;
    if !meta.is_file() {
        return Ok(None);
    }
    if let Some(cap) = max_size {
        if meta.len() > cap {
            return Ok(None);
        }
    }
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    // No stable device/inode pair off unix; fall back to a path digest so
    // every path is its own file (hard links are not detected).
    let ino = xxhash_rust::xxh64::xxh64(abs.to_string_lossy().as_bytes(), 0);
    Ok(Some(ScanEntry {
        rel,
        dev: 1,
        ino,
        size: meta.len(),
        mtime,
    }))
}
