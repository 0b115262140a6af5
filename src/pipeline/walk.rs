//! Walk thread: pre-order traversal of the tree root, filtered, feeding the
//! stat workers through a bounded channel.

use std::path::Path;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

use crate::engine::db_ops::is_db_reserved;
use crate::engine::tools::path_relative_to;

use super::context::{ScanContext, WalkItem};

/// Spawn the walk thread. Drops its sender when the traversal ends so the
/// stat workers exit. Returns the count of items sent.
pub fn spawn_walk_thread(item_tx: Sender<WalkItem>, ctx: ScanContext) -> JoinHandle<usize> {
    thread::spawn(move || run_walk_loop(item_tx, &ctx))
}

fn record_skip(ctx: &ScanContext, path: &Path, msg: String) {
    log::warn!("cannot access {}: {}", path.display(), msg);
    ctx.skipped
        .lock()
        .unwrap()
        .push((path.to_path_buf(), msg));
}

/// Serial pre-order walk. Excluded directories are pruned (never
/// descended); the database file and anything matching its reserved
/// basename pattern never enter the tree. Symlinks are not followed.
pub fn run_walk_loop(item_tx: Sender<WalkItem>, ctx: &ScanContext) -> usize {
    let mut count = 0_usize;
    let mut iter = walkdir::WalkDir::new(&ctx.root).into_iter();
    loop {
        let entry = match iter.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(err)) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| ctx.root.clone());
                record_skip(ctx, &path, err.to_string());
                continue;
            }
        };
        let path = entry.path();
        if path == ctx.root {
            continue;
        }
        let rel = match path_relative_to(path, &ctx.root) {
            Some(rel) => rel,
            None => continue,
        };
        let is_dir = entry.file_type().is_dir();
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if is_db_reserved(name, &ctx.db_prefix) {
                continue;
            }
        }
        if let Some(ref db) = ctx.db_canonical {
            // The database itself, plus sidecars named after it.
            if path.starts_with(db) || path.to_string_lossy().starts_with(&*db.to_string_lossy()) {
                continue;
            }
        }
        if !ctx.filter.includes(&rel, is_dir) {
            if is_dir {
                iter.skip_current_dir();
            }
            continue;
        }
        let item = if is_dir {
            WalkItem::Dir(rel)
        } else if entry.file_type().is_file() {
            WalkItem::File {
                abs: path.to_path_buf(),
                rel,
            }
        } else {
            // Symlinks, sockets, devices: not part of the tree model.
            continue;
        };
        if item_tx.send(item).is_err() {
            break;
        }
        count += 1;
    }
    drop(item_tx);
    count
}
