//! Hash-fill pipeline: a bounded queue of jobs, a fixed worker pool, and a
//! single writer committing results to the database in arrival order.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::Result;
use crossbeam_channel::bounded;

use crate::engine::db_ops::Db;
use crate::engine::hashing::{HashKind, hash_file};
use crate::error::RelinkError;
use crate::types::StoredMeta;
use crate::utils::config::{DB_INSERT_BATCH_SIZE, PIPELINE_CHANNEL_CAP};

use super::context::{HashJob, HashOutcome};

/// Result of a fill run: how many files were hashed and how many had to be
/// skipped as unreadable.
pub struct FillSummary {
    pub hashed: usize,
    pub skipped: usize,
}

/// Hash every job with `num_threads` workers and commit results through the
/// single writer (this thread). Workers check the stop flag between files;
/// on cancellation everything already received is still committed, then
/// `OperationCancelled` is returned.
pub fn fill_hashes(
    root: &Path,
    hasher: &HashKind,
    jobs: Vec<HashJob>,
    db: &mut Db,
    num_threads: usize,
    cancel: &Arc<AtomicBool>,
    mut on_progress: Option<Box<dyn FnMut(usize)>>,
) -> Result<FillSummary> {
    if jobs.is_empty() {
        return Ok(FillSummary {
            hashed: 0,
            skipped: 0,
        });
    }

    let (job_tx, job_rx) = bounded::<HashJob>(PIPELINE_CHANNEL_CAP);
    let (out_tx, out_rx) = bounded::<HashOutcome>(PIPELINE_CHANNEL_CAP);

    let workers: Vec<_> = (0..num_threads.max(1))
        .map(|_| {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            let root = root.to_path_buf();
            let hasher = hasher.clone();
            let cancel = Arc::clone(cancel);
            thread::spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let abs = root.join(&job.rel);
                    let result = hash_file(&hasher, &abs, job.size);
                    if out_tx.send(HashOutcome { job, result }).is_err() {
                        break;
                    }
                }
                drop(out_tx);
            })
        })
        .collect();
    drop(job_rx);
    drop(out_tx);

    // Feeder must not block the writer: move the job list into its own
    // thread and let this thread drain results.
    let feeder = {
        let cancel = Arc::clone(cancel);
        thread::spawn(move || {
            for job in jobs {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);
        })
    };

    let mut hashed = 0_usize;
    let mut skipped = 0_usize;
    let mut fatal: Option<RelinkError> = None;
    let mut batch: Vec<(u64, StoredMeta)> = Vec::with_capacity(DB_INSERT_BATCH_SIZE);
    while let Ok(outcome) = out_rx.recv() {
        match outcome.result {
            Ok(hash) => {
                batch.push((
                    outcome.job.id.ino,
                    (outcome.job.size, outcome.job.mtime, hash),
                ));
                hashed += 1;
                if batch.len() >= DB_INSERT_BATCH_SIZE {
                    db.upsert_batch(&batch)?;
                    batch.clear();
                }
                if let Some(cb) = on_progress.as_mut() {
                    cb(1);
                }
            }
            Err(RelinkError::FileUnreadable { path, cause }) => {
                log::warn!("skipping unreadable {}: {}", path.display(), cause);
                skipped += 1;
            }
            Err(err) => {
                // Hasher failures are fatal: stop feeding, commit what
                // already arrived, surface the error.
                cancel.store(true, Ordering::Relaxed);
                fatal = Some(err);
                break;
            }
        }
    }
    db.upsert_batch(&batch)?;

    // Unblock any worker still waiting to send before joining.
    drop(out_rx);
    let _ = feeder.join();
    for h in workers {
        let _ = h.join();
    }

    if let Some(err) = fatal {
        return Err(err.into());
    }
    if cancel.load(Ordering::Relaxed) {
        return Err(RelinkError::OperationCancelled.into());
    }
    Ok(FillSummary { hashed, skipped })
}
