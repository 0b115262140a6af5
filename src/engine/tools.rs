//! Path and cancellation utilities shared by the engines.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

/// Convert absolute path to relative path from base.
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// True when `path` lies inside `dir` (or is `dir` itself).
pub fn is_subdir(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

/// Case-fold a relative path component-wise, for path equality on
/// case-insensitive targets.
pub fn fold_path(path: &Path) -> PathBuf {
    path.components()
        .map(|c| match c {
            Component::Normal(os) => os.to_string_lossy().to_lowercase(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect()
}

/// Probe whether the filesystem holding `root` folds case: create a probe
/// file and look it up under a different case. Writes (and removes) a file
/// under `root`, so callers must not probe during a dry run.
pub fn probe_case_insensitive(root: &Path) -> bool {
    let lower = root.join(".relink_case_probe");
    let upper = root.join(".RELINK_CASE_PROBE");
    if std::fs::write(&lower, b"").is_err() {
        return false;
    }
    let folded = upper.exists();
    let _ = std::fs::remove_file(&lower);
    folded
}

static CANCEL_FLAG: std::sync::OnceLock<Arc<AtomicBool>> = std::sync::OnceLock::new();

/// Setup Ctrl+C handler and return a shared flag set when the user asks to
/// stop. Workers check it between files, never mid-file. The handler is
/// installed once per process.
pub fn setup_ctrlc_handler() -> Result<Arc<AtomicBool>> {
    if let Some(flag) = CANCEL_FLAG.get() {
        return Ok(Arc::clone(flag));
    }
    let cancel_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel_requested);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;
    Ok(Arc::clone(
        CANCEL_FLAG.get_or_init(|| cancel_requested),
    ))
}

/// Return `OperationCancelled` if the user has requested cancellation.
pub fn check_for_cancel(cancel_requested: &Arc<AtomicBool>) -> Result<()> {
    if cancel_requested.load(Ordering::Relaxed) {
        return Err(crate::error::RelinkError::OperationCancelled.into());
    }
    Ok(())
}

/// End-of-command report for per-file trouble collected along the way.
pub fn report_skipped(skipped: &[(PathBuf, String)]) {
    if skipped.is_empty() {
        return;
    }
    log::warn!("skipped {} paths due to access errors", skipped.len());
    for (p, msg) in skipped {
        log::debug!("  skipped {}: {}", p.display(), msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_lowers_each_component() {
        assert_eq!(
            fold_path(Path::new("Foo/BAR/baz.TXT")),
            PathBuf::from("foo/bar/baz.txt")
        );
    }

    #[test]
    fn subdir_checks() {
        assert!(is_subdir(Path::new("/a/b/c"), Path::new("/a/b")));
        assert!(!is_subdir(Path::new("/a/bc"), Path::new("/a/b")));
    }
}
