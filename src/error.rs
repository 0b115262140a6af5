//! Error kinds and their process exit codes.

use std::path::PathBuf;

use thiserror::Error;

/// Every failure the engines can surface. Per-file trouble
/// ([`FileUnreadable`](RelinkError::FileUnreadable),
/// [`DirInaccessible`](RelinkError::DirInaccessible)) is logged and skipped
/// where it occurs; everything else propagates.
#[derive(Debug, Error)]
pub enum RelinkError {
    #[error("cannot open database {path}: {cause}")]
    DbOpenFailed { path: PathBuf, cause: String },

    #[error("database {path} has schema version {found}, expected {expected}")]
    DbSchemaMismatch {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("database {path} was created with hasher {found}, but {expected} is selected")]
    HashKindMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },

    #[error("database {path} is corrupt: {cause}")]
    DbCorrupt { path: PathBuf, cause: String },

    #[error("cannot read {path}: {cause}")]
    FileUnreadable { path: PathBuf, cause: String },

    #[error("cannot access directory {path}: {cause}")]
    DirInaccessible { path: PathBuf, cause: String },

    #[error("hasher {program} failed on {path}: {cause}")]
    HasherExecFailed {
        program: String,
        path: PathBuf,
        cause: String,
    },

    #[error("hasher {program} produced unparseable output for {path}: {output:?}")]
    HasherBadOutput {
        program: String,
        path: PathBuf,
        output: String,
    },

    #[error("target path {path} already exists with a conflicting type")]
    TargetPathTypeConflict { path: PathBuf },

    #[error("rename {from} -> {to} failed: {cause}")]
    TargetRenameFailed {
        from: PathBuf,
        to: PathBuf,
        cause: String,
    },

    #[error("link {from} -> {to} failed: {cause}")]
    TargetLinkFailed {
        from: PathBuf,
        to: PathBuf,
        cause: String,
    },

    #[error("unlink {path} failed: {cause}")]
    TargetUnlinkFailed { path: PathBuf, cause: String },

    #[error("plan failed after {completed} of {total} steps at `{step}`: {cause}")]
    PartialPlanFailure {
        completed: usize,
        total: usize,
        step: String,
        cause: String,
    },

    #[error("operation cancelled")]
    OperationCancelled,

    #[error("{0}")]
    Usage(String),

    #[error("no results")]
    NoResult,
}

impl RelinkError {
    /// Process exit code for this kind. `0` is reserved for success.
    pub fn exit_code(&self) -> i32 {
        match self {
            RelinkError::Usage(_) => 2,
            RelinkError::DbSchemaMismatch { .. } => 3,
            RelinkError::HashKindMismatch { .. } => 4,
            RelinkError::PartialPlanFailure { .. } => 5,
            RelinkError::NoResult => 6,
            RelinkError::OperationCancelled => 130,
            _ => 1,
        }
    }
}

/// Exit code for an error chain: the outermost [`RelinkError`] decides,
/// anything else is a generic I/O failure.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<RelinkError>() {
            return e.exit_code();
        }
    }
    1
}
