//! Relink: content-addressed reconciliation of hard-linked file trees.
//!
//! When files are renamed, moved or re-hardlinked on a source tree, relink
//! mutates the target tree's directory structure (rename, link, unlink) so
//! every target file sits at the same paths as its content-identical source
//! file. No file data is copied, and the last link to a file is never
//! removed. A per-tree hash database makes repeated runs cheap, powers
//! duplicate detection and cross-tree set queries, and can be snapshotted
//! into an "offline tree" that stands in for the directory itself.

pub mod engine;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod tree;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use error::{RelinkError, exit_code_for};
pub use tree::Tree;

/// Result alias used by the public relink API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
