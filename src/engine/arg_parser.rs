//! Command-line surface: one verb per operation, shared tree options.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Content-addressed reconciliation of hard-linked file trees.
#[derive(Parser)]
#[command(name = "relink")]
#[command(version)]
#[command(about = "Mirror a source tree's path structure onto a target by renaming, \
linking and unlinking; no file data is ever copied or destroyed.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Clone, Args)]
pub struct CommonArgs {
    /// Exclude paths matching PATTERN (rsync-like glob; may repeat).
    #[arg(long, short = 'e', value_name = "PATTERN", global = true)]
    pub exclude: Vec<String>,

    /// Include paths matching PATTERN, overriding later excludes (may repeat).
    #[arg(long, value_name = "PATTERN", global = true)]
    pub include: Vec<String>,

    /// Apply PATTERN as an exclude on the first location only.
    #[arg(long = "exclude-once", value_name = "PATTERN", global = true)]
    pub exclude_once: Vec<String>,

    /// Ignore files larger than SIZE bytes.
    #[arg(long = "maxsize", value_name = "SIZE", global = true)]
    pub max_size: Option<u64>,

    /// Treat files as equal when sizes match, skipping the hash.
    #[arg(long = "size-only", global = true)]
    pub size_only: bool,

    /// Include empty files in duplicate groups.
    #[arg(long = "include-empty", global = true)]
    pub include_empty: bool,

    /// Show the plan without mutating the target.
    #[arg(long = "dry-run", short = 'n', global = true)]
    pub dry_run: bool,

    /// Database basename prefix (default `relink-`).
    #[arg(long = "dbprefix", value_name = "PREFIX", global = true)]
    pub db_prefix: Option<String>,

    /// Keep all databases under DIR instead of each tree root.
    #[arg(long = "dbdir", value_name = "DIR", global = true)]
    pub db_root_dir: Option<PathBuf>,

    /// Explicit database file for the tree.
    #[arg(long = "dblocation", value_name = "FILE", global = true)]
    pub db_location: Option<PathBuf>,

    /// Built-in hasher: xxh32 (default) or xxh64.
    #[arg(long, value_name = "KIND", global = true)]
    pub hasher: Option<String>,

    /// External hasher: PROG <path> printing a decimal hash on stdout.
    #[arg(long = "ext-hasher", value_name = "PROG", global = true)]
    pub ext_hasher: Option<String>,

    /// Hashing worker count (default: one per hardware thread).
    #[arg(long, short = 'j', value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Show progress bars.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Debug-level logging.
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// List every hard link of matching files, one group member per path.
    #[arg(long = "hard-links", global = true)]
    pub hard_links: bool,

    /// List matching files once, with all of their hard links.
    #[arg(long = "all-links", global = true)]
    pub all_links: bool,

    /// Print each result group on a single line.
    #[arg(long = "same-line", global = true)]
    pub same_line: bool,

    /// Sort query output by size, largest first.
    #[arg(long = "sort", global = true)]
    pub sort_by_size: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan DIR and bring its hash database up to date.
    Update {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Drop cached hashes for files matching the filter and hash them again.
    Rehash {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Update only the subtree REL of DIR, reusing the root database.
    Subdir {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        #[arg(value_name = "REL")]
        rel: PathBuf,
    },
    /// Update DIR, then write an offline snapshot to OUT.
    Mkoffline {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        #[arg(value_name = "OUT")]
        out: PathBuf,
        /// Overwrite OUT if it exists.
        #[arg(long)]
        force: bool,
    },
    /// Drop stale database entries and compact the file.
    Cleandb {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
    /// Print stored hashes for the given relative paths (all files if none).
    Lookup {
        #[arg(value_name = "LOCATION")]
        location: PathBuf,
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// Reconcile TARGET's path structure with SOURCE by content.
    Sync {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
        #[arg(value_name = "TARGET")]
        target: PathBuf,
    },
    /// Print (or run with --execute) the byte-copy command completing a mirror.
    Rsync {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
        #[arg(value_name = "TARGET")]
        target: PathBuf,
        /// Run the command instead of printing it.
        #[arg(long)]
        execute: bool,
        /// Extra arguments passed through to rsync.
        #[arg(last = true)]
        extra: Vec<String>,
    },
    /// Sync, then run the byte-copy step.
    Syncr {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,
        #[arg(value_name = "TARGET")]
        target: PathBuf,
    },
    /// Compare two trees path by path.
    Cmp {
        #[arg(value_name = "LEFT")]
        left: PathBuf,
        #[arg(value_name = "RIGHT")]
        right: PathBuf,
    },
    /// Find duplicate content within the given trees.
    Fdupes {
        #[arg(value_name = "LOCATION", required = true)]
        locations: Vec<PathBuf>,
    },
    /// Content present in every given tree.
    Onall {
        #[arg(value_name = "LOCATION", required = true)]
        locations: Vec<PathBuf>,
    },
    /// Content present only in the first tree.
    Onfirstonly {
        #[arg(value_name = "LOCATION", required = true)]
        locations: Vec<PathBuf>,
    },
    /// Content present only in the last tree.
    Onlastonly {
        #[arg(value_name = "LOCATION", required = true)]
        locations: Vec<PathBuf>,
    },
    /// Files whose relative path matches any PATTERN.
    Search {
        #[arg(value_name = "PATTERN")]
        pattern: String,
        #[arg(value_name = "LOCATION", required = true)]
        locations: Vec<PathBuf>,
    },
    /// Re-hash files whose metadata is unchanged and report mismatches.
    Check {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
}
