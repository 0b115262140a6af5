//! Application configuration constants.
//! Tuning and thresholds in one place.

// ---- Database naming ----

/// Default database basename prefix; final basename is `<prefix><NNN>.db`
/// with a random numeric suffix chosen at creation.
pub const DB_PREFIX: &str = "relink-";

/// Current on-disk schema version, stored in the database header.
pub const DB_SCHEMA_VERSION: u32 = 1;

// ---- Hashing ----

/// Hashing I/O thresholds and buffer sizes.
pub struct HashingConsts;

impl HashingConsts {
    /// File size above which hashing uses memory-mapped I/O (bytes). 100 MB.
    pub const HASH_MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
    /// Chunk size for reading files below mmap threshold (bytes). 1 MB.
    pub const HASH_READ_CHUNK_SIZE: usize = 1024 * 1024;
}

// ---- Pipeline channels ----

/// Capacity of the bounded path and result channels between the walk
/// thread, the hash workers and the DB writer.
pub const PIPELINE_CHANNEL_CAP: usize = 10_000;

/// Batch size for DB insert/update chunks (balance transaction size vs round-trips).
pub const DB_INSERT_BATCH_SIZE: usize = 1000;

// ---- Progress ----

/// Batch size for progress bar updates (reduce lock contention).
pub const PROGRESS_UPDATE_BATCH_SIZE: usize = 100;

// ---- Plan ----

/// Infix of stash pathnames used to break rename cycles.
pub const STASH_INFIX: &str = ".relink-tmp-";
