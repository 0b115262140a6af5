//! Hash database operations.
//!
//! One SQLite file per tree root. The header (`meta` table) pins the schema
//! version, the hasher identifier and the database kind; `entries` maps
//! file-id to `(size, mtime, hash)`. Offline databases additionally carry a
//! `paths` table with the tree structure, byte-exact as reported by the OS.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::engine::hashing::HashKind;
use crate::error::RelinkError;
use crate::types::StoredMeta;
use crate::utils::config::{DB_INSERT_BATCH_SIZE, DB_SCHEMA_VERSION};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS entries (
    file_id INTEGER PRIMARY KEY,
    size INTEGER NOT NULL,
    mtime INTEGER NOT NULL,
    hash INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS paths (
    file_id INTEGER NOT NULL,
    path BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_paths_file_id ON paths(file_id);
"#;

/// Online databases cache hashes for a live directory; offline databases
/// also store the tree structure and substitute for a directory as a
/// read-only source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbKind {
    Online,
    Offline,
}

impl DbKind {
    fn as_str(self) -> &'static str {
        match self {
            DbKind::Online => "online",
            DbKind::Offline => "offline",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(DbKind::Online),
            "offline" => Some(DbKind::Offline),
            _ => None,
        }
    }
}

/// Open handle to one tree's database. Holds the whole-file exclusive lock
/// from open to drop; a second invocation on the same tree fails at open.
#[derive(Debug)]
pub struct Db {
    conn: Connection,
    path: PathBuf,
    kind: DbKind,
}

impl Db {
    /// Open `path`, creating it with `kind` when absent. Verifies schema
    /// version and hasher identifier, then takes the exclusive lock.
    pub fn open(path: &Path, hasher: &HashKind, kind: DbKind) -> Result<Db> {
        let fresh = !path.exists();
        let conn = Connection::open(path).map_err(|e| RelinkError::DbOpenFailed {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
        conn.busy_timeout(Duration::from_millis(0))
            .context("set busy timeout")?;
        conn.pragma_update(None, "locking_mode", "exclusive")
            .context("set exclusive locking")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("set synchronous")?;
        // Force lock acquisition now rather than on first write; a
        // contended database must fail the whole command up front.
        conn.execute_batch("BEGIN EXCLUSIVE; COMMIT;").map_err(|e| {
            RelinkError::DbOpenFailed {
                path: path.to_path_buf(),
                cause: format!("locked by another invocation? {e}"),
            }
        })?;
        conn.execute_batch(SCHEMA).context("create schema")?;

        let mut db = Db {
            conn,
            path: path.to_path_buf(),
            kind,
        };
        if fresh {
            db.write_header(hasher, kind)?;
        } else {
            db.check_header(hasher)?;
        }
        Ok(db)
    }

    /// Open an in-memory database with the same schema (tests and staging).
    pub fn open_in_memory(hasher: &HashKind, kind: DbKind) -> Result<Db> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        conn.execute_batch(SCHEMA).context("create schema")?;
        let db = Db {
            conn,
            path: PathBuf::from(":memory:"),
            kind,
        };
        db.write_header(hasher, kind)?;
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    fn write_header(&self, hasher: &HashKind, kind: DbKind) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")
            .context("prepare header insert")?;
        stmt.execute(("schema_version", DB_SCHEMA_VERSION.to_string()))?;
        stmt.execute(("hasher", hasher.id()))?;
        stmt.execute(("kind", kind.as_str()))?;
        Ok(())
    }

    fn header_value(&self, key: &str) -> Result<String> {
        self.conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| {
                RelinkError::DbCorrupt {
                    path: self.path.clone(),
                    cause: format!("missing header key `{key}`: {e}"),
                }
                .into()
            })
    }

    fn check_header(&mut self, hasher: &HashKind) -> Result<()> {
        let version: u32 = self
            .header_value("schema_version")?
            .parse()
            .map_err(|_| RelinkError::DbCorrupt {
                path: self.path.clone(),
                cause: "non-numeric schema version".to_string(),
            })?;
        if version != DB_SCHEMA_VERSION {
            return Err(RelinkError::DbSchemaMismatch {
                path: self.path.clone(),
                found: version,
                expected: DB_SCHEMA_VERSION,
            }
            .into());
        }
        let stored_hasher = self.header_value("hasher")?;
        if stored_hasher != hasher.id() {
            return Err(RelinkError::HashKindMismatch {
                path: self.path.clone(),
                found: stored_hasher,
                expected: hasher.id(),
            }
            .into());
        }
        let kind_str = self.header_value("kind")?;
        self.kind = DbKind::parse(&kind_str).ok_or_else(|| RelinkError::DbCorrupt {
            path: self.path.clone(),
            cause: format!("unknown database kind `{kind_str}`"),
        })?;
        Ok(())
    }

    /// Load all entries into a map: file_id -> (size, mtime, hash).
    pub fn load_entries(&self) -> Result<HashMap<u64, StoredMeta>> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_id, size, mtime, hash FROM entries")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let size: i64 = row.get(1)?;
            let mtime: i64 = row.get(2)?;
            let hash: i64 = row.get(3)?;
            Ok((id as u64, (size.max(0) as u64, mtime, hash as u64)))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (id, meta) = row?;
            map.insert(id, meta);
        }
        Ok(map)
    }

    /// Insert or replace one entry.
    pub fn upsert_entry(&self, file_id: u64, size: u64, mtime: i64, hash: u64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO entries (file_id, size, mtime, hash) VALUES (?1, ?2, ?3, ?4)",
                (file_id as i64, size as i64, mtime, hash as i64),
            )
            .context("insert entry")?;
        Ok(())
    }

    /// Insert or replace entries in batched transactions.
    pub fn upsert_batch(&mut self, rows: &[(u64, StoredMeta)]) -> Result<()> {
        for chunk in rows.chunks(DB_INSERT_BATCH_SIZE) {
            let tx = self.conn.transaction().context("begin transaction")?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO entries (file_id, size, mtime, hash) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (id, (size, mtime, hash)) in chunk {
                    stmt.execute((*id as i64, *size as i64, *mtime, *hash as i64))?;
                }
            }
            tx.commit().context("commit transaction")?;
        }
        Ok(())
    }

    /// Delete the entries for the given file ids (rehash support).
    pub fn delete_entries(&mut self, ids: &[u64]) -> Result<()> {
        let tx = self.conn.transaction().context("begin transaction")?;
        {
            let mut stmt = tx.prepare("DELETE FROM entries WHERE file_id = ?1")?;
            for id in ids {
                stmt.execute([*id as i64])?;
            }
        }
        tx.commit().context("commit transaction")?;
        Ok(())
    }

    /// Drop entries whose file-id is not in `live`. Returns how many were
    /// removed.
    pub fn prune(&mut self, live: &HashSet<u64>) -> Result<usize> {
        let stored: Vec<u64> = {
            let mut stmt = self.conn.prepare("SELECT file_id FROM entries")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            rows.filter_map(|r| r.ok())
                .map(|id| id as u64)
                .filter(|id| !live.contains(id))
                .collect()
        };
        self.delete_entries(&stored)?;
        Ok(stored.len())
    }

    /// Compact the database file.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.execute_batch("VACUUM").context("vacuum")?;
        Ok(())
    }

    pub fn entry_count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Replace the path table (offline databases only).
    pub fn write_paths(&mut self, rows: &[(u64, PathBuf)]) -> Result<()> {
        let tx = self.conn.transaction().context("begin transaction")?;
        tx.execute("DELETE FROM paths", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO paths (file_id, path) VALUES (?1, ?2)")?;
            for (id, path) in rows {
                stmt.execute((*id as i64, path_bytes(path)))?;
            }
        }
        tx.commit().context("commit transaction")?;
        Ok(())
    }

    /// Load the path table: (file_id, relative path), byte-exact.
    pub fn load_paths(&self) -> Result<Vec<(u64, PathBuf)>> {
        let mut stmt = self.conn.prepare("SELECT file_id, path FROM paths")?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((id as u64, bytes))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, bytes) = row?;
            out.push((id, bytes_to_path(&bytes)));
        }
        Ok(out)
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}

/// True when `basename` matches the reserved pattern `<prefix>[0-9]+.db`.
/// Such files are never tree entries.
pub fn is_db_basename(basename: &str, prefix: &str) -> bool {
    basename
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(".db"))
        .map(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Like [`is_db_basename`], but also covers the SQLite sidecar files that
/// exist while a database is open.
pub fn is_db_reserved(basename: &str, prefix: &str) -> bool {
    let core = basename
        .strip_suffix("-journal")
        .or_else(|| basename.strip_suffix("-wal"))
        .or_else(|| basename.strip_suffix("-shm"))
        .unwrap_or(basename);
    is_db_basename(core, prefix)
}

/// Find the unique `<prefix>NNN.db` in `dir`, or make up a fresh basename
/// with a random numeric suffix. More than one candidate is an error.
pub fn pick_db_basename(dir: &Path, prefix: &str) -> Result<String> {
    let mut candidates = Vec::new();
    let read = std::fs::read_dir(dir).map_err(|e| RelinkError::DirInaccessible {
        path: dir.to_path_buf(),
        cause: e.to_string(),
    })?;
    for entry in read.flatten() {
        let name = entry.file_name();
        if let Some(name) = name.to_str() {
            if is_db_basename(name, prefix) {
                candidates.push(name.to_string());
            }
        }
    }
    match candidates.len() {
        1 => Ok(candidates.pop().expect("len checked")),
        0 => {
            // Random suffix so that byte-copying mirrors do not silently
            // adopt each other's databases.
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos())
                .unwrap_or(0);
            Ok(format!("{prefix}{:03}.db", nanos % 1000))
        }
        _ => Err(RelinkError::DbOpenFailed {
            path: dir.to_path_buf(),
            cause: format!("multiple {prefix}*.db files, pass --dblocation"),
        }
        .into()),
    }
}

/// Resolve the database file for an online tree root, honouring the
/// explicit-location and shared-directory overrides.
pub fn db_path_for_root(root: &Path, opts: &crate::Opts) -> Result<PathBuf> {
    if let Some(ref loc) = opts.db_location {
        return Ok(loc.clone());
    }
    if let Some(ref db_dir) = opts.db_root_dir {
        // One shared directory for many trees: tag the basename with a
        // stable digest of the canonical root path.
        let canonical = root
            .canonicalize()
            .unwrap_or_else(|_| root.to_path_buf());
        let tag = xxhash_rust::xxh32::xxh32(path_bytes(&canonical).as_slice(), 0);
        return Ok(db_dir.join(format!("{}{:03}.db", opts.db_prefix, tag % 1000)));
    }
    let basename = pick_db_basename(root, &opts.db_prefix)?;
    Ok(root.join(basename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_basename_pattern() {
        assert!(is_db_basename("relink-123.db", "relink-"));
        assert!(is_db_basename("relink-7.db", "relink-"));
        assert!(!is_db_basename("relink-.db", "relink-"));
        assert!(!is_db_basename("relink-12x.db", "relink-"));
        assert!(!is_db_basename("other-123.db", "relink-"));
        assert!(!is_db_basename("relink-123.db.bak", "relink-"));
    }
}
