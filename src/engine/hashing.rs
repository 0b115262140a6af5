//! File hashing: built-in xxHash variants and external hasher programs.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::process::Command;

use memmap2::Mmap;
use xxhash_rust::xxh32::Xxh32;
use xxhash_rust::xxh64::Xxh64;

use crate::error::RelinkError;
use crate::utils::config::HashingConsts;

/// Selected hash function. The identifier string is persisted in the
/// database header; opening a database under a different kind fails with
/// `HashKindMismatch`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashKind {
    /// 32-bit xxHash, widened to u64. The default.
    Xxh32,
    /// 64-bit xxHash.
    Xxh64,
    /// External executable: one path argument, decimal unsigned integer on
    /// stdout, zero exit status.
    External(String),
}

impl Default for HashKind {
    fn default() -> Self {
        HashKind::Xxh32
    }
}

impl HashKind {
    /// Identifier persisted in the database header.
    pub fn id(&self) -> String {
        match self {
            HashKind::Xxh32 => "xxh32".to_string(),
            HashKind::Xxh64 => "xxh64".to_string(),
            HashKind::External(prog) => format!("ext:{prog}"),
        }
    }

    /// Parse a header identifier or CLI value back into a kind.
    pub fn parse(s: &str) -> Result<Self, RelinkError> {
        match s {
            "xxh32" => Ok(HashKind::Xxh32),
            "xxh64" => Ok(HashKind::Xxh64),
            _ => match s.strip_prefix("ext:") {
                Some(prog) if !prog.is_empty() => Ok(HashKind::External(prog.to_string())),
                _ => Err(RelinkError::Usage(format!("unknown hasher: {s}"))),
            },
        }
    }
}

impl std::fmt::Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id())
    }
}

/// Hash a file's full content. Uses memory-mapped I/O above a size
/// threshold, chunked reading otherwise; external hashers run as a child
/// process.
pub fn hash_file(kind: &HashKind, path: &Path, size: u64) -> Result<u64, RelinkError> {
    match kind {
        HashKind::External(prog) => hash_external(prog, path),
        builtin => {
            let file = File::open(path).map_err(|e| RelinkError::FileUnreadable {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;
            if size > HashingConsts::HASH_MMAP_THRESHOLD {
                let mmap = unsafe {
                    Mmap::map(&file).map_err(|e| RelinkError::FileUnreadable {
                        path: path.to_path_buf(),
                        cause: e.to_string(),
                    })?
                };
                Ok(hash_bytes_oneshot(builtin, &mmap))
            } else {
                hash_reader_chunked(builtin, path, file)
            }
        }
    }
}

fn hash_bytes_oneshot(kind: &HashKind, bytes: &[u8]) -> u64 {
    match kind {
        HashKind::Xxh32 => xxhash_rust::xxh32::xxh32(bytes, 0) as u64,
        HashKind::Xxh64 => xxhash_rust::xxh64::xxh64(bytes, 0),
        HashKind::External(_) => unreachable!("external hasher has no byte path"),
    }
}

fn hash_reader_chunked(kind: &HashKind, path: &Path, file: File) -> Result<u64, RelinkError> {
    let mut reader = std::io::BufReader::with_capacity(HashingConsts::HASH_READ_CHUNK_SIZE, file);
    let mut buffer = vec![0u8; HashingConsts::HASH_READ_CHUNK_SIZE];
    let mut h32 = Xxh32::new(0);
    let mut h64 = Xxh64::new(0);
    loop {
        let n = reader
            .read(&mut buffer)
            .map_err(|e| RelinkError::FileUnreadable {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })?;
        if n == 0 {
            break;
        }
        match kind {
            HashKind::Xxh32 => h32.update(&buffer[..n]),
            HashKind::Xxh64 => h64.update(&buffer[..n]),
            HashKind::External(_) => unreachable!(),
        }
    }
    Ok(match kind {
        HashKind::Xxh32 => h32.digest() as u64,
        HashKind::Xxh64 => h64.digest(),
        HashKind::External(_) => unreachable!(),
    })
}

fn hash_external(prog: &str, path: &Path) -> Result<u64, RelinkError> {
    let output = Command::new(prog)
        .arg(path)
        .output()
        .map_err(|e| RelinkError::HasherExecFailed {
            program: prog.to_string(),
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(RelinkError::HasherExecFailed {
            program: prog.to_string(),
            path: path.to_path_buf(),
            cause: format!("exit status {}", output.status),
        });
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.trim()
        .parse::<u64>()
        .map_err(|_| RelinkError::HasherBadOutput {
            program: prog.to_string(),
            path: path.to_path_buf(),
            output: text.trim().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn kind_id_round_trip() {
        for kind in [
            HashKind::Xxh32,
            HashKind::Xxh64,
            HashKind::External("myhash".to_string()),
        ] {
            assert_eq!(HashKind::parse(&kind.id()).unwrap(), kind);
        }
        assert!(HashKind::parse("md5").is_err());
        assert!(HashKind::parse("ext:").is_err());
    }

    #[test]
    fn builtin_hashes_match_oneshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        let data = b"relink test data";
        std::fs::File::create(&path)
            .unwrap()
            .write_all(data)
            .unwrap();

        let h = hash_file(&HashKind::Xxh32, &path, data.len() as u64).unwrap();
        assert_eq!(h, xxhash_rust::xxh32::xxh32(data, 0) as u64);

        let h = hash_file(&HashKind::Xxh64, &path, data.len() as u64).unwrap();
        assert_eq!(h, xxhash_rust::xxh64::xxh64(data, 0));
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = hash_file(&HashKind::Xxh32, Path::new("/no/such/file"), 0).unwrap_err();
        assert!(matches!(err, RelinkError::FileUnreadable { .. }));
    }
}
