//! Load `.relink.toml` from the invocation directory (CLI only). Lib callers
//! inject config via `Opts` directly.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::Opts;
use crate::engine::hashing::HashKind;

#[derive(Debug, Deserialize)]
pub(crate) struct RelinkToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    exclude: Option<Vec<String>>,
    max_size: Option<u64>,
    size_only: Option<bool>,
    db_prefix: Option<String>,
    db_root_dir: Option<String>,
    hasher: Option<String>,
    threads: Option<usize>,
    progress: Option<bool>,
    verbose: Option<bool>,
}

/// Load `.relink.toml` from `dir` if present. Returns None if the file is
/// missing or unreadable.
pub(crate) fn load_relink_toml(dir: &Path) -> Option<RelinkToml> {
    let path = dir.join(".relink.toml");
    let s = std::fs::read_to_string(&path).ok()?;
    toml::from_str(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $sec.$field {
            $opts.$field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before
/// applying CLI flags, which take precedence.
pub(crate) fn apply_file_to_opts(file: &RelinkToml, opts: &mut Opts) {
    let sec = &file.settings;
    if let Some(ref pats) = sec.exclude {
        opts.filter_rules
            .extend(pats.iter().map(crate::filter::FilterRule::exclude));
    }
    if let Some(v) = sec.max_size {
        opts.max_size = Some(v);
    }
    apply_file_opt!(sec, opts, size_only);
    if let Some(ref p) = sec.db_prefix {
        opts.db_prefix = p.clone();
    }
    if let Some(ref d) = sec.db_root_dir {
        opts.db_root_dir = Some(PathBuf::from(d));
    }
    if let Some(ref h) = sec.hasher {
        match HashKind::parse(h) {
            Ok(kind) => opts.hasher = kind,
            Err(e) => log::warn!(".relink.toml: {}", e),
        }
    }
    if let Some(n) = sec.threads {
        opts.threads = Some(n);
    }
    apply_file_opt!(sec, opts, progress);
    apply_file_opt!(sec, opts, verbose);
}
