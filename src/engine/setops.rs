//! Set engine: streaming N-way joins over trees keyed by content, plus the
//! path-wise compare and glob search queries.
//!
//! Work is keyed by size first: only sizes that can possibly produce a
//! group are hashed at all, and each tree serves hashes on demand from its
//! database.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::tree::Tree;
use crate::types::{ContentKey, FileId, GroupOutput, Opts};

/// Which group query to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetQuery {
    /// Groups of identical content with at least two members.
    Dupes,
    /// Groups present in every tree.
    OnAll,
    /// Files of the first tree with no counterpart elsewhere.
    OnFirstOnly,
    /// Files of the last tree with no counterpart elsewhere.
    OnLastOnly,
}

/// One member of a result group.
#[derive(Clone, Copy, Debug)]
pub struct FileRef {
    pub tree: usize,
    pub id: FileId,
}

/// One result group; members keep their tree of origin so the caller can
/// resolve paths.
#[derive(Clone, Debug)]
pub struct Group {
    pub size: u64,
    pub members: Vec<FileRef>,
}

/// Run a group query across `trees`. Files smaller than `opts.min_size`
/// never enter a group; unreadable files are logged and skipped.
pub fn run_set_query(trees: &mut [Tree], query: SetQuery, opts: &Opts) -> Result<Vec<Group>> {
    let per_tree_sizes: Vec<BTreeMap<u64, Vec<FileId>>> = trees
        .iter()
        .map(|t| {
            let mut m: BTreeMap<u64, Vec<FileId>> = BTreeMap::new();
            for (id, node) in t.files() {
                if node.size >= opts.min_size {
                    m.entry(node.size).or_default().push(*id);
                }
            }
            for ids in m.values_mut() {
                ids.sort();
            }
            m
        })
        .collect();

    let all_sizes: HashSet<u64> = per_tree_sizes
        .iter()
        .flat_map(|m| m.keys().copied())
        .collect();
    let mut sizes: Vec<u64> = all_sizes.into_iter().collect();
    sizes.sort_unstable();

    let last = trees.len().saturating_sub(1);
    let mut groups: Vec<Group> = Vec::new();
    for size in sizes {
        let ids_of = |i: usize| per_tree_sizes[i].get(&size).map(Vec::as_slice).unwrap_or(&[]);
        let trees_with_size = (0..trees.len()).filter(|i| !ids_of(*i).is_empty()).count();

        // Size-level pruning: settle what we can without hashing.
        match query {
            SetQuery::Dupes => {
                let members: usize = (0..trees.len())
                    .map(|i| {
                        ids_of(i)
                            .iter()
                            .map(|id| member_weight(&trees[i], *id, opts.group_output))
                            .sum::<usize>()
                    })
                    .sum();
                if members < 2 {
                    continue;
                }
            }
            SetQuery::OnAll => {
                if trees_with_size < trees.len() {
                    continue;
                }
            }
            SetQuery::OnFirstOnly => {
                if ids_of(0).is_empty() {
                    continue;
                }
                if trees_with_size == 1 {
                    // Nothing of this size elsewhere: every first-tree file
                    // qualifies with no hashing at all.
                    for id in ids_of(0) {
                        groups.push(Group {
                            size,
                            members: vec![FileRef { tree: 0, id: *id }],
                        });
                    }
                    continue;
                }
            }
            SetQuery::OnLastOnly => {
                if ids_of(last).is_empty() {
                    continue;
                }
                if trees_with_size == 1 {
                    for id in ids_of(last) {
                        groups.push(Group {
                            size,
                            members: vec![FileRef { tree: last, id: *id }],
                        });
                    }
                    continue;
                }
            }
        }

        // Hash this size class and bucket by full content key.
        let mut buckets: BTreeMap<ContentKey, Vec<FileRef>> = BTreeMap::new();
        for (i, tree) in trees.iter_mut().enumerate() {
            for id in per_tree_sizes[i].get(&size).map(Vec::as_slice).unwrap_or(&[]) {
                let hash = if opts.size_only {
                    None
                } else {
                    match tree.hash_of(*id) {
                        Ok(h) => Some(h),
                        Err(e) => {
                            log::warn!("{e:#}");
                            continue;
                        }
                    }
                };
                buckets
                    .entry(ContentKey { size, hash })
                    .or_default()
                    .push(FileRef { tree: i, id: *id });
            }
        }

        for (key, members) in buckets {
            let emitted = select_group_members(trees, &members, query, last, opts);
            if let Some(members) = emitted {
                groups.push(Group {
                    size: key.size,
                    members,
                });
            }
        }
    }

    sort_groups(trees, &mut groups, opts);
    Ok(groups)
}

/// Decide whether one content bucket yields a group, and which members.
fn select_group_members(
    trees: &[Tree],
    members: &[FileRef],
    query: SetQuery,
    last: usize,
    opts: &Opts,
) -> Option<Vec<FileRef>> {
    let count_in = |i: usize| members.iter().filter(|m| m.tree == i).count();
    match query {
        SetQuery::Dupes => {
            let weight: usize = members
                .iter()
                .map(|m| member_weight(&trees[m.tree], m.id, opts.group_output))
                .sum();
            (weight >= 2).then(|| members.to_vec())
        }
        SetQuery::OnAll => (0..trees.len())
            .all(|i| count_in(i) > 0)
            .then(|| members.to_vec()),
        SetQuery::OnFirstOnly => {
            let only_first = count_in(0) > 0 && members.iter().all(|m| m.tree == 0);
            only_first.then(|| members.to_vec())
        }
        SetQuery::OnLastOnly => {
            let only_last = count_in(last) > 0 && members.iter().all(|m| m.tree == last);
            only_last.then(|| members.to_vec())
        }
    }
}

/// How much one file counts toward a duplicate group: every hard link in
/// hard-link mode, one otherwise.
fn member_weight(tree: &Tree, id: FileId, mode: GroupOutput) -> usize {
    match mode {
        GroupOutput::HardLinks => tree.node(id).map(|n| n.paths.len()).unwrap_or(0),
        _ => 1,
    }
}

fn sort_groups(trees: &[Tree], groups: &mut [Group], opts: &Opts) {
    if opts.sort_by_size {
        groups.sort_by_key(|g| std::cmp::Reverse(g.size));
    } else {
        groups.sort_by(|a, b| {
            let pa = first_path(trees, a);
            let pb = first_path(trees, b);
            pa.cmp(&pb)
        });
    }
}

fn first_path<'a>(trees: &'a [Tree], group: &Group) -> Option<&'a PathBuf> {
    group
        .members
        .first()
        .and_then(|m| trees[m.tree].node(m.id))
        .map(|n| n.min_path())
}

// ---- cmp ----

/// One difference found by `cmp`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CmpDiff {
    OnlyLeft(PathBuf),
    OnlyRight(PathBuf),
    Differ(PathBuf),
    TypeMismatch(PathBuf),
}

impl std::fmt::Display for CmpDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CmpDiff::OnlyLeft(p) => write!(f, "only in left: {}", p.display()),
            CmpDiff::OnlyRight(p) => write!(f, "only in right: {}", p.display()),
            CmpDiff::Differ(p) => write!(f, "differ: {}", p.display()),
            CmpDiff::TypeMismatch(p) => write!(f, "file vs dir: {}", p.display()),
        }
    }
}

/// Compare two trees path by path: missing, different content, or type
/// mismatch. Identical paths stay silent.
pub fn cmp_trees(left: &mut Tree, right: &mut Tree, opts: &Opts) -> Result<Vec<CmpDiff>> {
    let left_files = left.path_index();
    let right_files = right.path_index();
    let left_dirs = left.dirs().clone();
    let right_dirs = right.dirs().clone();

    let mut all_paths: Vec<PathBuf> = left_files
        .keys()
        .chain(right_files.keys())
        .chain(left_dirs.iter())
        .chain(right_dirs.iter())
        .cloned()
        .collect();
    all_paths.sort();
    all_paths.dedup();

    let mut diffs = Vec::new();
    for path in all_paths {
        let lf = left_files.get(&path).copied();
        let rf = right_files.get(&path).copied();
        let ld = left_dirs.contains(&path);
        let rd = right_dirs.contains(&path);
        let diff = match (lf, rf, ld, rd) {
            (Some(_), None, _, true) | (None, Some(_), true, _) => {
                Some(CmpDiff::TypeMismatch(path))
            }
            (Some(a), Some(b), _, _) => {
                let an = left.node(a).expect("indexed id");
                let bn = right.node(b).expect("indexed id");
                if an.size != bn.size {
                    Some(CmpDiff::Differ(path))
                } else if opts.size_only {
                    None
                } else {
                    let ha = left.hash_of(a)?;
                    let hb = right.hash_of(b)?;
                    (ha != hb).then(|| CmpDiff::Differ(path))
                }
            }
            (Some(_), None, _, false) => Some(CmpDiff::OnlyLeft(path)),
            (None, Some(_), false, _) => Some(CmpDiff::OnlyRight(path)),
            (None, None, true, false) => Some(CmpDiff::OnlyLeft(path)),
            (None, None, false, true) => Some(CmpDiff::OnlyRight(path)),
            (None, None, _, _) => None,
        };
        if let Some(d) = diff {
            diffs.push(d);
        }
    }
    Ok(diffs)
}

// ---- search ----

/// Files of `tree` whose relative path matches any of `patterns`.
/// Unanchored patterns match at any depth, like the filter stack.
pub fn search_tree(tree: &Tree, patterns: &[String]) -> Result<Vec<FileId>> {
    let globs = compile_search_globs(patterns)?;
    let mut out: Vec<FileId> = tree
        .files()
        .iter()
        .filter(|(_, node)| node.paths.iter().any(|p| globs.is_match(p)))
        .map(|(id, _)| *id)
        .collect();
    out.sort();
    Ok(out)
}

fn compile_search_globs(patterns: &[String]) -> Result<GlobSet> {
    use anyhow::Context;
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let anchored = pat.starts_with('/');
        let core = pat.trim_start_matches('/');
        let mut variants = vec![core.to_string()];
        if !anchored {
            variants.push(format!("**/{core}"));
        }
        for v in &variants {
            let glob = GlobBuilder::new(v)
                .literal_separator(true)
                .build()
                .with_context(|| format!("bad search pattern: {pat}"))?;
            builder.add(glob);
        }
    }
    builder.build().map_err(Into::into)
}

/// Resolve a group member to the paths that should be printed for it.
pub fn member_paths<'a>(trees: &'a [Tree], m: &FileRef, mode: GroupOutput) -> Vec<&'a Path> {
    let Some(node) = trees[m.tree].node(m.id) else {
        return Vec::new();
    };
    match mode {
        GroupOutput::File => vec![node.min_path().as_path()],
        GroupOutput::HardLinks | GroupOutput::AllLinks => {
            node.paths.iter().map(PathBuf::as_path).collect()
        }
    }
}
