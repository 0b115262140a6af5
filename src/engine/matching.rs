//! Match engine: pair target files to source files by content identity
//! under hard-link multiplicity.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;

use crate::tree::Tree;
use crate::types::{ContentKey, FileId, Opts};

/// Partial injective pairing of target files onto source files, plus the
/// residuals on either side.
#[derive(Debug, Default)]
pub struct Matching {
    /// (target file, source file); both sides unique.
    pub pairs: Vec<(FileId, FileId)>,
    pub unmatched_source: Vec<FileId>,
    pub unmatched_target: Vec<FileId>,
}

/// Pair files of `tgt` with files of `src` sharing a content key. Hashes
/// are computed only for sizes present on both sides, and only when a
/// size-level fast path cannot settle the group without hashing.
pub fn match_trees(
    src: &mut Tree,
    tgt: &mut Tree,
    opts: &Opts,
    cancel: &Arc<AtomicBool>,
) -> Result<Matching> {
    let src_by_size = by_size(src);
    let tgt_by_size = by_size(tgt);

    let mut matching = Matching::default();
    let mut matched_src: HashSet<FileId> = HashSet::new();
    let mut matched_tgt: HashSet<FileId> = HashSet::new();

    // Sizes on both sides are the only candidates for a match.
    let common_sizes: Vec<u64> = src_by_size
        .keys()
        .filter(|s| tgt_by_size.contains_key(*s))
        .copied()
        .collect();

    let mut to_hash_src: Vec<FileId> = Vec::new();
    let mut to_hash_tgt: Vec<FileId> = Vec::new();
    let mut fast_paired: Vec<(FileId, FileId)> = Vec::new();
    for size in &common_sizes {
        let s_ids = &src_by_size[size];
        let t_ids = &tgt_by_size[size];
        // Lone file on each side with identical path sets: already in
        // sync, no hashing required.
        if s_ids.len() == 1 && t_ids.len() == 1 && !opts.size_only {
            let s_node = src.node(s_ids[0]).expect("indexed id");
            let t_node = tgt.node(t_ids[0]).expect("indexed id");
            if s_node.paths == t_node.paths {
                fast_paired.push((t_ids[0], s_ids[0]));
                continue;
            }
        }
        to_hash_src.extend_from_slice(s_ids);
        to_hash_tgt.extend_from_slice(t_ids);
    }

    if !opts.size_only {
        src.fill_hashes(&to_hash_src, opts, cancel, None)?;
        tgt.fill_hashes(&to_hash_tgt, opts, cancel, None)?;
    }

    // Group both sides by full content key.
    let src_groups = by_key(src, &to_hash_src, opts)?;
    let mut tgt_groups = by_key(tgt, &to_hash_tgt, opts)?;

    for (tid, sid) in fast_paired {
        matched_tgt.insert(tid);
        matched_src.insert(sid);
        matching.pairs.push((tid, sid));
    }

    for (key, src_ids) in src_groups {
        let Some(tgt_ids) = tgt_groups.remove(&key) else {
            continue;
        };
        match_group(src, tgt, src_ids, tgt_ids, &mut matching, &mut matched_src, &mut matched_tgt);
    }

    let mut unmatched_src: Vec<FileId> = src
        .files()
        .keys()
        .filter(|id| !matched_src.contains(id))
        .copied()
        .collect();
    let mut unmatched_tgt: Vec<FileId> = tgt
        .files()
        .keys()
        .filter(|id| !matched_tgt.contains(id))
        .copied()
        .collect();
    unmatched_src.sort();
    unmatched_tgt.sort();
    matching.unmatched_source = unmatched_src;
    matching.unmatched_target = unmatched_tgt;
    Ok(matching)
}

fn by_size(tree: &Tree) -> BTreeMap<u64, Vec<FileId>> {
    let mut map: BTreeMap<u64, Vec<FileId>> = BTreeMap::new();
    for (id, node) in tree.files() {
        map.entry(node.size).or_default().push(*id);
    }
    for ids in map.values_mut() {
        ids.sort();
    }
    map
}

fn by_key(tree: &mut Tree, ids: &[FileId], opts: &Opts) -> Result<BTreeMap<ContentKey, Vec<FileId>>> {
    let mut map: BTreeMap<ContentKey, Vec<FileId>> = BTreeMap::new();
    for id in ids {
        let size = tree.node(*id).expect("indexed id").size;
        let hash = if opts.size_only {
            None
        } else {
            match tree.hash_of(*id) {
                Ok(h) => Some(h),
                Err(e) => {
                    // Unreadable during matching: leave the file unmatched.
                    log::warn!("{e:#}");
                    continue;
                }
            }
        };
        map.entry(ContentKey { size, hash }).or_default().push(*id);
    }
    Ok(map)
}

/// Pair one content-key group. Files sharing at least one path are paired
/// first (largest path overlap wins, ties broken by the smallest path);
/// whatever remains is zipped in lexicographic-minimum-path order.
fn match_group(
    src: &Tree,
    tgt: &Tree,
    src_ids: Vec<FileId>,
    tgt_ids: Vec<FileId>,
    matching: &mut Matching,
    matched_src: &mut HashSet<FileId>,
    matched_tgt: &mut HashSet<FileId>,
) {
    let mut remaining_src = sort_by_min_path(src, src_ids);
    let mut remaining_tgt = sort_by_min_path(tgt, tgt_ids);

    // Pass 1: prefer pairings that already share paths.
    let mut paired: Vec<(FileId, FileId)> = Vec::new();
    let mut i = 0;
    while i < remaining_tgt.len() {
        let tid = remaining_tgt[i];
        let t_paths: HashSet<_> = tgt.node(tid).expect("indexed id").paths.iter().collect();
        let mut best: Option<(usize, &std::path::PathBuf, usize)> = None;
        for (j, sid) in remaining_src.iter().enumerate() {
            let s_node = src.node(*sid).expect("indexed id");
            let overlap = s_node.paths.iter().filter(|p| t_paths.contains(p)).count();
            if overlap == 0 {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_overlap, best_min, _)) => {
                    overlap > best_overlap || (overlap == best_overlap && s_node.min_path() < best_min)
                }
            };
            if better {
                best = Some((overlap, s_node.min_path(), j));
            }
        }
        if let Some((_, _, j)) = best {
            paired.push((tid, remaining_src.remove(j)));
            remaining_tgt.remove(i);
        } else {
            i += 1;
        }
    }

    // Pass 2: arbitrary but deterministic.
    let zipped = remaining_tgt.len().min(remaining_src.len());
    for (tid, sid) in remaining_tgt.drain(..zipped).zip(remaining_src.drain(..zipped)) {
        paired.push((tid, sid));
    }

    for (tid, sid) in paired {
        matched_tgt.insert(tid);
        matched_src.insert(sid);
        matching.pairs.push((tid, sid));
    }
}

fn sort_by_min_path(tree: &Tree, mut ids: Vec<FileId>) -> Vec<FileId> {
    ids.sort_by(|a, b| {
        let pa = tree.node(*a).expect("indexed id").min_path();
        let pb = tree.node(*b).expect("indexed id").min_path();
        pa.cmp(pb)
    });
    ids
}
