//! End-to-end sync scenarios on real temporary trees: rename, hard links,
//! rename cycles, unmatched files, idempotence and data preservation.

#![cfg(unix)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use relink::Tree;
use relink::engine::arg_parser::Cli;
use relink::engine::handle_run;
use relink::engine::matching::match_trees;
use relink::engine::plan::{Plan, PlanStep, build_plan, execute_plan};
use relink::types::Opts;

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn link_file(root: &Path, existing: &str, new: &str) {
    let new_path = root.join(new);
    if let Some(parent) = new_path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::hard_link(root.join(existing), new_path).unwrap();
}

/// Match, plan and execute one sync. Trees are dropped before returning so
/// their database locks are released.
fn run_sync(src_root: &Path, tgt_root: &Path) -> Plan {
    let opts = Opts::default();
    let cancel = Arc::new(AtomicBool::new(false));
    let mut src = Tree::open(src_root, &opts, true).unwrap();
    let mut tgt = Tree::open(tgt_root, &opts, false).unwrap();
    let matching = match_trees(&mut src, &mut tgt, &opts, &cancel).unwrap();
    let plan = build_plan(&src, &tgt, &matching, false).unwrap();
    let root = tgt.label().to_path_buf();
    execute_plan(&root, &plan, false).unwrap();
    plan
}

/// Relative path -> content for every regular file under root, ignoring the
/// hash database.
fn tree_contents(root: &Path) -> BTreeMap<PathBuf, String> {
    let mut map = BTreeMap::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
        if rel.to_string_lossy().starts_with("relink-") {
            continue;
        }
        let content = std::fs::read_to_string(entry.path()).unwrap();
        map.insert(rel, content);
    }
    map
}

/// Full recursive listing of `root` (dirs and files, file contents
/// included), ignoring only the reserved database files.
fn listing(root: &Path) -> Vec<(PathBuf, Option<String>)> {
    let mut out = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
        if rel.as_os_str().is_empty() || rel.to_string_lossy().starts_with("relink-") {
            continue;
        }
        let content = if entry.file_type().is_file() {
            Some(std::fs::read_to_string(entry.path()).unwrap())
        } else {
            None
        };
        out.push((rel, content));
    }
    out.sort();
    out
}

fn inodes_under(root: &Path) -> BTreeSet<u64> {
    use std::os::unix::fs::MetadataExt;
    tree_contents(root)
        .keys()
        .map(|rel| std::fs::metadata(root.join(rel)).unwrap().ino())
        .collect()
}

#[test]
fn renamed_file_is_moved_not_copied() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "a/one.txt", "X");
    write_file(tgt.path(), "b/one.txt", "X");
    let before = inodes_under(tgt.path());

    let plan = run_sync(src.path(), tgt.path());

    assert_eq!(
        plan.steps,
        vec![
            PlanStep::MkDir(PathBuf::from("a")),
            PlanStep::Rename {
                from: PathBuf::from("b/one.txt"),
                to: PathBuf::from("a/one.txt"),
            },
            PlanStep::RmDir(PathBuf::from("b")),
        ]
    );
    assert_eq!(tree_contents(tgt.path()), tree_contents(src.path()));
    assert_eq!(inodes_under(tgt.path()), before, "no data copied or lost");
}

#[test]
fn missing_hard_link_is_created() {
    use std::os::unix::fs::MetadataExt;

    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "p", "X");
    link_file(src.path(), "p", "q");
    write_file(tgt.path(), "p", "X");

    let plan = run_sync(src.path(), tgt.path());

    assert_eq!(
        plan.steps,
        vec![PlanStep::Link {
            from: PathBuf::from("p"),
            to: PathBuf::from("q"),
        }]
    );
    let p_ino = std::fs::metadata(tgt.path().join("p")).unwrap().ino();
    let q_ino = std::fs::metadata(tgt.path().join("q")).unwrap().ino();
    assert_eq!(p_ino, q_ino, "q must alias p, not copy it");
}

#[test]
fn two_cycle_swap_goes_through_a_stash() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "a", "X");
    write_file(src.path(), "b", "Y");
    write_file(tgt.path(), "a", "Y");
    write_file(tgt.path(), "b", "X");

    let plan = run_sync(src.path(), tgt.path());

    assert_eq!(plan.steps.len(), 3, "swap takes three renames: {:?}", plan.steps);
    assert_eq!(tree_contents(tgt.path()), tree_contents(src.path()));
}

#[test]
fn unmatched_target_is_reported_and_kept() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "keep", "X");
    write_file(tgt.path(), "keep", "X");
    write_file(tgt.path(), "extra", "Z");

    let opts = Opts::default();
    let cancel = Arc::new(AtomicBool::new(false));
    let mut src_tree = Tree::open(src.path(), &opts, true).unwrap();
    let mut tgt_tree = Tree::open(tgt.path(), &opts, false).unwrap();
    let matching = match_trees(&mut src_tree, &mut tgt_tree, &opts, &cancel).unwrap();

    assert_eq!(matching.pairs.len(), 1);
    assert_eq!(matching.unmatched_target.len(), 1);
    let unmatched = tgt_tree.node(matching.unmatched_target[0]).unwrap();
    assert_eq!(unmatched.min_path(), &PathBuf::from("extra"));

    let plan = build_plan(&src_tree, &tgt_tree, &matching, false).unwrap();
    assert!(plan.is_empty());
    drop(tgt_tree);
    assert!(tgt.path().join("extra").exists());
}

#[test]
fn dry_run_leaves_target_untouched() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "a/one.txt", "X");
    write_file(tgt.path(), "b/one.txt", "X");

    let before = listing(tgt.path());
    let cli = Cli::parse_from([
        "relink",
        "sync",
        src.path().to_str().unwrap(),
        tgt.path().to_str().unwrap(),
        "--dry-run",
    ]);
    assert_eq!(handle_run(&cli).unwrap(), 0);
    assert_eq!(
        listing(tgt.path()),
        before,
        "dry run must not touch the target"
    );

    // The printed plan was real work: a live run still applies it.
    let plan = run_sync(src.path(), tgt.path());
    assert!(!plan.is_empty());
    assert_eq!(tree_contents(tgt.path()), tree_contents(src.path()));
}

#[test]
fn sync_is_idempotent() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "a/x", "one");
    write_file(src.path(), "b/y", "two");
    link_file(src.path(), "a/x", "c/z");
    write_file(tgt.path(), "old/x", "one");
    write_file(tgt.path(), "y", "two");

    let first = run_sync(src.path(), tgt.path());
    assert!(!first.is_empty());
    let second = run_sync(src.path(), tgt.path());
    assert!(second.is_empty(), "second run must be a fixed point: {:?}", second.steps);
    assert_eq!(tree_contents(tgt.path()), tree_contents(src.path()));
}

#[test]
fn identical_trees_produce_no_operations() {
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    for root in [src.path(), tgt.path()] {
        write_file(root, "a/x", "one");
        write_file(root, "deep/nest/y", "two");
    }
    let plan = run_sync(src.path(), tgt.path());
    assert!(plan.is_empty());
}

#[test]
fn duplicate_content_prefers_path_overlap() {
    // Source has two files of identical content; the target file sharing a
    // path must pair with its namesake so only one rename is emitted.
    let src = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    write_file(src.path(), "x", "A");
    write_file(src.path(), "y", "A");
    write_file(tgt.path(), "x", "A");
    write_file(tgt.path(), "z", "A");

    let plan = run_sync(src.path(), tgt.path());
    assert_eq!(
        plan.steps,
        vec![PlanStep::Rename {
            from: PathBuf::from("z"),
            to: PathBuf::from("y"),
        }]
    );
}

#[test]
fn hash_database_survives_bitrot_unnoticed_by_update() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "f", "AAA");

    let (stored_hash, mtime) = {
        let opts = Opts::default();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut tree = Tree::open(dir.path(), &opts, true).unwrap();
        let online = tree.require_online().unwrap();
        let stale = online.stale_ids();
        online.fill_hashes(&stale, &opts, &cancel, None).unwrap();
        let id = *online.files().keys().next().unwrap();
        let (_, mtime, hash) = online.stored_entry(id).unwrap();
        (hash, mtime)
    };

    // Flip content without touching size or mtime.
    let f = dir.path().join("f");
    let restore = std::fs::metadata(&f).unwrap().modified().unwrap();
    std::fs::write(&f, "BBB").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&f)
        .unwrap()
        .set_modified(restore)
        .unwrap();

    let opts = Opts::default();
    let mut tree = Tree::open(dir.path(), &opts, true).unwrap();
    let online = tree.require_online().unwrap();
    // update would not rehash: the entry still looks fresh.
    assert!(online.stale_ids().is_empty());
    let (_, stored_mtime, still_stored) = online
        .stored_entry(*online.files().keys().next().unwrap())
        .unwrap();
    assert_eq!(still_stored, stored_hash);
    assert_eq!(stored_mtime, mtime);

    // check-style recomputation exposes the mismatch.
    let node = online.files().values().next().unwrap().clone();
    let recomputed = relink::engine::hash_file(
        &opts.hasher,
        &online.abs_path(node.min_path()),
        node.size,
    )
    .unwrap();
    assert_ne!(recomputed, stored_hash);
}

#[test]
fn second_update_rehashes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a/x", "one");
    write_file(dir.path(), "b/y", "two");

    {
        let opts = Opts::default();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut tree = Tree::open(dir.path(), &opts, true).unwrap();
        let online = tree.require_online().unwrap();
        let stale = online.stale_ids();
        assert_eq!(stale.len(), 2);
        online.fill_hashes(&stale, &opts, &cancel, None).unwrap();
    }
    let opts = Opts::default();
    let mut tree = Tree::open(dir.path(), &opts, true).unwrap();
    let online = tree.require_online().unwrap();
    assert!(online.stale_ids().is_empty());
}
