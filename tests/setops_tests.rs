//! Set engine and offline snapshot tests: duplicate groups, cross-tree
//! queries, compare, search, and online/offline answer parity.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use relink::Tree;
use relink::engine::arg_parser::Cli;
use relink::engine::handle_run;
use relink::engine::plan::build_plan;
use relink::engine::matching::match_trees;
use relink::engine::setops::{CmpDiff, SetQuery, cmp_trees, member_paths, run_set_query, search_tree};
use relink::types::{GroupOutput, Opts};

fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn open_trees(roots: &[&Path], opts: &Opts) -> Vec<Tree> {
    roots
        .iter()
        .enumerate()
        .map(|(i, r)| Tree::open(r, opts, i == 0).unwrap())
        .collect()
}

/// Sorted path lists per group, for order-insensitive comparison.
fn group_paths(trees: &[Tree], groups: &[relink::engine::setops::Group], mode: GroupOutput) -> Vec<Vec<PathBuf>> {
    let mut out: Vec<Vec<PathBuf>> = groups
        .iter()
        .map(|g| {
            let mut paths: Vec<PathBuf> = g
                .members
                .iter()
                .flat_map(|m| member_paths(trees, m, mode))
                .map(Path::to_path_buf)
                .collect();
            paths.sort();
            paths
        })
        .collect();
    out.sort();
    out
}

#[test]
fn fdupes_groups_follow_hard_link_mode() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "a", "X");
    write_file(dir.path(), "b", "X");
    write_file(dir.path(), "c", "Y");
    std::fs::hard_link(dir.path().join("c"), dir.path().join("d")).unwrap();

    // Default: c/d is one file with no duplicate, so only {a, b} groups.
    let opts = Opts::default();
    let mut trees = open_trees(&[dir.path()], &opts);
    let groups = run_set_query(&mut trees, SetQuery::Dupes, &opts).unwrap();
    assert_eq!(
        group_paths(&trees, &groups, opts.group_output),
        vec![vec![PathBuf::from("a"), PathBuf::from("b")]]
    );
    drop(trees);

    // Hard-link mode counts and lists every path.
    let opts = Opts {
        group_output: GroupOutput::HardLinks,
        ..Opts::default()
    };
    let mut trees = open_trees(&[dir.path()], &opts);
    let groups = run_set_query(&mut trees, SetQuery::Dupes, &opts).unwrap();
    assert_eq!(
        group_paths(&trees, &groups, opts.group_output),
        vec![
            vec![PathBuf::from("a"), PathBuf::from("b")],
            vec![PathBuf::from("c"), PathBuf::from("d")],
        ]
    );
}

#[test]
fn empty_files_stay_out_of_groups_by_default() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "e1", "");
    write_file(dir.path(), "e2", "");

    let opts = Opts::default();
    let mut trees = open_trees(&[dir.path()], &opts);
    let groups = run_set_query(&mut trees, SetQuery::Dupes, &opts).unwrap();
    assert!(groups.is_empty());
    drop(trees);

    let opts = Opts {
        min_size: 0,
        ..Opts::default()
    };
    let mut trees = open_trees(&[dir.path()], &opts);
    let groups = run_set_query(&mut trees, SetQuery::Dupes, &opts).unwrap();
    assert_eq!(groups.len(), 1);
}

#[test]
fn onall_and_onfirstonly_split_content() {
    let one = tempfile::tempdir().unwrap();
    let two = tempfile::tempdir().unwrap();
    write_file(one.path(), "shared.txt", "common");
    write_file(two.path(), "moved/shared.txt", "common");
    write_file(one.path(), "only-here", "lonely");
    write_file(two.path(), "only-there", "other");

    let opts = Opts::default();
    let mut trees = open_trees(&[one.path(), two.path()], &opts);

    let groups = run_set_query(&mut trees, SetQuery::OnAll, &opts).unwrap();
    assert_eq!(groups.len(), 1);
    let paths = group_paths(&trees, &groups, opts.group_output);
    assert_eq!(
        paths,
        vec![vec![PathBuf::from("moved/shared.txt"), PathBuf::from("shared.txt")]]
    );

    let groups = run_set_query(&mut trees, SetQuery::OnFirstOnly, &opts).unwrap();
    assert_eq!(
        group_paths(&trees, &groups, opts.group_output),
        vec![vec![PathBuf::from("only-here")]]
    );

    let groups = run_set_query(&mut trees, SetQuery::OnLastOnly, &opts).unwrap();
    assert_eq!(
        group_paths(&trees, &groups, opts.group_output),
        vec![vec![PathBuf::from("only-there")]]
    );
}

#[test]
fn cmp_reports_missing_changed_and_type_mismatches() {
    let left = tempfile::tempdir().unwrap();
    let right = tempfile::tempdir().unwrap();
    write_file(left.path(), "same.txt", "alpha");
    write_file(right.path(), "same.txt", "alpha");
    write_file(left.path(), "changed.txt", "left version");
    write_file(right.path(), "changed.txt", "right version");
    write_file(left.path(), "gone.txt", "only left");
    write_file(right.path(), "new.txt", "only right");
    write_file(left.path(), "kind/inner", "payload");
    write_file(right.path(), "kind", "i am a file");

    let opts = Opts::default();
    let mut trees = open_trees(&[left.path(), right.path()], &opts);
    let (l, r) = trees.split_at_mut(1);
    let diffs = cmp_trees(&mut l[0], &mut r[0], &opts).unwrap();

    assert!(diffs.contains(&CmpDiff::Differ(PathBuf::from("changed.txt"))));
    assert!(diffs.contains(&CmpDiff::OnlyLeft(PathBuf::from("gone.txt"))));
    assert!(diffs.contains(&CmpDiff::OnlyRight(PathBuf::from("new.txt"))));
    assert!(diffs.contains(&CmpDiff::TypeMismatch(PathBuf::from("kind"))));
    assert!(!diffs.iter().any(|d| matches!(d, CmpDiff::Differ(p) if p == &PathBuf::from("same.txt"))));
}

#[test]
fn search_matches_globs_at_any_depth() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "notes.txt", "");
    write_file(dir.path(), "deep/more/notes.txt", "x");
    write_file(dir.path(), "deep/readme.md", "y");

    let opts = Opts {
        min_size: 0,
        ..Opts::default()
    };
    let trees = open_trees(&[dir.path()], &opts);
    let hits = search_tree(&trees[0], &["*.txt".to_string()]).unwrap();
    let mut paths: Vec<&PathBuf> = hits
        .iter()
        .map(|id| trees[0].node(*id).unwrap().min_path())
        .collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![&PathBuf::from("deep/more/notes.txt"), &PathBuf::from("notes.txt")]
    );

    let hits = search_tree(&trees[0], &["/readme.md".to_string()]).unwrap();
    assert!(hits.is_empty(), "anchored pattern must not match at depth");
}

#[test]
fn offline_snapshot_answers_like_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let snapshot = out_dir.path().join("tree-snapshot.db");
    write_file(dir.path(), "a", "X");
    write_file(dir.path(), "b", "X");
    write_file(dir.path(), "solo/deep.txt", "unique");

    let cli = Cli::parse_from([
        "relink",
        "mkoffline",
        dir.path().to_str().unwrap(),
        snapshot.to_str().unwrap(),
    ]);
    assert_eq!(handle_run(&cli).unwrap(), 0);

    let opts = Opts::default();
    let mut online = open_trees(&[dir.path()], &opts);
    let online_groups = run_set_query(&mut online, SetQuery::Dupes, &opts).unwrap();
    let online_paths = group_paths(&online, &online_groups, opts.group_output);
    drop(online);

    let mut offline = vec![Tree::open(&snapshot, &opts, true).unwrap()];
    let offline_groups = run_set_query(&mut offline, SetQuery::Dupes, &opts).unwrap();
    let offline_paths = group_paths(&offline, &offline_groups, opts.group_output);

    assert_eq!(online_paths, offline_paths);
}

fn has_own_db(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().flatten().any(|e| {
        e.file_name()
            .to_str()
            .map(|n| n.starts_with("relink-") && n.ends_with(".db"))
            .unwrap_or(false)
    })
}

#[test]
fn subdir_splits_an_independent_database() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "sub/a.txt", "alpha");
    write_file(dir.path(), "top.txt", "beta");

    // Hash the whole tree into the root database first.
    let cli = Cli::parse_from(["relink", "update", dir.path().to_str().unwrap()]);
    assert_eq!(handle_run(&cli).unwrap(), 0);

    let cli = Cli::parse_from(["relink", "subdir", dir.path().to_str().unwrap(), "sub"]);
    assert_eq!(handle_run(&cli).unwrap(), 0);

    // The subdirectory now stands alone: its own database, already fresh
    // for its files (nothing rehashed), covering nothing outside it.
    let sub = dir.path().join("sub");
    assert!(has_own_db(&sub), "no database was created at the subdirectory");
    let opts = Opts::default();
    let mut tree = Tree::open(&sub, &opts, true).unwrap();
    let online = tree.require_online().unwrap();
    assert!(online.stale_ids().is_empty(), "seeded hashes must be fresh");
    assert_eq!(online.db_entry_count().unwrap(), 1);
}

#[test]
fn subdir_is_confined_even_with_wider_filter_rules() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "sub/a.txt", "alpha");
    write_file(dir.path(), "top.txt", "beta");

    let cli = Cli::parse_from(["relink", "update", dir.path().to_str().unwrap()]);
    assert_eq!(handle_run(&cli).unwrap(), 0);

    // An include pattern matching a path outside the subdirectory must
    // not leak that path into the split database.
    let cli = Cli::parse_from([
        "relink",
        "subdir",
        dir.path().to_str().unwrap(),
        "sub",
        "--include",
        "top.txt",
    ]);
    assert_eq!(handle_run(&cli).unwrap(), 0);

    let sub = dir.path().join("sub");
    let opts = Opts::default();
    let mut tree = Tree::open(&sub, &opts, true).unwrap();
    let online = tree.require_online().unwrap();
    assert_eq!(online.db_entry_count().unwrap(), 1);
    let paths: Vec<_> = online
        .files()
        .values()
        .map(|n| n.min_path().clone())
        .collect();
    assert_eq!(paths, vec![PathBuf::from("a.txt")]);
}

#[test]
fn offline_snapshot_works_as_sync_source() {
    let src = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let tgt = tempfile::tempdir().unwrap();
    let snapshot = out_dir.path().join("src-snapshot.db");
    write_file(src.path(), "renamed/file.txt", "payload");
    write_file(tgt.path(), "original.txt", "payload");

    let cli = Cli::parse_from([
        "relink",
        "mkoffline",
        src.path().to_str().unwrap(),
        snapshot.to_str().unwrap(),
    ]);
    assert_eq!(handle_run(&cli).unwrap(), 0);

    let opts = Opts::default();
    let cancel = Arc::new(AtomicBool::new(false));
    let mut src_tree = Tree::open(&snapshot, &opts, true).unwrap();
    let mut tgt_tree = Tree::open(tgt.path(), &opts, false).unwrap();
    let matching = match_trees(&mut src_tree, &mut tgt_tree, &opts, &cancel).unwrap();
    assert_eq!(matching.pairs.len(), 1);
    let plan = build_plan(&src_tree, &tgt_tree, &matching, false).unwrap();
    let root = tgt_tree.label().to_path_buf();
    relink::engine::plan::execute_plan(&root, &plan, false).unwrap();

    assert!(tgt.path().join("renamed/file.txt").exists());
    assert!(!tgt.path().join("original.txt").exists());
}
