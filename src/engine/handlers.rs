//! Verb handlers: build trees, drive the engines, print results.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::engine::arg_parser::{Cli, Commands};
use crate::engine::hashing::{HashKind, hash_file};
use crate::engine::matching::match_trees;
use crate::engine::plan::{build_plan, execute_plan};
use crate::engine::progress::{clear_bar, create_progress_bar, progress_callback};
use crate::engine::setops::{
    CmpDiff, SetQuery, cmp_trees, member_paths, run_set_query, search_tree,
};
use crate::engine::tools::{
    check_for_cancel, is_subdir, probe_case_insensitive, report_skipped, setup_ctrlc_handler,
};
use crate::error::RelinkError;
use crate::filter::FilterRule;
use crate::tree::{Tree, offline::DIR_SENTINEL};
use crate::types::{GroupOutput, Opts};
use crate::utils::relink_toml::{apply_file_to_opts, load_relink_toml};
use crate::utils::setup_logging;

/// Merge `.relink.toml`, then CLI flags, into the immutable per-command
/// options.
fn setup_opts(cli: &Cli) -> Result<Opts> {
    let mut opts = Opts::default();
    if let Some(file) = load_relink_toml(Path::new(".")) {
        apply_file_to_opts(&file, &mut opts);
    }
    let common = &cli.common;

    // Includes are tried before excludes, so they carve exceptions out of
    // broader exclude patterns (first match wins).
    let mut rules: Vec<FilterRule> = Vec::new();
    rules.extend(common.include.iter().map(FilterRule::include));
    rules.extend(common.exclude.iter().map(FilterRule::exclude));
    rules.extend(opts.filter_rules.drain(..));
    opts.filter_rules = rules;
    opts.filter_rules_first = common
        .exclude_once
        .iter()
        .map(FilterRule::exclude)
        .collect();

    if let Some(cap) = common.max_size {
        opts.max_size = Some(cap);
    }
    if common.size_only {
        opts.size_only = true;
    }
    opts.min_size = if common.include_empty { 0 } else { opts.min_size };
    opts.dry_run = common.dry_run;
    if let Some(ref p) = common.db_prefix {
        opts.db_prefix = p.clone();
    }
    if let Some(ref d) = common.db_root_dir {
        opts.db_root_dir = Some(d.clone());
    }
    if let Some(ref f) = common.db_location {
        opts.db_location = Some(f.clone());
    }
    if let Some(ref prog) = common.ext_hasher {
        opts.hasher = HashKind::External(prog.clone());
    } else if let Some(ref kind) = common.hasher {
        opts.hasher = HashKind::parse(kind)?;
    }
    if let Some(n) = common.threads {
        opts.threads = Some(n);
    }
    if common.progress {
        opts.progress = true;
    }
    if common.verbose {
        opts.verbose = true;
    }
    opts.group_output = if common.all_links {
        GroupOutput::AllLinks
    } else if common.hard_links {
        GroupOutput::HardLinks
    } else {
        GroupOutput::File
    };
    opts.same_line = common.same_line;
    opts.sort_by_size = common.sort_by_size;
    Ok(opts)
}

/// Dispatch one parsed invocation. Returns the process exit code for
/// successful runs; failures map through [`crate::error::exit_code_for`].
pub fn handle_run(cli: &Cli) -> Result<i32> {
    let opts = setup_opts(cli)?;
    setup_logging(opts.verbose);
    let cancel = setup_ctrlc_handler()?;

    match &cli.command {
        Commands::Update { dir } => handle_update(dir, &opts, &cancel),
        Commands::Rehash { dir } => handle_rehash(dir, &opts, &cancel),
        Commands::Subdir { dir, rel } => handle_subdir(dir, rel, &opts),
        Commands::Mkoffline { dir, out, force } => {
            handle_mkoffline(dir, out, *force, &opts, &cancel)
        }
        Commands::Cleandb { dir } => handle_cleandb(dir, &opts),
        Commands::Lookup { location, paths } => handle_lookup(location, paths, &opts),
        Commands::Sync { source, target } => handle_sync(source, target, &opts, &cancel),
        Commands::Rsync {
            source,
            target,
            execute,
            extra,
        } => handle_rsync(source, target, *execute, extra, &opts),
        Commands::Syncr { source, target } => {
            let code = handle_sync(source, target, &opts, &cancel)?;
            if code != 0 {
                return Ok(code);
            }
            handle_rsync(source, target, true, &[], &opts)
        }
        Commands::Cmp { left, right } => handle_cmp(left, right, &opts),
        Commands::Fdupes { locations } => handle_set_query(locations, SetQuery::Dupes, &opts),
        Commands::Onall { locations } => handle_set_query(locations, SetQuery::OnAll, &opts),
        Commands::Onfirstonly { locations } => {
            handle_set_query(locations, SetQuery::OnFirstOnly, &opts)
        }
        Commands::Onlastonly { locations } => {
            handle_set_query(locations, SetQuery::OnLastOnly, &opts)
        }
        Commands::Search { pattern, locations } => handle_search(pattern, locations, &opts),
        Commands::Check { dir, paths } => handle_check(dir, paths, &opts, &cancel),
    }
}

/// Open the location at `index` in a multi-location command. The explicit
/// `--dblocation` override applies to the first location only.
fn open_location(location: &Path, index: usize, opts: &Opts) -> Result<Tree> {
    if index == 0 {
        Tree::open(location, opts, true)
    } else {
        let rest_opts = Opts {
            db_location: None,
            ..opts.clone()
        };
        Tree::open(location, &rest_opts, false)
    }
}

fn fill_all_stale(
    tree: &mut Tree,
    opts: &Opts,
    cancel: &Arc<AtomicBool>,
    desc: &'static str,
) -> Result<()> {
    let online = tree.require_online()?;
    let stale = online.stale_ids();
    debug!("{} files to hash", stale.len());
    let bar = (opts.progress && !stale.is_empty()).then(|| create_progress_bar(stale.len(), desc));
    let skipped = online.fill_hashes(&stale, opts, cancel, progress_callback(bar.as_ref()))?;
    if let Some(ref bar) = bar {
        clear_bar(bar);
    }
    if skipped > 0 {
        warn!("{} files could not be hashed", skipped);
    }
    Ok(())
}

fn handle_update(dir: &Path, opts: &Opts, cancel: &Arc<AtomicBool>) -> Result<i32> {
    let mut tree = Tree::open(dir, opts, true)?;
    fill_all_stale(&mut tree, opts, cancel, "Hashing")?;
    check_for_cancel(cancel)?;
    let online = tree.require_online()?;
    report_skipped(online.skipped());
    info!(
        "{}: {} files, {} hashes stored",
        online.root().display(),
        online.files().len(),
        online.db_entry_count()?
    );
    Ok(0)
}

fn handle_rehash(dir: &Path, opts: &Opts, cancel: &Arc<AtomicBool>) -> Result<i32> {
    let mut tree = Tree::open(dir, opts, true)?;
    {
        let online = tree.require_online()?;
        let all: Vec<_> = online.files().keys().copied().collect();
        online.drop_entries(&all)?;
    }
    fill_all_stale(&mut tree, opts, cancel, "Rehashing")?;
    check_for_cancel(cancel)?;
    Ok(0)
}

/// Split off an independent tree at `dir/rel`: give the subdirectory a
/// database of its own, seeded from the root's cached hashes, then drop
/// the rows for files outside it and compact. Nothing is rehashed.
fn handle_subdir(dir: &Path, rel: &Path, opts: &Opts) -> Result<i32> {
    use crate::engine::db_ops::{Db, DbKind, db_path_for_root};

    if rel.is_absolute() {
        return Err(RelinkError::Usage(format!(
            "subdir takes a path relative to the root, got {}",
            rel.display()
        ))
        .into());
    }
    let sub_root = dir.join(rel);
    if !sub_root.is_dir() {
        return Err(RelinkError::Usage(format!(
            "not a subdirectory of {}: {}",
            dir.display(),
            rel.display()
        ))
        .into());
    }

    // Read the root's cache first; its lock is released before the
    // subtree opens a database of its own.
    let root = dir
        .canonicalize()
        .with_context(|| format!("canonicalize tree root {}", dir.display()))?;
    let root_entries = {
        let root_db_path = db_path_for_root(&root, opts)?;
        let db = Db::open(&root_db_path, &opts.hasher, DbKind::Online)?;
        db.load_entries()?
    };

    // The subdirectory becomes a tree root in its own right, with its
    // database discovered by prefix underneath it.
    let sub_opts = Opts {
        db_location: None,
        ..opts.clone()
    };
    let mut tree = Tree::open(&sub_root, &sub_opts, true)?;
    let online = tree.require_online()?;
    let adopted = online.adopt_entries(&root_entries)?;
    let pruned = online.prune_db()?;
    online.vacuum_db()?;
    report_skipped(online.skipped());
    info!(
        "{}: {} hashes carried over, {} stale entries dropped",
        sub_root.display(),
        adopted,
        pruned
    );
    Ok(0)
}

fn handle_mkoffline(
    dir: &Path,
    out: &Path,
    force: bool,
    opts: &Opts,
    cancel: &Arc<AtomicBool>,
) -> Result<i32> {
    use crate::engine::db_ops::{Db, DbKind};

    if out.exists() {
        if !force {
            return Err(RelinkError::Usage(format!(
                "{} exists; pass --force to overwrite",
                out.display()
            ))
            .into());
        }
        std::fs::remove_file(out)
            .with_context(|| format!("remove existing {}", out.display()))?;
    }

    let mut tree = Tree::open(dir, opts, true)?;
    fill_all_stale(&mut tree, opts, cancel, "Hashing")?;
    check_for_cancel(cancel)?;

    let online = tree.require_online()?;
    let mut entries: Vec<(u64, crate::types::StoredMeta)> = Vec::new();
    let mut path_rows: Vec<(u64, PathBuf)> = Vec::new();
    let ids: Vec<_> = online.files().keys().copied().collect();
    for id in ids {
        let hash = online.hash_of(id)?;
        let node = &online.files()[&id];
        entries.push((id.ino, (node.size, node.mtime, hash)));
        for p in &node.paths {
            path_rows.push((id.ino, p.clone()));
        }
    }
    for d in online.dirs() {
        path_rows.push((DIR_SENTINEL, d.clone()));
    }

    let mut db = Db::open(out, &opts.hasher, DbKind::Offline)?;
    db.upsert_batch(&entries)?;
    db.write_paths(&path_rows)?;
    db.vacuum()?;
    info!(
        "wrote offline tree {} ({} files)",
        out.display(),
        entries.len()
    );
    Ok(0)
}

fn handle_cleandb(dir: &Path, opts: &Opts) -> Result<i32> {
    let mut tree = Tree::open(dir, opts, true)?;
    let online = tree.require_online()?;
    let removed = online.prune_db()?;
    online.vacuum_db()?;
    info!("dropped {} stale entries", removed);
    Ok(0)
}

fn handle_lookup(location: &Path, paths: &[PathBuf], opts: &Opts) -> Result<i32> {
    let mut tree = Tree::open(location, opts, true)?;
    let index = tree.path_index();
    let mut code = 0;
    if paths.is_empty() {
        let mut all: Vec<_> = tree.files().keys().copied().collect();
        all.sort_by(|a, b| {
            tree.node(*a)
                .expect("indexed id")
                .min_path()
                .cmp(tree.node(*b).expect("indexed id").min_path())
        });
        for id in all {
            let hash = tree.hash_of(id)?;
            let node = tree.node(id).expect("indexed id");
            println!("{hash}  {}", node.min_path().display());
        }
    } else {
        for rel in paths {
            match index.get(rel) {
                Some(id) => {
                    let hash = tree.hash_of(*id)?;
                    println!("{hash}  {}", rel.display());
                }
                None => {
                    warn!("no such file: {}", rel.display());
                    code = 1;
                }
            }
        }
    }
    Ok(code)
}

fn handle_sync(source: &Path, target: &Path, opts: &Opts, cancel: &Arc<AtomicBool>) -> Result<i32> {
    let mut src = open_location(source, 0, opts)?;
    let mut tgt = open_location(target, 1, opts)?;
    let tgt_root = {
        let online = tgt.require_online()?;
        online.root().to_path_buf()
    };
    if src.is_online() {
        let src_root = src.label().to_path_buf();
        if is_subdir(&src_root, &tgt_root) || is_subdir(&tgt_root, &src_root) {
            return Err(RelinkError::Usage(
                "source and target must not contain each other".to_string(),
            )
            .into());
        }
    }

    let matching = match_trees(&mut src, &mut tgt, opts, cancel)?;
    check_for_cancel(cancel)?;
    debug!(
        "{} pairs, {} unmatched on source, {} unmatched on target",
        matching.pairs.len(),
        matching.unmatched_source.len(),
        matching.unmatched_target.len()
    );
    if !matching.unmatched_target.is_empty() {
        info!(
            "{} target files have no source counterpart and are left alone",
            matching.unmatched_target.len()
        );
        for id in &matching.unmatched_target {
            if let Some(node) = tgt.node(*id) {
                debug!("  unmatched: {}", node.min_path().display());
            }
        }
    }

    // A dry run elides every target mutation, the case probe included;
    // the printed plan assumes a case-sensitive target.
    let case_insensitive = !opts.dry_run && probe_case_insensitive(&tgt_root);
    let plan = build_plan(&src, &tgt, &matching, case_insensitive)?;
    if plan.is_empty() {
        info!("already in sync: no operations");
        return Ok(0);
    }
    info!(
        "{} operations{}",
        plan.steps.len(),
        if opts.dry_run { " (dry run)" } else { "" }
    );
    execute_plan(&tgt_root, &plan, opts.dry_run)?;
    Ok(0)
}

/// Assemble the external byte-copy command that completes the mirror. The
/// databases of both trees are excluded; our filter stack rides along.
fn rsync_command(source: &Path, target: &Path, extra: &[String], opts: &Opts) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "rsync".to_string(),
        "-r".to_string(),
        "--times".to_string(),
        "--links".to_string(),
        "--hard-links".to_string(),
    ];
    if opts.dry_run {
        args.push("--dry-run".to_string());
    }
    if opts.size_only {
        args.push("--size-only".to_string());
    }
    if let Some(cap) = opts.max_size {
        args.push(format!("--max-size={cap}"));
    }
    args.push(format!("--exclude={}[0-9]*.db", opts.db_prefix));
    for rule in &opts.filter_rules {
        match rule.mode {
            crate::filter::FilterMode::Include => args.push(format!("--include={}", rule.pattern)),
            crate::filter::FilterMode::Exclude => args.push(format!("--exclude={}", rule.pattern)),
        }
    }
    args.extend(extra.iter().cloned());
    args.push(format!("{}/", source.display()));
    args.push(format!("{}/", target.display()));
    args
}

fn handle_rsync(
    source: &Path,
    target: &Path,
    execute: bool,
    extra: &[String],
    opts: &Opts,
) -> Result<i32> {
    if !source.is_dir() {
        return Err(RelinkError::Usage(
            "the byte-copy step needs a live source directory".to_string(),
        )
        .into());
    }
    let args = rsync_command(source, target, extra, opts);
    if !execute {
        println!("{}", args.join(" "));
        return Ok(0);
    }
    info!("running: {}", args.join(" "));
    let status = std::process::Command::new(&args[0])
        .args(&args[1..])
        .status()
        .with_context(|| format!("spawn {}", args[0]))?;
    if !status.success() {
        anyhow::bail!("{} exited with {}", args[0], status);
    }
    Ok(0)
}

fn handle_cmp(left: &Path, right: &Path, opts: &Opts) -> Result<i32> {
    let mut l = open_location(left, 0, opts)?;
    let mut r = open_location(right, 1, opts)?;
    let diffs = cmp_trees(&mut l, &mut r, opts)?;
    for d in &diffs {
        println!("{d}");
    }
    Ok(if diffs.is_empty() { 0 } else { 1 })
}

fn print_groups(trees: &[Tree], groups: &[crate::engine::setops::Group], opts: &Opts) {
    let mut first = true;
    for group in groups {
        if !first && !opts.same_line {
            println!();
        }
        first = false;
        let mut paths: Vec<String> = Vec::new();
        for m in &group.members {
            for p in member_paths(trees, m, opts.group_output) {
                let shown = match trees[m.tree].label().to_str() {
                    Some(label) if trees.len() > 1 => format!("{label}/{}", p.display()),
                    _ => p.display().to_string(),
                };
                paths.push(shown);
            }
        }
        if opts.same_line {
            println!("{}", paths.join(" "));
        } else {
            for p in paths {
                println!("{p}");
            }
        }
    }
}

fn handle_set_query(locations: &[PathBuf], query: SetQuery, opts: &Opts) -> Result<i32> {
    let mut trees = Vec::with_capacity(locations.len());
    for (i, loc) in locations.iter().enumerate() {
        trees.push(open_location(loc, i, opts)?);
    }
    let groups = run_set_query(&mut trees, query, opts)?;
    print_groups(&trees, &groups, opts);
    Ok(0)
}

fn handle_search(pattern: &str, locations: &[PathBuf], opts: &Opts) -> Result<i32> {
    let mut trees = Vec::with_capacity(locations.len());
    for (i, loc) in locations.iter().enumerate() {
        trees.push(open_location(loc, i, opts)?);
    }
    let patterns = vec![pattern.to_string()];
    let mut total = 0;
    for tree in &trees {
        let hits = search_tree(tree, &patterns)?;
        for id in &hits {
            let node = tree.node(*id).expect("indexed id");
            let shown: Vec<&Path> = match opts.group_output {
                GroupOutput::File => vec![node.min_path().as_path()],
                _ => node.paths.iter().map(PathBuf::as_path).collect(),
            };
            for p in shown {
                match tree.label().to_str() {
                    Some(label) if trees.len() > 1 => println!("{label}/{}", p.display()),
                    _ => println!("{}", p.display()),
                }
            }
        }
        total += hits.len();
    }
    if total == 0 {
        return Err(RelinkError::NoResult.into());
    }
    Ok(0)
}

fn handle_check(
    dir: &Path,
    paths: &[PathBuf],
    opts: &Opts,
    cancel: &Arc<AtomicBool>,
) -> Result<i32> {
    let mut tree = Tree::open(dir, opts, true)?;
    let online = tree.require_online()?;
    let index: Vec<_> = {
        let wanted: Option<std::collections::HashSet<&PathBuf>> =
            (!paths.is_empty()).then(|| paths.iter().collect());
        let mut ids: Vec<_> = online
            .files()
            .iter()
            .filter(|(_, node)| match &wanted {
                None => true,
                Some(set) => node.paths.iter().any(|p| set.contains(p)),
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    };

    let mut mismatches = 0_usize;
    let mut unchecked = 0_usize;
    for id in index {
        check_for_cancel(cancel)?;
        let node = online.files()[&id].clone();
        let Some((size, mtime, stored_hash)) = online.stored_entry(id) else {
            unchecked += 1;
            debug!("no stored hash for {} (run update)", node.min_path().display());
            continue;
        };
        if size != node.size || mtime != node.mtime {
            unchecked += 1;
            debug!(
                "{} changed since last update, skipping",
                node.min_path().display()
            );
            continue;
        }
        let abs = online.abs_path(node.min_path());
        match hash_file(&opts.hasher, &abs, node.size) {
            Ok(h) if h == stored_hash => {}
            Ok(_) => {
                mismatches += 1;
                println!("MISMATCH {}", node.min_path().display());
            }
            Err(e) => {
                warn!("{e:#}");
                unchecked += 1;
            }
        }
    }
    if mismatches == 0 {
        info!("no mismatches ({} files skipped)", unchecked);
        Ok(0)
    } else {
        warn!("{} files do not match their stored hash", mismatches);
        Ok(1)
    }
}
