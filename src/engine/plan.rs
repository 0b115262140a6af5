//! Plan builder and executor: turn a matching into an ordered sequence of
//! filesystem mutations that never drops the last link to a file, then run
//! it (or print it for a dry run).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::engine::matching::Matching;
use crate::engine::tools::fold_path;
use crate::error::RelinkError;
use crate::tree::Tree;
use crate::types::{FileId, FileNode};
use crate::utils::config::STASH_INFIX;

/// One filesystem mutation. Paths are relative to the target root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanStep {
    MkDir(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    Link { from: PathBuf, to: PathBuf },
    Unlink(PathBuf),
    RmDir(PathBuf),
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::MkDir(p) => write!(f, "mkdir {}", p.display()),
            PlanStep::Rename { from, to } => {
                write!(f, "rename {} -> {}", from.display(), to.display())
            }
            PlanStep::Link { from, to } => write!(f, "link {} -> {}", from.display(), to.display()),
            PlanStep::Unlink(p) => write!(f, "unlink {}", p.display()),
            PlanStep::RmDir(p) => write!(f, "rmdir {}", p.display()),
        }
    }
}

/// Ordered, collision-free mutation sequence for one sync.
#[derive(Debug, Default)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Build the plan that brings every matched target file's path set to its
/// source file's path set.
pub fn build_plan(
    src: &Tree,
    tgt: &Tree,
    matching: &Matching,
    case_insensitive: bool,
) -> Result<Plan> {
    build_plan_from_parts(
        src.files(),
        tgt.files(),
        tgt.dirs(),
        matching,
        case_insensitive,
    )
}

enum PendOp {
    MkDir(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    Link { fid: FileId, to: PathBuf },
}

impl PendOp {
    fn dest(&self) -> &PathBuf {
        match self {
            PendOp::MkDir(d) => d,
            PendOp::Rename { to, .. } => to,
            PendOp::Link { to, .. } => to,
        }
    }
}

struct Builder {
    ci: bool,
    /// Folded path of every current target file path -> owner.
    occupied: HashMap<PathBuf, FileId>,
    /// Current paths per target file.
    paths_of: HashMap<FileId, BTreeSet<PathBuf>>,
    /// Folded dir paths known to exist on the target.
    dirs: BTreeSet<PathBuf>,
    /// Dirs created by this plan (folded), never rmdir'd.
    created_dirs: BTreeSet<PathBuf>,
    /// Folded path -> (actual path, owner) of every planned unlink.
    unlink_pool: BTreeMap<PathBuf, (PathBuf, FileId)>,
    steps: Vec<PlanStep>,
}

impl Builder {
    fn fold(&self, p: &Path) -> PathBuf {
        if self.ci {
            fold_path(p)
        } else {
            p.to_path_buf()
        }
    }

    fn parent_exists(&self, p: &Path) -> bool {
        match p.parent() {
            None => true,
            Some(parent) if parent.as_os_str().is_empty() => true,
            Some(parent) => self.dirs.contains(&self.fold(parent)),
        }
    }

    fn emit_mkdir(&mut self, d: PathBuf) {
        let folded = self.fold(&d);
        self.dirs.insert(folded.clone());
        self.created_dirs.insert(folded);
        self.steps.push(PlanStep::MkDir(d));
    }

    fn emit_rename(&mut self, fid: FileId, from: PathBuf, to: PathBuf) {
        let from_fold = self.fold(&from);
        let to_fold = self.fold(&to);
        self.occupied.remove(&from_fold);
        self.occupied.insert(to_fold, fid);
        let paths = self.paths_of.entry(fid).or_default();
        paths.remove(&from);
        paths.insert(to.clone());
        self.steps.push(PlanStep::Rename { from, to });
    }

    fn emit_link(&mut self, fid: FileId, from: PathBuf, to: PathBuf) {
        let folded = self.fold(&to);
        self.occupied.insert(folded, fid);
        self.paths_of.entry(fid).or_default().insert(to.clone());
        self.steps.push(PlanStep::Link { from, to });
    }

    fn emit_unlink(&mut self, fid: FileId, path: PathBuf) {
        let folded = self.fold(&path);
        self.occupied.remove(&folded);
        self.unlink_pool.remove(&folded);
        if let Some(paths) = self.paths_of.get_mut(&fid) {
            paths.remove(&path);
        }
        self.steps.push(PlanStep::Unlink(path));
    }

    /// Emit the occupant's unlink ahead of schedule when that is safe: the
    /// occupant must be slated for removal and keep at least one other link.
    fn try_vacate(&mut self, dest_fold: &PathBuf) -> bool {
        let Some((actual, fid)) = self.unlink_pool.get(dest_fold).cloned() else {
            return false;
        };
        let remaining = self.paths_of.get(&fid).map(|p| p.len()).unwrap_or(0);
        if remaining <= 1 {
            return false;
        }
        self.emit_unlink(fid, actual);
        true
    }

    fn link_source(&self, fid: FileId) -> Option<PathBuf> {
        self.paths_of
            .get(&fid)
            .and_then(|paths| paths.iter().next().cloned())
    }

    fn stash_name(&self, to: &Path, taken: &BTreeSet<PathBuf>) -> PathBuf {
        let base = to.to_string_lossy();
        for n in 0.. {
            let cand = PathBuf::from(format!("{base}{STASH_INFIX}{n}"));
            let folded = self.fold(&cand);
            if !self.occupied.contains_key(&folded)
                && !self.dirs.contains(&folded)
                && !taken.contains(&folded)
            {
                return cand;
            }
        }
        unreachable!("stash counter exhausted")
    }
}

fn build_plan_from_parts(
    src_files: &HashMap<FileId, FileNode>,
    tgt_files: &HashMap<FileId, FileNode>,
    tgt_dirs: &BTreeSet<PathBuf>,
    matching: &Matching,
    case_insensitive: bool,
) -> Result<Plan> {
    let mut b = Builder {
        ci: case_insensitive,
        occupied: HashMap::new(),
        paths_of: HashMap::new(),
        dirs: BTreeSet::new(),
        created_dirs: BTreeSet::new(),
        unlink_pool: BTreeMap::new(),
        steps: Vec::new(),
    };
    for (fid, node) in tgt_files {
        let mut set = BTreeSet::new();
        for p in &node.paths {
            let folded = b.fold(p);
            b.occupied.insert(folded, *fid);
            set.insert(p.clone());
        }
        b.paths_of.insert(*fid, set);
    }
    for d in tgt_dirs {
        let folded = b.fold(d);
        b.dirs.insert(folded);
    }

    // Case collisions among final paths are surfaced, not resolved.
    if case_insensitive {
        check_case_collisions(src_files, matching, &b)?;
    }

    // Per matched pair: diff the path sets, pair renames, pool unlinks.
    let mut pending: Vec<PendOp> = Vec::new();
    let mut pairs = matching.pairs.clone();
    pairs.sort_by(|a, b_| {
        let pa = tgt_files[&a.0].min_path();
        let pb = tgt_files[&b_.0].min_path();
        pa.cmp(pb)
    });
    for (tid, sid) in &pairs {
        let s_node = &src_files[sid];
        let t_node = &tgt_files[tid];
        let t_folds: HashMap<PathBuf, PathBuf> = t_node
            .paths
            .iter()
            .map(|p| (b.fold(p), p.clone()))
            .collect();
        let s_folds: BTreeSet<PathBuf> = s_node.paths.iter().map(|p| b.fold(p)).collect();

        let mut to_add: Vec<PathBuf> = s_node
            .paths
            .iter()
            .filter(|p| !t_folds.contains_key(&b.fold(p)))
            .cloned()
            .collect();
        let mut to_remove: Vec<PathBuf> = t_node
            .paths
            .iter()
            .filter(|p| !s_folds.contains(&b.fold(p)))
            .cloned()
            .collect();
        to_add.sort();
        to_remove.sort();

        // Prefer renames over link+unlink: basename-equal pairs first, the
        // rest zipped in sorted order.
        let mut renames: Vec<(PathBuf, PathBuf)> = Vec::new();
        let mut rest_add: Vec<PathBuf> = Vec::new();
        for add in to_add.drain(..) {
            let pos = to_remove
                .iter()
                .position(|r| r.file_name() == add.file_name());
            match pos {
                Some(i) => renames.push((to_remove.remove(i), add)),
                None => rest_add.push(add),
            }
        }
        let zipped = rest_add.len().min(to_remove.len());
        for (add, rem) in rest_add.drain(..zipped).zip(to_remove.drain(..zipped)) {
            renames.push((rem, add));
        }

        for (from, to) in renames {
            pending.push(PendOp::Rename { from, to });
        }
        for to in rest_add {
            pending.push(PendOp::Link { fid: *tid, to });
        }
        for rem in to_remove {
            let folded = b.fold(&rem);
            b.unlink_pool.insert(folded, (rem, *tid));
        }
    }

    // Directories every destination needs, parents first.
    let mut needed_dirs: BTreeSet<PathBuf> = BTreeSet::new();
    for op in &pending {
        let mut anc = op.dest().parent();
        while let Some(d) = anc {
            if d.as_os_str().is_empty() || b.dirs.contains(&b.fold(d)) {
                break;
            }
            needed_dirs.insert(d.to_path_buf());
            anc = d.parent();
        }
    }
    check_type_conflicts(&needed_dirs, &pending, &b)?;
    let mut ordered_pending: Vec<PendOp> = needed_dirs
        .iter()
        .map(|d| PendOp::MkDir(d.clone()))
        .collect();
    ordered_pending.extend(pending);
    let mut pending = ordered_pending;

    // Drop operations whose destination is held by a file that never moves
    // (an unmatched target file; it is never deleted).
    let vacating: BTreeSet<PathBuf> = pending
        .iter()
        .filter_map(|op| match op {
            PendOp::Rename { from, .. } => Some(b.fold(from)),
            _ => None,
        })
        .chain(b.unlink_pool.keys().cloned())
        .collect();
    pending.retain(|op| {
        let dest_fold = b.fold(op.dest());
        if b.occupied.contains_key(&dest_fold) && !vacating.contains(&dest_fold) {
            log::warn!("cannot place {}: path is taken on the target", op.dest().display());
            return false;
        }
        true
    });

    // Order the middle phase: emit whatever is unblocked, vacate held
    // destinations by hoisting safe unlinks, and break rename cycles with
    // a stash link.
    let final_dest_folds: BTreeSet<PathBuf> = pending.iter().map(|op| b.fold(op.dest())).collect();
    while !pending.is_empty() {
        let mut progressed = false;
        let mut still_pending: Vec<PendOp> = Vec::new();
        for op in pending.drain(..) {
            let dest_fold = b.fold(op.dest());
            let parent_ok = b.parent_exists(op.dest());
            let dest_free = parent_ok
                && (!b.occupied.contains_key(&dest_fold) || b.try_vacate(&dest_fold))
                && !(matches!(op, PendOp::MkDir(_)) && b.dirs.contains(&dest_fold));
            if parent_ok && dest_free {
                match op {
                    PendOp::MkDir(d) => b.emit_mkdir(d),
                    PendOp::Rename { from, to } => {
                        let fid = *b.occupied.get(&b.fold(&from)).expect("rename source present");
                        b.emit_rename(fid, from, to);
                    }
                    PendOp::Link { fid, to } => match b.link_source(fid) {
                        Some(from) => b.emit_link(fid, from, to),
                        None => log::warn!("no surviving link to create {}", to.display()),
                    },
                }
                progressed = true;
            } else {
                still_pending.push(op);
            }
        }
        pending = still_pending;
        if progressed || pending.is_empty() {
            continue;
        }
        // Mutually blocked renames: divert the first one through a stash
        // pathname beside its destination.
        let idx = pending
            .iter()
            .position(|op| matches!(op, PendOp::Rename { .. }));
        match idx {
            Some(i) => {
                let PendOp::Rename { from, to } = pending.remove(i) else {
                    unreachable!()
                };
                let stash = b.stash_name(&to, &final_dest_folds);
                let fid = *b.occupied.get(&b.fold(&from)).expect("rename source present");
                b.emit_rename(fid, from, stash.clone());
                pending.push(PendOp::Rename { from: stash, to });
            }
            None => {
                for op in &pending {
                    log::warn!("cannot place {}: left unchanged", op.dest().display());
                }
                pending.clear();
            }
        }
    }

    // Remaining unlinks: every addition is in place, so only surplus links
    // die here, and never the last one.
    let pool: Vec<(PathBuf, FileId)> = b.unlink_pool.values().cloned().collect();
    for (path, fid) in pool {
        let remaining = b.paths_of.get(&fid).map(|p| p.len()).unwrap_or(0);
        if remaining <= 1 {
            log::warn!("keeping {}: removing it would drop the last link", path.display());
            continue;
        }
        b.emit_unlink(fid, path);
    }

    emit_rmdirs(&mut b, tgt_dirs);

    Ok(Plan { steps: b.steps })
}

/// Remove target directories our renames and unlinks emptied, deepest
/// first. Directories that were already empty stay.
fn emit_rmdirs(b: &mut Builder, tgt_dirs: &BTreeSet<PathBuf>) {
    let mut touched: BTreeSet<PathBuf> = BTreeSet::new();
    for step in &b.steps {
        let moved_from = match step {
            PlanStep::Rename { from, .. } => Some(from),
            PlanStep::Unlink(p) => Some(p),
            _ => None,
        };
        if let Some(p) = moved_from {
            for anc in p.ancestors().skip(1) {
                if !anc.as_os_str().is_empty() {
                    touched.insert(b.fold(anc));
                }
            }
        }
    }

    let mut removed: BTreeSet<PathBuf> = BTreeSet::new();
    let mut dirs: Vec<&PathBuf> = tgt_dirs.iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for dir in dirs {
        let folded = b.fold(dir);
        if !touched.contains(&folded) || b.created_dirs.contains(&folded) {
            continue;
        }
        let has_files = b.occupied.keys().any(|p| p.starts_with(&folded) && *p != folded);
        let has_live_subdir = tgt_dirs
            .iter()
            .map(|d| b.fold(d))
            .chain(b.created_dirs.iter().cloned())
            .any(|d| d.starts_with(&folded) && d != folded && !removed.contains(&d));
        if has_files || has_live_subdir {
            continue;
        }
        removed.insert(folded);
        b.steps.push(PlanStep::RmDir(dir.clone()));
    }
}

fn check_case_collisions(
    src_files: &HashMap<FileId, FileNode>,
    matching: &Matching,
    b: &Builder,
) -> Result<()> {
    let mut seen: HashMap<PathBuf, PathBuf> = HashMap::new();
    for (_, sid) in &matching.pairs {
        for p in &src_files[sid].paths {
            let folded = b.fold(p);
            if let Some(prev) = seen.insert(folded, p.clone()) {
                if &prev != p {
                    return Err(RelinkError::TargetPathTypeConflict { path: p.clone() }.into());
                }
            }
        }
    }
    Ok(())
}

/// P5: a directory the plan must create cannot coincide with a target file
/// that stays in place.
fn check_type_conflicts(
    needed_dirs: &BTreeSet<PathBuf>,
    pending: &[PendOp],
    b: &Builder,
) -> Result<()> {
    let vacating: BTreeSet<PathBuf> = pending
        .iter()
        .filter_map(|op| match op {
            PendOp::Rename { from, .. } => Some(b.fold(from)),
            _ => None,
        })
        .chain(b.unlink_pool.keys().cloned())
        .collect();
    for d in needed_dirs {
        let folded = b.fold(d);
        if b.occupied.contains_key(&folded) && !vacating.contains(&folded) {
            return Err(RelinkError::TargetPathTypeConflict { path: d.clone() }.into());
        }
    }
    Ok(())
}

/// Apply the plan under `root`. In dry-run mode every step is surfaced in
/// textual form and nothing is touched. A failing step aborts with
/// `PartialPlanFailure`; completed steps are not rolled back (renames and
/// links never lose data).
pub fn execute_plan(root: &Path, plan: &Plan, dry_run: bool) -> Result<()> {
    for (i, step) in plan.steps.iter().enumerate() {
        if dry_run {
            log::info!("{}", step);
            continue;
        }
        log::debug!("{}", step);
        if let Err(cause) = apply_step(root, step) {
            return Err(RelinkError::PartialPlanFailure {
                completed: i,
                total: plan.steps.len(),
                step: step.to_string(),
                cause: cause.to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn apply_step(root: &Path, step: &PlanStep) -> std::result::Result<(), RelinkError> {
    match step {
        PlanStep::MkDir(d) => std::fs::create_dir(root.join(d)).map_err(|e| {
            RelinkError::DirInaccessible {
                path: d.clone(),
                cause: e.to_string(),
            }
        }),
        PlanStep::Rename { from, to } => {
            std::fs::rename(root.join(from), root.join(to)).map_err(|e| {
                RelinkError::TargetRenameFailed {
                    from: from.clone(),
                    to: to.clone(),
                    cause: e.to_string(),
                }
            })
        }
        PlanStep::Link { from, to } => {
            std::fs::hard_link(root.join(from), root.join(to)).map_err(|e| {
                RelinkError::TargetLinkFailed {
                    from: from.clone(),
                    to: to.clone(),
                    cause: e.to_string(),
                }
            })
        }
        PlanStep::Unlink(p) => std::fs::remove_file(root.join(p)).map_err(|e| {
            RelinkError::TargetUnlinkFailed {
                path: p.clone(),
                cause: e.to_string(),
            }
        }),
        PlanStep::RmDir(d) => std::fs::remove_dir(root.join(d)).map_err(|e| {
            RelinkError::DirInaccessible {
                path: d.clone(),
                cause: e.to_string(),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(size: u64, paths: &[&str]) -> FileNode {
        let mut paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        paths.sort();
        FileNode {
            size,
            mtime: 0,
            paths,
        }
    }

    fn fid(n: u64) -> FileId {
        FileId::new(1, n)
    }

    fn plan_for(
        src: Vec<(FileId, FileNode)>,
        tgt: Vec<(FileId, FileNode)>,
        tgt_dirs: &[&str],
        pairs: Vec<(FileId, FileId)>,
    ) -> Plan {
        let src: HashMap<_, _> = src.into_iter().collect();
        let tgt: HashMap<_, _> = tgt.into_iter().collect();
        let dirs: BTreeSet<PathBuf> = tgt_dirs.iter().map(PathBuf::from).collect();
        let matching = Matching {
            pairs,
            unmatched_source: vec![],
            unmatched_target: vec![],
        };
        build_plan_from_parts(&src, &tgt, &dirs, &matching, false).unwrap()
    }

    #[test]
    fn simple_rename_creates_and_removes_dirs() {
        let plan = plan_for(
            vec![(fid(10), node(1, &["a/one.txt"]))],
            vec![(fid(20), node(1, &["b/one.txt"]))],
            &["b"],
            vec![(fid(20), fid(10))],
        );
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
    }

    #[test]
    fn new_hard_link_is_created_not_copied() {
        let plan = plan_for(
            vec![(fid(10), node(1, &["p", "q"]))],
            vec![(fid(20), node(1, &["p"]))],
            &[],
            vec![(fid(20), fid(10))],
        );
        assert_eq!(
            plan.steps,
            vec![PlanStep::Link {
                from: PathBuf::from("p"),
                to: PathBuf::from("q"),
            }]
        );
    }

    #[test]
    fn two_cycle_uses_a_stash() {
        // target: a holds Y's content, b holds X's; source swapped.
        let plan = plan_for(
            vec![
                (fid(10), node(1, &["a"])),
                (fid(11), node(2, &["b"])),
            ],
            vec![
                (fid(20), node(1, &["b"])),
                (fid(21), node(2, &["a"])),
            ],
            &[],
            vec![(fid(20), fid(10)), (fid(21), fid(11))],
        );
        assert_eq!(plan.steps.len(), 3);
        let renames: Vec<_> = plan
            .steps
            .iter()
            .map(|s| match s {
                PlanStep::Rename { from, to } => (from.clone(), to.clone()),
                other => panic!("unexpected step {other}"),
            })
            .collect();
        // First hop goes to a stash name, and both files end up swapped.
        assert!(renames[0].1.to_string_lossy().contains(STASH_INFIX));
        let final_of = |start: &str| {
            let mut cur = PathBuf::from(start);
            for (from, to) in &renames {
                if *from == cur {
                    cur = to.clone();
                }
            }
            cur
        };
        assert_eq!(final_of("b"), PathBuf::from("a"));
        assert_eq!(final_of("a"), PathBuf::from("b"));
    }

    #[test]
    fn surplus_link_unlinked_after_additions() {
        // target file has paths {x, y}; source only {z}.
        let plan = plan_for(
            vec![(fid(10), node(1, &["z"]))],
            vec![(fid(20), node(1, &["x", "y"]))],
            &[],
            vec![(fid(20), fid(10))],
        );
        // one rename consumes one surplus path, one unlink the other
        assert_eq!(
            plan.steps,
            vec![
                PlanStep::Rename {
                    from: PathBuf::from("x"),
                    to: PathBuf::from("z"),
                },
                PlanStep::Unlink(PathBuf::from("y")),
            ]
        );
    }

    #[test]
    fn unmatched_target_file_is_left_alone() {
        let plan = plan_for(
            vec![(fid(10), node(1, &["kept"]))],
            vec![
                (fid(20), node(1, &["kept"])),
                (fid(21), node(3, &["extra"])),
            ],
            &[],
            vec![(fid(20), fid(10))],
        );
        assert!(plan.is_empty(), "unexpected steps: {:?}", plan.steps);
    }

    #[test]
    fn occupied_destination_vacated_first() {
        // target: old (content A) sits where source wants new content;
        // old itself moves elsewhere.
        let plan = plan_for(
            vec![
                (fid(10), node(1, &["spot"])),
                (fid(11), node(2, &["moved"])),
            ],
            vec![
                (fid(20), node(1, &["other"])),
                (fid(21), node(2, &["spot"])),
            ],
            &[],
            vec![(fid(20), fid(10)), (fid(21), fid(11))],
        );
        let spot_write = plan
            .steps
            .iter()
            .position(|s| matches!(s, PlanStep::Rename { to, .. } if to == &PathBuf::from("spot")))
            .expect("write into spot");
        let spot_vacate = plan
            .steps
            .iter()
            .position(
                |s| matches!(s, PlanStep::Rename { from, .. } if from == &PathBuf::from("spot")),
            )
            .expect("move away from spot");
        assert!(spot_vacate < spot_write);
    }

    #[test]
    fn mkdir_conflict_with_staying_file_aborts() {
        let src: HashMap<_, _> = vec![(fid(10), node(1, &["a/x"]))].into_iter().collect();
        let tgt: HashMap<_, _> = vec![
            (fid(20), node(1, &["b"])),
            (fid(21), node(5, &["a"])), // unmatched file occupying the dir path
        ]
        .into_iter()
        .collect();
        let dirs: BTreeSet<PathBuf> = ["b"].iter().map(PathBuf::from).collect();
        let matching = Matching {
            pairs: vec![(fid(20), fid(10))],
            unmatched_source: vec![],
            unmatched_target: vec![fid(21)],
        };
        let err = build_plan_from_parts(&src, &tgt, &dirs, &matching, false).unwrap_err();
        let kind = err.downcast_ref::<RelinkError>().expect("typed error");
        assert!(matches!(kind, RelinkError::TargetPathTypeConflict { .. }));
    }

    #[test]
    fn case_only_difference_is_not_renamed() {
        let src: HashMap<_, _> = vec![(fid(10), node(1, &["Readme.txt"]))]
            .into_iter()
            .collect();
        let tgt: HashMap<_, _> = vec![(fid(20), node(1, &["readme.TXT"]))]
            .into_iter()
            .collect();
        let matching = Matching {
            pairs: vec![(fid(20), fid(10))],
            unmatched_source: vec![],
            unmatched_target: vec![],
        };
        let plan =
            build_plan_from_parts(&src, &tgt, &BTreeSet::new(), &matching, true).unwrap();
        assert!(plan.is_empty());
    }
}
