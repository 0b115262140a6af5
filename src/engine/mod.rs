//! Engine modules: hashing, database, matching, planning, set queries.

pub mod arg_parser;
pub mod db_ops;
pub mod handlers;
pub mod hashing;
pub mod matching;
pub mod plan;
pub mod progress;
pub mod setops;
pub mod tools;

// Re-export commonly used items
pub use arg_parser::{Cli, Commands, CommonArgs};
pub use db_ops::{Db, DbKind, db_path_for_root, is_db_basename, pick_db_basename};
pub use handlers::handle_run;
pub use hashing::{HashKind, hash_file};
pub use matching::{Matching, match_trees};
pub use plan::{Plan, PlanStep, build_plan, execute_plan};
pub use setops::{CmpDiff, SetQuery, cmp_trees, run_set_query, search_tree};
pub use tools::{path_relative_to, setup_ctrlc_handler};
