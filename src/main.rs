//! Relink CLI: reconcile, query and maintain hash-indexed file trees.

use clap::Parser;
use relink::engine::arg_parser::Cli;
use relink::engine::handle_run;
use relink::exit_code_for;
use std::time::Instant;

fn main() {
    let start_time = Instant::now();
    let cli = Cli::parse();
    let code = match handle_run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("relink: {err:#}");
            exit_code_for(&err)
        }
    };
    log::debug!("Total time: {:?}", start_time.elapsed());
    std::process::exit(code);
}
