use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Initialise the process logger. Our crate logs at Info (Debug with
/// `--verbose`); dependencies stay at Warn. Safe to call more than once.
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            let tag = match record.level() {
                Level::Error => "error".red().bold().to_string(),
                Level::Warn => "warning".yellow().to_string(),
                Level::Debug | Level::Trace => record.target().dimmed().to_string(),
                Level::Info => env!("CARGO_PKG_NAME").cyan().to_string(),
            };
            writeln!(buf, "{}: {}", tag, record.args())
        })
        .try_init()
        .ok();
}
