//! Progress bar utilities for long hashing phases.

use std::sync::{Arc, Mutex};

use kdam::{Animation, Bar, BarExt};

pub type ProgressBar = Arc<Mutex<Bar>>;

/// Create a progress bar with a known total.
pub fn create_progress_bar(total: usize, desc: &'static str) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = total,
        desc = desc,
        animation = Animation::Classic
    )))
}

/// Advance the bar by `n` if it is not contended.
pub fn update_progress_bar(pb: &ProgressBar, n: usize) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.update(n);
    }
}

/// Clear the bar from the terminal.
pub fn clear_bar(pb: &ProgressBar) {
    if let Ok(mut bar) = pb.try_lock() {
        let _ = bar.clear();
    }
}

/// Boxed callback advancing `bar`, or None when progress is off.
pub fn progress_callback(bar: Option<&ProgressBar>) -> Option<Box<dyn FnMut(usize)>> {
    bar.map(|bar| {
        let bar = Arc::clone(bar);
        Box::new(move |n: usize| update_progress_bar(&bar, n)) as Box<dyn FnMut(usize)>
    })
}
