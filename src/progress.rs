//! Progress indicators for the scriptdeploy CLI.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while a phase runs
///
/// Returns a hidden bar when `visible` is false, so callers never branch.
pub fn spinner(msg: impl Into<String>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Stop a spinner and erase it
pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}
