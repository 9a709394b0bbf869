//! Progress reporting for pipeline stages, using the indicatif crate.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Template for stage spinners
pub const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";

/// Create a spinner for a stage without a known length
#[must_use]
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Finish a spinner with a completion message
pub fn finish_progress_bar(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(message.to_string());
}

/// Stop a spinner after a failure, leaving the message visible
pub fn abandon_progress_bar(pb: &ProgressBar, message: &str) {
    pb.abandon_with_message(message.to_string());
}
