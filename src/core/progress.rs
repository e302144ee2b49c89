//! Terminal progress bars for the long-running stages.

use indicatif::{ProgressBar, ProgressStyle};

/// Create a bar for one pipeline stage; hidden when `quiet`
pub fn stage_bar(len: usize, stage: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} ({pos}/{len}) [{bar:40.green/dim}] {percent}% {elapsed_precise}")
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );
    pb.set_message(stage.to_string());
    pb
}

/// Close a stage bar, leaving a one-line summary
pub fn finish_stage(pb: &ProgressBar, stage: &str) {
    pb.finish_with_message(format!("{} [done]", stage));
}
