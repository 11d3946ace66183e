//! Terminal progress for import runs
//!
//! Bars draw to stderr so stdout stays free for the JSON summary. When
//! progress is not requested every bar is hidden and updates are no-ops.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

pub struct RunProgress {
    files: ProgressBar,
    rows: ProgressBar,
}

impl RunProgress {
    pub fn new(total_files: u64, visible: bool) -> Self {
        if !visible {
            return Self {
                files: ProgressBar::hidden(),
                rows: ProgressBar::hidden(),
            };
        }

        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        let files = multi.add(ProgressBar::new(total_files));
        files.set_style(style(
            "{msg:<40} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} files",
        ));
        files.set_message("Files");

        let rows = multi.add(ProgressBar::new(0));
        rows.set_style(style(
            "{msg:<40} [{elapsed_precise}] [{wide_bar:.green/white}] {human_pos}/{human_len} rows ({eta})",
        ));

        Self { files, rows }
    }

    /// Bar advanced by the pipeline as batches commit
    pub fn rows(&self) -> ProgressBar {
        self.rows.clone()
    }

    pub fn start_file(&self, name: &str) {
        self.rows.set_message(name.to_string());
    }

    pub fn finish_file(&self) {
        self.files.inc(1);
    }

    pub fn finish(&self) {
        self.rows.finish_and_clear();
        self.files.finish_with_message("Done");
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}
