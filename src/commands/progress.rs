//! Progress display using indicatif

use indicatif::{ProgressBar, ProgressStyle};
use mramqual_core::report::{Reporter, StatusPads, TestReport};
use mramqual_core::sequencer::Stage;
use mramqual_core::trim::{Corner, Trial};
use std::time::Duration;

/// Stage-level progress bar for a qualification run
pub struct StageProgress {
    bar: ProgressBar,
}

impl StageProgress {
    pub fn new(stages: usize) -> Self {
        let bar = ProgressBar::new(stages as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }
}

impl Reporter for StageProgress {
    fn stage_started(&mut self, _index: u32, stage: &Stage) {
        self.bar.set_message(stage.name);
    }

    fn stage_passed(&mut self, _index: u32, _stage: &Stage, _failed_bits: u32) {
        self.bar.inc(1);
    }

    fn finished(&mut self, report: &TestReport) {
        if report.status.contains(StatusPads::PASS) {
            self.bar.finish_with_message("PASS");
        } else {
            self.bar.abandon_with_message("FAIL");
        }
    }
}

/// Spinner updated after every trim trial
pub struct SweepProgress {
    spinner: ProgressBar,
}

impl SweepProgress {
    pub fn new(corner: Corner) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {prefix} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_prefix(format!("Sweeping trim at {}", corner));
        spinner.enable_steady_tick(Duration::from_millis(100));
        Self { spinner }
    }

    pub fn trial(&self, trial: &Trial) {
        self.spinner
            .set_message(format!("code {:2}: {} failed bits", trial.code, trial.fbc));
    }

    pub fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}
