//! Outcome reporting towards the test equipment
//!
//! The tester observes three status pads and four mailbox registers. This
//! module models both as plain values; writing them to hardware is left to
//! the caller.

use bitflags::bitflags;
use core::fmt;

use crate::error::Error;
use crate::sequencer::Stage;
use crate::trim::CalibrationResult;

bitflags! {
    /// Status pads sampled by the tester
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusPads: u32 {
        /// Test in progress
        const RUNNING = 1 << 12;
        /// Test finished
        const DONE = 1 << 13;
        /// Test passed (valid together with DONE)
        const PASS = 1 << 14;
    }
}

impl StatusPads {
    /// Pad value for a passed run
    pub const PASSED: Self = Self::DONE.union(Self::PASS);
    /// Pad value for a failed run
    pub const FAILED: Self = Self::DONE;
}

/// Why a qualification run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    /// 1-based index of the failing stage
    pub stage: u32,
    /// Name of the failing stage
    pub name: &'static str,
    /// Failed bits observed when the run stopped
    pub failed_bits: u32,
    /// Underlying error
    pub cause: Error,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stage {} ({}) failed with {} failed bits: {}",
            self.stage, self.name, self.failed_bits, self.cause
        )
    }
}

/// Final outcome of a qualification run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every stage and the persistence step passed
    Passed,
    /// The run stopped at the first violation
    Failed(Failure),
}

impl Verdict {
    /// Returns true for [`Verdict::Passed`]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Failure details, if the run failed
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Passed => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// Status pad value signalling this outcome
    pub fn pads(&self) -> StatusPads {
        match self {
            Self::Passed => StatusPads::PASSED,
            Self::Failed(_) => StatusPads::FAILED,
        }
    }
}

/// Tester mailbox contents at the end of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestReport {
    /// Trim code reported to the tester
    pub trim_config: u8,
    /// Failed bit count of that trim code
    pub trim_failed_bits: u32,
    /// Number of stages started (the failing stage on FAIL)
    pub failed_pattern: u32,
    /// Failed bits of the failing stage, zero on PASS
    pub pattern_failed_bits: u32,
    /// Final pad value
    pub status: StatusPads,
}

impl TestReport {
    /// Build the mailbox contents for a finished run
    ///
    /// `stages_run` is the number of stages the sequencer started.
    pub fn from_verdict(calibration: &CalibrationResult, verdict: &Verdict, stages_run: u32) -> Self {
        let (failed_pattern, pattern_failed_bits) = match verdict {
            Verdict::Passed => (stages_run, 0),
            Verdict::Failed(failure) => (failure.stage, failure.failed_bits),
        };
        Self {
            trim_config: calibration.trim,
            trim_failed_bits: calibration.quality,
            failed_pattern,
            pattern_failed_bits,
            status: verdict.pads(),
        }
    }
}

/// Progress callbacks from the qualification sequencer
pub trait Reporter {
    /// A stage is about to run
    fn stage_started(&mut self, index: u32, stage: &Stage);

    /// A stage finished within budget
    fn stage_passed(&mut self, index: u32, stage: &Stage, failed_bits: u32);

    /// The run reached its terminal state
    fn finished(&mut self, report: &TestReport);
}

/// Reporter that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn stage_started(&mut self, _index: u32, _stage: &Stage) {}

    fn stage_passed(&mut self, _index: u32, _stage: &Stage, _failed_bits: u32) {}

    fn finished(&mut self, _report: &TestReport) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trim::{CalibrationResult, Corner};

    #[test]
    fn test_pad_values() {
        assert_eq!(StatusPads::PASSED.bits(), 0x6000);
        assert_eq!(StatusPads::FAILED.bits(), 0x2000);
        assert_eq!(StatusPads::RUNNING.bits(), 0x1000);
    }

    #[test]
    fn test_report_from_failed_verdict() {
        let calibration = CalibrationResult::recalled(Corner::Hot, 23, 77);
        let verdict = Verdict::Failed(Failure {
            stage: 3,
            name: "wr0",
            failed_bits: 2,
            cause: Error::WordBudgetExceeded {
                word: 0,
                failed_bits: 2,
            },
        });
        let report = TestReport::from_verdict(&calibration, &verdict, 3);
        assert_eq!(report.trim_config, 23);
        assert_eq!(report.trim_failed_bits, 77);
        assert_eq!(report.failed_pattern, 3);
        assert_eq!(report.pattern_failed_bits, 2);
        assert_eq!(report.status, StatusPads::FAILED);
    }

    #[test]
    fn test_report_from_passed_verdict() {
        let calibration = CalibrationResult::recalled(Corner::Cold, 10, 0);
        let report = TestReport::from_verdict(&calibration, &Verdict::Passed, 27);
        assert_eq!(report.failed_pattern, 27);
        assert_eq!(report.pattern_failed_bits, 0);
        assert_eq!(report.status.bits(), 0x6000);
    }
}
