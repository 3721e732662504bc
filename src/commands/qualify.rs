//! Qualify command implementation
//!
//! Runs the production flow for one corner:
//!
//! - hot: sweep the trim, qualify, persist the hot result
//! - cold: sweep the trim, recall the hot result from the NVR, show the
//!   fused value, then qualify and persist the hot result again

use super::calibrate::{print_calibration, sweep};
use super::progress::StageProgress;
use mramqual_core::config::QualConfig;
use mramqual_core::device::MemoryRegion;
use mramqual_core::report::{TestReport, Verdict};
use mramqual_core::sequencer::{QualificationSequencer, QUALIFICATION_STAGES};
use mramqual_core::trim::{fused_trim, CalibrationResult, Corner, TrimCalibrator};

/// Run the qualify command
///
/// Returns an error when any stage fails so the process exits non-zero.
pub fn run_qualify(
    device: &mut dyn MemoryRegion,
    config: &QualConfig,
    corner: Corner,
) -> Result<(), Box<dyn std::error::Error>> {
    let calibration = calibrate(device, config, corner)?;

    let (verdict, report) = {
        let mut sequencer = QualificationSequencer::new(&mut *device)
            .with_budgets(config.budgets)
            .with_reporter(StageProgress::new(QUALIFICATION_STAGES.len()));
        let verdict = sequencer.run(&calibration);
        (verdict, sequencer.report(&calibration, &verdict))
    };

    print_report(&report);
    match verdict {
        Verdict::Passed => {
            println!("PASS");
            Ok(())
        }
        Verdict::Failed(failure) => Err(format!("Qualification FAILED: {}", failure).into()),
    }
}

fn calibrate(
    device: &mut dyn MemoryRegion,
    config: &QualConfig,
    corner: Corner,
) -> Result<CalibrationResult, Box<dyn std::error::Error>> {
    let swept = sweep(&TrimCalibrator::new(config.policy(corner)), device)?;
    print_calibration(&swept);
    if corner == Corner::Hot {
        return Ok(swept);
    }

    let hot = TrimCalibrator::new(config.hot).recall(device)?;
    if hot.quality == u32::MAX {
        log::warn!(
            "NVR holds no hot-corner record, continuing with erased trim code {}",
            hot.trim
        );
    }
    println!(
        "Fused trim:   {} (hot {}, cold {})",
        fused_trim(hot.trim, swept.trim),
        hot.trim,
        swept.trim
    );
    println!();
    Ok(hot)
}

fn print_report(report: &TestReport) {
    println!("Test report");
    println!("===========");
    println!("Trim config:          {}", report.trim_config);
    println!("Trim failed bits:     {}", report.trim_failed_bits);
    println!("Failed pattern:       {}", report.failed_pattern);
    println!("Pattern failed bits:  {}", report.pattern_failed_bits);
    println!("Status pads:          0x{:04X}", report.status.bits());
}
