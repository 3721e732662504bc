//! Calibrate command implementation

use super::progress::SweepProgress;
use mramqual_core::config::QualConfig;
use mramqual_core::device::MemoryRegion;
use mramqual_core::trim::{CalibrationResult, Corner, Source, TrimCalibrator};

/// Run the calibrate command
pub fn run_calibrate(
    device: &mut dyn MemoryRegion,
    config: &QualConfig,
    corner: Corner,
    warm: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let calibrator = TrimCalibrator::new(config.policy(corner));
    let result = if warm {
        calibrator.recall(device)?
    } else {
        sweep(&calibrator, device)?
    };
    print_calibration(&result);
    Ok(())
}

/// Sweep one corner with a progress spinner
pub(super) fn sweep(
    calibrator: &TrimCalibrator,
    device: &mut dyn MemoryRegion,
) -> Result<CalibrationResult, Box<dyn std::error::Error>> {
    let progress = SweepProgress::new(calibrator.policy().corner);
    let result = calibrator.run_with(device, |trial| progress.trial(trial));
    progress.finish();
    Ok(result?)
}

pub(super) fn print_calibration(result: &CalibrationResult) {
    println!("Trim calibration ({})", result.corner);
    println!("==========================");
    match result.source {
        Source::Swept => {
            println!("Trials:");
            for trial in &result.trials {
                println!("  code {:2}: {:6} failed bits", trial.code, trial.fbc);
            }
            if let Some(rule) = result.rule {
                println!("Rule:         {:?}", rule);
            }
        }
        Source::Recalled => println!("Source:       NVR record"),
    }
    println!("Trim code:    {}", result.trim);
    println!("Failed bits:  {}", result.quality);
    println!();
}
