//! mramqual - MRAM trim calibration and qualification
//!
//! Drives the production test flow of an MRAM macro through any device
//! backend implementing `MemoryRegion`:
//!
//! - **calibrate** searches the sense-amplifier trim code for one
//!   temperature corner, or recalls the persisted one (`--warm`)
//! - **qualify** runs the full flow: calibration, the stage battery, and
//!   persisting the trim record; the exit status is non-zero on FAIL
//! - **recall** and **stages** inspect the persisted record and the stage
//!   table

mod cli;
mod commands;
mod devices;

use clap::Parser;
use cli::{Cli, Commands};
use mramqual_core::config::QualConfig;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG still takes precedence over -v
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_log_filter(cli.verbose)),
    )
    .init();

    let config = match load_config(cli.config.as_deref(), cli.quick) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load test configuration: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Calibrate {
            device,
            corner,
            warm,
        } => devices::with_device(&device, &config.geometry, |mram| {
            commands::run_calibrate(mram, &config, corner.into(), warm)
        }),
        Commands::Qualify { device, corner } => {
            devices::with_device(&device, &config.geometry, |mram| {
                commands::run_qualify(mram, &config, corner.into())
            })
        }
        Commands::Recall { device } => {
            devices::with_device(&device, &config.geometry, commands::run_recall)
        }
        Commands::Stages => {
            commands::list_stages(&config);
            Ok(())
        }
        Commands::ListDevices => {
            commands::list_devices();
            Ok(())
        }
    }
}

/// Default log filter for the given number of `-v` flags
fn default_log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Load the test configuration, starting from the quick or production profile
fn load_config(path: Option<&Path>, quick: bool) -> Result<QualConfig, Box<dyn std::error::Error>> {
    let base = if quick {
        QualConfig::quick()
    } else {
        QualConfig::default()
    };

    match path {
        Some(path) => {
            let config = QualConfig::from_toml_file(path, base)?;
            log::info!("Loaded test configuration from {:?}", path);
            Ok(config)
        }
        None => Ok(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    fn filter_for(verbose: u8) -> LevelFilter {
        env_logger::Builder::new()
            .parse_filters(default_log_filter(verbose))
            .build()
            .filter()
    }

    #[test]
    fn test_verbosity_raises_log_filter() {
        assert_eq!(filter_for(0), LevelFilter::Info);
        assert_eq!(filter_for(1), LevelFilter::Debug);
        assert_eq!(filter_for(2), LevelFilter::Trace);
        assert_eq!(filter_for(5), LevelFilter::Trace);
    }
}
