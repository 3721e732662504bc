//! CLI argument parsing

use crate::devices;
use clap::{Parser, Subcommand, ValueEnum};
use mramqual_core::trim::Corner;
use std::path::PathBuf;

/// Generate dynamic help text for the device argument
fn device_help() -> String {
    format!(
        "Device to test [available: {}]",
        devices::device_names_short()
    )
}

#[derive(Parser)]
#[command(name = "mramqual")]
#[command(author, version, about = "MRAM trim calibration and qualification", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Test configuration file (TOML format)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the quick profile: one chunk of main array, two small sectors
    #[arg(long, global = true)]
    pub quick: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Temperature corner selected on the command line
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CornerArg {
    /// 125 °C, sweeps from the top code down
    Hot,
    /// 25 °C / -40 °C, sweeps from the bottom code up
    Cold,
}

impl From<CornerArg> for Corner {
    fn from(arg: CornerArg) -> Self {
        match arg {
            CornerArg::Hot => Corner::Hot,
            CornerArg::Cold => Corner::Cold,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search the trim code for one corner
    Calibrate {
        /// Device to test
        #[arg(short, long, help = device_help())]
        device: String,

        /// Temperature corner
        #[arg(long, value_enum)]
        corner: CornerArg,

        /// Apply the trim code persisted in the NVR instead of sweeping
        #[arg(long)]
        warm: bool,
    },

    /// Calibrate, run every qualification stage and persist the trim record
    Qualify {
        /// Device to test
        #[arg(short, long, help = device_help())]
        device: String,

        /// Temperature corner
        #[arg(long, value_enum)]
        corner: CornerArg,
    },

    /// Show the trim record persisted in the NVR
    Recall {
        /// Device to test
        #[arg(short, long, help = device_help())]
        device: String,
    },

    /// List the qualification stages
    Stages,

    /// List supported devices
    ListDevices,
}
