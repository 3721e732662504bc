//! mramqual-core - MRAM trim calibration and qualification engine
//!
//! This crate provides the production-test logic for an MRAM macro with an
//! optional ECC mode and a small reserved (NVR) region. It is `no_std`
//! compatible so the same engine can run on the device under test.
//!
//! - [`trim`] searches the sense-amplifier trim code for a temperature corner
//! - [`sequencer`] runs the fixed battery of pattern stages and reports
//!   PASS/FAIL
//! - [`pattern`] and [`bitcount`] generate test vectors and count failed bits
//! - [`record`] encodes the trim record persisted into the NVR
//!
//! All hardware access goes through the [`device::MemoryRegion`] trait.
//!
//! # Features
//!
//! - `std` - Enable standard library support and TOML configuration files
//!
//! # Example
//!
//! ```ignore
//! use mramqual_core::{sequencer::QualificationSequencer, trim::{CornerPolicy, TrimCalibrator}};
//!
//! fn qualify<D: MemoryRegion>(device: &mut D) -> Verdict {
//!     let calibration = TrimCalibrator::new(CornerPolicy::hot()).run(device)?;
//!     QualificationSequencer::new(device).run(&calibration)
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "std")]
extern crate std;

pub mod bitcount;
#[cfg(feature = "std")]
pub mod config;
pub mod device;
pub mod error;
#[cfg(all(test, feature = "std"))]
mod mock;
pub mod pattern;
pub mod record;
pub mod report;
pub mod sequencer;
pub mod trim;

pub use error::{DriverFailure, Error, Result};
