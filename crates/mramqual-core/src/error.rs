//! Error types for mramqual-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Details about a failure reported by the memory driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverFailure {
    /// Opening the memory device failed
    Open,
    /// Closing the memory device failed
    Close,
    /// Erase command failed
    Erase {
        /// Address where erase was attempted
        addr: u32,
    },
    /// Program command failed
    Program {
        /// Address where programming was attempted
        addr: u32,
    },
    /// Read command failed
    Read {
        /// Address where the read was attempted
        addr: u32,
    },
    /// Trim configuration register could not be written
    Trim {
        /// Trim code that was rejected
        code: u8,
    },
    /// ECC could not be enabled or disabled
    Ecc,
    /// NVR access could not be opened/closed, or NVR was addressed outside
    /// an open bracket
    Nvr,
    /// Address range is beyond the region size
    OutOfBounds {
        /// First address of the rejected range
        addr: u32,
    },
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A single memory word has more failed bits than its budget allows
    WordBudgetExceeded {
        /// Index of the offending word within the pattern pass
        word: u32,
        /// Failed bits in that word
        failed_bits: u32,
    },
    /// Cumulative failed bits over a pattern pass exceed the budget
    RegionBudgetExceeded {
        /// Running failed bit count when the budget was exhausted
        failed_bits: u32,
        /// Budget that was exceeded
        budget: u32,
    },
    /// Read-back of the persisted trim record differs from what was written
    PersistenceMismatch {
        /// Byte offset within the record
        offset: u32,
        /// Byte that was written
        expected: u8,
        /// Byte that was read back
        found: u8,
    },
    /// The memory driver reported a failure
    Driver(DriverFailure),
    /// Geometry is not usable (zero sizes, chunk not a multiple of the word)
    InvalidGeometry,
    /// Trim search constants do not describe a usable code range
    InvalidPolicy,
}

impl Error {
    /// Failed bit count carried by this error, if any
    ///
    /// This is the value reported to the tester as the pattern failed bit
    /// count.
    pub fn failed_bits(&self) -> Option<u32> {
        match self {
            Self::WordBudgetExceeded { failed_bits, .. } => Some(*failed_bits),
            Self::RegionBudgetExceeded { failed_bits, .. } => Some(*failed_bits),
            // A persisted record mismatch is reported as one failed bit
            Self::PersistenceMismatch { .. } => Some(1),
            Self::Driver(_) | Self::InvalidGeometry | Self::InvalidPolicy => None,
        }
    }
}

impl From<DriverFailure> for Error {
    fn from(failure: DriverFailure) -> Self {
        Self::Driver(failure)
    }
}

impl fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "failed to open memory device"),
            Self::Close => write!(f, "failed to close memory device"),
            Self::Erase { addr } => write!(f, "erase failed at address 0x{:08X}", addr),
            Self::Program { addr } => write!(f, "program failed at address 0x{:08X}", addr),
            Self::Read { addr } => write!(f, "read failed at address 0x{:08X}", addr),
            Self::Trim { code } => write!(f, "trim code {} rejected", code),
            Self::Ecc => write!(f, "ECC mode change failed"),
            Self::Nvr => write!(f, "NVR access failed"),
            Self::OutOfBounds { addr } => {
                write!(f, "address 0x{:08X} out of bounds", addr)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WordBudgetExceeded { word, failed_bits } => write!(
                f,
                "{} failed bits in word {} exceed the per-word budget",
                failed_bits, word
            ),
            Self::RegionBudgetExceeded {
                failed_bits,
                budget,
            } => write!(
                f,
                "{} failed bits exceed the region budget of {}",
                failed_bits, budget
            ),
            Self::PersistenceMismatch {
                offset,
                expected,
                found,
            } => write!(
                f,
                "persisted record mismatch at offset {}: expected 0x{:02X}, found 0x{:02X}",
                offset, expected, found
            ),
            Self::Driver(failure) => write!(f, "driver failure: {}", failure),
            Self::InvalidGeometry => write!(f, "invalid memory geometry"),
            Self::InvalidPolicy => write!(f, "invalid trim search policy"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
