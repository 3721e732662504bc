//! Emulator configuration and option parsing

use mramqual_core::device::{Geometry, Target};

use crate::error::{DummyError, Result};

/// How read margin depends on the trim code
///
/// Reads at `code` flip one bit in each of the first
/// `slope * max(0, |code - center| - window)` words of the main array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimProfile {
    /// Code with the best read margin
    pub center: u8,
    /// Distance from `center` that still reads clean
    pub window: u8,
    /// Weak words added per code outside the window
    pub slope: u32,
}

impl Default for TrimProfile {
    fn default() -> Self {
        Self {
            center: 20,
            window: 0,
            slope: 8,
        }
    }
}

impl TrimProfile {
    /// Number of words read with one flipped bit at `code`
    pub fn weak_words(&self, code: u8) -> u32 {
        let distance = (code as i32 - self.center as i32).unsigned_abs();
        distance
            .saturating_sub(self.window as u32)
            .saturating_mul(self.slope)
    }
}

/// A cell that always reads back as 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StuckBit {
    /// Array the cell lives in
    pub target: Target,
    /// Byte address (NVR address space for [`Target::Nvr`])
    pub addr: u32,
    /// Bit number within the byte
    pub bit: u8,
}

impl StuckBit {
    /// Stuck cell in the main array
    pub fn main(addr: u32, bit: u8) -> Self {
        Self {
            target: Target::Main,
            addr,
            bit,
        }
    }

    /// Stuck cell in the NVR
    pub fn nvr(addr: u32, bit: u8) -> Self {
        Self {
            target: Target::Nvr,
            addr,
            bit,
        }
    }

    /// Mask of the stuck bit within its byte
    pub fn mask(&self) -> u8 {
        1 << (self.bit & 7)
    }

    /// Parse `<addr>.<bit>` with an optional `/nvr` suffix
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || DummyError::InvalidParameter(format!("stuck: {}", s));
        let (cell, target) = match s.strip_suffix("/nvr") {
            Some(cell) => (cell, Target::Nvr),
            None => (s, Target::Main),
        };
        let (addr, bit) = cell.split_once('.').ok_or_else(invalid)?;
        let addr = parse_number(addr).ok_or_else(invalid)?;
        let bit: u8 = bit.parse().map_err(|_| invalid())?;
        if bit > 7 {
            return Err(invalid());
        }
        Ok(Self { target, addr, bit })
    }
}

/// Configuration for the emulated macro
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DummyConfig {
    /// Array layout
    pub geometry: Geometry,
    /// Read margin model
    pub profile: TrimProfile,
    /// Defective cells
    pub stuck: Vec<StuckBit>,
}

impl DummyConfig {
    /// One chunk of main array and two small NVR sectors
    pub fn quick() -> Self {
        Self {
            geometry: Geometry::quick(),
            ..Self::default()
        }
    }

    /// Apply key=value options
    ///
    /// Recognised keys: `geometry=quick|full`, `size=<bytes>`,
    /// `center=<code>`, `window=<codes>`, `slope=<words>`, and
    /// `stuck=<addr>.<bit>[/nvr]` (repeatable).
    pub fn apply_options(&mut self, options: &[(&str, &str)]) -> Result<()> {
        for (key, value) in options {
            match *key {
                "geometry" => match value.to_lowercase().as_str() {
                    "quick" => self.geometry = Geometry::quick(),
                    "full" | "default" => self.geometry = Geometry::default(),
                    _ => {
                        return Err(DummyError::InvalidParameter(format!("geometry: {}", value)));
                    }
                },
                "size" => {
                    let size = parse_number(value)
                        .ok_or_else(|| DummyError::InvalidParameter(format!("size: {}", value)))?;
                    self.geometry.array_size = size;
                    self.geometry.sector_count = size / self.geometry.sector_size.max(1);
                }
                "center" => self.profile.center = parse_code(key, value)?,
                "window" => self.profile.window = parse_code(key, value)?,
                "slope" => {
                    self.profile.slope = value
                        .parse()
                        .map_err(|_| DummyError::InvalidParameter(format!("slope: {}", value)))?;
                }
                "stuck" => self.stuck.push(StuckBit::parse(value)?),
                _ => return Err(DummyError::UnknownOption(key.to_string())),
            }
        }

        self.geometry.validate().map_err(DummyError::Geometry)
    }
}

/// Parse options from key=value pairs on top of the default configuration
pub fn parse_options(options: &[(&str, &str)]) -> Result<DummyConfig> {
    let mut config = DummyConfig::default();
    config.apply_options(options)?;
    Ok(config)
}

fn parse_code(key: &str, value: &str) -> Result<u8> {
    match value.parse::<u8>() {
        Ok(code) if code <= 0x3F => Ok(code),
        _ => Err(DummyError::InvalidParameter(format!("{}: {}", key, value))),
    }
}

fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
