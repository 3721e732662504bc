//! TOML test configuration
//!
//! Every key is optional; missing keys keep the production defaults.
//!
//! ```toml
//! [geometry]
//! array_size = "2 MiB"
//! chunk_size = 4096
//! word_size = 16
//! sector_size = "8 KiB"
//! sector_count = 256
//! nvr_sectors = [0x0, 0x100000]
//! nvr_sector_size = 2048
//!
//! [budget]
//! main = { per_word = 1, per_region = 101 }
//! nvr = { per_word = 1, per_region = 2 }
//!
//! [hot]
//! min = 0
//! max = 50
//! offset = 2
//! delta = 2
//! fbc_spec = 8
//! backoff = 2
//!
//! [cold]
//! offset = 2
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::format;
use std::string::{String, ToString};

use crate::bitcount::ErrorBudget;
use crate::device::Geometry;
use crate::error::Error;
use crate::sequencer::Budgets;
use crate::trim::{Corner, CornerPolicy};

/// Errors from loading a configuration file
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read
    Io(std::io::Error),
    /// The file is not valid TOML for this schema
    Parse(String),
    /// The values do not describe a usable setup
    Invalid(Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config: {}", e),
            Self::Parse(msg) => write!(f, "failed to parse config: {}", msg),
            Self::Invalid(e) => write!(f, "invalid config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Invalid(e) => Some(e),
            Self::Parse(_) => None,
        }
    }
}

/// Complete test configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualConfig {
    /// Array layout
    pub geometry: Geometry,
    /// ECC-off qualification budgets
    pub budgets: Budgets,
    /// 125 °C search policy
    pub hot: CornerPolicy,
    /// 25 °C / -40 °C search policy
    pub cold: CornerPolicy,
}

impl Default for QualConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::default(),
            budgets: Budgets::default(),
            hot: CornerPolicy::hot(),
            cold: CornerPolicy::cold(),
        }
    }
}

impl QualConfig {
    /// Quick profile: one chunk of main array, production budgets
    pub fn quick() -> Self {
        Self {
            geometry: Geometry::quick(),
            ..Self::default()
        }
    }

    /// Search policy for a corner
    pub fn policy(&self, corner: Corner) -> CornerPolicy {
        match corner {
            Corner::Hot => self.hot,
            Corner::Cold => self.cold,
        }
    }

    /// Load a configuration file, starting from `base`
    pub fn from_toml_file(path: impl AsRef<Path>, base: Self) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content, base)
    }

    /// Parse configuration text, starting from `base`
    pub fn from_toml_str(content: &str, base: Self) -> Result<Self, ConfigError> {
        let file: TomlConfigFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut config = base;
        if let Some(geometry) = file.geometry {
            geometry.apply(&mut config.geometry);
        }
        if let Some(budget) = file.budget {
            if let Some(main) = budget.main {
                main.apply(&mut config.budgets.main);
            }
            if let Some(nvr) = budget.nvr {
                nvr.apply(&mut config.budgets.nvr);
            }
        }
        if let Some(hot) = file.hot {
            hot.apply(&mut config.hot);
        }
        if let Some(cold) = file.cold {
            cold.apply(&mut config.cold);
        }

        config.geometry.validate().map_err(ConfigError::Invalid)?;
        config.hot.validate().map_err(ConfigError::Invalid)?;
        config.cold.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfigFile {
    geometry: Option<TomlGeometry>,
    budget: Option<TomlBudgets>,
    hot: Option<TomlPolicy>,
    cold: Option<TomlPolicy>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGeometry {
    #[serde(default, deserialize_with = "deserialize_size")]
    array_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_size")]
    chunk_size: Option<u32>,
    word_size: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_size")]
    sector_size: Option<u32>,
    sector_count: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_addresses")]
    nvr_sectors: Option<[u32; 2]>,
    #[serde(default, deserialize_with = "deserialize_size")]
    nvr_sector_size: Option<u32>,
}

impl TomlGeometry {
    fn apply(self, geometry: &mut Geometry) {
        set(&mut geometry.array_size, self.array_size);
        set(&mut geometry.chunk_size, self.chunk_size);
        set(&mut geometry.word_size, self.word_size);
        set(&mut geometry.sector_size, self.sector_size);
        set(&mut geometry.sector_count, self.sector_count);
        set(&mut geometry.nvr_sectors, self.nvr_sectors);
        set(&mut geometry.nvr_sector_size, self.nvr_sector_size);
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlBudgets {
    main: Option<TomlBudget>,
    nvr: Option<TomlBudget>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlBudget {
    per_word: Option<u32>,
    per_region: Option<u32>,
}

impl TomlBudget {
    fn apply(self, budget: &mut ErrorBudget) {
        set(&mut budget.per_word_max, self.per_word);
        set(&mut budget.per_region_max, self.per_region);
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPolicy {
    min: Option<u8>,
    max: Option<u8>,
    offset: Option<u8>,
    delta: Option<u32>,
    fbc_spec: Option<u32>,
    backoff: Option<u8>,
}

impl TomlPolicy {
    fn apply(self, policy: &mut CornerPolicy) {
        set(&mut policy.min, self.min);
        set(&mut policy.max, self.max);
        set(&mut policy.offset, self.offset);
        set(&mut policy.delta, self.delta);
        set(&mut policy.fbc_spec, self.fbc_spec);
        set(&mut policy.backoff, self.backoff);
    }
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SizeOrInt {
    Int(u32),
    Str(String),
}

impl SizeOrInt {
    fn resolve(self) -> Result<u32, String> {
        match self {
            Self::Int(n) => Ok(n),
            Self::Str(s) => parse_size(&s),
        }
    }
}

/// Deserialize an optional size given as an integer or a string such as
/// "0x1000" or "8 KiB"
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    SizeOrInt::deserialize(deserializer)?
        .resolve()
        .map(Some)
        .map_err(serde::de::Error::custom)
}

fn deserialize_addresses<'de, D>(deserializer: D) -> Result<Option<[u32; 2]>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    let [a, b] = <[SizeOrInt; 2]>::deserialize(deserializer)?;
    let a = a.resolve().map_err(serde::de::Error::custom)?;
    let b = b.resolve().map_err(serde::de::Error::custom)?;
    Ok(Some([a, b]))
}

/// Parse a number that can be hex (0x...), decimal, or carry a KiB/MiB suffix
fn parse_size(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e));
    }
    if let Ok(n) = s.parse::<u32>() {
        return Ok(n);
    }

    let lower = s.to_lowercase();
    let (num, multiplier) = if let Some(n) = lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else {
        return Err(format!("invalid size: {}", s));
    };
    let num: u32 = num.parse().map_err(|_| format!("invalid size: {}", s))?;
    num.checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {}", s))
}
