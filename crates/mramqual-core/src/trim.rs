//! Sense-amplifier trim calibration
//!
//! The search sweeps the trim code monotonically from one end of its range
//! towards the other, measuring the failed bit count (FBC) of a fixed
//! checkerboard pattern at each code. The hot corner sweeps down from `max`,
//! the cold corner sweeps up from `min`. Each corner carries its own
//! [`CornerPolicy`]; the two are deliberately not unified.
//!
//! [`TrimSearch`] is the pure decision state machine. [`TrimCalibrator`]
//! drives it against a [`MemoryRegion`].

use core::fmt;

use crate::bitcount::{BitErrorCounter, ErrorBudget};
use crate::device::{EccMode, MemoryRegion, ScratchBuffers};
use crate::error::{Error, Result};
use crate::pattern::{Pattern, PatternGenerator};
use crate::record::{self, TrimRecord};

/// Maximum number of trials kept in a [`CalibrationResult`]
pub const MAX_TRIALS: usize = 64;

/// Temperature corner of a calibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    /// 125 °C, sweeps down from the maximum code
    Hot,
    /// 25 °C / -40 °C, sweeps up from the minimum code
    Cold,
}

impl Corner {
    /// Human-readable temperature label
    pub fn name(self) -> &'static str {
        match self {
            Self::Hot => "125C",
            Self::Cold => "25C/-40C",
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Search constants for one corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CornerPolicy {
    /// Corner the policy applies to (sets the sweep direction)
    pub corner: Corner,
    /// Lowest trim code
    pub min: u8,
    /// Highest trim code
    pub max: u8,
    /// Margin added past the code where errors became acceptable
    pub offset: u8,
    /// FBC difference treated as a plateau
    pub delta: u32,
    /// FBC accepted outright
    pub fbc_spec: u32,
    /// Steps taken back toward the start when FBC keeps rising
    pub backoff: u8,
}

impl CornerPolicy {
    /// Production constants for the 125 °C corner
    pub const fn hot() -> Self {
        Self {
            corner: Corner::Hot,
            min: 0,
            max: 50,
            offset: 2,
            delta: 2,
            fbc_spec: 8,
            backoff: 2,
        }
    }

    /// Production constants for the 25 °C / -40 °C corner
    pub const fn cold() -> Self {
        Self {
            corner: Corner::Cold,
            ..Self::hot()
        }
    }

    /// Policy for the given corner with production constants
    pub const fn for_corner(corner: Corner) -> Self {
        match corner {
            Corner::Hot => Self::hot(),
            Corner::Cold => Self::cold(),
        }
    }

    /// Check that the code range fits the trim register and the step sizes
    /// fit the range
    pub fn validate(&self) -> Result<()> {
        let span = self.max.checked_sub(self.min).ok_or(Error::InvalidPolicy)?;
        if self.max > record::TRIM_MASK || self.offset > span || self.backoff > span {
            return Err(Error::InvalidPolicy);
        }
        Ok(())
    }

    /// First code of the sweep
    pub fn start(&self) -> u8 {
        match self.corner {
            Corner::Hot => self.max,
            Corner::Cold => self.min,
        }
    }

    /// Boundary the sweep runs towards
    pub fn far(&self) -> u8 {
        match self.corner {
            Corner::Hot => self.min,
            Corner::Cold => self.max,
        }
    }

    fn at_far(&self, code: u8) -> bool {
        match self.corner {
            Corner::Hot => code <= self.min,
            Corner::Cold => code >= self.max,
        }
    }

    /// Move `steps` codes in the sweep direction
    fn toward_far(&self, code: u8, steps: u8) -> u8 {
        let code = match self.corner {
            Corner::Hot => code.saturating_sub(steps),
            Corner::Cold => code.saturating_add(steps),
        };
        self.clamp(code)
    }

    /// Move `steps` codes back towards the start
    fn toward_start(&self, code: u8, steps: u8) -> u8 {
        let code = match self.corner {
            Corner::Hot => code.saturating_add(steps),
            Corner::Cold => code.saturating_sub(steps),
        };
        self.clamp(code)
    }

    fn clamp(&self, code: u8) -> u8 {
        code.max(self.min).min(self.max)
    }
}

impl Default for CornerPolicy {
    fn default() -> Self {
        Self::hot()
    }
}

/// Which termination rule accepted the trim code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// The sweep reached its far boundary
    Boundary,
    /// FBC fell within the error spec
    WithinSpec,
    /// FBC stopped changing between two trials
    Plateau,
    /// FBC rose for three consecutive trials
    Rising,
}

/// Accepted trim code and its quality metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Chosen trim code
    pub trim: u8,
    /// FBC associated with the choice
    pub quality: u32,
    /// Rule that fired
    pub rule: Rule,
}

/// Outcome of feeding one FBC measurement to the search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStep {
    /// Measure this code next
    Next(u8),
    /// The search is finished
    Converged(Decision),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchState {
    Init,
    Sweeping { code: u8, pre1: u32, pre2: u32 },
    Converged(Decision),
}

/// Trim search state machine: `Init -> Sweeping -> Converged`
#[derive(Debug, Clone)]
pub struct TrimSearch {
    policy: CornerPolicy,
    state: SearchState,
}

impl TrimSearch {
    /// Create a search for the given policy
    pub fn new(policy: CornerPolicy) -> Self {
        Self {
            policy,
            state: SearchState::Init,
        }
    }

    /// Enter the sweep and return the first code to measure
    pub fn start(&mut self) -> u8 {
        let code = self.policy.start();
        self.state = SearchState::Sweeping {
            code,
            pre1: 0,
            pre2: 0,
        };
        code
    }

    /// Code awaiting a measurement, if the search is sweeping
    pub fn code(&self) -> Option<u8> {
        match self.state {
            SearchState::Sweeping { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Accepted decision, once converged
    pub fn decision(&self) -> Option<Decision> {
        match self.state {
            SearchState::Converged(decision) => Some(decision),
            _ => None,
        }
    }

    /// Feed the FBC measured at the current code
    pub fn observe(&mut self, fbc: u32) -> SearchStep {
        let state = self.state;
        let (code, pre1, pre2) = match state {
            SearchState::Init => (self.start(), 0, 0),
            SearchState::Sweeping { code, pre1, pre2 } => (code, pre1, pre2),
            SearchState::Converged(decision) => return SearchStep::Converged(decision),
        };
        let p = self.policy;

        if p.at_far(code) {
            return self.accept(p.clamp(code), fbc, Rule::Boundary);
        }
        if fbc <= p.fbc_spec {
            return self.accept(p.toward_far(code, p.offset), fbc, Rule::WithinSpec);
        }
        if code == p.start() {
            return self.advance(code, fbc, 0);
        }
        if fbc.abs_diff(pre1) <= p.delta {
            return self.accept(p.toward_far(code, p.offset), fbc, Rule::Plateau);
        }
        if code == p.toward_far(p.start(), 1) {
            return self.advance(code, fbc, pre1);
        }
        if fbc > pre1 && pre1 > pre2 {
            return self.accept(p.toward_start(code, p.backoff), pre2, Rule::Rising);
        }
        self.advance(code, fbc, pre1)
    }

    fn advance(&mut self, code: u8, pre1: u32, pre2: u32) -> SearchStep {
        let next = self.policy.toward_far(code, 1);
        self.state = SearchState::Sweeping {
            code: next,
            pre1,
            pre2,
        };
        SearchStep::Next(next)
    }

    fn accept(&mut self, trim: u8, quality: u32, rule: Rule) -> SearchStep {
        let decision = Decision {
            trim,
            quality,
            rule,
        };
        self.state = SearchState::Converged(decision);
        SearchStep::Converged(decision)
    }
}

/// One sweep measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trial {
    /// Trim code applied
    pub code: u8,
    /// Failed bits read back at that code
    pub fbc: u32,
}

/// How a calibration result was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Measured by a trim sweep
    Swept,
    /// Read back from the persisted NVR record
    Recalled,
}

/// Trim code chosen for one corner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationResult {
    /// Corner the result belongs to
    pub corner: Corner,
    /// Chosen trim code
    pub trim: u8,
    /// FBC associated with the chosen code
    pub quality: u32,
    /// Whether the code was swept or recalled
    pub source: Source,
    /// Rule that accepted the code (swept results only)
    pub rule: Option<Rule>,
    /// Sweep trace, oldest first
    pub trials: heapless::Vec<Trial, MAX_TRIALS>,
}

impl CalibrationResult {
    /// Result restored from a persisted record
    pub fn recalled(corner: Corner, trim: u8, quality: u32) -> Self {
        Self {
            corner,
            trim,
            quality,
            source: Source::Recalled,
            rule: None,
            trials: heapless::Vec::new(),
        }
    }

    /// NVR record carrying this result
    pub fn record(&self) -> TrimRecord {
        TrimRecord::new(self.trim, self.quality)
    }
}

/// Value fused from the two corner results
pub fn fused_trim(hot: u8, cold: u8) -> u8 {
    ((hot as u16 + cold as u16) >> 1) as u8
}

/// Runs a [`TrimSearch`] against a device
#[derive(Debug, Clone)]
pub struct TrimCalibrator {
    policy: CornerPolicy,
}

impl TrimCalibrator {
    /// Create a calibrator for the given corner policy
    pub fn new(policy: CornerPolicy) -> Self {
        Self { policy }
    }

    /// Policy in use
    pub fn policy(&self) -> &CornerPolicy {
        &self.policy
    }

    /// Sweep the trim code and apply the chosen one
    pub fn run<D: MemoryRegion + ?Sized>(&self, device: &mut D) -> Result<CalibrationResult> {
        self.run_with(device, |_| {})
    }

    /// Like [`TrimCalibrator::run`], calling `on_trial` after each measurement
    pub fn run_with<D, F>(&self, device: &mut D, mut on_trial: F) -> Result<CalibrationResult>
    where
        D: MemoryRegion + ?Sized,
        F: FnMut(&Trial),
    {
        let geometry = device.geometry().clone();
        geometry.validate()?;
        self.policy.validate()?;
        let mut buffers = ScratchBuffers::new();

        log::info!(
            "Calibrating trim at {} (codes {}..={})",
            self.policy.corner,
            self.policy.min,
            self.policy.max
        );

        device.set_ecc(EccMode::Off)?;
        device.erase_chip()?;
        let mut generator = PatternGenerator::new(Pattern::Checkerboard, geometry.word_size as usize);
        for chunk in 0..geometry.chunk_count() {
            let (tx, _) = buffers.split(geometry.chunk_size as usize);
            generator.fill(tx);
            device.program(chunk * geometry.chunk_size, tx)?;
        }

        let mut trials = heapless::Vec::new();
        let mut search = TrimSearch::new(self.policy);
        let mut code = search.start();
        let decision = loop {
            device.set_trim_code(code)?;
            let fbc = Self::measure(device, &mut buffers)?;
            let trial = Trial { code, fbc };
            log::debug!("Trim code {}: {} failed bits", code, fbc);
            if trials.push(trial).is_err() {
                log::trace!("Trial trace full, dropping code {}", code);
            }
            on_trial(&trial);

            match search.observe(fbc) {
                SearchStep::Next(next) => code = next,
                SearchStep::Converged(decision) => break decision,
            }
        };

        device.set_trim_code(decision.trim)?;
        log::info!(
            "Trim at {}: code {} with {} failed bits ({:?})",
            self.policy.corner,
            decision.trim,
            decision.quality,
            decision.rule
        );

        Ok(CalibrationResult {
            corner: self.policy.corner,
            trim: decision.trim,
            quality: decision.quality,
            source: Source::Swept,
            rule: Some(decision.rule),
            trials,
        })
    }

    /// Apply the trim code persisted in the NVR instead of sweeping
    pub fn recall<D: MemoryRegion + ?Sized>(&self, device: &mut D) -> Result<CalibrationResult> {
        let record = record::load(device)?;
        device.set_trim_code(record.trim())?;
        log::info!(
            "Recalled trim code {} ({} failed bits) from NVR",
            record.trim(),
            record.quality()
        );
        Ok(CalibrationResult::recalled(
            self.policy.corner,
            record.trim(),
            record.quality(),
        ))
    }

    /// Read the whole array once and count failed bits against checkerboard
    fn measure<D: MemoryRegion + ?Sized>(device: &mut D, buffers: &mut ScratchBuffers) -> Result<u32> {
        let geometry = device.geometry().clone();
        let mut counter = BitErrorCounter::new(ErrorBudget::ZERO);
        let mut generator = PatternGenerator::new(Pattern::Checkerboard, geometry.word_size as usize);

        for chunk in 0..geometry.chunk_count() {
            let addr = chunk * geometry.chunk_size;
            let (tx, rx) = buffers.split(geometry.chunk_size as usize);
            generator.fill(tx);
            device.read(addr, rx)?;
            let bits = counter.count_region(rx, tx);
            log::trace!("Chunk 0x{:08X}: {} failed bits", addr, bits);
        }
        Ok(counter.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed FBC values until convergence, returning the codes measured
    fn sweep(policy: CornerPolicy, fbcs: &[u32]) -> (heapless::Vec<u8, 64>, Decision) {
        let mut search = TrimSearch::new(policy);
        let mut codes = heapless::Vec::new();
        let mut code = search.start();
        for &fbc in fbcs {
            codes.push(code).unwrap();
            match search.observe(fbc) {
                SearchStep::Next(next) => code = next,
                SearchStep::Converged(decision) => return (codes, decision),
            }
        }
        panic!("search did not converge after {} trials", fbcs.len());
    }

    #[test]
    fn test_hot_sweeps_down_to_boundary() {
        // Slowly falling FBC never meets any other rule
        let fbcs: heapless::Vec<u32, 64> = (0..51).map(|i| 1000 - 10 * i).collect();
        let (codes, decision) = sweep(CornerPolicy::hot(), &fbcs);

        assert_eq!(codes.len(), 51);
        assert_eq!(codes[0], 50);
        assert!(codes.windows(2).all(|w| w[1] == w[0] - 1));
        assert_eq!(
            decision,
            Decision {
                trim: 0,
                quality: 500,
                rule: Rule::Boundary
            }
        );
    }

    #[test]
    fn test_cold_sweeps_up_to_boundary() {
        let fbcs: heapless::Vec<u32, 64> = (0..51).map(|i| 1000 - 10 * i).collect();
        let (codes, decision) = sweep(CornerPolicy::cold(), &fbcs);

        assert_eq!(codes[0], 0);
        assert_eq!(*codes.last().unwrap(), 50);
        assert_eq!(decision.trim, 50);
        assert_eq!(decision.rule, Rule::Boundary);
    }

    #[test]
    fn test_boundary_fires_on_single_code_range() {
        for corner in [Corner::Hot, Corner::Cold] {
            let policy = CornerPolicy {
                min: 7,
                max: 7,
                ..CornerPolicy::for_corner(corner)
            };
            let (codes, decision) = sweep(policy, &[5000]);
            assert_eq!(&codes[..], &[7]);
            assert_eq!(decision.trim, 7);
            assert_eq!(decision.quality, 5000);
            assert_eq!(decision.rule, Rule::Boundary);
        }
    }

    #[test]
    fn test_within_spec_applies_offset() {
        let (_, decision) = sweep(CornerPolicy::hot(), &[100, 50, 8]);
        assert_eq!(decision.trim, 46);
        assert_eq!(decision.quality, 8);
        assert_eq!(decision.rule, Rule::WithinSpec);

        let (_, decision) = sweep(CornerPolicy::cold(), &[100, 50, 5]);
        assert_eq!(decision.trim, 4);
        assert_eq!(decision.rule, Rule::WithinSpec);
    }

    #[test]
    fn test_within_spec_on_first_trial() {
        let (codes, decision) = sweep(CornerPolicy::hot(), &[3]);
        assert_eq!(codes.len(), 1);
        assert_eq!(decision.trim, 48);
    }

    #[test]
    fn test_plateau_on_second_trial() {
        let (_, decision) = sweep(CornerPolicy::hot(), &[100, 101]);
        assert_eq!(
            decision,
            Decision {
                trim: 47,
                quality: 101,
                rule: Rule::Plateau
            }
        );
    }

    #[test]
    fn test_plateau_later_in_sweep() {
        let (codes, decision) = sweep(CornerPolicy::cold(), &[100, 60, 59]);
        assert_eq!(&codes[..], &[0, 1, 2]);
        assert_eq!(decision.trim, 4);
        assert_eq!(decision.quality, 59);
        assert_eq!(decision.rule, Rule::Plateau);
    }

    #[test]
    fn test_rising_backs_off_toward_start() {
        let fbcs = [100, 80, 60, 70, 90];
        let (codes, decision) = sweep(CornerPolicy::hot(), &fbcs);
        assert_eq!(&codes[..], &[50, 49, 48, 47, 46]);
        assert_eq!(
            decision,
            Decision {
                trim: 48,
                quality: 60,
                rule: Rule::Rising
            }
        );

        let (codes, decision) = sweep(CornerPolicy::cold(), &fbcs);
        assert_eq!(*codes.last().unwrap(), 4);
        assert_eq!(decision.trim, 2);
        assert_eq!(decision.quality, 60);
    }

    #[test]
    fn test_accepted_code_is_clamped() {
        let policy = CornerPolicy {
            max: 1,
            ..CornerPolicy::hot()
        };
        let (_, decision) = sweep(policy, &[3]);
        assert_eq!(decision.trim, 0);

        let policy = CornerPolicy {
            min: 49,
            ..CornerPolicy::cold()
        };
        let (_, decision) = sweep(policy, &[0]);
        assert_eq!(decision.trim, 50);
    }

    #[test]
    fn test_observe_after_convergence_is_stable() {
        let mut search = TrimSearch::new(CornerPolicy::hot());
        search.start();
        let first = search.observe(0);
        assert_eq!(search.observe(12345), first);
        assert!(search.code().is_none());
        assert!(search.decision().is_some());
    }

    #[test]
    fn test_observe_without_start() {
        let mut search = TrimSearch::new(CornerPolicy::cold());
        assert_eq!(search.observe(1000), SearchStep::Next(1));
    }

    #[test]
    fn test_fused_trim() {
        assert_eq!(fused_trim(30, 20), 25);
        assert_eq!(fused_trim(31, 20), 25);
        assert_eq!(fused_trim(63, 63), 63);
    }

    #[test]
    fn test_policy_validation() {
        assert_eq!(CornerPolicy::hot().validate(), Ok(()));
        assert_eq!(CornerPolicy::cold().validate(), Ok(()));

        let inverted = CornerPolicy {
            min: 60,
            max: 50,
            ..CornerPolicy::cold()
        };
        assert_eq!(inverted.validate(), Err(Error::InvalidPolicy));

        let too_wide = CornerPolicy {
            max: 100,
            ..CornerPolicy::hot()
        };
        assert_eq!(too_wide.validate(), Err(Error::InvalidPolicy));

        let full_register = CornerPolicy {
            max: record::TRIM_MASK,
            ..CornerPolicy::hot()
        };
        assert_eq!(full_register.validate(), Ok(()));

        let long_offset = CornerPolicy {
            min: 10,
            max: 11,
            ..CornerPolicy::hot()
        };
        assert_eq!(long_offset.validate(), Err(Error::InvalidPolicy));
    }
}
