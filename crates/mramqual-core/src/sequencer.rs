//! Qualification stage sequencing
//!
//! [`QUALIFICATION_STAGES`] is the fixed, ordered battery of pattern passes
//! run after trim calibration. [`QualificationSequencer`] executes it
//! against a device and stops at the first stage whose failed bits exceed
//! the budget.
//!
//! Stage flow for a data stage:
//!
//! 1. Switch ECC if the stage's mode differs from the current one
//! 2. Open the NVR bracket for NVR stages
//! 3. Prepare the region (erase per chunk, chip erase or sector erase)
//! 4. Per chunk: generate the pattern, program it if the stage writes,
//!    read back and check against the stage's budget
//! 5. Close the NVR bracket and fold the stage total into its family

use crate::bitcount::{BitErrorCounter, ErrorBudget};
use crate::device::{EccMode, Geometry, MemoryRegion, NvrAccess, ScratchBuffers, Target};
use crate::error::{Error, Result};
use crate::pattern::{Pattern, PatternGenerator};
use crate::record;
use crate::report::{Failure, NullReporter, Reporter, TestReport, Verdict};
use crate::trim::CalibrationResult;

/// Region preparation done before a stage's chunk loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preparation {
    /// Nothing, the stage relies on the previous stage's contents
    None,
    /// Erase each chunk right before reading it back
    EraseEachChunk,
    /// Erase the whole main array
    ChipErase,
    /// Erase every sector of the target
    SectorErase,
}

impl Preparation {
    /// Short name used in listings
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "-",
            Self::EraseEachChunk => "erase each chunk",
            Self::ChipErase => "chip erase",
            Self::SectorErase => "sector erase",
        }
    }
}

/// What a stage does with the device per chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read back and compare only
    ReadOnly,
    /// Program the pattern, then read back and compare
    ProgramRead,
    /// Program the calibration record and verify it byte for byte
    Persist,
}

impl Access {
    /// Short name used in listings
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadOnly => "read",
            Self::ProgramRead => "program",
            Self::Persist => "persist",
        }
    }
}

/// Stages whose failed bits are also summed against one combined budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Solid-1 and solid-0
    Solid,
    /// Checkerboard and inverse checkerboard
    Checkerboard,
}

impl Family {
    /// Short name used in listings
    pub fn name(self) -> &'static str {
        match self {
            Self::Solid => "solid",
            Self::Checkerboard => "ckbd",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Solid => 0,
            Self::Checkerboard => 1,
        }
    }
}

/// One qualification pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    /// Stage name
    pub name: &'static str,
    /// Pattern written or expected (unused by [`Access::Persist`])
    pub pattern: Pattern,
    /// Region addressed
    pub target: Target,
    /// ECC mode the stage runs with
    pub ecc: EccMode,
    /// Preparation before the chunk loop
    pub preparation: Preparation,
    /// Per-chunk device access
    pub access: Access,
    /// Family the stage's total is added to
    pub family: Option<Family>,
    /// Whether this stage checks the family total
    pub closes_family: bool,
}

impl Stage {
    const fn new(
        name: &'static str,
        target: Target,
        pattern: Pattern,
        ecc: EccMode,
        preparation: Preparation,
        access: Access,
    ) -> Self {
        Self {
            name,
            pattern,
            target,
            ecc,
            preparation,
            access,
            family: None,
            closes_family: false,
        }
    }

    const fn main(
        name: &'static str,
        pattern: Pattern,
        ecc: EccMode,
        preparation: Preparation,
        access: Access,
    ) -> Self {
        Self::new(name, Target::Main, pattern, ecc, preparation, access)
    }

    const fn nvr(
        name: &'static str,
        pattern: Pattern,
        ecc: EccMode,
        preparation: Preparation,
        access: Access,
    ) -> Self {
        Self::new(name, Target::Nvr, pattern, ecc, preparation, access)
    }

    const fn in_family(self, family: Family) -> Self {
        Self {
            family: Some(family),
            ..self
        }
    }

    const fn closing(self, family: Family) -> Self {
        Self {
            family: Some(family),
            closes_family: true,
            ..self
        }
    }

    /// Budget this stage is checked against
    pub fn budget(&self, budgets: &Budgets) -> ErrorBudget {
        if self.ecc.is_on() {
            ErrorBudget::ZERO
        } else {
            budgets.for_target(self.target)
        }
    }
}

use Access::{Persist, ProgramRead, ReadOnly};
use EccMode::{Off, On};
use Family::{Checkerboard as Ckbd, Solid};
use Pattern::{
    Checkerboard, InverseCheckerboard, SolidAll0, SolidAll1, WalkingOne, WalkingZero,
};
use Preparation::{ChipErase, EraseEachChunk, SectorErase};

/// Production stage order
pub static QUALIFICATION_STAGES: [Stage; 27] = [
    Stage::main("wr1", SolidAll1, Off, EraseEachChunk, ReadOnly).in_family(Solid),
    Stage::nvr("wr1-nvr", SolidAll1, Off, EraseEachChunk, ReadOnly).in_family(Solid),
    Stage::main("wr0", SolidAll0, Off, Preparation::None, ProgramRead).closing(Solid),
    Stage::nvr("wr0-nvr", SolidAll0, Off, Preparation::None, ProgramRead).closing(Solid),
    Stage::main("walk1", WalkingOne, On, ChipErase, ProgramRead),
    Stage::nvr("walk1-nvr", WalkingOne, On, SectorErase, ProgramRead),
    Stage::main("walk0", WalkingZero, On, ChipErase, ProgramRead),
    Stage::nvr("walk0-nvr", WalkingZero, On, SectorErase, ProgramRead),
    Stage::main("chip-erase", SolidAll1, Off, ChipErase, ReadOnly),
    Stage::nvr("erase-nvr", SolidAll1, Off, SectorErase, ReadOnly),
    Stage::main("ckbd", Checkerboard, Off, Preparation::None, ProgramRead).in_family(Ckbd),
    Stage::nvr("ckbd-nvr", Checkerboard, Off, Preparation::None, ProgramRead).in_family(Ckbd),
    Stage::main("sector-erase", SolidAll1, Off, SectorErase, ReadOnly),
    Stage::nvr("sector-erase-nvr", SolidAll1, Off, SectorErase, ReadOnly),
    Stage::main("ickbd", InverseCheckerboard, Off, Preparation::None, ProgramRead).closing(Ckbd),
    Stage::nvr("ickbd-nvr", InverseCheckerboard, Off, Preparation::None, ProgramRead)
        .closing(Ckbd),
    Stage::main("chip-erase-ecc", SolidAll1, On, ChipErase, ReadOnly),
    Stage::nvr("erase-nvr-ecc", SolidAll1, On, SectorErase, ReadOnly),
    Stage::main("ckbd-ecc", Checkerboard, On, Preparation::None, ProgramRead),
    Stage::nvr("ckbd-nvr-ecc", Checkerboard, On, Preparation::None, ProgramRead),
    Stage::main("sector-erase-ecc", SolidAll1, On, SectorErase, ReadOnly),
    Stage::nvr("sector-erase-nvr-ecc", SolidAll1, On, SectorErase, ReadOnly),
    Stage::main("ickbd-ecc", InverseCheckerboard, On, Preparation::None, ProgramRead),
    Stage::nvr("ickbd-nvr-ecc", InverseCheckerboard, On, Preparation::None, ProgramRead),
    Stage::main("final-chip-erase-ecc", SolidAll1, On, ChipErase, ReadOnly),
    Stage::nvr("final-erase-nvr-ecc", SolidAll1, On, SectorErase, ReadOnly),
    Stage::nvr("trim-nvr", SolidAll1, On, Preparation::None, Persist),
];

/// ECC-off budgets per target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    /// Main array budget
    pub main: ErrorBudget,
    /// NVR budget
    pub nvr: ErrorBudget,
}

impl Budgets {
    /// Budget for one target
    pub fn for_target(&self, target: Target) -> ErrorBudget {
        match target {
            Target::Main => self.main,
            Target::Nvr => self.nvr,
        }
    }
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            main: ErrorBudget::MAIN,
            nvr: ErrorBudget::NVR,
        }
    }
}

/// Sequencer state: `Idle -> Running(stage) -> Passed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Not started
    Idle,
    /// Executing the given 1-based stage
    Running {
        /// Stage index
        stage: u32,
    },
    /// Every stage passed
    Passed,
    /// Stopped at the first violation
    Failed(Failure),
}

fn target_index(target: Target) -> usize {
    match target {
        Target::Main => 0,
        Target::Nvr => 1,
    }
}

/// Runs the qualification stages against one device
pub struct QualificationSequencer<'a, D: MemoryRegion + ?Sized, R: Reporter = NullReporter> {
    device: &'a mut D,
    stages: &'static [Stage],
    budgets: Budgets,
    reporter: R,
    state: SequencerState,
    ecc: Option<EccMode>,
    family_totals: [[u32; 2]; 2],
    stage_total: u32,
    stages_run: u32,
    buffers: ScratchBuffers,
}

impl<'a, D: MemoryRegion + ?Sized> QualificationSequencer<'a, D> {
    /// Create a sequencer running [`QUALIFICATION_STAGES`] with default budgets
    pub fn new(device: &'a mut D) -> Self {
        Self {
            device,
            stages: &QUALIFICATION_STAGES,
            budgets: Budgets::default(),
            reporter: NullReporter,
            state: SequencerState::Idle,
            ecc: None,
            family_totals: [[0; 2]; 2],
            stage_total: 0,
            stages_run: 0,
            buffers: ScratchBuffers::new(),
        }
    }
}

impl<'a, D: MemoryRegion + ?Sized, R: Reporter> QualificationSequencer<'a, D, R> {
    /// Override the ECC-off budgets
    pub fn with_budgets(mut self, budgets: Budgets) -> Self {
        self.budgets = budgets;
        self
    }

    /// Run a different stage list
    pub fn with_stages(mut self, stages: &'static [Stage]) -> Self {
        self.stages = stages;
        self
    }

    /// Attach a progress reporter
    pub fn with_reporter<R2: Reporter>(self, reporter: R2) -> QualificationSequencer<'a, D, R2> {
        QualificationSequencer {
            device: self.device,
            stages: self.stages,
            budgets: self.budgets,
            reporter,
            state: self.state,
            ecc: self.ecc,
            family_totals: self.family_totals,
            stage_total: self.stage_total,
            stages_run: self.stages_run,
            buffers: self.buffers,
        }
    }

    /// Current state
    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    /// Attached reporter
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Number of stages started in the last run
    pub fn stages_run(&self) -> u32 {
        self.stages_run
    }

    /// Running total of a stage family on one target
    pub fn family_total(&self, family: Family, target: Target) -> u32 {
        self.family_totals[family.index()][target_index(target)]
    }

    /// Mailbox contents for a finished run
    pub fn report(&self, calibration: &CalibrationResult, verdict: &Verdict) -> TestReport {
        TestReport::from_verdict(calibration, verdict, self.stages_run)
    }

    /// Execute every stage, persisting `calibration` in the final stage
    pub fn run(&mut self, calibration: &CalibrationResult) -> Verdict {
        self.state = SequencerState::Idle;
        self.ecc = None;
        self.family_totals = [[0; 2]; 2];
        self.stages_run = 0;

        if let Err(cause) = self.device.geometry().validate() {
            return self.fail(calibration, 0, "geometry", 0, cause);
        }

        let stages = self.stages;
        for (i, stage) in stages.iter().enumerate() {
            let index = i as u32 + 1;
            self.state = SequencerState::Running { stage: index };
            self.stages_run = index;
            self.reporter.stage_started(index, stage);
            log::info!(
                "Stage {}/{}: {} ({}, ECC {})",
                index,
                stages.len(),
                stage.name,
                stage.target.name(),
                if stage.ecc.is_on() { "on" } else { "off" }
            );

            match self.execute(stage, calibration) {
                Ok(failed_bits) => {
                    log::info!("Stage {} passed with {} failed bits", stage.name, failed_bits);
                    self.reporter.stage_passed(index, stage, failed_bits);
                }
                Err(cause) => {
                    let failed_bits = match cause {
                        Error::RegionBudgetExceeded { .. } | Error::PersistenceMismatch { .. } => {
                            cause.failed_bits().unwrap_or(self.stage_total)
                        }
                        _ => self.stage_total,
                    };
                    return self.fail(calibration, index, stage.name, failed_bits, cause);
                }
            }
        }

        self.state = SequencerState::Passed;
        let verdict = Verdict::Passed;
        let report = self.report(calibration, &verdict);
        log::info!("Qualification passed ({} stages)", self.stages_run);
        self.reporter.finished(&report);
        verdict
    }

    fn fail(
        &mut self,
        calibration: &CalibrationResult,
        stage: u32,
        name: &'static str,
        failed_bits: u32,
        cause: Error,
    ) -> Verdict {
        let failure = Failure {
            stage,
            name,
            failed_bits,
            cause,
        };
        log::warn!("Qualification failed: {}", failure);
        self.state = SequencerState::Failed(failure);
        let verdict = Verdict::Failed(failure);
        let report = self.report(calibration, &verdict);
        self.reporter.finished(&report);
        verdict
    }

    fn set_ecc(&mut self, mode: EccMode) -> Result<()> {
        if self.ecc != Some(mode) {
            log::debug!("Switching ECC {:?}", mode);
            self.device.set_ecc(mode)?;
            self.ecc = Some(mode);
        }
        Ok(())
    }

    /// Run one stage, returning its failed bit total
    fn execute(&mut self, stage: &Stage, calibration: &CalibrationResult) -> Result<u32> {
        self.stage_total = 0;
        self.set_ecc(stage.ecc)?;

        if stage.access == Access::Persist {
            record::persist(&mut *self.device, &calibration.record())?;
            return Ok(0);
        }

        let mut pass = Pass::new(stage, self.device.geometry().clone(), &self.budgets);
        let buffers = &mut self.buffers;
        let result = match stage.target {
            Target::Main => pass.run(&mut *self.device, buffers),
            Target::Nvr => NvrAccess::open(&mut *self.device).and_then(|mut nvr| {
                pass.run(&mut *nvr, buffers)?;
                nvr.close()
            }),
        };
        self.stage_total = pass.counter.total();
        result?;

        self.add_to_family(stage)?;
        Ok(self.stage_total)
    }

    fn add_to_family(&mut self, stage: &Stage) -> Result<()> {
        let Some(family) = stage.family else {
            return Ok(());
        };
        let total = &mut self.family_totals[family.index()][target_index(stage.target)];
        *total = total.saturating_add(self.stage_total);

        if stage.closes_family {
            let budget = self.budgets.for_target(stage.target).per_region_max;
            log::debug!(
                "{:?} family on {}: {} failed bits (budget {})",
                family,
                stage.target.name(),
                *total,
                budget
            );
            if *total > budget {
                return Err(Error::RegionBudgetExceeded {
                    failed_bits: *total,
                    budget,
                });
            }
        }
        Ok(())
    }
}

/// Chunk loop of one data stage
struct Pass<'s> {
    stage: &'s Stage,
    geometry: Geometry,
    counter: BitErrorCounter,
    generator: PatternGenerator,
}

impl<'s> Pass<'s> {
    fn new(stage: &'s Stage, geometry: Geometry, budgets: &Budgets) -> Self {
        let word_size = geometry.word_size as usize;
        Self {
            stage,
            counter: BitErrorCounter::for_ecc(budgets.for_target(stage.target), stage.ecc),
            generator: PatternGenerator::new(stage.pattern, word_size),
            geometry,
        }
    }

    fn run<D: MemoryRegion + ?Sized>(&mut self, device: &mut D, buffers: &mut ScratchBuffers) -> Result<()> {
        self.prepare(device)?;
        match self.stage.target {
            Target::Main => {
                let size = self.geometry.chunk_size;
                for chunk in 0..self.geometry.chunk_count() {
                    self.chunk(device, buffers, chunk * size, size)?;
                }
            }
            Target::Nvr => {
                let size = self.geometry.nvr_sector_size;
                for base in self.geometry.nvr_sectors {
                    self.chunk(device, buffers, base, size)?;
                }
            }
        }
        Ok(())
    }

    fn prepare<D: MemoryRegion + ?Sized>(&self, device: &mut D) -> Result<()> {
        match (self.stage.preparation, self.stage.target) {
            (Preparation::None | Preparation::EraseEachChunk, _) => {}
            (Preparation::ChipErase, _) => device.erase_chip()?,
            (Preparation::SectorErase, Target::Main) => {
                for sector in 0..self.geometry.sector_count {
                    device.erase_sector(sector * self.geometry.sector_size)?;
                }
            }
            (Preparation::SectorErase, Target::Nvr) => {
                for base in self.geometry.nvr_sectors {
                    device.erase_sector(base)?;
                }
            }
        }
        Ok(())
    }

    fn chunk<D: MemoryRegion + ?Sized>(
        &mut self,
        device: &mut D,
        buffers: &mut ScratchBuffers,
        addr: u32,
        len: u32,
    ) -> Result<()> {
        let (tx, rx) = buffers.split(len as usize);
        self.generator.fill(tx);

        if self.stage.preparation == Preparation::EraseEachChunk {
            device.erase_region(addr, len)?;
        }
        if self.stage.access == Access::ProgramRead {
            device.program(addr, tx)?;
        }
        device.read(addr, rx)?;

        let bits = self
            .counter
            .check_region(rx, tx, self.geometry.word_size as usize)?;
        log::trace!(
            "{} 0x{:08X}: {} failed bits (total {})",
            self.stage.name,
            addr,
            bits,
            self.counter.total()
        );
        Ok(())
    }
}
