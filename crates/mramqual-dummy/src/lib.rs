//! mramqual-dummy - In-memory MRAM macro emulator
//!
//! This crate provides a [`MemoryRegion`] implementation backed by plain
//! buffers. It models the behaviour the qualification engine can observe:
//! erased cells read 0xFF, program overwrites, NVR sectors are only
//! reachable inside an NVR bracket, ECC corrects one failed bit per word,
//! and the read margin depends on the trim code.

pub mod config;
pub mod error;


pub use config::{parse_options, DummyConfig, StuckBit, TrimProfile};
pub use error::{DummyError, Result};

use mramqual_core::bitcount::failed_bits;
use mramqual_core::device::{EccMode, Geometry, MemoryRegion, Target};
use mramqual_core::DriverFailure;

/// Operation counters, useful to check what a run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    /// Erase calls of any kind
    pub erases: u32,
    /// Program calls
    pub programs: u32,
    /// Read calls
    pub reads: u32,
    /// Trim register writes
    pub trim_writes: u32,
    /// NVR brackets opened
    pub nvr_opens: u32,
}

/// Emulated MRAM macro
pub struct DummyMram {
    config: DummyConfig,
    main: Vec<u8>,
    nvr: [Vec<u8>; 2],
    opened: bool,
    nvr_open: bool,
    ecc: EccMode,
    trim: u8,
    stats: DummyStats,
}

impl DummyMram {
    /// Create an erased macro with the given configuration
    ///
    /// The trim register powers up at the profile's center code.
    pub fn new(config: DummyConfig) -> Self {
        let nvr_size = config.geometry.nvr_sector_size as usize;
        Self {
            main: vec![0xFF; config.geometry.array_size as usize],
            nvr: [vec![0xFF; nvr_size], vec![0xFF; nvr_size]],
            trim: config.profile.center,
            config,
            opened: false,
            nvr_open: false,
            ecc: EccMode::Off,
            stats: DummyStats::default(),
        }
    }

    /// Create a macro with the production geometry
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Raw main array contents, ignoring defects
    pub fn data(&self) -> &[u8] {
        &self.main
    }

    /// Raw contents of one NVR sector, `None` past the second sector
    pub fn nvr_data(&self, sector: usize) -> Option<&[u8]> {
        self.nvr.get(sector).map(Vec::as_slice)
    }

    /// Current trim register value
    pub fn trim_code(&self) -> u8 {
        self.trim
    }

    /// Current ECC mode
    pub fn ecc(&self) -> EccMode {
        self.ecc
    }

    /// Whether an NVR bracket is open
    pub fn nvr_is_open(&self) -> bool {
        self.nvr_open
    }

    /// Operation counters
    pub fn stats(&self) -> DummyStats {
        self.stats
    }

    /// Add a defective cell
    pub fn add_stuck_bit(&mut self, stuck: StuckBit) {
        self.config.stuck.push(stuck);
    }

    fn target(&self) -> Target {
        if self.nvr_open {
            Target::Nvr
        } else {
            Target::Main
        }
    }

    fn ensure_open(&self) -> mramqual_core::Result<()> {
        if self.opened {
            Ok(())
        } else {
            Err(DriverFailure::Open.into())
        }
    }

    /// Backing buffer and its base address for an access
    fn region(&mut self, addr: u32, len: usize) -> mramqual_core::Result<(&mut [u8], u32)> {
        self.ensure_open()?;
        let end = addr as u64 + len as u64;
        if self.nvr_open {
            let size = self.config.geometry.nvr_sector_size as u64;
            for (i, &base) in self.config.geometry.nvr_sectors.iter().enumerate() {
                if addr >= base && end <= base as u64 + size {
                    return Ok((&mut self.nvr[i][..], base));
                }
            }
            Err(DriverFailure::OutOfBounds { addr }.into())
        } else if end <= self.main.len() as u64 {
            Ok((&mut self.main[..], 0))
        } else {
            Err(DriverFailure::OutOfBounds { addr }.into())
        }
    }

    /// Apply stuck cells and weak reads to data just copied out of storage
    fn apply_defects(&self, target: Target, addr: u32, buf: &mut [u8]) {
        for stuck in self.config.stuck.iter().filter(|s| s.target == target) {
            if stuck.addr >= addr && ((stuck.addr - addr) as usize) < buf.len() {
                buf[(stuck.addr - addr) as usize] &= !stuck.mask();
            }
        }

        if target == Target::Main {
            let word_size = self.config.geometry.word_size as usize;
            let weak = self.config.profile.weak_words(self.trim);
            let first_word = addr as usize / word_size;
            for (i, word) in buf.chunks_mut(word_size).enumerate() {
                if ((first_word + i) as u64) < weak as u64 {
                    word[0] ^= 0x01;
                }
            }
        }
    }
}

impl MemoryRegion for DummyMram {
    fn geometry(&self) -> &Geometry {
        &self.config.geometry
    }

    fn open(&mut self) -> mramqual_core::Result<()> {
        log::debug!(
            "dummy: open ({} byte array, trim {})",
            self.main.len(),
            self.trim
        );
        self.opened = true;
        Ok(())
    }

    fn close(&mut self) -> mramqual_core::Result<()> {
        log::debug!("dummy: close");
        self.opened = false;
        self.nvr_open = false;
        Ok(())
    }

    fn erase_region(&mut self, addr: u32, len: u32) -> mramqual_core::Result<()> {
        self.stats.erases += 1;
        let (mem, base) = self.region(addr, len as usize)?;
        let start = (addr - base) as usize;
        mem[start..start + len as usize].fill(0xFF);
        Ok(())
    }

    fn erase_sector(&mut self, addr: u32) -> mramqual_core::Result<()> {
        self.stats.erases += 1;
        let (start, size) = if self.nvr_open {
            (addr, self.config.geometry.nvr_sector_size)
        } else {
            let size = self.config.geometry.sector_size;
            (addr - addr % size, size)
        };
        let (mem, base) = self.region(start, size as usize)?;
        let offset = (start - base) as usize;
        mem[offset..offset + size as usize].fill(0xFF);
        Ok(())
    }

    fn erase_chip(&mut self) -> mramqual_core::Result<()> {
        self.ensure_open()?;
        self.stats.erases += 1;
        self.main.fill(0xFF);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> mramqual_core::Result<()> {
        self.stats.programs += 1;
        let (mem, base) = self.region(addr, data.len())?;
        let start = (addr - base) as usize;
        mem[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> mramqual_core::Result<()> {
        self.stats.reads += 1;
        let target = self.target();
        let (mem, base) = self.region(addr, buf.len())?;
        let start = (addr - base) as usize;
        buf.copy_from_slice(&mem[start..start + buf.len()]);

        if self.ecc.is_on() {
            let stored = buf.to_vec();
            self.apply_defects(target, addr, buf);
            let word_size = self.config.geometry.word_size as usize;
            for (word, good) in buf.chunks_mut(word_size).zip(stored.chunks(word_size)) {
                if failed_bits(word, good) <= 1 {
                    word.copy_from_slice(good);
                }
            }
        } else {
            self.apply_defects(target, addr, buf);
        }
        Ok(())
    }

    fn set_trim_code(&mut self, code: u8) -> mramqual_core::Result<()> {
        if code > 0x3F {
            return Err(DriverFailure::Trim { code }.into());
        }
        self.stats.trim_writes += 1;
        self.trim = code;
        Ok(())
    }

    fn set_ecc(&mut self, mode: EccMode) -> mramqual_core::Result<()> {
        self.ecc = mode;
        Ok(())
    }

    fn nvr_open(&mut self) -> mramqual_core::Result<()> {
        self.ensure_open().map_err(|_| DriverFailure::Nvr)?;
        if self.nvr_open {
            return Err(DriverFailure::Nvr.into());
        }
        self.stats.nvr_opens += 1;
        self.nvr_open = true;
        Ok(())
    }

    fn nvr_close(&mut self) -> mramqual_core::Result<()> {
        if !self.nvr_open {
            return Err(DriverFailure::Nvr.into());
        }
        self.nvr_open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mramqual_core::device::NvrAccess;
    use mramqual_core::Error;

    fn open_quick() -> DummyMram {
        let mut mram = DummyMram::new(DummyConfig::quick());
        mram.open().unwrap();
        mram
    }

    #[test]
    fn test_requires_open() {
        let mut mram = DummyMram::new(DummyConfig::quick());
        let mut buf = [0u8; 16];
        assert_eq!(
            mram.read(0, &mut buf),
            Err(Error::Driver(DriverFailure::Open))
        );
        assert_eq!(mram.erase_chip(), Err(Error::Driver(DriverFailure::Open)));
    }

    #[test]
    fn test_program_read_erase() {
        let mut mram = open_quick();
        mram.program(0x100, &[0x12, 0x34, 0x56, 0x78]).unwrap();

        let mut buf = [0u8; 4];
        mram.read(0x100, &mut buf).unwrap();
        assert_eq!(buf, [0x12, 0x34, 0x56, 0x78]);

        // Program overwrites rather than ANDing
        mram.program(0x100, &[0xFF; 4]).unwrap();
        mram.read(0x100, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 4]);

        mram.program(0x100, &[0x00; 4]).unwrap();
        mram.erase_sector(0x180).unwrap();
        mram.read(0x100, &mut buf).unwrap();
        assert_eq!(buf, [0xFF; 4]);
        assert_eq!(mram.stats().programs, 3);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut mram = open_quick();
        assert_eq!(
            mram.program(4090, &[0u8; 16]),
            Err(Error::Driver(DriverFailure::OutOfBounds { addr: 4090 }))
        );
    }

    #[test]
    fn test_nvr_is_separate_from_main() {
        let mut mram = open_quick();
        {
            let mut nvr = NvrAccess::open(&mut mram).unwrap();
            nvr.program(0x10_0000, &[0xA5; 16]).unwrap();
            nvr.close().unwrap();
        }
        assert_eq!(mram.nvr_data(1).unwrap()[..16], [0xA5; 16]);
        assert!(mram.nvr_data(2).is_none());
        assert!(mram.data().iter().all(|&b| b == 0xFF));

        // NVR addresses are not mapped outside a bracket
        let mut buf = [0u8; 16];
        assert!(mram.read(0x10_0000, &mut buf).is_err());
    }

    #[test]
    fn test_nvr_bracket_errors() {
        let mut mram = open_quick();
        assert_eq!(mram.nvr_close(), Err(Error::Driver(DriverFailure::Nvr)));
        mram.nvr_open().unwrap();
        assert_eq!(mram.nvr_open(), Err(Error::Driver(DriverFailure::Nvr)));
        mram.nvr_close().unwrap();
        assert_eq!(mram.stats().nvr_opens, 1);
    }

    #[test]
    fn test_weak_reads_follow_trim() {
        let mut mram = open_quick();
        mram.program(0, &[0x00; 64]).unwrap();
        let mut buf = [0u8; 64];

        mram.read(0, &mut buf).unwrap();
        assert_eq!(failed_bits(&buf, &[0x00; 64]), 0);

        // Two codes off center: 16 weak words, 4 of them in this buffer
        mram.set_trim_code(22).unwrap();
        mram.read(0, &mut buf).unwrap();
        assert_eq!(failed_bits(&buf, &[0x00; 64]), 4);

        mram.set_ecc(EccMode::On).unwrap();
        mram.read(0, &mut buf).unwrap();
        assert_eq!(failed_bits(&buf, &[0x00; 64]), 0);
    }

    #[test]
    fn test_ecc_corrects_single_stuck_bit_only() {
        let mut mram = open_quick();
        mram.add_stuck_bit(StuckBit::main(0x20, 0));
        mram.add_stuck_bit(StuckBit::main(0x40, 0));
        mram.add_stuck_bit(StuckBit::main(0x41, 0));
        let mut buf = [0u8; 0x50];

        mram.read(0, &mut buf).unwrap();
        assert_eq!(failed_bits(&buf, &[0xFF; 0x50]), 3);

        mram.set_ecc(EccMode::On).unwrap();
        mram.read(0, &mut buf).unwrap();
        assert_eq!(buf[0x20], 0xFF);
        assert_eq!(failed_bits(&buf, &[0xFF; 0x50]), 2);
    }

    #[test]
    fn test_trim_range() {
        let mut mram = open_quick();
        assert_eq!(
            mram.set_trim_code(0x40),
            Err(Error::Driver(DriverFailure::Trim { code: 0x40 }))
        );
        assert_eq!(mram.trim_code(), 20);
    }
}
