//! In-memory MRAM used by the core unit tests
//!
//! Behaves like the macro as far as the engine can observe:
//! - Memory starts as all 0xFF (erased state)
//! - Erase operations set regions to 0xFF
//! - Program overwrites bytes
//! - NVR is only addressable inside an nvr_open/nvr_close bracket
//! - With ECC on, one failed bit per word is corrected on read

use std::vec;
use std::vec::Vec;

use crate::bitcount::failed_bits;
use crate::device::{EccMode, Geometry, MemoryRegion, Target};
use crate::error::{DriverFailure, Result};

/// Record of one driver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    Open,
    Close,
    EraseRegion(Target, u32, u32),
    EraseSector(Target, u32),
    EraseChip,
    Program(Target, u32, usize),
    Read(Target, u32, usize),
    Trim(u8),
    Ecc(EccMode),
    NvrOpen,
    NvrClose,
}

pub(crate) struct MockMram {
    geometry: Geometry,
    main: Vec<u8>,
    nvr: [Vec<u8>; 2],
    nvr_open: bool,
    ecc: EccMode,
    trim: u8,
    /// Stuck-at-0 bits: (target, address, mask)
    stuck: Vec<(Target, u32, u8)>,
    /// Weak bits per trim code, one flipped bit per word from word 0
    weak: [u32; 64],
    fail_program: Option<(Target, u32)>,
    ops: Vec<Op>,
}

impl MockMram {
    pub(crate) fn new() -> Self {
        Self::with_geometry(Geometry::quick())
    }

    pub(crate) fn with_geometry(geometry: Geometry) -> Self {
        let nvr_size = geometry.nvr_sector_size as usize;
        Self {
            main: vec![0xFF; geometry.array_size as usize],
            nvr: [vec![0xFF; nvr_size], vec![0xFF; nvr_size]],
            geometry,
            nvr_open: false,
            ecc: EccMode::Off,
            trim: 0,
            stuck: Vec::new(),
            weak: [0; 64],
            fail_program: None,
            ops: Vec::new(),
        }
    }

    pub(crate) fn stick_low(&mut self, target: Target, addr: u32, mask: u8) {
        self.stuck.push((target, addr, mask));
    }

    pub(crate) fn set_weak_bits(&mut self, f: impl Fn(u8) -> u32) {
        for (code, weak) in self.weak.iter_mut().enumerate() {
            *weak = f(code as u8);
        }
    }

    pub(crate) fn fail_program_at(&mut self, target: Target, addr: u32) {
        self.fail_program = Some((target, addr));
    }

    pub(crate) fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub(crate) fn nvr_is_open(&self) -> bool {
        self.nvr_open
    }

    pub(crate) fn trim(&self) -> u8 {
        self.trim
    }

    pub(crate) fn ecc(&self) -> EccMode {
        self.ecc
    }

    pub(crate) fn main(&self) -> &[u8] {
        &self.main
    }

    fn target(&self) -> Target {
        if self.nvr_open {
            Target::Nvr
        } else {
            Target::Main
        }
    }

    /// Storage slice and its base address for an access
    fn region(&mut self, addr: u32, len: usize) -> Result<(&mut [u8], u32)> {
        let end = addr as u64 + len as u64;
        if self.nvr_open {
            let size = self.geometry.nvr_sector_size;
            for (i, &base) in self.geometry.nvr_sectors.iter().enumerate() {
                if addr >= base && end <= base as u64 + size as u64 {
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
}

impl MemoryRegion for MockMram {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn open(&mut self) -> Result<()> {
        self.ops.push(Op::Open);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.ops.push(Op::Close);
        Ok(())
    }

    fn erase_region(&mut self, addr: u32, len: u32) -> Result<()> {
        self.ops.push(Op::EraseRegion(self.target(), addr, len));
        let (mem, base) = self.region(addr, len as usize)?;
        let start = (addr - base) as usize;
        mem[start..start + len as usize].fill(0xFF);
        Ok(())
    }

    fn erase_sector(&mut self, addr: u32) -> Result<()> {
        self.ops.push(Op::EraseSector(self.target(), addr));
        if self.nvr_open {
            let (mem, _) = self.region(addr, 1)?;
            mem.fill(0xFF);
        } else {
            let size = self.geometry.sector_size;
            let start = addr - addr % size;
            let (mem, _) = self.region(start, size as usize)?;
            mem[start as usize..(start + size) as usize].fill(0xFF);
        }
        Ok(())
    }

    fn erase_chip(&mut self) -> Result<()> {
        self.ops.push(Op::EraseChip);
        self.main.fill(0xFF);
        Ok(())
    }

    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let target = self.target();
        self.ops.push(Op::Program(target, addr, data.len()));
        if self.fail_program == Some((target, addr)) {
            return Err(DriverFailure::Program { addr }.into());
        }
        let (mem, base) = self.region(addr, data.len())?;
        let start = (addr - base) as usize;
        mem[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let target = self.target();
        self.ops.push(Op::Read(target, addr, buf.len()));
        let word_size = self.geometry.word_size as usize;
        let weak = if target == Target::Main {
            self.weak[(self.trim & 0x3F) as usize]
        } else {
            0
        };
        let ecc = self.ecc;
        let stuck = self.stuck.clone();

        let (mem, base) = self.region(addr, buf.len())?;
        let start = (addr - base) as usize;
        let stored = &mem[start..start + buf.len()];
        buf.copy_from_slice(stored);

        for (t, a, mask) in stuck {
            if t == target && a >= addr && ((a - addr) as usize) < buf.len() {
                buf[(a - addr) as usize] &= !mask;
            }
        }
        for (i, word) in buf.chunks_mut(word_size).enumerate() {
            let index = addr as usize / word_size + i;
            if (index as u32) < weak {
                word[0] ^= 0x01;
            }
        }
        if ecc.is_on() {
            for (word, good) in buf.chunks_mut(word_size).zip(stored.chunks(word_size)) {
                if failed_bits(word, good) <= 1 {
                    word.copy_from_slice(good);
                }
            }
        }
        Ok(())
    }

    fn set_trim_code(&mut self, code: u8) -> Result<()> {
        self.ops.push(Op::Trim(code));
        self.trim = code;
        Ok(())
    }

    fn set_ecc(&mut self, mode: EccMode) -> Result<()> {
        self.ops.push(Op::Ecc(mode));
        self.ecc = mode;
        Ok(())
    }

    fn nvr_open(&mut self) -> Result<()> {
        self.ops.push(Op::NvrOpen);
        self.nvr_open = true;
        Ok(())
    }

    fn nvr_close(&mut self) -> Result<()> {
        self.ops.push(Op::NvrClose);
        self.nvr_open = false;
        Ok(())
    }
}
