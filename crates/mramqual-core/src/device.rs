//! Memory region facade
//!
//! This module provides the `MemoryRegion` trait through which the core
//! reaches the MRAM driver. The core never touches hardware addresses
//! directly; everything it needs is the narrow operation set below plus the
//! array geometry.

use crate::error::{Error, Result};
use core::ops::{Deref, DerefMut};

/// Largest chunk (program/read unit) the scratch buffers can hold
pub const MAX_CHUNK_SIZE: usize = 4096;

/// Whether the macro's built-in ECC is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EccMode {
    /// ECC disabled: raw array data is read back
    #[default]
    Off,
    /// ECC enabled: single-bit errors per word are corrected by the device
    On,
}

impl EccMode {
    /// Returns true if ECC is enabled
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Which part of the macro an operation addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Main storage array
    Main,
    /// Non-volatile reserved region
    Nvr,
}

impl Target {
    /// Short name used in logs and reports
    pub fn name(self) -> &'static str {
        match self {
            Self::Main => "array",
            Self::Nvr => "nvr",
        }
    }
}

/// Physical layout of the macro
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// Main array size in bytes
    pub array_size: u32,
    /// Bytes transferred per program/read call
    pub chunk_size: u32,
    /// Bytes in one storage word (one ECC codeword)
    pub word_size: u32,
    /// Main array sector size for sector erase
    pub sector_size: u32,
    /// Number of main array sectors swept by a sector-erase stage
    pub sector_count: u32,
    /// Base address of each NVR sector (NVR address space)
    pub nvr_sectors: [u32; 2],
    /// Size of one NVR sector in bytes
    pub nvr_sector_size: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            array_size: 2 * 1024 * 1024,
            chunk_size: 4096,
            word_size: 16,
            sector_size: 8192,
            sector_count: 256,
            nvr_sectors: [0x0, 0x10_0000],
            nvr_sector_size: 2048,
        }
    }
}

impl Geometry {
    /// Quick-test geometry: a single chunk of main array split into two
    /// sectors
    pub fn quick() -> Self {
        Self {
            array_size: 4096,
            sector_size: 2048,
            sector_count: 2,
            ..Self::default()
        }
    }

    /// Number of chunks needed to cover the main array
    pub fn chunk_count(&self) -> u32 {
        self.array_size / self.chunk_size
    }

    /// Number of words in one chunk
    pub fn words_per_chunk(&self) -> u32 {
        self.chunk_size / self.word_size
    }

    /// Check that the sequencer can operate on this geometry
    pub fn validate(&self) -> Result<()> {
        let word = self.word_size;
        if word == 0
            || self.chunk_size == 0
            || self.chunk_size as usize > MAX_CHUNK_SIZE
            || self.nvr_sector_size as usize > MAX_CHUNK_SIZE
            || self.chunk_size % word != 0
            || self.nvr_sector_size % word != 0
            || self.array_size % self.chunk_size != 0
            || self.array_size == 0
            || self.sector_size == 0
            || self.sector_size as u64 * self.sector_count as u64 > self.array_size as u64
            || (self.nvr_sector_size as usize) < crate::record::RECORD_SIZE
        {
            return Err(Error::InvalidGeometry);
        }
        Ok(())
    }
}

/// Driver facade for one MRAM macro
///
/// Addresses are byte offsets into the main array, or into the NVR address
/// space while an NVR bracket is open (see [`NvrAccess`]).
///
/// # Example
///
/// ```ignore
/// fn first_chunk<D: MemoryRegion>(device: &mut D) -> Result<[u8; 4096]> {
///     let mut buf = [0u8; 4096];
///     device.read(0, &mut buf)?;
///     Ok(buf)
/// }
/// ```
pub trait MemoryRegion {
    /// Physical layout of the macro
    fn geometry(&self) -> &Geometry;

    /// Power up and configure the macro
    fn open(&mut self) -> Result<()>;

    /// Release the macro
    fn close(&mut self) -> Result<()>;

    /// Erase `len` bytes starting at `addr`
    fn erase_region(&mut self, addr: u32, len: u32) -> Result<()>;

    /// Erase the sector containing `addr`
    fn erase_sector(&mut self, addr: u32) -> Result<()>;

    /// Erase the whole main array
    fn erase_chip(&mut self) -> Result<()>;

    /// Program `data` at `addr`
    fn program(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Read `buf.len()` bytes starting at `addr`
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Write the sense-amplifier trim configuration
    fn set_trim_code(&mut self, code: u8) -> Result<()>;

    /// Enable or disable ECC
    fn set_ecc(&mut self, mode: EccMode) -> Result<()>;

    /// Route subsequent accesses to the NVR
    fn nvr_open(&mut self) -> Result<()>;

    /// Route subsequent accesses back to the main array
    fn nvr_close(&mut self) -> Result<()>;
}

/// Scoped NVR access
///
/// Opens the NVR on creation and closes it when dropped, so the region is
/// never left addressable after a stage returns early. Use [`NvrAccess::close`]
/// to observe the close result on the success path.
pub struct NvrAccess<'a, D: MemoryRegion + ?Sized> {
    device: &'a mut D,
    open: bool,
}

impl<'a, D: MemoryRegion + ?Sized> NvrAccess<'a, D> {
    /// Open the NVR bracket
    pub fn open(device: &'a mut D) -> Result<Self> {
        device.nvr_open()?;
        log::trace!("NVR access opened");
        Ok(Self { device, open: true })
    }

    /// Close the NVR bracket, reporting driver failures
    pub fn close(mut self) -> Result<()> {
        self.open = false;
        log::trace!("NVR access closed");
        self.device.nvr_close()
    }
}

impl<D: MemoryRegion + ?Sized> Deref for NvrAccess<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        &*self.device
    }
}

impl<D: MemoryRegion + ?Sized> DerefMut for NvrAccess<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        &mut *self.device
    }
}

impl<D: MemoryRegion + ?Sized> Drop for NvrAccess<'_, D> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.device.nvr_close() {
                log::warn!("Failed to close NVR access: {}", e);
            }
        }
    }
}

/// Transmit/receive scratch buffers, one chunk each
///
/// Reused stage to stage: a stage must finish comparing `rx` against `tx`
/// before the next pattern generation overwrites `tx`.
pub struct ScratchBuffers {
    /// Pattern written to (or expected from) the device
    pub tx: [u8; MAX_CHUNK_SIZE],
    /// Data read back from the device
    pub rx: [u8; MAX_CHUNK_SIZE],
}

impl ScratchBuffers {
    /// Create zeroed buffers
    pub const fn new() -> Self {
        Self {
            tx: [0; MAX_CHUNK_SIZE],
            rx: [0; MAX_CHUNK_SIZE],
        }
    }

    /// Borrow both buffers truncated to `len` bytes, with `rx` cleared
    pub fn split(&mut self, len: usize) -> (&mut [u8], &mut [u8]) {
        let rx = &mut self.rx[..len];
        rx.fill(0);
        (&mut self.tx[..len], rx)
    }
}

impl Default for ScratchBuffers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry_is_valid() {
        let geometry = Geometry::default();
        assert!(geometry.validate().is_ok());
        assert_eq!(geometry.chunk_count(), 512);
        assert_eq!(geometry.words_per_chunk(), 256);
    }

    #[test]
    fn test_quick_geometry() {
        let geometry = Geometry::quick();
        assert!(geometry.validate().is_ok());
        assert_eq!(geometry.chunk_count(), 1);
    }

    #[test]
    fn test_invalid_geometry() {
        let geometry = Geometry {
            chunk_size: 4000,
            ..Geometry::default()
        };
        assert_eq!(geometry.validate(), Err(Error::InvalidGeometry));

        let geometry = Geometry {
            chunk_size: 8192,
            ..Geometry::default()
        };
        assert_eq!(geometry.validate(), Err(Error::InvalidGeometry));

        let geometry = Geometry {
            sector_count: 3,
            ..Geometry::quick()
        };
        assert_eq!(geometry.validate(), Err(Error::InvalidGeometry));
    }

    #[test]
    fn test_scratch_split_clears_rx() {
        let mut buffers = ScratchBuffers::new();
        buffers.rx[0] = 0xAB;
        buffers.tx[0] = 0xCD;
        let (tx, rx) = buffers.split(16);
        assert_eq!(tx.len(), 16);
        assert_eq!(tx[0], 0xCD);
        assert!(rx.iter().all(|&b| b == 0));
    }
}
