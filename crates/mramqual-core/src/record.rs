//! Trim record persisted in the NVR
//!
//! The record occupies two storage words at NVR offset 0:
//!
//! | Offset | Size | Content                         |
//! |--------|------|---------------------------------|
//! | 0      | 1    | trim code (low 6 bits valid)    |
//! | 1      | 15   | 0xFF                            |
//! | 16     | 4    | quality (failed bits), LE `u32` |
//! | 20     | 12   | 0xFF                            |

use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::device::{MemoryRegion, NvrAccess};
use crate::error::{Error, Result};

/// Size of the encoded record in bytes
pub const RECORD_SIZE: usize = 32;

/// NVR offset of the record
pub const RECORD_OFFSET: u32 = 0;

/// Valid bits of the stored trim code
pub const TRIM_MASK: u8 = 0x3F;

const FILL: u8 = 0xFF;

/// On-NVR trim record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct TrimRecord {
    trim: u8,
    reserved0: [u8; 15],
    quality: U32,
    reserved1: [u8; 12],
}

impl TrimRecord {
    /// Build a record for the given trim code and quality metric
    pub fn new(trim: u8, quality: u32) -> Self {
        Self {
            trim,
            reserved0: [FILL; 15],
            quality: U32::new(quality),
            reserved1: [FILL; 12],
        }
    }

    /// Decode a record read back from the NVR
    pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Self {
        zerocopy::transmute!(*bytes)
    }

    /// Encode into the on-NVR byte layout
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        zerocopy::transmute!(*self)
    }

    /// Trim code with only the valid bits kept
    pub fn trim(&self) -> u8 {
        self.trim & TRIM_MASK
    }

    /// Stored trim byte as read, unmasked
    pub fn raw_trim(&self) -> u8 {
        self.trim
    }

    /// Quality metric (failed bit count of the accepted trim)
    pub fn quality(&self) -> u32 {
        self.quality.get()
    }

    /// Whether the record area still holds erased cells
    pub fn is_erased(&self) -> bool {
        self.encode().iter().all(|&b| b == FILL)
    }
}

/// Compare written and read-back record bytes
pub fn verify(expected: &[u8], found: &[u8]) -> Result<()> {
    match expected
        .iter()
        .zip(found)
        .enumerate()
        .find(|(_, (e, f))| e != f)
    {
        Some((offset, (&expected, &found))) => Err(Error::PersistenceMismatch {
            offset: offset as u32,
            expected,
            found,
        }),
        None => Ok(()),
    }
}

/// Write the record into the first NVR sector and verify it
///
/// The NVR bracket is opened for the duration of the call and closed on
/// every exit path.
pub fn persist<D: MemoryRegion + ?Sized>(device: &mut D, record: &TrimRecord) -> Result<()> {
    let sector = device.geometry().nvr_sectors[0];
    let bytes = record.encode();
    let mut readback = [0u8; RECORD_SIZE];

    let mut nvr = NvrAccess::open(device)?;
    nvr.program(sector + RECORD_OFFSET, &bytes)?;
    nvr.read(sector + RECORD_OFFSET, &mut readback)?;
    nvr.close()?;

    verify(&bytes, &readback)?;
    log::debug!(
        "Persisted trim record: trim={} quality={}",
        record.trim(),
        record.quality()
    );
    Ok(())
}

/// Read the record from the first NVR sector
pub fn load<D: MemoryRegion + ?Sized>(device: &mut D) -> Result<TrimRecord> {
    let sector = device.geometry().nvr_sectors[0];
    let mut bytes = [0u8; RECORD_SIZE];

    let mut nvr = NvrAccess::open(device)?;
    nvr.read(sector + RECORD_OFFSET, &mut bytes)?;
    nvr.close()?;

    Ok(TrimRecord::decode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layout() {
        let bytes = TrimRecord::new(23, 77).encode();
        assert_eq!(bytes[0], 23);
        assert!(bytes[1..16].iter().all(|&b| b == 0xFF));
        assert_eq!(&bytes[16..20], &77u32.to_le_bytes());
        assert!(bytes[20..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_decode_masks_trim() {
        let mut bytes = TrimRecord::new(23, 77).encode();
        bytes[0] = 0xC5;
        let record = TrimRecord::decode(&bytes);
        assert_eq!(record.trim(), 0x05);
        assert_eq!(record.raw_trim(), 0xC5);
        assert_eq!(record.quality(), 77);
    }

    #[test]
    fn test_erased_record_decodes() {
        let record = TrimRecord::decode(&[0xFF; RECORD_SIZE]);
        assert_eq!(record.trim(), 0x3F);
        assert_eq!(record.quality(), u32::MAX);
        assert!(record.is_erased());
        assert!(!TrimRecord::new(0x3F, u32::MAX).is_erased());
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let expected = TrimRecord::new(23, 77).encode();
        let mut found = expected;
        found[17] ^= 0x01;
        found[30] = 0;
        assert_eq!(
            verify(&expected, &found),
            Err(Error::PersistenceMismatch {
                offset: 17,
                expected: expected[17],
                found: expected[17] ^ 0x01,
            })
        );
        assert_eq!(verify(&expected, &expected), Ok(()));
    }
}
