//! Recall command implementation

use mramqual_core::device::MemoryRegion;
use mramqual_core::record::{self, RECORD_OFFSET};

/// Print the trim record persisted in the NVR
pub fn run_recall(device: &mut dyn MemoryRegion) -> Result<(), Box<dyn std::error::Error>> {
    let record = record::load(device)?;

    println!("NVR trim record");
    println!("===============");
    println!("Offset:       0x{:04X}", RECORD_OFFSET);
    println!(
        "Trim code:    {} (stored byte 0x{:02X})",
        record.trim(),
        record.raw_trim()
    );
    println!("Failed bits:  {}", record.quality());
    if record.is_erased() {
        println!();
        println!("Note: the record area is erased; no trim has been persisted.");
    }
    Ok(())
}
