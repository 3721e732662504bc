//! List commands implementation

use crate::devices;

/// List all supported devices
pub fn list_devices() {
    let devices = devices::available_devices();
    if devices.is_empty() {
        println!("No devices available (recompile with device features enabled)");
        return;
    }

    println!("Supported devices:");
    println!();
    for d in &devices {
        println!("  {:10} - {}", d.name, d.description);
        if !d.aliases.is_empty() {
            println!("  {:10}   aliases: {}", "", d.aliases.join(", "));
        }
    }
}
