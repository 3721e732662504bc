//! Device registration and dispatch
//!
//! This module provides a centralized registry for the devices the tool can
//! open, with support for feature-gated inclusion and dynamic help text.

use mramqual_core::device::{Geometry, MemoryRegion};

/// Information about a device backend
pub struct DeviceInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available devices (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    #[cfg(feature = "dummy")]
    devices.push(DeviceInfo {
        name: "dummy",
        aliases: &["emulator"],
        description: "In-memory MRAM emulator (center=,window=,slope=,stuck=<addr>.<bit>[/nvr],size=,geometry=quick|full)",
    });

    devices
}

/// Generate help text listing all available devices
pub fn device_help() -> String {
    let devices = available_devices();

    if devices.is_empty() {
        return "No devices available (recompile with device features enabled)".to_string();
    }

    let mut help = String::from("Available devices:\n");
    for d in &devices {
        help.push_str(&format!("  {:12} - {}\n", d.name, d.description));
        if !d.aliases.is_empty() {
            help.push_str(&format!("  {:12}   aliases: {}\n", "", d.aliases.join(", ")));
        }
    }
    help
}

/// Generate a short list of device names for CLI help
pub fn device_names_short() -> String {
    let devices = available_devices();
    let names: Vec<&str> = devices.iter().map(|d| d.name).collect();
    names.join(", ")
}

/// Check if a device name matches any available device
pub fn find_device(name: &str) -> Option<&'static str> {
    available_devices()
        .into_iter()
        .find(|d| d.name == name || d.aliases.iter().any(|a| *a == name))
        .map(|d| d.name)
}

/// Open the specified device, run `f` on it and close it again
///
/// The device string can be just the name (e.g., "dummy") or include
/// parameters (e.g., "dummy:stuck=0x100.0,center=24"). `geometry` is the
/// layout from the test configuration; device parameters may override it.
#[allow(unused_variables)]
pub fn with_device<F>(device: &str, geometry: &Geometry, f: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut dyn MemoryRegion) -> Result<(), Box<dyn std::error::Error>>,
{
    let (name, options) = parse_device_string(device);

    let canonical_name = match find_device(name) {
        Some(n) => n,
        None => return Err(unknown_device_error(name)),
    };

    match canonical_name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            let mut config = mramqual_dummy::DummyConfig {
                geometry: geometry.clone(),
                ..Default::default()
            };
            config.apply_options(&options)?;
            log::info!(
                "Opening MRAM emulator ({} byte array, trim center {})",
                config.geometry.array_size,
                config.profile.center
            );
            let mut mram = mramqual_dummy::DummyMram::new(config);
            run_open(&mut mram, f)
        }

        _ => Err(unknown_device_error(name)),
    }
}

/// Bracket `f` between `open` and `close`, closing even when `f` fails
fn run_open<F>(device: &mut dyn MemoryRegion, f: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut dyn MemoryRegion) -> Result<(), Box<dyn std::error::Error>>,
{
    device.open()?;
    let result = f(&mut *device);
    if let Err(e) = device.close() {
        log::warn!("Failed to close device: {}", e);
    }
    result
}

/// Parse a device string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_device_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn unknown_device_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown device: {}\n\n", name);
    msg.push_str(&device_help());
    msg.push_str("\nUse 'mramqual list-devices' for more details");
    msg.into()
}
