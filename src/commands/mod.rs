//! CLI command implementations
//!
//! Every device command receives an opened `&mut dyn MemoryRegion`, so the
//! same implementations work for any backend registered in `devices`.

mod calibrate;
mod list;
mod progress;
mod qualify;
mod recall;
mod stages;

pub use calibrate::run_calibrate;
pub use list::list_devices;
pub use qualify::run_qualify;
pub use recall::run_recall;
pub use stages::list_stages;
