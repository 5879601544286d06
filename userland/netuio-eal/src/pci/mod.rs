//! PCI enumeration over the netuio driver.

mod channel;
mod device;
mod parse;
mod scan;

pub use channel::{ControlChannel, config_read, config_write, map_hardware};
pub use device::{DeviceList, Inserted, KernelDriver, MemResource, PciDevice};
pub use parse::{PCI_LOCATION_MARKER, ParseError, PciId, parse_hardware_id, parse_location};
pub use scan::{DeviceNode, DeviceTree, ScanError, scan};
