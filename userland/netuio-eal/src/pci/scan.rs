//! Device enumeration.
//!
//! Every node the platform reports is a candidate. A candidate becomes a
//! [`PciDevice`] only if all of the following hold; otherwise it is skipped
//! and the walk continues:
//!
//! 1. it has a location string naming a PCI function,
//! 2. its hardware id parses,
//! 3. it exposes a netuio interface,
//! 4. Map Hardware succeeds on that interface,
//! 5. its scratch pool fits a free memory segment list.
//!
//! A device this process already mapped is counted but not opened again, so
//! every published memory segment list stays backed by a live mapping.

use crate::memory::{MemConfig, MemsegError};
use crate::pci::channel::{self, ControlChannel};
use crate::pci::device::{DeviceList, PciDevice};
use crate::pci::parse::{ParseError, parse_hardware_id, parse_location};
use core::fmt;
use log::{debug, error, info};
use netuio_abi::{DriverName, NetuioStatus};

/// A device as reported by the platform's device tree.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceNode {
    /// Platform identifier used to open the device's interface.
    pub instance_id: String,
    /// e.g. `PCI bus 5, device 0, function 0`
    pub location: Option<String>,
    /// e.g. `PCI\VEN_8086&DEV_153A&SUBSYS_00008086&REV_04`
    pub hardware_id: Option<String>,
}

/// The platform's device tree.
pub trait DeviceTree {
    /// Present devices, narrowed to setup class `class` when given.
    fn devices(&self, class: Option<&str>) -> Result<Vec<DeviceNode>, ScanError>;

    /// Open the netuio interface of `node`; `None` if it has none.
    fn open_interface(&self, node: &DeviceNode) -> Option<Box<dyn ControlChannel>>;
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("cannot enumerate devices: {0}")]
    Enumerate(String),
    #[error("no PCI devices found")]
    NoDevices,
}

/// Why a candidate was dropped.
#[derive(Debug)]
enum Skip {
    NoLocation,
    NoHardwareId,
    Parse(ParseError),
    NoInterface,
    Map(NetuioStatus),
    Memseg(MemsegError),
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoLocation => f.write_str("no location information"),
            Self::NoHardwareId => f.write_str("no hardware id"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::NoInterface => f.write_str("no netuio interface"),
            Self::Map(status) => write!(f, "map hardware failed: {status}"),
            Self::Memseg(e) => write!(f, "cannot store memory segments: {e}"),
        }
    }
}

/// Walk `tree`, map every usable device and add it to `devices`.
///
/// Each mapped scratch pool is published into `mem`. Returns the number of
/// devices found in this pass, failing with [`ScanError::NoDevices`] if there
/// are none.
pub fn scan(
    tree: &dyn DeviceTree,
    class: Option<&str>,
    devices: &mut DeviceList,
    mem: &mut MemConfig,
) -> Result<usize, ScanError> {
    let mut found = 0usize;
    for node in tree.devices(class)? {
        match probe(tree, &node, devices, mem) {
            Ok(None) => found += 1,
            Ok(Some(device)) => {
                debug!(
                    "{}: {} ({:04x}:{:04x}) at {}",
                    node.instance_id,
                    device.name(),
                    device.id.vendor_id,
                    device.id.device_id,
                    DriverName(device.addr.to_wire()).user_path()
                );
                devices.insert(device);
                found += 1;
            }
            Err(skip @ Skip::Memseg(_)) => error!("{}: {skip}", node.instance_id),
            Err(skip) => debug!("{}: skipped, {skip}", node.instance_id),
        }
    }

    info!("PCI scan found {found} devices");
    if found == 0 {
        return Err(ScanError::NoDevices);
    }
    Ok(found)
}

/// `Ok(None)` for a device this process already holds a mapping of.
fn probe(
    tree: &dyn DeviceTree,
    node: &DeviceNode,
    devices: &DeviceList,
    mem: &mut MemConfig,
) -> Result<Option<PciDevice>, Skip> {
    let location = node.location.as_deref().ok_or(Skip::NoLocation)?;
    let addr = parse_location(location).map_err(Skip::Parse)?;
    let hardware_id = node.hardware_id.as_deref().ok_or(Skip::NoHardwareId)?;
    let id = parse_hardware_id(hardware_id).map_err(Skip::Parse)?;

    if devices.get(addr).is_some_and(PciDevice::is_bound) {
        debug!("{}: {addr} is already mapped", node.instance_id);
        return Ok(None);
    }

    let mut device = PciDevice::new(addr, id);
    let handle = tree.open_interface(node).ok_or(Skip::NoInterface)?;
    let info = channel::map_hardware(handle.as_ref(), addr.to_wire(), id.device_id)
        .map_err(Skip::Map)?;

    // Dropping `handle` on the error path closes it, which undoes the mapping.
    mem.store_pool(&info.ms, i32::from(info.dev_numa_node))
        .map_err(Skip::Memseg)?;
    device.bind(&info, handle);
    Ok(Some(device))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tree(Vec<DeviceNode>);

    impl DeviceTree for Tree {
        fn devices(&self, _class: Option<&str>) -> Result<Vec<DeviceNode>, ScanError> {
            Ok(self.0.clone())
        }

        fn open_interface(&self, _node: &DeviceNode) -> Option<Box<dyn ControlChannel>> {
            None
        }
    }

    fn node(location: Option<&str>, hardware_id: Option<&str>) -> DeviceNode {
        DeviceNode {
            instance_id: "PCI\\VEN_8086&DEV_153A\\3&11583659&0&C8".to_owned(),
            location: location.map(str::to_owned),
            hardware_id: hardware_id.map(str::to_owned),
        }
    }

    #[test]
    fn unusable_candidates_are_skipped() {
        let tree = Tree(vec![
            node(None, None),
            node(Some("Port_#0002.Hub_#0001"), None),
            node(Some("PCI bus 5, device 0, function 0"), Some("PCI\\VEN_8086")),
            node(
                Some("PCI bus 5, device 0, function 0"),
                Some("PCI\\VEN_8086&DEV_153A&SUBSYS_00008086&REV_04"),
            ),
        ]);
        let mut devices = DeviceList::new();
        let mut mem = MemConfig::new();

        let result = scan(&tree, None, &mut devices, &mut mem);

        assert!(matches!(result, Err(ScanError::NoDevices)));
        assert!(devices.is_empty());
        assert!(mem.is_empty());
    }

    #[test]
    fn enumeration_failure_is_reported() {
        struct Broken;
        impl DeviceTree for Broken {
            fn devices(&self, _class: Option<&str>) -> Result<Vec<DeviceNode>, ScanError> {
                Err(ScanError::Enumerate("access denied".to_owned()))
            }
            fn open_interface(&self, _node: &DeviceNode) -> Option<Box<dyn ControlChannel>> {
                None
            }
        }

        let err = scan(&Broken, Some("Net"), &mut DeviceList::new(), &mut MemConfig::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot enumerate devices: access denied");
    }
}
