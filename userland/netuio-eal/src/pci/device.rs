//! Device records and the address-sorted device list.

use crate::pci::channel::{self, ControlChannel};
use crate::pci::parse::PciId;
use core::fmt;
use netuio_abi::{
    AccessWidth, DeviceAddress, HardwareInfo, MemRegion, NetuioStatus, PCI_MAX_BAR, PhysicalAddress,
    VirtualAddress,
};

/// Kernel driver a device is bound to.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum KernelDriver {
    #[default]
    Unknown,
    /// The netuio mapping driver.
    NicUio,
}

/// One BAR as seen from this process.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemResource {
    pub phys_addr: PhysicalAddress,
    pub len: u64,
    /// Process-local mapping, null until the driver mapped the BAR.
    pub addr: VirtualAddress,
}

impl From<MemRegion> for MemResource {
    fn from(region: MemRegion) -> Self {
        Self {
            phys_addr: region.phys_addr,
            len: region.size,
            addr: region.user_mapped_virt_addr,
        }
    }
}

/// A PCI function driven through netuio.
pub struct PciDevice {
    pub addr: DeviceAddress,
    pub id: PciId,
    pub numa_node: u16,
    pub kdrv: KernelDriver,
    pub max_vfs: u16,
    pub mem_resource: [MemResource; PCI_MAX_BAR],
    name: String,
    channel: Option<Box<dyn ControlChannel>>,
}

impl fmt::Debug for PciDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PciDevice")
            .field("addr", &self.addr)
            .field("id", &self.id)
            .field("numa_node", &self.numa_node)
            .field("kdrv", &self.kdrv)
            .field("max_vfs", &self.max_vfs)
            .field("mem_resource", &self.mem_resource)
            .field("open", &self.channel.is_some())
            .finish()
    }
}

impl PciDevice {
    /// A record for a freshly discovered function, not yet mapped.
    #[must_use]
    pub fn new(addr: DeviceAddress, id: PciId) -> Self {
        Self {
            addr,
            id,
            numa_node: 0,
            kdrv: KernelDriver::Unknown,
            max_vfs: 0,
            mem_resource: [MemResource::default(); PCI_MAX_BAR],
            name: addr.to_string(),
            channel: None,
        }
    }

    /// Canonical `domain:bus:device.function` name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take over the results of a successful Map Hardware request.
    ///
    /// `channel` is the handle the request was issued on; keeping it open is
    /// what keeps the mappings alive.
    pub fn bind(&mut self, info: &HardwareInfo, channel: Box<dyn ControlChannel>) {
        self.numa_node = info.dev_numa_node;
        self.kdrv = KernelDriver::NicUio;
        self.mem_resource = info.hw.map(MemResource::from);
        self.channel = Some(channel);
    }

    /// Whether the device holds an open driver handle.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.channel.is_some()
    }

    fn channel(&self) -> Result<&dyn ControlChannel, NetuioStatus> {
        self.channel.as_deref().ok_or(NetuioStatus::InvalidDeviceState)
    }

    /// Read one 32-bit word of configuration space.
    pub fn read_config(&self, offset: u32) -> Result<u32, NetuioStatus> {
        let value = channel::config_read(
            self.channel()?,
            self.addr.to_wire(),
            offset,
            AccessWidth::Dword,
        )?;
        u32::try_from(value).map_err(|_| NetuioStatus::InvalidBufferSize)
    }

    /// Write one 32-bit word of configuration space.
    pub fn write_config(&self, offset: u32, value: u32) -> Result<usize, NetuioStatus> {
        channel::config_write(
            self.channel()?,
            self.addr.to_wire(),
            offset,
            AccessWidth::Dword,
            u64::from(value),
        )
    }

    /// Fold a later record for the same address into this one.
    ///
    /// A bound record keeps its handle and the mappings made through it;
    /// the newer handle is closed when `newer` drops.
    fn merge(&mut self, newer: Self) {
        self.kdrv = newer.kdrv;
        self.max_vfs = newer.max_vfs;
        if self.is_bound() {
            return;
        }
        self.mem_resource = newer.mem_resource;
        if newer.channel.is_some() {
            self.numa_node = newer.numa_node;
            self.channel = newer.channel;
        }
    }
}

/// Devices found so far, sorted by address, never holding two records for
/// the same address.
#[derive(Debug, Default)]
pub struct DeviceList {
    devices: Vec<PciDevice>,
}

/// What [`DeviceList::insert`] did with a record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Inserted {
    New,
    /// An existing record for the same address was updated in place.
    Merged,
}

impl DeviceList {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Add `device`, or fold it into the record already kept for its address.
    pub fn insert(&mut self, device: PciDevice) -> Inserted {
        match self.devices.binary_search_by_key(&device.addr, |d| d.addr) {
            Ok(at) => {
                self.devices[at].merge(device);
                Inserted::Merged
            }
            Err(at) => {
                self.devices.insert(at, device);
                Inserted::New
            }
        }
    }

    #[must_use]
    pub fn get(&self, addr: DeviceAddress) -> Option<&PciDevice> {
        self.devices
            .binary_search_by_key(&addr, |d| d.addr)
            .ok()
            .map(|at| &self.devices[at])
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PciDevice> {
        self.devices.iter()
    }
}

impl<'a> IntoIterator for &'a DeviceList {
    type Item = &'a PciDevice;
    type IntoIter = core::slice::Iter<'a, PciDevice>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}
