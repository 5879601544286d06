//! # Platform services consumed by the driver
//!
//! The driver never touches page tables or the PCI bus itself. Everything it
//! needs from the host kernel is expressed by two traits:
//!
//! | Trait | Responsibility |
//! |-------|----------------|
//! | [`PciBus`] | Device properties and configuration-space access for the bound function |
//! | [`KernelMemory`] | Contiguous allocations, I/O-space mappings and per-process mappings |
//!
//! Process-relative operations take the [`ProcessId`] of the process whose
//! address space is affected. Implementations may only honor them while
//! executing in that process's context.

use crate::pci::SlotAddress;
use core::fmt;
use netuio_abi::{PhysicalAddress, VirtualAddress};

/// Identifies the process whose address space an operation targets.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProcessId(pub u64);

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}

/// Identifies one open handle to the device.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FileHandle(pub u64);

/// The context a request or cleanup callback executes in.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Caller {
    pub process: ProcessId,
    pub handle: FileHandle,
}

impl Caller {
    #[must_use]
    pub const fn new(process: u64, handle: u64) -> Self {
        Self {
            process: ProcessId(process),
            handle: FileHandle(handle),
        }
    }
}

/// Caching attribute of a mapping.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CacheType {
    /// Register space.
    NonCached,
    /// Ordinary RAM.
    Cached,
}

/// A kernel allocation with both of its addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KernelRegion {
    pub phys: PhysicalAddress,
    pub virt: VirtualAddress,
    pub size: u64,
}

/// One entry of the translated resource list negotiated for the device.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResourceDescriptor {
    Memory { start: PhysicalAddress, length: u64 },
    Port { start: u64, length: u32 },
    Interrupt { vector: u32 },
}

impl ResourceDescriptor {
    #[must_use]
    pub const fn as_memory(&self) -> Option<(PhysicalAddress, u64)> {
        match *self {
            Self::Memory { start, length } => Some((start, length)),
            _ => None,
        }
    }
}

/// Properties and configuration space of the bound PCI function.
pub trait PciBus {
    /// Bus number of the device.
    fn bus_number(&self) -> Option<u32>;

    /// Device and function number, packed as the platform reports them.
    fn slot_address(&self) -> Option<SlotAddress>;

    /// NUMA node the device is attached to, if the platform knows it.
    fn numa_node(&self) -> Option<u16>;

    /// Read `buf.len()` bytes of configuration space at `offset`.
    /// Returns the number of bytes read.
    fn get_bus_data(&self, offset: u32, buf: &mut [u8]) -> usize;

    /// Write `data` to configuration space at `offset`.
    /// Returns the number of bytes written.
    fn set_bus_data(&self, offset: u32, data: &[u8]) -> usize;
}

/// Kernel memory manager operations.
pub trait KernelMemory {
    /// Allocate `size` bytes of physically contiguous memory anywhere in the
    /// physical address space.
    fn allocate_contiguous(&self, size: u64, cache: CacheType) -> Option<KernelRegion>;

    fn free_contiguous(&self, region: KernelRegion);

    /// Map a physical range (usually a BAR) into kernel space.
    fn map_io_space(
        &self,
        start: PhysicalAddress,
        length: u64,
        cache: CacheType,
    ) -> Option<VirtualAddress>;

    fn unmap_io_space(&self, virt: VirtualAddress, length: u64);

    /// Fill a kernel range with zeroes.
    fn zero(&self, virt: VirtualAddress, length: u64);

    /// Map a kernel range into `process`. Must run in that process's context.
    fn map_into_process(
        &self,
        process: ProcessId,
        virt: VirtualAddress,
        length: u64,
        cache: CacheType,
    ) -> Option<VirtualAddress>;

    /// Undo [`Self::map_into_process`]. Must run in that process's context.
    fn unmap_from_process(&self, process: ProcessId, user: VirtualAddress, length: u64);
}
