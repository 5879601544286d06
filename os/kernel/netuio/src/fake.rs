//! In-memory platform for running the driver off-target.
//!
//! Both fakes are cheap handles around shared state, so a test can keep a
//! clone to inspect what the driver did after handing its twin over.

use crate::pci::{CommonHeader, PCI_COMMON_HEADER_LENGTH, SlotAddress};
use crate::platform::{CacheType, KernelMemory, KernelRegion, PciBus, ProcessId, ResourceDescriptor};
use netuio_abi::{PCI_MAX_BAR, PhysicalAddress, VirtualAddress};
use std::sync::{Arc, Mutex, MutexGuard};

/// Size of the emulated configuration space.
const CONFIG_SPACE: usize = 256;

/// Length reported for every BAR by [`FakeBus::resources`].
pub const FAKE_BAR_LENGTH: u64 = 0x2_0000;

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug)]
struct BusState {
    bus: Option<u32>,
    slot: Option<SlotAddress>,
    numa: Option<u16>,
    config: [u8; CONFIG_SPACE],
    readable: usize,
    accesses: usize,
}

/// A PCI function with a flat configuration space.
#[derive(Clone, Debug)]
pub struct FakeBus {
    inner: Arc<Mutex<BusState>>,
}

impl FakeBus {
    /// An Intel I210 at `bus:device.function` with a 64-bit BAR 0 and a
    /// 32-bit BAR 3.
    #[must_use]
    pub fn new(bus: u32, device: u16, function: u16) -> Self {
        let mut config = [0u8; CONFIG_SPACE];
        config[0..2].copy_from_slice(&0x8086u16.to_le_bytes());
        config[2..4].copy_from_slice(&0x1533u16.to_le_bytes());
        let this = Self {
            inner: Arc::new(Mutex::new(BusState {
                bus: Some(bus),
                slot: Some(SlotAddress::new().with_device(device).with_function(function)),
                numa: Some(0),
                config,
                readable: CONFIG_SPACE,
                accesses: 0,
            })),
        };
        this.with_bars([0xF7E0_0004, 0, 0, 0xF7F0_0000, 0, 0])
    }

    /// Replace the six BAR registers.
    #[must_use]
    pub fn with_bars(self, bars: [u32; PCI_MAX_BAR]) -> Self {
        {
            let mut state = locked(&self.inner);
            for (i, bar) in bars.iter().enumerate() {
                let at = 0x10 + i * 4;
                state.config[at..at + 4].copy_from_slice(&bar.to_le_bytes());
            }
        }
        self
    }

    #[must_use]
    pub fn with_numa_node(self, node: u16) -> Self {
        locked(&self.inner).numa = Some(node);
        self
    }

    /// Make only the first `len` bytes of configuration space readable.
    #[must_use]
    pub fn with_readable_config(self, len: usize) -> Self {
        locked(&self.inner).readable = len;
        self
    }

    /// Forget the bus number property.
    #[must_use]
    pub fn without_bus_number(self) -> Self {
        locked(&self.inner).bus = None;
        self
    }

    /// Translated resources matching the BARs, one memory entry per present
    /// BAR, interleaved with an interrupt entry.
    #[must_use]
    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        let state = locked(&self.inner);
        let mut raw = [0u8; PCI_COMMON_HEADER_LENGTH];
        raw.copy_from_slice(&state.config[..PCI_COMMON_HEADER_LENGTH]);
        let header = CommonHeader::from_bytes(raw);

        let mut out = vec![ResourceDescriptor::Interrupt { vector: 0x40 }];
        for (index, present) in header.present_bars().into_iter().enumerate() {
            if !present {
                continue;
            }
            let bar = header.bar(index);
            let mut start = u64::from(bar.base());
            if bar.is_64bit() && index + 1 < PCI_MAX_BAR {
                start |= u64::from(header.bar(index + 1).into_bits()) << 32;
            }
            out.push(ResourceDescriptor::Memory {
                start: PhysicalAddress::new(start),
                length: FAKE_BAR_LENGTH,
            });
        }
        out
    }

    /// Configuration-space accesses performed through [`PciBus`].
    #[must_use]
    pub fn accesses(&self) -> usize {
        locked(&self.inner).accesses
    }

    /// Read configuration space without counting an access.
    #[must_use]
    pub fn peek(&self, offset: usize, len: usize) -> Vec<u8> {
        locked(&self.inner).config[offset..offset + len].to_vec()
    }
}

impl PciBus for FakeBus {
    fn bus_number(&self) -> Option<u32> {
        locked(&self.inner).bus
    }

    fn slot_address(&self) -> Option<SlotAddress> {
        locked(&self.inner).slot
    }

    fn numa_node(&self) -> Option<u16> {
        locked(&self.inner).numa
    }

    fn get_bus_data(&self, offset: u32, buf: &mut [u8]) -> usize {
        let mut state = locked(&self.inner);
        state.accesses += 1;
        let start = (offset as usize).min(state.readable);
        let end = (start + buf.len()).min(state.readable);
        let n = end - start;
        buf[..n].copy_from_slice(&state.config[start..end]);
        n
    }

    fn set_bus_data(&self, offset: u32, data: &[u8]) -> usize {
        let mut state = locked(&self.inner);
        state.accesses += 1;
        let start = (offset as usize).min(CONFIG_SPACE);
        let end = (start + data.len()).min(CONFIG_SPACE);
        let n = end - start;
        state.config[start..end].copy_from_slice(&data[..n]);
        n
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_phys: u64,
    next_kernel: u64,
    next_user: u64,
    allocations: Vec<KernelRegion>,
    io_mappings: Vec<(VirtualAddress, u64)>,
    user_mappings: Vec<(ProcessId, VirtualAddress, u64)>,
    zeroed: u64,
    fail_allocation: bool,
    fail_io_map_call: Option<usize>,
    fail_user_map_call: Option<usize>,
    io_map_calls: usize,
    user_map_calls: usize,
}

/// A memory manager that hands out addresses without backing them.
#[derive(Clone, Debug)]
pub struct FakeMemory {
    inner: Arc<Mutex<MemoryState>>,
}

impl Default for FakeMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMemory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryState {
                next_phys: 0x1_0000_0000,
                next_kernel: 0xFFFF_9000_0000_0000,
                next_user: 0x0000_7F00_0000_0000,
                ..MemoryState::default()
            })),
        }
    }

    /// Make contiguous allocations fail.
    #[must_use]
    pub fn failing_allocation(self) -> Self {
        locked(&self.inner).fail_allocation = true;
        self
    }

    /// Make the `nth` (zero-based) kernel I/O-space mapping fail.
    #[must_use]
    pub fn failing_io_mapping(self, nth: usize) -> Self {
        locked(&self.inner).fail_io_map_call = Some(nth);
        self
    }

    /// Make the `nth` (zero-based) process mapping fail.
    #[must_use]
    pub fn failing_user_mapping(self, nth: usize) -> Self {
        locked(&self.inner).fail_user_map_call = Some(nth);
        self
    }

    #[must_use]
    pub fn live_allocations(&self) -> usize {
        locked(&self.inner).allocations.len()
    }

    #[must_use]
    pub fn live_io_mappings(&self) -> usize {
        locked(&self.inner).io_mappings.len()
    }

    /// Process mappings currently alive in `process`.
    #[must_use]
    pub fn live_user_mappings(&self, process: ProcessId) -> usize {
        locked(&self.inner)
            .user_mappings
            .iter()
            .filter(|(p, _, _)| *p == process)
            .count()
    }

    /// Whether `va` lies inside a live mapping of `process`.
    #[must_use]
    pub fn user_mapping_covers(&self, process: ProcessId, va: VirtualAddress) -> bool {
        locked(&self.inner).user_mappings.iter().any(|(p, base, len)| {
            *p == process && va.as_u64() >= base.as_u64() && va.as_u64() - base.as_u64() < *len
        })
    }

    /// Total bytes cleared through [`KernelMemory::zero`].
    #[must_use]
    pub fn zeroed_bytes(&self) -> u64 {
        locked(&self.inner).zeroed
    }
}

impl KernelMemory for FakeMemory {
    fn allocate_contiguous(&self, size: u64, _cache: CacheType) -> Option<KernelRegion> {
        let mut state = locked(&self.inner);
        if state.fail_allocation {
            return None;
        }
        let region = KernelRegion {
            phys: PhysicalAddress::new(state.next_phys),
            virt: VirtualAddress::new(state.next_kernel),
            size,
        };
        state.next_phys += size;
        state.next_kernel += size;
        state.allocations.push(region);
        Some(region)
    }

    fn free_contiguous(&self, region: KernelRegion) {
        locked(&self.inner).allocations.retain(|r| *r != region);
    }

    fn map_io_space(
        &self,
        _start: PhysicalAddress,
        length: u64,
        _cache: CacheType,
    ) -> Option<VirtualAddress> {
        let mut state = locked(&self.inner);
        let call = state.io_map_calls;
        state.io_map_calls += 1;
        if state.fail_io_map_call == Some(call) {
            return None;
        }
        let va = VirtualAddress::new(state.next_kernel);
        state.next_kernel += length;
        state.io_mappings.push((va, length));
        Some(va)
    }

    fn unmap_io_space(&self, virt: VirtualAddress, length: u64) {
        locked(&self.inner)
            .io_mappings
            .retain(|m| *m != (virt, length));
    }

    fn zero(&self, _virt: VirtualAddress, length: u64) {
        locked(&self.inner).zeroed += length;
    }

    fn map_into_process(
        &self,
        process: ProcessId,
        _virt: VirtualAddress,
        length: u64,
        _cache: CacheType,
    ) -> Option<VirtualAddress> {
        let mut state = locked(&self.inner);
        let call = state.user_map_calls;
        state.user_map_calls += 1;
        if state.fail_user_map_call == Some(call) {
            return None;
        }
        let va = VirtualAddress::new(state.next_user);
        state.next_user += length;
        state.user_mappings.push((process, va, length));
        Some(va)
    }

    fn unmap_from_process(&self, process: ProcessId, user: VirtualAddress, length: u64) {
        locked(&self.inner)
            .user_mappings
            .retain(|m| *m != (process, user, length));
    }
}
