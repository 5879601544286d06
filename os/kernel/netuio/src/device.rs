use crate::DriverError;
use crate::pci::{CommonHeader, PCI_COMMON_HEADER_LENGTH};
use crate::platform::{CacheType, Caller, KernelMemory, KernelRegion, PciBus, ResourceDescriptor};
use log::{debug, info, warn};
use netuio_abi::{
    DevAddr, DriverName, HardwareInfo, MemRegion, NetuioStatus, PCI_MAX_BAR,
    USER_MEMORY_SEGMENT_SIZE, VirtualAddress,
};
use spin::Mutex;

/// Lifecycle state of a device instance.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceState {
    /// Identity captured and scratch pool allocated.
    Attached,
    /// BARs discovered and mapped into kernel space.
    HardwarePrepared,
    /// Pool and BARs mapped into one process.
    UserMapped,
    /// Kernel mappings undone, scratch pool freed.
    Released,
}

/// A BAR mapped into kernel space.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Bar {
    pub(crate) region: KernelRegion,
}

/// Mappings made for the process that issued Map Hardware.
#[derive(Copy, Clone, Debug)]
pub(crate) struct UserMapping {
    pub(crate) owner: Caller,
    pub(crate) pool: VirtualAddress,
    pub(crate) bars: [Option<VirtualAddress>; PCI_MAX_BAR],
}

#[derive(Debug)]
pub(crate) struct DeviceContext {
    pub(crate) state: DeviceState,
    pub(crate) bars: [Option<Bar>; PCI_MAX_BAR],
    pub(crate) pool: Option<KernelRegion>,
    pub(crate) user: Option<UserMapping>,
}

/// One bound PCI function.
///
/// The address and NUMA node are fixed at attach time. Everything that
/// changes afterwards lives behind a spin lock so that the caller-context
/// path, the parallel queue and cleanup callbacks may race.
pub struct NetuioDevice<B: PciBus, M: KernelMemory> {
    pub(crate) bus: B,
    pub(crate) memory: M,
    addr: DevAddr,
    numa_node: u16,
    pub(crate) ctx: Mutex<DeviceContext>,
}

impl<B: PciBus, M: KernelMemory> NetuioDevice<B, M> {
    /// Capture the device's identity and allocate its scratch pool.
    ///
    /// # Errors
    /// - [`DriverError::Property`] if bus number or slot address are unknown.
    /// - [`DriverError::PoolAllocation`] if the pool cannot be allocated.
    pub fn attach(bus: B, memory: M) -> Result<Self, DriverError> {
        let bus_num = bus.bus_number().ok_or(DriverError::Property("bus number"))?;
        let slot = bus.slot_address().ok_or(DriverError::Property("address"))?;
        let numa_node = bus.numa_node().unwrap_or(0);
        let addr = DevAddr {
            bus_num,
            dev_num: slot.device(),
            func_num: slot.function(),
        };

        let pool = memory
            .allocate_contiguous(USER_MEMORY_SEGMENT_SIZE, CacheType::Cached)
            .ok_or(DriverError::PoolAllocation {
                size: USER_MEMORY_SEGMENT_SIZE,
            })?;

        debug!(
            "{} attached, NUMA node {numa_node}, scratch pool at {}",
            DriverName(addr).kernel_link(),
            pool.phys
        );

        Ok(Self {
            bus,
            memory,
            addr,
            numa_node,
            ctx: Mutex::new(DeviceContext {
                state: DeviceState::Attached,
                bars: [None; PCI_MAX_BAR],
                pool: Some(pool),
                user: None,
            }),
        })
    }

    #[must_use]
    pub const fn address(&self) -> DevAddr {
        self.addr
    }

    #[must_use]
    pub const fn numa_node(&self) -> u16 {
        self.numa_node
    }

    /// The device's symbolic name, see [`DriverName::kernel_link`].
    #[must_use]
    pub const fn name(&self) -> DriverName {
        DriverName(self.addr)
    }

    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.ctx.lock().state
    }

    /// Discover the device's memory BARs and map them into kernel space.
    ///
    /// Present BARs are paired, in order, with the memory entries of the
    /// translated resource list. On failure every mapping made so far is
    /// undone and the device is left in [`DeviceState::Attached`].
    ///
    /// # Errors
    /// - [`DriverError::ShortHeaderRead`] if the configuration header is truncated.
    /// - [`DriverError::MissingMemoryResource`] if a BAR has no matching resource.
    /// - [`DriverError::IoSpaceMapping`] if a kernel mapping fails.
    pub fn prepare_hardware(&self, resources: &[ResourceDescriptor]) -> Result<(), DriverError> {
        let mut ctx = self.ctx.lock();
        if ctx.state == DeviceState::Released {
            return Err(DriverError::Released);
        }

        if let Some(user) = ctx.user.take() {
            Self::unmap_user(&self.memory, &ctx, &user);
        }
        Self::unmap_bars(&self.memory, &mut ctx.bars);
        ctx.state = DeviceState::Attached;

        let header = self.read_common_header()?;
        let present = header.present_bars();
        let mut memory_resources = resources.iter().filter_map(ResourceDescriptor::as_memory);
        let mut bars = [None; PCI_MAX_BAR];

        for (index, _) in present.iter().enumerate().filter(|(_, p)| **p) {
            let mapped = memory_resources
                .next()
                .ok_or(DriverError::MissingMemoryResource { bar: index })
                .and_then(|(start, length)| {
                    self.memory
                        .map_io_space(start, length, CacheType::NonCached)
                        .map(|virt| KernelRegion {
                            phys: start,
                            virt,
                            size: length,
                        })
                        .ok_or(DriverError::IoSpaceMapping { bar: index })
                });

            match mapped {
                Ok(region) => bars[index] = Some(Bar { region }),
                Err(err) => {
                    Self::unmap_bars(&self.memory, &mut bars);
                    return Err(err);
                }
            }
        }

        ctx.bars = bars;
        ctx.state = DeviceState::HardwarePrepared;

        info!(
            "netUIO driver loaded on device (B:D:F) {:04}:{:02}:{:02}",
            self.addr.bus_num, self.addr.dev_num, self.addr.func_num
        );
        Ok(())
    }

    /// Undo the kernel BAR mappings.
    ///
    /// Process mappings still outstanding are torn down first.
    pub fn release_hardware(&self) {
        let mut ctx = self.ctx.lock();
        if let Some(user) = ctx.user.take() {
            warn!(
                "{}: releasing hardware while mapped into {:?}",
                self.name(),
                user.owner.process
            );
            Self::unmap_user(&self.memory, &ctx, &user);
        }
        Self::unmap_bars(&self.memory, &mut ctx.bars);
        if ctx.state != DeviceState::Released {
            ctx.state = DeviceState::Attached;
        }
    }

    /// Tear the device down: release hardware and free the scratch pool.
    ///
    /// The instance stays in [`DeviceState::Released`] and refuses further
    /// preparation and mapping.
    pub fn remove(&self) {
        let mut ctx = self.ctx.lock();
        if ctx.state == DeviceState::Released {
            return;
        }
        if let Some(user) = ctx.user.take() {
            Self::unmap_user(&self.memory, &ctx, &user);
        }
        Self::unmap_bars(&self.memory, &mut ctx.bars);
        if let Some(pool) = ctx.pool.take() {
            self.memory.free_contiguous(pool);
        }
        ctx.state = DeviceState::Released;
        debug!("{} removed", self.name());
    }

    /// Handle-close callback. Undoes the mappings made for `caller`'s handle.
    ///
    /// Returns whether anything was unmapped. Handles that never mapped the
    /// hardware are ignored.
    ///
    /// # Errors
    /// [`DriverError::WrongProcess`] if invoked outside the owning process.
    pub fn file_cleanup(&self, caller: Caller) -> Result<bool, DriverError> {
        let mut ctx = self.ctx.lock();
        let Some(user) = ctx.user else {
            return Ok(false);
        };
        if user.owner.handle != caller.handle {
            return Ok(false);
        }
        if user.owner.process != caller.process {
            return Err(DriverError::WrongProcess {
                owner: user.owner.process,
                caller: caller.process,
            });
        }

        Self::unmap_user(&self.memory, &ctx, &user);
        ctx.user = None;
        ctx.state = DeviceState::HardwarePrepared;
        debug!("{}: unmapped from {:?}", self.name(), caller.process);
        Ok(true)
    }

    /// Zero the pool and map it plus every present BAR into `caller`, then
    /// describe the result into `out`. Returns the number of bytes written.
    pub(crate) fn map_into_caller(
        &self,
        caller: Caller,
        out: &mut [u8],
    ) -> Result<usize, NetuioStatus> {
        let mut ctx = self.ctx.lock();
        match ctx.state {
            DeviceState::HardwarePrepared => {}
            DeviceState::UserMapped => return Err(NetuioStatus::AlreadyCommitted),
            DeviceState::Attached | DeviceState::Released => {
                return Err(NetuioStatus::InvalidDeviceState);
            }
        }
        if out.len() < HardwareInfo::SIZE {
            return Err(NetuioStatus::InvalidBufferSize);
        }
        let pool = ctx.pool.ok_or(NetuioStatus::InvalidDeviceState)?;

        self.memory.zero(pool.virt, pool.size);

        let pool_user = self
            .memory
            .map_into_process(caller.process, pool.virt, pool.size, CacheType::Cached)
            .ok_or(NetuioStatus::InsufficientResources)?;
        let mut user = UserMapping {
            owner: caller,
            pool: pool_user,
            bars: [None; PCI_MAX_BAR],
        };

        for (index, bar) in ctx.bars.iter().enumerate() {
            let Some(bar) = bar else { continue };
            match self.memory.map_into_process(
                caller.process,
                bar.region.virt,
                bar.region.size,
                CacheType::NonCached,
            ) {
                Some(va) => user.bars[index] = Some(va),
                None => {
                    Self::unmap_user(&self.memory, &ctx, &user);
                    return Err(NetuioStatus::InsufficientResources);
                }
            }
        }

        let written = self.describe(&ctx, pool, &user).encode(out)?;
        ctx.user = Some(user);
        ctx.state = DeviceState::UserMapped;
        debug!("{}: mapped into {:?}", self.name(), caller.process);
        Ok(written)
    }

    fn describe(
        &self,
        ctx: &DeviceContext,
        pool: KernelRegion,
        user: &UserMapping,
    ) -> HardwareInfo {
        let mut info = HardwareInfo {
            dev_addr: self.addr,
            dev_numa_node: self.numa_node,
            ..HardwareInfo::default()
        };
        for (index, bar) in ctx.bars.iter().enumerate() {
            if let Some(bar) = bar {
                info.hw[index] = MemRegion {
                    size: bar.region.size,
                    phys_addr: bar.region.phys,
                    virt_addr: VirtualAddress::null(),
                    user_mapped_virt_addr: user.bars[index].unwrap_or_default(),
                };
            }
        }
        info.ms = MemRegion {
            size: pool.size,
            phys_addr: pool.phys,
            virt_addr: VirtualAddress::null(),
            user_mapped_virt_addr: user.pool,
        };
        info
    }

    fn read_common_header(&self) -> Result<CommonHeader, DriverError> {
        let mut raw = [0u8; PCI_COMMON_HEADER_LENGTH];
        let read = self.bus.get_bus_data(0, &mut raw);
        if read != PCI_COMMON_HEADER_LENGTH {
            return Err(DriverError::ShortHeaderRead {
                expected: PCI_COMMON_HEADER_LENGTH,
                actual: read,
            });
        }
        Ok(CommonHeader::from_bytes(raw))
    }

    fn unmap_bars(memory: &M, bars: &mut [Option<Bar>; PCI_MAX_BAR]) {
        for bar in bars.iter_mut().filter_map(Option::take) {
            memory.unmap_io_space(bar.region.virt, bar.region.size);
        }
    }

    fn unmap_user(memory: &M, ctx: &DeviceContext, user: &UserMapping) {
        let process = user.owner.process;
        if let Some(pool) = ctx.pool {
            memory.unmap_from_process(process, user.pool, pool.size);
        }
        for (bar, va) in ctx.bars.iter().zip(user.bars) {
            if let (Some(bar), Some(va)) = (bar, va) {
                memory.unmap_from_process(process, va, bar.region.size);
            }
        }
    }
}

impl<B: PciBus, M: KernelMemory> Drop for NetuioDevice<B, M> {
    fn drop(&mut self) {
        self.remove();
    }
}
