//! Runtime bring-up.

use crate::config::{ConfigError, EalConfig, ProcessType};
use crate::memory::{MemConfig, MemsegError, Reservation, reserve_lists};
use crate::pci::{DeviceList, DeviceTree, ScanError, scan};
use crate::process::{ProcessError, SharedConfig};
use log::info;
use netuio_abi::{PhysicalAddress, VirtualAddress};

#[derive(Debug, thiserror::Error)]
pub enum EalError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("cannot scan the PCI bus: {0}")]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Memseg(#[from] MemsegError),
}

/// An initialized runtime instance.
///
/// Owns everything the rest of the runtime needs from bring-up: the role of
/// this process, the memory segment lists and, in the primary, the devices
/// mapped through netuio.
#[derive(Debug)]
pub struct Eal {
    config: EalConfig,
    role: ProcessType,
    shared: Option<SharedConfig>,
    mem: MemConfig,
    devices: DeviceList,
    reservations: Vec<Reservation>,
}

impl Eal {
    /// Settle the process role and bring up memory.
    ///
    /// The primary scans `tree`, maps every usable device, publishes the
    /// resulting memory segment lists and then lets secondaries in. A
    /// secondary waits for that, reads the lists and reserves address space
    /// for them; it does not touch devices.
    pub fn init(config: EalConfig, tree: &dyn DeviceTree) -> Result<Self, EalError> {
        config.validate()?;

        if config.no_shconf() {
            return Self::init_primary(config, None, tree);
        }

        config.create_runtime_dir()?;
        let shared = SharedConfig::open(
            &config.config_path(),
            config.process_type(),
            config.attach_timeout(),
        )?;
        match shared.role() {
            ProcessType::Primary => Self::init_primary(config, Some(shared), tree),
            _ => Self::init_secondary(config, shared),
        }
    }

    fn init_primary(
        config: EalConfig,
        mut shared: Option<SharedConfig>,
        tree: &dyn DeviceTree,
    ) -> Result<Self, EalError> {
        let mut mem = MemConfig::new();
        let mut devices = DeviceList::new();
        scan(tree, config.class_filter(), &mut devices, &mut mem)?;

        if let Some(shared) = shared.as_mut() {
            shared.publish(&mem)?;
            shared.mark_complete()?;
        }
        info!(
            "{}: primary process up with {} devices, {} memseg lists",
            config.file_prefix(),
            devices.len(),
            mem.len()
        );

        Ok(Self {
            config,
            role: ProcessType::Primary,
            shared,
            mem,
            devices,
            reservations: Vec::new(),
        })
    }

    fn init_secondary(config: EalConfig, mut shared: SharedConfig) -> Result<Self, EalError> {
        shared.wait_complete(config.attach_timeout())?;
        let mut mem = shared.load()?;
        let reservations = reserve_lists(&mut mem)?;
        info!(
            "{}: secondary process attached to {} memseg lists",
            config.file_prefix(),
            mem.len()
        );

        Ok(Self {
            config,
            role: ProcessType::Secondary,
            shared: Some(shared),
            mem,
            devices: DeviceList::new(),
            reservations,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EalConfig {
        &self.config
    }

    /// [`ProcessType::Primary`] or [`ProcessType::Secondary`].
    #[must_use]
    pub const fn process_type(&self) -> ProcessType {
        self.role
    }

    /// Whether the configuration lives in a shared file.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        self.shared.is_some()
    }

    #[must_use]
    pub const fn mem_config(&self) -> &MemConfig {
        &self.mem
    }

    /// Devices mapped by this process. Empty in a secondary.
    #[must_use]
    pub const fn devices(&self) -> &DeviceList {
        &self.devices
    }

    /// Address space a secondary set aside for the published lists.
    #[must_use]
    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    /// IO address of `va`, `None` if it is not inside the first memseg list.
    #[must_use]
    pub fn virt_to_iova(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.mem.virt_to_iova(va)
    }
}
