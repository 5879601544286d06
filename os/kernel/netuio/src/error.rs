use crate::platform::ProcessId;
use netuio_abi::NetuioStatus;

/// Failures of the driver's lifecycle callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// A device property could not be queried from the platform.
    #[error("device property {0} unavailable")]
    Property(&'static str),
    /// The contiguous scratch pool could not be allocated.
    #[error("scratch pool allocation of {size} bytes failed")]
    PoolAllocation { size: u64 },
    /// The configuration header could not be read in full.
    #[error("configuration header read returned {actual} of {expected} bytes")]
    ShortHeaderRead { expected: usize, actual: usize },
    /// A present BAR has no memory resource left to pair with.
    #[error("no memory resource for BAR {bar}")]
    MissingMemoryResource { bar: usize },
    /// A BAR could not be mapped into kernel space.
    #[error("mapping BAR {bar} into kernel space failed")]
    IoSpaceMapping { bar: usize },
    /// Process mappings can only be undone by the process that owns them.
    #[error("mappings belong to {owner:?}, cleanup attempted from {caller:?}")]
    WrongProcess { owner: ProcessId, caller: ProcessId },
    /// The device has been released.
    #[error("device already released")]
    Released,
}

impl DriverError {
    /// The status reported to the framework for this failure.
    #[must_use]
    pub const fn status(&self) -> NetuioStatus {
        match self {
            Self::Property(_) => NetuioStatus::Unsuccessful,
            Self::PoolAllocation { .. } => NetuioStatus::NoMemory,
            Self::ShortHeaderRead { .. } => NetuioStatus::NotSupported,
            Self::MissingMemoryResource { .. } => NetuioStatus::DeviceConfigurationError,
            Self::IoSpaceMapping { .. } => NetuioStatus::InsufficientResources,
            Self::WrongProcess { .. } | Self::Released => NetuioStatus::InvalidDeviceState,
        }
    }
}

impl From<DriverError> for NetuioStatus {
    fn from(err: DriverError) -> Self {
        err.status()
    }
}
