use core::fmt;

/// Device type for network adapters in the control-code encoding.
const FILE_DEVICE_NETWORK: u32 = 0x12;

/// Buffered transfer method: the I/O manager copies both buffers.
const METHOD_BUFFERED: u32 = 0;

/// `FILE_READ_ACCESS | FILE_WRITE_ACCESS`.
const FILE_READ_WRITE_ACCESS: u32 = 0x3;

/// 32-bit device-control code.
///
/// Encodes `device_type << 16 | access << 14 | function << 2 | method`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct ControlCode(u32);

impl ControlCode {
    /// Map BARs and the scratch pool into the calling process.
    pub const MAP_HW_INTO_USERMODE: Self = Self::netuio(51);

    /// Read or write one location of the PCI configuration space.
    pub const PCI_CONFIG_IO: Self = Self::netuio(52);

    #[must_use]
    pub const fn new(device_type: u32, function: u32, method: u32, access: u32) -> Self {
        Self((device_type << 16) | (access << 14) | (function << 2) | method)
    }

    const fn netuio(function: u32) -> Self {
        Self::new(
            FILE_DEVICE_NETWORK,
            function,
            METHOD_BUFFERED,
            FILE_READ_WRITE_ACCESS,
        )
    }

    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn function(self) -> u32 {
        (self.0 >> 2) & 0xFFF
    }

    /// The request kind this code selects, if any.
    #[must_use]
    pub const fn kind(self) -> Option<RequestKind> {
        match self {
            Self::MAP_HW_INTO_USERMODE => Some(RequestKind::MapHardware),
            Self::PCI_CONFIG_IO => Some(RequestKind::ConfigIo),
            _ => None,
        }
    }
}

impl fmt::Debug for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControlCode(0x{:08X})", self.0)
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

const _: () = {
    assert!(ControlCode::MAP_HW_INTO_USERMODE.as_u32() == 0x0012_C0CC);
    assert!(ControlCode::PCI_CONFIG_IO.as_u32() == 0x0012_C0D0);
};

bitflags::bitflags! {
    /// How a request must be scheduled by the driver.
    #[derive(Copy, Clone, Debug, Eq, PartialEq)]
    pub struct RequestCapabilities: u32 {
        /// Must run synchronously in the context of the requesting process,
        /// because it establishes mappings in that process's address space.
        const IN_CALLER_CONTEXT = 1 << 0;

        /// May be serviced from the driver's parallel dispatch queue.
        const PARALLEL = 1 << 1;
    }
}

/// The request kinds of the protocol.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RequestKind {
    MapHardware,
    ConfigIo,
}

impl RequestKind {
    #[must_use]
    pub const fn control_code(self) -> ControlCode {
        match self {
            Self::MapHardware => ControlCode::MAP_HW_INTO_USERMODE,
            Self::ConfigIo => ControlCode::PCI_CONFIG_IO,
        }
    }

    #[must_use]
    pub const fn capabilities(self) -> RequestCapabilities {
        match self {
            Self::MapHardware => RequestCapabilities::IN_CALLER_CONTEXT,
            Self::ConfigIo => RequestCapabilities::PARALLEL,
        }
    }

    /// Size of the input record the driver expects for this kind.
    #[must_use]
    pub const fn input_size(self) -> usize {
        match self {
            Self::MapHardware => crate::HardwareInfo::SIZE,
            Self::ConfigIo => crate::ConfigIo::SIZE,
        }
    }

    /// Minimum size of the output buffer for this kind.
    #[must_use]
    pub const fn output_size(self) -> usize {
        match self {
            Self::MapHardware => crate::HardwareInfo::SIZE,
            Self::ConfigIo => size_of::<u64>(),
        }
    }
}
