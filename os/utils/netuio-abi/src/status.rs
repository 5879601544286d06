use crate::AbiError;

/// Completion status of a device-control request.
///
/// Crosses the kernel/user boundary as a 32-bit `NTSTATUS` value; the
/// numbering follows the platform's status codes so that existing clients
/// interpret failures the same way.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum NetuioStatus {
    #[error("success")]
    Success = 0x0000_0000,
    #[error("unsuccessful")]
    Unsuccessful = 0xC000_0001,
    /// Invalid access width, or an operation that is neither read nor write.
    #[error("invalid parameter")]
    InvalidParameter = 0xC000_000D,
    /// Control code not serviced by the queue that received it.
    #[error("invalid device request")]
    InvalidDeviceRequest = 0xC000_0010,
    /// Scratch pool could not be allocated at attach time.
    #[error("no memory")]
    NoMemory = 0xC000_0017,
    /// The scratch pool is already mapped into a process.
    #[error("hardware already mapped")]
    AlreadyCommitted = 0xC000_0021,
    /// A kernel or user mapping could not be established.
    #[error("insufficient resources")]
    InsufficientResources = 0xC000_009A,
    /// The configuration header could not be read completely.
    #[error("not supported")]
    NotSupported = 0xC000_00BB,
    /// The embedded device address is not the one this instance is bound to.
    #[error("request addressed to a different device")]
    NotSameDevice = 0xC000_00D4,
    /// A BAR has no matching memory resource assigned by the platform.
    #[error("device configuration error")]
    DeviceConfigurationError = 0xC000_0182,
    /// The device is not in a state that can serve the request.
    #[error("invalid device state")]
    InvalidDeviceState = 0xC000_0184,
    /// Input or output buffer does not have the record's size.
    #[error("invalid buffer size")]
    InvalidBufferSize = 0xC000_0206,
}

impl NetuioStatus {
    const ALL: [Self; 12] = [
        Self::Success,
        Self::Unsuccessful,
        Self::InvalidParameter,
        Self::InvalidDeviceRequest,
        Self::NoMemory,
        Self::AlreadyCommitted,
        Self::InsufficientResources,
        Self::NotSupported,
        Self::NotSameDevice,
        Self::DeviceConfigurationError,
        Self::InvalidDeviceState,
        Self::InvalidBufferSize,
    ];

    #[inline]
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// # Errors
    /// [`AbiError::UnknownStatus`] for values outside the protocol's set.
    pub fn from_code(code: u32) -> Result<Self, AbiError> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code)
            .ok_or(AbiError::UnknownStatus(code))
    }

    /// `Ok(())` for [`Self::Success`], the status itself otherwise.
    ///
    /// # Errors
    /// Any status other than [`Self::Success`].
    pub const fn into_result(self) -> Result<(), Self> {
        match self {
            Self::Success => Ok(()),
            other => Err(other),
        }
    }
}

impl From<AbiError> for NetuioStatus {
    fn from(err: AbiError) -> Self {
        match err {
            AbiError::BufferSize { .. } => Self::InvalidBufferSize,
            AbiError::UnknownControlCode(_) => Self::InvalidDeviceRequest,
            AbiError::InvalidAccessWidth(_) | AbiError::InvalidOperation(_) => {
                Self::InvalidParameter
            }
            AbiError::UnknownStatus(_) => Self::Unsuccessful,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_raw_values() {
        for status in NetuioStatus::ALL {
            assert_eq!(NetuioStatus::from_code(status.code()), Ok(status));
        }
        assert_eq!(
            NetuioStatus::from_code(0xC000_0022),
            Err(AbiError::UnknownStatus(0xC000_0022))
        );
    }

    #[test]
    fn address_mismatch_is_not_a_lookup_failure() {
        assert_eq!(NetuioStatus::NotSameDevice.code(), 0xC000_00D4);
        assert_ne!(NetuioStatus::NotSameDevice, NetuioStatus::InvalidDeviceState);
    }

    #[test]
    fn decode_errors_map_to_protocol_statuses() {
        let err = AbiError::BufferSize {
            expected: 32,
            actual: 31,
        };
        assert_eq!(NetuioStatus::from(err), NetuioStatus::InvalidBufferSize);
        assert_eq!(
            NetuioStatus::from(AbiError::InvalidAccessWidth(3)),
            NetuioStatus::InvalidParameter
        );
    }
}
