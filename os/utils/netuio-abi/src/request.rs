//! Tagged union over the protocol's request and response records.

use crate::{AbiError, ConfigIo, ControlCode, HardwareInfo, RequestKind};

/// A decoded device-control request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Request {
    MapHardware(HardwareInfo),
    ConfigIo(ConfigIo),
}

impl Request {
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::MapHardware(_) => RequestKind::MapHardware,
            Self::ConfigIo(_) => RequestKind::ConfigIo,
        }
    }

    #[must_use]
    pub const fn control_code(&self) -> ControlCode {
        self.kind().control_code()
    }

    /// Serialize the payload into `out`, returning its length.
    ///
    /// # Errors
    /// [`AbiError::BufferSize`] if `out` cannot hold the payload.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, AbiError> {
        match self {
            Self::MapHardware(info) => info.encode(out),
            Self::ConfigIo(io) => io.encode(out),
        }
    }

    /// Decode the input buffer of a request issued with `code`.
    ///
    /// # Errors
    /// - [`AbiError::UnknownControlCode`] if `code` is not part of the protocol.
    /// - [`AbiError::BufferSize`] if `buf` is not exactly the payload size.
    pub fn decode(code: ControlCode, buf: &[u8]) -> Result<Self, AbiError> {
        match code.kind() {
            Some(RequestKind::MapHardware) => HardwareInfo::decode(buf).map(Self::MapHardware),
            Some(RequestKind::ConfigIo) => ConfigIo::decode(buf).map(Self::ConfigIo),
            None => Err(AbiError::UnknownControlCode(code)),
        }
    }
}

/// A decoded successful completion.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Response {
    /// Regions mapped into the caller.
    MapHardware(HardwareInfo),
    /// `data` holds the value read (zero-extended) for reads and is zero for
    /// writes; `bytes` is the number of bytes the bus accessor transferred.
    ConfigIo { data: u64, bytes: usize },
}

impl Response {
    /// Decode the output buffer of a completed request.
    ///
    /// `information` is the byte count reported alongside the completion.
    ///
    /// # Errors
    /// - [`AbiError::UnknownControlCode`] if `code` is not part of the protocol.
    /// - [`AbiError::BufferSize`] if `out` is shorter than the record.
    pub fn decode(code: ControlCode, out: &[u8], information: usize) -> Result<Self, AbiError> {
        let kind = code.kind().ok_or(AbiError::UnknownControlCode(code))?;
        let size = kind.output_size();
        let record = out.get(..size).ok_or(AbiError::BufferSize {
            expected: size,
            actual: out.len(),
        })?;

        match kind {
            RequestKind::MapHardware => HardwareInfo::decode(record).map(Self::MapHardware),
            RequestKind::ConfigIo => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(record);
                Ok(Self::ConfigIo {
                    data: u64::from_le_bytes(raw),
                    bytes: information,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccessWidth, DeviceAddress};

    #[test]
    fn unknown_code_is_rejected() {
        let code = ControlCode::from_raw(0x0012_C0D4);
        assert_eq!(
            Request::decode(code, &[0u8; 32]),
            Err(AbiError::UnknownControlCode(code))
        );
    }

    #[test]
    fn config_request_decodes_with_its_own_code() {
        let addr = DeviceAddress::new(0, 3, 0, 1).to_wire();
        let request = Request::ConfigIo(ConfigIo::read(addr, 0x2C, AccessWidth::Dword));
        let mut buf = [0u8; ConfigIo::SIZE];
        assert_eq!(request.encode(&mut buf), Ok(32));

        assert_eq!(Request::decode(ControlCode::PCI_CONFIG_IO, &buf), Ok(request));
        assert!(Request::decode(ControlCode::MAP_HW_INTO_USERMODE, &buf).is_err());
    }

    #[test]
    fn config_response_carries_value_and_count() {
        let out = 0x8086_u64.to_le_bytes();
        assert_eq!(
            Response::decode(ControlCode::PCI_CONFIG_IO, &out, 2),
            Ok(Response::ConfigIo {
                data: 0x8086,
                bytes: 2
            })
        );
        assert!(Response::decode(ControlCode::PCI_CONFIG_IO, &out[..4], 2).is_err());
    }
}
