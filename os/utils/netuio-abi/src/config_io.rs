use crate::wire::{Reader, Writer};
use crate::{AbiError, DevAddr};
use core::mem::offset_of;

/// Direction of a configuration-space access (`enum pci_io`).
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ConfigOp {
    Read = 0,
    Write = 1,
}

impl TryFrom<u32> for ConfigOp {
    type Error = AbiError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            other => Err(AbiError::InvalidOperation(other)),
        }
    }
}

/// Width of a single configuration-space access.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AccessWidth {
    Byte = 1,
    Word = 2,
    Dword = 4,
    Qword = 8,
}

impl AccessWidth {
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for AccessWidth {
    type Error = AbiError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Word),
            4 => Ok(Self::Dword),
            8 => Ok(Self::Qword),
            other => Err(AbiError::InvalidAccessWidth(other)),
        }
    }
}

/// Payload of the Config-IO request (`struct dpdk_pci_config_io`).
///
/// `op` and `access_size` are kept raw so that malformed requests survive
/// decoding and are rejected by the driver with a protocol status instead.
/// `data` is the union of the 1/2/4/8-byte write value, stored little-endian
/// in the low bytes.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigIo {
    pub dev_addr: DevAddr,
    pub offset: u32,
    pub op: u32,
    pub access_size: u32,
    _pad: u32,
    pub data: u64,
}

impl ConfigIo {
    pub const SIZE: usize = 32;

    #[must_use]
    pub const fn read(dev_addr: DevAddr, offset: u32, width: AccessWidth) -> Self {
        Self {
            dev_addr,
            offset,
            op: ConfigOp::Read as u32,
            access_size: width as u32,
            _pad: 0,
            data: 0,
        }
    }

    #[must_use]
    pub const fn write(dev_addr: DevAddr, offset: u32, width: AccessWidth, data: u64) -> Self {
        Self {
            dev_addr,
            offset,
            op: ConfigOp::Write as u32,
            access_size: width as u32,
            _pad: 0,
            data,
        }
    }

    /// A request with arbitrary, possibly invalid, operation and width.
    #[must_use]
    pub const fn raw(dev_addr: DevAddr, offset: u32, op: u32, access_size: u32, data: u64) -> Self {
        Self {
            dev_addr,
            offset,
            op,
            access_size,
            _pad: 0,
            data,
        }
    }

    /// # Errors
    /// [`AbiError::InvalidAccessWidth`] unless the width is 1, 2, 4 or 8.
    pub fn width(&self) -> Result<AccessWidth, AbiError> {
        AccessWidth::try_from(self.access_size)
    }

    /// # Errors
    /// [`AbiError::InvalidOperation`] unless the operation is read or write.
    pub fn operation(&self) -> Result<ConfigOp, AbiError> {
        ConfigOp::try_from(self.op)
    }

    /// # Errors
    /// [`AbiError::BufferSize`] if `out` is shorter than [`Self::SIZE`].
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, AbiError> {
        let mut w = Writer::new(out, Self::SIZE)?;
        self.dev_addr.write(&mut w);
        w.u32(self.offset);
        w.u32(self.op);
        w.u32(self.access_size);
        w.u32(0);
        w.u64(self.data);
        debug_assert_eq!(w.position(), Self::SIZE);
        Ok(Self::SIZE)
    }

    /// # Errors
    /// [`AbiError::BufferSize`] unless `buf` is exactly [`Self::SIZE`] bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, AbiError> {
        let mut r = Reader::new(buf, Self::SIZE)?;
        let dev_addr = DevAddr::read(&mut r);
        let offset = r.u32();
        let op = r.u32();
        let access_size = r.u32();
        let _pad = r.u32();
        let data = r.u64();
        Ok(Self::raw(dev_addr, offset, op, access_size, data))
    }
}

const _: () = {
    assert!(size_of::<ConfigIo>() == ConfigIo::SIZE);
    assert!(align_of::<ConfigIo>() == 8);
    assert!(offset_of!(ConfigIo, offset) == 8);
    assert!(offset_of!(ConfigIo, op) == 12);
    assert!(offset_of!(ConfigIo, access_size) == 16);
    assert!(offset_of!(ConfigIo, data) == 24);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_four_widths_are_legal() {
        for w in [1, 2, 4, 8] {
            assert!(AccessWidth::try_from(w).is_ok());
        }
        for w in [0, 3, 5, 16, u32::MAX] {
            assert_eq!(
                AccessWidth::try_from(w),
                Err(AbiError::InvalidAccessWidth(w))
            );
        }
    }

    #[test]
    fn malformed_fields_survive_decoding() {
        let io = ConfigIo::raw(DevAddr::default(), 0x10, 7, 3, 0);
        let mut buf = [0u8; ConfigIo::SIZE];
        io.encode(&mut buf).unwrap();

        let back = ConfigIo::decode(&buf).unwrap();
        assert_eq!(back.width(), Err(AbiError::InvalidAccessWidth(3)));
        assert_eq!(back.operation(), Err(AbiError::InvalidOperation(7)));
    }

    #[test]
    fn write_data_sits_in_union_slot() {
        let io = ConfigIo::write(DevAddr::default(), 4, AccessWidth::Word, 0xBEEF);
        let mut buf = [0u8; ConfigIo::SIZE];
        io.encode(&mut buf).unwrap();
        assert_eq!(&buf[12..16], &1u32.to_le_bytes());
        assert_eq!(&buf[16..20], &2u32.to_le_bytes());
        assert_eq!(&buf[24..26], &0xBEEFu16.to_le_bytes());
    }
}
