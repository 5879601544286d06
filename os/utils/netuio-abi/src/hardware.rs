use crate::wire::{Reader, Writer};
use crate::{AbiError, DevAddr, PCI_MAX_BAR, PhysicalAddress, VirtualAddress};
use core::mem::offset_of;

/// One memory region: a BAR or the scratch pool (`struct mem_region`).
///
/// ### Fields
/// - `size`: length in bytes; `0` marks an absent BAR.
/// - `phys_addr`: physical base of the region.
/// - `virt_addr`: the region's kernel mapping. Never filled in responses.
/// - `user_mapped_virt_addr`: base of the mapping inside the requesting
///   process, valid until that process closes its handle.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MemRegion {
    pub size: u64,
    pub phys_addr: PhysicalAddress,
    pub virt_addr: VirtualAddress,
    pub user_mapped_virt_addr: VirtualAddress,
}

impl MemRegion {
    pub const SIZE: usize = 32;

    /// A region the process can access.
    #[must_use]
    pub const fn is_mapped(&self) -> bool {
        self.size != 0 && !self.user_mapped_virt_addr.is_null()
    }

    fn write(&self, w: &mut Writer<'_>) {
        w.u64(self.size);
        w.u64(self.phys_addr.as_u64());
        w.u64(self.virt_addr.as_u64());
        w.u64(self.user_mapped_virt_addr.as_u64());
    }

    fn read(r: &mut Reader<'_>) -> Self {
        Self {
            size: r.u64(),
            phys_addr: PhysicalAddress::new(r.u64()),
            virt_addr: VirtualAddress::new(r.u64()),
            user_mapped_virt_addr: VirtualAddress::new(r.u64()),
        }
    }
}

const _: () = {
    assert!(size_of::<MemRegion>() == MemRegion::SIZE);
    assert!(offset_of!(MemRegion, phys_addr) == 8);
    assert!(offset_of!(MemRegion, virt_addr) == 16);
    assert!(offset_of!(MemRegion, user_mapped_virt_addr) == 24);
};

/// Payload of the Map-Hardware request and response (`struct dpdk_private_info`).
///
/// The request carries the caller's view of the device (address and IDs);
/// the response carries every BAR slot, the scratch pool and the NUMA node.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct HardwareInfo {
    pub hw: [MemRegion; PCI_MAX_BAR],
    pub ms: MemRegion,
    pub dev_addr: DevAddr,
    pub dev_id: u16,
    pub sub_dev_id: u16,
    pub dev_numa_node: u16,
    pub reserved: u16,
}

impl HardwareInfo {
    pub const SIZE: usize = 240;

    /// A request for the device at `dev_addr` with PCI device ID `dev_id`.
    #[must_use]
    pub fn request(dev_addr: DevAddr, dev_id: u16) -> Self {
        Self {
            dev_addr,
            dev_id,
            ..Self::default()
        }
    }

    /// Serialize into `out`, returning the number of bytes written.
    ///
    /// # Errors
    /// [`AbiError::BufferSize`] if `out` is shorter than [`Self::SIZE`].
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, AbiError> {
        let mut w = Writer::new(out, Self::SIZE)?;
        for region in &self.hw {
            region.write(&mut w);
        }
        self.ms.write(&mut w);
        self.dev_addr.write(&mut w);
        w.u16(self.dev_id);
        w.u16(self.sub_dev_id);
        w.u16(self.dev_numa_node);
        w.u16(self.reserved);
        debug_assert_eq!(w.position(), Self::SIZE);
        Ok(Self::SIZE)
    }

    /// Deserialize from a buffer of exactly [`Self::SIZE`] bytes.
    ///
    /// # Errors
    /// [`AbiError::BufferSize`] on any other length.
    pub fn decode(buf: &[u8]) -> Result<Self, AbiError> {
        let mut r = Reader::new(buf, Self::SIZE)?;
        let mut hw = [MemRegion::default(); PCI_MAX_BAR];
        for region in &mut hw {
            *region = MemRegion::read(&mut r);
        }
        Ok(Self {
            hw,
            ms: MemRegion::read(&mut r),
            dev_addr: DevAddr::read(&mut r),
            dev_id: r.u16(),
            sub_dev_id: r.u16(),
            dev_numa_node: r.u16(),
            reserved: r.u16(),
        })
    }
}

const _: () = {
    assert!(size_of::<HardwareInfo>() == HardwareInfo::SIZE);
    assert!(align_of::<HardwareInfo>() == 8);
    assert!(offset_of!(HardwareInfo, ms) == PCI_MAX_BAR * MemRegion::SIZE);
    assert!(offset_of!(HardwareInfo, dev_addr) == 224);
    assert!(offset_of!(HardwareInfo, dev_id) == 232);
    assert!(offset_of!(HardwareInfo, sub_dev_id) == 234);
    assert!(offset_of!(HardwareInfo, dev_numa_node) == 236);
    assert!(offset_of!(HardwareInfo, reserved) == 238);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_land_at_native_offsets() {
        let mut info = HardwareInfo::request(
            DevAddr {
                bus_num: 5,
                dev_num: 1,
                func_num: 2,
            },
            0x153A,
        );
        info.hw[1].size = 0x2_0000;
        info.ms.phys_addr = PhysicalAddress::new(0x1_0000_0000);
        info.dev_numa_node = 1;

        let mut buf = [0u8; HardwareInfo::SIZE];
        info.encode(&mut buf).unwrap();

        assert_eq!(&buf[32..40], &0x2_0000u64.to_le_bytes());
        assert_eq!(&buf[200..208], &0x1_0000_0000u64.to_le_bytes());
        assert_eq!(&buf[224..228], &5u32.to_le_bytes());
        assert_eq!(&buf[228..230], &1u16.to_le_bytes());
        assert_eq!(&buf[230..232], &2u16.to_le_bytes());
        assert_eq!(&buf[232..234], &0x153Au16.to_le_bytes());
        assert_eq!(&buf[236..238], &1u16.to_le_bytes());
    }

    #[test]
    fn decode_rejects_short_and_long_buffers() {
        let buf = [0u8; HardwareInfo::SIZE + 8];
        assert_eq!(
            HardwareInfo::decode(&buf[..HardwareInfo::SIZE - 1]),
            Err(AbiError::BufferSize {
                expected: 240,
                actual: 239
            })
        );
        assert!(HardwareInfo::decode(&buf).is_err());
        assert!(HardwareInfo::decode(&buf[..HardwareInfo::SIZE]).is_ok());
    }

    #[test]
    fn encode_needs_room_for_whole_record() {
        let mut small = [0u8; 16];
        assert!(HardwareInfo::default().encode(&mut small).is_err());
    }
}
