//! PCI type 0 configuration header decoding.

use bitfield_struct::bitfield;
use netuio_abi::PCI_MAX_BAR;

/// Size of the common configuration header read at hardware-prepare time.
pub const PCI_COMMON_HEADER_LENGTH: usize = 64;

/// Offset of `BaseAddresses[0]` within the header.
const BAR0_OFFSET: usize = 0x10;

/// Slot address property of a PCI device.
///
/// The platform packs the device number into the high and the function
/// number into the low 16 bits.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct SlotAddress {
    pub function: u16,
    pub device: u16,
}

/// Raw base address register.
#[bitfield(u32)]
#[derive(Eq, PartialEq)]
pub struct BarRegister {
    /// Bit 0: I/O space indicator.
    pub io_space: bool,

    /// Bits 1-2: memory type: `0b00` 32-bit, `0b10` 64-bit.
    #[bits(2)]
    pub memory_type: u8,

    /// Bit 3: prefetchable.
    pub prefetchable: bool,

    /// Bits 4-31: base address, 16-byte aligned.
    #[bits(28)]
    pub address_high: u32,
}

impl BarRegister {
    const MEMORY_TYPE_64BIT: u8 = 0b10;

    /// The low half of a 64-bit BAR pair. The next slot holds the upper 32 bits.
    #[must_use]
    pub const fn is_64bit(&self) -> bool {
        self.memory_type() == Self::MEMORY_TYPE_64BIT
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.into_bits() == 0
    }

    /// Base address with the flag bits masked off.
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.into_bits() & !0xF
    }
}

/// The first 64 bytes of a function's configuration space.
#[derive(Clone, Eq, PartialEq)]
pub struct CommonHeader {
    raw: [u8; PCI_COMMON_HEADER_LENGTH],
}

impl CommonHeader {
    #[must_use]
    pub const fn from_bytes(raw: [u8; PCI_COMMON_HEADER_LENGTH]) -> Self {
        Self { raw }
    }

    #[must_use]
    pub const fn vendor_id(&self) -> u16 {
        u16::from_le_bytes([self.raw[0], self.raw[1]])
    }

    #[must_use]
    pub const fn device_id(&self) -> u16 {
        u16::from_le_bytes([self.raw[2], self.raw[3]])
    }

    /// Raw register of BAR slot `index`.
    ///
    /// # Panics
    /// If `index >= PCI_MAX_BAR`.
    #[must_use]
    pub const fn bar(&self, index: usize) -> BarRegister {
        assert!(index < PCI_MAX_BAR);
        let at = BAR0_OFFSET + index * 4;
        BarRegister::from_bits(u32::from_le_bytes([
            self.raw[at],
            self.raw[at + 1],
            self.raw[at + 2],
            self.raw[at + 3],
        ]))
    }

    /// Which BAR slots hold the start of a memory BAR.
    ///
    /// Zero slots and the slot following a 64-bit BAR are absent.
    #[must_use]
    pub fn present_bars(&self) -> [bool; PCI_MAX_BAR] {
        let mut present = [false; PCI_MAX_BAR];
        let mut prev = BarRegister::new();
        for (index, slot) in present.iter_mut().enumerate() {
            let curr = self.bar(index);
            *slot = !(curr.is_zero() || prev.is_64bit());
            prev = curr;
        }
        present
    }
}

const _: () = {
    assert!(BAR0_OFFSET + PCI_MAX_BAR * 4 <= PCI_COMMON_HEADER_LENGTH);
};

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_bars(bars: [u32; PCI_MAX_BAR]) -> CommonHeader {
        let mut raw = [0u8; PCI_COMMON_HEADER_LENGTH];
        raw[0..2].copy_from_slice(&0x8086u16.to_le_bytes());
        raw[2..4].copy_from_slice(&0x153Au16.to_le_bytes());
        for (i, bar) in bars.iter().enumerate() {
            let at = BAR0_OFFSET + i * 4;
            raw[at..at + 4].copy_from_slice(&bar.to_le_bytes());
        }
        CommonHeader::from_bytes(raw)
    }

    #[test]
    fn slot_address_splits_device_and_function() {
        let slot = SlotAddress::from_bits(0x001F_0003);
        assert_eq!(slot.device(), 0x1F);
        assert_eq!(slot.function(), 3);
    }

    #[test]
    fn bar_flags_decode() {
        let bar = BarRegister::from_bits(0xF7E0_000C);
        assert!(bar.is_64bit());
        assert!(bar.prefetchable());
        assert!(!bar.io_space());
        assert_eq!(bar.base(), 0xF7E0_0000);
    }

    #[test]
    fn upper_half_of_64bit_pair_is_absent() {
        let header = header_with_bars([0xF7E0_0004, 0x0000_0001, 0, 0xF7F0_0000, 0, 0]);
        assert_eq!(header.vendor_id(), 0x8086);
        assert_eq!(header.device_id(), 0x153A);
        assert_eq!(
            header.present_bars(),
            [true, false, false, true, false, false]
        );
    }
}
