use crate::NETUIO_DRIVER_NAME;
use crate::wire::{Reader, Writer};
use core::fmt;

/// Kernel namespace prefix of the per-device symbolic link.
pub const DOS_DEVICES_PREFIX: &str = "\\DosDevices\\";

/// Userspace prefix for opening a symbolic link by name.
pub const USER_DEVICE_PREFIX: &str = "\\\\.\\";

/// PCI location of a device: domain, bus, device and function.
///
/// The ordering is lexicographic over the fields, which is the order the
/// device list is kept in. The domain is always `0` on the platforms this
/// driver targets.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DeviceAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl DeviceAddress {
    #[must_use]
    pub const fn new(domain: u16, bus: u8, device: u8, function: u8) -> Self {
        Self {
            domain,
            bus,
            device,
            function,
        }
    }

    /// The bus/device/function triple as carried in requests.
    #[must_use]
    pub const fn to_wire(self) -> DevAddr {
        DevAddr {
            bus_num: self.bus as u32,
            dev_num: self.device as u16,
            func_num: self.function as u16,
        }
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

/// Wire form of a bus/device/function triple (`struct dev_addr`).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DevAddr {
    pub bus_num: u32,
    pub dev_num: u16,
    pub func_num: u16,
}

impl DevAddr {
    pub const SIZE: usize = 8;

    pub(crate) fn write(&self, w: &mut Writer<'_>) {
        w.u32(self.bus_num);
        w.u16(self.dev_num);
        w.u16(self.func_num);
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> Self {
        Self {
            bus_num: r.u32(),
            dev_num: r.u16(),
            func_num: r.u16(),
        }
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}:{:02}:{:02}",
            self.bus_num, self.dev_num, self.func_num
        )
    }
}

const _: () = {
    assert!(size_of::<DevAddr>() == DevAddr::SIZE);
    assert!(align_of::<DevAddr>() == 4);
    assert!(core::mem::offset_of!(DevAddr, dev_num) == 4);
    assert!(core::mem::offset_of!(DevAddr, func_num) == 6);
};

/// Human-addressable name of a device's driver instance.
///
/// Rendered as `netuio_<bus><device><function>` with the fields in decimal,
/// zero-padded to 4, 2 and 2 digits, e.g. `netuio_00050000` for bus 5,
/// device 0, function 0.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DriverName(pub DevAddr);

impl fmt::Display for DriverName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{NETUIO_DRIVER_NAME}_{:04}{:02}{:02}",
            self.0.bus_num, self.0.dev_num, self.0.func_num
        )
    }
}

impl DriverName {
    /// The symbolic link the driver registers, e.g. `\DosDevices\netuio_00050000`.
    #[must_use]
    pub const fn kernel_link(self) -> PrefixedName {
        PrefixedName {
            prefix: DOS_DEVICES_PREFIX,
            name: self,
        }
    }

    /// The path a process opens to reach the link, e.g. `\\.\netuio_00050000`.
    #[must_use]
    pub const fn user_path(self) -> PrefixedName {
        PrefixedName {
            prefix: USER_DEVICE_PREFIX,
            name: self,
        }
    }
}

/// A [`DriverName`] rendered below a namespace prefix.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PrefixedName {
    prefix: &'static str,
    name: DriverName,
}

impl fmt::Display for PrefixedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_orders_by_bus_then_device_then_function() {
        let a = DeviceAddress::new(0, 1, 0, 0);
        let b = DeviceAddress::new(0, 1, 0, 1);
        let c = DeviceAddress::new(0, 1, 2, 0);
        let d = DeviceAddress::new(0, 2, 0, 0);
        assert!(a < b && b < c && c < d);
    }

    #[test]
    fn address_display_matches_pci_notation() {
        let addr = DeviceAddress::new(0, 0x3b, 0x1f, 3);
        assert_eq!(format!("{addr}"), "0000:3b:1f.3");
    }

    #[test]
    fn driver_name_is_zero_padded_decimal() {
        let name = DriverName(DeviceAddress::new(0, 5, 0, 0).to_wire());
        assert_eq!(format!("{name}"), "netuio_00050000");

        let name = DriverName(DeviceAddress::new(0, 130, 17, 1).to_wire());
        assert_eq!(format!("{name}"), "netuio_01301701");
    }

    #[test]
    fn link_and_user_path_share_the_name() {
        let name = DriverName(DeviceAddress::new(0, 5, 0, 0).to_wire());
        assert_eq!(
            name.kernel_link().to_string(),
            "\\DosDevices\\netuio_00050000"
        );
        assert_eq!(name.user_path().to_string(), "\\\\.\\netuio_00050000");
    }
}
