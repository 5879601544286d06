//! # netuio Device-Control Protocol
//!
//! Fixed-layout request/response records exchanged between a userspace
//! packet-processing runtime and the `netuio` kernel driver.
//!
//! ## Overview
//!
//! The driver understands exactly two device-control requests:
//!
//! | Request | Control code | Payload | Dispatch |
//! |---------|--------------|---------|----------|
//! | [`RequestKind::MapHardware`] | [`ControlCode::MAP_HW_INTO_USERMODE`] | [`HardwareInfo`] in / [`HardwareInfo`] out | in caller context |
//! | [`RequestKind::ConfigIo`] | [`ControlCode::PCI_CONFIG_IO`] | [`ConfigIo`] in / 8 bytes out | parallel queue |
//!
//! Both payloads embed the caller's idea of the device's bus/device/function
//! ([`DevAddr`]); the driver rejects any request whose address does not match
//! its own with [`NetuioStatus::NotSameDevice`].
//!
//! ## Binary layout
//!
//! The records are `#[repr(C)]` and keep the field order and widths of the
//! deployed driver (8-byte packing). Every size and field offset is asserted
//! at compile time next to the type, so a layout drift fails the build rather
//! than corrupting the boundary. [`Request`] and [`Response`] wrap the records
//! into a tagged union with explicit little-endian encoding for clients that do
//! not share this crate's memory layout.
//!
//! ```rust
//! # use netuio_abi::*;
//! let addr = DeviceAddress::new(0, 5, 0, 0);
//! let request = Request::MapHardware(HardwareInfo::request(addr.to_wire(), 0x153A));
//!
//! let mut buf = [0u8; HardwareInfo::SIZE];
//! let len = request.encode(&mut buf).unwrap();
//! assert_eq!(len, 240);
//!
//! let decoded = Request::decode(request.control_code(), &buf).unwrap();
//! assert_eq!(decoded, request);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![forbid(unsafe_code)]

mod address;
mod config_io;
mod control;
mod device;
mod error;
mod hardware;
mod request;
mod status;
mod wire;

pub use crate::address::{PhysicalAddress, VirtualAddress};
pub use crate::config_io::{AccessWidth, ConfigIo, ConfigOp};
pub use crate::control::{ControlCode, RequestCapabilities, RequestKind};
pub use crate::device::{
    DOS_DEVICES_PREFIX, DevAddr, DeviceAddress, DriverName, PrefixedName, USER_DEVICE_PREFIX,
};
pub use crate::error::AbiError;
pub use crate::hardware::{HardwareInfo, MemRegion};
pub use crate::request::{Request, Response};
pub use crate::status::NetuioStatus;

/// Version of the request/response contract described by this crate.
///
/// Bumped whenever a record changes shape or a control code changes meaning.
/// The records themselves carry no version field, since their layout is
/// fixed by the deployed driver. Processes sharing one runtime instance
/// compare it through the layout version of the shared configuration.
pub const ABI_VERSION: u32 = 1;

/// Number of base address registers of a PCI type 0 header.
pub const PCI_MAX_BAR: usize = 6;

/// Size of the physically contiguous scratch pool the driver hands out per device.
pub const USER_MEMORY_SEGMENT_SIZE: u64 = 256 * 1024 * 1024;

/// Prefix of the per-device symbolic link, see [`DriverName`].
pub const NETUIO_DRIVER_NAME: &str = "netuio";

const _: () = {
    assert!(USER_MEMORY_SEGMENT_SIZE.is_power_of_two());
    assert!(USER_MEMORY_SEGMENT_SIZE.is_multiple_of(4096));
    assert!(PCI_MAX_BAR == 6);
};
