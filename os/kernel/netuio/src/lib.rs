//! # netuio Kernel Mapping Driver
//!
//! Per-device mediator that owns a PCI function's register ranges (BARs) and
//! one physically contiguous scratch pool, and hands both to exactly one
//! userspace process through the [`netuio_abi`] protocol.
//!
//! ## Lifecycle
//!
//! ```text
//!   attach ──────────► Attached ── prepare_hardware ──► HardwarePrepared
//!   (B:D:F, NUMA,                                          │      ▲
//!    scratch pool)                           Map Hardware  │      │ file_cleanup
//!                                          (caller context)▼      │
//!                                                         UserMapped
//!                                                              │
//!   remove / drop ────────────────────────────────────────► Released
//! ```
//!
//! * **Attach** reads the device's bus number, slot address and NUMA node
//!   from the platform and allocates the cached, contiguous scratch pool of
//!   [`USER_MEMORY_SEGMENT_SIZE`](netuio_abi::USER_MEMORY_SEGMENT_SIZE) bytes.
//! * **Prepare** walks the six BAR slots of the configuration header, pairs
//!   each present BAR with the next memory resource the platform assigned and
//!   maps it into kernel space, non-cached.
//! * **Map Hardware** runs in the requesting process's context: it zeroes the
//!   pool and maps the pool plus every present BAR into that process, all or
//!   nothing.
//! * **Config-IO** is served from the parallel queue through the bus accessor.
//! * **File cleanup** undoes the process mappings; it must be invoked from the
//!   process that created them.
//!
//! Platform services are reached through the [`PciBus`] and [`KernelMemory`]
//! traits. With the `fake` feature, [`fake`] provides in-memory versions.

#![cfg_attr(not(any(test, doctest, feature = "fake")), no_std)]
#![forbid(unsafe_code)]

mod device;
mod error;
pub mod pci;
pub mod platform;
mod queue;

#[cfg(any(test, feature = "fake"))]
pub mod fake;

pub use crate::device::{DeviceState, NetuioDevice};
pub use crate::error::DriverError;
pub use crate::platform::{
    CacheType, Caller, FileHandle, KernelMemory, KernelRegion, PciBus, ProcessId,
    ResourceDescriptor,
};
pub use crate::queue::{Completion, Dispatch, IoRequest};
