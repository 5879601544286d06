//! # netuio Environment Abstraction Layer
//!
//! Userspace bring-up of a packet-processing runtime on top of the `netuio`
//! driver.
//!
//! ## Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | instance settings and the paths derived from them |
//! | [`pci`] | walks the device tree, parses registry strings, maps devices |
//! | [`memory`] | turns mapped scratch pools into memory segment lists |
//! | [`process`] | primary/secondary election over the shared configuration file |
//! | [`Eal`] | ties the above together into one context object |
//!
//! ## Bring-up
//!
//! ```text
//!  EalConfig ──▶ SharedConfig::open ──┬── primary ──▶ pci::scan ──▶ MemConfig::store_pool
//!                                     │                  │
//!                                     │                  ▼
//!                                     │             publish + mark complete
//!                                     │
//!                                     └── secondary ─▶ wait complete ──▶ load + reserve
//! ```
//!
//! The platform's device tree and driver handles come in through the
//! [`pci::DeviceTree`] and [`pci::ControlChannel`] traits.

pub mod config;
mod eal;
pub mod memory;
pub mod pci;
pub mod process;

pub use crate::config::{ConfigError, EalConfig, ProcessType};
pub use crate::eal::{Eal, EalError};
