//! Memory segment registry.
//!
//! The primary turns every mapped scratch pool into a [`MemsegList`] and
//! writes the lists into the shared configuration ([`layout`]). A secondary
//! reads them back and reserves matching address space.

mod arena;
pub mod layout;
mod memseg;
mod reserve;

pub use arena::{Arena, ArenaError};
pub use memseg::{
    MAX_MEMSEG_LISTS, MAX_SEGS_PER_LIST, MemConfig, Memseg, MemsegError, MemsegList, PAGE_SIZE,
};
pub use reserve::{Reservation, reserve_lists};
