//! Address-space reservations of a secondary process.
//!
//! A secondary cannot map the primary's scratch pools: the driver hands each
//! pool to one process only. It reserves an equally sized range per published
//! list instead, asking for the base the primary recorded. When the system
//! places the range elsewhere, the secondary's copy of the list is rebased
//! onto it, so local translations stay inside memory this process owns.

use crate::memory::memseg::{MemConfig, MemsegError};
use log::{debug, error, warn};
use netuio_abi::VirtualAddress;
use std::io;

/// A reserved, inaccessible range standing in for one published list.
#[derive(Debug)]
pub struct Reservation {
    list: usize,
    range: Range,
}

impl Reservation {
    /// Index of the list this range belongs to.
    #[must_use]
    pub const fn list(&self) -> usize {
        self.list
    }

    /// Local base of the reserved range.
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.range.base
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.range.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.range.len == 0
    }
}

#[cfg(unix)]
#[derive(Debug)]
struct Range {
    base: VirtualAddress,
    len: usize,
}

#[cfg(unix)]
impl Range {
    fn reserve(hint: VirtualAddress, len: usize) -> io::Result<Self> {
        let hint = usize::try_from(hint.as_u64()).unwrap_or(0);
        // SAFETY: without MAP_FIXED the hint never replaces an existing mapping.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::without_provenance_mut(hint),
                len,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            base: VirtualAddress::new(ptr.addr() as u64),
            len,
        })
    }
}

#[cfg(unix)]
impl Drop for Range {
    fn drop(&mut self) {
        let addr = usize::try_from(self.base.as_u64()).unwrap_or(0);
        // SAFETY: the range was mapped by `reserve` and nothing else refers to it.
        unsafe {
            libc::munmap(core::ptr::without_provenance_mut(addr), self.len);
        }
    }
}

#[cfg(not(unix))]
#[derive(Debug)]
struct Range {
    base: VirtualAddress,
    len: usize,
    _map: memmap2::MmapMut,
}

#[cfg(not(unix))]
impl Range {
    fn reserve(_hint: VirtualAddress, len: usize) -> io::Result<Self> {
        let map = memmap2::MmapOptions::new().len(len).map_anon()?;
        Ok(Self {
            base: VirtualAddress::new(map.as_ptr().addr() as u64),
            len,
            _map: map,
        })
    }
}

/// Reserve address space for every list of an attached configuration.
///
/// Lists whose recorded base could not be had are rebased onto the range
/// actually reserved.
pub fn reserve_lists(config: &mut MemConfig) -> Result<Vec<Reservation>, MemsegError> {
    let wanted: Vec<(usize, VirtualAddress, u64)> = config
        .lists()
        .filter(|(_, list)| list.segs.capacity() != 0)
        .map(|(index, list)| (index, list.base_va, list.len_bytes()))
        .collect();

    let mut reserved = Vec::with_capacity(wanted.len());
    for (index, base_va, len) in wanted {
        let size = usize::try_from(len).map_err(|_| MemsegError::Reserve {
            len,
            reason: "larger than the address space".to_owned(),
        })?;
        let range = Range::reserve(base_va, size).map_err(|e| {
            error!("Cannot reserve memory for memseg list {index}: {e}");
            MemsegError::Reserve {
                len,
                reason: e.to_string(),
            }
        })?;

        if let Some(list) = config.list_mut(index) {
            if range.base == base_va {
                debug!("{}: reserved {len} bytes at {base_va:?}", list.name);
            } else {
                warn!(
                    "{}: {base_va:?} is taken, using {:?} instead",
                    list.name, range.base
                );
                list.rebase(range.base);
            }
        }
        reserved.push(Reservation { list: index, range });
    }
    Ok(reserved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::memseg::PAGE_SIZE;
    use netuio_abi::{MemRegion, PhysicalAddress};

    #[test]
    fn reservations_back_the_local_lists() {
        let mut config = MemConfig::new();
        let pool = MemRegion {
            size: 64 * PAGE_SIZE,
            phys_addr: PhysicalAddress::new(0x1000_0000),
            virt_addr: VirtualAddress::null(),
            user_mapped_virt_addr: VirtualAddress::new(0x6E00_0000_0000),
        };
        config.store_pool(&pool, 0).unwrap();
        config.store_pool(&pool, 0).unwrap();

        let reserved = reserve_lists(&mut config).unwrap();

        assert_eq!(reserved.len(), 2);
        assert_eq!(reserved[1].list(), 1);
        assert_eq!(reserved[0].len() as u64, 64 * PAGE_SIZE);
        assert_ne!(reserved[0].base(), reserved[1].base());
        for r in &reserved {
            let list = config.list(r.list()).unwrap();
            assert_eq!(list.base_va, r.base());
            assert_eq!(list.segs.get(1).unwrap().addr, r.base() + PAGE_SIZE);
            assert_eq!(list.segs.get(1).unwrap().iova.as_u64(), 0x1000_0000 + PAGE_SIZE);
        }
        assert_eq!(
            config.virt_to_iova(reserved[0].base() + 0x10),
            Some(PhysicalAddress::new(0x1000_0010))
        );
    }
}
