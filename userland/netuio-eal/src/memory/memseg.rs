//! Memory segment lists built from the scratch pools the driver maps.
//!
//! Each mapped scratch pool becomes one [`MemsegList`]: the pool is cut into
//! [`PAGE_SIZE`] segments, every segment is marked used, and none is ever
//! handed back.
//!
//! ```text
//!  pool (phys P, virt V)
//!  ┌────────┬────────┬────────┬─────┬────────┐
//!  │ seg 0  │ seg 1  │ seg 2  │ ... │ seg n-1│   n = pool size / PAGE_SIZE
//!  └────────┴────────┴────────┴─────┴────────┘
//!   P, V     P+4K    P+8K            P+(n-1)*4K
//! ```

use crate::memory::arena::{Arena, ArenaError};
use log::debug;
use netuio_abi::{MemRegion, PhysicalAddress, USER_MEMORY_SEGMENT_SIZE, VirtualAddress};

/// Size of one memory segment.
pub const PAGE_SIZE: u64 = 4096;

/// Number of segment lists the configuration can hold, one per mapped pool.
pub const MAX_MEMSEG_LISTS: usize = 8;

/// Segments per list; one scratch pool fills a list exactly.
#[allow(clippy::cast_possible_truncation)]
pub const MAX_SEGS_PER_LIST: usize = (USER_MEMORY_SEGMENT_SIZE / PAGE_SIZE) as usize;

const _: () = {
    assert!(USER_MEMORY_SEGMENT_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(MAX_SEGS_PER_LIST == 65_536);
};

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MemsegError {
    #[error("no free memseg list for the pool of {size} bytes")]
    NoFreeList { size: u64 },
    #[error("pool of {size} bytes does not fit one memseg list")]
    PoolTooLarge { size: u64 },
    #[error("pool of {size} bytes holds no segment")]
    PoolTooSmall { size: u64 },
    #[error("pool at {0:?} is not mapped into this process")]
    Unmapped(PhysicalAddress),
    #[error("shared configuration has layout version {found}, expected {expected}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("shared configuration is corrupt: {0}")]
    Corrupt(&'static str),
    #[error("cannot reserve {len} bytes of address space: {reason}")]
    Reserve { len: u64, reason: String },
    #[error(transparent)]
    Arena(#[from] ArenaError),
}

/// One page-sized piece of a scratch pool.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Memseg {
    pub iova: PhysicalAddress,
    pub addr: VirtualAddress,
    pub len: u64,
    pub page_sz: u64,
    pub socket_id: i32,
}

/// The segments of one scratch pool.
#[derive(Clone, Debug, Default)]
pub struct MemsegList {
    pub name: String,
    pub page_sz: u64,
    pub socket_id: i32,
    pub base_va: VirtualAddress,
    pub segs: Arena<Memseg>,
}

impl MemsegList {
    /// `memseg-<page KiB>k-<socket>-<list index>`.
    #[must_use]
    pub fn name_for(page_sz: u64, socket_id: i32, index: usize) -> String {
        format!("memseg-{}k-{socket_id}-{index}", page_sz >> 10)
    }

    /// Bytes of address space the list spans.
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.page_sz * self.segs.capacity() as u64
    }

    /// Move the list's virtual range to `base`, keeping every segment's
    /// offset and IO address.
    pub fn rebase(&mut self, base: VirtualAddress) {
        let old = self.base_va.as_u64();
        for index in 0..self.segs.capacity() {
            if let Some(ms) = self.segs.get_mut(index) {
                ms.addr = base + (ms.addr.as_u64() - old);
            }
        }
        self.base_va = base;
    }

    /// Whether `va` falls inside the list's address range.
    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        let base = self.base_va.as_u64();
        va.as_u64() >= base && va.as_u64() - base < self.len_bytes()
    }
}

/// All memory segment lists of a runtime instance.
#[derive(Clone, Debug)]
pub struct MemConfig {
    lists: Arena<MemsegList>,
}

impl Default for MemConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MemConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lists: Arena::with_capacity(MAX_MEMSEG_LISTS),
        }
    }

    /// Publish a mapped scratch pool as a new segment list.
    ///
    /// The pool is cut into [`PAGE_SIZE`] segments on `socket_id`, all of
    /// them marked used. Returns the index of the list.
    pub fn store_pool(&mut self, pool: &MemRegion, socket_id: i32) -> Result<usize, MemsegError> {
        if pool.user_mapped_virt_addr.is_null() {
            return Err(MemsegError::Unmapped(pool.phys_addr));
        }
        let n_segs = usize::try_from(pool.size / PAGE_SIZE).unwrap_or(usize::MAX);
        if n_segs == 0 {
            return Err(MemsegError::PoolTooSmall { size: pool.size });
        }
        if n_segs > MAX_SEGS_PER_LIST {
            return Err(MemsegError::PoolTooLarge { size: pool.size });
        }
        let index = self
            .lists
            .first_free()
            .ok_or(MemsegError::NoFreeList { size: pool.size })?;

        let mut list = MemsegList {
            name: MemsegList::name_for(PAGE_SIZE, socket_id, index),
            page_sz: PAGE_SIZE,
            socket_id,
            base_va: pool.user_mapped_virt_addr,
            segs: Arena::with_capacity(n_segs),
        };
        let mut offset = 0;
        for i in 0..n_segs {
            list.segs.claim_at(
                i,
                Memseg {
                    iova: pool.phys_addr + offset,
                    addr: pool.user_mapped_virt_addr + offset,
                    len: PAGE_SIZE,
                    page_sz: PAGE_SIZE,
                    socket_id,
                },
            )?;
            offset += PAGE_SIZE;
        }

        debug!(
            "{}: {n_segs} segments at {:?} ({:?})",
            list.name, list.base_va, pool.phys_addr
        );
        self.lists.claim_at(index, list)?;
        Ok(index)
    }

    /// Put back a list read from the shared configuration.
    pub(crate) fn restore(&mut self, index: usize, list: MemsegList) -> Result<(), MemsegError> {
        self.lists.claim_at(index, list)?;
        Ok(())
    }

    #[must_use]
    pub fn list(&self, index: usize) -> Option<&MemsegList> {
        self.lists.get(index)
    }

    pub(crate) fn list_mut(&mut self, index: usize) -> Option<&mut MemsegList> {
        self.lists.get_mut(index)
    }

    /// Lists in use, in index order.
    pub fn lists(&self) -> impl Iterator<Item = (usize, &MemsegList)> {
        self.lists.iter()
    }

    /// Number of lists in use.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.lists.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// Translate an address inside the first list to its IO address.
    ///
    /// Returns `None` for addresses outside that list.
    #[must_use]
    pub fn virt_to_iova(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let list = self.lists.get(0)?;
        let first = list.segs.get(0)?;
        list.contains(va)
            .then(|| first.iova + (va.as_u64() - list.base_va.as_u64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(phys: u64, user: u64, size: u64) -> MemRegion {
        MemRegion {
            size,
            phys_addr: PhysicalAddress::new(phys),
            virt_addr: VirtualAddress::null(),
            user_mapped_virt_addr: VirtualAddress::new(user),
        }
    }

    #[test]
    fn pool_is_cut_into_strided_segments() {
        let mut config = MemConfig::new();
        let index = config
            .store_pool(&pool(0x1_0000_0000, 0x7F00_0000_0000, USER_MEMORY_SEGMENT_SIZE), 1)
            .unwrap();

        let list = config.list(index).unwrap();
        assert_eq!(index, 0);
        assert_eq!(list.name, "memseg-4k-1-0");
        assert_eq!(list.segs.len(), MAX_SEGS_PER_LIST);

        let last = list.segs.get(MAX_SEGS_PER_LIST - 1).unwrap();
        assert_eq!(last.iova.as_u64(), 0x1_0000_0000 + USER_MEMORY_SEGMENT_SIZE - PAGE_SIZE);
        assert_eq!(last.addr.as_u64(), 0x7F00_0000_0000 + USER_MEMORY_SEGMENT_SIZE - PAGE_SIZE);
        assert_eq!(last.socket_id, 1);
        assert_eq!(last.len, PAGE_SIZE);
    }

    #[test]
    fn lists_run_out() {
        let mut config = MemConfig::new();
        for i in 0..MAX_MEMSEG_LISTS as u64 {
            config.store_pool(&pool(i << 32, (i + 1) << 32, 8 * PAGE_SIZE), 0).unwrap();
        }
        assert_eq!(
            config.store_pool(&pool(0, 0x1000, 8 * PAGE_SIZE), 0),
            Err(MemsegError::NoFreeList { size: 8 * PAGE_SIZE })
        );
        assert_eq!(config.len(), MAX_MEMSEG_LISTS);
    }

    #[test]
    fn unusable_pools_are_rejected() {
        let mut config = MemConfig::new();
        assert!(matches!(
            config.store_pool(&pool(0x1000, 0, PAGE_SIZE), 0),
            Err(MemsegError::Unmapped(_))
        ));
        assert!(matches!(
            config.store_pool(&pool(0x1000, 0x2000, PAGE_SIZE - 1), 0),
            Err(MemsegError::PoolTooSmall { .. })
        ));
        assert!(matches!(
            config.store_pool(&pool(0x1000, 0x2000, 2 * USER_MEMORY_SEGMENT_SIZE), 0),
            Err(MemsegError::PoolTooLarge { .. })
        ));
        assert!(config.is_empty());
    }

    #[test]
    fn virt_to_iova_uses_first_list() {
        let mut config = MemConfig::new();
        assert_eq!(config.virt_to_iova(VirtualAddress::new(0x5000)), None);

        config
            .store_pool(&pool(0x8000_0000, 0x10_0000, 16 * PAGE_SIZE), 0)
            .unwrap();

        assert_eq!(
            config.virt_to_iova(VirtualAddress::new(0x10_0000 + 0x1234)),
            Some(PhysicalAddress::new(0x8000_1234))
        );
        assert_eq!(config.virt_to_iova(VirtualAddress::new(0x10_0000 + 16 * PAGE_SIZE)), None);
        assert_eq!(config.virt_to_iova(VirtualAddress::new(0xF_FFFF)), None);
    }
}
