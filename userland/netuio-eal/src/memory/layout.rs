//! Byte layout of the memory configuration inside the shared region.
//!
//! All fields are little-endian.
//!
//! | Offset | Size | Content |
//! |--------|------|---------|
//! | 0 | 4 | completion marker, owned by [`crate::process::SharedConfig`] |
//! | 4 | 4 | layout version ([`LAYOUT_VERSION`]) |
//! | 8 | 4 | list capacity ([`MAX_MEMSEG_LISTS`]) |
//! | 12 | 4 | segments per list ([`MAX_SEGS_PER_LIST`]) |
//! | 16 | 96 × lists | list headers |
//! | ... | 40 × segments × lists | segment records, list by list |
//!
//! A list header is `in_use u32, n_segs u32, page_sz u64, base_va u64,
//! socket_id i32, name_len u32, name [u8; 64]`. A segment record is
//! `in_use u32, socket_id i32, iova u64, addr u64, len u64, page_sz u64`.

use crate::memory::arena::Arena;
use crate::memory::memseg::{
    MAX_MEMSEG_LISTS, MAX_SEGS_PER_LIST, MemConfig, Memseg, MemsegError, MemsegList,
};
use netuio_abi::{ABI_VERSION, PhysicalAddress, VirtualAddress};

/// Version of the layout below; follows the protocol version.
pub const LAYOUT_VERSION: u32 = ABI_VERSION;

const HEADER_SIZE: usize = 16;
const NAME_SIZE: usize = 64;
const LIST_HEADER_SIZE: usize = 96;
const SEG_SIZE: usize = 40;
const LISTS_OFFSET: usize = HEADER_SIZE;
const SEGS_OFFSET: usize = LISTS_OFFSET + MAX_MEMSEG_LISTS * LIST_HEADER_SIZE;

/// Bytes the shared region must hold.
pub const CONFIG_SIZE: usize = SEGS_OFFSET + MAX_MEMSEG_LISTS * MAX_SEGS_PER_LIST * SEG_SIZE;

const _: () = {
    assert!(32 + NAME_SIZE == LIST_HEADER_SIZE);
    assert!(SEGS_OFFSET.is_multiple_of(8));
};

#[allow(clippy::cast_possible_truncation)]
const fn as_u32(v: usize) -> u32 {
    v as u32
}

const fn list_offset(index: usize) -> usize {
    LISTS_OFFSET + index * LIST_HEADER_SIZE
}

const fn seg_offset(list: usize, seg: usize) -> usize {
    SEGS_OFFSET + (list * MAX_SEGS_PER_LIST + seg) * SEG_SIZE
}

struct Cursor<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn at(buf: &'a mut [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf[self.pos..self.pos + v.len()].copy_from_slice(v);
        self.pos += v.len();
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn i32(&mut self, v: i32) {
        self.bytes(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }
}

fn read<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(read(buf, at))
}

fn read_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(read(buf, at))
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(read(buf, at))
}

fn check_len(len: usize) -> Result<(), MemsegError> {
    if len < CONFIG_SIZE {
        return Err(MemsegError::Corrupt("region is too short"));
    }
    Ok(())
}

/// Write the header of an empty configuration, leaving the marker alone.
pub fn init(region: &mut [u8]) -> Result<(), MemsegError> {
    check_len(region.len())?;
    let mut c = Cursor::at(region, 4);
    c.u32(LAYOUT_VERSION);
    c.u32(as_u32(MAX_MEMSEG_LISTS));
    c.u32(as_u32(MAX_SEGS_PER_LIST));
    region[LISTS_OFFSET..SEGS_OFFSET].fill(0);
    Ok(())
}

/// Write every list of `config` into `region`.
pub fn write(region: &mut [u8], config: &MemConfig) -> Result<(), MemsegError> {
    init(region)?;
    for (index, list) in config.lists() {
        let name = list.name.as_bytes();
        if name.len() > NAME_SIZE {
            return Err(MemsegError::Corrupt("memseg list name too long"));
        }
        let mut padded = [0u8; NAME_SIZE];
        padded[..name.len()].copy_from_slice(name);

        let mut c = Cursor::at(region, list_offset(index));
        c.u32(1);
        c.u32(as_u32(list.segs.capacity()));
        c.u64(list.page_sz);
        c.u64(list.base_va.as_u64());
        c.i32(list.socket_id);
        c.u32(as_u32(name.len()));
        c.bytes(&padded);

        for seg in 0..list.segs.capacity() {
            let mut c = Cursor::at(region, seg_offset(index, seg));
            match list.segs.get(seg) {
                Some(ms) => {
                    c.u32(1);
                    c.i32(ms.socket_id);
                    c.u64(ms.iova.as_u64());
                    c.u64(ms.addr.as_u64());
                    c.u64(ms.len);
                    c.u64(ms.page_sz);
                }
                None => c.bytes(&[0u8; SEG_SIZE]),
            }
        }
    }
    Ok(())
}

/// Rebuild the configuration stored in `region`.
pub fn read_config(region: &[u8]) -> Result<MemConfig, MemsegError> {
    check_len(region.len())?;
    let found = read_u32(region, 4);
    if found != LAYOUT_VERSION {
        return Err(MemsegError::VersionMismatch {
            expected: LAYOUT_VERSION,
            found,
        });
    }
    if read_u32(region, 8) != as_u32(MAX_MEMSEG_LISTS)
        || read_u32(region, 12) != as_u32(MAX_SEGS_PER_LIST)
    {
        return Err(MemsegError::Corrupt("capacity mismatch"));
    }

    let mut config = MemConfig::new();
    for index in 0..MAX_MEMSEG_LISTS {
        let at = list_offset(index);
        if read_u32(region, at) == 0 {
            continue;
        }
        let n_segs = read_u32(region, at + 4) as usize;
        if n_segs > MAX_SEGS_PER_LIST {
            return Err(MemsegError::Corrupt("segment count out of range"));
        }
        let name_len = (read_u32(region, at + 28) as usize).min(NAME_SIZE);
        let name = core::str::from_utf8(&region[at + 32..at + 32 + name_len])
            .map_err(|_| MemsegError::Corrupt("memseg list name is not UTF-8"))?;

        let mut list = MemsegList {
            name: name.to_owned(),
            page_sz: read_u64(region, at + 8),
            socket_id: read_i32(region, at + 24),
            base_va: VirtualAddress::new(read_u64(region, at + 16)),
            segs: Arena::with_capacity(n_segs),
        };
        for seg in 0..n_segs {
            let at = seg_offset(index, seg);
            if read_u32(region, at) == 0 {
                continue;
            }
            list.segs.claim_at(
                seg,
                Memseg {
                    socket_id: read_i32(region, at + 4),
                    iova: PhysicalAddress::new(read_u64(region, at + 8)),
                    addr: VirtualAddress::new(read_u64(region, at + 16)),
                    len: read_u64(region, at + 24),
                    page_sz: read_u64(region, at + 32),
                },
            )?;
        }
        config.restore(index, list)?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::memseg::PAGE_SIZE;
    use netuio_abi::MemRegion;

    #[test]
    fn published_lists_read_back() {
        let mut config = MemConfig::new();
        let pool = MemRegion {
            size: 32 * PAGE_SIZE,
            phys_addr: PhysicalAddress::new(0x2_0000_0000),
            virt_addr: VirtualAddress::null(),
            user_mapped_virt_addr: VirtualAddress::new(0x7F00_0000_0000),
        };
        config.store_pool(&pool, 0).unwrap();
        config.store_pool(&pool, 1).unwrap();

        let mut region = vec![0u8; CONFIG_SIZE];
        write(&mut region, &config).unwrap();
        let back = read_config(&region).unwrap();

        assert_eq!(back.len(), 2);
        let list = back.list(1).unwrap();
        assert_eq!(list.name, "memseg-4k-1-1");
        assert_eq!(list.segs.len(), 32);
        assert_eq!(list.segs.get(3), config.list(1).unwrap().segs.get(3));
        assert_eq!(
            back.virt_to_iova(VirtualAddress::new(0x7F00_0000_2000)),
            Some(PhysicalAddress::new(0x2_0000_2000))
        );
    }

    #[test]
    fn marker_is_not_touched() {
        let mut region = vec![0u8; CONFIG_SIZE];
        region[..4].copy_from_slice(&0xAABB_CCDDu32.to_le_bytes());
        write(&mut region, &MemConfig::new()).unwrap();
        assert_eq!(read_u32(&region, 0), 0xAABB_CCDD);
    }

    #[test]
    fn foreign_versions_are_refused() {
        let mut region = vec![0u8; CONFIG_SIZE];
        init(&mut region).unwrap();
        region[4..8].copy_from_slice(&(LAYOUT_VERSION + 1).to_le_bytes());
        assert_eq!(
            read_config(&region).err(),
            Some(MemsegError::VersionMismatch {
                expected: LAYOUT_VERSION,
                found: LAYOUT_VERSION + 1
            })
        );
        assert!(matches!(read_config(&region[..64]), Err(MemsegError::Corrupt(_))));
    }
}
