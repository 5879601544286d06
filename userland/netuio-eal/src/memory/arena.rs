//! Fixed-capacity slot array with a used bitmap.
//!
//! Slots are claimed and never released: there is no removal API, so an
//! index handed out once stays valid for the lifetime of the arena.

#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ArenaError {
    #[error("all {capacity} slots are in use")]
    Full { capacity: usize },
    #[error("slot {index} is out of bounds (capacity {capacity})")]
    OutOfBounds { index: usize, capacity: usize },
    #[error("slot {index} is already in use")]
    InUse { index: usize },
}

const WORD_BITS: usize = u64::BITS as usize;

#[derive(Clone, Debug)]
pub struct Arena<T> {
    slots: Box<[T]>,
    used: Box<[u64]>,
    count: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Box::default(),
            used: Box::default(),
            count: 0,
        }
    }
}

impl<T: Default> Arena<T> {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| T::default()).collect(),
            used: vec![0; capacity.div_ceil(WORD_BITS)].into_boxed_slice(),
            count: 0,
        }
    }
}

impl<T> Arena<T> {
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots in use.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[must_use]
    pub fn is_used(&self, index: usize) -> bool {
        index < self.capacity() && self.used[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0
    }

    /// Lowest free index.
    #[must_use]
    pub fn first_free(&self) -> Option<usize> {
        self.used.iter().enumerate().find_map(|(word, bits)| {
            let index = word * WORD_BITS + bits.trailing_ones() as usize;
            (*bits != u64::MAX && index < self.capacity()).then_some(index)
        })
    }

    /// Store `value` in the lowest free slot and return its index.
    pub fn claim(&mut self, value: T) -> Result<usize, ArenaError> {
        let index = self.first_free().ok_or(ArenaError::Full {
            capacity: self.capacity(),
        })?;
        self.claim_at(index, value)?;
        Ok(index)
    }

    /// Store `value` in slot `index`, which must be free.
    pub fn claim_at(&mut self, index: usize, value: T) -> Result<&mut T, ArenaError> {
        if index >= self.capacity() {
            return Err(ArenaError::OutOfBounds {
                index,
                capacity: self.capacity(),
            });
        }
        if self.is_used(index) {
            return Err(ArenaError::InUse { index });
        }
        self.used[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        self.count += 1;
        self.slots[index] = value;
        Ok(&mut self.slots[index])
    }

    /// The value in slot `index` if the slot is in use.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.is_used(index).then(|| &self.slots[index])
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if self.is_used(index) {
            Some(&mut self.slots[index])
        } else {
            None
        }
    }

    /// Used slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(index, _)| self.is_used(*index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_lowest_free_slot() {
        let mut arena = Arena::<u32>::with_capacity(3);
        assert_eq!(arena.claim(10), Ok(0));
        arena.claim_at(2, 30).unwrap();
        assert_eq!(arena.claim(20), Ok(1));
        assert_eq!(arena.claim(40), Err(ArenaError::Full { capacity: 3 }));
        assert_eq!(arena.len(), 3);

        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, [10, 20, 30]);
    }

    #[test]
    fn used_slots_cannot_be_overwritten() {
        let mut arena = Arena::<u8>::with_capacity(2);
        arena.claim_at(1, 7).unwrap();
        assert_eq!(arena.claim_at(1, 8), Err(ArenaError::InUse { index: 1 }));
        assert_eq!(
            arena.claim_at(2, 8),
            Err(ArenaError::OutOfBounds {
                index: 2,
                capacity: 2
            })
        );
        assert_eq!(arena.get(1), Some(&7));
        assert_eq!(arena.get(0), None);
    }

    #[test]
    fn bitmap_spans_several_words() {
        let mut arena = Arena::<u16>::with_capacity(130);
        for i in 0..129 {
            arena.claim(i).unwrap();
        }
        assert_eq!(arena.first_free(), Some(129));
        assert!(arena.is_used(64));
        assert!(!arena.is_used(129));
        arena.claim(129).unwrap();
        assert_eq!(arena.first_free(), None);
    }
}
