//! Two-level arena for spec.md 4.B: a growable `L2` array of fixed-size
//! `L1` blocks, each block carrying its own free-slot bitset, plus a
//! pool-level "L1 not full" bitset so allocation finds a free slot
//! without scanning every block.
//!
//! `slot_index = l2_index * l1_size + l1_index` is the permanent handle
//! every higher layer stores as a back-reference. L1 blocks are never
//! freed individually; shrinking the arena is out of scope (spec.md
//! 4.B).
//!
//! This crate intentionally does not depend on `ffcat-bitmap`: its
//! free-slot tracking is a private, minimal word bitset sized to a
//! single `L1` block or to the `L2` directory, not the growable,
//! counted bitmap the existence matrix and lookup layers need.

use ffcat_error::{CatalogError, Result};

const WORD_BITS: usize = u64::BITS as usize;

/// Minimal growable bitset: set/clear, first-set scan, push-one-bit.
/// Bit meaning (free vs not-full) is assigned by the caller.
#[derive(Debug, Clone, Default)]
struct FreeBits {
    words: Vec<u64>,
    len: usize,
}

impl FreeBits {
    fn with_len(len: usize, set: bool) -> Self {
        let words_needed = len.div_ceil(WORD_BITS);
        let fill = if set { !0u64 } else { 0u64 };
        let mut words = vec![fill; words_needed];
        if set && len % WORD_BITS != 0 {
            let valid = len % WORD_BITS;
            let mask = (1u64 << valid) - 1;
            *words.last_mut().unwrap() &= mask;
        }
        Self { words, len }
    }

    #[inline]
    fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        (self.words[i / WORD_BITS] >> (i % WORD_BITS)) & 1 != 0
    }

    #[inline]
    fn set(&mut self, i: usize, v: bool) {
        debug_assert!(i < self.len);
        let mask = 1u64 << (i % WORD_BITS);
        if v {
            self.words[i / WORD_BITS] |= mask;
        } else {
            self.words[i / WORD_BITS] &= !mask;
        }
    }

    fn push_bit(&mut self, v: bool) {
        let i = self.len;
        self.len += 1;
        if self.words.len() < self.len.div_ceil(WORD_BITS) {
            self.words.push(0);
        }
        self.set(i, v);
    }

    /// Lowest set bit at index `>= skip_to`, scanning word-by-word.
    fn first_set(&self, skip_to: usize) -> Option<usize> {
        if skip_to >= self.len {
            return None;
        }
        let mut word_idx = skip_to / WORD_BITS;
        let mut bit_off = skip_to % WORD_BITS;
        while word_idx < self.words.len() {
            let word = self.words[word_idx] & (!0u64 << bit_off);
            if word != 0 {
                let pos = word_idx * WORD_BITS + word.trailing_zeros() as usize;
                return if pos < self.len { Some(pos) } else { None };
            }
            word_idx += 1;
            bit_off = 0;
        }
        None
    }
}

struct L1Block<T> {
    slots: Vec<T>,
    free: FreeBits,
    free_count: usize,
}

impl<T: Default> L1Block<T> {
    fn new(l1_size: usize) -> Self {
        let mut slots = Vec::with_capacity(l1_size);
        slots.resize_with(l1_size, T::default);
        Self {
            slots,
            free: FreeBits::with_len(l1_size, true),
            free_count: l1_size,
        }
    }
}

/// A two-level slab pool. `T` is zeroed (via `Default`) both on
/// allocation and on free, matching the original's "returns a stably
/// numbered, zeroed slot" contract.
pub struct SlabPool<T> {
    l1_size: usize,
    blocks: Vec<L1Block<T>>,
    /// bit k = 1 iff `blocks[k]` has at least one free slot.
    not_full: FreeBits,
    live: usize,
}

impl<T: Default> SlabPool<T> {
    /// Create an empty pool with the given `L1` block size. `l1_size`
    /// must be nonzero.
    pub fn new(l1_size: usize) -> Self {
        assert!(l1_size > 0, "l1_size must be nonzero");
        Self {
            l1_size,
            blocks: Vec::new(),
            not_full: FreeBits::default(),
            live: 0,
        }
    }

    #[inline]
    pub fn l1_size(&self) -> usize {
        self.l1_size
    }

    /// Number of allocated (live) slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Allocate a zeroed slot. Picks the first not-full `L1` block, then
    /// its first free slot — the deterministic "lowest free slot in the
    /// lowest not-full block" ordering from spec.md §5. Grows the `L2`
    /// directory by one fresh (all-free) block when every existing
    /// block is full.
    pub fn add(&mut self) -> (&mut T, u64) {
        let l2 = match self.not_full.first_set(0) {
            Some(idx) => idx,
            None => {
                self.blocks.push(L1Block::new(self.l1_size));
                self.not_full.push_bit(true);
                self.blocks.len() - 1
            }
        };

        let block = &mut self.blocks[l2];
        let l1 = block
            .free
            .first_set(0)
            .expect("not_full bit implies block has a free slot");
        block.free.set(l1, false);
        block.free_count -= 1;
        block.slots[l1] = T::default();
        if block.free_count == 0 {
            self.not_full.set(l2, false);
        }
        self.live += 1;

        let slot_index = l2 as u64 * self.l1_size as u64 + l1 as u64;
        (&mut block.slots[l1], slot_index)
    }

    fn split(&self, slot_index: u64) -> (usize, usize) {
        let l1_size = self.l1_size as u64;
        ((slot_index / l1_size) as usize, (slot_index % l1_size) as usize)
    }

    /// Zero and free `slot_index`. `IndexOutOfRange` if the index falls
    /// beyond any allocated `L1` block; `FindFail` if it addresses a
    /// slot that is reachable but currently unused.
    pub fn del(&mut self, slot_index: u64) -> Result<()> {
        let (l2, l1) = self.split(slot_index);
        let block = self
            .blocks
            .get_mut(l2)
            .ok_or(CatalogError::IndexOutOfRange)?;
        if block.free.get(l1) {
            return Err(CatalogError::FindFail);
        }
        block.slots[l1] = T::default();
        block.free.set(l1, true);
        block.free_count += 1;
        self.not_full.set(l2, true);
        self.live -= 1;
        Ok(())
    }

    /// `Some(&T)` iff `slot_index` addresses a currently live slot.
    pub fn get(&self, slot_index: u64) -> Option<&T> {
        let (l2, l1) = self.split(slot_index);
        let block = self.blocks.get(l2)?;
        if block.free.get(l1) {
            return None;
        }
        Some(&block.slots[l1])
    }

    /// `Some(&mut T)` iff `slot_index` addresses a currently live slot.
    pub fn get_mut(&mut self, slot_index: u64) -> Option<&mut T> {
        let (l2, l1) = self.split(slot_index);
        let block = self.blocks.get_mut(l2)?;
        if block.free.get(l1) {
            return None;
        }
        Some(&mut block.slots[l1])
    }

    /// Iterate every live slot in `L2`-then-`L1` order (the same order
    /// `add` would have produced them in a monotonic fill).
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.blocks.iter().enumerate().flat_map(move |(l2, block)| {
            let l1_size = self.l1_size as u64;
            (0..block.slots.len()).filter_map(move |l1| {
                if block.free.get(l1) {
                    None
                } else {
                    Some((l2 as u64 * l1_size + l1 as u64, &block.slots[l1]))
                }
            })
        })
    }

    /// Number of `L1` blocks currently allocated. The existence matrix
    /// addresses blocks by this count, so callers size their bitmaps to
    /// it rather than to `len()`.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Iterate the live slots of a single `L1` block, in increasing
    /// `L1`-index order. Used by the translation index's buffered
    /// partial lookup, which walks only the blocks the existence
    /// matrix's candidate bitmap marks as possibly matching.
    pub fn iter_block(&self, l2_index: usize) -> impl Iterator<Item = (u64, &T)> {
        let l1_size = self.l1_size as u64;
        let block = self.blocks.get(l2_index);
        (0..block.map_or(0, |b| b.slots.len())).filter_map(move |l1| {
            let block = block.unwrap();
            if block.free.get(l1) {
                None
            } else {
                Some((l2_index as u64 * l1_size + l1 as u64, &block.slots[l1]))
            }
        })
    }
}
