//! Positional substring index (spec.md 4.C).
//!
//! `uniq_char[p]` maps each byte seen at position `p` across every
//! indexed value to a bitmap over the owning pool's `L1` blocks: bit
//! `k` set means "some value in block `k` has this byte at position
//! `p`". A partial-map query ANDs the per-position bitmaps for a
//! candidate start offset together, then ORs the result across every
//! surviving start into the caller's `map_result` — a set of blocks
//! that *may* hold a matching value, to be verified by walking those
//! blocks (see `translation_index`).

use ffcat_bitmap::Bitmap;
use ffcat_error::{CatalogError, Result};
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct ExistenceMatrix {
    /// `positions[p][c]` = bitmap of `L1` blocks holding a value with
    /// byte `c` at position `p`. Lazily grown as longer values arrive.
    positions: Vec<FxHashMap<u8, Bitmap>>,
    /// Length of the longest value currently indexed. Monotonic upward
    /// on insert; recomputed downward only when the deleted value was
    /// the one realizing it.
    max_length: usize,
    /// Number of `L1` blocks the owning pool currently has. Bitmaps are
    /// kept aligned to this length.
    block_count: usize,
}

impl ExistenceMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Record that `value` lives in `L1` block `block`. `block_count`
    /// is the owning pool's current block count (matrix bitmaps grow to
    /// match).
    pub fn add(&mut self, value: &[u8], block: usize, block_count: usize) {
        self.block_count = self.block_count.max(block_count);
        if self.positions.len() < value.len() {
            self.positions.resize_with(value.len(), FxHashMap::default);
        }
        for (p, &c) in value.iter().enumerate() {
            let bm = self
                .positions[p]
                .entry(c)
                .or_insert_with(|| Bitmap::new(self.block_count, self.block_count));
            if bm.len() < self.block_count {
                bm.grow(self.block_count);
            }
            bm.write(block, true);
        }
        self.max_length = self.max_length.max(value.len());
    }

    /// Unrecord `value` from `L1` block `block`. `still_present(p, c)`
    /// must report whether some *other* live value in the same block
    /// still carries byte `c` at position `p` (the caller, which owns
    /// the pool, is the only one who can answer that).
    pub fn delete(&mut self, value: &[u8], block: usize, mut still_present: impl FnMut(usize, u8) -> bool) {
        for (p, &c) in value.iter().enumerate() {
            if still_present(p, c) {
                continue;
            }
            let Some(slot) = self.positions.get_mut(p) else { continue };
            let Some(bm) = slot.get_mut(&c) else { continue };
            if block < bm.len() {
                bm.write(block, false);
            }
            if bm.number_of_ones() == 0 {
                slot.remove(&c);
            }
        }
        if value.len() == self.max_length {
            self.max_length = self.recompute_max_length(value.len());
        }
    }

    fn recompute_max_length(&self, from_len: usize) -> usize {
        for p in (0..from_len).rev() {
            if self.positions.get(p).is_some_and(|m| !m.is_empty()) {
                return p + 1;
            }
        }
        0
    }

    /// Fill `map_result` with the `L1` blocks that may contain a value
    /// with `needle` as a substring starting at an offset in
    /// `[start_min.unwrap_or(0), start_max.unwrap_or(max_length - needle.len())]`.
    /// `map_buf` is scratch, reused across calls by the caller to avoid
    /// per-query allocation. Both are grown to `block_count` as needed;
    /// neither is assumed zeroed on entry for `map_result` (it is
    /// cleared here) but `map_result` accumulates across starts within
    /// one call only.
    pub fn partial_map(
        &self,
        needle: &[u8],
        start_min: Option<usize>,
        start_max: Option<usize>,
        map_buf: &mut Bitmap,
        map_result: &mut Bitmap,
    ) -> Result<()> {
        map_result.resize_to(self.block_count);
        map_result.zero();

        let nlen = needle.len();
        if nlen == 0 || nlen > self.max_length {
            return Ok(());
        }

        let lo = start_min.unwrap_or(0);
        let hi = start_max.unwrap_or(self.max_length - nlen);
        if lo > hi {
            return Ok(());
        }
        if self.max_length < lo + nlen || self.max_length < hi + nlen {
            return Err(CatalogError::WrongArgs);
        }

        for start in lo..=hi {
            if !self.start_is_candidate(needle, start) {
                continue;
            }
            self.and_position_bitmaps(needle, start, map_buf);
            map_result.or_assign_grow(map_buf);
        }
        Ok(())
    }

    /// Verify every position `start..start+needle.len()` has a
    /// `uniq_char` node for the corresponding needle byte, without
    /// touching bitmaps.
    fn start_is_candidate(&self, needle: &[u8], start: usize) -> bool {
        needle.iter().enumerate().all(|(j, &ch)| {
            self.positions
                .get(start + j)
                .is_some_and(|m| m.contains_key(&ch))
        })
    }

    fn and_position_bitmaps(&self, needle: &[u8], start: usize, map_buf: &mut Bitmap) {
        map_buf.resize_to(self.block_count);
        map_buf.zero();
        for b in 0..self.block_count {
            map_buf.write(b, true);
        }
        for (j, &ch) in needle.iter().enumerate() {
            let bm = &self.positions[start + j][&ch];
            let mut aligned = bm.clone();
            aligned.resize_to(self.block_count);
            let mut tmp = Bitmap::new(self.block_count, self.block_count);
            Bitmap::and(map_buf, &aligned, &mut tmp);
            *map_buf = tmp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_partial_map_finds_block() {
        let mut m = ExistenceMatrix::new();
        m.add(b"abc", 0, 1);
        m.add(b"xabcy", 1, 2);
        m.add(b"zzzc", 2, 3);

        let mut buf = Bitmap::new(0, 0);
        let mut result = Bitmap::new(0, 0);
        m.partial_map(b"abc", None, None, &mut buf, &mut result).unwrap();
        assert!(result.read(0));
        assert!(result.read(1));
        assert!(!result.read(2));
    }

    #[test]
    fn partial_map_respects_start_bounds() {
        let mut m = ExistenceMatrix::new();
        m.add(b"abc", 0, 1);
        m.add(b"xabcy", 1, 2);

        let mut buf = Bitmap::new(0, 0);
        let mut result = Bitmap::new(0, 0);
        m.partial_map(b"abc", Some(1), Some(1), &mut buf, &mut result)
            .unwrap();
        assert!(!result.read(0));
        assert!(result.read(1));
    }

    #[test]
    fn needle_longer_than_max_length_is_empty() {
        let mut m = ExistenceMatrix::new();
        m.add(b"ab", 0, 1);
        let mut buf = Bitmap::new(0, 0);
        let mut result = Bitmap::new(0, 0);
        m.partial_map(b"abcdef", None, None, &mut buf, &mut result)
            .unwrap();
        assert_eq!(result.number_of_ones(), 0);
    }

    #[test]
    fn delete_clears_bit_when_sole_occupant() {
        let mut m = ExistenceMatrix::new();
        m.add(b"abc", 0, 1);
        m.delete(b"abc", 0, |_, _| false);

        let mut buf = Bitmap::new(0, 0);
        let mut result = Bitmap::new(0, 0);
        m.partial_map(b"abc", None, None, &mut buf, &mut result).unwrap();
        assert_eq!(result.number_of_ones(), 0);
        assert_eq!(m.max_length(), 0);
    }

    #[test]
    fn delete_keeps_bit_when_block_still_has_value() {
        let mut m = ExistenceMatrix::new();
        m.add(b"abc", 0, 1);
        m.add(b"abd", 0, 1);
        // "abc" deleted but "abd" still has 'a','b' at p0,p1 in block 0.
        m.delete(b"abc", 0, |p, c| (p == 0 && c == b'a') || (p == 1 && c == b'b'));

        let mut buf = Bitmap::new(0, 0);
        let mut result = Bitmap::new(0, 0);
        m.partial_map(b"ab", None, None, &mut buf, &mut result).unwrap();
        assert!(result.read(0));
    }

    #[test]
    fn max_length_recomputed_after_deleting_longest() {
        let mut m = ExistenceMatrix::new();
        m.add(b"a", 0, 1);
        m.add(b"abcdef", 0, 1);
        assert_eq!(m.max_length(), 6);
        m.delete(b"abcdef", 0, |_, _| false);
        assert_eq!(m.max_length(), 1);
    }

    #[test]
    fn out_of_range_bounds_is_wrong_args() {
        let mut m = ExistenceMatrix::new();
        m.add(b"ab", 0, 1);
        let mut buf = Bitmap::new(0, 0);
        let mut result = Bitmap::new(0, 0);
        let err = m.partial_map(b"ab", Some(5), Some(5), &mut buf, &mut result);
        assert!(matches!(err, Err(CatalogError::WrongArgs)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn matrix_agrees_with_naive_substring_scan(
            values in prop::collection::vec(prop::collection::vec(0u8..4, 1..8), 1..12),
            needle in prop::collection::vec(0u8..4, 1..4),
        ) {
            let mut m = ExistenceMatrix::new();
            for (i, v) in values.iter().enumerate() {
                m.add(v, i, values.len());
            }

            let mut buf = Bitmap::new(0, 0);
            let mut result = Bitmap::new(0, 0);
            let outcome = m.partial_map(&needle, None, None, &mut buf, &mut result);

            let expected: Vec<usize> = values
                .iter()
                .enumerate()
                .filter(|(_, v)| contains_subslice(v, &needle))
                .map(|(i, _)| i)
                .collect();

            if needle.len() > m.max_length() {
                prop_assert!(outcome.is_ok());
                prop_assert_eq!(expected.len(), 0);
            } else {
                outcome.unwrap();
                for i in 0..values.len() {
                    prop_assert_eq!(result.read(i), expected.contains(&i));
                }
            }
        }
    }

    fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
        if needle.is_empty() {
            return true;
        }
        haystack.windows(needle.len()).any(|w| w == needle)
    }
}
