//! A fixed-base, growable bit array with a running count of set/clear
//! bits, plus the AND/OR/copy/first-one/first-zero primitives every
//! higher layer (existence matrix, translation index, lookup) builds
//! on.
//!
//! Storage is a flat `Vec<u64>` of words; there is no tree structure
//! here (that lives one layer up, in the existence matrix). Bit `i`
//! lives in word `i / 64`, shifted by `i % 64`.

const WORD_BITS: usize = u64::BITS as usize;

fn words_for(len: usize) -> usize {
    len.div_ceil(WORD_BITS)
}

/// A growable bit array that tracks `number_of_ones`/`number_of_zeros`
/// incrementally instead of recomputing them on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl Bitmap {
    /// Create a bitmap of `length` bits, all clear, with word storage
    /// pre-reserved for `base` bits (`base` is a capacity hint, not a
    /// hard ceiling — `grow` reallocates past it as needed).
    pub fn new(base: usize, length: usize) -> Self {
        let mut words = Vec::with_capacity(words_for(base.max(length)));
        words.resize(words_for(length), 0);
        Self {
            words,
            len: length,
            ones: 0,
        }
    }

    /// Logical length in bits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read bit `i`. Panics if `i >= len()`.
    #[inline]
    pub fn read(&self, i: usize) -> bool {
        assert!(i < self.len, "bit index {i} out of range (len {})", self.len);
        let word = self.words[i / WORD_BITS];
        (word >> (i % WORD_BITS)) & 1 != 0
    }

    /// Write bit `i`, maintaining `number_of_ones`/`number_of_zeros`.
    /// Panics if `i >= len()`.
    pub fn write(&mut self, i: usize, bit: bool) {
        assert!(i < self.len, "bit index {i} out of range (len {})", self.len);
        let word_idx = i / WORD_BITS;
        let mask = 1u64 << (i % WORD_BITS);
        let was_set = self.words[word_idx] & mask != 0;
        if bit == was_set {
            return;
        }
        if bit {
            self.words[word_idx] |= mask;
            self.ones += 1;
        } else {
            self.words[word_idx] &= !mask;
            self.ones -= 1;
        }
    }

    /// Clear every bit, keeping the current length.
    pub fn zero(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.ones = 0;
    }

    /// Grow the bitmap to `new_len` bits, zero-filling the new tail.
    /// No-op if `new_len <= len()`.
    pub fn grow(&mut self, new_len: usize) {
        if new_len <= self.len {
            return;
        }
        self.words.resize(words_for(new_len), 0);
        self.len = new_len;
    }

    /// Shrink the bitmap to `new_len` bits, discarding the tail and
    /// adjusting `number_of_ones` for any discarded set bits. No-op if
    /// `new_len >= len()`.
    pub fn shrink(&mut self, new_len: usize) {
        if new_len >= self.len {
            return;
        }
        for i in new_len..self.len {
            if self.read(i) {
                self.ones -= 1;
            }
        }
        self.words.truncate(words_for(new_len));
        if new_len % WORD_BITS != 0 {
            let last = self.words.len() - 1;
            let valid_bits = new_len % WORD_BITS;
            let mask = (1u64 << valid_bits) - 1;
            self.words[last] &= mask;
        }
        self.len = new_len;
    }

    /// Resize to exactly `new_len`, growing or shrinking as needed.
    /// This is the "shrink then regrow with zeros" normalization the
    /// matrix's partial-map query relies on before AND/OR-ing bitmaps
    /// of differing length.
    pub fn resize_to(&mut self, new_len: usize) {
        if new_len < self.len {
            self.shrink(new_len);
        } else if new_len > self.len {
            self.grow(new_len);
        }
    }

    /// `out = a & b`. `a` and `b` must have equal length; `out` is
    /// resized to match and its previous contents discarded.
    pub fn and(a: &Bitmap, b: &Bitmap, out: &mut Bitmap) {
        assert_eq!(a.len, b.len, "and: length mismatch");
        out.words.clear();
        out.words.extend(a.words.iter().zip(&b.words).map(|(x, y)| x & y));
        out.len = a.len;
        out.recount();
    }

    /// `out = a | b`. `a` and `b` must have equal length; `out` is
    /// resized to match and its previous contents discarded.
    pub fn or(a: &Bitmap, b: &Bitmap, out: &mut Bitmap) {
        assert_eq!(a.len, b.len, "or: length mismatch");
        out.words.clear();
        out.words.extend(a.words.iter().zip(&b.words).map(|(x, y)| x | y));
        out.len = a.len;
        out.recount();
    }

    /// `dst = src` (full contents and length).
    pub fn copy(src: &Bitmap, dst: &mut Bitmap) {
        dst.words.clear();
        dst.words.extend_from_slice(&src.words);
        dst.len = src.len;
        dst.ones = src.ones;
    }

    /// OR `other` into `self` in place. Whichever side is shorter is
    /// grown with zeros first, per the matrix's AND/OR-of-differing-
    /// length normalization rule.
    pub fn or_assign_grow(&mut self, other: &Bitmap) {
        let target_len = self.len.max(other.len);
        self.resize_to(target_len);
        let mut rhs = other.clone();
        rhs.resize_to(target_len);
        let mut tmp = Bitmap::new(target_len, target_len);
        Bitmap::or(self, &rhs, &mut tmp);
        *self = tmp;
    }

    /// First set bit at index `>= skip_to`, or `None` if `skip_to >=
    /// len()` or no such bit exists.
    pub fn first_one(&self, skip_to: usize) -> Option<usize> {
        self.first_matching(skip_to, true)
    }

    /// First clear bit at index `>= skip_to`, or `None` if `skip_to >=
    /// len()` or no such bit exists.
    pub fn first_zero(&self, skip_to: usize) -> Option<usize> {
        self.first_matching(skip_to, false)
    }

    fn first_matching(&self, skip_to: usize, want: bool) -> Option<usize> {
        if skip_to >= self.len {
            return None;
        }
        let mut word_idx = skip_to / WORD_BITS;
        let mut bit_off = skip_to % WORD_BITS;
        while word_idx < self.words.len() {
            let mut word = self.words[word_idx];
            if !want {
                word = !word;
            }
            word &= !0u64 << bit_off;
            if word != 0 {
                let pos = word_idx * WORD_BITS + word.trailing_zeros() as usize;
                if pos < self.len {
                    return Some(pos);
                }
                return None;
            }
            word_idx += 1;
            bit_off = 0;
        }
        None
    }

    #[inline]
    pub fn number_of_ones(&self) -> usize {
        self.ones
    }

    #[inline]
    pub fn number_of_zeros(&self) -> usize {
        self.len - self.ones
    }

    fn recount(&mut self) {
        self.ones = self.words.iter().map(|w| w.count_ones() as usize).sum();
        if self.len % WORD_BITS != 0 {
            // Tail bits beyond `len` in the last word are always kept
            // zero by construction (grow/shrink mask them), so no
            // correction is needed here.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_all_zero() {
        let bm = Bitmap::new(8, 100);
        assert_eq!(bm.len(), 100);
        assert_eq!(bm.number_of_ones(), 0);
        assert_eq!(bm.number_of_zeros(), 100);
    }

    #[test]
    fn write_updates_counts() {
        let mut bm = Bitmap::new(8, 10);
        bm.write(3, true);
        bm.write(7, true);
        assert_eq!(bm.number_of_ones(), 2);
        assert!(bm.read(3));
        assert!(!bm.read(4));
        bm.write(3, false);
        assert_eq!(bm.number_of_ones(), 1);
    }

    #[test]
    fn write_same_value_is_noop_for_counts() {
        let mut bm = Bitmap::new(8, 10);
        bm.write(3, false);
        assert_eq!(bm.number_of_ones(), 0);
        bm.write(3, true);
        bm.write(3, true);
        assert_eq!(bm.number_of_ones(), 1);
    }

    #[test]
    fn grow_zero_fills_tail() {
        let mut bm = Bitmap::new(8, 4);
        bm.write(0, true);
        bm.write(1, true);
        bm.grow(70);
        assert_eq!(bm.len(), 70);
        assert_eq!(bm.number_of_ones(), 2);
        for i in 4..70 {
            assert!(!bm.read(i));
        }
    }

    #[test]
    fn shrink_drops_tail_and_adjusts_ones() {
        let mut bm = Bitmap::new(8, 70);
        bm.write(65, true);
        bm.write(2, true);
        bm.shrink(10);
        assert_eq!(bm.len(), 10);
        assert_eq!(bm.number_of_ones(), 1);
    }

    #[test]
    fn and_or_combine() {
        let mut a = Bitmap::new(8, 8);
        let mut b = Bitmap::new(8, 8);
        a.write(0, true);
        a.write(1, true);
        b.write(1, true);
        b.write(2, true);

        let mut and_out = Bitmap::new(8, 8);
        Bitmap::and(&a, &b, &mut and_out);
        assert_eq!(and_out.number_of_ones(), 1);
        assert!(and_out.read(1));

        let mut or_out = Bitmap::new(8, 8);
        Bitmap::or(&a, &b, &mut or_out);
        assert_eq!(or_out.number_of_ones(), 3);
    }

    #[test]
    fn copy_duplicates_contents() {
        let mut a = Bitmap::new(8, 20);
        a.write(5, true);
        let mut b = Bitmap::new(1, 1);
        Bitmap::copy(&a, &mut b);
        assert_eq!(b.len(), 20);
        assert!(b.read(5));
        assert_eq!(b.number_of_ones(), 1);
    }

    #[test]
    fn first_one_and_first_zero() {
        let mut bm = Bitmap::new(8, 20);
        bm.write(5, true);
        bm.write(19, true);
        assert_eq!(bm.first_one(0), Some(5));
        assert_eq!(bm.first_one(6), Some(19));
        assert_eq!(bm.first_one(20), None);
        assert_eq!(bm.first_zero(0), Some(0));
        assert_eq!(bm.first_zero(5), Some(6));
    }

    #[test]
    fn skip_to_past_len_is_no_match() {
        let bm = Bitmap::new(8, 5);
        assert_eq!(bm.first_one(5), None);
        assert_eq!(bm.first_one(100), None);
        assert_eq!(bm.first_zero(5), None);
    }

    #[test]
    fn word_boundary_scan() {
        let mut bm = Bitmap::new(8, 130);
        bm.write(63, true);
        bm.write(64, true);
        bm.write(129, true);
        assert_eq!(bm.first_one(0), Some(63));
        assert_eq!(bm.first_one(64), Some(64));
        assert_eq!(bm.first_one(65), Some(129));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ones_plus_zeros_is_len(ops in prop::collection::vec((0usize..200, any::<bool>()), 0..300)) {
            let mut bm = Bitmap::new(8, 200);
            for (i, bit) in ops {
                bm.write(i, bit);
                prop_assert_eq!(bm.number_of_ones() + bm.number_of_zeros(), bm.len());
            }
        }

        #[test]
        fn first_one_matches_linear_scan(bits in prop::collection::vec(any::<bool>(), 1..200), skip_to in 0usize..220) {
            let mut bm = Bitmap::new(8, bits.len());
            for (i, b) in bits.iter().enumerate() {
                bm.write(i, *b);
            }
            let expected = if skip_to < bits.len() {
                bits[skip_to..].iter().position(|b| *b).map(|p| p + skip_to)
            } else {
                None
            };
            prop_assert_eq!(bm.first_one(skip_to), expected);
        }
    }
}
