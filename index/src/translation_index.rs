//! Per-attribute translation index (spec.md 4.D): a slab pool of
//! translation entries (one per distinct value), a hash map from value
//! to translation-entry slot, and an existence matrix over the values.
//! One-to-one families (`eid`) hold a single target; one-to-many
//! families (`fn`, `tag`, hash and size indices) hold a doubly-linked
//! chain head/tail/count. The chain's actual `prev_same_X`/`next_same_X`
//! pointers live on the member entities themselves (owned by the
//! entity graph in the root crate) — this index only ever stores
//! head/tail/count, never the member-to-member links.

use ffcat_bitmap::Bitmap;
use ffcat_error::{CatalogError, Result, UninterruptibleGuard};
use ffcat_slab::SlabPool;
use rustc_hash::FxHashMap;

use crate::existence_matrix::ExistenceMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    One { target: u64 },
    Many { head: u64, tail: u64, count: usize },
}

impl Default for Link {
    fn default() -> Self {
        Link::One { target: 0 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransEntry {
    pub value: Vec<u8>,
    pub link: Link,
}

/// Outcome of appending a member to a one-to-many value chain. The
/// caller (entity graph) uses `prev_tail` to finish linking: set the
/// new member's `prev_same_X` to it, and if it was `Some`, set that
/// former tail's `next_same_X` to the new member.
#[derive(Debug, Clone, Copy)]
pub struct AppendOutcome {
    pub is_new_value: bool,
    pub prev_tail: Option<u64>,
}

/// Outcome of detaching a member from a one-to-many value chain.
#[derive(Debug, Clone, Copy)]
pub struct DetachOutcome {
    /// `false` once the chain is empty and the value has been fully
    /// removed from the hash map, matrix, and pool.
    pub value_still_present: bool,
}

pub struct TranslationIndex {
    cardinality: Cardinality,
    pool: SlabPool<TransEntry>,
    hash: FxHashMap<Vec<u8>, u64>,
    matrix: ExistenceMatrix,
}

impl TranslationIndex {
    pub fn new(cardinality: Cardinality, l1_size: usize) -> Self {
        Self {
            cardinality,
            pool: SlabPool::new(l1_size),
            hash: FxHashMap::default(),
            matrix: ExistenceMatrix::new(),
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Number of distinct values currently indexed.
    pub fn len(&self) -> usize {
        self.hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hash.is_empty()
    }

    /// L0: exact hash lookup.
    pub fn lookup_exact(&self, value: &[u8]) -> Option<&TransEntry> {
        let &slot = self.hash.get(value)?;
        self.pool.get(slot)
    }

    /// Chain (or single-target) shape for `value`, if indexed. For
    /// one-to-one families, `head == tail` and `count == 1`.
    pub fn chain_info(&self, value: &[u8]) -> Option<(u64, u64, usize)> {
        match self.lookup_exact(value)?.link {
            Link::Many { head, tail, count } => Some((head, tail, count)),
            Link::One { target } => Some((target, target, 1)),
        }
    }

    /// Insert a one-to-one value. `DuplicateError` if already present.
    pub fn insert_unique(&mut self, value: &[u8], target: u64) -> Result<()> {
        assert_eq!(self.cardinality, Cardinality::OneToOne);
        if self.hash.contains_key(value) {
            return Err(CatalogError::DuplicateError);
        }
        self.alloc_and_index(value, Link::One { target });
        Ok(())
    }

    /// Remove a one-to-one value entirely. `FindFail` if absent.
    pub fn remove_unique(&mut self, value: &[u8]) -> Result<()> {
        assert_eq!(self.cardinality, Cardinality::OneToOne);
        let &slot = self.hash.get(value).ok_or(CatalogError::FindFail)?;
        self.hash.remove(value);
        self.free_slot(slot, value);
        Ok(())
    }

    /// Append `member` to `value`'s chain, creating the chain if this
    /// is the first member with this value.
    pub fn append_member(&mut self, value: &[u8], member: u64) -> Result<AppendOutcome> {
        assert_eq!(self.cardinality, Cardinality::OneToMany);
        if let Some(&slot) = self.hash.get(value) {
            let entry = self
                .pool
                .get_mut(slot)
                .ok_or_else(|| CatalogError::LogicError("translation entry missing from pool".into()))?;
            let Link::Many { tail, count, .. } = &mut entry.link else {
                return Err(CatalogError::LogicError(
                    "one-to-many family holds a one-to-one link".into(),
                ));
            };
            let prev_tail = Some(*tail);
            *tail = member;
            *count += 1;
            return Ok(AppendOutcome {
                is_new_value: false,
                prev_tail,
            });
        }
        self.alloc_and_index(
            value,
            Link::Many {
                head: member,
                tail: member,
                count: 1,
            },
        );
        Ok(AppendOutcome {
            is_new_value: true,
            prev_tail: None,
        })
    }

    /// Detach `member` from `value`'s chain. The caller supplies
    /// `member`'s own `prev_same_X`/`next_same_X` (read before
    /// unlinking) so this can patch head/tail without needing to know
    /// the member's representation.
    pub fn detach_member(
        &mut self,
        value: &[u8],
        member: u64,
        member_prev: Option<u64>,
        member_next: Option<u64>,
    ) -> Result<DetachOutcome> {
        assert_eq!(self.cardinality, Cardinality::OneToMany);
        let &slot = self.hash.get(value).ok_or(CatalogError::FindFail)?;
        let now_empty = {
            let entry = self
                .pool
                .get_mut(slot)
                .ok_or_else(|| CatalogError::LogicError("translation entry missing from pool".into()))?;
            let Link::Many { head, tail, count } = &mut entry.link else {
                return Err(CatalogError::LogicError(
                    "one-to-many family holds a one-to-one link".into(),
                ));
            };
            if *head == member {
                *head = member_next.unwrap_or(member);
            }
            if *tail == member {
                *tail = member_prev.unwrap_or(member);
            }
            *count -= 1;
            *count == 0
        };
        if now_empty {
            self.hash.remove(value);
            self.free_slot(slot, value);
        }
        Ok(DetachOutcome {
            value_still_present: !now_empty,
        })
    }

    /// Allocate a pool slot and add it to the hash map and existence
    /// matrix. These three steps must be seen as atomic: the matrix's
    /// `delete` dereferences the pool to recover a value's bytes, so a
    /// signal landing between "in the pool" and "in the matrix" would
    /// leave a slot the matrix doesn't know about (spec.md §9,
    /// "Coupling between matrix and pool"). Bracketed with
    /// [`UninterruptibleGuard`] per spec.md §5's critical-section
    /// contract.
    fn alloc_and_index(&mut self, value: &[u8], link: Link) {
        let _guard = UninterruptibleGuard::acquire();
        let (entry, slot) = self.pool.add();
        entry.value = value.to_vec();
        entry.link = link;
        self.hash.insert(value.to_vec(), slot);
        let block = (slot / self.pool.l1_size() as u64) as usize;
        self.matrix.add(value, block, self.pool.block_count());
    }

    /// Mirror of [`Self::alloc_and_index`]: matrix removal must happen
    /// before the pool slot is freed, since it reads the slot's value
    /// to decide whether other members of the same `L1` block still
    /// need the bit held.
    fn free_slot(&mut self, slot: u64, value: &[u8]) {
        let _guard = UninterruptibleGuard::acquire();
        let block = (slot / self.pool.l1_size() as u64) as usize;
        let pool = &self.pool;
        self.matrix.delete(value, block, |p, c| {
            pool.iter_block(block)
                .any(|(other_slot, other)| other_slot != slot && other.value.get(p) == Some(&c))
        });
        self.pool
            .del(slot)
            .expect("slot was resolved from a live hash entry");
    }

    /// L1: existence-matrix candidate blocks only, no verification.
    pub fn partial_map_only(
        &self,
        needle: &[u8],
        start_min: Option<usize>,
        start_max: Option<usize>,
        map_buf: &mut Bitmap,
        map_result: &mut Bitmap,
    ) -> Result<()> {
        self.matrix
            .partial_map(needle, start_min, start_max, map_buf, map_result)
    }

    /// L2: matrix candidates, verified by walking the pool's `L1`
    /// blocks. Returns up to `limit` matching translation entries, or
    /// `BufferFull` if more would have matched.
    pub fn partial_lookup_buffered(
        &self,
        needle: &[u8],
        start_min: Option<usize>,
        start_max: Option<usize>,
        map_buf: &mut Bitmap,
        map_result: &mut Bitmap,
        limit: usize,
    ) -> Result<Vec<&TransEntry>> {
        self.matrix
            .partial_map(needle, start_min, start_max, map_buf, map_result)?;

        let mut out = Vec::new();
        let mut block = map_result.first_one(0);
        while let Some(b) = block {
            for (_, entry) in self.pool.iter_block(b) {
                if contains_at_range(&entry.value, needle, start_min, start_max) {
                    if out.len() >= limit {
                        return Err(CatalogError::BufferFull);
                    }
                    out.push(entry);
                }
            }
            block = map_result.first_one(b + 1);
        }
        Ok(out)
    }
}

fn contains_at_range(
    value: &[u8],
    needle: &[u8],
    start_min: Option<usize>,
    start_max: Option<usize>,
) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > value.len() {
        return false;
    }
    let lo = start_min.unwrap_or(0);
    let hi = start_max
        .unwrap_or(value.len() - needle.len())
        .min(value.len() - needle.len());
    if lo > hi {
        return false;
    }
    (lo..=hi).any(|s| value.get(s..s + needle.len()) == Some(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_to_one_duplicate_is_rejected() {
        let mut idx = TranslationIndex::new(Cardinality::OneToOne, 4);
        idx.insert_unique(b"eid1", 10).unwrap();
        assert!(matches!(
            idx.insert_unique(b"eid1", 11),
            Err(CatalogError::DuplicateError)
        ));
    }

    #[test]
    fn one_to_one_exact_lookup_and_remove() {
        let mut idx = TranslationIndex::new(Cardinality::OneToOne, 4);
        idx.insert_unique(b"eid1", 10).unwrap();
        assert_eq!(idx.lookup_exact(b"eid1").unwrap().link, Link::One { target: 10 });
        idx.remove_unique(b"eid1").unwrap();
        assert!(idx.lookup_exact(b"eid1").is_none());
        assert!(matches!(idx.remove_unique(b"eid1"), Err(CatalogError::FindFail)));
    }

    #[test]
    fn one_to_many_chain_builds_head_tail_count() {
        let mut idx = TranslationIndex::new(Cardinality::OneToMany, 4);
        let o1 = idx.append_member(b"a.bin", 1).unwrap();
        assert!(o1.is_new_value);
        assert_eq!(o1.prev_tail, None);

        let o2 = idx.append_member(b"a.bin", 2).unwrap();
        assert!(!o2.is_new_value);
        assert_eq!(o2.prev_tail, Some(1));

        assert_eq!(idx.chain_info(b"a.bin"), Some((1, 2, 2)));
    }

    #[test]
    fn detach_updates_head_and_tail() {
        let mut idx = TranslationIndex::new(Cardinality::OneToMany, 4);
        idx.append_member(b"a.bin", 1).unwrap();
        idx.append_member(b"a.bin", 2).unwrap();
        idx.append_member(b"a.bin", 3).unwrap();
        // chain: 1 <-> 2 <-> 3 ; detach head (1), whose next is 2.
        let out = idx.detach_member(b"a.bin", 1, None, Some(2)).unwrap();
        assert!(out.value_still_present);
        assert_eq!(idx.chain_info(b"a.bin"), Some((2, 3, 2)));
    }

    #[test]
    fn detach_last_member_removes_value() {
        let mut idx = TranslationIndex::new(Cardinality::OneToMany, 4);
        idx.append_member(b"a.bin", 1).unwrap();
        let out = idx.detach_member(b"a.bin", 1, None, None).unwrap();
        assert!(!out.value_still_present);
        assert!(idx.chain_info(b"a.bin").is_none());
    }

    #[test]
    fn partial_lookup_buffered_respects_limit() {
        let mut idx = TranslationIndex::new(Cardinality::OneToMany, 4);
        idx.append_member(b"abc", 1).unwrap();
        idx.append_member(b"xabcy", 2).unwrap();
        idx.append_member(b"zzzc", 3).unwrap();

        let mut buf = Bitmap::new(0, 0);
        let mut result = Bitmap::new(0, 0);
        let matches = idx
            .partial_lookup_buffered(b"abc", None, None, &mut buf, &mut result, 10)
            .unwrap();
        assert_eq!(matches.len(), 2);

        let err = idx.partial_lookup_buffered(b"abc", None, None, &mut buf, &mut result, 1);
        assert!(matches!(err, Err(CatalogError::BufferFull)));
    }

    #[test]
    fn partial_lookup_with_position_bounds() {
        let mut idx = TranslationIndex::new(Cardinality::OneToMany, 4);
        idx.append_member(b"abc", 1).unwrap();
        idx.append_member(b"xabcy", 2).unwrap();

        let mut buf = Bitmap::new(0, 0);
        let mut result = Bitmap::new(0, 0);
        let matches = idx
            .partial_lookup_buffered(b"abc", Some(1), Some(1), &mut buf, &mut result, 10)
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, b"xabcy");
    }
}
