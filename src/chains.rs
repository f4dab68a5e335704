//! Generic twin-chain linking over a one-to-many [`TranslationIndex`],
//! parameterised by plain accessor closures rather than a trait per
//! attribute (spec.md §9: "Chain linkage becomes a small `LinkOps`
//! capability set"). One pair of functions serves all seven
//! one-to-many families (`fn`, `tag`, `f_size`, the six checksum
//! indices) regardless of whether the member is an `Entry`, `FileData`,
//! or `Section`.

use ffcat_error::{CatalogError, Result};
use ffcat_index::TranslationIndex;
use ffcat_slab::SlabPool;

/// Append `member` to `value`'s chain in `index`, then patch
/// `member`'s own `prev`/`next` fields (and the former tail's `next`,
/// if any) via the supplied accessors.
pub fn link_append<M>(
    pool: &mut SlabPool<M>,
    index: &mut TranslationIndex,
    value: &[u8],
    member: u64,
    set_prev: impl Fn(&mut M, Option<u64>),
    set_next: impl Fn(&mut M, Option<u64>),
) -> Result<()> {
    let outcome = index.append_member(value, member)?;
    if let Some(prev_tail) = outcome.prev_tail {
        let prev_entry = pool
            .get_mut(prev_tail)
            .ok_or_else(|| CatalogError::LogicError("chain tail missing from pool".into()))?;
        set_next(prev_entry, Some(member));
        let this = pool
            .get_mut(member)
            .ok_or_else(|| CatalogError::LogicError("member missing from pool".into()))?;
        set_prev(this, Some(prev_tail));
        set_next(this, None);
    } else {
        let this = pool
            .get_mut(member)
            .ok_or_else(|| CatalogError::LogicError("member missing from pool".into()))?;
        set_prev(this, None);
        set_next(this, None);
    }
    Ok(())
}

/// Detach `member` from `value`'s chain in `index`, patching its
/// neighbours' `next`/`prev` fields and clearing `member`'s own.
pub fn link_detach<M>(
    pool: &mut SlabPool<M>,
    index: &mut TranslationIndex,
    value: &[u8],
    member: u64,
    get_prev: impl Fn(&M) -> Option<u64>,
    set_prev: impl Fn(&mut M, Option<u64>),
    get_next: impl Fn(&M) -> Option<u64>,
    set_next: impl Fn(&mut M, Option<u64>),
) -> Result<()> {
    let (prev, next) = {
        let m = pool.get(member).ok_or(CatalogError::FindFail)?;
        (get_prev(m), get_next(m))
    };
    index.detach_member(value, member, prev, next)?;
    if let Some(p) = prev {
        if let Some(pm) = pool.get_mut(p) {
            set_next(pm, next);
        }
    }
    if let Some(n) = next {
        if let Some(nm) = pool.get_mut(n) {
            set_prev(nm, prev);
        }
    }
    if let Some(m) = pool.get_mut(member) {
        set_prev(m, None);
        set_next(m, None);
    }
    Ok(())
}
