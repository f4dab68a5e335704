//! Substring-capable per-attribute indexing: the existence matrix
//! (spec.md 4.C) and the translation index family built on top of it
//! (spec.md 4.D). The entity graph in the root crate instantiates one
//! `TranslationIndex` per indexable attribute (`eid`, `fn`, `tag`,
//! `f_size`, the six checksum families) and keeps each member's
//! `prev_same_X`/`next_same_X` chain pointers in sync with the
//! head/tail/count this crate tracks.

mod existence_matrix;
mod translation_index;

pub use existence_matrix::ExistenceMatrix;
pub use translation_index::{AppendOutcome, Cardinality, DetachOutcome, Link, TransEntry, TranslationIndex};
