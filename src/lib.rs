//! `ffcat`: an in-memory, file-backed catalog of file fingerprints
//! (spec.md §1). The crate root owns the entity graph (§4.E), the
//! lookup/match layer built on it (§4.F), and the binary persistence
//! format (§4.G); the slab pools, existence matrix and translation
//! index families it's built from live in `ffcat-slab`/`ffcat-index`.

pub mod catalog;
pub mod chains;
pub mod database;
pub mod entry;
pub mod file_data;
pub mod limits;
pub mod persist;
pub mod section;
pub mod time;
pub mod verify;

pub use catalog::Catalog;
pub use database::{ChecksumInput, Database, ExtractInput, MatchCriterion, SectionInput};
pub use entry::{CreatedBy, Entry, EntryKind, EntryState};
pub use file_data::{Checksum, ChecksumKind, Extract, FileData};
pub use section::Section;
pub use time::BrokenDownTime;
pub use verify::VerifyFlags;

pub use ffcat_error::{CatalogError, Result};
