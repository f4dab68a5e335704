//! Section: a contiguous byte range of a file with its own checksums
//! and extracts (spec.md §3, "Section").

use crate::file_data::{Checksum, Extract};
use crate::limits::CHECKSUM_MAX_NUM;

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub owner_file_data: u64,
    pub start_pos: u64,
    pub end_pos: u64,
    pub checksums: [Option<Checksum>; CHECKSUM_MAX_NUM],
    pub extracts: Vec<Extract>,

    pub sha1_prev: Option<u64>,
    pub sha1_next: Option<u64>,
    pub sha256_prev: Option<u64>,
    pub sha256_next: Option<u64>,
    pub sha512_prev: Option<u64>,
    pub sha512_next: Option<u64>,
}

impl Section {
    pub fn checksum(&self, kind: crate::file_data::ChecksumKind) -> Option<&Checksum> {
        self.checksums[kind.slot()].as_ref()
    }

    pub fn len(&self) -> u64 {
        self.end_pos - self.start_pos
    }
}
