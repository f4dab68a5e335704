//! File-data and its checksums/extracts (spec.md §3, "File-data").

use crate::limits::CHECKSUM_MAX_NUM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumKind {
    /// Index into the fixed `checksum[3]` slot array (spec.md §6:
    /// `{SHA1=0, SHA256=1, SHA512=2}`).
    pub fn slot(self) -> usize {
        match self {
            ChecksumKind::Sha1 => 0,
            ChecksumKind::Sha256 => 1,
            ChecksumKind::Sha512 => 2,
        }
    }

    pub fn from_slot(slot: usize) -> Option<Self> {
        match slot {
            0 => Some(ChecksumKind::Sha1),
            1 => Some(ChecksumKind::Sha256),
            2 => Some(ChecksumKind::Sha512),
            _ => None,
        }
    }

    pub fn expected_len(self) -> usize {
        match self {
            ChecksumKind::Sha1 => 20,
            ChecksumKind::Sha256 => 32,
            ChecksumKind::Sha512 => 64,
        }
    }
}

/// One whole-file or per-section digest. Computation itself is a host
/// collaborator out of scope (spec.md §1); this only stores the
/// resulting bytes and formats them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub kind: ChecksumKind,
    pub bytes: Vec<u8>,
}

impl Checksum {
    pub fn hex_str(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// A small random byte sample captured at a recorded offset (spec.md
/// GLOSSARY, "Extract").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extract {
    pub position: u64,
    pub bytes: Vec<u8>,
}

/// File-data owned by a `File`-kind entry. Section order in
/// `sections` is the owning, authoritative order (spec.md §3,
/// "Invariants": non-overlapping, increasing when `norm_sect_size >
/// 0`).
#[derive(Debug, Clone, Default)]
pub struct FileData {
    pub owner_entry: u64,
    pub file_size: u64,
    pub norm_sect_size: u64,
    pub last_sect_size: u64,
    pub checksums: [Option<Checksum>; CHECKSUM_MAX_NUM],
    pub extracts: Vec<Extract>,
    /// Owning: slot indices into the section pool, in section order.
    pub sections: Vec<u64>,

    pub size_prev: Option<u64>,
    pub size_next: Option<u64>,
    pub sha1_prev: Option<u64>,
    pub sha1_next: Option<u64>,
    pub sha256_prev: Option<u64>,
    pub sha256_next: Option<u64>,
    pub sha512_prev: Option<u64>,
    pub sha512_next: Option<u64>,
}

impl FileData {
    pub fn checksum(&self, kind: ChecksumKind) -> Option<&Checksum> {
        self.checksums[kind.slot()].as_ref()
    }

    pub fn file_size_str(&self) -> String {
        self.file_size.to_string()
    }
}
