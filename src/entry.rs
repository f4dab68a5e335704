//! Entry: the unit of catalog content (spec.md §3, "Entry").

use crate::time::BrokenDownTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Group,
}

impl Default for EntryKind {
    fn default() -> Self {
        EntryKind::Group
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedBy {
    System,
    User,
}

impl Default for CreatedBy {
    fn default() -> Self {
        CreatedBy::System
    }
}

/// Lifecycle state (spec.md 4.E, "State machine (entry)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Unlinked,
    Attached,
    Indexed,
}

impl Default for EntryState {
    fn default() -> Self {
        EntryState::Unlinked
    }
}

/// A catalog entry. Back-references into the per-attribute translation
/// indices are `Option<u64>` chain neighbours rather than owning
/// pointers (spec.md §9, "Cyclic and back-reference graphs") — `None`
/// means "not indexed under this attribute" or "no neighbour on this
/// side", and the two meanings are disambiguated by also checking
/// whether the attribute's optional value (`tag_str`, `tusr`, …) is
/// present at all.
#[derive(Debug, Clone, Default)]
pub struct Entry {
    pub entry_id: u64,
    pub branch_id: u64,
    /// Slot index of the parent entry (the tree-root sentinel when this
    /// is a branch head).
    pub parent: u64,
    pub has_parent: bool,
    pub depth: u32,
    pub kind: EntryKind,
    pub created_by: CreatedBy,
    pub file_name: Vec<u8>,
    pub tag_str: Option<Vec<u8>>,
    pub user_msg: Option<Vec<u8>>,
    pub tod: Option<BrokenDownTime>,
    pub tom: Option<BrokenDownTime>,
    pub tusr: Option<BrokenDownTime>,
    /// Owning: slot indices of children in creation order.
    pub children: Vec<u64>,
    /// Owning: slot index into the file-data pool, `File` entries only.
    pub file_data: Option<u64>,

    pub fn_prev: Option<u64>,
    pub fn_next: Option<u64>,
    pub tag_prev: Option<u64>,
    pub tag_next: Option<u64>,
    pub tod_prev: Option<u64>,
    pub tod_next: Option<u64>,
    pub tom_prev: Option<u64>,
    pub tom_next: Option<u64>,
    pub tusr_prev: Option<u64>,
    pub tusr_next: Option<u64>,

    pub state: EntryState,
}

impl Entry {
    /// Lowercase hex form of `entry_id` (spec.md §3: "its lowercase hex
    /// string (16 chars + NUL)").
    pub fn entry_id_hex(&self) -> String {
        format!("{:016x}", self.entry_id)
    }
}

/// Parse a 16-char lowercase hex entry-id string. Used by both the
/// `eid` translation index (keys are the hex form, not the raw `u64`,
/// matching spec.md §3) and `Database::lookup_by_eid_str`.
pub fn parse_entry_id_hex(s: &[u8]) -> Option<u64> {
    if s.len() != crate::limits::EID_STR_MAX {
        return None;
    }
    std::str::from_utf8(s)
        .ok()
        .and_then(|s| u64::from_str_radix(s, 16).ok())
}
