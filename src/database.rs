//! The `Database` facade: owns every slab pool and translation index
//! the catalog needs, and drives the entity-graph lifecycle (spec.md
//! 4.E), the layered lookup/match API (4.F), and hands off to
//! `persist` for 4.G. This is the "collaborator" the out-of-scope shell
//! and path parser (§1) would sit on top of.

use ffcat_bitmap::Bitmap;
use ffcat_error::{CatalogError, Result, VerifyFailKind};
use ffcat_index::{Cardinality, Link, TranslationIndex};
use ffcat_slab::SlabPool;
use rand::Rng;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::chains;
use crate::entry::{CreatedBy, Entry, EntryKind, EntryState};
use crate::file_data::{Checksum, ChecksumKind, Extract, FileData};
use crate::limits::{GEN_ID_MAX_RETRIES, L1_SIZE};
use crate::section::Section;
use crate::time::{BrokenDownTime, DateTimeTree};
use crate::verify::{self, VerifyFlags};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeKind {
    Tod,
    Tom,
    Tusr,
}

/// One checksum to attach to a file or section at creation time.
#[derive(Debug, Clone)]
pub struct ChecksumInput {
    pub kind: ChecksumKind,
    pub bytes: Vec<u8>,
}

/// One extract to attach to a file or section at creation time.
#[derive(Debug, Clone)]
pub struct ExtractInput {
    pub position: u64,
    pub bytes: Vec<u8>,
}

/// One section to attach to a file-data record at creation time.
#[derive(Debug, Clone)]
pub struct SectionInput {
    pub start: u64,
    pub end: u64,
    pub checksums: Vec<ChecksumInput>,
    pub extracts: Vec<ExtractInput>,
}

/// One criterion of a [`Database::find_entry_in_sub_branch`] scored
/// match (spec.md 4.E, "Multi-attribute match").
#[derive(Debug, Clone)]
pub enum MatchCriterion<'a> {
    Name(&'a [u8]),
    FileSize(u64),
    FileSha(ChecksumKind, &'a [u8]),
    SectionSha(ChecksumKind, &'a [u8]),
}

/// The in-memory catalog: a forest of entries rooted at a per-database
/// tree-root sentinel (spec.md §3), plus every translation index and
/// the date-time trees that index it.
pub struct Database {
    pub name: String,
    pub(crate) entries: SlabPool<Entry>,
    pub(crate) file_datas: SlabPool<FileData>,
    pub(crate) sections: SlabPool<Section>,
    pub(crate) root_slot: u64,

    pub(crate) eid_index: TranslationIndex,
    pub(crate) fn_index: TranslationIndex,
    pub(crate) tag_index: TranslationIndex,
    pub(crate) size_index: TranslationIndex,
    pub(crate) sha1f_index: TranslationIndex,
    pub(crate) sha256f_index: TranslationIndex,
    pub(crate) sha512f_index: TranslationIndex,
    pub(crate) sha1s_index: TranslationIndex,
    pub(crate) sha256s_index: TranslationIndex,
    pub(crate) sha512s_index: TranslationIndex,

    tod_tree: DateTimeTree,
    tom_tree: DateTimeTree,
    tusr_tree: DateTimeTree,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        let mut entries: SlabPool<Entry> = SlabPool::new(L1_SIZE);
        let (root, root_slot) = entries.add();
        root.entry_id = 0;
        root.branch_id = 0;
        root.parent = root_slot;
        root.has_parent = false;
        root.depth = 0;
        root.kind = EntryKind::Group;
        root.created_by = CreatedBy::System;
        root.state = EntryState::Indexed;
        debug!(slot = root_slot, "tree root created");

        Self {
            name: name.into(),
            entries,
            file_datas: SlabPool::new(L1_SIZE),
            sections: SlabPool::new(L1_SIZE),
            root_slot,
            eid_index: TranslationIndex::new(Cardinality::OneToOne, L1_SIZE),
            fn_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            tag_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            size_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            sha1f_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            sha256f_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            sha512f_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            sha1s_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            sha256s_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            sha512s_index: TranslationIndex::new(Cardinality::OneToMany, L1_SIZE),
            tod_tree: DateTimeTree::new(),
            tom_tree: DateTimeTree::new(),
            tusr_tree: DateTimeTree::new(),
        }
    }

    pub fn root_slot(&self) -> u64 {
        self.root_slot
    }

    pub fn entry(&self, slot: u64) -> Option<&Entry> {
        self.entries.get(slot)
    }

    pub fn file_data(&self, slot: u64) -> Option<&FileData> {
        self.file_datas.get(slot)
    }

    pub fn section(&self, slot: u64) -> Option<&Section> {
        self.sections.get(slot)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len() - 1
    }

    /// Entries in `L2`-then-`L1` slab order, excluding the tree root.
    pub fn iter_entries(&self) -> impl Iterator<Item = (u64, &Entry)> {
        self.entries.iter().filter(|&(slot, _)| slot != self.root_slot)
    }

    fn gen_entry_id(&self) -> Result<u64> {
        let mut rng = rand::rng();
        for _ in 0..GEN_ID_MAX_RETRIES {
            let id: u64 = rng.random();
            if id == 0 {
                continue;
            }
            let hex = format!("{id:016x}");
            if self.eid_index.lookup_exact(hex.as_bytes()).is_none() {
                return Ok(id);
            }
        }
        Err(CatalogError::GenIdFail)
    }

    fn collect_chain<T>(pool: &SlabPool<T>, head: u64, get_next: impl Fn(&T) -> Option<u64>) -> Vec<u64> {
        let mut out = Vec::new();
        let mut cur = Some(head);
        while let Some(c) = cur {
            out.push(c);
            cur = pool.get(c).and_then(|m| get_next(m));
        }
        out
    }

    // ---- entity graph: create/attach/index -----------------------

    /// Create a new entry under `parent` (may be [`Database::root_slot`])
    /// and link it into every applicable index (spec.md 4.E, steps
    /// 1-4).
    pub fn add_entry(
        &mut self,
        parent: u64,
        file_name: &[u8],
        kind: EntryKind,
        created_by: CreatedBy,
    ) -> Result<u64> {
        verify::verify_file_name(file_name)?;
        let parent_depth = self
            .entries
            .get(parent)
            .ok_or(CatalogError::FindFail)?
            .depth;
        let parent_branch_id = self.entries.get(parent).unwrap().branch_id;
        let has_parent = parent != self.root_slot;
        let id = self.gen_entry_id()?;
        let now = BrokenDownTime::now();

        let slot = {
            let (entry, slot) = self.entries.add();
            entry.entry_id = id;
            entry.parent = parent;
            entry.has_parent = has_parent;
            entry.branch_id = if has_parent { parent_branch_id } else { id };
            entry.depth = parent_depth + 1;
            entry.kind = kind;
            entry.created_by = created_by;
            entry.file_name = file_name.to_vec();
            entry.tod = Some(now);
            entry.tom = Some(now);
            entry.state = EntryState::Unlinked;
            slot
        };
        trace!(slot, id = format!("{id:016x}"), "entry allocated");

        self.entries
            .get_mut(parent)
            .ok_or(CatalogError::FindFail)?
            .children
            .push(slot);
        self.entries.get_mut(slot).unwrap().state = EntryState::Attached;

        let hex = self.entries.get(slot).unwrap().entry_id_hex();
        self.eid_index.insert_unique(hex.as_bytes(), slot)?;
        chains::link_append(
            &mut self.entries,
            &mut self.fn_index,
            file_name,
            slot,
            |e, p| e.fn_prev = p,
            |e, n| e.fn_next = n,
        )?;
        self.link_time_bucket(slot, TimeKind::Tod)?;
        self.link_time_bucket(slot, TimeKind::Tom)?;

        self.entries.get_mut(slot).unwrap().state = EntryState::Indexed;
        trace!(slot, "entry indexed");
        Ok(slot)
    }

    /// Attach a canonicalized tag string to an already-indexed entry.
    /// `raw_tags` are escaped and framed per spec.md 4.D before
    /// indexing.
    pub fn set_tags<'a>(&mut self, slot: u64, raw_tags: impl IntoIterator<Item = &'a [u8]>) -> Result<()> {
        let framed = verify::canonicalize_tags(raw_tags);
        verify::verify_tag_str(&framed)?;
        self.entries.get_mut(slot).ok_or(CatalogError::FindFail)?.tag_str = Some(framed.clone());
        chains::link_append(
            &mut self.entries,
            &mut self.tag_index,
            &framed,
            slot,
            |e, p| e.tag_prev = p,
            |e, n| e.tag_next = n,
        )?;
        Ok(())
    }

    /// Attach an already-framed tag string verbatim (used by
    /// `copy_entry`, which must not re-escape an already-canonical
    /// value).
    fn set_tag_str_framed(&mut self, slot: u64, framed: &[u8]) -> Result<()> {
        self.entries.get_mut(slot).ok_or(CatalogError::FindFail)?.tag_str = Some(framed.to_vec());
        chains::link_append(
            &mut self.entries,
            &mut self.tag_index,
            framed,
            slot,
            |e, p| e.tag_prev = p,
            |e, n| e.tag_next = n,
        )
    }

    pub fn set_user_msg(&mut self, slot: u64, msg: &[u8]) -> Result<()> {
        verify::verify_user_msg(msg)?;
        self.entries.get_mut(slot).ok_or(CatalogError::FindFail)?.user_msg = Some(msg.to_vec());
        Ok(())
    }

    pub fn set_user_time(&mut self, slot: u64, t: BrokenDownTime) -> Result<()> {
        self.entries.get_mut(slot).ok_or(CatalogError::FindFail)?.tusr = Some(t);
        self.link_time_bucket(slot, TimeKind::Tusr)?;
        Ok(())
    }

    fn time_tree_mut(&mut self, kind: TimeKind) -> &mut DateTimeTree {
        match kind {
            TimeKind::Tod => &mut self.tod_tree,
            TimeKind::Tom => &mut self.tom_tree,
            TimeKind::Tusr => &mut self.tusr_tree,
        }
    }

    fn entry_time(entry: &Entry, kind: TimeKind) -> Option<BrokenDownTime> {
        match kind {
            TimeKind::Tod => entry.tod,
            TimeKind::Tom => entry.tom,
            TimeKind::Tusr => entry.tusr,
        }
    }

    fn chain_prev(entry: &Entry, kind: TimeKind) -> Option<u64> {
        match kind {
            TimeKind::Tod => entry.tod_prev,
            TimeKind::Tom => entry.tom_prev,
            TimeKind::Tusr => entry.tusr_prev,
        }
    }

    fn chain_next(entry: &Entry, kind: TimeKind) -> Option<u64> {
        match kind {
            TimeKind::Tod => entry.tod_next,
            TimeKind::Tom => entry.tom_next,
            TimeKind::Tusr => entry.tusr_next,
        }
    }

    fn set_chain_prev(entry: &mut Entry, kind: TimeKind, v: Option<u64>) {
        match kind {
            TimeKind::Tod => entry.tod_prev = v,
            TimeKind::Tom => entry.tom_prev = v,
            TimeKind::Tusr => entry.tusr_prev = v,
        }
    }

    fn set_chain_next(entry: &mut Entry, kind: TimeKind, v: Option<u64>) {
        match kind {
            TimeKind::Tod => entry.tod_next = v,
            TimeKind::Tom => entry.tom_next = v,
            TimeKind::Tusr => entry.tusr_next = v,
        }
    }

    /// Insert `slot` into its `(year, month, day, hour)` bucket,
    /// keeping the bucket's chain minute-sorted (spec.md §3,
    /// "Date-time tree"). A no-op if the entry has no value for `kind`
    /// (e.g. `tusr` is optional). `tom` gets the same fully symmetric
    /// treatment as `tod` (SPEC_FULL.md §4: the original's `tom`
    /// fall-through bug is not replicated here).
    pub(crate) fn link_time_bucket(&mut self, slot: u64, kind: TimeKind) -> Result<()> {
        let t = match Self::entry_time(self.entries.get(slot).ok_or(CatalogError::FindFail)?, kind) {
            Some(t) => t,
            None => return Ok(()),
        };
        let head = self.time_tree_mut(kind).bucket_head(&t);

        let mut prev: Option<u64> = None;
        let mut cur = head;
        while let Some(c) = cur {
            let c_entry = self
                .entries
                .get(c)
                .ok_or_else(|| CatalogError::LogicError("time-bucket member missing".into()))?;
            let c_time = Self::entry_time(c_entry, kind)
                .ok_or_else(|| CatalogError::LogicError("time-bucket member has no timestamp".into()))?;
            if c_time.min > t.min {
                break;
            }
            prev = Some(c);
            cur = Self::chain_next(c_entry, kind);
        }

        {
            let e = self.entries.get_mut(slot).unwrap();
            Self::set_chain_prev(e, kind, prev);
            Self::set_chain_next(e, kind, cur);
        }
        if let Some(p) = prev {
            Self::set_chain_next(self.entries.get_mut(p).unwrap(), kind, Some(slot));
        } else {
            self.time_tree_mut(kind).set_bucket_head(&t, Some(slot));
        }
        if let Some(c) = cur {
            Self::set_chain_prev(self.entries.get_mut(c).unwrap(), kind, Some(slot));
        }
        Ok(())
    }

    fn unlink_time_bucket(&mut self, slot: u64, kind: TimeKind) -> Result<()> {
        let entry = self.entries.get(slot).ok_or(CatalogError::FindFail)?;
        let t = match Self::entry_time(entry, kind) {
            Some(t) => t,
            None => return Ok(()),
        };
        let prev = Self::chain_prev(entry, kind);
        let next = Self::chain_next(entry, kind);
        if let Some(p) = prev {
            Self::set_chain_next(self.entries.get_mut(p).unwrap(), kind, next);
        } else {
            self.time_tree_mut(kind).set_bucket_head(&t, next);
        }
        if let Some(n) = next {
            Self::set_chain_prev(self.entries.get_mut(n).unwrap(), kind, prev);
        }
        let e = self.entries.get_mut(slot).unwrap();
        Self::set_chain_prev(e, kind, None);
        Self::set_chain_next(e, kind, None);
        Ok(())
    }

    // ---- file-data / sections --------------------------------------

    fn sha_f_index_mut(&mut self, kind: ChecksumKind) -> &mut TranslationIndex {
        match kind {
            ChecksumKind::Sha1 => &mut self.sha1f_index,
            ChecksumKind::Sha256 => &mut self.sha256f_index,
            ChecksumKind::Sha512 => &mut self.sha512f_index,
        }
    }

    fn sha_f_index(&self, kind: ChecksumKind) -> &TranslationIndex {
        match kind {
            ChecksumKind::Sha1 => &self.sha1f_index,
            ChecksumKind::Sha256 => &self.sha256f_index,
            ChecksumKind::Sha512 => &self.sha512f_index,
        }
    }

    fn sha_s_index_mut(&mut self, kind: ChecksumKind) -> &mut TranslationIndex {
        match kind {
            ChecksumKind::Sha1 => &mut self.sha1s_index,
            ChecksumKind::Sha256 => &mut self.sha256s_index,
            ChecksumKind::Sha512 => &mut self.sha512s_index,
        }
    }

    fn sha_s_index(&self, kind: ChecksumKind) -> &TranslationIndex {
        match kind {
            ChecksumKind::Sha1 => &self.sha1s_index,
            ChecksumKind::Sha256 => &self.sha256s_index,
            ChecksumKind::Sha512 => &self.sha512s_index,
        }
    }

    pub(crate) fn attach_file_hash(&mut self, kind: ChecksumKind, hex: &[u8], slot: u64) -> Result<()> {
        match kind {
            ChecksumKind::Sha1 => chains::link_append(
                &mut self.file_datas,
                &mut self.sha1f_index,
                hex,
                slot,
                |f, p| f.sha1_prev = p,
                |f, n| f.sha1_next = n,
            ),
            ChecksumKind::Sha256 => chains::link_append(
                &mut self.file_datas,
                &mut self.sha256f_index,
                hex,
                slot,
                |f, p| f.sha256_prev = p,
                |f, n| f.sha256_next = n,
            ),
            ChecksumKind::Sha512 => chains::link_append(
                &mut self.file_datas,
                &mut self.sha512f_index,
                hex,
                slot,
                |f, p| f.sha512_prev = p,
                |f, n| f.sha512_next = n,
            ),
        }
    }

    fn detach_file_hash(&mut self, kind: ChecksumKind, hex: &[u8], slot: u64) -> Result<()> {
        match kind {
            ChecksumKind::Sha1 => chains::link_detach(
                &mut self.file_datas,
                &mut self.sha1f_index,
                hex,
                slot,
                |f| f.sha1_prev,
                |f, p| f.sha1_prev = p,
                |f| f.sha1_next,
                |f, n| f.sha1_next = n,
            ),
            ChecksumKind::Sha256 => chains::link_detach(
                &mut self.file_datas,
                &mut self.sha256f_index,
                hex,
                slot,
                |f| f.sha256_prev,
                |f, p| f.sha256_prev = p,
                |f| f.sha256_next,
                |f, n| f.sha256_next = n,
            ),
            ChecksumKind::Sha512 => chains::link_detach(
                &mut self.file_datas,
                &mut self.sha512f_index,
                hex,
                slot,
                |f| f.sha512_prev,
                |f, p| f.sha512_prev = p,
                |f| f.sha512_next,
                |f, n| f.sha512_next = n,
            ),
        }
    }

    pub(crate) fn attach_section_hash(&mut self, kind: ChecksumKind, hex: &[u8], slot: u64) -> Result<()> {
        match kind {
            ChecksumKind::Sha1 => chains::link_append(
                &mut self.sections,
                &mut self.sha1s_index,
                hex,
                slot,
                |s, p| s.sha1_prev = p,
                |s, n| s.sha1_next = n,
            ),
            ChecksumKind::Sha256 => chains::link_append(
                &mut self.sections,
                &mut self.sha256s_index,
                hex,
                slot,
                |s, p| s.sha256_prev = p,
                |s, n| s.sha256_next = n,
            ),
            ChecksumKind::Sha512 => chains::link_append(
                &mut self.sections,
                &mut self.sha512s_index,
                hex,
                slot,
                |s, p| s.sha512_prev = p,
                |s, n| s.sha512_next = n,
            ),
        }
    }

    fn detach_section_hash(&mut self, kind: ChecksumKind, hex: &[u8], slot: u64) -> Result<()> {
        match kind {
            ChecksumKind::Sha1 => chains::link_detach(
                &mut self.sections,
                &mut self.sha1s_index,
                hex,
                slot,
                |s| s.sha1_prev,
                |s, p| s.sha1_prev = p,
                |s| s.sha1_next,
                |s, n| s.sha1_next = n,
            ),
            ChecksumKind::Sha256 => chains::link_detach(
                &mut self.sections,
                &mut self.sha256s_index,
                hex,
                slot,
                |s| s.sha256_prev,
                |s, p| s.sha256_prev = p,
                |s| s.sha256_next,
                |s, n| s.sha256_next = n,
            ),
            ChecksumKind::Sha512 => chains::link_detach(
                &mut self.sections,
                &mut self.sha512s_index,
                hex,
                slot,
                |s| s.sha512_prev,
                |s, p| s.sha512_prev = p,
                |s| s.sha512_next,
                |s, n| s.sha512_next = n,
            ),
        }
    }

    /// Attach file-data (and, transitively, its sections) to a `File`
    /// entry that has none yet. `norm_sect_size`/`last_sect_size` are
    /// supplied by the host's chunking plan (spec.md §1: checksum
    /// computation, and by extension chunking, is a host collaborator).
    pub fn add_file_data(
        &mut self,
        entry_slot: u64,
        file_size: u64,
        norm_sect_size: u64,
        last_sect_size: u64,
        checksums: Vec<ChecksumInput>,
        extracts: Vec<ExtractInput>,
        sections: Vec<SectionInput>,
    ) -> Result<u64> {
        {
            let entry = self.entries.get(entry_slot).ok_or(CatalogError::FindFail)?;
            if entry.kind != EntryKind::File {
                return Err(CatalogError::WrongArgs);
            }
            if entry.file_data.is_some() {
                return Err(CatalogError::DuplicateError);
            }
        }
        if sections.is_empty() != (norm_sect_size == 0 && last_sect_size == 0) {
            return Err(CatalogError::WrongArgs);
        }

        let mut checksum_slots: [Option<Checksum>; 3] = Default::default();
        for c in &checksums {
            if c.bytes.len() != c.kind.expected_len() {
                return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
            }
            checksum_slots[c.kind.slot()] = Some(Checksum {
                kind: c.kind,
                bytes: c.bytes.clone(),
            });
        }
        let extract_vals: Vec<Extract> = extracts
            .into_iter()
            .map(|e| Extract {
                position: e.position,
                bytes: e.bytes,
            })
            .collect();
        for e in &extract_vals {
            verify::verify_extract(e, file_size)?;
        }

        let fd_slot = {
            let (fd, slot) = self.file_datas.add();
            fd.owner_entry = entry_slot;
            fd.file_size = file_size;
            fd.norm_sect_size = norm_sect_size;
            fd.last_sect_size = last_sect_size;
            fd.checksums = checksum_slots;
            fd.extracts = extract_vals;
            slot
        };
        self.entries.get_mut(entry_slot).unwrap().file_data = Some(fd_slot);

        let size_str = self.file_datas.get(fd_slot).unwrap().file_size_str().into_bytes();
        chains::link_append(
            &mut self.file_datas,
            &mut self.size_index,
            &size_str,
            fd_slot,
            |f, p| f.size_prev = p,
            |f, n| f.size_next = n,
        )?;
        for kind in [ChecksumKind::Sha1, ChecksumKind::Sha256, ChecksumKind::Sha512] {
            if let Some(cs) = self.file_datas.get(fd_slot).unwrap().checksum(kind).cloned() {
                self.attach_file_hash(kind, cs.hex_str().as_bytes(), fd_slot)?;
            }
        }

        for input in sections {
            self.add_section(fd_slot, input)?;
        }
        Ok(fd_slot)
    }

    /// Append one section to `fd_slot`'s owning file-data (spec.md §3,
    /// "Section" invariants).
    pub fn add_section(&mut self, fd_slot: u64, input: SectionInput) -> Result<u64> {
        let (file_size, norm, last, prev_end, existing_count) = {
            let fd = self.file_datas.get(fd_slot).ok_or(CatalogError::FindFail)?;
            let prev_end = fd.sections.last().and_then(|&s| self.sections.get(s)).map(|s| s.end_pos);
            (fd.file_size, fd.norm_sect_size, fd.last_sect_size, prev_end, fd.sections.len())
        };
        // Strict `start < end < file_size` (spec.md §3, §8): a section
        // ending exactly at file_size would fail its own verify_entry.
        if input.start >= input.end || input.end >= file_size {
            return Err(CatalogError::WrongArgs);
        }
        if let Some(end) = prev_end {
            if input.start < end {
                return Err(CatalogError::WrongArgs);
            }
        }
        let len = input.end - input.start;
        if norm > 0 {
            let is_last = existing_count + 1 == expected_section_count(file_size, norm, last);
            let expected = if is_last { last } else { norm };
            if len != expected {
                return Err(CatalogError::WrongArgs);
            }
        }

        let mut checksum_slots: [Option<Checksum>; 3] = Default::default();
        for c in &input.checksums {
            if c.bytes.len() != c.kind.expected_len() {
                return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
            }
            checksum_slots[c.kind.slot()] = Some(Checksum {
                kind: c.kind,
                bytes: c.bytes.clone(),
            });
        }
        let extract_vals: Vec<Extract> = input
            .extracts
            .into_iter()
            .map(|e| Extract {
                position: e.position,
                bytes: e.bytes,
            })
            .collect();
        for e in &extract_vals {
            verify::verify_extract(e, input.end - input.start)?;
        }

        let slot = {
            let (s, slot) = self.sections.add();
            s.owner_file_data = fd_slot;
            s.start_pos = input.start;
            s.end_pos = input.end;
            s.checksums = checksum_slots;
            s.extracts = extract_vals;
            slot
        };
        self.file_datas.get_mut(fd_slot).unwrap().sections.push(slot);

        for kind in [ChecksumKind::Sha1, ChecksumKind::Sha256, ChecksumKind::Sha512] {
            if let Some(cs) = self.sections.get(slot).unwrap().checksum(kind).cloned() {
                self.attach_section_hash(kind, cs.hex_str().as_bytes(), slot)?;
            }
        }
        Ok(slot)
    }

    // ---- deletion ---------------------------------------------------

    /// Recursively delete `slot` and everything it owns, unlinking
    /// from every index first (spec.md §3, "Lifecycle").
    pub fn delete_entry(&mut self, slot: u64) -> Result<()> {
        if slot == self.root_slot {
            return Err(CatalogError::WrongArgs);
        }
        let children = self.entries.get(slot).ok_or(CatalogError::FindFail)?.children.clone();
        for c in children {
            self.delete_entry(c)?;
        }

        let (parent, file_name, tag_str, file_data, id_hex) = {
            let e = self.entries.get(slot).unwrap();
            (e.parent, e.file_name.clone(), e.tag_str.clone(), e.file_data, e.entry_id_hex())
        };

        if let Some(p) = self.entries.get_mut(parent) {
            p.children.retain(|&c| c != slot);
        }
        self.eid_index.remove_unique(id_hex.as_bytes())?;
        chains::link_detach(
            &mut self.entries,
            &mut self.fn_index,
            &file_name,
            slot,
            |e| e.fn_prev,
            |e, p| e.fn_prev = p,
            |e| e.fn_next,
            |e, n| e.fn_next = n,
        )?;
        if let Some(tag) = &tag_str {
            chains::link_detach(
                &mut self.entries,
                &mut self.tag_index,
                tag,
                slot,
                |e| e.tag_prev,
                |e, p| e.tag_prev = p,
                |e| e.tag_next,
                |e, n| e.tag_next = n,
            )?;
        }
        self.unlink_time_bucket(slot, TimeKind::Tod)?;
        self.unlink_time_bucket(slot, TimeKind::Tom)?;
        self.unlink_time_bucket(slot, TimeKind::Tusr)?;
        if let Some(fd_slot) = file_data {
            self.delete_file_data(fd_slot)?;
        }
        self.entries.del(slot)?;
        trace!(slot, "entry deleted");
        Ok(())
    }

    fn delete_file_data(&mut self, fd_slot: u64) -> Result<()> {
        let sections = self.file_datas.get(fd_slot).ok_or(CatalogError::FindFail)?.sections.clone();
        for s in sections {
            self.delete_section(s)?;
        }
        let (size_str, checksums) = {
            let fd = self.file_datas.get(fd_slot).unwrap();
            (fd.file_size_str().into_bytes(), fd.checksums.clone())
        };
        chains::link_detach(
            &mut self.file_datas,
            &mut self.size_index,
            &size_str,
            fd_slot,
            |f| f.size_prev,
            |f, p| f.size_prev = p,
            |f| f.size_next,
            |f, n| f.size_next = n,
        )?;
        for cs in checksums.iter().flatten() {
            self.detach_file_hash(cs.kind, cs.hex_str().as_bytes(), fd_slot)?;
        }
        self.file_datas.del(fd_slot)?;
        Ok(())
    }

    fn delete_section(&mut self, slot: u64) -> Result<()> {
        let checksums = self.sections.get(slot).ok_or(CatalogError::FindFail)?.checksums.clone();
        for cs in checksums.iter().flatten() {
            self.detach_section_hash(cs.kind, cs.hex_str().as_bytes(), slot)?;
        }
        self.sections.del(slot)?;
        Ok(())
    }

    // ---- lookups: L0 exact -------------------------------------------

    pub fn lookup_exact_by_eid_hex(&self, hex: &[u8]) -> Option<u64> {
        match self.eid_index.lookup_exact(hex)?.link {
            Link::One { target } => Some(target),
            Link::Many { head, .. } => Some(head),
        }
    }

    pub fn lookup_exact_by_name(&self, name: &[u8]) -> Vec<u64> {
        match self.fn_index.chain_info(name) {
            Some((head, _, _)) => Self::collect_chain(&self.entries, head, |e| e.fn_next),
            None => Vec::new(),
        }
    }

    /// Exact lookup with an already-framed `|…|` tag string.
    pub fn lookup_tag_exact(&self, framed: &[u8]) -> Vec<u64> {
        match self.tag_index.chain_info(framed) {
            Some((head, _, _)) => Self::collect_chain(&self.entries, head, |e| e.tag_next),
            None => Vec::new(),
        }
    }

    /// Exact lookup, canonicalizing one raw user-supplied tag first
    /// (spec.md scenario 4).
    pub fn lookup_tag_exact_raw(&self, raw_tag: &[u8]) -> Vec<u64> {
        let framed = verify::canonicalize_tag(raw_tag);
        self.lookup_tag_exact(&framed)
    }

    pub fn lookup_exact_by_size(&self, size: u64) -> Vec<u64> {
        let s = size.to_string();
        match self.size_index.chain_info(s.as_bytes()) {
            Some((head, _, _)) => Self::collect_chain(&self.file_datas, head, |f| f.size_next),
            None => Vec::new(),
        }
    }

    pub fn lookup_exact_by_file_sha(&self, kind: ChecksumKind, hex: &[u8]) -> Vec<u64> {
        match self.sha_f_index(kind).chain_info(hex) {
            Some((head, _, _)) => match kind {
                ChecksumKind::Sha1 => Self::collect_chain(&self.file_datas, head, |f| f.sha1_next),
                ChecksumKind::Sha256 => Self::collect_chain(&self.file_datas, head, |f| f.sha256_next),
                ChecksumKind::Sha512 => Self::collect_chain(&self.file_datas, head, |f| f.sha512_next),
            },
            None => Vec::new(),
        }
    }

    pub fn lookup_exact_by_section_sha(&self, kind: ChecksumKind, hex: &[u8]) -> Vec<u64> {
        match self.sha_s_index(kind).chain_info(hex) {
            Some((head, _, _)) => match kind {
                ChecksumKind::Sha1 => Self::collect_chain(&self.sections, head, |s| s.sha1_next),
                ChecksumKind::Sha256 => Self::collect_chain(&self.sections, head, |s| s.sha256_next),
                ChecksumKind::Sha512 => Self::collect_chain(&self.sections, head, |s| s.sha512_next),
            },
            None => Vec::new(),
        }
    }

    // ---- lookups: L1/L2 partial (substring) ---------------------------

    pub fn partial_lookup_name(
        &self,
        needle: &[u8],
        start_min: Option<usize>,
        start_max: Option<usize>,
    ) -> Result<Vec<u64>> {
        self.partial_lookup_generic(&self.fn_index, &self.entries, needle, start_min, start_max, |e| e.fn_next)
    }

    pub fn partial_lookup_tag(
        &self,
        needle: &[u8],
        start_min: Option<usize>,
        start_max: Option<usize>,
    ) -> Result<Vec<u64>> {
        self.partial_lookup_generic(&self.tag_index, &self.entries, needle, start_min, start_max, |e| e.tag_next)
    }

    fn partial_lookup_generic<T>(
        &self,
        index: &TranslationIndex,
        pool: &SlabPool<T>,
        needle: &[u8],
        start_min: Option<usize>,
        start_max: Option<usize>,
        get_next: impl Fn(&T) -> Option<u64>,
    ) -> Result<Vec<u64>> {
        let mut buf = Bitmap::new(0, 0);
        let mut res = Bitmap::new(0, 0);
        let matches = index.partial_lookup_buffered(needle, start_min, start_max, &mut buf, &mut res, usize::MAX)?;
        let mut out = Vec::new();
        for m in matches {
            if let Link::Many { head, .. } = m.link {
                out.extend(Self::collect_chain(pool, head, &get_next));
            }
        }
        Ok(out)
    }

    // ---- children lookup (spec.md 4.E) --------------------------------

    pub fn find_children_exact(&self, parent: u64, name: &[u8]) -> Result<Vec<u64>> {
        let parent_entry = self.entries.get(parent).ok_or(CatalogError::FindFail)?;
        let child_count = parent_entry.children.len();
        if let Some((head, _, count)) = self.fn_index.chain_info(name) {
            if count < child_count {
                let chain = Self::collect_chain(&self.entries, head, |e| e.fn_next);
                return Ok(chain
                    .into_iter()
                    .filter(|&c| self.entries.get(c).map(|e| e.parent) == Some(parent))
                    .collect());
            }
        }
        Ok(parent_entry
            .children
            .iter()
            .copied()
            .filter(|&c| self.entries.get(c).map(|e| e.file_name.as_slice()) == Some(name))
            .collect())
    }

    pub fn find_children_partial(&self, parent: u64, needle: &[u8]) -> Result<Vec<u64>> {
        let parent_entry = self.entries.get(parent).ok_or(CatalogError::FindFail)?;
        let child_count = parent_entry.children.len();

        let mut buf = Bitmap::new(0, 0);
        let mut map = Bitmap::new(0, 0);
        self.fn_index.partial_map_only(needle, None, None, &mut buf, &mut map)?;
        let bitmap_driven = map.number_of_ones() * L1_SIZE <= child_count;

        if bitmap_driven {
            let matches = self
                .fn_index
                .partial_lookup_buffered(needle, None, None, &mut buf, &mut map, usize::MAX)?;
            let mut out = Vec::new();
            for m in matches {
                if let Link::Many { head, .. } = m.link {
                    out.extend(
                        Self::collect_chain(&self.entries, head, |e| e.fn_next)
                            .into_iter()
                            .filter(|&c| self.entries.get(c).map(|e| e.parent) == Some(parent)),
                    );
                }
            }
            Ok(out)
        } else {
            Ok(parent_entry
                .children
                .iter()
                .copied()
                .filter(|&c| {
                    self.entries
                        .get(c)
                        .is_some_and(|e| contains_subslice(&e.file_name, needle))
                })
                .collect())
        }
    }

    pub fn find_children_by_id_prefix(&self, parent: u64, prefix: &[u8]) -> Result<Vec<u64>> {
        let parent_entry = self.entries.get(parent).ok_or(CatalogError::FindFail)?;
        Ok(parent_entry
            .children
            .iter()
            .copied()
            .filter(|&c| {
                self.entries
                    .get(c)
                    .is_some_and(|e| e.entry_id_hex().as_bytes().starts_with(prefix))
            })
            .collect())
    }

    // ---- scored multi-attribute match (spec.md 4.E) -------------------

    fn is_descendant(&self, candidate: u64, root: u64) -> bool {
        if candidate == root {
            return true;
        }
        let mut cur = candidate;
        loop {
            let Some(e) = self.entries.get(cur) else { return false };
            if !e.has_parent {
                return false;
            }
            if e.parent == root {
                return true;
            }
            cur = e.parent;
        }
    }

    fn file_data_owner(&self, fd_slot: u64) -> Option<u64> {
        self.file_datas.get(fd_slot).map(|f| f.owner_entry)
    }

    fn section_owner_entry(&self, section_slot: u64) -> Option<u64> {
        let fd_slot = self.sections.get(section_slot)?.owner_file_data;
        self.file_data_owner(fd_slot)
    }

    /// Score-threshold match over every entry in the subtree rooted at
    /// `root` (inclusive), accepting entries that satisfy at least
    /// `round(score_pct * criteria.len() / 100)` of the given criteria
    /// (spec.md 4.E, "Multi-attribute match").
    pub fn find_entry_in_sub_branch(&self, root: u64, criteria: &[MatchCriterion], score_pct: u32) -> Result<Vec<u64>> {
        if self.entries.get(root).is_none() {
            return Err(CatalogError::FindFail);
        }
        let min_match = ((score_pct as f64 * criteria.len() as f64) / 100.0).round() as u32;
        let mut counts: FxHashMap<u64, u32> = FxHashMap::default();

        for criterion in criteria {
            let matched_entries: Vec<u64> = match criterion {
                MatchCriterion::Name(name) => self.lookup_exact_by_name(name),
                MatchCriterion::FileSize(sz) => self
                    .lookup_exact_by_size(*sz)
                    .into_iter()
                    .filter_map(|fd| self.file_data_owner(fd))
                    .collect(),
                MatchCriterion::FileSha(kind, hex) => self
                    .lookup_exact_by_file_sha(*kind, hex)
                    .into_iter()
                    .filter_map(|fd| self.file_data_owner(fd))
                    .collect(),
                MatchCriterion::SectionSha(kind, hex) => self
                    .lookup_exact_by_section_sha(*kind, hex)
                    .into_iter()
                    .filter_map(|s| self.section_owner_entry(s))
                    .collect(),
            };
            for e in matched_entries {
                if self.is_descendant(e, root) {
                    *counts.entry(e).or_insert(0) += 1;
                }
            }
        }

        Ok(counts
            .into_iter()
            .filter(|&(_, c)| c >= min_match)
            .map(|(e, _)| e)
            .collect())
    }

    // ---- copy ----------------------------------------------------------

    /// Copy `src` under `new_parent`, generating a fresh id (spec.md
    /// 4.E, "Copy entry"). `user_msg` is copied from the source's own
    /// `user_msg`, not its `tag_str` (SPEC_FULL.md §4 — the original's
    /// copy-entry bug is not replicated).
    pub fn copy_entry(&mut self, src: u64, new_parent: u64, recursive: bool) -> Result<u64> {
        let (name, tag_str, user_msg, tusr, kind, created_by, file_data, children) = {
            let e = self.entries.get(src).ok_or(CatalogError::FindFail)?;
            (
                e.file_name.clone(),
                e.tag_str.clone(),
                e.user_msg.clone(),
                e.tusr,
                e.kind,
                e.created_by,
                e.file_data,
                e.children.clone(),
            )
        };
        let new_slot = self.add_entry(new_parent, &name, kind, created_by)?;
        if let Some(tag) = &tag_str {
            self.set_tag_str_framed(new_slot, tag)?;
        }
        if let Some(msg) = &user_msg {
            self.set_user_msg(new_slot, msg)?;
        }
        if let Some(t) = tusr {
            self.set_user_time(new_slot, t)?;
        }
        if let Some(fd_slot) = file_data {
            self.copy_file_data(fd_slot, new_slot)?;
        }
        if recursive {
            for c in children {
                self.copy_entry(c, new_slot, true)?;
            }
        }
        self.verify_entry(new_slot, VerifyFlags::NONE)?;
        Ok(new_slot)
    }

    fn copy_file_data(&mut self, src_fd: u64, new_entry: u64) -> Result<u64> {
        let fd = self.file_datas.get(src_fd).ok_or(CatalogError::FindFail)?;
        let file_size = fd.file_size;
        let norm = fd.norm_sect_size;
        let last = fd.last_sect_size;
        let checksums: Vec<ChecksumInput> = fd
            .checksums
            .iter()
            .flatten()
            .map(|c| ChecksumInput {
                kind: c.kind,
                bytes: c.bytes.clone(),
            })
            .collect();
        let extracts: Vec<ExtractInput> = fd
            .extracts
            .iter()
            .map(|e| ExtractInput {
                position: e.position,
                bytes: e.bytes.clone(),
            })
            .collect();
        let section_inputs: Vec<SectionInput> = fd
            .sections
            .iter()
            .filter_map(|&s| self.sections.get(s))
            .map(|s| SectionInput {
                start: s.start_pos,
                end: s.end_pos,
                checksums: s
                    .checksums
                    .iter()
                    .flatten()
                    .map(|c| ChecksumInput {
                        kind: c.kind,
                        bytes: c.bytes.clone(),
                    })
                    .collect(),
                extracts: s
                    .extracts
                    .iter()
                    .map(|e| ExtractInput {
                        position: e.position,
                        bytes: e.bytes.clone(),
                    })
                    .collect(),
            })
            .collect();
        self.add_file_data(new_entry, file_size, norm, last, checksums, extracts, section_inputs)
    }

    // ---- verification (spec.md 4.E) -------------------------------------

    pub fn verify_entry(&self, slot: u64, flags: VerifyFlags) -> Result<()> {
        let entry = self.entries.get(slot).ok_or(CatalogError::FindFail)?;
        verify::verify_file_name(&entry.file_name)?;
        if let Some(tag) = &entry.tag_str {
            verify::verify_tag_str(tag)?;
        }
        if let Some(msg) = &entry.user_msg {
            verify::verify_user_msg(msg)?;
        }

        if entry.has_parent {
            match self.entries.get(entry.parent) {
                Some(parent) => {
                    if entry.depth != parent.depth + 1 {
                        return Err(CatalogError::VerifyFail(VerifyFailKind::WrongForwardStat));
                    }
                    if entry.branch_id != parent.branch_id {
                        return Err(CatalogError::VerifyFail(VerifyFailKind::WrongBackwardStat));
                    }
                }
                None if flags.allow_null_child_ptr => {}
                None => return Err(CatalogError::VerifyFail(VerifyFailKind::MissingHead)),
            }
        } else if entry.entry_id == 0 {
            if entry.depth != 0 {
                return Err(CatalogError::VerifyFail(VerifyFailKind::WrongForwardStat));
            }
        } else if entry.depth != 1 || entry.branch_id != entry.entry_id {
            return Err(CatalogError::VerifyFail(VerifyFailKind::WrongForwardStat));
        }

        if let Some(fd_slot) = entry.file_data {
            self.verify_file_data(fd_slot)?;
        }
        Ok(())
    }

    // ---- persistence (spec.md 4.G) --------------------------------------

    /// Save the entity graph to `writer` in the version "00.01" binary
    /// format (spec.md §6). Entries that fail [`Database::verify_entry`]
    /// are skipped together with their subtree and a warning is logged
    /// (spec.md 4.G).
    pub fn save<W: std::io::Write>(&self, writer: W) -> Result<()> {
        crate::persist::save(self, writer)
    }

    /// Load a database named `name` from `reader`, rebuilding every
    /// index and the date-time trees as each entry is linked in
    /// (spec.md 4.G). `DuplicateError` if two entries share an
    /// `entry_id`.
    pub fn load<R: std::io::Read>(name: impl Into<String>, reader: R) -> Result<Self> {
        crate::persist::load(name, reader)
    }

    fn verify_file_data(&self, fd_slot: u64) -> Result<()> {
        let fd = self.file_datas.get(fd_slot).ok_or(CatalogError::FindFail)?;
        for cs in fd.checksums.iter().flatten() {
            verify::verify_checksum(cs)?;
        }
        for ex in &fd.extracts {
            verify::verify_extract(ex, fd.file_size)?;
        }
        if fd.sections.is_empty() != (fd.norm_sect_size == 0 && fd.last_sect_size == 0) {
            return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
        }
        if fd.sections.len() >= 2 && fd.last_sect_size > fd.norm_sect_size {
            return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
        }
        if fd.sections.len() == 1 && fd.last_sect_size != fd.norm_sect_size {
            return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
        }

        let mut prev_end: Option<u64> = None;
        for &s in &fd.sections {
            let section = self.sections.get(s).ok_or(CatalogError::FindFail)?;
            if section.start_pos >= section.end_pos || section.end_pos >= fd.file_size {
                return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
            }
            if let Some(end) = prev_end {
                if fd.norm_sect_size > 0 && section.start_pos < end {
                    return Err(CatalogError::VerifyFail(VerifyFailKind::WrongForwardStat));
                }
            }
            prev_end = Some(section.end_pos);
            for cs in section.checksums.iter().flatten() {
                verify::verify_checksum(cs)?;
            }
            for ex in &section.extracts {
                verify::verify_extract(ex, section.end_pos - section.start_pos)?;
            }
        }
        Ok(())
    }
}

/// How many sections a file of `file_size` splits into under a
/// `norm`-sized chunking with a `last`-sized final chunk. Shared by
/// [`Database::add_section`]'s creation-time check and
/// [`crate::persist::read_section`]'s load-time check so the two paths
/// can't drift apart on what counts as a "last" section.
pub(crate) fn expected_section_count(file_size: u64, norm: u64, last: u64) -> usize {
    if norm == 0 {
        return 0;
    }
    let whole = file_size / norm;
    if file_size % norm == 0 && last == norm {
        whole as usize
    } else {
        whole as usize + 1
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}
