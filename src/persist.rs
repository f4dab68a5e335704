//! Binary persistence (spec.md 4.G / §6): big-endian, preamble/trailer
//! framed save and load of a [`Database`]'s entity graph, version
//! "00.01". The wire format is walked in a single forward pass; `save`
//! precomputes the full post-verification entry order before writing
//! anything, so `entry_count` is known up front and the header never
//! needs a seek-back patch the way the original's streaming writer
//! does (SPEC_FULL.md §2, "field-presence bitmap constants").

use std::io::{Read, Write};

use ffcat_error::{CatalogError, Result};
use tracing::{trace, warn};

use crate::database::{expected_section_count, Database, TimeKind};
use crate::entry::{CreatedBy, EntryKind, EntryState};
use crate::file_data::{Checksum, ChecksumKind, Extract};
use crate::limits::{CHECKSUM_MAX_LEN, CHECKSUM_MAX_NUM, EXTRACT_MAX_NUM, EXTRACT_SIZE_MAX, FILE_NAME_MAX, TAG_STR_MAX, USER_MSG_MAX};
use crate::chains;
use crate::verify;

/// Preamble and trailer framing bytes (spec.md §6): `[0x01 0x02 … 0x0F]`.
const FRAME: [u8; 15] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
];

const VERSION: &[u8; 5] = b"00.01";

const PRESENCE_TAG: u64 = 1 << 0;
const PRESENCE_USER_MSG: u64 = 1 << 1;
const PRESENCE_TOD: u64 = 1 << 2;
const PRESENCE_TOM: u64 = 1 << 3;
const PRESENCE_TUSR: u64 = 1 << 4;
const PRESENCE_FILE_DATA: u64 = 1 << 5;

/// On-disk entry `type` codes (spec.md §6): `1=Other` is rejected on
/// load, `2=File`, `3=Group`.
const TYPE_OTHER: u16 = 1;
const TYPE_FILE: u16 = 2;
const TYPE_GROUP: u16 = 3;

fn check_endian() -> Result<()> {
    if cfg!(target_endian = "little") || cfg!(target_endian = "big") {
        Ok(())
    } else {
        Err(CatalogError::EndianNoSupport)
    }
}

// ---- primitive writers ------------------------------------------------

fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v]).map_err(CatalogError::FwriteError)
}

fn write_i8<W: Write>(w: &mut W, v: i8) -> Result<()> {
    write_u8(w, v as u8)
}

fn write_u16<W: Write>(w: &mut W, v: u16) -> Result<()> {
    w.write_all(&v.to_be_bytes()).map_err(CatalogError::FwriteError)
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_be_bytes()).map_err(CatalogError::FwriteError)
}

fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_all(&v.to_be_bytes()).map_err(CatalogError::FwriteError)
}

fn write_i64<W: Write>(w: &mut W, v: i64) -> Result<()> {
    w.write_all(&v.to_be_bytes()).map_err(CatalogError::FwriteError)
}

fn write_bytes<W: Write>(w: &mut W, bytes: &[u8]) -> Result<()> {
    w.write_all(bytes).map_err(CatalogError::FwriteError)
}

// ---- primitive readers -------------------------------------------------

/// `on_eof` is a fresh-error factory rather than a bare [`CatalogError`]
/// value: the enum isn't `Copy` (some variants carry an `io::Error`), so
/// a bare value couldn't be reused across the many fields one record
/// reads. A non-capturing closure coerces to `fn() -> CatalogError` and
/// is `Copy`, so callers can pass one literal and thread it through a
/// whole record.
fn read_exact_or<R: Read>(r: &mut R, buf: &mut [u8], on_eof: fn() -> CatalogError) -> Result<()> {
    match r.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(on_eof()),
        Err(e) => Err(CatalogError::FreadError(e)),
    }
}

fn read_u8<R: Read>(r: &mut R, on_eof: fn() -> CatalogError) -> Result<u8> {
    let mut b = [0u8; 1];
    read_exact_or(r, &mut b, on_eof)?;
    Ok(b[0])
}

fn read_i8<R: Read>(r: &mut R, on_eof: fn() -> CatalogError) -> Result<i8> {
    Ok(read_u8(r, on_eof)? as i8)
}

fn read_u16<R: Read>(r: &mut R, on_eof: fn() -> CatalogError) -> Result<u16> {
    let mut b = [0u8; 2];
    read_exact_or(r, &mut b, on_eof)?;
    Ok(u16::from_be_bytes(b))
}

fn read_u32<R: Read>(r: &mut R, on_eof: fn() -> CatalogError) -> Result<u32> {
    let mut b = [0u8; 4];
    read_exact_or(r, &mut b, on_eof)?;
    Ok(u32::from_be_bytes(b))
}

fn read_u64<R: Read>(r: &mut R, on_eof: fn() -> CatalogError) -> Result<u64> {
    let mut b = [0u8; 8];
    read_exact_or(r, &mut b, on_eof)?;
    Ok(u64::from_be_bytes(b))
}

fn read_i64<R: Read>(r: &mut R, on_eof: fn() -> CatalogError) -> Result<i64> {
    let mut b = [0u8; 8];
    read_exact_or(r, &mut b, on_eof)?;
    Ok(i64::from_be_bytes(b))
}

fn too_soon() -> CatalogError {
    CatalogError::FileEndTooSoon
}

fn file_end() -> CatalogError {
    CatalogError::FileEnd
}

fn read_len16_bytes<R: Read>(r: &mut R, max: usize) -> Result<Vec<u8>> {
    let len = read_u16(r, too_soon)? as usize;
    if len > max {
        return Err(CatalogError::FileBroken);
    }
    let mut buf = vec![0u8; len];
    read_exact_or(r, &mut buf, too_soon)?;
    Ok(buf)
}

// ---- time-of-day block (18 bytes, spec.md §6) --------------------------

fn write_time<W: Write>(w: &mut W, t: &crate::time::BrokenDownTime) -> Result<()> {
    write_u8(w, t.sec)?;
    write_u8(w, t.min)?;
    write_u8(w, t.hour)?;
    write_u8(w, t.mday)?;
    write_u8(w, t.mon)?;
    write_i64(w, t.year)?;
    write_u8(w, t.wday)?;
    write_u16(w, t.yday)?;
    write_i8(w, t.isdst)?;
    write_u8(w, 0) // pad byte rounding the record to 18 bytes
}

fn read_time<R: Read>(r: &mut R) -> Result<crate::time::BrokenDownTime> {
    let sec = read_u8(r, too_soon)?;
    let min = read_u8(r, too_soon)?;
    let hour = read_u8(r, too_soon)?;
    let mday = read_u8(r, too_soon)?;
    let mon = read_u8(r, too_soon)?;
    let year = read_i64(r, too_soon)?;
    let wday = read_u8(r, too_soon)?;
    let yday = read_u16(r, too_soon)?;
    let isdst = read_i8(r, too_soon)?;
    let _pad = read_u8(r, too_soon)?;
    let t = crate::time::BrokenDownTime {
        sec,
        min,
        hour,
        mday,
        mon,
        year,
        wday,
        yday,
        isdst,
    };
    // mon/mday/hour get indexed straight into the date-time tree's
    // months[12]/days[32]/hours[24] arrays; a corrupt file must not
    // reach that unchecked (spec.md §6, §8).
    t.validate()?;
    Ok(t)
}

// ---- checksum / extract blocks -----------------------------------------

fn write_checksums<W: Write>(w: &mut W, checksums: &[Option<Checksum>; CHECKSUM_MAX_NUM]) -> Result<()> {
    let present: Vec<&Checksum> = checksums.iter().flatten().collect();
    write_u16(w, present.len() as u16)?;
    for cs in present {
        write_u16(w, cs.kind.slot() as u16)?;
        write_u16(w, cs.bytes.len() as u16)?;
        write_bytes(w, &cs.bytes)?;
    }
    Ok(())
}

fn read_checksums<R: Read>(r: &mut R) -> Result<[Option<Checksum>; CHECKSUM_MAX_NUM]> {
    let count = read_u16(r, too_soon)? as usize;
    if count > CHECKSUM_MAX_NUM {
        return Err(CatalogError::FileBroken);
    }
    let mut out: [Option<Checksum>; CHECKSUM_MAX_NUM] = Default::default();
    for _ in 0..count {
        let type_code = read_u16(r, too_soon)? as usize;
        let len = read_u16(r, too_soon)? as usize;
        if len > CHECKSUM_MAX_LEN {
            return Err(CatalogError::FileBroken);
        }
        let mut bytes = vec![0u8; len];
        read_exact_or(r, &mut bytes, too_soon)?;
        let kind = ChecksumKind::from_slot(type_code).ok_or(CatalogError::FileBroken)?;
        if len != kind.expected_len() {
            return Err(CatalogError::FileBroken);
        }
        out[kind.slot()] = Some(Checksum { kind, bytes });
    }
    Ok(out)
}

fn write_extracts<W: Write>(w: &mut W, extracts: &[Extract]) -> Result<()> {
    write_u32(w, extracts.len() as u32)?;
    for ex in extracts {
        write_u64(w, ex.position)?;
        write_u16(w, ex.bytes.len() as u16)?;
        write_bytes(w, &ex.bytes)?;
    }
    Ok(())
}

fn read_extracts<R: Read>(r: &mut R) -> Result<Vec<Extract>> {
    let count = read_u32(r, too_soon)? as usize;
    if count > EXTRACT_MAX_NUM {
        return Err(CatalogError::FileBroken);
    }
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let position = read_u64(r, too_soon)?;
        let len = read_u16(r, too_soon)? as usize;
        if len > EXTRACT_SIZE_MAX {
            return Err(CatalogError::FileBroken);
        }
        let mut bytes = vec![0u8; len];
        read_exact_or(r, &mut bytes, too_soon)?;
        out.push(Extract { position, bytes });
    }
    Ok(out)
}

// ---- save ---------------------------------------------------------------

/// DFS-order the entries under the tree root, skipping (with its whole
/// subtree) any entry that fails [`Database::verify_entry`]. This is
/// the Rust-idiom replacement for the original's `link_entry_for_save_file`,
/// which threads a transient `link_prev`/`link_next` pointer pair through
/// the same traversal (spec.md 4.G) — a plain `Vec` serves the same
/// purpose without a second pointer family on `Entry` (spec.md §9).
fn link_entry_for_save_file(db: &Database) -> Vec<u64> {
    let mut order = Vec::new();
    let root_children = db.entry(db.root_slot()).map(|e| e.children.clone()).unwrap_or_default();
    for child in root_children {
        collect_dfs(db, child, &mut order);
    }
    order
}

fn collect_dfs(db: &Database, slot: u64, order: &mut Vec<u64>) {
    if let Err(e) = db.verify_entry(slot, crate::verify::VerifyFlags::NONE) {
        warn!(slot, error = %e, "entry failed verification at save time; skipping subtree");
        return;
    }
    order.push(slot);
    if let Some(entry) = db.entry(slot) {
        for &child in &entry.children {
            collect_dfs(db, child, order);
        }
    }
}

pub fn save<W: Write>(db: &Database, mut w: W) -> Result<()> {
    check_endian()?;
    write_bytes(&mut w, &FRAME)?;
    write_bytes(&mut w, VERSION)?;

    let order = link_entry_for_save_file(db);
    let branch_count = db.entry(db.root_slot()).map(|r| r.children.len()).unwrap_or(0) as u64;
    write_u64(&mut w, branch_count)?;
    write_u64(&mut w, order.len() as u64)?;

    for &slot in &order {
        write_entry_record(&mut w, db, slot)?;
    }

    write_bytes(&mut w, &FRAME)?;
    trace!(entries = order.len(), "database saved");
    Ok(())
}

fn write_entry_record<W: Write>(w: &mut W, db: &Database, slot: u64) -> Result<()> {
    let e = db.entry(slot).ok_or(CatalogError::FindFail)?;

    write_u64(w, e.branch_id)?;
    write_u64(w, e.entry_id)?;
    let parent_id = if e.has_parent {
        db.entry(e.parent).map(|p| p.entry_id).unwrap_or(0)
    } else {
        0
    };
    write_u64(w, parent_id)?;

    let type_code = match e.kind {
        EntryKind::File => TYPE_FILE,
        EntryKind::Group => TYPE_GROUP,
    };
    write_u16(w, type_code)?;
    write_u64(w, e.children.len() as u64)?;
    write_u8(
        w,
        match e.created_by {
            CreatedBy::System => 0,
            CreatedBy::User => 1,
        },
    )?;

    if e.file_name.is_empty() || e.file_name.len() > FILE_NAME_MAX {
        return Err(CatalogError::VerifyFail(ffcat_error::VerifyFailKind::WrongStrLen));
    }
    write_u16(w, e.file_name.len() as u16)?;
    write_bytes(w, &e.file_name)?;

    let mut presence = 0u64;
    if e.tag_str.is_some() {
        presence |= PRESENCE_TAG;
    }
    if e.user_msg.is_some() {
        presence |= PRESENCE_USER_MSG;
    }
    if e.tod.is_some() {
        presence |= PRESENCE_TOD;
    }
    if e.tom.is_some() {
        presence |= PRESENCE_TOM;
    }
    if e.tusr.is_some() {
        presence |= PRESENCE_TUSR;
    }
    if e.file_data.is_some() {
        presence |= PRESENCE_FILE_DATA;
    }
    write_u64(w, presence)?;

    if let Some(tag) = &e.tag_str {
        write_u16(w, tag.len() as u16)?;
        write_bytes(w, tag)?;
    }
    if let Some(msg) = &e.user_msg {
        write_u16(w, msg.len() as u16)?;
        write_bytes(w, msg)?;
    }
    if let Some(t) = &e.tod {
        write_time(w, t)?;
    }
    if let Some(t) = &e.tom {
        write_time(w, t)?;
    }
    if let Some(t) = &e.tusr {
        write_time(w, t)?;
    }
    if let Some(fd_slot) = e.file_data {
        write_file_data(w, db, fd_slot)?;
    }
    Ok(())
}

fn write_file_data<W: Write>(w: &mut W, db: &Database, fd_slot: u64) -> Result<()> {
    let fd = db.file_data(fd_slot).ok_or(CatalogError::FindFail)?;
    write_u64(w, fd.file_size)?;
    write_checksums(w, &fd.checksums)?;
    write_extracts(w, &fd.extracts)?;
    write_u64(w, fd.sections.len() as u64)?;
    write_u64(w, fd.norm_sect_size)?;
    write_u64(w, fd.last_sect_size)?;
    for &s in &fd.sections {
        write_section(w, db, s)?;
    }
    Ok(())
}

fn write_section<W: Write>(w: &mut W, db: &Database, slot: u64) -> Result<()> {
    let s = db.section(slot).ok_or(CatalogError::FindFail)?;
    write_u64(w, s.start_pos)?;
    write_u64(w, s.end_pos)?;
    write_checksums(w, &s.checksums)?;
    write_extracts(w, &s.extracts)?;
    Ok(())
}

// ---- load -----------------------------------------------------------------

pub fn load<R: Read>(name: impl Into<String>, mut r: R) -> Result<Database> {
    check_endian()?;

    let mut frame = [0u8; FRAME.len()];
    read_exact_or(&mut r, &mut frame, file_end)?;
    if frame != FRAME {
        return Err(CatalogError::FileBroken);
    }
    let mut ver = [0u8; 5];
    read_exact_or(&mut r, &mut ver, file_end)?;
    if &ver != VERSION {
        return Err(CatalogError::FileNoSupport);
    }
    let _branch_count = read_u64(&mut r, file_end)?;
    let entry_count = read_u64(&mut r, file_end)?;

    let mut db = Database::new(name);
    let mut id_to_slot: rustc_hash::FxHashMap<u64, u64> = rustc_hash::FxHashMap::default();
    id_to_slot.insert(0, db.root_slot());

    for i in 0..entry_count {
        read_entry_record(&mut r, &mut db, &mut id_to_slot)?;
        trace!(index = i, "entry loaded");
    }

    let mut trailer = [0u8; FRAME.len()];
    read_exact_or(&mut r, &mut trailer, file_end)?;
    if trailer != FRAME {
        return Err(CatalogError::FileBroken);
    }
    Ok(db)
}

fn read_entry_record<R: Read>(
    r: &mut R,
    db: &mut Database,
    id_to_slot: &mut rustc_hash::FxHashMap<u64, u64>,
) -> Result<()> {
    let branch_id = read_u64(r, too_soon)?;
    let entry_id = read_u64(r, too_soon)?;
    if entry_id == 0 {
        return Err(CatalogError::FileBroken);
    }
    let parent_entry_id = read_u64(r, too_soon)?;
    let type_code = read_u16(r, too_soon)?;
    let kind = match type_code {
        TYPE_FILE => EntryKind::File,
        TYPE_GROUP => EntryKind::Group,
        TYPE_OTHER => return Err(CatalogError::FileNoSupport),
        _ => return Err(CatalogError::FileBroken),
    };
    let _child_count = read_u64(r, too_soon)?;
    let created_by = match read_u8(r, too_soon)? {
        0 => CreatedBy::System,
        1 => CreatedBy::User,
        _ => return Err(CatalogError::FileBroken),
    };
    let name_len = read_u16(r, too_soon)? as usize;
    if name_len == 0 || name_len > FILE_NAME_MAX {
        return Err(CatalogError::FileBroken);
    }
    let mut file_name = vec![0u8; name_len];
    read_exact_or(r, &mut file_name, too_soon)?;

    let presence = read_u64(r, too_soon)?;
    let tag_str = if presence & PRESENCE_TAG != 0 {
        Some(read_len16_bytes(r, TAG_STR_MAX)?)
    } else {
        None
    };
    let user_msg = if presence & PRESENCE_USER_MSG != 0 {
        Some(read_len16_bytes(r, USER_MSG_MAX)?)
    } else {
        None
    };
    let tod = if presence & PRESENCE_TOD != 0 { Some(read_time(r)?) } else { None };
    let tom = if presence & PRESENCE_TOM != 0 { Some(read_time(r)?) } else { None };
    let tusr = if presence & PRESENCE_TUSR != 0 { Some(read_time(r)?) } else { None };

    if id_to_slot.contains_key(&entry_id) {
        return Err(CatalogError::DuplicateError);
    }
    let parent_slot = if parent_entry_id == 0 {
        db.root_slot()
    } else {
        *id_to_slot.get(&parent_entry_id).ok_or(CatalogError::FileBroken)?
    };
    let has_parent = parent_slot != db.root_slot();
    let parent_depth = db.entry(parent_slot).ok_or(CatalogError::FileBroken)?.depth;

    let slot = {
        let (entry, slot) = db.entries.add();
        entry.entry_id = entry_id;
        entry.branch_id = branch_id;
        entry.parent = parent_slot;
        entry.has_parent = has_parent;
        entry.depth = parent_depth + 1;
        entry.kind = kind;
        entry.created_by = created_by;
        entry.file_name = file_name.clone();
        entry.tag_str = tag_str.clone();
        entry.user_msg = user_msg;
        entry.tod = tod;
        entry.tom = tom;
        entry.tusr = tusr;
        entry.state = EntryState::Unlinked;
        slot
    };
    db.entries.get_mut(parent_slot).unwrap().children.push(slot);
    db.entries.get_mut(slot).unwrap().state = EntryState::Attached;

    let hex = db.entry(slot).unwrap().entry_id_hex();
    db.eid_index.insert_unique(hex.as_bytes(), slot)?;
    chains::link_append(&mut db.entries, &mut db.fn_index, &file_name, slot, |ent, p| ent.fn_prev = p, |ent, n| ent.fn_next = n)?;
    if let Some(tag) = &tag_str {
        chains::link_append(&mut db.entries, &mut db.tag_index, tag, slot, |ent, p| ent.tag_prev = p, |ent, n| ent.tag_next = n)?;
    }
    db.link_time_bucket(slot, TimeKind::Tod)?;
    db.link_time_bucket(slot, TimeKind::Tom)?;
    db.link_time_bucket(slot, TimeKind::Tusr)?;
    db.entries.get_mut(slot).unwrap().state = EntryState::Indexed;

    id_to_slot.insert(entry_id, slot);

    if presence & PRESENCE_FILE_DATA != 0 {
        read_file_data(r, db, slot)?;
    }
    Ok(())
}

fn read_file_data<R: Read>(r: &mut R, db: &mut Database, entry_slot: u64) -> Result<()> {
    let file_size = read_u64(r, too_soon)?;
    let checksums = read_checksums(r)?;
    let extracts = read_extracts(r)?;
    for ex in &extracts {
        verify::verify_extract(ex, file_size)?;
    }
    let section_count = read_u64(r, too_soon)?;
    let norm_sect_size = read_u64(r, too_soon)?;
    let last_sect_size = read_u64(r, too_soon)?;

    let fd_slot = {
        let (fd, slot) = db.file_datas.add();
        fd.owner_entry = entry_slot;
        fd.file_size = file_size;
        fd.norm_sect_size = norm_sect_size;
        fd.last_sect_size = last_sect_size;
        fd.checksums = checksums;
        fd.extracts = extracts;
        slot
    };
    db.entries.get_mut(entry_slot).unwrap().file_data = Some(fd_slot);

    let size_str = db.file_datas.get(fd_slot).unwrap().file_size_str().into_bytes();
    chains::link_append(
        &mut db.file_datas,
        &mut db.size_index,
        &size_str,
        fd_slot,
        |f, p| f.size_prev = p,
        |f, n| f.size_next = n,
    )?;
    for kind in [ChecksumKind::Sha1, ChecksumKind::Sha256, ChecksumKind::Sha512] {
        if let Some(cs) = db.file_datas.get(fd_slot).unwrap().checksum(kind).cloned() {
            db.attach_file_hash(kind, cs.hex_str().as_bytes(), fd_slot)?;
        }
    }

    for _ in 0..section_count {
        read_section(r, db, fd_slot)?;
    }
    Ok(())
}

fn read_section<R: Read>(r: &mut R, db: &mut Database, fd_slot: u64) -> Result<()> {
    let start_pos = read_u64(r, too_soon)?;
    let end_pos = read_u64(r, too_soon)?;
    if start_pos >= end_pos {
        return Err(CatalogError::FileBroken);
    }
    let checksums = read_checksums(r)?;
    let extracts = read_extracts(r)?;
    for ex in &extracts {
        verify::verify_extract(ex, end_pos - start_pos)?;
    }

    // Mirror the Section invariant add_section enforces on creation
    // (start < end < file_size, monotonic, chunk-sized) so a crafted
    // file can't build an in-memory graph its own verify_entry would
    // reject (spec.md §6, "enforced on load and on verify").
    let (file_size, norm, last, prev_end, existing_count) = {
        let fd = db.file_datas.get(fd_slot).ok_or(CatalogError::FileBroken)?;
        let prev_end = fd.sections.last().and_then(|&s| db.sections.get(s)).map(|s| s.end_pos);
        (fd.file_size, fd.norm_sect_size, fd.last_sect_size, prev_end, fd.sections.len())
    };
    if end_pos >= file_size {
        return Err(CatalogError::FileBroken);
    }
    if let Some(end) = prev_end {
        if start_pos < end {
            return Err(CatalogError::FileBroken);
        }
    }
    if norm > 0 {
        let is_last = existing_count + 1 == expected_section_count(file_size, norm, last);
        let expected = if is_last { last } else { norm };
        if end_pos - start_pos != expected {
            return Err(CatalogError::FileBroken);
        }
    }

    let slot = {
        let (s, slot) = db.sections.add();
        s.owner_file_data = fd_slot;
        s.start_pos = start_pos;
        s.end_pos = end_pos;
        s.checksums = checksums;
        s.extracts = extracts;
        slot
    };
    db.file_datas.get_mut(fd_slot).unwrap().sections.push(slot);

    for kind in [ChecksumKind::Sha1, ChecksumKind::Sha256, ChecksumKind::Sha512] {
        if let Some(cs) = db.sections.get(slot).unwrap().checksum(kind).cloned() {
            db.attach_section_hash(kind, cs.hex_str().as_bytes(), slot)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ChecksumInput, MatchCriterion};
    use crate::{CreatedBy, EntryKind};

    fn sha256_of(data: &[u8]) -> Vec<u8> {
        use sha2::{Digest, Sha256};
        Sha256::digest(data).to_vec()
    }

    #[test]
    fn empty_round_trip() {
        let db = Database::new("d");
        let mut buf = Vec::new();
        db.save(&mut buf).unwrap();

        // fixed header: 15B preamble + 5B version + 8B branch_count + 8B entry_count
        // (entry_count = 0, no entry records) + 15B trailer.
        assert_eq!(buf.len(), 15 + 5 + 8 + 8 + 15);

        let loaded = Database::load("d", buf.as_slice()).unwrap();
        assert_eq!(loaded.entry_count(), 0);
        assert_eq!(loaded.entry(loaded.root_slot()).unwrap().entry_id, 0);
        assert_eq!(loaded.entry(loaded.root_slot()).unwrap().children.len(), 0);
    }

    #[test]
    fn single_entry_with_checksum_round_trips() {
        let mut db = Database::new("d");
        let root = db.root_slot();
        let slot = db.add_entry(root, b"a.bin", EntryKind::File, CreatedBy::User).unwrap();
        db.set_tags(slot, [b"important".as_slice()]).unwrap();
        db.set_user_msg(slot, b"hello world").unwrap();
        let digest = sha256_of(b"hello");
        db.add_file_data(
            slot,
            5,
            0,
            0,
            vec![ChecksumInput {
                kind: ChecksumKind::Sha256,
                bytes: digest.clone(),
            }],
            vec![],
            vec![],
        )
        .unwrap();
        let original_id = db.entry(slot).unwrap().entry_id;

        let mut buf = Vec::new();
        db.save(&mut buf).unwrap();
        let loaded = Database::load("d", buf.as_slice()).unwrap();

        assert_eq!(loaded.entry_count(), 1);
        let hex = format!("{original_id:016x}");
        let found_slot = loaded.lookup_exact_by_eid_hex(hex.as_bytes()).unwrap();
        let entry = loaded.entry(found_slot).unwrap();
        assert_eq!(entry.file_name, b"a.bin");
        assert_eq!(entry.user_msg.as_deref(), Some(b"hello world".as_slice()));
        assert_eq!(entry.tag_str.as_deref(), Some(b"|important|".as_slice()));

        let hex_digest = hex::encode(&digest);
        let by_sha = loaded.lookup_exact_by_file_sha(ChecksumKind::Sha256, hex_digest.as_bytes());
        assert_eq!(by_sha.len(), 1);
        assert_eq!(loaded.file_data(by_sha[0]).unwrap().owner_entry, found_slot);

        // 65 hex chars can never match a 64-char sha256 hex string.
        let too_long = format!("{hex_digest}0");
        assert!(loaded
            .lookup_exact_by_file_sha(ChecksumKind::Sha256, too_long.as_bytes())
            .is_empty());
    }

    #[test]
    fn multi_level_tree_preserves_parentage_and_branch_id() {
        let mut db = Database::new("d");
        let root = db.root_slot();
        let branch = db.add_entry(root, b"branch", EntryKind::Group, CreatedBy::User).unwrap();
        let child = db.add_entry(branch, b"child", EntryKind::Group, CreatedBy::User).unwrap();
        let grandchild = db.add_entry(child, b"gc.bin", EntryKind::File, CreatedBy::User).unwrap();
        let branch_id = db.entry(branch).unwrap().entry_id;

        let mut buf = Vec::new();
        db.save(&mut buf).unwrap();
        let loaded = Database::load("d", buf.as_slice()).unwrap();

        let gc_hex = format!("{:016x}", db.entry(grandchild).unwrap().entry_id);
        let loaded_gc = loaded.lookup_exact_by_eid_hex(gc_hex.as_bytes()).unwrap();
        let gc_entry = loaded.entry(loaded_gc).unwrap();
        assert_eq!(gc_entry.depth, 3);
        assert_eq!(gc_entry.branch_id, branch_id);

        let matches = loaded
            .find_entry_in_sub_branch(loaded.root_slot(), &[MatchCriterion::Name(b"gc.bin")], 100)
            .unwrap();
        assert_eq!(matches, vec![loaded_gc]);
    }

    #[test]
    fn duplicate_entry_id_on_load_is_rejected() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &FRAME).unwrap();
        write_bytes(&mut buf, VERSION).unwrap();
        write_u64(&mut buf, 0).unwrap();
        write_u64(&mut buf, 2).unwrap();

        // Two entries with the same entry_id = 7, both children of root.
        for _ in 0..2 {
            write_u64(&mut buf, 7).unwrap(); // branch_id
            write_u64(&mut buf, 7).unwrap(); // entry_id
            write_u64(&mut buf, 0).unwrap(); // parent_entry_id
            write_u16(&mut buf, TYPE_GROUP).unwrap();
            write_u64(&mut buf, 0).unwrap(); // child_count
            write_u8(&mut buf, 1).unwrap(); // created_by = User
            write_u16(&mut buf, 1).unwrap();
            write_bytes(&mut buf, b"a").unwrap();
            write_u64(&mut buf, 0).unwrap(); // presence bitmap: nothing set
        }
        write_bytes(&mut buf, &FRAME).unwrap();

        let err = Database::load("d", buf.as_slice());
        assert!(matches!(err, Err(CatalogError::DuplicateError)));
    }

    #[test]
    fn entry_type_other_is_rejected_on_load() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &FRAME).unwrap();
        write_bytes(&mut buf, VERSION).unwrap();
        write_u64(&mut buf, 0).unwrap();
        write_u64(&mut buf, 1).unwrap();

        write_u64(&mut buf, 1).unwrap();
        write_u64(&mut buf, 1).unwrap();
        write_u64(&mut buf, 0).unwrap();
        write_u16(&mut buf, TYPE_OTHER).unwrap();
        write_u64(&mut buf, 0).unwrap();
        write_u8(&mut buf, 1).unwrap();
        write_u16(&mut buf, 1).unwrap();
        write_bytes(&mut buf, b"a").unwrap();
        write_u64(&mut buf, 0).unwrap();
        write_bytes(&mut buf, &FRAME).unwrap();

        let err = Database::load("d", buf.as_slice());
        assert!(matches!(err, Err(CatalogError::FileNoSupport)));
    }

    #[test]
    fn bad_preamble_is_file_broken() {
        let mut buf = vec![0u8; 15];
        buf.extend_from_slice(VERSION);
        let err = Database::load("d", buf.as_slice());
        assert!(matches!(err, Err(CatalogError::FileBroken)));
    }

    #[test]
    fn truncated_header_is_file_end() {
        let buf = vec![0x01, 0x02, 0x03];
        let err = Database::load("d", buf.as_slice());
        assert!(matches!(err, Err(CatalogError::FileEnd)));
    }

    #[test]
    fn endian_fidelity_of_u64_field() {
        let mut buf = Vec::new();
        write_u64(&mut buf, 0x0102030405060708).unwrap();
        assert_eq!(buf, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(read_u64(&mut buf.as_slice(), file_end).unwrap(), 0x0102030405060708);
    }

    #[test]
    fn verify_failing_entry_is_skipped_with_its_subtree_on_save() {
        let mut db = Database::new("d");
        let root = db.root_slot();
        let bad = db.add_entry(root, b"bad", EntryKind::Group, CreatedBy::User).unwrap();
        let _child_of_bad = db.add_entry(bad, b"child", EntryKind::Group, CreatedBy::User).unwrap();
        let good = db.add_entry(root, b"good", EntryKind::Group, CreatedBy::User).unwrap();

        // Corrupt `bad`'s own depth so verify_entry fails for it (and,
        // by subtree-skip, its child too), without touching `good`.
        db.entries.get_mut(bad).unwrap().depth = 99;

        let mut buf = Vec::new();
        db.save(&mut buf).unwrap();
        let loaded = Database::load("d", buf.as_slice()).unwrap();

        assert_eq!(loaded.entry_count(), 1);
        assert!(!loaded.lookup_exact_by_name(b"good").is_empty());
        assert!(loaded.lookup_exact_by_name(b"bad").is_empty());
        assert!(loaded.lookup_exact_by_name(b"child").is_empty());
    }

    #[test]
    fn out_of_range_month_in_tod_block_is_rejected_not_panicking() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &FRAME).unwrap();
        write_bytes(&mut buf, VERSION).unwrap();
        write_u64(&mut buf, 0).unwrap();
        write_u64(&mut buf, 1).unwrap();

        write_u64(&mut buf, 1).unwrap(); // branch_id
        write_u64(&mut buf, 1).unwrap(); // entry_id
        write_u64(&mut buf, 0).unwrap(); // parent_entry_id
        write_u16(&mut buf, TYPE_GROUP).unwrap();
        write_u64(&mut buf, 0).unwrap(); // child_count
        write_u8(&mut buf, 1).unwrap(); // created_by = User
        write_u16(&mut buf, 1).unwrap();
        write_bytes(&mut buf, b"a").unwrap();
        write_u64(&mut buf, PRESENCE_TOD).unwrap();
        let bogus = crate::time::BrokenDownTime {
            sec: 0,
            min: 0,
            hour: 0,
            mday: 1,
            mon: 12, // one past the last valid index into months[12]
            year: 2024,
            wday: 0,
            yday: 0,
            isdst: 0,
        };
        write_time(&mut buf, &bogus).unwrap();
        write_bytes(&mut buf, &FRAME).unwrap();

        let err = Database::load("d", buf.as_slice());
        assert!(matches!(err, Err(CatalogError::InvalidDate)));
    }

    #[test]
    fn section_ending_at_file_size_is_rejected_on_load() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &FRAME).unwrap();
        write_bytes(&mut buf, VERSION).unwrap();
        write_u64(&mut buf, 0).unwrap();
        write_u64(&mut buf, 1).unwrap();

        write_u64(&mut buf, 1).unwrap(); // branch_id
        write_u64(&mut buf, 1).unwrap(); // entry_id
        write_u64(&mut buf, 0).unwrap(); // parent_entry_id
        write_u16(&mut buf, TYPE_FILE).unwrap();
        write_u64(&mut buf, 0).unwrap(); // child_count
        write_u8(&mut buf, 1).unwrap(); // created_by = User
        write_u16(&mut buf, 1).unwrap();
        write_bytes(&mut buf, b"a").unwrap();
        write_u64(&mut buf, PRESENCE_FILE_DATA).unwrap();

        // file_data: file_size = 10, no checksums/extracts, one section.
        write_u64(&mut buf, 10).unwrap(); // file_size
        write_checksums(&mut buf, &Default::default()).unwrap();
        write_extracts(&mut buf, &[]).unwrap();
        write_u64(&mut buf, 1).unwrap(); // section_count
        write_u64(&mut buf, 0).unwrap(); // norm_sect_size
        write_u64(&mut buf, 0).unwrap(); // last_sect_size

        // section: [0, 10) ends exactly at file_size, violating start < end < file_size.
        write_u64(&mut buf, 0).unwrap(); // start_pos
        write_u64(&mut buf, 10).unwrap(); // end_pos
        write_checksums(&mut buf, &Default::default()).unwrap();
        write_extracts(&mut buf, &[]).unwrap();

        write_bytes(&mut buf, &FRAME).unwrap();

        let err = Database::load("d", buf.as_slice());
        assert!(matches!(err, Err(CatalogError::FileBroken)));
    }
}
