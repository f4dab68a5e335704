//! Scenario tests exercising the public [`ffcat::Database`] API end to
//! end: the eight concrete walkthroughs a catalog implementation has to
//! get right (empty round-trip, single-entry fingerprinting, substring
//! collisions, tag preprocessing, scored multi-attribute matching,
//! delete-then-reinsert slot reuse, existence-matrix deletion, and
//! endian fidelity).

use ffcat::{ChecksumInput, ChecksumKind, CreatedBy, Database, EntryKind, MatchCriterion};

fn sha256_of(data: &[u8]) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).to_vec()
}

#[test]
fn empty_database_round_trips_to_a_bare_root() {
    let db = Database::new("d");
    let mut buf = Vec::new();
    db.save(&mut buf).unwrap();

    let loaded = Database::load("d", buf.as_slice()).unwrap();
    assert_eq!(loaded.entry_count(), 0);
    let root = loaded.entry(loaded.root_slot()).unwrap();
    assert_eq!(root.entry_id, 0);
    assert_eq!(root.children.len(), 0);
}

#[test]
fn single_entry_fingerprint_is_exact_and_substring_lookupable() {
    let mut db = Database::new("d");
    let root = db.root_slot();
    let slot = db.add_entry(root, b"a.bin", EntryKind::File, CreatedBy::User).unwrap();
    let digest = sha256_of(b"hello");
    db.add_file_data(
        slot,
        10,
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

    let hex_digest = hex::encode(&digest);
    let exact = db.lookup_exact_by_file_sha(ChecksumKind::Sha256, hex_digest.as_bytes());
    assert_eq!(exact.len(), 1);
    assert_eq!(db.file_data(exact[0]).unwrap().owner_entry, slot);

    let too_long = format!("{hex_digest}0");
    assert!(db.lookup_exact_by_file_sha(ChecksumKind::Sha256, too_long.as_bytes()).is_empty());

    db.verify_entry(slot, ffcat::VerifyFlags::NONE).unwrap();
}

#[test]
fn substring_collision_respects_start_bounds() {
    let mut db = Database::new("d");
    let root = db.root_slot();
    let abc = db.add_entry(root, b"abc", EntryKind::Group, CreatedBy::User).unwrap();
    let xabcy = db.add_entry(root, b"xabcy", EntryKind::Group, CreatedBy::User).unwrap();
    db.add_entry(root, b"zzzc", EntryKind::Group, CreatedBy::User).unwrap();

    let mut found = db.partial_lookup_name(b"abc", None, None).unwrap();
    found.sort();
    let mut expected = vec![abc, xabcy];
    expected.sort();
    assert_eq!(found, expected);

    assert_eq!(db.partial_lookup_name(b"abc", Some(1), Some(1)).unwrap(), vec![xabcy]);
}

#[test]
fn tag_input_is_framed_and_escaped_before_storage() {
    let mut db = Database::new("d");
    let root = db.root_slot();
    let slot = db.add_entry(root, b"a.bin", EntryKind::File, CreatedBy::User).unwrap();
    db.set_tags(slot, [b"foo|bar".as_slice()]).unwrap();

    assert_eq!(db.entry(slot).unwrap().tag_str.as_deref(), Some(br"|foo\|bar|".as_slice()));
    assert_eq!(db.lookup_tag_exact_raw(b"foo|bar"), vec![slot]);
    assert_eq!(db.lookup_tag_exact(br"|foo\|bar|"), vec![slot]);
}

#[test]
fn scored_match_needs_a_majority_of_criteria() {
    let mut db = Database::new("d");
    let root = db.root_slot();
    let digest = sha256_of(b"hello");
    let hex_digest = hex::encode(&digest);

    // name + size + sha all match.
    let good = db.add_entry(root, b"good.bin", EntryKind::File, CreatedBy::User).unwrap();
    db.add_file_data(
        good,
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

    // name matches, size and sha don't: 1 of 3, below the 67% threshold.
    let weak = db.add_entry(root, b"good.bin", EntryKind::File, CreatedBy::User).unwrap();
    db.add_file_data(weak, 99, 0, 0, vec![], vec![], vec![]).unwrap();

    let criteria = vec![
        MatchCriterion::Name(b"good.bin"),
        MatchCriterion::FileSize(5),
        MatchCriterion::FileSha(ChecksumKind::Sha256, hex_digest.as_bytes()),
    ];
    // round(67 * 3 / 100) = 2 of 3 required.
    let accepted = db.find_entry_in_sub_branch(root, &criteria, 67).unwrap();
    assert!(accepted.contains(&good));
    assert!(!accepted.contains(&weak));
}

#[test]
fn deleting_a_run_then_reinserting_reuses_the_same_slots() {
    let mut db = Database::new("d");
    let root = db.root_slot();
    let mut slots = Vec::new();
    for i in 0..1001 {
        let name = format!("f{i}");
        slots.push(db.add_entry(root, name.as_bytes(), EntryKind::Group, CreatedBy::User).unwrap());
    }
    for &s in &slots[200..401] {
        db.delete_entry(s).unwrap();
    }
    let mut reinserted = Vec::new();
    for i in 0..201 {
        let name = format!("g{i}");
        reinserted.push(db.add_entry(root, name.as_bytes(), EntryKind::Group, CreatedBy::User).unwrap());
    }
    assert_eq!(reinserted, slots[200..401]);
}

#[test]
fn existence_matrix_drops_a_position_once_its_last_matching_value_is_gone() {
    let mut db = Database::new("d");
    let root = db.root_slot();
    // "abc" is the only name with 'a' at position 0; "zbc" shares 'b'/'c'
    // at positions 1/2 with it.
    let lone = db.add_entry(root, b"abc", EntryKind::Group, CreatedBy::User).unwrap();
    db.add_entry(root, b"zbc", EntryKind::Group, CreatedBy::User).unwrap();

    assert_eq!(db.partial_lookup_name(b"a", None, None).unwrap(), vec![lone]);

    db.delete_entry(lone).unwrap();

    assert!(db.partial_lookup_name(b"a", None, None).unwrap().is_empty());
    // 'b' at position 1 still has "zbc" behind it.
    assert!(!db.partial_lookup_name(b"b", Some(1), Some(1)).unwrap().is_empty());
}

#[test]
fn u64_fields_serialize_big_endian_regardless_of_host() {
    let mut db = Database::new("d");
    let root = db.root_slot();
    let slot = db.add_entry(root, b"a.bin", EntryKind::File, CreatedBy::User).unwrap();
    db.add_file_data(slot, 0x0102030405060708, 0, 0, vec![], vec![], vec![]).unwrap();

    let mut buf = Vec::new();
    db.save(&mut buf).unwrap();

    let needle = [0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
    assert!(buf.windows(8).any(|w| w == needle));

    let loaded = Database::load("d", buf.as_slice()).unwrap();
    let loaded_slot = loaded.lookup_exact_by_name(b"a.bin")[0];
    let fd = loaded.entry(loaded_slot).unwrap().file_data.unwrap();
    assert_eq!(loaded.file_data(fd).unwrap().file_size, 0x0102030405060708);
}
