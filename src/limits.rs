//! Fixed numeric limits from spec.md §6, asserted at compile time the
//! way the teacher workspace's on-disk-layout crates assert their
//! struct sizes rather than trusting a comment.

use static_assertions::const_assert;

/// Longest a `file_name` may be, not counting the NUL terminator.
pub const FILE_NAME_MAX: usize = 255;

/// Longest a single tag (before `|…|` framing and `\|` escaping) may be.
pub const TAG_LEN_MAX: usize = 64;

/// Most tags a single `tag_str` may hold.
pub const TAG_MAX_NUM: usize = 16;

/// Longest the fully framed `|tag1|tag2|…|` string may be: each tag
/// contributes its escaped length plus a leading fence, plus one
/// trailing fence for the whole string. `min_len` (spec.md §9, "tag
/// min-length capture") is tracked alongside but — as in the original —
/// only `TAG_LEN_MAX` and `TAG_MAX_NUM` are enforced.
pub const TAG_STR_MAX: usize = (TAG_LEN_MAX + 1) * TAG_MAX_NUM + 1;

/// Longest a `user_msg` may be.
pub const USER_MSG_MAX: usize = 1024;

/// Checksum slots, indexed `{SHA1 = 0, SHA256 = 1, SHA512 = 2}`.
pub const CHECKSUM_MAX_NUM: usize = 3;

/// Longest raw checksum digest (SHA-512 is the widest at 64 bytes).
pub const CHECKSUM_MAX_LEN: usize = 64;

/// Most extracts a file-data or section may carry.
pub const EXTRACT_MAX_NUM: usize = 8;

/// Longest a single extract's byte sample may be.
pub const EXTRACT_SIZE_MAX: usize = 64;

/// Upper bound on `file_size` / section offsets. The original's fixed
/// 64-bit fields impose no tighter bound than this.
pub const FILE_SIZE_MAX: u64 = u64::MAX;

/// Raw entry-id width in bytes.
pub const EID_LEN: usize = 8;

/// Longest the lowercase-hex `entry_id` string may be (16 hex chars).
pub const EID_STR_MAX: usize = 16;

/// Slots per `L1` block in every slab pool the database owns (entries,
/// file-data, sections, and every translation index's own pool).
pub const L1_SIZE: usize = 256;

/// Retry budget for entry-id generation collisions (spec.md 4.E, "copy
/// entry").
pub const GEN_ID_MAX_RETRIES: usize = 1000;

const_assert!(CHECKSUM_MAX_LEN >= 64);
const_assert!(CHECKSUM_MAX_NUM == 3);
const_assert!(EID_LEN == 8);
const_assert!(EID_STR_MAX == EID_LEN * 2);
const_assert!(L1_SIZE.is_power_of_two());
const_assert!(TAG_STR_MAX >= TAG_LEN_MAX * TAG_MAX_NUM);
