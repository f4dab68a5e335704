//! Stand-alone validation helpers used by [`crate::database::Database::verify_entry`]
//! (spec.md §4.E, "Verification"). Kept separate from `database.rs` so
//! the pure, graph-independent checks (string shape, tag framing,
//! checksum/extract bounds) can be unit-tested without a `Database` in
//! scope.

use ffcat_error::{CatalogError, Result, VerifyFailKind};

use crate::file_data::{Checksum, Extract};
use crate::limits::{FILE_NAME_MAX, TAG_LEN_MAX, TAG_MAX_NUM, USER_MSG_MAX};

/// Flags controlling how strict [`Database::verify_entry`] is. Mirrors
/// the original's `flags` parameter (SPEC_FULL.md §2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyFlags {
    /// Permit a `None` child pointer mid-traversal — legal while a
    /// load is still reconstructing parent/child links (spec.md 4.E,
    /// "State machine (entry)").
    pub allow_null_child_ptr: bool,
}

impl VerifyFlags {
    pub const NONE: Self = Self {
        allow_null_child_ptr: false,
    };

    pub const ALLOW_NULL_CHILD_PTR: Self = Self {
        allow_null_child_ptr: true,
    };
}

/// `file_name` is 1..=255 bytes, with no embedded NUL (the NUL is the
/// wire/C-string terminator, not part of the stored bytes).
pub fn verify_file_name(name: &[u8]) -> Result<()> {
    if name.is_empty() || name.len() > FILE_NAME_MAX {
        return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
    }
    if name.contains(&0) {
        return Err(CatalogError::VerifyFail(VerifyFailKind::StrNotTerminated));
    }
    Ok(())
}

pub fn verify_user_msg(msg: &[u8]) -> Result<()> {
    if msg.len() > USER_MSG_MAX {
        return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
    }
    Ok(())
}

/// `tag_str` must be framed as `|tag1|tag2|…|`, each tag's internal
/// `|` escaped as `\|`, at least 3 chars overall (`||` plus one tag
/// byte is the shortest legal shape: `|x|`), and no more than
/// `TAG_MAX_NUM` tags.
pub fn verify_tag_str(tag_str: &[u8]) -> Result<()> {
    if tag_str.len() < 3 || tag_str.first() != Some(&b'|') || tag_str.last() != Some(&b'|') {
        return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
    }
    let tags = split_tag_str(tag_str)?;
    if tags.is_empty() || tags.len() > TAG_MAX_NUM {
        return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
    }
    for t in &tags {
        if t.is_empty() || t.len() > TAG_LEN_MAX {
            return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
        }
    }
    Ok(())
}

/// Split a framed `|tag1|tag2|…|` string into its unescaped tags,
/// honouring `\|` as a literal pipe within a tag.
pub fn split_tag_str(tag_str: &[u8]) -> Result<Vec<Vec<u8>>> {
    if tag_str.first() != Some(&b'|') || tag_str.last() != Some(&b'|') {
        return Err(CatalogError::WrongArgs);
    }
    let inner = &tag_str[1..tag_str.len() - 1];
    let mut tags = Vec::new();
    let mut current = Vec::new();
    let mut i = 0;
    while i < inner.len() {
        match inner[i] {
            b'\\' if i + 1 < inner.len() && inner[i + 1] == b'|' => {
                current.push(b'|');
                i += 2;
            }
            b'|' => {
                tags.push(std::mem::take(&mut current));
                i += 1;
            }
            c => {
                current.push(c);
                i += 1;
            }
        }
    }
    tags.push(current);
    Ok(tags)
}

/// Canonicalize one raw user-supplied tag into its framed, escaped
/// form (spec.md 4.D, "Tag values carry a pre-processing convention").
pub fn canonicalize_tag(raw: &[u8]) -> Vec<u8> {
    canonicalize_tags(std::iter::once(raw))
}

/// Canonicalize a set of raw user-supplied tags into one framed
/// `|tag1|tag2|…|` string.
pub fn canonicalize_tags<'a>(raw: impl IntoIterator<Item = &'a [u8]>) -> Vec<u8> {
    let mut out = vec![b'|'];
    for tag in raw {
        for &b in tag {
            if b == b'|' {
                out.push(b'\\');
            }
            out.push(b);
        }
        out.push(b'|');
    }
    out
}

/// A checksum's raw length must match its kind's fixed digest width.
pub fn verify_checksum(cs: &Checksum) -> Result<()> {
    if cs.bytes.len() != cs.kind.expected_len() {
        return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
    }
    Ok(())
}

/// An extract must lie strictly within `[0, container_len)`.
pub fn verify_extract(extract: &Extract, container_len: u64) -> Result<()> {
    use crate::limits::EXTRACT_SIZE_MAX;
    if extract.bytes.len() > EXTRACT_SIZE_MAX {
        return Err(CatalogError::VerifyFail(VerifyFailKind::WrongStrLen));
    }
    let end = extract
        .position
        .checked_add(extract.bytes.len() as u64)
        .ok_or(CatalogError::WrongArgs)?;
    if extract.position >= container_len || end > container_len {
        return Err(CatalogError::WrongArgs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_escapes_pipe_and_frames() {
        let out = canonicalize_tag(b"foo|bar");
        assert_eq!(out, br"|foo\|bar|".to_vec());
    }

    #[test]
    fn canonicalize_multiple_tags() {
        let out = canonicalize_tags([b"a".as_slice(), b"b".as_slice()]);
        assert_eq!(out, b"|a|b|".to_vec());
    }

    #[test]
    fn split_tag_str_round_trips_escaped_pipe() {
        let framed = canonicalize_tag(b"foo|bar");
        let tags = split_tag_str(&framed).unwrap();
        assert_eq!(tags, vec![b"foo|bar".to_vec()]);
    }

    #[test]
    fn verify_tag_str_rejects_unframed() {
        assert!(verify_tag_str(b"foo").is_err());
    }

    #[test]
    fn verify_file_name_rejects_empty_and_overlong() {
        assert!(verify_file_name(b"").is_err());
        assert!(verify_file_name(&vec![b'a'; 256]).is_err());
        assert!(verify_file_name(b"ok.bin").is_ok());
    }

    #[test]
    fn verify_extract_rejects_out_of_bounds() {
        let e = Extract {
            position: 10,
            bytes: vec![1, 2, 3],
        };
        assert!(verify_extract(&e, 12).is_err());
        assert!(verify_extract(&e, 13).is_ok());
    }
}
