//! Shared error kinds for the catalog engine.
//!
//! One flat enum covers every layer (bitmap, slab pool, index, entity
//! graph, persistence) the way a single error kind set threads through
//! the original C implementation's `int` return codes. `VerifyFail`
//! carries its own sub-code enum rather than a bare string so callers
//! can match on the exact invariant that broke.

use thiserror::Error;

mod interrupt;
pub use interrupt::{is_interruptible, UninterruptibleGuard};

/// Sub-codes for [`CatalogError::Verify`], mirroring the original's
/// `verify_entry` failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailKind {
    StrNotTerminated,
    WrongStrLen,
    MissingHead,
    MissingTail,
    BrokenForwardLink,
    BrokenBackwardLink,
    WrongForwardStat,
    WrongBackwardStat,
}

impl std::fmt::Display for VerifyFailKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StrNotTerminated => "string not NUL-terminated",
            Self::WrongStrLen => "string length out of range",
            Self::MissingHead => "chain missing head",
            Self::MissingTail => "chain missing tail",
            Self::BrokenForwardLink => "forward link broken",
            Self::BrokenBackwardLink => "backward link broken",
            Self::WrongForwardStat => "forward chain statistics inconsistent",
            Self::WrongBackwardStat => "backward chain statistics inconsistent",
        };
        f.write_str(s)
    }
}

/// Every error kind surfaced by the catalog engine (spec §7).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("wrong arguments")]
    WrongArgs,

    #[error("allocation failed")]
    MallocFail,

    #[error("not found")]
    FindFail,

    #[error("duplicate entry")]
    DuplicateError,

    #[error("caller buffer is full")]
    BufferFull,

    #[error("verification failed: {0}")]
    VerifyFail(VerifyFailKind),

    #[error("index out of range")]
    IndexOutOfRange,

    #[error("internal invariant broken: {0}")]
    LogicError(String),

    #[error("invalid date")]
    InvalidDate,

    #[error("file is broken")]
    FileBroken,

    #[error("unexpected end of file")]
    FileEnd,

    #[error("file ended before an expected field could be read")]
    FileEndTooSoon,

    #[error("file format/version not supported")]
    FileNoSupport,

    #[error("failed to open file: {0}")]
    FopenFail(#[source] std::io::Error),

    #[error("failed to read file: {0}")]
    FreadError(#[source] std::io::Error),

    #[error("failed to write file: {0}")]
    FwriteError(#[source] std::io::Error),

    #[error("host endianness is not supported")]
    EndianNoSupport,

    #[error("no space left in caller buffer")]
    BufferNoSpace,

    #[error("could not generate a unique id within the retry budget")]
    GenIdFail,

    #[error("invalid hex string")]
    InvalidHexStr,

    #[error("no such logical directory")]
    NoSuchLogicDir,

    #[error("path too long")]
    PathTooLong,

    #[error("empty path")]
    EmptyPath,

    #[error("duplicate found")]
    FoundDuplicate,
}

/// Specialized `Result` alias used throughout the catalog crates.
pub type Result<T> = std::result::Result<T, CatalogError>;
