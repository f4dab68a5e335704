//! Process-scoped uninterruptible-region guard (spec.md §5,
//! "Cancellation"; §9, "Signal interruptibility").
//!
//! The original tracks a single `interruptable` flag that destructive
//! index updates toggle off/on around themselves
//! (`SetNotInterruptable`/`RevertInterruptableFlag`) so a delivered
//! signal only lands between index operations, never mid-way through
//! one. This crate has no signal handler to defer, but the shape is
//! the same critical-section contract: a nestable counter of
//! "uninterruptible" requests, non-zero while any caller up the stack
//! is mid-update. `is_interruptible()` lets a future signal-aware host
//! (the out-of-scope shell) poll it before acting on a pending signal.
//!
//! A plain `Cell` would do for the single-threaded model spec.md §5
//! describes, but the counter is process-scoped (not tied to one
//! `Database`), so an atomic avoids pinning it to thread-local storage
//! for no reason.

use std::sync::atomic::{AtomicUsize, Ordering};

static DEPTH: AtomicUsize = AtomicUsize::new(0);

/// `true` iff no caller currently holds an [`UninterruptibleGuard`].
pub fn is_interruptible() -> bool {
    DEPTH.load(Ordering::SeqCst) == 0
}

/// RAII guard marking a region as uninterruptible for as long as it's
/// held. Nestable: the underlying counter only reaches zero again once
/// every held guard (including those from reentrant calls) has
/// dropped.
#[must_use = "the uninterruptible region ends as soon as this guard is dropped"]
pub struct UninterruptibleGuard {
    _private: (),
}

impl UninterruptibleGuard {
    /// Enter an uninterruptible region. Bracket any multi-step update
    /// that must not be observed half-done (matrix grow + bitmap AND +
    /// matrix grow-back; pool insert paired with matrix insert) with
    /// this guard for its entire body.
    pub fn acquire() -> Self {
        DEPTH.fetch_add(1, Ordering::SeqCst);
        Self { _private: () }
    }
}

impl Drop for UninterruptibleGuard {
    fn drop(&mut self) {
        DEPTH.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    // One test function, not several: `DEPTH` is a single process-wide
    // static, and cargo runs `#[test]` functions in parallel by
    // default, so splitting these assertions across tests would race
    // on shared global state.
    use super::*;

    #[test]
    fn guard_nesting_and_drop_order() {
        assert!(is_interruptible());

        let outer = UninterruptibleGuard::acquire();
        assert!(!is_interruptible());

        let inner = UninterruptibleGuard::acquire();
        assert!(!is_interruptible());

        drop(inner);
        assert!(!is_interruptible(), "outer guard still held");

        drop(outer);
        assert!(is_interruptible());
    }
}
