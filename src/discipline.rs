//! Debug-only enforcement of the synchronization-discipline invariants
//! from spec.md §4.5:
//!
//! 1. A thread holds at most one locker-monitor and at most one
//!    shard-monitor at any instant.
//! 2. When both are held, the locker-monitor was acquired first.
//! 3. Code executing while holding a shard-monitor may not call into a
//!    `Locker`, a different `Lock`, or any external callback.
//!
//! This bookkeeping is a per-thread debug assertion, not a real lock: it
//! exists to make an ordering bug abort loudly in tests and debug builds
//! rather than deadlock silently. It compiles to nothing in release
//! builds, the same `cfg(debug_assertions)` convention the rest of this
//! crate's invariant checks follow.

#[cfg(debug_assertions)]
mod imp {
    use std::cell::Cell;

    thread_local! {
        static HOLDING_LOCKER: Cell<Option<u64>> = Cell::new(None);
        static HOLDING_SHARD: Cell<Option<usize>> = Cell::new(None);
    }

    pub(crate) fn enter_locker_monitor(id: u64) {
        HOLDING_LOCKER.with(|cell| {
            assert!(
                cell.get().is_none(),
                "discipline violation: thread re-entered a locker-monitor (held {:?}, wanted {id})",
                cell.get()
            );
            assert!(
                HOLDING_SHARD.with(Cell::get).is_none(),
                "discipline violation: acquired a locker-monitor while already holding a shard-monitor"
            );
            cell.set(Some(id));
        });
    }

    pub(crate) fn exit_locker_monitor() {
        HOLDING_LOCKER.with(|cell| cell.set(None));
    }

    pub(crate) fn enter_shard_monitor(idx: usize) {
        HOLDING_SHARD.with(|cell| {
            assert!(
                cell.get().is_none(),
                "discipline violation: thread re-entered a shard-monitor (held {:?}, wanted {idx})",
                cell.get()
            );
            cell.set(Some(idx));
        });
    }

    pub(crate) fn exit_shard_monitor() {
        HOLDING_SHARD.with(|cell| cell.set(None));
    }

    pub(crate) fn holding_shard() -> bool {
        HOLDING_SHARD.with(|cell| cell.get().is_some())
    }
}

#[cfg(not(debug_assertions))]
mod imp {
    #[inline(always)]
    pub(crate) fn enter_locker_monitor(_id: u64) {}
    #[inline(always)]
    pub(crate) fn exit_locker_monitor() {}
    #[inline(always)]
    pub(crate) fn enter_shard_monitor(_idx: usize) {}
    #[inline(always)]
    pub(crate) fn exit_shard_monitor() {}
    #[inline(always)]
    pub(crate) fn holding_shard() -> bool {
        false
    }
}

pub(crate) use imp::*;

/// Asserts rule 3: must not be called while a shard-monitor is held by
/// this thread. Placed at every call site that invokes a `Locker` hook.
pub(crate) fn assert_not_holding_shard(site: &str) {
    debug_assert!(
        !holding_shard(),
        "discipline violation: called into a Locker hook ({site}) while holding a shard-monitor"
    );
}
