//! Conflict envelopes returned to callers of the lock manager.

use std::fmt;

use crate::request::LockRequest;

/// The reason a lock acquisition did not succeed synchronously, or did
/// not succeed at all.
///
/// `Blocked` is the only kind a fresh attempt can produce; the wait loop
/// in `LockManager` may replace it with one of the others before
/// returning to the caller (spec.md §3–§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Grant is not possible right now; the locker has been queued.
    Blocked,
    /// The external arbiter reported a cycle involving this locker.
    /// Sticky: once observed, every later call for this locker echoes it.
    Deadlock,
    /// The wait deadline elapsed before a grant was possible.
    Timeout,
    /// An upgrade request outlived the read lock it was upgrading.
    Denied,
    /// The waiting thread was interrupted; transient unless a `Deadlock`
    /// has already been recorded for this locker.
    Interrupted,
}

/// `{type, conflictingRequest}` from spec.md §3.
///
/// `conflicting_request` is a representative owner or waiter that stood
/// in the way of the grant; it is `None` for conflict kinds that are not
/// anchored to one particular other request (`Timeout`, `Interrupted`,
/// and `Deadlock` when the arbiter did not supply one).
#[derive(Clone)]
pub struct LockConflict<K> {
    pub kind: ConflictKind,
    pub conflicting_request: Option<LockRequest<K>>,
}

impl<K> LockConflict<K> {
    pub fn blocked(conflicting_request: Option<LockRequest<K>>) -> Self {
        Self {
            kind: ConflictKind::Blocked,
            conflicting_request,
        }
    }

    pub fn deadlock(conflicting_request: Option<LockRequest<K>>) -> Self {
        Self {
            kind: ConflictKind::Deadlock,
            conflicting_request,
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: ConflictKind::Timeout,
            conflicting_request: None,
        }
    }

    pub fn denied() -> Self {
        Self {
            kind: ConflictKind::Denied,
            conflicting_request: None,
        }
    }

    pub fn interrupted() -> Self {
        Self {
            kind: ConflictKind::Interrupted,
            conflicting_request: None,
        }
    }

    pub fn is_deadlock(&self) -> bool {
        self.kind == ConflictKind::Deadlock
    }
}

impl<K: fmt::Debug> fmt::Debug for LockConflict<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockConflict")
            .field("kind", &self.kind)
            .field("conflicting_request", &self.conflicting_request)
            .finish()
    }
}
