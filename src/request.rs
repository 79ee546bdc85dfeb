//! Immutable value types describing one lock acquisition attempt.

use std::fmt;
use std::sync::Arc;

use crate::locker::{Locker, LockerId};

/// One immutable acquisition attempt: who is asking, for which key, in
/// which mode.
///
/// `upgrade == true` implies `for_write == true`; it marks a request
/// created because the locker already holds a read lock on `key` and is
/// now asking for write.
#[derive(Clone)]
pub struct LockRequest<K> {
    pub(crate) locker: Arc<dyn Locker<K>>,
    pub key: K,
    pub for_write: bool,
    pub upgrade: bool,
}

impl<K> LockRequest<K> {
    pub(crate) fn new(locker: Arc<dyn Locker<K>>, key: K, for_write: bool, upgrade: bool) -> Self {
        debug_assert!(!upgrade || for_write, "an upgrade request must be for_write");
        Self {
            locker,
            key,
            for_write,
            upgrade,
        }
    }

    /// Identity of the requesting locker.
    pub fn locker_id(&self) -> LockerId {
        self.locker.id()
    }

    /// The locker handle that made this request.
    pub fn locker(&self) -> &Arc<dyn Locker<K>> {
        &self.locker
    }
}

impl<K: fmt::Debug> fmt::Debug for LockRequest<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRequest")
            .field("locker", &self.locker.id())
            .field("key", &self.key)
            .field("for_write", &self.for_write)
            .field("upgrade", &self.upgrade)
            .finish()
    }
}

/// Outcome of a single synchronous grant attempt, produced by `Lock`.
///
/// `conflict == None` means the grant succeeded synchronously; a blocked
/// attempt carries `ConflictKind::Blocked` (see `crate::conflict`). Later
/// stages of the wait loop may replace that with `Deadlock`, `Timeout`,
/// `Denied`, or `Interrupted`.
#[derive(Clone)]
pub struct LockAttemptResult<K> {
    pub request: LockRequest<K>,
    pub conflict: Option<crate::conflict::LockConflict<K>>,
}

impl<K> LockAttemptResult<K> {
    pub(crate) fn granted(request: LockRequest<K>) -> Self {
        Self {
            request,
            conflict: None,
        }
    }

    pub(crate) fn blocked(
        request: LockRequest<K>,
        conflicting: Option<LockRequest<K>>,
    ) -> Self {
        Self {
            request,
            conflict: Some(crate::conflict::LockConflict::blocked(conflicting)),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.conflict.is_none()
    }
}

impl<K: fmt::Debug> fmt::Debug for LockAttemptResult<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockAttemptResult")
            .field("request", &self.request)
            .field("conflict", &self.conflict)
            .finish()
    }
}
