//! Per-key lock state: the owner set and FIFO waiter queue behind one
//! key in one shard (spec.md §3–§4).

use std::collections::VecDeque;

use crate::conflict::LockConflict;
use crate::locker::LockerId;
use crate::request::{LockAttemptResult, LockRequest};

/// State for a single key: who holds it and who is waiting.
///
/// Lives inside a shard's map, guarded by that shard's monitor — every
/// method here assumes the caller already holds it (spec.md §4.2's
/// "shard-monitor"). `Lock` itself holds no lock of its own.
pub(crate) struct Lock<K> {
    owners: Vec<LockRequest<K>>,
    waiters: VecDeque<LockRequest<K>>,
}

impl<K> Default for Lock<K> {
    fn default() -> Self {
        Self {
            owners: Vec::new(),
            waiters: VecDeque::new(),
        }
    }
}

impl<K: Clone> Lock<K> {
    pub(crate) fn is_empty(&self) -> bool {
        self.owners.is_empty() && self.waiters.is_empty()
    }

    pub(crate) fn owner_ids(&self) -> Vec<LockerId> {
        self.owners.iter().map(|r| r.locker_id()).collect()
    }

    pub(crate) fn waiter_ids(&self) -> Vec<LockerId> {
        self.waiters.iter().map(|r| r.locker_id()).collect()
    }

    /// True if `request` could be granted right now against `owners`
    /// alone, ignoring the waiter queue. An exclusive request is
    /// compatible with a non-empty owner set only when the requester is
    /// the lock's sole current owner, and then only if it already holds
    /// write (an idempotent re-lock) or is explicitly marked as an
    /// upgrade from its existing read lock.
    ///
    /// Note the vacuous case: an empty owner set is "compatible" with
    /// any exclusive request, including an upgrade — which is wrong for
    /// an upgrade whose backing read lock has since been released.
    /// Callers checking an *already-queued* upgrade must test
    /// ownership explicitly first; see [`Self::promote_waiters`].
    fn compatible(owners: &[LockRequest<K>], request: &LockRequest<K>) -> bool {
        if request.for_write {
            match owners.len() {
                0 => true,
                1 => {
                    owners[0].locker_id() == request.locker_id()
                        && (owners[0].for_write || request.upgrade)
                }
                _ => false,
            }
        } else {
            owners.iter().all(|o| !o.for_write)
        }
    }

    /// `Some(for_write)` if `locker_id` currently owns this lock.
    pub(crate) fn owner_mode(&self, locker_id: LockerId) -> Option<bool> {
        self.owners
            .iter()
            .find(|o| o.locker_id() == locker_id)
            .map(|o| o.for_write)
    }

    fn install_owner(&mut self, request: LockRequest<K>) {
        if request.upgrade {
            self.owners.retain(|o| o.locker_id() != request.locker_id());
        }
        self.owners.push(request);
    }

    /// Attempts to grant a brand-new request. A request may bypass the
    /// waiter queue only when that queue is empty — otherwise it joins
    /// the back, which is what keeps a steady stream of compatible
    /// readers from starving a waiting writer (spec.md's "writer
    /// starvation avoided" scenario).
    pub(crate) fn try_acquire(&mut self, request: LockRequest<K>) -> LockAttemptResult<K> {
        let can_bypass = self.waiters.is_empty() && Self::compatible(&self.owners, &request);
        if can_bypass {
            let granted = LockAttemptResult::granted(request.clone());
            self.install_owner(request);
            granted
        } else {
            let conflicting = self.owners.first().or(self.waiters.front()).cloned();
            let blocked = LockAttemptResult::blocked(request.clone(), conflicting);
            self.waiters.push_back(request);
            blocked
        }
    }

    /// Scans the waiter queue from the front, granting every request
    /// that is now compatible and stopping at the first one that is
    /// not — a blocked head keeps everything behind it queued too,
    /// which is the other half of the starvation-avoidance rule above.
    ///
    /// An upgrade waiter whose base read lock vanished out from under it
    /// (the locker released all its locks while the upgrade sat in the
    /// queue) is evicted with a `Denied` conflict rather than granted or
    /// left queued forever, and scanning continues past it.
    pub(crate) fn promote_waiters(&mut self) -> Vec<LockAttemptResult<K>> {
        let mut granted = Vec::new();
        while let Some(front) = self.waiters.front() {
            if front.upgrade && !self.owners.iter().any(|o| o.locker_id() == front.locker_id()) {
                let req = self.waiters.pop_front().expect("front just checked");
                granted.push(LockAttemptResult {
                    request: req,
                    conflict: Some(LockConflict::denied()),
                });
                continue;
            }
            if Self::compatible(&self.owners, front) {
                let req = self.waiters.pop_front().expect("front just checked");
                let result = LockAttemptResult::granted(req.clone());
                self.install_owner(req);
                granted.push(result);
            } else {
                break;
            }
        }
        granted
    }

    /// Removes every owner entry belonging to `locker_id`. Returns
    /// `true` if anything was actually held.
    pub(crate) fn release(&mut self, locker_id: LockerId) -> bool {
        let before = self.owners.len();
        self.owners.retain(|o| o.locker_id() != locker_id);
        before != self.owners.len()
    }

    /// Converts `locker_id`'s owner entry from writer to reader in
    /// place, for two-phase systems that shrink their hold on a key
    /// before fully releasing it (spec.md §4.1's `downgrade` flag on
    /// `releaseLockInternal`). A no-op returning `false` if `locker_id`
    /// does not currently hold a writer entry on this lock.
    pub(crate) fn downgrade(&mut self, locker_id: LockerId) -> bool {
        match self.owners.iter_mut().find(|o| o.locker_id() == locker_id) {
            Some(owner) if owner.for_write => {
                owner.for_write = false;
                owner.upgrade = false;
                true
            }
            _ => false,
        }
    }

    /// Removes `locker_id`'s queued request, if any — used to unwind a
    /// timed-out or externally-conflicted wait.
    pub(crate) fn remove_waiter(&mut self, locker_id: LockerId) -> Option<LockRequest<K>> {
        let idx = self.waiters.iter().position(|r| r.locker_id() == locker_id)?;
        self.waiters.remove(idx)
    }
}
