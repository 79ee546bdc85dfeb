//! The sharded lock manager itself.
//!
//! A fixed array of independently-mutexed shards, a key hashed to pick
//! one, `parking_lot::Mutex` guarding each shard's map, and a condvar per
//! waiting actor rather than per shard (here: per `LockerCore`, since a
//! shard-wide condvar would wake every waiter on every release).

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::conflict::{ConflictKind, LockConflict};
use crate::config::LockManagerConfig;
use crate::discipline;
use crate::error::{LockError, LockResult};
use crate::lock::Lock;
use crate::locker::{Locker, LockerId};
use crate::request::LockAttemptResult;

/// Implemented by `LockManager` and exposed to `Locker` constructors so
/// a locker can record which manager it was minted for without those
/// constructors needing the full, generic-heavy `LockManager<K>` type.
pub trait ManagerIdentity {
    fn manager_id(&self) -> u64;
}

struct Shard<K> {
    locks: Mutex<HashMap<K, Lock<K>>>,
}

impl<K> Default for Shard<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

/// Generic, key-based lock manager.
///
/// `K` is the lockable key type: any `Clone + Eq + Hash + Send + Sync`
/// works — a page id, a row id, a table name, or any other identifier
/// worth serializing access to.
///
/// Deadlock detection is not performed internally: an external arbiter
/// observes [`Self::get_owners`] / [`Self::get_waiters`] and calls
/// [`crate::LockerCore::set_conflict`] on the lockers it finds in a
/// cycle.
pub struct LockManager<K> {
    id: u64,
    shards: Vec<Shard<K>>,
    config: LockManagerConfig,
}

impl<K> ManagerIdentity for LockManager<K> {
    fn manager_id(&self) -> u64 {
        self.id
    }
}

impl<K> ManagerIdentity for Arc<LockManager<K>> {
    fn manager_id(&self) -> u64 {
        self.id
    }
}

impl<K: Clone + Eq + Hash + Send + Sync + 'static> LockManager<K> {
    pub fn new(config: LockManagerConfig) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let num_shards = config.num_shards.max(1);
        let mut shards = Vec::with_capacity(num_shards);
        shards.resize_with(num_shards, Shard::default);
        let manager = Arc::new(Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            shards,
            config,
        });
        tracing::debug!(manager_id = manager.id, num_shards, "lock manager created");
        manager
    }

    pub fn config(&self) -> &LockManagerConfig {
        &self.config
    }

    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    fn check_locker(&self, locker: &Arc<dyn Locker<K>>) -> LockResult<()> {
        if locker.manager_id() != self.id {
            return Err(LockError::ForeignLocker);
        }
        Ok(())
    }

    /// Applies a batch of outcomes produced by [`Lock::promote_waiters`]:
    /// a granted request clears the locker's `waiting_for` slot, while a
    /// `Denied` upgrade leaves the now-resolved result in place so the
    /// parked [`Self::wait_for_lock`] call observes it before waking.
    /// Either way the locker is woken. Must run *after* the
    /// shard-monitor guarding the `Lock` has been released — never call
    /// into a `Locker` while holding a shard-monitor.
    fn deliver(&self, results: Vec<LockAttemptResult<K>>) -> LockResult<()> {
        debug_assert!(!discipline::holding_shard());
        for result in results {
            let locker = result.request.locker().clone();
            let id = locker.id();
            if result.is_granted() {
                locker.core().set_waiting_for(id, None)?;
            } else {
                locker.core().set_waiting_for(id, Some(result))?;
            }
            locker.core().notify(id);
        }
        Ok(())
    }

    /// Attempts a synchronous grant, queuing `locker` on `key` if it
    /// cannot be granted immediately. Returns an error only on API
    /// misuse; contention is reported via the returned
    /// [`LockAttemptResult`].
    ///
    /// Fails with [`LockError::AlreadyWaiting`] if `locker` already has
    /// an outstanding wait recorded — a basic locker may only wait on
    /// one request at a time.
    pub fn lock_no_wait(
        &self,
        locker: &Arc<dyn Locker<K>>,
        key: K,
        for_write: bool,
    ) -> LockResult<LockAttemptResult<K>> {
        self.check_locker(locker)?;
        let id = locker.id();
        if locker.core().is_waiting(id) {
            return Err(LockError::AlreadyWaiting);
        }

        // A sticky `Deadlock` verdict dominates every later call for
        // this locker (spec.md §5/§8 "deadlock stickiness") — including
        // one that would otherwise grant synchronously. Surface it here
        // rather than attempting the grant, and without ever queuing a
        // waiter for it.
        if let Some(conflict) = locker.conflict() {
            if conflict.is_deadlock() {
                let request = locker.new_lock_request(locker.clone(), key.clone(), for_write, false);
                tracing::debug!(
                    manager_id = self.id,
                    locker_id = ?id,
                    for_write,
                    "lock_no_wait short-circuited by sticky deadlock"
                );
                return Ok(LockAttemptResult {
                    request,
                    conflict: Some(conflict),
                });
            }
        }

        let shard_idx = self.shard_index(&key);

        // Peek whether `locker` already owns `key` (to decide whether
        // this is an already-granted re-request, an upgrade, or a fresh
        // attempt) without holding the shard monitor across the
        // `new_lock_request` callback below — spec.md §4.5 rule 3
        // forbids calling into a `Locker` hook while a shard-monitor is
        // held.
        discipline::enter_shard_monitor(shard_idx);
        let existing_mode = {
            let locks = self.shards[shard_idx].locks.lock();
            locks.get(&key).and_then(|entry| entry.owner_mode(id))
        };
        discipline::exit_shard_monitor();

        // spec.md §4.1 grant rule step 1: a locker already owning `key`
        // with mode >= the requested mode is granted immediately, and
        // no new request is recorded — neither queued as a waiter nor
        // installed as a second owner entry (single-Lock invariant 3:
        // a locker appears at most once in `owners`).
        let already_sufficient = match existing_mode {
            Some(true) => true,
            Some(false) => !for_write,
            None => false,
        };
        let is_upgrade = for_write && existing_mode == Some(false) && !already_sufficient;

        let request = locker.new_lock_request(locker.clone(), key.clone(), for_write, is_upgrade);

        let result = if already_sufficient {
            LockAttemptResult::granted(request)
        } else {
            discipline::enter_shard_monitor(shard_idx);
            let mut locks = self.shards[shard_idx].locks.lock();
            let entry = locks.entry(key.clone()).or_default();
            let result = entry.try_acquire(request);
            if entry.is_empty() {
                locks.remove(&key);
            }
            drop(locks);
            discipline::exit_shard_monitor();
            result
        };

        if self.config.trace_fine_events {
            tracing::trace!(
                manager_id = self.id,
                locker_id = ?id,
                for_write,
                upgrade = is_upgrade,
                already_sufficient,
                granted = result.is_granted(),
                "lock_no_wait attempt"
            );
        }

        if !result.is_granted() {
            locker.core().set_waiting_for(id, Some(result.clone()))?;
        }
        Ok(result)
    }

    /// Blocks the calling thread until `locker`'s outstanding wait
    /// (recorded by a prior [`Self::lock_no_wait`]) resolves: granted,
    /// denied, timed out, or reported as a deadlock by an external
    /// arbiter.
    ///
    /// Returns `Ok(None)` on a grant, `Ok(Some(conflict))` otherwise.
    /// A deadlock verdict is sticky and dominant: it is checked first on
    /// every loop iteration and, once observed, is returned even if the
    /// manager's own bookkeeping would otherwise have granted the lock
    /// on the same pass.
    pub fn wait_for_lock(&self, locker: &Arc<dyn Locker<K>>) -> LockResult<Option<LockConflict<K>>> {
        self.check_locker(locker)?;
        let id = locker.id();
        let core = locker.core();

        let pending = match core.waiting_for(id) {
            Some(pending) => pending,
            None => return Ok(None),
        };
        let key = pending.request.key.clone();
        let deadline = locker.lock_timeout_time(Instant::now(), self.config.default_timeout);

        loop {
            if let Some(conflict) = locker.conflict() {
                if conflict.is_deadlock() {
                    self.abandon_wait(&key, locker, &conflict)?;
                    return Ok(Some(conflict));
                }
            }

            match core.waiting_for(id) {
                None => return Ok(None),
                Some(still_pending) => {
                    if let Some(conflict) = &still_pending.conflict {
                        if conflict.kind == ConflictKind::Denied {
                            core.set_waiting_for(id, None)?;
                            return Ok(Some(conflict.clone()));
                        }
                    }
                }
            }

            if Instant::now() >= deadline {
                let timeout = LockConflict::timeout();
                self.abandon_wait(&key, locker, &timeout)?;
                return Ok(Some(timeout));
            }

            core.wait_until(id, deadline);
        }
    }

    /// Removes `locker`'s queued waiter entry for `key` (if still
    /// present) and clears its `waiting_for` slot, attributing the
    /// abandonment to `conflict`. A no-op if the wait already resolved
    /// (e.g. the manager granted it concurrently with this call).
    fn abandon_wait(
        &self,
        key: &K,
        locker: &Arc<dyn Locker<K>>,
        conflict: &LockConflict<K>,
    ) -> LockResult<()> {
        let id = locker.id();
        let shard_idx = self.shard_index(key);
        discipline::enter_shard_monitor(shard_idx);
        let mut locks = self.shards[shard_idx].locks.lock();
        if let Some(entry) = locks.get_mut(key) {
            entry.remove_waiter(id);
            if entry.is_empty() {
                locks.remove(key);
            }
        }
        drop(locks);
        discipline::exit_shard_monitor();

        locker.core().set_waiting_for(id, None)?;
        tracing::debug!(
            manager_id = self.id,
            locker_id = ?id,
            conflict = ?conflict.kind,
            "wait abandoned"
        );
        Ok(())
    }

    /// Convenience combining [`Self::lock_no_wait`] and
    /// [`Self::wait_for_lock`]: attempts a synchronous grant and, if
    /// blocked, waits for resolution.
    pub fn lock(
        &self,
        locker: &Arc<dyn Locker<K>>,
        key: K,
        for_write: bool,
    ) -> LockResult<Option<LockConflict<K>>> {
        let start = Instant::now();
        let result = self.lock_no_wait(locker, key, for_write)?;
        let outcome = if result.is_granted() {
            Ok(None)
        } else if result.conflict.as_ref().is_some_and(|c| c.is_deadlock()) {
            // lock_no_wait already surfaced the sticky verdict without
            // queuing a waiter; there is nothing for wait_for_lock to
            // resolve, so don't call it.
            Ok(result.conflict)
        } else {
            self.wait_for_lock(locker)
        };
        tracing::debug!(
            manager_id = self.id,
            locker_id = ?locker.id(),
            for_write,
            elapsed_ms = start.elapsed().as_millis() as u64,
            outcome = ?outcome.as_ref().ok().and_then(|c| c.as_ref().map(|c| c.kind)),
            "lock"
        );
        outcome
    }

    /// Releases every lock `locker` holds on `key`, promoting any
    /// waiters that become grantable as a result. A no-op (not an
    /// error) if `locker` holds nothing on `key`.
    pub fn release_lock(&self, locker: &Arc<dyn Locker<K>>, key: K) -> LockResult<()> {
        self.release_lock_internal(locker, key, false)
    }

    /// Converts `locker`'s writer entry on `key` into a reader entry in
    /// place rather than releasing it entirely, then promotes any
    /// waiters that become grantable as a result (spec.md §4.1's
    /// `releaseLockInternal(locker, key, downgrade=true)`, used by
    /// two-phase systems that relax to a read lock before fully
    /// releasing). A no-op if `locker` does not currently hold a writer
    /// entry on `key`.
    pub fn downgrade_lock(&self, locker: &Arc<dyn Locker<K>>, key: K) -> LockResult<()> {
        self.release_lock_internal(locker, key, true)
    }

    fn release_lock_internal(
        &self,
        locker: &Arc<dyn Locker<K>>,
        key: K,
        downgrade: bool,
    ) -> LockResult<()> {
        self.check_locker(locker)?;
        let id = locker.id();
        let shard_idx = self.shard_index(&key);

        discipline::enter_shard_monitor(shard_idx);
        let mut locks = self.shards[shard_idx].locks.lock();
        let promoted = if let Some(entry) = locks.get_mut(&key) {
            if downgrade {
                entry.downgrade(id);
            } else {
                entry.release(id);
            }
            let promoted = entry.promote_waiters();
            if entry.is_empty() {
                locks.remove(&key);
            }
            promoted
        } else {
            Vec::new()
        };
        drop(locks);
        discipline::exit_shard_monitor();

        if self.config.trace_fine_events {
            tracing::trace!(
                manager_id = self.id,
                locker_id = ?id,
                downgrade,
                promoted = promoted.len(),
                "release_lock"
            );
        }
        self.deliver(promoted)
    }

    /// Snapshot of lockers currently holding `key` (readers or the sole
    /// writer). Intended for an external deadlock detector building a
    /// wait-for graph; not transactionally consistent with concurrent
    /// mutation of other keys.
    pub fn get_owners(&self, key: &K) -> Vec<LockerId> {
        let shard_idx = self.shard_index(key);
        discipline::enter_shard_monitor(shard_idx);
        let locks = self.shards[shard_idx].locks.lock();
        let out = locks.get(key).map(Lock::owner_ids).unwrap_or_default();
        drop(locks);
        discipline::exit_shard_monitor();
        out
    }

    /// Snapshot of lockers currently queued for `key`, in wait order.
    pub fn get_waiters(&self, key: &K) -> Vec<LockerId> {
        let shard_idx = self.shard_index(key);
        discipline::enter_shard_monitor(shard_idx);
        let locks = self.shards[shard_idx].locks.lock();
        let out = locks.get(key).map(Lock::waiter_ids).unwrap_or_default();
        drop(locks);
        discipline::exit_shard_monitor();
        out
    }
}
