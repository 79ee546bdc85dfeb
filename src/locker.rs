//! Per-actor lock-holder state (spec.md §3, §4.3).
//!
//! A `Locker` is the caller's transactional identity. The manager talks
//! to it only through the small set of capability hooks below — this is
//! the "dynamic subclass override" from the original design collapsed
//! into a trait, per spec.md §9: consumers provide concrete
//! implementations (an external deadlock detector injects `conflict`
//! verdicts; a two-phase-commit layer might override
//! `lock_timeout_time` to honor a transaction deadline).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::conflict::LockConflict;
use crate::discipline;
use crate::error::{LockError, LockResult};
use crate::request::{LockAttemptResult, LockRequest};

/// Opaque, unique identity for a locker. Assigned once at construction
/// and stable for the locker's lifetime; two `LockerId`s compare equal
/// iff they were issued to the same locker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockerId(u64);

impl LockerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for LockerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "locker#{}", self.0)
    }
}

/// Capability hooks `LockManager` calls through. Implement this trait to
/// plug a locker into a manager; most callers should embed a
/// [`LockerCore`] and derive the plumbing from it (see [`BasicLocker`]).
///
/// Every method here must be non-blocking and side-effect-free except
/// for the locker's own state (spec.md §6) — the manager may call these
/// while holding its own internal bookkeeping and must never be made to
/// wait on a callback it does not control.
pub trait Locker<K>: Send + Sync {
    /// Stable identity used for ownership/waiter-list membership tests.
    fn id(&self) -> LockerId;

    /// Identity of the `LockManager` this locker was created against.
    /// Used to reject cross-manager misuse (spec.md §7).
    fn manager_id(&self) -> u64;

    /// Shared mechanical state: the pending wait slot and the injected
    /// conflict slot. See [`LockerCore`].
    fn core(&self) -> &LockerCore<K>;

    /// Returns an externally-injected conflict, typically a `Deadlock`
    /// verdict written by a collaborating cycle detector. `None` means
    /// no conflict is currently known.
    fn conflict(&self) -> Option<LockConflict<K>> {
        discipline::assert_not_holding_shard("Locker::conflict");
        self.core().conflict()
    }

    /// Dismisses a previously injected conflict. A `Deadlock` verdict is
    /// sticky and must not be cleared by this hook (only by the
    /// locker's own teardown) — see [`LockerCore::clear_conflict`].
    fn clear_conflict(&self) {
        discipline::assert_not_holding_shard("Locker::clear_conflict");
        self.core().clear_conflict();
    }

    /// Absolute deadline for a wait beginning at `now` with the
    /// manager's `default_timeout`. The default implementation adds the
    /// default timeout, saturating rather than overflowing if `now` is
    /// already absurdly far in the future.
    fn lock_timeout_time(&self, now: Instant, default_timeout: Duration) -> Instant {
        discipline::assert_not_holding_shard("Locker::lock_timeout_time");
        saturating_deadline(now, default_timeout)
    }

    /// Builds the immutable [`LockRequest`] the manager will attempt to
    /// grant. `arc_self` is `self` re-wrapped as the `Arc` the manager
    /// already holds — a trait method cannot recover an `Arc<Self>` from
    /// `&self` alone, so the manager passes its own handle back in.
    ///
    /// The default implementation just assembles the tuple; overriding
    /// it lets a consumer attach its own request-construction policy
    /// (e.g. a transactional locker that logs every attempt before the
    /// manager sees it). Called with no shard-monitor held (spec.md
    /// §4.5 rule 3) — it must stay non-blocking and side-effect-free
    /// except for the locker's own state, per spec.md §6.
    fn new_lock_request(
        &self,
        arc_self: Arc<dyn Locker<K>>,
        key: K,
        for_write: bool,
        upgrade: bool,
    ) -> LockRequest<K> {
        discipline::assert_not_holding_shard("Locker::new_lock_request");
        LockRequest::new(arc_self, key, for_write, upgrade)
    }
}

/// Adds `timeout` to `now`, clamping to a far-future instant instead of
/// panicking/overflowing. `Instant` has no portable "maximum" value, so
/// we fall back to a century out rather than spec.md's literal
/// "max-int" (which has no meaning for a monotonic clock type).
pub(crate) fn saturating_deadline(now: Instant, timeout: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 3600);
    now.checked_add(timeout)
        .unwrap_or_else(|| now.checked_add(FAR_FUTURE).unwrap_or(now))
}

/// The mechanical state every `Locker` implementation needs: the
/// attempt currently blocking this locker (if any), the slot an external
/// arbiter writes deadlock verdicts into, and the condition variable the
/// manager's wait loop parks on.
///
/// `waiting_for` is touched only by `LockManager`, always under this
/// core's internal monitor (spec.md §4.3) — the setter is therefore
/// crate-private.
pub struct LockerCore<K> {
    state: Mutex<CoreState<K>>,
    condvar: Condvar,
}

struct CoreState<K> {
    waiting_for: Option<LockAttemptResult<K>>,
    conflict: Option<LockConflict<K>>,
}

impl<K> Default for LockerCore<K> {
    fn default() -> Self {
        Self {
            state: Mutex::new(CoreState {
                waiting_for: None,
                conflict: None,
            }),
            condvar: Condvar::new(),
        }
    }
}

impl<K: Clone> LockerCore<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn waiting_for(&self, locker_id: LockerId) -> Option<LockAttemptResult<K>> {
        discipline::enter_locker_monitor(locker_id.0);
        let out = self.state.lock().waiting_for.clone();
        discipline::exit_locker_monitor();
        out
    }

    /// Records (or clears) the attempt this locker is blocked on.
    /// `Some(result)` requires `result.conflict.is_some()` per spec.md
    /// §4.3 — a synchronously-granted result is never parked.
    pub(crate) fn set_waiting_for(
        &self,
        locker_id: LockerId,
        value: Option<LockAttemptResult<K>>,
    ) -> LockResult<()> {
        if let Some(ref v) = value {
            if v.conflict.is_none() {
                return Err(LockError::NotAConflict);
            }
        }
        discipline::enter_locker_monitor(locker_id.0);
        self.state.lock().waiting_for = value;
        discipline::exit_locker_monitor();
        Ok(())
    }

    pub(crate) fn is_waiting(&self, locker_id: LockerId) -> bool {
        discipline::enter_locker_monitor(locker_id.0);
        let out = self.state.lock().waiting_for.is_some();
        discipline::exit_locker_monitor();
        out
    }

    pub(crate) fn wait_until(&self, locker_id: LockerId, deadline: Instant) {
        discipline::enter_locker_monitor(locker_id.0);
        let mut guard = self.state.lock();
        let now = Instant::now();
        if deadline > now {
            self.condvar.wait_for(&mut guard, deadline - now);
        }
        drop(guard);
        discipline::exit_locker_monitor();
    }

    /// Wakes a thread parked in [`Self::wait_until`]. Called by the
    /// manager's release path *outside* any shard-monitor.
    pub(crate) fn notify(&self, locker_id: LockerId) {
        discipline::enter_locker_monitor(locker_id.0);
        self.condvar.notify_all();
        discipline::exit_locker_monitor();
    }

    /// Reads the externally-injected conflict slot.
    pub fn conflict(&self) -> Option<LockConflict<K>> {
        self.state.lock().conflict.clone()
    }

    /// Called by an external collaborator (e.g. a deadlock detector) to
    /// inject a verdict. A `Deadlock` verdict is sticky: once set it is
    /// never silently overwritten by a later, non-deadlock injection,
    /// matching spec.md §5's "a deadlock verdict is sticky and terminal".
    pub fn set_conflict(&self, conflict: LockConflict<K>) {
        let mut state = self.state.lock();
        if matches!(
            state.conflict.as_ref().map(|c| c.kind),
            Some(crate::conflict::ConflictKind::Deadlock)
        ) {
            return;
        }
        state.conflict = Some(conflict);
        drop(state);
        self.condvar.notify_all();
    }

    /// Dismisses a non-deadlock conflict. A sticky `Deadlock` verdict is
    /// left untouched, per spec.md §4.3/§5.
    pub fn clear_conflict(&self) {
        let mut state = self.state.lock();
        if !matches!(
            state.conflict.as_ref().map(|c| c.kind),
            Some(crate::conflict::ConflictKind::Deadlock)
        ) {
            state.conflict = None;
        }
    }
}

/// A locker that permits at most one outstanding wait at a time — the
/// common case for a single-statement actor (spec.md §3's `BasicLocker`).
pub struct BasicLocker<K> {
    id: LockerId,
    manager_id: u64,
    core: LockerCore<K>,
}

impl<K: Clone> BasicLocker<K> {
    /// Creates a locker bound to `manager`. The locker may only be used
    /// with that manager; using it with a different one returns
    /// [`LockError::ForeignLocker`].
    pub fn new<M: crate::manager::ManagerIdentity>(manager: &M) -> Arc<Self> {
        Arc::new(Self {
            id: LockerId::next(),
            manager_id: manager.manager_id(),
            core: LockerCore::new(),
        })
    }
}

impl<K: Clone + Send + Sync + 'static> Locker<K> for BasicLocker<K> {
    fn id(&self) -> LockerId {
        self.id
    }

    fn manager_id(&self) -> u64 {
        self.manager_id
    }

    fn core(&self) -> &LockerCore<K> {
        &self.core
    }
}

impl<K> fmt::Debug for BasicLocker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicLocker")
            .field("id", &self.id)
            .field("manager_id", &self.manager_id)
            .finish()
    }
}
