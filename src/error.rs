//! Crate-wide error types.
//!
//! API misuse is a real, structured error; contention outcomes are
//! values, never errors (see [`crate::conflict::LockConflict`]).

use thiserror::Error;

/// Result type alias for fallible [`crate::LockManager`] operations.
pub type LockResult<T> = std::result::Result<T, LockError>;

/// API-misuse errors.
///
/// These are raised immediately at the call site; they never arise from
/// ordinary contention between well-behaved callers.
#[derive(Debug, Error)]
pub enum LockError {
    /// A locker was passed to a `LockManager` other than the one that
    /// issued it.
    #[error("locker does not belong to this LockManager")]
    ForeignLocker,

    /// `Locker::set_waiting_for` was called with a result whose
    /// `conflict` field is `None`; only a blocked attempt may be parked.
    #[error("set_waiting_for requires a result carrying a conflict")]
    NotAConflict,

    /// `lock_no_wait` was called while the locker already has an
    /// outstanding wait recorded.
    #[error("locker already has a pending lock wait outstanding")]
    AlreadyWaiting,
}
