// Generic key-based lock manager
//
// Sharded, generic `LockManager<K>`: shared/exclusive lock modes, in-place
// upgrade from shared to exclusive, bounded waits with timeout, and
// deadlock resolution delegated to an externally injected arbiter.
//
// # Module Organization
//
// | Module | Responsibility |
// |--------|----------------|
// | [`error`] | API-misuse error type (`LockError`) |
// | [`conflict`] | Conflict envelopes (`LockConflict`, `ConflictKind`) |
// | [`request`] | Immutable request/outcome value types |
// | [`locker`] | The `Locker` trait, `LockerCore`, `BasicLocker` |
// | [`lock`] | Per-key owner set and waiter queue |
// | [`config`] | `LockManagerConfig` |
// | [`manager`] | `LockManager`, the sharded orchestrator |
// | [`discipline`] | Debug-only synchronization-discipline assertions |
//
// # Quick Start
//
// ```rust,ignore
// use lock_manager::{BasicLocker, LockManager, LockManagerConfig};
//
// let manager = LockManager::new(LockManagerConfig::default());
// let locker = BasicLocker::new(&manager);
//
// manager.lock(&locker, "table.row1".to_string(), true)?;
// // ... critical section ...
// manager.release_lock(&locker, "table.row1".to_string())?;
// ```
//
// # Architecture
//
// ```text
// ┌───────────────────────────────────────────────────────────────┐
// │                         LockManager<K>                        │
// │  ┌───────────┐   ┌───────────┐         ┌───────────┐          │
// │  │  Shard 0  │   │  Shard 1  │   ...   │ Shard N-1 │          │
// │  │ HashMap<  │   │ HashMap<  │         │ HashMap<  │          │
// │  │  K, Lock> │   │  K, Lock> │         │  K, Lock> │          │
// │  └───────────┘   └───────────┘         └───────────┘          │
// │        key is hashed to pick exactly one shard                │
// └───────────────────────────────────────────────────────────────┘
//               │ grants / blocks / denies
//               ▼
// ┌───────────────────────────────────────────────────────────────┐
// │                        Locker / LockerCore                    │
// │   waiting_for: Option<LockAttemptResult>   (manager-only)      │
// │   conflict:    Option<LockConflict>        (arbiter-writable)  │
// └───────────────────────────────────────────────────────────────┘
//               ▲
//               │ writes Deadlock verdicts after building a
//               │ wait-for graph from get_owners()/get_waiters()
// ┌───────────────────────────────────────────────────────────────┐
// │                  external deadlock arbiter                    │
// │              (not part of this crate — spec Non-goal)         │
// └───────────────────────────────────────────────────────────────┘
// ```
//
// Internal synchronization never nests a shard-monitor inside another
// shard-monitor or calls back into a `Locker` while holding one; see
// [`discipline`] for the debug-only assertions that enforce this.

pub mod conflict;
pub mod config;
mod discipline;
pub mod error;
pub mod lock;
pub mod locker;
pub mod manager;
pub mod request;

pub use config::LockManagerConfig;
pub use conflict::{ConflictKind, LockConflict};
pub use error::{LockError, LockResult};
pub use locker::{BasicLocker, Locker, LockerCore, LockerId};
pub use manager::{LockManager, ManagerIdentity};
pub use request::{LockAttemptResult, LockRequest};
