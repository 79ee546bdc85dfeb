//! End-to-end scenarios for `LockManager`, exercised through its public
//! API only (no internal module access).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lock_manager::{BasicLocker, ConflictKind, LockConflict, LockManager, LockManagerConfig, Locker};

type L = Arc<dyn Locker<String>>;

fn manager(timeout_ms: u64) -> Arc<LockManager<String>> {
    let _ = tracing_subscriber::fmt::try_init();
    LockManager::new(
        LockManagerConfig::default().with_default_timeout(Duration::from_millis(timeout_ms)),
    )
}

#[test]
fn reader_coexistence() {
    let mgr = manager(1000);
    let a: L = BasicLocker::new(&mgr);
    let b: L = BasicLocker::new(&mgr);
    let c: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&a, "row1".into(), false).unwrap().is_none());
    assert!(mgr.lock(&b, "row1".into(), false).unwrap().is_none());
    assert!(mgr.lock(&c, "row1".into(), false).unwrap().is_none());

    assert_eq!(mgr.get_owners(&"row1".to_string()).len(), 3);
}

#[test]
fn writer_blocks_reader() {
    let mgr = manager(1000);
    let writer: L = BasicLocker::new(&mgr);
    let reader: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&writer, "row1".into(), true).unwrap().is_none());

    let granted = Arc::new(AtomicBool::new(false));
    let granted2 = granted.clone();
    let mgr2 = mgr.clone();
    let reader2 = reader.clone();
    let handle = thread::spawn(move || {
        let outcome = mgr2.lock(&reader2, "row1".into(), false).unwrap();
        granted2.store(outcome.is_none(), Ordering::SeqCst);
    });

    thread::sleep(Duration::from_millis(80));
    assert!(!granted.load(Ordering::SeqCst), "reader must not proceed while writer holds the lock");

    mgr.release_lock(&writer, "row1".into()).unwrap();
    handle.join().unwrap();
    assert!(granted.load(Ordering::SeqCst));
}

#[test]
fn writer_starvation_avoided() {
    let mgr = manager(2000);
    let reader1: L = BasicLocker::new(&mgr);
    let writer: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&reader1, "row1".into(), false).unwrap().is_none());

    // writer queues behind reader1
    let writer_done = Arc::new(AtomicBool::new(false));
    let writer_done2 = writer_done.clone();
    let mgr2 = mgr.clone();
    let writer2 = writer.clone();
    let writer_handle = thread::spawn(move || {
        mgr2.lock(&writer2, "row1".into(), true).unwrap();
        writer_done2.store(true, Ordering::SeqCst);
    });
    thread::sleep(Duration::from_millis(50));
    assert_eq!(mgr.get_waiters(&"row1".to_string()).len(), 1);

    // a stream of fresh readers arriving after the writer queued must not
    // repeatedly grant themselves ahead of it
    for _ in 0..5 {
        let late_reader: L = BasicLocker::new(&mgr);
        let result = mgr.lock_no_wait(&late_reader, "row1".into(), false).unwrap();
        assert!(!result.is_granted(), "late reader must queue behind the waiting writer");
    }

    mgr.release_lock(&reader1, "row1".into()).unwrap();
    writer_handle.join().unwrap();
    assert!(writer_done.load(Ordering::SeqCst));
}

#[test]
fn timeout_on_unavailable_lock() {
    let mgr = manager(100);
    let writer: L = BasicLocker::new(&mgr);
    let blocked: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&writer, "row1".into(), true).unwrap().is_none());
    let outcome = mgr.lock(&blocked, "row1".into(), true).unwrap();
    assert_eq!(outcome.unwrap().kind, ConflictKind::Timeout);
}

#[test]
fn deadlock_injection_resolves_a_blocked_wait() {
    let mgr = manager(5000);
    let holder: L = BasicLocker::new(&mgr);
    let victim: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&holder, "row1".into(), true).unwrap().is_none());

    let result = mgr.lock_no_wait(&victim, "row1".into(), true).unwrap();
    assert!(!result.is_granted());

    let mgr2 = mgr.clone();
    let victim2 = victim.clone();
    let handle = thread::spawn(move || mgr2.wait_for_lock(&victim2));

    // stand-in for an external cycle-detecting arbiter: it observed
    // get_owners/get_waiters, found a cycle, and writes the verdict.
    thread::sleep(Duration::from_millis(30));
    victim.core().set_conflict(LockConflict::deadlock(None));

    let outcome = handle.join().unwrap().unwrap().unwrap();
    assert_eq!(outcome.kind, ConflictKind::Deadlock);
}

#[test]
fn deadlock_verdict_also_dominates_an_unrelated_uncontended_lock() {
    // spec.md scenario 5's second half: once L1's Deadlock verdict is
    // recorded, "subsequent L1.lock('B', R) also returns DEADLOCK
    // without blocking" -- even though "B" has no other owner and would
    // otherwise grant synchronously.
    let mgr = manager(1000);
    let holder: L = BasicLocker::new(&mgr);
    let victim: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&holder, "row1".into(), true).unwrap().is_none());
    let result = mgr.lock_no_wait(&victim, "row1".into(), true).unwrap();
    assert!(!result.is_granted());
    victim.core().set_conflict(LockConflict::deadlock(None));
    assert_eq!(
        mgr.wait_for_lock(&victim).unwrap().unwrap().kind,
        ConflictKind::Deadlock
    );

    let outcome = mgr.lock(&victim, "row2".into(), false).unwrap();
    assert_eq!(outcome.unwrap().kind, ConflictKind::Deadlock);
    assert!(mgr.get_owners(&"row2".to_string()).is_empty());
}

#[test]
fn shared_to_exclusive_upgrade_succeeds() {
    let mgr = manager(1000);
    let locker: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&locker, "row1".into(), false).unwrap().is_none());
    assert!(mgr.lock(&locker, "row1".into(), true).unwrap().is_none());

    assert_eq!(mgr.get_owners(&"row1".to_string()), vec![locker.id()]);
}

#[test]
fn dueling_upgrades_latent_deadlock() {
    // Two readers each holding the same key both ask to upgrade. Neither
    // can succeed without the other releasing first, so both simply
    // queue -- this is a latent deadlock the library does not resolve on
    // its own (spec's Non-goal): an external arbiter must see both in
    // get_waiters() and inject a Deadlock verdict into one of them.
    let mgr = manager(300);
    let a: L = BasicLocker::new(&mgr);
    let b: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&a, "row1".into(), false).unwrap().is_none());
    assert!(mgr.lock(&b, "row1".into(), false).unwrap().is_none());

    let a_upgrade = mgr.lock_no_wait(&a, "row1".into(), true).unwrap();
    let b_upgrade = mgr.lock_no_wait(&b, "row1".into(), true).unwrap();
    assert!(!a_upgrade.is_granted());
    assert!(!b_upgrade.is_granted());

    let waiters = mgr.get_waiters(&"row1".to_string());
    assert_eq!(waiters.len(), 2);

    // without an arbiter stepping in, both eventually time out rather
    // than deadlocking the test process forever.
    assert_eq!(
        mgr.wait_for_lock(&a).unwrap().unwrap().kind,
        ConflictKind::Timeout
    );
    assert_eq!(
        mgr.wait_for_lock(&b).unwrap().unwrap().kind,
        ConflictKind::Timeout
    );
}

#[test]
fn downgrade_relaxes_writer_to_reader_and_admits_waiting_reader() {
    let mgr = manager(1000);
    let writer: L = BasicLocker::new(&mgr);
    let reader: L = BasicLocker::new(&mgr);

    assert!(mgr.lock(&writer, "row1".into(), true).unwrap().is_none());

    let granted = Arc::new(AtomicBool::new(false));
    let granted2 = granted.clone();
    let mgr2 = mgr.clone();
    let reader2 = reader.clone();
    let handle = thread::spawn(move || {
        let outcome = mgr2.lock(&reader2, "row1".into(), false).unwrap();
        granted2.store(outcome.is_none(), Ordering::SeqCst);
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!granted.load(Ordering::SeqCst));

    mgr.downgrade_lock(&writer, "row1".into()).unwrap();
    handle.join().unwrap();
    assert!(granted.load(Ordering::SeqCst));

    let owners = mgr.get_owners(&"row1".to_string());
    assert_eq!(owners.len(), 2);
    assert!(owners.contains(&writer.id()));
    assert!(owners.contains(&reader.id()));
}

#[test]
fn release_is_idempotent_when_nothing_is_held() {
    let mgr = manager(500);
    let locker: L = BasicLocker::new(&mgr);
    assert!(mgr.release_lock(&locker, "row1".into()).is_ok());
}

#[test]
fn foreign_locker_is_rejected() {
    let mgr_a = manager(500);
    let mgr_b = manager(500);
    let locker: L = BasicLocker::new(&mgr_a);
    let err = mgr_b.lock_no_wait(&locker, "row1".into(), false).unwrap_err();
    assert!(matches!(err, lock_manager::LockError::ForeignLocker));
}

#[test]
fn locker_cannot_have_two_outstanding_waits() {
    let mgr = manager(500);
    let writer: L = BasicLocker::new(&mgr);
    let victim: L = BasicLocker::new(&mgr);
    assert!(mgr.lock(&writer, "row1".into(), true).unwrap().is_none());

    let first = mgr.lock_no_wait(&victim, "row1".into(), true).unwrap();
    assert!(!first.is_granted());

    let err = mgr.lock_no_wait(&victim, "row2".into(), true).unwrap_err();
    assert!(matches!(err, lock_manager::LockError::AlreadyWaiting));
}

#[test]
fn independent_keys_do_not_contend() {
    let mgr = manager(500);
    let a: L = BasicLocker::new(&mgr);
    let b: L = BasicLocker::new(&mgr);
    assert!(mgr.lock(&a, "row1".into(), true).unwrap().is_none());
    assert!(mgr.lock(&b, "row2".into(), true).unwrap().is_none());
}
