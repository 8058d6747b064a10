// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Handlers and the alt flag (§4.3).
//!
//! A `Handler<T>` is a one-shot commit token: `commit()` transitions
//! active→inactive exactly once across every thread that might race
//! to fire it, and hands back the callback on success. `lock`/`unlock`
//! exist purely so that channel code can hold two handlers' locks at
//! once, in ascending `lock_id()` order, while deciding a match —
//! that's the entire deadlock-avoidance mechanism (§4.3, §9): no
//! global lock, no omission.
//!
//! `lock`/`unlock` are a spinlock rather than an OS mutex. Critical
//! sections here are a handful of loads/stores and an `Option::take`
//! — short enough that a syscall round trip would dominate the cost.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::Backoff;

use crate::loom_exports::sync::atomic::AtomicBool;
use crate::loom_exports::sync::Mutex;

/// The lock/liveness half of a handler, independent of the callback's
/// payload type. Split out so a taker's `Handler<Option<T>>` and a
/// putter's `Handler<()>` can still be compared and locked against
/// each other by lock-id without needing a shared payload type.
pub trait Lockable: Send + Sync {
    /// Still eligible to fire — hasn't committed yet.
    fn is_active(&self) -> bool;
    /// Acquire this handler's lock. Short critical sections only.
    fn lock(&self);
    /// Release a lock acquired via `lock`.
    fn unlock(&self);
    /// Monotonic id used to order multi-lock acquisition. `0` means
    /// uncontended (only ever used by plain `FnHandler`s).
    fn lock_id(&self) -> u64;
}

/// A one-shot commit token wrapping a callback of type `FnOnce(T)`.
pub trait Handler<T>: Lockable {
    /// Atomically transition active→inactive. Returns the callback to
    /// invoke on success, `None` if another racer already committed
    /// this handler (or its shared alt flag).
    fn commit(&self) -> Option<Box<dyn FnOnce(T) + Send>>;
}

/// A simple spinlock backing both `FnHandler` and `AltFlag`.
struct RawLock(AtomicBool);

impl RawLock {
    fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    fn lock(&self) {
        let backoff = Backoff::new();
        while self
            .0
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            backoff.snooze();
        }
    }

    fn unlock(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The non-alt handler: `active? -> true` always until committed,
/// `lock_id -> 0`, `commit -> Some(f)` exactly once. Used by every
/// synchronous/asynchronous operation that isn't part of an `alt`.
pub struct FnHandler<T> {
    lock: RawLock,
    committed: AtomicBool,
    f: Mutex<Option<Box<dyn FnOnce(T) + Send>>>,
}

impl<T> FnHandler<T> {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            lock: RawLock::new(),
            committed: AtomicBool::new(false),
            f: Mutex::new(Some(Box::new(f))),
        }
    }
}

impl<T> Lockable for FnHandler<T> {
    fn is_active(&self) -> bool {
        !self.committed.load(Ordering::Acquire)
    }

    fn lock(&self) {
        self.lock.lock();
    }

    fn unlock(&self) {
        self.lock.unlock();
    }

    fn lock_id(&self) -> u64 {
        0
    }
}

impl<T: Send + 'static> Handler<T> for FnHandler<T> {
    fn commit(&self) -> Option<Box<dyn FnOnce(T) + Send>> {
        if self.committed.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.f.lock().unwrap().take()
    }
}

/// A shared commit token backing every per-clause handler in a single
/// `alt` call. Committing the flag commits the entire alt — whichever
/// clause flips `active` first wins, everyone else's `commit()`
/// returns `None` (§4.3, §4.4).
pub struct AltFlag {
    id: u64,
    lock: RawLock,
    active: AtomicBool,
}

// Plain `std` atomic, not the loom-swappable alias: this only needs to
// hand out process-wide-unique ids, never participates in the
// interleavings loom explores, and loom atomics aren't const-constructible
// outside a running `loom::model()` closure anyway.
static NEXT_FLAG_ID: AtomicU64 = AtomicU64::new(1);

impl AltFlag {
    /// Allocate a flag with a fresh, unique positive lock-id (§4.3:
    /// "a unique positive value chosen at creation").
    pub fn new() -> Self {
        Self {
            id: NEXT_FLAG_ID.fetch_add(1, Ordering::Relaxed),
            lock: RawLock::new(),
            active: AtomicBool::new(true),
        }
    }

    /// Attempt the flag-level commit: `true` if this call is the one
    /// that flipped active→inactive. Exposed to `alt` so a default
    /// clause can commit the flag without going through a throwaway
    /// `AltHandler`.
    pub(crate) fn try_commit(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }
}

impl Default for AltFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockable for AltFlag {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn lock(&self) {
        self.lock.lock();
    }

    fn unlock(&self) {
        self.lock.unlock();
    }

    fn lock_id(&self) -> u64 {
        self.id
    }
}

/// A per-clause handler used inside `alt`. Delegates liveness and
/// locking to the shared `AltFlag`; its own `commit` additionally
/// records which clause won before invoking `f`.
pub struct AltHandler<T> {
    flag: crate::loom_exports::sync::Arc<AltFlag>,
    f: Mutex<Option<Box<dyn FnOnce(T) + Send>>>,
}

impl<T> AltHandler<T> {
    pub fn new<F>(flag: crate::loom_exports::sync::Arc<AltFlag>, f: F) -> Self
    where
        F: FnOnce(T) + Send + 'static,
    {
        Self {
            flag,
            f: Mutex::new(Some(Box::new(f))),
        }
    }
}

impl<T> Lockable for AltHandler<T> {
    fn is_active(&self) -> bool {
        self.flag.is_active()
    }

    fn lock(&self) {
        self.flag.lock();
    }

    fn unlock(&self) {
        self.flag.unlock();
    }

    fn lock_id(&self) -> u64 {
        self.flag.lock_id()
    }
}

impl<T: Send + 'static> Handler<T> for AltHandler<T> {
    fn commit(&self) -> Option<Box<dyn FnOnce(T) + Send>> {
        if !self.flag.try_commit() {
            return None;
        }
        self.f.lock().unwrap().take()
    }
}

/// Lock two handlers in ascending `lock_id()` order, run `body` while
/// both are held, then unlock in the reverse order. This is the
/// entire multi-lock deadlock-avoidance mechanism (§4.3, §9): since
/// `FnHandler` always reports id `0` and every `AltFlag` gets a
/// unique positive id, any two concurrent handlers have a total order
/// to acquire in.
pub fn with_both_locked<A, B, R>(a: &A, b: &B, body: impl FnOnce() -> R) -> R
where
    A: Lockable + ?Sized,
    B: Lockable + ?Sized,
{
    if a.lock_id() <= b.lock_id() {
        a.lock();
        b.lock();
        let r = body();
        b.unlock();
        a.unlock();
        r
    } else {
        b.lock();
        a.lock();
        let r = body();
        a.unlock();
        b.unlock();
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as StdOrdering};
    use std::sync::Arc;

    #[test]
    fn fn_handler_commits_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let h: FnHandler<i32> = FnHandler::new(move |v| {
            c.fetch_add(v as usize, StdOrdering::Relaxed);
        });
        assert!(h.is_active());
        let cb = h.commit().expect("first commit succeeds");
        cb(7);
        assert_eq!(calls.load(StdOrdering::Relaxed), 7);
        assert!(!h.is_active());
        assert!(h.commit().is_none(), "second commit must fail");
    }

    #[test]
    fn alt_handlers_share_single_commit() {
        let flag = Arc::new(AltFlag::new());
        let a: AltHandler<i32> = AltHandler::new(flag.clone(), |_| {});
        let b: AltHandler<i32> = AltHandler::new(flag.clone(), |_| {});
        assert!(a.is_active() && b.is_active());
        assert!(a.commit().is_some());
        assert!(!b.is_active());
        assert!(b.commit().is_none());
    }

    #[test]
    fn flag_ids_are_unique_and_positive() {
        let f1 = AltFlag::new();
        let f2 = AltFlag::new();
        assert!(f1.lock_id() > 0);
        assert!(f2.lock_id() > 0);
        assert_ne!(f1.lock_id(), f2.lock_id());
    }

    #[test]
    fn with_both_locked_orders_by_id() {
        let f1 = AltFlag::new();
        let fn_h: FnHandler<i32> = FnHandler::new(|_| {});
        // fn_h has id 0, always acquired first regardless of argument order.
        let order = with_both_locked(&f1, &fn_h, || "ran");
        assert_eq!(order, "ran");
    }
}

/// Model-checked tests for the properties `channel.rs`'s matching
/// code leans on (§8 invariants 2 and 4). Scoped to the handler/flag
/// primitives rather than through `Channel` itself, since a matched
/// pair's losing side is handed to the process-wide `Dispatch`
/// executor — real OS threads, not `loom`-instrumented — so a model
/// check that went through `Channel::take`/`put` directly would stop
/// being exhaustive at that boundary anyway.
#[cfg(all(test, parkchan_loom))]
mod loom_tests {
    use super::*;
    use crate::loom_exports::sync::Arc;
    use loom::thread;

    #[test]
    fn commit_is_single_winner_under_loom() {
        loom::model(|| {
            let flag = Arc::new(AltFlag::new());
            let a: Arc<AltHandler<i32>> = Arc::new(AltHandler::new(flag.clone(), |_| {}));
            let b: Arc<AltHandler<i32>> = Arc::new(AltHandler::new(flag.clone(), |_| {}));

            let a2 = a.clone();
            let t1 = thread::spawn(move || a2.commit().is_some());
            let b2 = b.clone();
            let t2 = thread::spawn(move || b2.commit().is_some());

            let r1 = t1.join().unwrap();
            let r2 = t2.join().unwrap();
            assert!(r1 ^ r2, "exactly one of two handlers sharing a flag may commit");
        });
    }

    #[test]
    fn paired_commit_is_all_or_nothing_under_loom() {
        loom::model(|| {
            let flag_a = Arc::new(AltFlag::new());
            let flag_b = Arc::new(AltFlag::new());
            let h_a: Arc<AltHandler<i32>> = Arc::new(AltHandler::new(flag_a, |_| {}));
            let h_b: Arc<AltHandler<i32>> = Arc::new(AltHandler::new(flag_b, |_| {}));

            // Plays the role of `channel.rs` pairing a taker with a
            // pending putter via `with_both_locked`.
            let ha1 = h_a.clone();
            let hb1 = h_b.clone();
            let pair = thread::spawn(move || {
                with_both_locked(&*ha1, &*hb1, || {
                    if ha1.is_active() && hb1.is_active() {
                        (ha1.commit().is_some(), hb1.commit().is_some())
                    } else {
                        (false, false)
                    }
                })
            });

            // Plays a competitor committing B alone — e.g. a different
            // clause of B's own alt firing on another channel. It goes
            // through the same lock, per the Multi-handler locking rule.
            let hb2 = h_b.clone();
            let solo = thread::spawn(move || {
                hb2.lock();
                let committed = if hb2.is_active() {
                    hb2.commit().is_some()
                } else {
                    false
                };
                hb2.unlock();
                committed
            });

            let (pair_a, pair_b) = pair.join().unwrap();
            let solo_b = solo.join().unwrap();

            // B is committed by exactly one of {the pair, the solo
            // attempt} — never both, never neither.
            assert_eq!(pair_b as u8 + solo_b as u8, 1);
            // The pair only ever commits both sides together, or neither.
            assert_eq!(pair_a, pair_b);
        });
    }
}
