// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The channel core (§3, §4.2): a rendezvous/buffered queue with
//! matched pending takers and putters, close semantics, and the
//! handler protocol.
//!
//! Every operation below follows §4.2's numbered algorithm. The one
//! discipline applied uniformly, even where the base spec doesn't
//! spell it out step by step: **every** handler commit — single-sided
//! (buffer-ready, closed-drain) or paired (unbuffered rendezvous) —
//! happens while that handler's lock is held. That's what makes the
//! two-handler pairing in step 3 safe: while this call holds both
//! locks, nothing elsewhere can independently commit either handler
//! out from under it (§4.3's "Multi-handler locking rule").

use std::collections::VecDeque;

use crate::buffer::Buffer;
use crate::dispatch;
use crate::error::PutOnClosed;
use crate::handler::{with_both_locked, Handler};
use crate::loom_exports::sync::{Arc, Mutex};

/// A zero-argument callback delivering a handler's result. Run either
/// immediately on the caller's stack or handed to `Dispatch`.
pub type Runnable = Box<dyn FnOnce() + Send>;

/// How many dead (already-committed-elsewhere) entries a pending queue
/// tolerates before it's swept (§4.2 "Pending-queue cleanup", §9).
const SWEEP_THRESHOLD: usize = 64;

struct PendingPutter<T> {
    value: T,
    handler: Arc<dyn Handler<()>>,
}

struct Inner<T> {
    buffer: Option<Box<dyn Buffer<T> + Send>>,
    takers: VecDeque<Arc<dyn Handler<Option<T>>>>,
    putters: VecDeque<PendingPutter<T>>,
    closed: bool,
}

/// A channel: optionally-buffered, with matched pending-taker and
/// pending-putter queues (§3). Always held behind an `Arc` — a
/// channel is shared among every holder for its whole lifetime.
pub struct Channel<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Send + 'static> Channel<T> {
    /// Create a channel. `buffer = None` is an unbuffered rendezvous
    /// channel; `Some(buf)` gives it the capacity/discipline of `buf`.
    pub fn new(buffer: Option<Box<dyn Buffer<T> + Send>>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                buffer,
                takers: VecDeque::new(),
                putters: VecDeque::new(),
                closed: false,
            }),
        })
    }

    /// `true` once `close` has been called, regardless of whether
    /// buffered values remain to be drained.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Attempt a take (§4.2 `take!`). Returns a runnable to execute
    /// (on the caller's stack, or via dispatch) if the operation could
    /// be satisfied now; `None` means `handler` was enqueued (or was
    /// already inactive, i.e. committed elsewhere by an `alt`).
    pub fn take(&self, handler: Arc<dyn Handler<Option<T>>>) -> Option<Runnable> {
        let mut g = self.inner.lock().unwrap();

        // Step 1.
        if !handler.is_active() {
            return None;
        }

        // Step 2: a buffered value is ready right now.
        if g.buffer.as_ref().is_some_and(|b| !b.is_empty()) {
            let cb = commit_locked(&*handler);
            return match cb {
                Some(cb) => {
                    let v = g.buffer.as_mut().unwrap().remove();
                    admit_one_putter(&mut g);
                    drop(g);
                    Some(Box::new(move || cb(Some(v))))
                }
                None => None,
            };
        }

        // Step 3: try to rendezvous directly with a pending putter.
        loop {
            while g.putters.front().is_some_and(|p| !p.handler.is_active()) {
                g.putters.pop_front();
            }
            let Some(putter_handler) = g.putters.front().map(|p| p.handler.clone()) else {
                break;
            };

            let (taker_cb, putter_cb) = with_both_locked(&*handler, &*putter_handler, || {
                if handler.is_active() && putter_handler.is_active() {
                    (handler.commit(), putter_handler.commit())
                } else {
                    (None, None)
                }
            });

            if let (Some(taker_cb), Some(putter_cb)) = (taker_cb, putter_cb) {
                let putter = g.putters.pop_front().expect("front checked above");
                drop(g);
                dispatch::global().spawn(Box::new(move || putter_cb(())));
                return Some(Box::new(move || taker_cb(Some(putter.value))));
            }

            if !handler.is_active() {
                // Our own handler committed elsewhere (won a different
                // alt clause) while we were trying to pair it here.
                return None;
            }
            // The putter we tried must have died; drop it and retry.
            g.putters.pop_front();
        }

        // Step 4: closed, nothing buffered or pending.
        if g.closed {
            return commit_locked(&*handler).map(|cb| -> Runnable { Box::new(move || cb(None)) });
        }

        // Step 5: park.
        g.takers.push_back(handler);
        if g.takers.len() > SWEEP_THRESHOLD {
            g.takers.retain(|h| h.is_active());
        }
        None
    }

    /// Attempt a put (§4.2 `put!`). `Err` signals a put on an
    /// already-closed channel, raised synchronously to the caller
    /// rather than via the handler's callback (§4.2, §7).
    pub fn put(
        &self,
        value: T,
        handler: Arc<dyn Handler<()>>,
    ) -> Result<Option<Runnable>, PutOnClosed<T>> {
        let mut g = self.inner.lock().unwrap();

        if !handler.is_active() {
            return Ok(None);
        }

        if g.closed {
            return Err(PutOnClosed(value));
        }

        // Step 3 (symmetric): a taker is already parked — rendezvous
        // directly, bypassing the buffer entirely.
        loop {
            while g.takers.front().is_some_and(|h| !h.is_active()) {
                g.takers.pop_front();
            }
            let Some(taker_handler) = g.takers.front().cloned() else {
                break;
            };

            let (putter_cb, taker_cb) = with_both_locked(&*handler, &*taker_handler, || {
                if handler.is_active() && taker_handler.is_active() {
                    (handler.commit(), taker_handler.commit())
                } else {
                    (None, None)
                }
            });

            if let (Some(putter_cb), Some(taker_cb)) = (putter_cb, taker_cb) {
                g.takers.pop_front();
                drop(g);
                dispatch::global().spawn(Box::new(move || taker_cb(Some(value))));
                return Ok(Some(Box::new(move || putter_cb(()))));
            }

            if !handler.is_active() {
                return Ok(None);
            }
            g.takers.pop_front();
        }

        // Step 2 (symmetric): land in the buffer, if there is one.
        if let Some(buf) = g.buffer.as_mut() {
            if !buf.is_full() || !buf.blocks_when_full() {
                let cb = commit_locked(&*handler);
                return Ok(cb.map(|cb| -> Runnable {
                    buf.add(value);
                    Box::new(move || cb(()))
                }));
            }
            // Fixed buffer, full: fall through to park below.
        }

        // Step 5: park (unbuffered with no taker, or a full fixed buffer).
        g.putters.push_back(PendingPutter { value, handler });
        if g.putters.len() > SWEEP_THRESHOLD {
            g.putters.retain(|p| p.handler.is_active());
        }
        Ok(None)
    }

    /// Close the channel (§4.2 `close!`). Idempotent. Every pending
    /// taker is committed and scheduled with the closed sentinel
    /// (`None`); every pending putter is committed too, its value
    /// discarded (§9's resolution of the put-on-closed ambiguity).
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        if g.closed {
            return;
        }
        g.closed = true;
        let takers: Vec<_> = g.takers.drain(..).collect();
        let putters: Vec<_> = g.putters.drain(..).collect();
        drop(g);

        for handler in takers {
            if let Some(cb) = commit_locked(&*handler) {
                dispatch::global().spawn(Box::new(move || cb(None)));
            }
        }
        for putter in putters {
            if let Some(cb) = commit_locked(&*putter.handler) {
                dispatch::global().spawn(Box::new(move || cb(())));
            }
        }
    }
}

/// Commit a single handler under its own lock. Used by every
/// single-sided commit path (buffer-ready take/put, closed drain) so
/// that a concurrent paired commit elsewhere (holding the same
/// handler's lock via `with_both_locked`) can never race with it.
fn commit_locked<T, H: Handler<T> + ?Sized>(handler: &H) -> Option<Box<dyn FnOnce(T) + Send>> {
    handler.lock();
    let cb = if handler.is_active() {
        handler.commit()
    } else {
        None
    };
    handler.unlock();
    cb
}

/// After a take frees a buffer slot, admit one pending putter's value
/// into the buffer if there's room (§4.2 step 2 of `take!`).
fn admit_one_putter<T: Send + 'static>(inner: &mut Inner<T>) {
    loop {
        let buf_has_room = inner.buffer.as_ref().is_some_and(|b| !b.is_full());
        if !buf_has_room {
            return;
        }
        let Some(putter_handler) = inner.putters.front().map(|p| p.handler.clone()) else {
            return;
        };
        match commit_locked(&*putter_handler) {
            Some(cb) => {
                let putter = inner.putters.pop_front().expect("front checked above");
                inner.buffer.as_mut().unwrap().add(putter.value);
                dispatch::global().spawn(Box::new(move || cb(())));
                return;
            }
            None => {
                inner.putters.pop_front();
                // Loop again: maybe the next putter is live.
            }
        }
    }
}
