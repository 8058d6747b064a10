// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The alt algorithm (§4.4): atomic one-shot commit across a randomly
//! ordered list of take/put clauses, with an optional default.
//!
//! All clauses in one call share a single message type `T`. That
//! matches `TaskBody::Msg` (§4.6 of SPEC_FULL.md) being one associated
//! type per task — a task's state machine parks on exactly one
//! message type at a time, so its `alt` clauses are homogeneous too.

use std::sync::Mutex;

use crate::channel::{Channel, Runnable};
use crate::handler::{AltFlag, AltHandler, Handler};
use crate::loom_exports::sync::Arc;

/// One arm of an `alt` call.
pub enum ClauseOp<T> {
    Take(Arc<Channel<T>>),
    Put(Arc<Channel<T>>, T),
}

pub struct AltClause<T> {
    pub label: Arc<str>,
    pub op: ClauseOp<T>,
}

impl<T> AltClause<T> {
    pub fn take(label: impl Into<Arc<str>>, channel: Arc<Channel<T>>) -> Self {
        Self {
            label: label.into(),
            op: ClauseOp::Take(channel),
        }
    }

    pub fn put(label: impl Into<Arc<str>>, channel: Arc<Channel<T>>, value: T) -> Self {
        Self {
            label: label.into(),
            op: ClauseOp::Put(channel, value),
        }
    }
}

/// The `[label, value]` pair an alt call produces (§4.4 step 5, §6).
/// `value` is `None` both for a closed take (the `nil` sentinel) and
/// for a completed put (put never produces a value) — both shapes
/// collapse to "nothing travelled back".
pub type AltResult<T> = (Arc<str>, Option<T>);

/// Run the alt algorithm. Returns `Some(runnable)` if a clause or the
/// default committed synchronously — running it invokes `deliver`.
/// `None` means every clause parked; `deliver` fires later, on
/// whichever thread completes a matching operation.
pub fn alt_core<T, F>(clauses: Vec<AltClause<T>>, default: Option<T>, deliver: F) -> Option<Runnable>
where
    T: Send + 'static,
    F: FnOnce(AltResult<T>) + Send + 'static,
{
    let flag = Arc::new(AltFlag::new());
    let deliver = Arc::new(Mutex::new(Some(deliver)));

    let mut order: Vec<usize> = (0..clauses.len()).collect();
    fastrand::shuffle(&mut order);

    let mut slots: Vec<Option<AltClause<T>>> = clauses.into_iter().map(Some).collect();

    for idx in order {
        let clause = slots[idx].take().expect("each index visited once");
        let label = clause.label;

        match clause.op {
            ClauseOp::Take(channel) => {
                let deliver = deliver.clone();
                let handler: Arc<dyn Handler<Option<T>>> = Arc::new(AltHandler::new(
                    flag.clone(),
                    move |v: Option<T>| {
                        if let Some(f) = deliver.lock().unwrap().take() {
                            f((label, v));
                        }
                    },
                ));
                if let Some(runnable) = channel.take(handler) {
                    return Some(runnable);
                }
            }
            ClauseOp::Put(channel, value) => {
                let deliver = deliver.clone();
                let handler: Arc<dyn Handler<()>> = Arc::new(AltHandler::new(
                    flag.clone(),
                    move |_: ()| {
                        if let Some(f) = deliver.lock().unwrap().take() {
                            f((label, None));
                        }
                    },
                ));
                match channel.put(value, handler) {
                    Ok(Some(runnable)) => return Some(runnable),
                    Ok(None) => {}
                    Err(_closed) => {
                        // A put-clause against an already-closed channel
                        // can't be the one that wins this alt — it's as
                        // if the clause were never ready, matching §4.2's
                        // synchronous put-on-closed contract for a plain
                        // put. Move on to the next clause.
                    }
                }
            }
        }
    }

    // Step 4: nothing fired synchronously; try the default.
    if let Some(value) = default {
        flag.lock();
        let fired = flag.is_active() && flag.try_commit();
        flag.unlock();
        if fired {
            if let Some(f) = deliver.lock().unwrap().take() {
                let label: Arc<str> = Arc::from("default");
                return Some(Box::new(move || f((label, Some(value)))));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FixedBuffer;
    use std::sync::mpsc;

    #[test]
    fn default_fires_when_nothing_ready() {
        let c: Arc<Channel<i32>> = Channel::new(None);
        let clauses = vec![AltClause::take("x", c)];
        let (tx, rx) = mpsc::channel();
        let r = alt_core(clauses, Some(7), move |res| {
            tx.send(res).unwrap();
        });
        assert!(r.is_some());
        r.unwrap()();
        let (label, value) = rx.recv().unwrap();
        assert_eq!(&*label, "default");
        assert_eq!(value, Some(7));
    }

    #[test]
    fn take_clause_wins_when_buffer_ready() {
        let c: Arc<Channel<i32>> = Channel::new(Some(Box::new(FixedBuffer::new(1))));
        let (ptx, prx) = mpsc::channel::<()>();
        let r = c
            .put(5, Arc::new(crate::handler::FnHandler::new(move |_| {
                let _ = ptx.send(());
            })))
            .unwrap();
        r.unwrap()();
        prx.recv().unwrap();

        let clauses = vec![AltClause::take("a", c)];
        let (tx, rx) = mpsc::channel();
        let r = alt_core(clauses, None, move |res| tx.send(res).unwrap());
        assert!(r.is_some());
        r.unwrap()();
        let (label, value) = rx.recv().unwrap();
        assert_eq!(&*label, "a");
        assert_eq!(value, Some(5));
    }

    #[test]
    fn only_one_clause_fires_when_both_ready() {
        let c1: Arc<Channel<i32>> = Channel::new(Some(Box::new(FixedBuffer::new(1))));
        let c2: Arc<Channel<i32>> = Channel::new(Some(Box::new(FixedBuffer::new(1))));
        for c in [&c1, &c2] {
            let (ptx, prx) = mpsc::channel::<()>();
            let r = c
                .put(1, Arc::new(crate::handler::FnHandler::new(move |_| {
                    let _ = ptx.send(());
                })))
                .unwrap();
            r.unwrap()();
            prx.recv().unwrap();
        }

        let clauses = vec![AltClause::take("a", c1), AltClause::take("b", c2)];
        let (tx, rx) = mpsc::channel();
        let r = alt_core(clauses, None, move |res| tx.send(res).unwrap());
        assert!(r.is_some());
        r.unwrap()();
        let (label, value) = rx.recv().unwrap();
        assert!(&*label == "a" || &*label == "b");
        assert_eq!(value, Some(1));
        assert!(rx.try_recv().is_err(), "exactly one clause must fire");
    }

    #[test]
    fn parks_when_nothing_ready_and_no_default() {
        let c: Arc<Channel<i32>> = Channel::new(None);
        let clauses = vec![AltClause::take("a", c.clone())];
        let r = alt_core(clauses, None, |_: AltResult<i32>| {});
        assert!(r.is_none(), "must park, nothing ready and no default");
        assert!(!c.is_closed());
    }

    #[test]
    fn put_clause_on_closed_channel_is_skipped_not_errored() {
        // A put-clause whose channel is already closed when alt_core
        // reaches it must not abort the whole alt call (§4.2's
        // put-on-closed contract is about a direct `put`, not a clause
        // inside a non-deterministic choice) — the other, ready clause
        // must still win.
        let dead: Arc<Channel<i32>> = Channel::new(None);
        dead.close();

        let ready: Arc<Channel<i32>> = Channel::new(Some(Box::new(FixedBuffer::new(1))));
        let (ptx, prx) = mpsc::channel::<()>();
        let r = ready
            .put(9, Arc::new(crate::handler::FnHandler::new(move |_| {
                let _ = ptx.send(());
            })))
            .unwrap();
        r.unwrap()();
        prx.recv().unwrap();

        let clauses = vec![
            AltClause::put("dead", dead, 1),
            AltClause::take("ready", ready),
        ];
        let (tx, rx) = mpsc::channel();
        let r = alt_core(clauses, None, move |res| tx.send(res).unwrap());
        assert!(r.is_some(), "the live clause must still commit");
        r.unwrap()();
        let (label, value) = rx.recv().unwrap();
        assert_eq!(&*label, "ready");
        assert_eq!(value, Some(9));
    }

    #[test]
    fn put_clause_on_closed_channel_falls_through_to_default() {
        let dead: Arc<Channel<i32>> = Channel::new(None);
        dead.close();

        let clauses = vec![AltClause::put("dead", dead, 1)];
        let (tx, rx) = mpsc::channel();
        let r = alt_core(clauses, Some(7), move |res| tx.send(res).unwrap());
        assert!(r.is_some(), "default must fire when the only clause is dead");
        r.unwrap()();
        let (label, value) = rx.recv().unwrap();
        assert_eq!(&*label, "default");
        assert_eq!(value, Some(7));
    }
}
