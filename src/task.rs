// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The parking task runtime (§4.6): a resumable state machine driven
//! by channel-operation completion rather than OS-thread blocking.
//!
//! §9 Design Note (a)/(b): the surface that rewrites a user's lexical
//! task body into `TaskBody` is external (§1's explicit non-goal);
//! this module is the runtime contract such a rewrite targets — an
//! explicit, hand-written state machine (option (b)).
//!
//! `Box<B>` returned alongside `Step::Park` *is* the continuation `K`
//! from §4.6 point 3 — no separate closure type is needed, the next
//! state machine value already captures everything point 3 requires.

use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

use crate::alt::{alt_core, AltClause};
use crate::buffer::FixedBuffer;
use crate::channel::Channel;
use crate::error::{PutOnClosed, TaskFailure};
use crate::handler::{FnHandler, Handler};
use crate::loom_exports::sync::Arc;

/// What a task body's `step` receives: nothing (first call), the
/// value that completed a take/put park, or the label+value an `alt`
/// park selected (§4.4 step 5).
pub enum TaskEvent<M> {
    Start,
    Value(Option<M>),
    Selected(Arc<str>, Option<M>),
}

/// A channel operation a task parks on (§4.6 point 3).
pub enum ParkOp<M> {
    Take(Arc<Channel<M>>),
    Put(Arc<Channel<M>>, M),
    Alt(Vec<AltClause<M>>, Option<M>),
}

/// The outcome of one `step` call.
pub enum Step<B: TaskBody> {
    Done(B::Output),
    Park(ParkOp<B::Msg>, Box<B>),
}

/// A hand-written resumable state machine (§4.6). Every park point
/// within one task body exchanges the same message type `Msg` — a
/// direct consequence of `step`'s single `TaskEvent<Msg>` parameter.
pub trait TaskBody: Send + 'static {
    type Msg: Send + 'static;
    type Output: Send + 'static;

    fn step(self: Box<Self>, incoming: TaskEvent<Self::Msg>) -> Step<Self>
    where
        Self: Sized;
}

type PanicHook = Box<dyn Fn(&TaskFailure) + Send + Sync>;
static PANIC_HOOK: OnceLock<PanicHook> = OnceLock::new();

/// Install a process-wide handler for task-body panics and
/// put-on-closed failures encountered while parking (§7's task-panic
/// kind: "reported out-of-band via an installed error handler").
/// Settable once; later calls are ignored, matching `OnceLock`'s
/// first-wins semantics.
pub fn set_task_panic_hook(hook: impl Fn(&TaskFailure) + Send + Sync + 'static) {
    let _ = PANIC_HOOK.set(Box::new(hook));
}

fn report_failure(failure: &TaskFailure) {
    if let Some(hook) = PANIC_HOOK.get() {
        hook(failure);
    }
}

/// Spawn a task. Returns its capacity-1 result channel (§3 Task
/// state, §6 `spawn-task`): written to and closed on a normal finish,
/// closed without a value on panic or a put-on-closed encountered
/// while parking.
pub fn spawn_task<B: TaskBody>(body: B) -> Arc<Channel<B::Output>> {
    let result = Channel::new(Some(Box::new(FixedBuffer::new(1))));
    drive(Box::new(body), TaskEvent::Start, result.clone());
    result
}

fn drive<B: TaskBody>(body: Box<B>, event: TaskEvent<B::Msg>, result: Arc<Channel<B::Output>>) {
    match panic::catch_unwind(AssertUnwindSafe(|| body.step(event))) {
        Ok(Step::Done(output)) => publish_and_close(result, output),
        Ok(Step::Park(op, next)) => issue_park(op, next, result),
        Err(payload) => fail_task(result, TaskFailure { message: panic_message(&payload) }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

fn publish_and_close<T: Send + 'static>(result: Arc<Channel<T>>, output: T) {
    let handler: Arc<dyn Handler<()>> = Arc::new(FnHandler::new(|_| {}));
    match result.put(output, handler) {
        Ok(Some(r)) => r(),
        Ok(None) => {}
        Err(PutOnClosed(_)) => unreachable!("a task's own result channel starts open"),
    }
    result.close();
}

fn fail_task<T: Send + 'static>(result: Arc<Channel<T>>, failure: TaskFailure) {
    report_failure(&failure);
    result.close();
}

fn issue_park<B: TaskBody>(op: ParkOp<B::Msg>, next: Box<B>, result: Arc<Channel<B::Output>>) {
    match op {
        ParkOp::Take(channel) => {
            let result = result.clone();
            let handler: Arc<dyn Handler<Option<B::Msg>>> =
                Arc::new(FnHandler::new(move |v| drive(next, TaskEvent::Value(v), result)));
            if let Some(r) = channel.take(handler) {
                r();
            }
        }
        ParkOp::Put(channel, value) => {
            let result_for_ok = result.clone();
            let handler: Arc<dyn Handler<()>> = Arc::new(FnHandler::new(move |_| {
                drive(next, TaskEvent::Value(None), result_for_ok)
            }));
            match channel.put(value, handler) {
                Ok(Some(r)) => r(),
                Ok(None) => {}
                Err(PutOnClosed(_)) => fail_task(
                    result,
                    TaskFailure {
                        message: "put on closed channel while parking".to_string(),
                    },
                ),
            }
        }
        ParkOp::Alt(clauses, default) => {
            let result = result.clone();
            let r = alt_core(clauses, default, move |(label, v)| {
                drive(next, TaskEvent::Selected(label, v), result)
            });
            if let Some(r) = r {
                r();
            }
        }
    }
}
