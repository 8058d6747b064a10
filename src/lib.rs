// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! `parkchan`: synchronous channels, a non-deterministic multi-way
//! `alt` (select), and a lightweight parking-task runtime.
//!
//! Three tightly coupled pieces, leaves first:
//!
//! - [`channel`] — a rendezvous/buffered queue with matched pending
//!   takers and putters, close semantics, and the handler protocol.
//! - [`alt`] — atomic one-shot commit across several pending channel
//!   operations at once, with fairness and an optional default.
//! - [`task`] — a resumable state machine (`TaskBody`) that parks at
//!   channel operations instead of blocking an OS thread, resuming
//!   wherever the operation it's waiting on completes.
//!
//! The surface syntactic sugar that would rewrite an ordinary-looking
//! function body into a `TaskBody` state machine is out of scope —
//! this crate is the runtime contract such a rewrite targets, plus
//! the channel/alt core underneath it, which stands on its own for
//! thread-based callers via [`ops::sync_take`]/[`ops::sync_put`]/
//! [`ops::sync_alt`].
//!
//! Out of scope: general thread-pool tuning beyond [`dispatch::Dispatch`]'s
//! fixed worker count, application-level channel combinators
//! (map/filter/merge/pipeline), persistence, cross-process transport,
//! and any transactional multi-channel atomic swap beyond alt's
//! at-most-one-commit guarantee.

mod alt;
mod buffer;
mod channel;
mod dispatch;
mod error;
mod handler;
mod loom_exports;
mod ops;
mod task;
mod timer;

pub use alt::{alt_core, AltClause, AltResult, ClauseOp};
pub use buffer::{Buffer, DroppingBuffer, FixedBuffer, SlidingBuffer};
pub use channel::{Channel, Runnable};
pub use dispatch::Dispatch;
pub use error::{InvalidArgument, PutOnClosed, TaskFailure};
pub use handler::{FnHandler, Handler};
pub use ops::{
    async_put, async_take, chan, chan_with_buffer, close, make_buffer, make_dropping_buffer,
    make_sliding_buffer, sync_alt, sync_put, sync_take,
};
pub use task::{set_task_panic_hook, spawn_task, ParkOp, Step, TaskBody, TaskEvent};
pub use timer::timeout;
