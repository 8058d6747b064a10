// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! The public synchronous/asynchronous surface (§4.5, §6): the
//! operations a caller outside a `TaskBody` state machine actually
//! calls. Built entirely on `Channel::take`/`put` and `alt_core` — no
//! separate machinery.

use std::sync::mpsc;

use crate::alt::{alt_core, AltClause, AltResult};
use crate::buffer::{Buffer, DroppingBuffer, FixedBuffer, SlidingBuffer};
use crate::channel::Channel;
use crate::dispatch;
use crate::error::{InvalidArgument, PutOnClosed};
use crate::handler::{FnHandler, Handler};
use crate::loom_exports::sync::Arc;

/// `make-buffer(n)`, n ≥ 0 (§6). A fixed, blocking-when-full discipline.
pub fn make_buffer<T: Send + 'static>(n: usize) -> Box<dyn Buffer<T> + Send> {
    Box::new(FixedBuffer::new(n))
}

/// `make-dropping-buffer(n)`, n ≥ 1 (§6).
pub fn make_dropping_buffer<T: Send + 'static>(
    n: usize,
) -> Result<Box<dyn Buffer<T> + Send>, InvalidArgument> {
    if n == 0 {
        return Err(InvalidArgument::NonPositiveCapacity);
    }
    Ok(Box::new(DroppingBuffer::new(n)))
}

/// `make-sliding-buffer(n)`, n ≥ 1 (§6).
pub fn make_sliding_buffer<T: Send + 'static>(
    n: usize,
) -> Result<Box<dyn Buffer<T> + Send>, InvalidArgument> {
    if n == 0 {
        return Err(InvalidArgument::NonPositiveCapacity);
    }
    Ok(Box::new(SlidingBuffer::new(n)))
}

/// `chan()`: an unbuffered rendezvous channel (§6).
pub fn chan<T: Send + 'static>() -> Arc<Channel<T>> {
    Channel::new(None)
}

/// `chan(buf-or-n)` with an explicit buffer discipline (§6). For the
/// "or nonneg int" shorthand, pass `make_buffer(n)`.
pub fn chan_with_buffer<T: Send + 'static>(buffer: Box<dyn Buffer<T> + Send>) -> Arc<Channel<T>> {
    Channel::new(Some(buffer))
}

/// `take(port)` (§4.5 sync-take, §6): blocks the caller's thread until
/// a value is available or the channel closes. `None` means closed.
pub fn sync_take<T: Send + 'static>(channel: &Arc<Channel<T>>) -> Option<T> {
    let (tx, rx) = mpsc::sync_channel(1);
    let handler: Arc<dyn Handler<Option<T>>> = Arc::new(FnHandler::new(move |v| {
        let _ = tx.send(v);
    }));
    if let Some(r) = channel.take(handler) {
        r();
    }
    rx.recv().expect("a take handler always fires exactly once")
}

/// `put(port, v)` (§4.5 sync-put, §6): blocks until the value is
/// accepted. `Err` if the channel was already closed (§4.2, §7).
pub fn sync_put<T: Send + 'static>(
    channel: &Arc<Channel<T>>,
    value: T,
) -> Result<(), PutOnClosed<T>> {
    let (tx, rx) = mpsc::sync_channel(1);
    let handler: Arc<dyn Handler<()>> = Arc::new(FnHandler::new(move |_| {
        let _ = tx.send(());
    }));
    match channel.put(value, handler)? {
        Some(r) => r(),
        None => {}
    }
    rx.recv().expect("a put handler always fires exactly once");
    Ok(())
}

/// `async-take(port, f, on-caller?)` (§4.5, §6): `f` runs on the
/// caller's stack if the take completes synchronously and
/// `on_caller` is `true`; otherwise (parked, or `on_caller` is
/// `false`) it runs on a `Dispatch` worker.
pub fn async_take<T, F>(channel: &Arc<Channel<T>>, f: F, on_caller: bool)
where
    T: Send + 'static,
    F: FnOnce(Option<T>) + Send + 'static,
{
    let handler: Arc<dyn Handler<Option<T>>> = Arc::new(FnHandler::new(f));
    if let Some(r) = channel.take(handler) {
        run_or_dispatch(r, on_caller);
    }
}

/// `async-put(port, v, f, on-caller?)` (§4.5, §6): symmetric to
/// [`async_take`].
pub fn async_put<T, F>(
    channel: &Arc<Channel<T>>,
    value: T,
    f: F,
    on_caller: bool,
) -> Result<(), PutOnClosed<T>>
where
    T: Send + 'static,
    F: FnOnce() + Send + 'static,
{
    let handler: Arc<dyn Handler<()>> = Arc::new(FnHandler::new(move |()| f()));
    if let Some(r) = channel.put(value, handler)? {
        run_or_dispatch(r, on_caller);
    }
    Ok(())
}

fn run_or_dispatch(runnable: crate::channel::Runnable, on_caller: bool) {
    if on_caller {
        runnable();
    } else {
        dispatch::global().spawn(runnable);
    }
}

/// `close(port)` (§4.5, §6): idempotent.
pub fn close<T: Send + 'static>(channel: &Arc<Channel<T>>) {
    channel.close();
}

/// `alt(clauses...)` (§4.4, §6): blocks the caller's thread until one
/// clause (or the default) commits, returning its `[label, value]`.
pub fn sync_alt<T: Send + 'static>(
    clauses: Vec<AltClause<T>>,
    default: Option<T>,
) -> AltResult<T> {
    let (tx, rx) = mpsc::sync_channel(1);
    let r = alt_core(clauses, default, move |res| {
        let _ = tx.send(res);
    });
    if let Some(r) = r {
        r();
    }
    rx.recv().expect("alt always delivers exactly once")
}
