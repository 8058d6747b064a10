// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Timers (§2, §6): a channel that closes itself after a delay.
//!
//! Grounded on `rask-rt`'s `timer_after` (`src/timeout.rs`) — a
//! dedicated OS thread that sleeps then signals, rather than a
//! `Dispatch` job (a blocking sleep would tie up a worker slot for the
//! whole duration, defeating the point of a bounded pool).

use std::thread;
use std::time::Duration;

use crate::channel::Channel;
use crate::loom_exports::sync::Arc;

/// A channel that closes itself after `duration`. Since it never
/// carries a value, `take` on it always eventually yields `None`
/// (§4.2 step 4) — exactly the "`[:t, nil]` after ~50ms" shape from
/// §8's timeout scenario. Generic over `T` so a timer can sit in the
/// same `alt` call as clauses on a `Channel<T>` (§4.4's single
/// message type per alt, see `alt.rs`).
pub fn timeout<T: Send + 'static>(duration: Duration) -> Arc<Channel<T>> {
    let channel = Channel::new(None);
    let closer = channel.clone();
    thread::Builder::new()
        .name("parkchan-timer".to_string())
        .spawn(move || {
            thread::sleep(duration);
            closer.close();
        })
        .expect("failed to spawn timer thread");
    channel
}
