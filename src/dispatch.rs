// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Dispatch: the executor that runs callbacks off the caller's stack
//! (§2, §4.7 of SPEC_FULL.md).
//!
//! One shared queue behind a mutex + condvar, a fixed pool of worker
//! threads. Deliberately simpler than `rask-rt`'s `green::scheduler`
//! (no per-worker local queues, no work stealing) — thread-pool
//! tuning is out of scope (§1); this just needs to run a runnable
//! somewhere that isn't the caller.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, OnceLock};
use std::thread;

type Job = Box<dyn FnOnce() + Send>;

struct Shared {
    queue: Mutex<VecDeque<Job>>,
    work_available: Condvar,
}

/// A pool of worker threads that run queued callbacks.
pub struct Dispatch {
    shared: std::sync::Arc<Shared>,
}

impl Dispatch {
    /// Start a pool with `n` worker threads. `n == 0` autodetects via
    /// `available_parallelism`, same convention as `rask-rt`'s
    /// `Scheduler::new`.
    pub fn with_workers(n: usize) -> Self {
        let worker_count = if n == 0 {
            thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
        } else {
            n
        };

        let shared = std::sync::Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            work_available: Condvar::new(),
        });

        for id in 0..worker_count {
            let shared = shared.clone();
            thread::Builder::new()
                .name(format!("parkchan-dispatch-{id}"))
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn dispatch worker");
        }

        Self { shared }
    }

    /// Queue a callback to run on a worker thread.
    pub fn spawn(&self, job: Job) {
        let mut q = self.shared.queue.lock().unwrap();
        q.push_back(job);
        self.shared.work_available.notify_one();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let mut q = shared.queue.lock().unwrap();
        loop {
            if let Some(job) = q.pop_front() {
                drop(q);
                job();
                break;
            }
            q = shared.work_available.wait(q).unwrap();
        }
    }
}

/// Process-wide dispatch singleton, lazily started with an autodetected
/// worker count on first use.
pub fn global() -> &'static Dispatch {
    static DISPATCH: OnceLock<Dispatch> = OnceLock::new();
    DISPATCH.get_or_init(|| Dispatch::with_workers(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_queued_jobs() {
        let d = Dispatch::with_workers(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let c = counter.clone();
            d.spawn(Box::new(move || {
                c.fetch_add(1, Ordering::Relaxed);
            }));
        }
        // Jobs run asynchronously; poll briefly for completion.
        for _ in 0..200 {
            if counter.load(Ordering::Relaxed) == 50 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn global_is_usable() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        global().spawn(Box::new(move || {
            c.store(1, Ordering::Relaxed);
        }));
        for _ in 0..200 {
            if counter.load(Ordering::Relaxed) == 1 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
