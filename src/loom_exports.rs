//! Swap-in `loom` primitives for model-checked concurrency tests.
//!
//! Gated behind the `parkchan_loom` cfg, set by `RUSTFLAGS="--cfg
//! parkchan_loom"` when running `cargo test` under loom. Outside of
//! that cfg this just re-exports `std::sync`/`std::sync::atomic` so
//! the rest of the crate never has to care which one it's built
//! against.

#[cfg(not(all(test, parkchan_loom)))]
#[allow(unused_imports)]
pub(crate) mod sync {
    pub(crate) use std::sync::{Arc, Mutex};

    pub(crate) mod atomic {
        pub(crate) use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};
    }
}
