// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Error types (§7).
//!
//! Small enums with hand-written `Display`/`Error` impls, no
//! `thiserror` — this crate sits below the layer where a derive macro
//! earns its keep, and the teacher's own channel errors follow the
//! same shape.

use std::fmt;

/// A `put`/`async_put` was attempted on a channel that was already
/// closed. Carries the value back so the caller isn't forced to drop
/// it.
#[derive(Debug)]
pub struct PutOnClosed<T>(pub T);

impl<T> fmt::Display for PutOnClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "put on closed channel")
    }
}

impl<T: fmt::Debug> std::error::Error for PutOnClosed<T> {}

/// Argument validation failures, checked at entry (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidArgument {
    /// A buffer was requested with a negative or zero capacity where
    /// one ≥ 1 is required.
    NonPositiveCapacity,
    /// `nil` (the closed sentinel) was passed as a value to put.
    NilPut,
    /// An alt clause list was malformed (unbalanced, unlabeled, or not
    /// a take/put/default form).
    MalformedAltClause(String),
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonPositiveCapacity => write!(f, "buffer capacity must be at least 1"),
            Self::NilPut => write!(f, "nil is reserved as the closed sentinel and cannot be put"),
            Self::MalformedAltClause(msg) => write!(f, "malformed alt clause: {msg}"),
        }
    }
}

impl std::error::Error for InvalidArgument {}

/// A task body panicked while stepping (§7, task-panic).
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panicked: {}", self.message)
    }
}

impl std::error::Error for TaskFailure {}
