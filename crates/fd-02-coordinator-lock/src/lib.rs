//! # FD-02 Coordinator Lock
//!
//! Serializes state-machine transitions while letting read-only queries
//! proceed during long protocol waits.
//!
//! ## Sessions
//!
//! | Session | Excludes writers | Excludes readers |
//! |---------|------------------|------------------|
//! | `WriteSession` | yes | yes |
//! | `SharedSession` | yes | no |
//! | `ReadSession` | no | writers only |
//!
//! A `WriteSession` holder that is about to suspend (for example on a
//! publish acknowledgment) calls `enable_reads` to turn into a
//! `SharedSession`; other writers stay excluded but queries run. Dropping any
//! writer-side session wakes tasks parked in `write_when`.
//!
//! ## Timeouts
//!
//! `TimeoutHandle` owns a spawned timer task and aborts it on drop, so a
//! waiting state that owns its handle cancels its timer whenever it is
//! replaced. The timer's own continuation must `disarm` the handle instead,
//! otherwise it would abort itself.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod lock;
pub mod timeout;

pub use lock::{CoordinatorLock, ReadSession, SharedSession, WriteSession};
pub use timeout::TimeoutHandle;
