//! Blocking synchronization primitives for thread-backed tasks.
//!
//! Which one to reach for:
//! - [`channel`] to pass values between tasks, and to tell receivers that no more values will come.
//! - [`signal`] to wait for exactly one task to finish its work.
//! - [`job_stream`] to feed a finite list of jobs to one worker and wait for it to drain them.

pub mod channel;
pub mod job_stream;
pub mod signal;
