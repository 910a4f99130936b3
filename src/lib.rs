//! Closeable bounded channels, completion signals and job streams for thread-backed tasks.
//!
//! The crate models two patterns on top of one [`sync::channel`] primitive:
//! - [`sync::signal`]: a worker tells its controller "my work is finished".
//! - [`sync::job_stream`]: a producer hands a finite sequence of jobs to one worker,
//!   then closes the stream so the worker can tell "a new job arrived" from "no more jobs, ever".
//!
//! Tasks are plain threads grouped under [`runtime::start`].
//!
//! ```
//! use handoff::{runtime, sync::signal};
//!
//! runtime::start(|| {
//!     let (notifier, waiter) = signal::signal();
//!
//!     runtime::spawn(move || {
//!         // work...
//!         notifier.notify();
//!     });
//!
//!     waiter.wait();
//! })
//! .unwrap();
//! ```

pub mod runtime;
pub mod sync;

#[cfg(feature = "macros")]
pub use handoff_macros::start;

/// Protocol violations on a channel.
///
/// Both indicate an ordering bug in the caller and aren't meant to be retried.
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// The channel was already closed when `send` was called, the item wasn't enqueued.
    #[error("send on closed channel")]
    SendOnClosedChannel,

    /// `close` was called on a channel that was already closed.
    #[error("close of closed channel")]
    DoubleClose,
}
