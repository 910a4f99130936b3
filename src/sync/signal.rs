//! Single-use completion notification between a worker task and its controller.
//!
//! You interact with a signal through a pair of [`Notifier`] and [`Waiter`] handles created by [`signal`] or [`rendezvous`].
//! The worker calls [`Notifier::notify()`] as its last action, the controller blocks in [`Waiter::wait()`].
//! Once `wait` returns, everything the worker did before `notify` is visible to the controller.
//!
//! Both handles are consumed by use, so a signal can't be sent or awaited twice.
//! Give every worker its own signal.
//!
//! # Examples
//!
//! ### Wait Before Notify
//! ```
//! use handoff::runtime;
//! use handoff::sync::signal::signal;
//!
//! runtime::start(|| {                                    // Execution order:
//!     let (notifier, waiter) = signal();                 // 1
//!
//!     runtime::spawn(move || {                           // 2
//!         println!("working...");                        // 4
//!         notifier.notify();                             // 5
//!     });
//!
//!     waiter.wait();                                     // 3
//!     println!("done");                                  // 6
//! })
//! .unwrap();
//! ```
//!
//! ### Notify Before Wait
//! Notifying a buffered signal doesn't block, even if nobody is waiting yet.
//! ```
//! use handoff::sync::signal::signal;
//!
//! let (notifier, waiter) = signal();
//!
//! notifier.notify();
//! waiter.wait();
//! ```
//!
//! ### Unused Notifier
//! If the worker never notifies, the controller hangs forever.
//! ```no_run
//! use handoff::sync::signal::signal;
//!
//! let (notifier, waiter) = signal();
//! drop(notifier);
//!
//! waiter.wait();
//! unreachable!("Your task will hang forever!");
//! ```

use std::time::Duration;

use tracing::debug;

use crate::sync::channel::{self, RecvTimeoutError};

/// Creates a buffered signal, [`Notifier::notify`] never blocks.
///
/// # Examples
/// ```
/// let (notifier, waiter) = handoff::sync::signal::signal();
/// ```
pub fn signal() -> (Notifier, Waiter) {
    with_capacity(1)
}

/// Creates an unbuffered signal, [`Notifier::notify`] blocks until the [`Waiter`] receives it.
///
/// The worker then also learns that its controller has observed the completion.
pub fn rendezvous() -> (Notifier, Waiter) {
    with_capacity(0)
}

fn with_capacity(capacity: usize) -> (Notifier, Waiter) {
    let (sender, receiver) = channel::bounded(capacity);

    (Notifier(sender), Waiter(receiver))
}

/// Handle to notify the waiter.
#[derive(Debug)]
pub struct Notifier(channel::Sender<()>);

impl Notifier {
    /// Notify the [`Waiter`].
    ///
    /// Consumes the [`Notifier`] since this is a single-use notification.
    pub fn notify(self) {
        let rendezvous = self.0.capacity() == 0;
        debug!(rendezvous, "signal: notify");
        let sent = self.0.send(());
        debug_assert!(sent.is_ok(), "signal channels are never closed");
    }
}

/// Blocking handle for the notification.
#[derive(Debug)]
pub struct Waiter(channel::Receiver<()>);

impl Waiter {
    /// Blocks until the [`Notifier`] has notified.
    ///
    /// Consumes the [`Waiter`] since this is a single-use notification.
    pub fn wait(self) {
        let received = self.0.recv();
        debug_assert!(received.is_some(), "signal channels are never closed");
        debug!("signal: received");
    }

    /// Blocks for at most `timeout`, the waiter stays usable if nothing arrived.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), RecvTimeoutError> {
        self.0.recv_timeout(timeout)?;
        debug!("signal: received");
        Ok(())
    }
}
