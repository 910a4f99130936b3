//! Bounded FIFO channel with a one-way, irreversible close.
//!
//! You interact with a channel through a pair of [`Sender`] and [`Receiver`] handles created by [`bounded`].
//! Both handles are cheap to clone and share the same underlying queue.
//!
//! Closing is explicit: dropping handles never closes the channel.
//! After [`Sender::close`], sends fail with [`Error::SendOnClosedChannel`],
//! while receivers still drain every item buffered before the close.
//! Once the channel is closed and drained, [`Receiver::recv`] returns [`None`] immediately, forever.
//!
//! A capacity of zero makes every send a synchronous handoff:
//! [`Sender::send`] returns only after a receiver has taken the item.
//!
//! # Examples
//!
//! ### Drain After Close
//! ```
//! use handoff::sync::channel;
//!
//! let (tx, rx) = channel::bounded(5);
//!
//! tx.send(1).unwrap();
//! tx.send(2).unwrap();
//! tx.close().unwrap();
//!
//! assert_eq!(rx.recv(), Some(1));
//! assert_eq!(rx.recv(), Some(2));
//! assert_eq!(rx.recv(), None);
//! assert_eq!(rx.recv(), None);
//! ```
//!
//! ### Send After Close
//! ```
//! use handoff::{sync::channel, Error};
//!
//! let (tx, _rx) = channel::bounded(1);
//! tx.close().unwrap();
//!
//! assert_eq!(tx.send(()), Err(Error::SendOnClosedChannel));
//! assert_eq!(tx.close(), Err(Error::DoubleClose));
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::Error;

/// Creates a channel holding at most `capacity` pending items.
///
/// # Examples
/// ```
/// let (tx, rx) = handoff::sync::channel::bounded::<u32>(5);
/// ```
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(ChannelState {
            queue: VecDeque::with_capacity(capacity),
            is_closed: false,
            pushed: 0,
            popped: 0,
        }),
        capacity,
        not_empty: Condvar::new(),
        not_full: Condvar::new(),
        taken: Condvar::new(),
    });

    let tx = Sender(shared.clone());
    let rx = Receiver(shared);

    (tx, rx)
}

struct Shared<T> {
    state: Mutex<ChannelState<T>>,
    capacity: usize,
    /// Receivers waiting for an item or for the close.
    not_empty: Condvar,
    /// Senders waiting for buffer space or for the close.
    not_full: Condvar,
    /// Senders on a zero capacity channel waiting for their item to be received.
    taken: Condvar,
}

impl<T> Shared<T> {
    /// No user code runs while the lock is held, so a poisoned lock still guards a consistent state.
    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Zero capacity channels still need a slot for the item in flight.
    fn slots(&self) -> usize {
        self.capacity.max(1)
    }
}

struct ChannelState<T> {
    queue: VecDeque<T>,
    is_closed: bool,
    /// Total number of items ever enqueued.
    pushed: u64,
    /// Total number of items ever dequeued.
    popped: u64,
}

impl<T> ChannelState<T> {
    fn pop(&mut self) -> Option<T> {
        let item = self.queue.pop_front()?;
        self.popped += 1;
        Some(item)
    }
}

/// Sending half of a channel, also the only handle that can close it.
pub struct Sender<T>(Arc<Shared<T>>);

impl<T> Sender<T> {
    /// Enqueues `item`, blocking while the buffer is full.
    ///
    /// On a zero capacity channel this blocks until a receiver has taken the item.
    /// Fails without enqueueing if the channel is closed, including when it gets closed while this call waits for space.
    #[must_use = "a failed send means the item was never delivered"]
    pub fn send(&self, item: T) -> Result<(), Error> {
        let shared = &*self.0;
        let mut state = shared.lock();

        loop {
            if state.is_closed {
                trace!("send: closed");
                return Err(Error::SendOnClosedChannel);
            }

            if state.queue.len() < shared.slots() {
                break;
            }

            state = wait(&shared.not_full, state); // woken up by receiver or close
        }

        state.queue.push_back(item);
        state.pushed += 1;
        let ticket = state.pushed;
        trace!(ticket, "send: value");
        shared.not_empty.notify_one();

        if shared.capacity == 0 {
            while state.popped < ticket {
                state = wait(&shared.taken, state); // woken up by receiver
            }
        }

        Ok(())
    }

    /// Marks the channel closed, waking every blocked sender and receiver.
    ///
    /// Items already buffered remain receivable.
    #[must_use = "a failed close means the channel was already closed"]
    pub fn close(&self) -> Result<(), Error> {
        let shared = &*self.0;
        let mut state = shared.lock();

        if state.is_closed {
            return Err(Error::DoubleClose);
        }

        state.is_closed = true;
        debug!(buffered = state.queue.len(), "channel closed");

        shared.not_empty.notify_all();
        shared.not_full.notify_all();
        Ok(())
    }

    /// Number of buffered items.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.lock().queue.len()
    }

    /// Whether no items are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity the channel was created with.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.0.capacity
    }

    /// Whether [`Sender::close`] has been called.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.0.lock().is_closed
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Sender(self.0.clone())
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_channel("Sender", &self.0, f)
    }
}

/// Receiving half of a channel.
pub struct Receiver<T>(Arc<Shared<T>>);

impl<T> Receiver<T> {
    /// Dequeues the oldest item, blocking while the channel is open and empty.
    ///
    /// Returns [`None`] once the channel is closed and drained, without blocking.
    pub fn recv(&self) -> Option<T> {
        let shared = &*self.0;
        let mut state = shared.lock();

        loop {
            if let Some(item) = state.pop() {
                trace!("recv: value");
                self.taken();
                return Some(item);
            }

            if state.is_closed {
                trace!("recv: closed");
                return None;
            }

            state = wait(&shared.not_empty, state); // woken up by sender or close
        }
    }

    /// Dequeues the oldest item without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut state = self.0.lock();

        if let Some(item) = state.pop() {
            self.taken();
            return Ok(item);
        }

        if state.is_closed {
            Err(TryRecvError::Closed)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    /// Like [`Receiver::recv`], but gives up after `timeout`.
    ///
    /// A timeout too large to be represented as a deadline waits without limit.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        let shared = &*self.0;
        let deadline = Instant::now().checked_add(timeout);
        let mut state = shared.lock();

        loop {
            if let Some(item) = state.pop() {
                self.taken();
                return Ok(item);
            }

            if state.is_closed {
                return Err(RecvTimeoutError::Closed);
            }

            let Some(deadline) = deadline else {
                state = wait(&shared.not_empty, state); // woken up by sender or close
                continue;
            };

            let now = Instant::now();
            if now >= deadline {
                trace!("recv: timeout");
                return Err(RecvTimeoutError::Timeout);
            }

            state = shared
                .not_empty
                .wait_timeout(state, deadline - now)
                .map(|(state, _)| state)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Number of buffered items.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.lock().queue.len()
    }

    /// Whether no items are buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity the channel was created with.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.0.capacity
    }

    /// Whether the channel has been closed, regardless of buffered items.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.0.lock().is_closed
    }

    /// Blocking iterator over received items, ending once the channel is closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { receiver: self }
    }

    /// Wakes up a sender after an item left the buffer.
    fn taken(&self) {
        let shared = &*self.0;
        shared.not_full.notify_one();

        if shared.capacity == 0 {
            shared.taken.notify_all();
        }
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Receiver(self.0.clone())
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_channel("Receiver", &self.0, f)
    }
}

impl<T> Iterator for Receiver<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Borrowing iterator returned by [`Receiver::iter`].
#[derive(Debug)]
pub struct Iter<'a, T> {
    receiver: &'a Receiver<T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.recv()
    }
}

impl<'a, T> IntoIterator for &'a Receiver<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Outcome of a [`Receiver::try_recv`] that didn't yield an item.
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TryRecvError {
    /// The channel is open but nothing is buffered.
    #[error("receiving on an empty channel")]
    Empty,

    /// The channel is closed and drained.
    #[error("receiving on a closed channel")]
    Closed,
}

/// Outcome of a [`Receiver::recv_timeout`] that didn't yield an item.
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecvTimeoutError {
    /// Nothing arrived before the deadline.
    #[error("timed out waiting on channel")]
    Timeout,

    /// The channel is closed and drained.
    #[error("channel is closed and drained")]
    Closed,
}

fn wait<'a, T>(
    condvar: &Condvar,
    state: MutexGuard<'a, ChannelState<T>>,
) -> MutexGuard<'a, ChannelState<T>> {
    condvar.wait(state).unwrap_or_else(PoisonError::into_inner)
}

fn debug_channel<T>(name: &str, shared: &Shared<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = shared.lock();
    f.debug_struct(name)
        .field("capacity", &shared.capacity)
        .field("len", &state.queue.len())
        .field("is_closed", &state.is_closed)
        .finish()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use crate::runtime::{spawn, start};

    use super::*;

    #[test]
    fn send_then_receive() {
        let (tx, rx) = bounded(3);

        tx.send(1).unwrap();
        tx.send(2).unwrap();
        tx.send(3).unwrap();

        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), Some(2));
        assert_eq!(rx.recv(), Some(3));
    }

    #[test]
    fn receive_then_send() {
        start(|| {
            let (tx, rx) = bounded(1);

            spawn(move || {
                tx.send(1).unwrap();
                tx.close().unwrap();
            });

            assert_eq!(rx.recv(), Some(1));
            assert_eq!(rx.recv(), None);
        })
        .unwrap();
    }

    #[test]
    fn close_stops_blocked_recv() {
        start(|| {
            let (tx, rx) = bounded::<()>(1);
            let handle = spawn(move || rx.recv());

            thread::sleep(Duration::from_millis(5));
            tx.close().unwrap();
            let result = handle.join().unwrap();

            assert_eq!(result, None);
        })
        .unwrap();
    }

    #[test]
    fn dropping_sender_doesnt_close() {
        let (tx, rx) = bounded::<()>(1);

        drop(tx);

        assert!(!rx.is_closed());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn compatible_with_iterator() {
        let (tx, rx) = bounded(3);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        tx.send(3).unwrap();
        tx.close().unwrap();

        let collected: Vec<_> = rx.into_iter().collect();

        assert_eq!(collected, vec![1, 2, 3]);
    }

    #[test]
    fn borrowing_iterator_leaves_receiver_usable() {
        let (tx, rx) = bounded(2);
        tx.send('a').unwrap();
        tx.send('b').unwrap();
        tx.close().unwrap();

        let collected: String = (&rx).into_iter().collect();

        assert_eq!(collected, "ab");
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn reports_len_capacity_and_closed() {
        let (tx, rx) = bounded(4);

        tx.send(()).unwrap();
        tx.send(()).unwrap();

        assert_eq!(tx.len(), 2);
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.capacity(), 4);
        assert!(!tx.is_empty());
        assert!(!tx.is_closed());

        tx.close().unwrap();

        assert!(rx.is_closed());
    }

    mod capacity {
        use super::*;

        #[test]
        fn send_blocks_while_full() {
            start(|| {
                let (tx, rx) = bounded(1);
                tx.send(1).unwrap();

                let sent = Arc::new(AtomicUsize::new(0));
                let counter = sent.clone();
                let handle = spawn(move || {
                    tx.send(2).unwrap();
                    counter.fetch_add(1, Ordering::SeqCst);
                });

                thread::sleep(Duration::from_millis(10));
                assert_eq!(sent.load(Ordering::SeqCst), 0);

                assert_eq!(rx.recv(), Some(1));
                handle.join().unwrap();

                assert_eq!(sent.load(Ordering::SeqCst), 1);
                assert_eq!(rx.recv(), Some(2));
            })
            .unwrap();
        }

        #[test]
        fn zero_capacity_send_waits_for_receiver() {
            start(|| {
                let (tx, rx) = bounded(0);

                let handle = spawn(move || {
                    tx.send(7).unwrap();
                    Instant::now()
                });

                thread::sleep(Duration::from_millis(10));
                let receiving_since = Instant::now();
                assert_eq!(rx.recv(), Some(7));

                assert!(handle.join().unwrap() >= receiving_since);
            })
            .unwrap();
        }

        #[test]
        fn zero_capacity_delivers_every_sender() {
            start(|| {
                let (tx, rx) = bounded(0);

                let senders: Vec<_> = (0..4)
                    .map(|n| {
                        let tx = tx.clone();
                        spawn(move || tx.send(n).unwrap())
                    })
                    .collect();

                let mut received: Vec<_> = (0..4).map(|_| rx.recv().unwrap()).collect();
                for sender in senders {
                    sender.join().unwrap();
                }

                received.sort();
                assert_eq!(received, vec![0, 1, 2, 3]);
            })
            .unwrap();
        }

        #[test]
        fn close_fails_sender_blocked_on_full_buffer() {
            start(|| {
                let (tx, rx) = bounded(1);
                tx.send(1).unwrap();

                let blocked = tx.clone();
                let handle = spawn(move || blocked.send(2));

                thread::sleep(Duration::from_millis(5));
                tx.close().unwrap();

                assert_eq!(handle.join().unwrap(), Err(Error::SendOnClosedChannel));
                assert_eq!(rx.recv(), Some(1));
                assert_eq!(rx.recv(), None);
            })
            .unwrap();
        }
    }

    mod closing {
        use super::*;

        #[test]
        fn send_after_close_fails() {
            let (tx, rx) = bounded(5);
            tx.close().unwrap();

            assert_eq!(tx.send(4), Err(Error::SendOnClosedChannel));
            assert!(rx.is_empty());
        }

        #[test]
        fn double_close_fails() {
            let (tx, _rx) = bounded::<()>(5);
            tx.close().unwrap();

            assert_eq!(tx.close(), Err(Error::DoubleClose));
            assert_eq!(tx.clone().close(), Err(Error::DoubleClose));
        }

        #[test]
        fn buffered_items_survive_close() {
            let (tx, rx) = bounded(5);
            for n in 0..5 {
                tx.send(n).unwrap();
            }

            tx.close().unwrap();

            for n in 0..5 {
                assert_eq!(rx.recv(), Some(n));
            }
            assert_eq!(rx.recv(), None);
        }

        #[test]
        fn closed_and_drained_never_blocks() {
            let (tx, rx) = bounded::<i32>(0);
            tx.close().unwrap();

            for _ in 0..100 {
                assert_eq!(rx.recv(), None);
            }
            assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
            assert_eq!(
                rx.recv_timeout(Duration::from_secs(60)),
                Err(RecvTimeoutError::Closed)
            );
        }
    }

    mod non_blocking {
        use super::*;

        #[test]
        fn try_recv_reports_empty_then_item() {
            let (tx, rx) = bounded(1);

            assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
            tx.send(1).unwrap();
            assert_eq!(rx.try_recv(), Ok(1));
        }

        #[test]
        fn recv_timeout_gives_up() {
            let (_tx, rx) = bounded::<()>(1);
            let before = Instant::now();

            let result = rx.recv_timeout(Duration::from_millis(5));

            assert_eq!(result, Err(RecvTimeoutError::Timeout));
            assert!(before.elapsed() >= Duration::from_millis(5));
        }

        #[test]
        fn recv_timeout_accepts_unrepresentable_deadline() {
            let (tx, rx) = bounded(1);
            tx.send(1).unwrap();

            assert_eq!(rx.recv_timeout(Duration::MAX), Ok(1));

            tx.close().unwrap();

            assert_eq!(rx.recv_timeout(Duration::MAX), Err(RecvTimeoutError::Closed));
        }

        #[test]
        fn recv_timeout_without_deadline_waits_for_item() {
            start(|| {
                let (tx, rx) = bounded(1);

                spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    tx.send(1).unwrap();
                });

                assert_eq!(rx.recv_timeout(Duration::MAX), Ok(1));
            })
            .unwrap();
        }

        #[test]
        fn recv_timeout_receives_late_item() {
            start(|| {
                let (tx, rx) = bounded(1);

                spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    tx.send(1).unwrap();
                });

                assert_eq!(rx.recv_timeout(Duration::from_secs(60)), Ok(1));
            })
            .unwrap();
        }
    }

    mod multiple_receivers {
        use super::*;
        use std::collections::HashSet;

        #[test]
        fn each_item_delivered_once_then_both_see_close() {
            start(|| {
                let (tx, rx) = bounded(4);

                let consumers: Vec<_> = (0..2)
                    .map(|_| {
                        let rx = rx.clone();
                        spawn(move || {
                            let received: Vec<u32> = rx.iter().collect();
                            (received, rx.recv())
                        })
                    })
                    .collect();

                for n in 0..1000 {
                    tx.send(n).unwrap();
                }
                tx.close().unwrap();

                let mut all = Vec::new();
                for consumer in consumers {
                    let (received, after_close) = consumer.join().unwrap();
                    assert_eq!(after_close, None);
                    all.extend(received);
                }

                let unique: HashSet<_> = all.iter().copied().collect();
                assert_eq!(all.len(), 1000);
                assert_eq!(unique, (0..1000).collect::<HashSet<_>>());
                assert_eq!(rx.recv(), None);
            })
            .unwrap();
        }
    }

    mod traits {
        use super::*;
        use impls::impls;
        use std::fmt::Debug;
        use std::rc::Rc;

        #[test]
        fn sender_implements_traits() {
            assert!(impls!(Sender<i32>: Debug & Send & Sync & Clone));
        }

        #[test]
        fn receiver_implements_traits() {
            assert!(impls!(Receiver<i32>: Debug & Send & Sync & Clone & Iterator));
        }

        #[test]
        fn debug_doesnt_require_debug_items() {
            // Given
            struct NotDebug;

            // Then
            assert!(impls!(Sender<NotDebug>: Debug));
            assert!(impls!(Receiver<NotDebug>: Debug));
        }

        #[test]
        fn not_send_for_non_send_items() {
            assert!(impls!(Sender<Rc<i32>>: !Send));
            assert!(impls!(Receiver<Rc<i32>>: !Send));
        }
    }
}
