//! Finite stream of jobs handed from one producer to one worker, terminated by closing the stream.
//!
//! [`job_stream`] connects a [`Dispatcher`] (the producer) with a [`Worker`] (the consumer) through
//! a bounded jobs [`channel`] and a completion [`signal`].
//!
//! The worker loop moves through [`WorkerState`]s:
//! `Running` while jobs arrive, `Draining` once the stream is closed and empty,
//! and `Done` after it has reported back to the dispatcher. `Done` is never left.
//!
//! # Examples
//! ```
//! use handoff::runtime;
//! use handoff::sync::job_stream::job_stream;
//!
//! runtime::start(|| {
//!     let (mut dispatcher, worker) = job_stream(5);
//!
//!     let handle = runtime::spawn(move || worker.run(|job: u32| println!("received job {job}")));
//!
//!     for job in 1..=3 {
//!         dispatcher.dispatch(job).unwrap();
//!     }
//!     let report = dispatcher.finish().unwrap();
//!
//!     assert_eq!(report.dispatched, 3);
//!     assert!(!report.more_jobs);
//!     assert_eq!(handle.join().unwrap(), 3);
//! })
//! .unwrap();
//! ```

use tracing::{debug, info};

use crate::runtime::{self, JoinHandle};
use crate::sync::channel::{self, TryRecvError};
use crate::sync::signal::{self, Notifier, Waiter};
use crate::Error;

/// Creates a connected [`Dispatcher`] and [`Worker`] buffering up to `capacity` jobs.
pub fn job_stream<J>(capacity: usize) -> (Dispatcher<J>, Worker<J>) {
    let (jobs_tx, jobs_rx) = channel::bounded(capacity);
    let (notifier, waiter) = signal::signal();

    let dispatcher = Dispatcher {
        jobs: jobs_tx,
        leftovers: jobs_rx.clone(),
        done: Some(waiter),
        dispatched: 0,
        is_closed: false,
    };

    let worker = Worker {
        jobs: jobs_rx,
        done: Some(notifier),
        state: WorkerState::Running,
        processed: 0,
    };

    (dispatcher, worker)
}

/// Runs `handler` for every job on a new task.
///
/// The task's output is the number of processed jobs.
///
/// # Panics
/// If called outside of [`runtime::start`].
pub fn spawn_worker<J, F>(capacity: usize, handler: F) -> (Dispatcher<J>, JoinHandle<usize>)
where
    J: Send + 'static,
    F: FnMut(J) + Send + 'static,
{
    let (dispatcher, worker) = job_stream(capacity);
    let handle = runtime::spawn(move || worker.run(handler));

    (dispatcher, handle)
}

/// Where a [`Worker`] is in its loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for or processing jobs.
    Running,

    /// The stream is closed and drained, end-of-stream handling is pending.
    Draining,

    /// The dispatcher has been told the worker is finished.
    Done,
}

/// Consuming side of a job stream.
#[derive(Debug)]
pub struct Worker<J> {
    jobs: channel::Receiver<J>,
    /// Taken exactly once, when leaving [`WorkerState::Draining`].
    done: Option<Notifier>,
    state: WorkerState,
    processed: usize,
}

impl<J> Worker<J> {
    /// Performs a single state transition, handing at most one job to `handler`.
    ///
    /// Blocks while `Running` and no job is buffered.
    pub fn step(&mut self, handler: &mut impl FnMut(J)) -> WorkerState {
        self.state = match self.state {
            WorkerState::Running => match self.jobs.recv() {
                Some(job) => {
                    let nth = self.processed + 1;
                    info!(nth, "received job");
                    handler(job);
                    self.processed = nth;
                    WorkerState::Running
                }
                None => WorkerState::Draining,
            },
            WorkerState::Draining => {
                info!(processed = self.processed, "received all jobs");
                if let Some(done) = self.done.take() {
                    done.notify();
                }
                WorkerState::Done
            }
            WorkerState::Done => WorkerState::Done,
        };

        self.state
    }

    /// Processes jobs until the stream is closed and drained, then notifies the dispatcher.
    ///
    /// Returns the number of processed jobs.
    pub fn run(mut self, mut handler: impl FnMut(J)) -> usize {
        while self.step(&mut handler) != WorkerState::Done {}

        self.processed
    }

    /// Current state of the loop.
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Number of jobs the handler has returned from so far.
    pub fn processed(&self) -> usize {
        self.processed
    }
}

/// Producing side of a job stream.
///
/// Dropping it without [`Dispatcher::close`] closes the stream, so the worker still gets to exit.
#[derive(Debug)]
pub struct Dispatcher<J> {
    jobs: channel::Sender<J>,
    /// Only used for the final diagnostic receive, after the worker has exited.
    leftovers: channel::Receiver<J>,
    /// Taken exactly once, by [`Dispatcher::finish`].
    done: Option<Waiter>,
    dispatched: usize,
    is_closed: bool,
}

impl<J> Dispatcher<J> {
    /// Hands `job` to the worker, blocking while the stream's buffer is full.
    ///
    /// Fails with [`Error::SendOnClosedChannel`] once the stream is closed.
    pub fn dispatch(&mut self, job: J) -> Result<(), Error> {
        self.jobs.send(job)?;
        self.dispatched += 1;
        info!(nth = self.dispatched, "sent job");
        Ok(())
    }

    /// Tells the worker no more jobs will follow.
    ///
    /// Fails with [`Error::DoubleClose`] if the stream is already closed.
    pub fn close(&mut self) -> Result<(), Error> {
        self.jobs.close()?;
        self.is_closed = true;
        info!(dispatched = self.dispatched, "sent all jobs");
        Ok(())
    }

    /// Closes the stream unless [`Dispatcher::close`] already did,
    /// then blocks until the worker has drained it and exited.
    ///
    /// Hangs forever if the worker panics before reaching [`WorkerState::Done`].
    pub fn finish(mut self) -> Result<Report, Error> {
        if !self.is_closed {
            self.close()?;
        }

        if let Some(done) = self.done.take() {
            done.wait();
        }

        // closed and drained by now, so this never blocks
        let more_jobs = !matches!(self.leftovers.try_recv(), Err(TryRecvError::Closed));
        debug!(more_jobs, "received more jobs");

        Ok(Report {
            dispatched: self.dispatched,
            more_jobs,
        })
    }

    /// Number of jobs dispatched so far.
    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Whether [`Dispatcher::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.is_closed
    }
}

impl<J> Drop for Dispatcher<J> {
    fn drop(&mut self) {
        // the only sender, so closing can't race another close
        if !self.is_closed && self.jobs.close().is_ok() {
            self.is_closed = true;
            debug!(dispatched = self.dispatched, "dispatcher dropped, job stream closed");
        }
    }
}

/// Outcome of [`Dispatcher::finish`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Report {
    /// Number of jobs successfully dispatched.
    pub dispatched: usize,

    /// Result of a final non-blocking receive on the drained stream, always `false`.
    pub more_jobs: bool,
}
