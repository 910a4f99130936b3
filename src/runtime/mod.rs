//! Thread-backed tasks with structured completion.
//!
//! Every task is an OS thread, so blocking one task never blocks another.
//! [start] runs a root task and returns only once every task spawned beneath it has finished,
//! even if its [JoinHandle] was dropped or forgotten.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::{fmt, thread};

use tracing::{debug, warn};

mod tls;

/// Runs `f` as the root task on the current thread.
///
/// Catches a panic of the root task and waits for all spawned tasks before returning.
///
/// # Panics
/// If called from inside another [start] on the same thread.
pub fn start<F: FnOnce() -> T, T>(f: F) -> thread::Result<T> {
    tls::exclusive_scope(|scope| {
        let result = panic::catch_unwind(AssertUnwindSafe(f));

        // wait for children
        scope.wait_until_empty();

        result
    })
}

/// Spawns a new task, returning a [JoinHandle] for it.
///
/// # Panics
/// If called outside of [start].
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let scope = tls::scope();
    let id = TaskId::next();
    scope.enter();

    let child_scope = scope.clone();
    let thread = thread::Builder::new()
        .name(format!("handoff-task-{}", id.0))
        .spawn(move || {
            let _exit = ExitGuard(child_scope.clone());
            tls::inherit(child_scope);

            let result = panic::catch_unwind(AssertUnwindSafe(f));
            match result {
                Ok(output) => output,
                Err(payload) => {
                    warn!(task = id.0, "task panicked");
                    panic::resume_unwind(payload)
                }
            }
        });

    let thread = match thread {
        Ok(thread) => thread,
        Err(error) => {
            scope.exit();
            panic!("failed to spawn task: {error}");
        }
    };

    debug!(task = id.0, "spawned task");
    JoinHandle { id, thread }
}

/// Handle for joining a task.
pub struct JoinHandle<T> {
    id: TaskId,
    thread: thread::JoinHandle<T>,
}

impl<T> JoinHandle<T> {
    /// Blocks until the task completes, returning its output or its panic payload.
    pub fn join(self) -> thread::Result<T> {
        self.thread.join()
    }

    /// Whether the task has finished running.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinHandle")
            .field("id", &self.id.0)
            .field("is_finished", &self.is_finished())
            .finish()
    }
}

/// Process-wide unique task identifier, used for thread names and log fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct TaskId(usize);

impl TaskId {
    fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        TaskId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Number of live tasks spawned under one [start].
#[derive(Debug)]
struct Scope {
    live: Mutex<usize>,
    empty: Condvar,
}

impl Scope {
    fn new() -> Self {
        Scope {
            live: Mutex::new(0),
            empty: Condvar::new(),
        }
    }

    fn live(&self) -> MutexGuard<'_, usize> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) {
        *self.live() += 1;
    }

    fn exit(&self) {
        let mut live = self.live();
        *live -= 1;

        if *live == 0 {
            self.empty.notify_all();
        }
    }

    fn wait_until_empty(&self) {
        let mut live = self.live();

        while *live > 0 {
            live = self.empty.wait(live).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Leaves the scope when the task's thread finishes, even by unwinding.
struct ExitGuard(Arc<Scope>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.exit();
    }
}
