//! # Task Pool Module
//!
//! A fixed pool of worker threads consuming a shared task queue, with a
//! completion barrier and panic containment.
//!
//! ## Overview
//!
//! - **Workers**: `TaskPool::new(n)` spawns `n` OS threads (or one per CPU
//!   when `n == 0`, falling back to 4). Workers block on the queue condition
//!   and exit once the pool is dropped and the queue is drained.
//! - **Completion barrier**: [`TaskPool::wait_idle`] blocks until every
//!   submitted task has finished running.
//! - **Panic containment**: a panicking task never takes its worker down.
//!   The panic is caught, logged, and the worker moves on. [`task_panic`] is
//!   the canonical way for a task to abort itself with a message.

use std::collections::VecDeque;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Panic payload used by tasks to report an unrecoverable but contained
/// error. Workers catch it, log the message, and continue.
#[derive(Debug)]
pub struct TaskPanic {
    message: String,
}

impl TaskPanic {
    /// The message the task aborted with.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task panic: {}", self.message)
    }
}

/// Abort the current task with a contained panic.
///
/// Inside a pool worker the panic is caught and logged; the worker keeps
/// running. Outside a worker it behaves as an ordinary panic in the caller.
pub fn task_panic(message: impl Into<String>) -> ! {
    panic::panic_any(TaskPanic {
        message: message.into(),
    })
}

struct QueueState {
    tasks: VecDeque<Task>,
    /// Tasks submitted but not yet finished (queued + running).
    active: usize,
    stop: bool,
}

struct PoolInner {
    queue: Mutex<QueueState>,
    work_cv: Condvar,
    idle_cv: Condvar,
}

/// A fixed worker pool consuming a shared task queue.
///
/// Dropping the pool drains the queue and joins all workers.
pub struct TaskPool {
    inner: Arc<PoolInner>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Create a pool with `workers` threads.
    ///
    /// Zero means one worker per available CPU, falling back to 4 when the
    /// parallelism cannot be determined.
    pub fn new(workers: usize) -> Self {
        let count = if workers == 0 {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4)
        } else {
            workers
        };

        let inner = Arc::new(PoolInner {
            queue: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                active: 0,
                stop: false,
            }),
            work_cv: Condvar::new(),
            idle_cv: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(count);
        for worker_id in 0..count {
            let inner = inner.clone();
            let handle = thread::Builder::new()
                .name(format!("girder-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &inner))
                .expect("failed to spawn pool worker");
            handles.push(handle);
        }

        TaskPool {
            inner,
            workers: handles,
        }
    }

    /// Enqueue a task for execution on a worker thread.
    ///
    /// The active-task counter is raised under the queue lock, so a
    /// `wait_idle` racing this call can never observe the submission as
    /// already complete.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut queue = self.inner.queue.lock().unwrap();
            queue.tasks.push_back(Box::new(task));
            queue.active += 1;
        }
        self.inner.work_cv.notify_one();
    }

    /// Block until every submitted task has finished.
    pub fn wait_idle(&self) {
        let mut queue = self.inner.queue.lock().unwrap();
        while queue.active != 0 {
            queue = self.inner.idle_cv.wait(queue).unwrap();
        }
    }

    /// Number of worker threads in the pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        {
            let mut queue = self.inner.queue.lock().unwrap();
            queue.stop = true;
        }
        self.inner.work_cv.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(worker_id: usize, inner: &PoolInner) {
    debug!(worker_id, "pool worker started");
    loop {
        let task = {
            let mut queue = inner.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                if queue.stop {
                    debug!(worker_id, "pool worker exiting");
                    return;
                }
                queue = inner.work_cv.wait(queue).unwrap();
            }
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            if let Some(tp) = payload.downcast_ref::<TaskPanic>() {
                error!(worker_id, message = %tp.message(), "task panicked");
            } else {
                error!(
                    worker_id,
                    message = %panic_message(payload.as_ref()),
                    "task raised an unexpected panic"
                );
            }
        }

        let mut queue = inner.queue.lock().unwrap();
        queue.active -= 1;
        if queue.active == 0 {
            inner.idle_cv.notify_all();
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
