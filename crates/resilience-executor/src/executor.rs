//! The `Executor` collaborator.
//!
//! `FaultTolerantCache` needs a way to run a background refresh "later, on
//! some other thread" without caring which thread, what pool, or whether
//! the result is awaited. [`Executor`] is exactly that: a single method
//! that accepts a boxed, no-argument closure and guarantees it eventually
//! runs. No return value, no ordering guarantee beyond "eventually."
//!
//! Two implementations are provided: [`BlockingExecutor`], a small
//! dedicated thread pool usable with no other dependencies, and
//! [`CurrentRuntime`], an adapter for host applications that already run a
//! Tokio runtime and would rather reuse its blocking thread pool than spin
//! up a second one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[cfg(feature = "tracing")]
use tracing::debug;

/// A task the executor will run exactly once, on some thread, at some
/// point after it is submitted.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks "later, on some thread."
///
/// Implementors only need to guarantee eventual execution; ordering across
/// tasks and the identity of the running thread are unspecified.
pub trait Executor: Send + Sync + 'static {
    /// Submits `task` for execution. Does not block on the task completing.
    fn spawn(&self, task: Task);
}

impl<T: Executor + ?Sized> Executor for Arc<T> {
    fn spawn(&self, task: Task) {
        (**self).spawn(task);
    }
}

/// A small dedicated thread pool, the default [`Executor`] used when a
/// cache is built without an explicit one.
///
/// Workers pull tasks from a shared channel; the pool size is fixed at
/// construction. Dropping the last handle stops accepting new tasks but
/// does not interrupt workers already running one.
pub struct BlockingExecutor {
    sender: mpsc::Sender<Task>,
    _workers: Arc<Vec<JoinHandle<()>>>,
}

impl BlockingExecutor {
    /// Creates a pool with `worker_count` dedicated threads (clamped to at
    /// least 1).
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = mpsc::channel::<Task>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let receiver = Arc::clone(&receiver);
            workers.push(
                std::thread::Builder::new()
                    .name(format!("resilience-cache-worker-{id}"))
                    .spawn(move || loop {
                        let task = {
                            let guard = receiver.lock().unwrap_or_else(|e| e.into_inner());
                            guard.recv()
                        };
                        match task {
                            Ok(task) => {
                                #[cfg(feature = "tracing")]
                                debug!(worker = id, "running background task");
                                task();
                            }
                            Err(_) => break,
                        }
                    })
                    .expect("failed to spawn background worker thread"),
            );
        }

        Self {
            sender,
            _workers: Arc::new(workers),
        }
    }

    /// A pool sized to the number of available CPUs (at least 1).
    pub fn default_sized() -> Self {
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(count)
    }
}

impl Executor for BlockingExecutor {
    fn spawn(&self, task: Task) {
        // A closed receiver means every worker thread has panicked and
        // exited; there is nothing useful to do but drop the task, since
        // this collaborator makes no delivery guarantee beyond "best effort."
        let _ = self.sender.send(task);
    }
}

/// Adapts a [`tokio::runtime::Handle`] into an [`Executor`] by dispatching
/// each task via `spawn_blocking`, so a host application that already runs
/// Tokio can reuse its blocking thread pool instead of this crate spinning
/// up a second one.
#[derive(Clone)]
pub struct CurrentRuntime {
    handle: tokio::runtime::Handle,
    spawned: Arc<AtomicUsize>,
}

impl CurrentRuntime {
    /// Wraps an explicit runtime handle.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wraps the handle of the runtime the caller is currently running on.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime context, per
    /// [`tokio::runtime::Handle::current`].
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Number of tasks dispatched through this handle so far.
    pub fn spawned_count(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl Executor for CurrentRuntime {
    fn spawn(&self, task: Task) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        self.handle.spawn_blocking(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;

    #[test]
    fn blocking_executor_runs_task() {
        let executor = BlockingExecutor::new(2);
        let (tx, rx) = channel();
        executor.spawn(Box::new(move || {
            tx.send(()).unwrap();
        }));
        rx.recv_timeout(Duration::from_secs(1))
            .expect("task should have run");
    }

    #[test]
    fn blocking_executor_runs_many_tasks_in_parallel() {
        let executor = BlockingExecutor::new(4);
        let (tx, rx) = channel();
        for i in 0..8 {
            let tx = tx.clone();
            executor.spawn(Box::new(move || {
                tx.send(i).unwrap();
            }));
        }
        drop(tx);
        let mut seen: Vec<i32> = rx.iter().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn current_runtime_dispatches_via_spawn_blocking() {
        let executor = CurrentRuntime::current();
        let (tx, rx) = tokio::sync::oneshot::channel();
        executor.spawn(Box::new(move || {
            let _ = tx.send(42);
        }));
        let value = rx.await.unwrap();
        assert_eq!(value, 42);
        assert_eq!(executor.spawned_count(), 1);
    }
}
