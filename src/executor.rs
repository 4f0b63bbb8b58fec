//! Execution contexts for builds and notifications.
//!
//! The controller never assumes a process-wide scheduler. Both execution
//! contexts are injected at construction: a build executor (where list
//! construction and diffing run) and a notify executor (the serialized
//! context representing the rendering thread, where edit scripts are
//! applied). Each executor runs its tasks strictly in submission order,
//! which is what gives the pipeline its FIFO ordering guarantee.

use std::sync::mpsc;
use std::thread;

/// A task submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send>;

/// An execution context that runs tasks in submission order.
///
/// Implementations must be serialized: no two tasks from the same executor
/// may run concurrently, and tasks run in the order they were submitted.
/// The controller relies on this for both build ordering and notify
/// ordering.
pub trait Executor: Send + Sync + 'static {
    /// Run `task`, now or later, on this executor's context.
    fn execute(&self, task: Task);
}

/// Runs tasks inline on the calling thread.
///
/// Useful for tests and for callers that already marshal onto the right
/// thread themselves. With immediate executors the whole build cycle runs
/// synchronously inside `request_rebuild`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateExecutor;

impl Executor for ImmediateExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// A single dedicated worker thread draining a FIFO queue.
///
/// Dropping the executor closes the queue; already-submitted tasks finish
/// before the thread exits.
pub struct WorkerExecutor {
    sender: Option<mpsc::Sender<Task>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WorkerExecutor {
    /// Spawn a worker thread with the given name.
    pub fn new(name: &str) -> Self {
        let (sender, receiver) = mpsc::channel::<Task>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task();
                }
            })
            .unwrap_or_else(|e| panic!("failed to spawn worker thread {name:?}: {e}"));
        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }
}

impl Executor for WorkerExecutor {
    fn execute(&self, task: Task) {
        if let Some(sender) = &self.sender {
            if sender.send(task).is_err() {
                tracing::warn!("worker executor is shut down; task dropped");
            }
        }
    }
}

impl Drop for WorkerExecutor {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn immediate_runs_inline() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        ImmediateExecutor.execute(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn worker_runs_tasks_in_submission_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let executor = WorkerExecutor::new("test-worker");
        for i in 0..16 {
            let order = order.clone();
            executor.execute(Box::new(move || {
                order.lock().push(i);
            }));
        }
        drop(executor); // joins the worker after it drains
        let seen = order.lock();
        assert_eq!(*seen, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn worker_runs_off_the_submitting_thread() {
        let executor = WorkerExecutor::new("test-worker");
        let submitting = thread::current().id();
        let (tx, rx) = mpsc::channel();
        executor.execute(Box::new(move || {
            let _ = tx.send(thread::current().id());
        }));
        let worker = rx.recv().expect("worker should run the task");
        assert_ne!(submitting, worker);
    }
}
