//! Mutually-exclusive write scheduler
//!
//! A single-consumer, multi-producer queue of nullary async write tasks.
//! One `run` loop drains tasks strictly in the order they were scheduled,
//! awaiting each before dequeueing the next, so chunks written to one
//! HTTP response never interleave. A distinguished complete sentinel
//! drains the remaining work and stops the loop.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

type WriteJob = Pin<Box<dyn Future<Output = ()> + Send>>;

enum Entry {
    Task(WriteJob),
    Complete,
}

/// Serial executor for the writes of one HTTP response.
pub struct WriteScheduler {
    queue: Mutex<VecDeque<Entry>>,
    ready: Semaphore,
    completed: AtomicBool,
}

impl WriteScheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            ready: Semaphore::new(0),
            completed: AtomicBool::new(false),
        }
    }

    /// Enqueue a write task. Never blocks the caller.
    pub fn schedule<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queue.lock().push_back(Entry::Task(Box::pin(task)));
        self.ready.add_permits(1);
    }

    /// Enqueue the terminal sentinel: once it is reached, the executor
    /// stops after finishing everything scheduled before it.
    pub fn complete(&self) {
        self.queue.lock().push_back(Entry::Complete);
        self.ready.add_permits(1);
    }

    /// Drain tasks in order until the sentinel has run or `cancel` fires.
    /// On cancellation, un-drained tasks are abandoned.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                permit = self.ready.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => return,
                },
            }

            loop {
                let entry = self.queue.lock().pop_front();
                match entry {
                    None => break,
                    Some(Entry::Complete) => {
                        self.completed.store(true, Ordering::SeqCst);
                    }
                    Some(Entry::Task(job)) => job.await,
                }
                if cancel.is_cancelled() {
                    return;
                }
            }

            if self.completed.load(Ordering::SeqCst) {
                return;
            }
        }
    }
}

impl Default for WriteScheduler {
    fn default() -> Self {
        Self::new()
    }
}
