//! Fixed-width worker pool.
//!
//! Tasks may enqueue further tasks while running (the graph builder
//! discovers headers mid-scan, the scheduler releases children when a
//! parent finishes), so [`WorkerPool::join`] waits for quiescence (an
//! empty queue with no worker busy) rather than for a closed channel.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct State {
    queue: VecDeque<Job>,
    working: usize,
    stopping: bool,
}

struct Shared {
    state: Mutex<State>,
    condvar: Condvar,
}

/// Cloneable handle for enqueueing work, including from inside a task.
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        let mut state = self.shared.state.lock();
        if state.stopping {
            return;
        }
        state.queue.push_back(Box::new(job));
        drop(state);
        self.shared.condvar.notify_one();
    }

    /// Ask the pool to stop: queued work is discarded, in-flight tasks
    /// finish. Used when a child process is killed by SIGINT/SIGQUIT.
    pub fn request_stop(&self) {
        let mut state = self.shared.state.lock();
        state.stopping = true;
        state.queue.clear();
        drop(state);
        self.shared.condvar.notify_all();
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.state.lock().stopping
    }
}

/// A pool of `n` OS threads draining one shared queue.
pub struct WorkerPool {
    handle: PoolHandle,
    workers: Vec<JoinHandle<()>>,
}

/// Hardware parallelism minus one, at least one.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

impl WorkerPool {
    /// `workers == 0` means [`default_parallelism`].
    pub fn new(workers: usize) -> Self {
        let workers = if workers == 0 {
            default_parallelism()
        } else {
            workers
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                working: 0,
                stopping: false,
            }),
            condvar: Condvar::new(),
        });

        let threads = (0..workers)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || worker_loop(&shared))
            })
            .collect();

        Self {
            handle: PoolHandle { shared },
            workers: threads,
        }
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) {
        self.handle.enqueue(job);
    }

    /// Wait until the pool is quiescent, then shut the workers down.
    /// Returns whether the pool ran to completion (false when stopped).
    pub fn join(self) -> bool {
        let shared = &self.handle.shared;
        let stopped_early;
        {
            let mut state = shared.state.lock();
            while !(state.stopping || (state.queue.is_empty() && state.working == 0)) {
                shared.condvar.wait(&mut state);
            }
            stopped_early = state.stopping;
            state.stopping = true;
        }
        shared.condvar.notify_all();

        for worker in self.workers {
            let _ = worker.join();
        }
        !stopped_early
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    state.working += 1;
                    break job;
                }
                if state.stopping {
                    return;
                }
                shared.condvar.wait(&mut state);
            }
        };

        job();

        let mut state = shared.state.lock();
        state.working -= 1;
        let quiescent = state.queue.is_empty() && state.working == 0;
        drop(state);
        if quiescent {
            // Wake the thread blocked in join().
            shared.condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_every_task() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(4);
        for _ in 0..100 {
            let counter = counter.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert!(pool.join());
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn tasks_can_enqueue_tasks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(2);
        let handle = pool.handle();
        for _ in 0..10 {
            let counter = counter.clone();
            let handle = handle.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                let counter = counter.clone();
                handle.enqueue(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            });
        }
        assert!(pool.join());
        assert_eq!(counter.load(Ordering::Relaxed), 20);
    }

    #[test]
    fn join_on_an_idle_pool_returns() {
        let pool = WorkerPool::new(1);
        assert!(pool.join());
    }

    #[test]
    fn stop_discards_queued_work() {
        let counter = Arc::new(AtomicUsize::new(0));
        let pool = WorkerPool::new(1);
        let handle = pool.handle();
        {
            let handle = handle.clone();
            pool.enqueue(move || {
                handle.request_stop();
            });
        }
        for _ in 0..50 {
            let counter = counter.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.join();
        // Some tasks may have run before the stop, none after the queue
        // was cleared.
        assert!(counter.load(Ordering::Relaxed) < 50);
        assert!(handle.is_stopping());
    }

    #[test]
    fn default_parallelism_is_positive() {
        assert!(default_parallelism() >= 1);
    }
}
