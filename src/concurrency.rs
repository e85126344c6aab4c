//! Mutex-guarded cells and the fire-and-forget worker pool.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// A value behind a mutex and a condition variable.
///
/// `apply` runs its callback while the lock is held; callers must not perform
/// blocking I/O inside. Notifications are explicit: producers call
/// `notify_one`/`notify_all` after a mutating `apply` or `set`.
pub struct Guarded<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T> Guarded<T> {
    pub fn new(t: T) -> Guarded<T> {
        Guarded {
            state: Mutex::new(t),
            cond: Condvar::new(),
        }
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.state.lock().unwrap().clone()
    }

    pub fn set(&self, t: T) {
        *self.state.lock().unwrap() = t;
    }

    pub fn swap(&self, t: &mut T) {
        std::mem::swap(&mut *self.state.lock().unwrap(), t);
    }

    pub fn apply<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.state.lock().unwrap())
    }

    pub fn wait(&self, pred: impl Fn(&T) -> bool) {
        let mut state = self.state.lock().unwrap();
        while !pred(&state) {
            state = self.cond.wait(state).unwrap();
        }
    }

    pub fn notify_one(&self) {
        self.cond.notify_one();
    }

    pub fn notify_all(&self) {
        self.cond.notify_all();
    }
}

/// Publishes immutable snapshots behind a guarded cell; readers get a cheap
/// pointer copy and must treat the target as read-only.
pub struct GuardedArc<T> {
    inner: Guarded<Arc<T>>,
}

impl<T> GuardedArc<T> {
    pub fn new(t: T) -> GuardedArc<T> {
        GuardedArc {
            inner: Guarded::new(Arc::new(t)),
        }
    }

    pub fn get(&self) -> Arc<T> {
        self.inner.get()
    }

    pub fn set(&self, t: Arc<T>) {
        self.inner.set(t);
    }

    pub fn swap(&self, t: &mut Arc<T>) {
        self.inner.swap(t);
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget task executor backed by a fixed set of worker threads.
pub struct TaskPool {
    queue: Arc<Guarded<VecDeque<Option<Job>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskPool {
    pub fn new(threads: usize) -> TaskPool {
        let queue = Arc::new(Guarded::new(VecDeque::new()));
        let workers = (0..threads.max(1))
            .map(|i| {
                let queue = Arc::clone(&queue);
                thread::Builder::new()
                    .name(format!("task-pool-{}", i))
                    .spawn(move || worker_loop(&queue))
                    .expect("cannot spawn worker thread")
            })
            .collect();
        TaskPool {
            queue,
            workers: Mutex::new(workers),
        }
    }

    pub fn launch(&self, f: impl FnOnce() + Send + 'static) {
        self.queue.apply(|q| q.push_back(Some(Box::new(f))));
        self.queue.notify_one();
    }

    /// Drains the workers with one sentinel each and joins them. Jobs already
    /// queued ahead of the sentinels still run.
    pub fn shutdown(&self) {
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock().unwrap());
        self.queue.apply(|q| {
            for _ in 0..workers.len() {
                q.push_back(None);
            }
        });
        self.queue.notify_all();
        for worker in workers {
            let _ = worker.join();
        }
    }
}

fn worker_loop(queue: &Guarded<VecDeque<Option<Job>>>) {
    loop {
        queue.wait(|q| !q.is_empty());
        match queue.apply(|q| q.pop_front()) {
            Some(Some(job)) => job(),
            Some(None) => break,
            // Another worker took the job between wait and pop.
            None => continue,
        }
    }
}

lazy_static::lazy_static! {
    static ref TASK_POOL: TaskPool = TaskPool::new(
        thread::available_parallelism().map(usize::from).unwrap_or(4),
    );
}

/// Process-wide task executor, constructed at first use.
pub fn task_pool() -> &'static TaskPool {
    &TASK_POOL
}
