//! Background worker pool whose results are collected on the frame thread.
//!
//! Jobs run off-thread and never touch frame state; each finished job yields a
//! [`Completion`] that the owner drains at a point of its choosing, so results are
//! applied between frames rather than while the frame is reading shared data.

use std::collections::VecDeque;
use std::fmt;
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::{logging, observability};

const TARGET: &str = "jobs";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobsMode {
    Threaded,
    Inline,
}

#[derive(Clone, Copy, Debug)]
pub struct JobsConfig {
    pub mode: JobsMode,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl JobsConfig {
    pub fn threaded(workers: usize, queue_capacity: usize) -> Self {
        Self {
            mode: JobsMode::Threaded,
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn inline() -> Self {
        Self {
            mode: JobsMode::Inline,
            workers: 0,
            queue_capacity: 0,
        }
    }
}

// Backpressure policy: fail fast when the queue is at capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    QueueFull,
    QueueClosed,
    Panicked(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::QueueFull => write!(f, "job queue full"),
            JobError::QueueClosed => write!(f, "job queue closed"),
            JobError::Panicked(message) => write!(f, "job panicked: {}", message),
        }
    }
}

impl std::error::Error for JobError {}

/// Result of one job, tagged with the key it was submitted under.
#[derive(Debug)]
pub struct Completion<K, T> {
    pub tag: K,
    pub result: Result<T, JobError>,
}

/// Point-in-time load on the pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobsTelemetry {
    pub queue_depth: usize,
    pub workers_active: usize,
    pub in_flight: usize,
}

type JobRunner<K, T> = Box<dyn FnOnce(&mpsc::Sender<Completion<K, T>>) + Send + 'static>;

pub struct Jobs<K, T> {
    inner: Arc<JobsInner<K, T>>,
}

struct JobsInner<K, T> {
    mode: JobsMode,
    queue: Mutex<QueueState<K, T>>,
    wake: Condvar,
    capacity: usize,
    completion_sender: mpsc::Sender<Completion<K, T>>,
    completion_receiver: Mutex<mpsc::Receiver<Completion<K, T>>>,
    depth: AtomicUsize,
    active: AtomicUsize,
    in_flight: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct QueueState<K, T> {
    entries: VecDeque<JobRunner<K, T>>,
    shutdown: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<K, T> Jobs<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    pub fn new(config: JobsConfig) -> Self {
        let (completion_sender, completion_receiver) = mpsc::channel();
        let inner = Arc::new(JobsInner {
            mode: config.mode,
            queue: Mutex::new(QueueState {
                entries: VecDeque::new(),
                shutdown: false,
            }),
            wake: Condvar::new(),
            capacity: config.queue_capacity.max(1),
            completion_sender,
            completion_receiver: Mutex::new(completion_receiver),
            depth: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        });
        if config.mode == JobsMode::Threaded {
            spawn_workers(&inner, config.workers.max(1));
        }
        Self { inner }
    }

    pub fn submit<F>(&self, tag: K, job: F) -> Result<(), JobError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let run: JobRunner<K, T> = Box::new(move |sender: &mpsc::Sender<Completion<K, T>>| {
            let result = match panic::catch_unwind(panic::AssertUnwindSafe(job)) {
                Ok(value) => Ok(value),
                Err(payload) => {
                    let message = observability::panic_message(payload.as_ref());
                    observability::set_sticky_error("jobs", format!("job panicked: {}", message));
                    Err(JobError::Panicked(message))
                }
            };
            let _ = sender.send(Completion { tag, result });
        });

        if self.inner.mode == JobsMode::Inline {
            self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
            run(&self.inner.completion_sender);
            return Ok(());
        }

        {
            let mut guard = lock(&self.inner.queue);
            if guard.shutdown {
                return Err(JobError::QueueClosed);
            }
            if guard.entries.len() >= self.inner.capacity {
                return Err(JobError::QueueFull);
            }
            guard.entries.push_back(run);
            self.inner.depth.fetch_add(1, Ordering::Relaxed);
            self.inner.in_flight.fetch_add(1, Ordering::Relaxed);
        }
        self.inner.wake.notify_one();
        Ok(())
    }

    /// Returns every completion that has arrived since the last drain.
    pub fn drain_completions(&self) -> Vec<Completion<K, T>> {
        let receiver = lock(&self.inner.completion_receiver);
        let mut completions = Vec::new();
        while let Ok(completion) = receiver.try_recv() {
            completions.push(completion);
        }
        if !completions.is_empty() {
            self.inner
                .in_flight
                .fetch_sub(completions.len(), Ordering::Relaxed);
        }
        completions
    }

    pub fn telemetry(&self) -> JobsTelemetry {
        JobsTelemetry {
            queue_depth: self.inner.depth.load(Ordering::Relaxed),
            workers_active: self.inner.active.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.load(Ordering::Relaxed),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.inner.in_flight.load(Ordering::Relaxed) == 0
    }
}

impl<K, T> JobsInner<K, T> {
    fn pop(&self) -> Option<JobRunner<K, T>> {
        let mut guard = lock(&self.queue);
        loop {
            if guard.shutdown {
                return None;
            }
            if let Some(job) = guard.entries.pop_front() {
                self.depth.fetch_sub(1, Ordering::Relaxed);
                return Some(job);
            }
            guard = match self.wake.wait(guard) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    fn shutdown(&self) {
        let mut guard = lock(&self.queue);
        guard.shutdown = true;
        self.wake.notify_all();
    }
}

impl<K, T> Drop for Jobs<K, T> {
    fn drop(&mut self) {
        self.inner.shutdown();
        let mut workers = lock(&self.inner.workers);
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn spawn_workers<K, T>(inner: &Arc<JobsInner<K, T>>, count: usize)
where
    K: Send + 'static,
    T: Send + 'static,
{
    let mut handles = lock(&inner.workers);
    for index in 0..count {
        let worker_inner = Arc::clone(inner);
        let name = format!("jobs-io-{}", index);
        match thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_loop(&worker_inner))
        {
            Ok(handle) => handles.push(handle),
            Err(err) => logging::error(TARGET, format!("spawn {} failed: {}", name, err)),
        }
    }
}

fn worker_loop<K, T>(inner: &JobsInner<K, T>) {
    while let Some(job) = inner.pop() {
        inner.active.fetch_add(1, Ordering::Relaxed);
        job(&inner.completion_sender);
        inner.active.fetch_sub(1, Ordering::Relaxed);
    }
}
