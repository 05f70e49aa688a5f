//! One-shot timers, the equivalent of `setTimeout` / `clearTimeout`.
//!
//! [`TokioScheduler`] runs tasks on a tokio runtime in real time.
//! [`ManualScheduler`] keeps virtual time that only moves when
//! [`ManualScheduler::advance`] is called, and doubles as a [`Clock`].

use crate::host::Clock;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub trait Scheduler: Send + Sync {
    /// Runs `task` once after `delay`.
    fn schedule(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancels a pending timer. Unknown or already-fired ids are ignored.
    fn cancel(&self, id: TimerId);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct TokioScheduler {
    handle: Handle,
    next_id: AtomicU64,
    timers: Arc<Mutex<HashMap<TimerId, JoinHandle<()>>>>,
}

impl TokioScheduler {
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Binds to the runtime of the calling context.
    ///
    /// # Panics
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::from_handle(Handle::current())
    }

    pub fn pending(&self) -> usize {
        lock(&self.timers).len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let timers = Arc::clone(&self.timers);
        // Held across spawn so the task cannot deregister before it is registered.
        let mut guard = lock(&self.timers);
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&timers).remove(&id);
            task();
        });
        guard.insert(id, join);
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some(join) = lock(&self.timers).remove(&id) {
            join.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, join) in lock(&self.timers).drain() {
            join.abort();
        }
    }
}

struct ManualState {
    elapsed: Duration,
    next_id: u64,
    queue: BTreeMap<(Duration, u64), Task>,
    deadlines: HashMap<TimerId, Duration>,
}

/// Deterministic virtual-time scheduler.
pub struct ManualScheduler {
    start: DateTime<Utc>,
    state: Mutex<ManualState>,
}

impl ManualScheduler {
    /// Virtual time starting at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        Self::starting_at(DateTime::from_timestamp(1_704_067_200, 0).unwrap_or_default())
    }

    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            state: Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                next_id: 1,
                queue: BTreeMap::new(),
                deadlines: HashMap::new(),
            }),
        }
    }

    pub fn elapsed(&self) -> Duration {
        lock(&self.state).elapsed
    }

    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Moves virtual time forward, running every timer that falls due in
    /// deadline order. Timers scheduled by running tasks are honoured if they
    /// fall inside the window.
    pub fn advance(&self, by: Duration) {
        let target = lock(&self.state).elapsed + by;
        loop {
            let task = {
                let mut state = lock(&self.state);
                let due = state
                    .queue
                    .keys()
                    .next()
                    .copied()
                    .filter(|(deadline, _)| *deadline <= target);
                match due {
                    Some(key) => {
                        state.elapsed = key.0;
                        state.deadlines.remove(&TimerId(key.1));
                        state.queue.remove(&key)
                    }
                    None => None,
                }
            };
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        lock(&self.state).elapsed = target;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerId {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.elapsed + delay;
        state.queue.insert((deadline, id), task);
        state.deadlines.insert(TimerId(id), deadline);
        TimerId(id)
    }

    fn cancel(&self, id: TimerId) {
        let mut state = lock(&self.state);
        if let Some(deadline) = state.deadlines.remove(&id) {
            state.queue.remove(&(deadline, id.0));
        }
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.elapsed()).unwrap_or_default();
        self.start + elapsed
    }
}
