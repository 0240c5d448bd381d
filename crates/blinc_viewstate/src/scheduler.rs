//! Deferred execution
//!
//! Delayed flag writes go through a [`Scheduler`]. [`ManualScheduler`] runs
//! on a virtual clock that only moves when told to, which makes debounce
//! timing deterministic. With the `tokio` feature, [`TokioScheduler`] runs
//! tasks on a tokio runtime in real time.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to a scheduled task
    pub struct TimerHandle;
}

/// A deferred unit of work
pub type Task = Box<dyn FnOnce() + Send>;

/// Scheduler shared by every view built from the same root builder
pub type SharedScheduler = Arc<dyn Scheduler>;

/// Delayed execution with cancellation
pub trait Scheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed
    ///
    /// A task may run before this returns, for example on a zero delay.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Cancel a pending task. Unknown or already-run handles are ignored.
    fn cancel(&self, handle: TimerHandle);
}

struct Entry {
    due: Duration,
    seq: u64,
    task: Task,
}

#[derive(Default)]
struct Queue {
    now: Duration,
    next_seq: u64,
    entries: SlotMap<TimerHandle, Entry>,
}

impl Queue {
    /// Earliest entry due at or before `until`, FIFO among equal deadlines
    fn next_due(&self, until: Duration) -> Option<TimerHandle> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.due <= until)
            .min_by_key(|(_, entry)| (entry.due, entry.seq))
            .map(|(handle, _)| handle)
    }
}

/// Scheduler driven by an explicit virtual clock
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Queue>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .now
    }

    /// Number of tasks waiting to run
    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Move the clock forward, running every task that falls due
    ///
    /// Tasks run in deadline order without the queue locked, so a task may
    /// schedule or cancel others. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let until = self.now() + by;
        let mut ran = 0;

        loop {
            let task = {
                let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
                let Some(handle) = queue.next_due(until) else {
                    queue.now = until;
                    break;
                };
                let Some(entry) = queue.entries.remove(handle) else {
                    break;
                };
                queue.now = entry.due;
                entry.task
            };
            task();
            ran += 1;
        }

        if ran > 0 {
            tracing::trace!("ManualScheduler ran {} task(s), now at {:?}", ran, until);
        }
        ran
    }

    /// Run every pending task, advancing the clock to the last deadline
    pub fn run_all(&self) -> usize {
        let last_due = {
            let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let now = queue.now;
            queue
                .entries
                .values()
                .map(|entry| entry.due)
                .max()
                .map(|due| due.saturating_sub(now))
        };
        match last_due {
            Some(remaining) => self.advance(remaining),
            None => 0,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let due = queue.now + delay;
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.entries.insert(Entry { due, seq, task })
    }

    fn cancel(&self, handle: TimerHandle) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .remove(handle);
    }
}

#[cfg(feature = "tokio")]
pub use self::tokio_scheduler::TokioScheduler;

#[cfg(feature = "tokio")]
mod tokio_scheduler {
    use super::*;
    use tokio::runtime::Handle;
    use tokio::task::JoinHandle;

    type Tasks = Arc<Mutex<SlotMap<TimerHandle, Option<JoinHandle<()>>>>>;

    /// Real-time scheduler spawning one sleeping task per timer
    pub struct TokioScheduler {
        runtime: Handle,
        tasks: Tasks,
    }

    impl TokioScheduler {
        pub fn new(runtime: Handle) -> Self {
            Self {
                runtime,
                tasks: Arc::default(),
            }
        }

        /// Scheduler on the runtime of the calling task
        ///
        /// # Panics
        ///
        /// Panics when called outside of a tokio runtime.
        pub fn current() -> Self {
            Self::new(Handle::current())
        }

        pub fn pending(&self) -> usize {
            self.tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    impl Scheduler for TokioScheduler {
        fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
            // Slot exists before the task can run; whoever removes it first owns it
            let handle = self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(None);

            let tasks = Arc::clone(&self.tasks);
            let join = self.runtime.spawn(async move {
                tokio::time::sleep(delay).await;
                let live = tasks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(handle)
                    .is_some();
                if live {
                    task();
                }
            });

            let mut slots = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            match slots.get_mut(handle) {
                Some(slot) => *slot = Some(join),
                // Already fired
                None => drop(join),
            }
            handle
        }

        fn cancel(&self, handle: TimerHandle) {
            let removed = self
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(handle);
            if let Some(Some(join)) = removed {
                join.abort();
            }
        }
    }
}
