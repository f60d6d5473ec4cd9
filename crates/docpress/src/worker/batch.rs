use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use log::{debug, info};

use crate::worker::job::FileTask;

struct Inner {
    queue: VecDeque<FileTask>,
    paused: bool,
    cancelled: bool,
}

/// What a worker gets when it asks for more work. Cancellation wins over
/// the gate, the gate wins over the queue.
pub enum TaskPoll {
    Task(FileTask),
    Paused,
    Drained,
    Cancelled,
}

/// Shared per-run state: the pending work queue, the pause gate, and the
/// cancellation flag, all behind one mutex. Critical sections are short;
/// no I/O or network call ever runs under the lock. Workers block here only
/// while the gate is closed.
pub struct BatchState {
    inner: Mutex<Inner>,
    gate: Condvar,
}

impl Default for BatchState {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                paused: false,
                cancelled: false,
            }),
            gate: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A worker panicking mid-push cannot corrupt a VecDeque of owned
        // tasks; recover the guard rather than poisoning the whole batch.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends tasks to the pending set. Callable at any time, including
    /// while workers are draining the queue.
    pub fn feed(&self, tasks: impl IntoIterator<Item = FileTask>) {
        let mut inner = self.lock();
        let before = inner.queue.len();
        inner.queue.extend(tasks);
        debug!("Fed {} tasks into queue", inner.queue.len() - before);
    }

    /// Atomically pops the FIFO head, or `None` when nothing is pending.
    /// Never blocks beyond the critical section.
    pub fn try_take(&self) -> Option<FileTask> {
        self.lock().queue.pop_front()
    }

    /// Checks the flags and pops the FIFO head under a single guard. Once
    /// `pause` has returned true, no call can hand out another task until
    /// the gate reopens. Never blocks beyond the critical section.
    pub fn poll_task(&self) -> TaskPoll {
        let mut inner = self.lock();
        if inner.cancelled {
            return TaskPoll::Cancelled;
        }
        if inner.paused {
            return TaskPoll::Paused;
        }
        match inner.queue.pop_front() {
            Some(task) => TaskPoll::Task(task),
            None => TaskPoll::Drained,
        }
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Drops all pending tasks without affecting tasks already taken.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.queue.len();
        inner.queue.clear();
        if dropped > 0 {
            info!("Cleared {} pending tasks", dropped);
        }
    }

    /// Closes the gate. Refused when cancellation is already pending or
    /// nothing remains in the queue — there is nothing left to suspend.
    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        if inner.cancelled || inner.queue.is_empty() {
            return false;
        }
        inner.paused = true;
        info!("Batch paused");
        true
    }

    /// Reopens the gate and wakes every parked worker. Idempotent.
    pub fn resume(&self) {
        let mut inner = self.lock();
        if inner.paused {
            inner.paused = false;
            info!("Batch resumed");
        }
        drop(inner);
        self.gate.notify_all();
    }

    /// Sets the (monotonic) cancellation flag, drops pending work, and
    /// reopens the gate so no worker stays parked without a chance to
    /// observe cancellation. Idempotent.
    pub fn abort(&self) {
        let mut inner = self.lock();
        if !inner.cancelled {
            info!("Batch aborted, dropping {} pending tasks", inner.queue.len());
        }
        inner.cancelled = true;
        inner.queue.clear();
        inner.paused = false;
        drop(inner);
        self.gate.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn is_paused(&self) -> bool {
        self.lock().paused
    }

    /// Blocks the calling worker until the gate opens. Worker threads only;
    /// the controlling thread must never park itself here.
    pub fn wait_if_paused(&self) {
        let mut inner = self.lock();
        while inner.paused && !inner.cancelled {
            inner = self.gate.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Fresh flags for a new run. Pending tasks fed before start survive.
    pub fn reset_flags(&self) {
        let mut inner = self.lock();
        inner.cancelled = false;
        inner.paused = false;
    }
}
