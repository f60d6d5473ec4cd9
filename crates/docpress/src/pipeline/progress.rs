use crossbeam_channel::Sender;

use crate::pipeline::spec::Stage;

/// Events emitted by the engine during a batch run. This is the only way
/// failures and progress leave the worker pool; worker threads never halt
/// on a per-file error.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    /// A remote call is about to run (attempt 1) or be retried (attempt > 1).
    StageProgress {
        worker_id: usize,
        file: String,
        stage: Stage,
        attempt: u32,
    },
    /// Remaining usage allowance reported by the service after a call.
    QuotaRemaining { quota: i64 },
    Warning {
        file: String,
        message: String,
    },
    FileCompleted {
        worker_id: usize,
        file: String,
        input_size: u64,
        output_size: u64,
        converted: bool,
    },
    /// Human-readable per-file failure; the worker moves on to the next task.
    FileFailed {
        worker_id: usize,
        file: String,
        message: String,
    },
    WorkerPaused { worker_id: usize },
    WorkerFinished { worker_id: usize },
}

pub trait BatchObserver: Send + Sync {
    fn notify(&self, event: BatchEvent);
}

/// No-op observer for unit tests.
pub struct NoopObserver;

impl BatchObserver for NoopObserver {
    fn notify(&self, _event: BatchEvent) {}
}

/// Bridges engine events to a channel for the embedding application.
/// Send failures are ignored — a departed receiver must not stall workers.
pub struct ChannelObserver {
    sender: Sender<BatchEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<BatchEvent>) -> Self {
        Self { sender }
    }
}

impl BatchObserver for ChannelObserver {
    fn notify(&self, event: BatchEvent) {
        let _ = self.sender.send(event);
    }
}
