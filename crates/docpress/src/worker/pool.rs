use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use crate::error::{DocpressError, WorkerError};
use crate::output::{OutputEngine, ProductionRules};
use crate::pipeline::{
    BatchEvent, BatchObserver, PipelineContext, PipelineOutcome, PipelineRunner, PipelineSpec,
};
use crate::service::{retry, DocumentService, RetryPolicy, RetrySettings};
use crate::worker::batch::{BatchState, TaskPoll};
use crate::worker::job::FileTask;

const DEFAULT_MAX_INPUT_SIZE: u64 = 512 * 1024 * 1024;

/// Everything a run needs beyond the queue contents.
pub struct BatchSettings {
    pub worker_count: usize,
    pub pipeline: Arc<PipelineSpec>,
    pub destination: PathBuf,
    pub rules: ProductionRules,
    pub max_input_size: u64,
    pub retry: RetrySettings,
}

impl BatchSettings {
    pub fn new(pipeline: Arc<PipelineSpec>, destination: impl Into<PathBuf>) -> Self {
        Self {
            worker_count: num_cpus::get(),
            pipeline,
            destination: destination.into(),
            rules: ProductionRules::default(),
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            retry: RetrySettings::default(),
        }
    }
}

/// Owns the shared batch state and the worker threads for one run. Feed can
/// happen before or during the run; pause/resume/abort act on all workers
/// through the shared state.
pub struct BatchController {
    service: Arc<dyn DocumentService>,
    observer: Arc<dyn BatchObserver>,
    state: Arc<BatchState>,
    workers: Vec<JoinHandle<()>>,
}

impl BatchController {
    pub fn new(service: Arc<dyn DocumentService>, observer: Arc<dyn BatchObserver>) -> Self {
        Self {
            service,
            observer,
            state: Arc::new(BatchState::new()),
            workers: Vec::new(),
        }
    }

    /// Appends tasks to the shared queue; thread-safe at any point of a run.
    pub fn feed(&self, tasks: impl IntoIterator<Item = FileTask>) {
        self.state.feed(tasks);
    }

    pub fn pending(&self) -> usize {
        self.state.pending()
    }

    /// Clears cancellation and spawns the worker loops.
    ///
    /// # Panics
    /// Panics if `settings.worker_count` is 0.
    pub fn start(&mut self, settings: BatchSettings) {
        assert!(settings.worker_count > 0, "worker_count must be > 0");

        self.state.reset_flags();

        let engine = Arc::new(OutputEngine::new(
            settings.destination,
            settings.rules,
            settings.pipeline.target_format.clone(),
            settings.pipeline.reduction_oriented(),
        ));

        for worker_id in 0..settings.worker_count {
            let service = Arc::clone(&self.service);
            let state = Arc::clone(&self.state);
            let spec = Arc::clone(&settings.pipeline);
            let engine = Arc::clone(&engine);
            let observer = Arc::clone(&self.observer);
            let retry = settings.retry;
            let max_input_size = settings.max_input_size;

            let handle = std::thread::spawn(move || {
                run_worker(
                    worker_id,
                    service,
                    state,
                    spec,
                    engine,
                    retry,
                    max_input_size,
                    observer,
                );
            });
            self.workers.push(handle);
        }

        info!("Started {} workers", self.workers.len());
    }

    /// Closes the pause gate. Returns false when there is nothing left to
    /// suspend or the batch is already cancelled.
    pub fn pause_work(&self) -> bool {
        self.state.pause()
    }

    pub fn resume_work(&self) {
        self.state.resume();
    }

    /// Cancels the batch: drops pending tasks and force-resumes any paused
    /// worker so it can observe cancellation and exit. In-flight remote
    /// calls run to completion first; cancellation is cooperative.
    pub fn abort_work(&self) {
        self.state.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Asks the service how much allowance remains, retrying transport
    /// failures under `policy`. A known value is also surfaced as a
    /// [`BatchEvent::QuotaRemaining`] event.
    pub fn query_quota(&self, policy: RetryPolicy) -> Result<Option<i64>, DocpressError> {
        let response = retry::execute("remaining_quota", policy, |_| {}, || {
            self.service.remaining_quota()
        })?;
        if let Some(fault) = response.error {
            return Err(fault.into());
        }
        if let Some(quota) = response.quota {
            self.observer.notify(BatchEvent::QuotaRemaining { quota });
        }
        Ok(response.quota)
    }

    /// Joins all workers of the current run.
    pub fn wait(&mut self) {
        for (i, worker) in self.workers.drain(..).enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }
        info!("All workers have stopped");
    }
}

/// Rejects inputs no remote call should ever see.
fn validate_input(task: &FileTask, limit: u64) -> Result<u64, WorkerError> {
    let meta = std::fs::metadata(&task.source_path).map_err(|e| WorkerError::ReadInput {
        path: task.source_path.clone(),
        source: e,
    })?;
    let size = meta.len();
    if size == 0 {
        return Err(WorkerError::EmptyInput(task.source_path.clone()));
    }
    if size > limit {
        return Err(WorkerError::InputTooLarge {
            path: task.source_path.clone(),
            size,
            limit,
        });
    }
    Ok(size)
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    worker_id: usize,
    service: Arc<dyn DocumentService>,
    state: Arc<BatchState>,
    spec: Arc<PipelineSpec>,
    engine: Arc<OutputEngine>,
    retry: RetrySettings,
    max_input_size: u64,
    observer: Arc<dyn BatchObserver>,
) {
    debug!("Worker {} started", worker_id);

    let runner = PipelineRunner::new(service, spec, retry);

    loop {
        // Gate check and pop share one critical section: once a pause has
        // been accepted, no task can leave the queue until resume.
        let task = match state.poll_task() {
            TaskPoll::Paused => {
                observer.notify(BatchEvent::WorkerPaused { worker_id });
                state.wait_if_paused();
                continue;
            }
            TaskPoll::Cancelled => {
                debug!("Worker {} observed cancellation", worker_id);
                break;
            }
            TaskPoll::Drained => {
                debug!("Worker {} drained the queue", worker_id);
                observer.notify(BatchEvent::WorkerFinished { worker_id });
                break;
            }
            TaskPoll::Task(task) => task,
        };

        let file = task.file_name();
        debug!("Worker {} processing {}", worker_id, file);

        let input_size = match validate_input(&task, max_input_size) {
            Ok(size) => size,
            Err(e) => {
                warn!("Worker {} rejected {}: {}", worker_id, file, e);
                observer.notify(BatchEvent::FileFailed {
                    worker_id,
                    file,
                    message: e.to_string(),
                });
                continue;
            }
        };

        let mut ctx = PipelineContext::new(task, input_size);
        match runner.run(&mut ctx, worker_id, &|| state.is_cancelled(), observer.as_ref()) {
            PipelineOutcome::Aborted => {
                debug!("Worker {} dropped {} mid-pipeline", worker_id, file);
            }
            PipelineOutcome::Failed(e) => {
                observer.notify(BatchEvent::FileFailed {
                    worker_id,
                    file,
                    message: e.to_string(),
                });
            }
            PipelineOutcome::Completed(result) => {
                for message in &result.warnings {
                    observer.notify(BatchEvent::Warning {
                        file: file.clone(),
                        message: message.clone(),
                    });
                }
                match engine.produce(&ctx.task, &result, ctx.input_size) {
                    Ok(report) => {
                        if let Some(message) = report.warning {
                            observer.notify(BatchEvent::Warning {
                                file: file.clone(),
                                message,
                            });
                        }
                        observer.notify(BatchEvent::FileCompleted {
                            worker_id,
                            file,
                            input_size: ctx.input_size,
                            output_size: report.output_size,
                            converted: report.converted,
                        });
                    }
                    Err(e) => {
                        error!("Worker {} output stage failed for {}: {}", worker_id, file, e);
                        observer.notify(BatchEvent::FileFailed {
                            worker_id,
                            file,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::pipeline::{ChannelObserver, OperationSpec};
    use crate::service::{
        DocumentHandle, ExtensionsResponse, LoadOptions, LoadResponse, QuotaResponse,
        RecognizeOptions, RecognizeResponse, SaveResponse, ServiceFault, TransformOptions,
        TransformResponse,
    };
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct StubService {
        load_delay: Duration,
        payload: Vec<u8>,
        quota: Option<i64>,
        quota_transport_failures: AtomicU32,
        quota_fault: Option<ServiceFault>,
    }

    impl Default for StubService {
        fn default() -> Self {
            Self {
                load_delay: Duration::ZERO,
                payload: b"small".to_vec(),
                quota: None,
                quota_transport_failures: AtomicU32::new(0),
                quota_fault: None,
            }
        }
    }

    impl StubService {
        fn instant(payload: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                payload: payload.to_vec(),
                ..Self::default()
            })
        }

        fn slow(payload: &[u8], load_delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                load_delay,
                payload: payload.to_vec(),
                ..Self::default()
            })
        }

        fn with_quota(quota: i64, transport_failures: u32) -> Arc<Self> {
            Arc::new(Self {
                quota: Some(quota),
                quota_transport_failures: AtomicU32::new(transport_failures),
                ..Self::default()
            })
        }
    }

    impl DocumentService for StubService {
        fn load(
            &self,
            _payload: &[u8],
            _options: &LoadOptions,
        ) -> Result<LoadResponse, TransportError> {
            if !self.load_delay.is_zero() {
                std::thread::sleep(self.load_delay);
            }
            Ok(LoadResponse {
                handle: Some(DocumentHandle::new("h")),
                quota: None,
                error: None,
            })
        }

        fn transform(
            &self,
            _handle: &DocumentHandle,
            _options: &TransformOptions,
        ) -> Result<TransformResponse, TransportError> {
            Ok(TransformResponse::default())
        }

        fn recognize(
            &self,
            _handle: &DocumentHandle,
            _options: &RecognizeOptions,
        ) -> Result<RecognizeResponse, TransportError> {
            Ok(RecognizeResponse::default())
        }

        fn save(&self, _handle: &DocumentHandle) -> Result<SaveResponse, TransportError> {
            Ok(SaveResponse {
                bytes: self.payload.clone(),
                quota: None,
                error: None,
            })
        }

        fn close(&self, _handle: &DocumentHandle) -> Result<(), TransportError> {
            Ok(())
        }

        fn remaining_quota(&self) -> Result<QuotaResponse, TransportError> {
            let failed = self
                .quota_transport_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(TransportError::Timeout(100));
            }
            Ok(QuotaResponse {
                quota: self.quota,
                error: self.quota_fault.clone(),
            })
        }

        fn supported_extensions(&self) -> Result<ExtensionsResponse, TransportError> {
            Ok(ExtensionsResponse::default())
        }
    }

    fn spec() -> Arc<PipelineSpec> {
        Arc::new(PipelineSpec::new(
            vec![
                OperationSpec::Load(LoadOptions::default()),
                OperationSpec::Transform(TransformOptions::default()),
                OperationSpec::Save,
            ],
            "pdf",
        ))
    }

    fn write_inputs(dir: &Path, count: usize, size: usize) -> Vec<FileTask> {
        (0..count)
            .map(|i| {
                let name = format!("doc{}.pdf", i);
                let path = dir.join(&name);
                std::fs::write(&path, vec![1u8; size]).unwrap();
                FileTask::new(path, name)
            })
            .collect()
    }

    fn settings(pipeline: Arc<PipelineSpec>, destination: &Path, workers: usize) -> BatchSettings {
        BatchSettings {
            worker_count: workers,
            ..BatchSettings::new(pipeline, destination)
        }
    }

    fn collect(rx: &crossbeam_channel::Receiver<BatchEvent>) -> Vec<BatchEvent> {
        rx.try_iter().collect()
    }

    fn completed_files(events: &[BatchEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::FileCompleted { file, .. } => Some(file.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_worker_drains_every_task_exactly_once() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(&input).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = BatchController::new(
            StubService::instant(b"small"),
            Arc::new(ChannelObserver::new(tx)),
        );
        controller.feed(write_inputs(&input, 5, 100));
        controller.start(settings(spec(), &output, 1));
        controller.wait();

        let events = collect(&rx);
        let mut files = completed_files(&events);
        files.sort();
        assert_eq!(files.len(), 5, "one completion per task");
        files.dedup();
        assert_eq!(files.len(), 5, "no duplicates");
        for event in &events {
            if let BatchEvent::FileCompleted {
                input_size,
                output_size,
                ..
            } = event
            {
                assert_eq!(*input_size, 100);
                assert_eq!(*output_size, 5);
            }
        }
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, BatchEvent::WorkerFinished { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_multiple_workers_complete_the_batch() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(&input).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = BatchController::new(
            StubService::instant(b"small"),
            Arc::new(ChannelObserver::new(tx)),
        );
        controller.feed(write_inputs(&input, 12, 100));
        controller.start(settings(spec(), &output, 4));
        controller.wait();

        let events = collect(&rx);
        assert_eq!(completed_files(&events).len(), 12);
        assert_eq!(controller.pending(), 0);
        for i in 0..12 {
            assert!(output.join(format!("doc{}.pdf", i)).exists());
        }
    }

    #[test]
    fn test_invalid_inputs_are_reported_and_skipped() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(&input).unwrap();

        let mut tasks = write_inputs(&input, 1, 100);
        let empty = input.join("empty.pdf");
        std::fs::write(&empty, b"").unwrap();
        tasks.push(FileTask::new(&empty, "empty.pdf"));
        let huge = input.join("huge.pdf");
        std::fs::write(&huge, vec![1u8; 300]).unwrap();
        tasks.push(FileTask::new(&huge, "huge.pdf"));

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = BatchController::new(
            StubService::instant(b"small"),
            Arc::new(ChannelObserver::new(tx)),
        );
        controller.feed(tasks);
        let mut s = settings(spec(), &output, 1);
        s.max_input_size = 200;
        controller.start(s);
        controller.wait();

        let events = collect(&rx);
        assert_eq!(completed_files(&events), vec!["doc0.pdf".to_string()]);

        let failed: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::FileFailed { file, .. } => Some(file.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec!["empty.pdf".to_string(), "huge.pdf".to_string()]);

        // The worker survived both rejects and drained the queue.
        assert!(events
            .iter()
            .any(|e| matches!(e, BatchEvent::WorkerFinished { .. })));
    }

    #[test]
    fn test_pause_blocks_new_tasks_until_resume() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(&input).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = BatchController::new(
            StubService::slow(b"small", Duration::from_millis(80)),
            Arc::new(ChannelObserver::new(tx)),
        );
        controller.feed(write_inputs(&input, 5, 100));
        controller.start(settings(spec(), &output, 1));

        // Worker is inside file 1's load when we pause.
        std::thread::sleep(Duration::from_millis(20));
        assert!(controller.pause_work());

        // File 1 finishes, then the worker parks; nothing else is taken.
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(controller.pending(), 4);
        let events = collect(&rx);
        assert_eq!(completed_files(&events).len(), 1);
        assert!(events
            .iter()
            .any(|e| matches!(e, BatchEvent::WorkerPaused { .. })));

        controller.resume_work();
        controller.wait();
        assert_eq!(completed_files(&collect(&rx)).len(), 4);
        assert_eq!(controller.pending(), 0);
    }

    #[test]
    fn test_pause_refused_with_nothing_pending() {
        let controller = BatchController::new(
            StubService::instant(b"small"),
            Arc::new(crate::pipeline::NoopObserver),
        );
        assert!(!controller.pause_work());
    }

    #[test]
    fn test_abort_empties_queue_and_stops_workers() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(&input).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = BatchController::new(
            StubService::slow(b"small", Duration::from_millis(50)),
            Arc::new(ChannelObserver::new(tx)),
        );
        controller.feed(write_inputs(&input, 10, 100));
        controller.start(settings(spec(), &output, 1));

        std::thread::sleep(Duration::from_millis(20));
        controller.abort_work();
        controller.abort_work(); // idempotent
        controller.wait();

        assert_eq!(controller.pending(), 0);
        assert!(controller.is_cancelled());

        let events = collect(&rx);
        // At most the in-flight file completed; the rest were dropped, and
        // cancellation itself produced no per-file events.
        assert!(completed_files(&events).len() <= 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, BatchEvent::WorkerFinished { .. })));
        assert!(!controller.pause_work(), "pause refused after abort");
    }

    #[test]
    fn test_aborted_paused_worker_terminates() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(&input).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = BatchController::new(
            StubService::slow(b"small", Duration::from_millis(40)),
            Arc::new(ChannelObserver::new(tx)),
        );
        controller.feed(write_inputs(&input, 4, 100));
        controller.start(settings(spec(), &output, 1));

        std::thread::sleep(Duration::from_millis(10));
        assert!(controller.pause_work());
        std::thread::sleep(Duration::from_millis(150));

        controller.abort_work();
        controller.wait();

        let events = collect(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, BatchEvent::WorkerPaused { .. })));
        assert!(completed_files(&events).len() <= 1);
        assert_eq!(controller.pending(), 0);
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            backoff_increment: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_query_quota_emits_event() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let controller = BatchController::new(
            StubService::with_quota(17, 0),
            Arc::new(ChannelObserver::new(tx)),
        );

        assert_eq!(controller.query_quota(quick_policy()).unwrap(), Some(17));
        assert!(collect(&rx)
            .iter()
            .any(|e| matches!(e, BatchEvent::QuotaRemaining { quota: 17 })));
    }

    #[test]
    fn test_query_quota_retries_transport_failures() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let controller = BatchController::new(
            StubService::with_quota(3, 1),
            Arc::new(ChannelObserver::new(tx)),
        );

        assert_eq!(controller.query_quota(quick_policy()).unwrap(), Some(3));
        assert!(collect(&rx)
            .iter()
            .any(|e| matches!(e, BatchEvent::QuotaRemaining { quota: 3 })));
    }

    #[test]
    fn test_query_quota_surfaces_fault_without_event() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let service = Arc::new(StubService {
            quota_fault: Some(ServiceFault::new(402, "quota exhausted")),
            ..StubService::default()
        });
        let controller = BatchController::new(service, Arc::new(ChannelObserver::new(tx)));

        let err = controller.query_quota(quick_policy()).unwrap_err();
        assert!(matches!(err, DocpressError::Service(_)));
        assert!(collect(&rx).is_empty());
    }

    #[test]
    fn test_feed_during_run_extends_the_batch() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        std::fs::create_dir_all(&input).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded();
        let mut controller = BatchController::new(
            StubService::slow(b"small", Duration::from_millis(30)),
            Arc::new(ChannelObserver::new(tx)),
        );
        controller.feed(write_inputs(&input, 2, 100));
        controller.start(settings(spec(), &output, 1));

        std::thread::sleep(Duration::from_millis(10));
        let late: Vec<FileTask> = {
            let name = "late.pdf";
            let path = input.join(name);
            std::fs::write(&path, vec![1u8; 100]).unwrap();
            vec![FileTask::new(path, name)]
        };
        controller.feed(late);
        controller.wait();

        let mut files = completed_files(&collect(&rx));
        files.sort();
        assert_eq!(files, vec!["doc0.pdf", "doc1.pdf", "late.pdf"]);
    }
}
