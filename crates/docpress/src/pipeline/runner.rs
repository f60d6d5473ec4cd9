use std::sync::Arc;

use log::debug;
use tracing::info_span;

use crate::pipeline::context::PipelineContext;
use crate::pipeline::error::PipelineError;
use crate::pipeline::progress::{BatchEvent, BatchObserver};
use crate::pipeline::spec::{OperationSpec, PipelineSpec, Stage};
use crate::service::{
    retry, DocumentHandle, DocumentService, LoadOptions, RecognizeOptions, RetrySettings,
    TransformOptions,
};

/// The result of one executor call as interpreted by the runner.
pub struct StepOutcome {
    pub remaining_quota: Option<i64>,
    pub produced: Option<Vec<u8>>,
    pub warnings: Vec<String>,
}

/// Aggregate over all steps for one file.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub content_removed: bool,
    pub version_changed: bool,
    pub linearized: bool,
    pub produced: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Terminal state of one file's pipeline run. `Aborted` means cancellation
/// was observed between steps — not an error, and no per-file event follows.
/// A completed run that produced nothing is reported as a protocol error at
/// the save stage, never as `Aborted`.
pub enum PipelineOutcome {
    Completed(PipelineResult),
    Failed(PipelineError),
    Aborted,
}

/// Runs the configured operation sequence for one file, threading the
/// remote document handle between steps.
pub struct PipelineRunner {
    service: Arc<dyn DocumentService>,
    spec: Arc<PipelineSpec>,
    retry: RetrySettings,
}

impl PipelineRunner {
    pub fn new(
        service: Arc<dyn DocumentService>,
        spec: Arc<PipelineSpec>,
        retry: RetrySettings,
    ) -> Self {
        Self {
            service,
            spec,
            retry,
        }
    }

    pub fn run(
        &self,
        ctx: &mut PipelineContext,
        worker_id: usize,
        is_cancelled: &dyn Fn() -> bool,
        observer: &dyn BatchObserver,
    ) -> PipelineOutcome {
        let file = ctx.task.file_name();
        let _pipeline_span = info_span!("pipeline", file = %file).entered();

        for op in &self.spec.operations {
            if is_cancelled() {
                debug!("Cancelled before {} step of {}", op.stage(), file);
                self.release_handle(ctx);
                return PipelineOutcome::Aborted;
            }

            let step = {
                let _step_span = info_span!("step", stage = %op.stage()).entered();
                match op {
                    OperationSpec::Load(opts) => {
                        self.step_load(ctx, opts, worker_id, &file, observer)
                    }
                    OperationSpec::Transform(opts) => {
                        self.step_transform(ctx, opts, worker_id, &file, observer)
                    }
                    OperationSpec::Recognize(opts) => {
                        self.step_recognize(ctx, opts, worker_id, &file, observer)
                    }
                    OperationSpec::Save => self.step_save(ctx, worker_id, &file, observer),
                }
            };

            match step {
                Ok(outcome) => {
                    if let Some(quota) = outcome.remaining_quota {
                        observer.notify(BatchEvent::QuotaRemaining { quota });
                    }
                    ctx.warnings.extend(outcome.warnings);
                    if let Some(bytes) = outcome.produced {
                        ctx.produced = Some(bytes);
                    }
                }
                Err(e) => {
                    self.release_handle(ctx);
                    return PipelineOutcome::Failed(e);
                }
            }
        }

        self.release_handle(ctx);

        PipelineOutcome::Completed(PipelineResult {
            content_removed: ctx.content_removed,
            version_changed: ctx.version_changed,
            linearized: ctx.linearized,
            produced: ctx.produced.take().unwrap_or_default(),
            warnings: std::mem::take(&mut ctx.warnings),
        })
    }

    fn step_load(
        &self,
        ctx: &mut PipelineContext,
        opts: &LoadOptions,
        worker_id: usize,
        file: &str,
        observer: &dyn BatchObserver,
    ) -> Result<StepOutcome, PipelineError> {
        let bytes =
            std::fs::read(&ctx.task.source_path).map_err(|e| PipelineError::ReadInput {
                path: ctx.task.source_path.clone(),
                source: e,
            })?;

        let payload = if opts.precompress_upload {
            zstd::encode_all(bytes.as_slice(), 3).map_err(|e| PipelineError::CompressUpload {
                path: ctx.task.source_path.clone(),
                source: e,
            })?
        } else {
            bytes
        };
        debug!(
            "Uploading {} ({} bytes, {} encoding)",
            file,
            payload.len(),
            opts.content_encoding()
        );

        let policy = self.retry.upload;
        let response = retry::execute(
            "load",
            policy,
            |attempt| {
                observer.notify(BatchEvent::StageProgress {
                    worker_id,
                    file: file.to_string(),
                    stage: Stage::Load,
                    attempt,
                });
            },
            || self.service.load(&payload, opts),
        )
        .map_err(|source| PipelineError::Transport {
            stage: Stage::Load,
            attempts: policy.max_attempts,
            source,
        })?;

        if let Some(fault) = response.error {
            return Err(PipelineError::ServiceFault {
                stage: Stage::Load,
                message: fault.to_string(),
            });
        }

        let handle = response.handle.ok_or_else(|| PipelineError::Protocol {
            stage: Stage::Load,
            detail: "response carried no document handle".to_string(),
        })?;
        ctx.handle = Some(handle);

        Ok(StepOutcome {
            remaining_quota: response.quota,
            produced: None,
            warnings: Vec::new(),
        })
    }

    fn step_transform(
        &self,
        ctx: &mut PipelineContext,
        opts: &TransformOptions,
        worker_id: usize,
        file: &str,
        observer: &dyn BatchObserver,
    ) -> Result<StepOutcome, PipelineError> {
        let handle = self.open_handle(ctx, Stage::Transform)?;

        let policy = self.retry.operation;
        let response = retry::execute(
            "transform",
            policy,
            |attempt| {
                observer.notify(BatchEvent::StageProgress {
                    worker_id,
                    file: file.to_string(),
                    stage: Stage::Transform,
                    attempt,
                });
            },
            || self.service.transform(&handle, opts),
        )
        .map_err(|source| PipelineError::Transport {
            stage: Stage::Transform,
            attempts: policy.max_attempts,
            source,
        })?;

        if let Some(fault) = response.error {
            return Err(PipelineError::ServiceFault {
                stage: Stage::Transform,
                message: fault.to_string(),
            });
        }

        ctx.content_removed |= response.content_removed;
        ctx.version_changed |= response.version_changed;
        ctx.linearized |= opts.linearize;

        Ok(StepOutcome {
            remaining_quota: response.quota,
            produced: None,
            warnings: response.warnings,
        })
    }

    fn step_recognize(
        &self,
        ctx: &mut PipelineContext,
        opts: &RecognizeOptions,
        worker_id: usize,
        file: &str,
        observer: &dyn BatchObserver,
    ) -> Result<StepOutcome, PipelineError> {
        let handle = self.open_handle(ctx, Stage::Recognize)?;

        let policy = self.retry.operation;
        let response = retry::execute(
            "recognize",
            policy,
            |attempt| {
                observer.notify(BatchEvent::StageProgress {
                    worker_id,
                    file: file.to_string(),
                    stage: Stage::Recognize,
                    attempt,
                });
            },
            || self.service.recognize(&handle, opts),
        )
        .map_err(|source| PipelineError::Transport {
            stage: Stage::Recognize,
            attempts: policy.max_attempts,
            source,
        })?;

        if let Some(fault) = response.error {
            return Err(PipelineError::ServiceFault {
                stage: Stage::Recognize,
                message: fault.to_string(),
            });
        }

        Ok(StepOutcome {
            remaining_quota: response.quota,
            produced: None,
            warnings: Vec::new(),
        })
    }

    fn step_save(
        &self,
        ctx: &mut PipelineContext,
        worker_id: usize,
        file: &str,
        observer: &dyn BatchObserver,
    ) -> Result<StepOutcome, PipelineError> {
        let handle = self.open_handle(ctx, Stage::Save)?;

        let policy = self.retry.download;
        let response = retry::execute(
            "save",
            policy,
            |attempt| {
                observer.notify(BatchEvent::StageProgress {
                    worker_id,
                    file: file.to_string(),
                    stage: Stage::Save,
                    attempt,
                });
            },
            || self.service.save(&handle),
        )
        .map_err(|source| PipelineError::Transport {
            stage: Stage::Save,
            attempts: policy.max_attempts,
            source,
        })?;

        if let Some(fault) = response.error {
            return Err(PipelineError::ServiceFault {
                stage: Stage::Save,
                message: fault.to_string(),
            });
        }

        if response.bytes.is_empty() {
            return Err(PipelineError::Protocol {
                stage: Stage::Save,
                detail: "service returned an empty document payload".to_string(),
            });
        }

        Ok(StepOutcome {
            remaining_quota: response.quota,
            produced: Some(response.bytes),
            warnings: Vec::new(),
        })
    }

    fn open_handle(
        &self,
        ctx: &PipelineContext,
        stage: Stage,
    ) -> Result<DocumentHandle, PipelineError> {
        ctx.handle.clone().ok_or_else(|| PipelineError::Protocol {
            stage,
            detail: "no document loaded".to_string(),
        })
    }

    /// Advisory cleanup: the close call runs on a detached thread and any
    /// failure is swallowed. Deliberately non-blocking.
    fn release_handle(&self, ctx: &mut PipelineContext) {
        if let Some(handle) = ctx.handle.take() {
            let service = Arc::clone(&self.service);
            std::thread::spawn(move || {
                if let Err(e) = service.close(&handle) {
                    debug!("Ignoring close failure for handle {}: {}", handle, e);
                }
            });
        }
    }
}
