pub mod context;
pub mod error;
pub mod progress;
pub mod runner;
pub mod spec;

pub use context::PipelineContext;
pub use error::PipelineError;
pub use progress::{BatchEvent, BatchObserver, ChannelObserver, NoopObserver};
pub use runner::{PipelineOutcome, PipelineResult, PipelineRunner, StepOutcome};
pub use spec::{OperationSpec, PipelineSpec, Stage};
