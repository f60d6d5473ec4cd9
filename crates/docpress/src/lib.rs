pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod scanner;
pub mod service;
pub mod worker;

pub use config::{load_config, Config};
pub use error::{
    ConfigError, DocpressError, OutputError, Result, TransportError, WorkerError,
};
pub use output::{OutputDecision, OutputEngine, OutputReport, ProductionRules};
pub use pipeline::{
    BatchEvent, BatchObserver, ChannelObserver, NoopObserver, PipelineError, PipelineOutcome,
    PipelineResult, PipelineRunner, PipelineSpec,
};
pub use scanner::DirectoryScanner;
pub use service::{
    DocumentHandle, DocumentService, RetryPolicy, RetrySettings, ServiceFault,
};
pub use worker::{BatchController, BatchSettings, BatchState, FileTask, TaskPoll};
