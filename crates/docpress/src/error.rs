use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocpressError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Service rejected request: {0}")]
    Service(#[from] crate::service::ServiceFault),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Failure reaching the remote service at all — retried by the executor.
/// Distinct from a `ServiceFault` embedded in a well-formed response,
/// which is never retried.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("i/o error during request: {0}")]
    Io(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write artifact '{path}': {source}")]
    WriteArtifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy original from '{from}' to '{to}': {source}")]
    CopyOriginal {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Artifact written but original '{path}' could not be deleted: {source}")]
    DeleteOriginal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to restore timestamps on '{path}': {source}")]
    PreserveTimestamps {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Input file is empty: {0}")]
    EmptyInput(PathBuf),

    #[error("Input file '{path}' is {size} bytes, over the {limit} byte limit")]
    InputTooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Failed to read input '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T> = std::result::Result<T, DocpressError>;
