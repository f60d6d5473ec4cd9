use std::path::PathBuf;

use thiserror::Error;

use crate::error::TransportError;
use crate::pipeline::spec::Stage;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Embedded error object in a well-formed response. Aborts the file,
    /// never retried.
    #[error("Service rejected {stage}: {message}")]
    ServiceFault { stage: Stage, message: String },

    /// Well-formed transport, nonsensical payload (missing handle, empty
    /// produced bytes). Distinct from a service rejection.
    #[error("Protocol error during {stage}: {detail}")]
    Protocol { stage: Stage, detail: String },

    /// Transport failure that survived the whole retry budget.
    #[error("{stage} failed after {attempts} attempts: {source}")]
    Transport {
        stage: Stage,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("Failed to read input '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to compress upload stream for '{path}': {source}")]
    CompressUpload {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
