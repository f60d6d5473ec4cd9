pub mod retry;
pub mod types;

pub use retry::{execute, RetryPolicy, RetrySettings};
pub use types::{
    DocumentHandle, ExtensionsResponse, LoadOptions, LoadResponse, QuotaResponse,
    RecognizeOptions, RecognizeResponse, SaveResponse, ServiceFault, TransformOptions,
    TransformResponse,
};

use crate::error::TransportError;

/// The remote document-processing collaborator, treated as an opaque
/// synchronous RPC boundary. `Err(TransportError)` means the service could
/// not be reached (retried by the executor); a populated `error` field in a
/// response means the service refused the request (never retried).
pub trait DocumentService: Send + Sync {
    fn load(&self, payload: &[u8], options: &LoadOptions)
        -> Result<LoadResponse, TransportError>;

    fn transform(
        &self,
        handle: &DocumentHandle,
        options: &TransformOptions,
    ) -> Result<TransformResponse, TransportError>;

    fn recognize(
        &self,
        handle: &DocumentHandle,
        options: &RecognizeOptions,
    ) -> Result<RecognizeResponse, TransportError>;

    fn save(&self, handle: &DocumentHandle) -> Result<SaveResponse, TransportError>;

    /// Best-effort session cleanup; callers swallow errors.
    fn close(&self, handle: &DocumentHandle) -> Result<(), TransportError>;

    fn remaining_quota(&self) -> Result<QuotaResponse, TransportError>;

    fn supported_extensions(&self) -> Result<ExtensionsResponse, TransportError>;
}
