use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque per-file session identifier issued by the remote service after a
/// successful load. Scoped to the pipeline invocation that created it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentHandle(String);

impl DocumentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Service-level rejection embedded in an otherwise well-formed response.
/// Never retried — the service answered, and the answer was "no".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code})")]
pub struct ServiceFault {
    pub code: i32,
    pub message: String,
}

impl ServiceFault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadResponse {
    pub handle: Option<DocumentHandle>,
    pub quota: Option<i64>,
    pub error: Option<ServiceFault>,
}

#[derive(Debug, Clone, Default)]
pub struct TransformResponse {
    pub warnings: Vec<String>,
    pub content_removed: bool,
    pub version_changed: bool,
    pub quota: Option<i64>,
    pub error: Option<ServiceFault>,
}

#[derive(Debug, Clone, Default)]
pub struct RecognizeResponse {
    pub quota: Option<i64>,
    pub error: Option<ServiceFault>,
}

#[derive(Debug, Clone, Default)]
pub struct SaveResponse {
    pub bytes: Vec<u8>,
    pub quota: Option<i64>,
    pub error: Option<ServiceFault>,
}

#[derive(Debug, Clone, Default)]
pub struct QuotaResponse {
    pub quota: Option<i64>,
    pub error: Option<ServiceFault>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtensionsResponse {
    pub extensions: Vec<String>,
    pub error: Option<ServiceFault>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadOptions {
    /// Format the service should convert into (e.g. "pdf").
    pub target_format: String,
    /// Output format version requested from the service, if any.
    #[serde(default)]
    pub output_version: Option<String>,
    /// Compress the upload stream before sending it over the wire.
    #[serde(default)]
    pub precompress_upload: bool,
}

impl LoadOptions {
    /// Content encoding the service should expect for the upload payload.
    pub fn content_encoding(&self) -> &'static str {
        if self.precompress_upload {
            "zstd"
        } else {
            "identity"
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            target_format: "pdf".to_string(),
            output_version: None,
            precompress_upload: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformOptions {
    /// Image quality knob, 1..=100.
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,
    /// Downsample embedded images to this DPI, if set.
    #[serde(default)]
    pub downsample_dpi: Option<u32>,
    /// Request web-optimized (linearized) output layout.
    #[serde(default)]
    pub linearize: bool,
    /// Strip document metadata during the transform.
    #[serde(default)]
    pub remove_metadata: bool,
}

fn default_image_quality() -> u8 {
    75
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            image_quality: default_image_quality(),
            downsample_dpi: None,
            linearize: false,
            remove_metadata: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeOptions {
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,
    /// Page range in service syntax (e.g. "1-5"), all pages when unset.
    #[serde(default)]
    pub page_range: Option<String>,
}

fn default_languages() -> Vec<String> {
    vec!["eng".to_string()]
}

impl Default for RecognizeOptions {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            page_range: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_encoding_follows_precompression() {
        let mut opts = LoadOptions::default();
        assert_eq!(opts.content_encoding(), "identity");

        opts.precompress_upload = true;
        assert_eq!(opts.content_encoding(), "zstd");
    }
}
