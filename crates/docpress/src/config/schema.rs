use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::output::ProductionRules;
use crate::pipeline::{OperationSpec, PipelineSpec};
use crate::service::{
    LoadOptions, RecognizeOptions, RetryPolicy, RetrySettings, TransformOptions,
};
use crate::worker::BatchSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub input_directory: String,
    pub destination_directory: String,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_input_size")]
    pub max_input_size: u64,
    #[serde(default)]
    pub production: ProductionRules,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub credentials: Credentials,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_max_input_size() -> u64 {
    512 * 1024 * 1024
}

impl Config {
    /// Everything `BatchController::start` needs, minus the queue contents.
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            worker_count: self.worker_count,
            pipeline: Arc::new(self.pipeline.to_spec()),
            destination: PathBuf::from(&self.destination_directory),
            rules: self.production,
            max_input_size: self.max_input_size,
            retry: self.retry.to_settings(),
        }
    }
}

/// Account credentials for the remote service. The engine never reads
/// these; the embedding application hands them to its `DocumentService`
/// implementation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub api_key: String,
}

/// Declarative pipeline shape. A run always loads first and saves last;
/// transform and recognize slot in between when configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_target_format")]
    pub target_format: String,
    #[serde(default)]
    pub output_version: Option<String>,
    #[serde(default)]
    pub precompress_upload: bool,
    #[serde(default)]
    pub transform: Option<TransformOptions>,
    #[serde(default)]
    pub recognize: Option<RecognizeOptions>,
}

fn default_target_format() -> String {
    "pdf".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_format: default_target_format(),
            output_version: None,
            precompress_upload: false,
            transform: Some(TransformOptions::default()),
            recognize: None,
        }
    }
}

impl PipelineConfig {
    pub fn to_spec(&self) -> PipelineSpec {
        let mut operations = vec![OperationSpec::Load(LoadOptions {
            target_format: self.target_format.clone(),
            output_version: self.output_version.clone(),
            precompress_upload: self.precompress_upload,
        })];
        if let Some(transform) = &self.transform {
            operations.push(OperationSpec::Transform(transform.clone()));
        }
        if let Some(recognize) = &self.recognize {
            operations.push(OperationSpec::Recognize(recognize.clone()));
        }
        operations.push(OperationSpec::Save);

        PipelineSpec::new(operations, self.target_format.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub upload: Option<RetryPolicyConfig>,
    #[serde(default)]
    pub operation: Option<RetryPolicyConfig>,
    #[serde(default)]
    pub download: Option<RetryPolicyConfig>,
    #[serde(default)]
    pub metadata: Option<RetryPolicyConfig>,
}

impl RetryConfig {
    /// Per-category defaults, overridden where the config says so.
    pub fn to_settings(&self) -> RetrySettings {
        let defaults = RetrySettings::default();
        RetrySettings {
            upload: self
                .upload
                .as_ref()
                .map_or(defaults.upload, RetryPolicyConfig::to_policy),
            operation: self
                .operation
                .as_ref()
                .map_or(defaults.operation, RetryPolicyConfig::to_policy),
            download: self
                .download
                .as_ref()
                .map_or(defaults.download, RetryPolicyConfig::to_policy),
            metadata: self
                .metadata
                .as_ref()
                .map_or(defaults.metadata, RetryPolicyConfig::to_policy),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicyConfig {
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_ms")]
    pub backoff_increment_ms: u64,
}

fn default_backoff_ms() -> u64 {
    500
}

impl RetryPolicyConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            backoff_increment: Duration::from_millis(self.backoff_increment_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_builds_load_first_save_last() {
        let config = PipelineConfig {
            recognize: Some(RecognizeOptions::default()),
            ..Default::default()
        };
        let spec = config.to_spec();

        assert!(matches!(spec.operations.first(), Some(OperationSpec::Load(_))));
        assert!(matches!(spec.operations.last(), Some(OperationSpec::Save)));
        assert_eq!(spec.operations.len(), 4);
        assert!(spec.reduction_oriented());
    }

    #[test]
    fn test_retry_overrides_fall_back_to_defaults() {
        let retry = RetryConfig {
            upload: Some(RetryPolicyConfig {
                max_attempts: 7,
                initial_backoff_ms: 100,
                backoff_increment_ms: 100,
            }),
            ..Default::default()
        };
        let settings = retry.to_settings();

        assert_eq!(settings.upload.max_attempts, 7);
        assert_eq!(settings.operation, RetryPolicy::OPERATION);
        assert_eq!(settings.metadata, RetryPolicy::METADATA);
    }
}
