use std::path::{Path, PathBuf};

use filetime::FileTime;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::OutputError;
use crate::pipeline::PipelineResult;
use crate::worker::job::FileTask;

/// Policy controlling what happens to the original file after a successful
/// output. Fixed per batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProductionRules {
    #[serde(default)]
    pub delete_original_on_success: bool,
    #[serde(default)]
    pub preserve_timestamps: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDecision {
    KeepProduced,
    KeepOriginal,
}

#[derive(Debug, Clone)]
pub struct OutputReport {
    pub destination: PathBuf,
    pub output_size: u64,
    pub converted: bool,
    /// Set when the transform was a no-win and the original was kept.
    pub warning: Option<String>,
}

/// Decides whether a produced artifact replaces the original file and
/// performs the corresponding filesystem side effect. Runs entirely outside
/// the batch lock.
pub struct OutputEngine {
    destination_root: PathBuf,
    rules: ProductionRules,
    target_format: String,
    reduction_oriented: bool,
}

impl OutputEngine {
    pub fn new(
        destination_root: impl Into<PathBuf>,
        rules: ProductionRules,
        target_format: impl Into<String>,
        reduction_oriented: bool,
    ) -> Self {
        Self {
            destination_root: destination_root.into(),
            rules,
            target_format: target_format.into(),
            reduction_oriented,
        }
    }

    pub fn destination_for(&self, task: &FileTask) -> PathBuf {
        self.destination_root
            .join(&task.relative_path)
            .with_extension(&self.target_format)
    }

    /// For reduction-oriented pipelines the produced artifact wins only when
    /// it is smaller, structurally changed, linearized, or a format
    /// conversion; otherwise the transform was a no-win and the original is
    /// kept. Other pipelines always keep the produced artifact.
    pub fn decide(
        &self,
        result: &PipelineResult,
        original_size: u64,
        was_target_format: bool,
    ) -> OutputDecision {
        if !self.reduction_oriented {
            return OutputDecision::KeepProduced;
        }

        let produced_size = result.produced.len() as u64;
        if produced_size < original_size
            || result.linearized
            || result.content_removed
            || result.version_changed
            || !was_target_format
        {
            OutputDecision::KeepProduced
        } else {
            OutputDecision::KeepOriginal
        }
    }

    pub fn produce(
        &self,
        task: &FileTask,
        result: &PipelineResult,
        original_size: u64,
    ) -> Result<OutputReport, OutputError> {
        let destination = self.destination_for(task);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| OutputError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let was_target_format = task
            .extension()
            .map(|e| e.eq_ignore_ascii_case(&self.target_format))
            .unwrap_or(false);

        match self.decide(result, original_size, was_target_format) {
            OutputDecision::KeepProduced => {
                self.write_artifact(task, result, &destination, was_target_format)
            }
            OutputDecision::KeepOriginal => {
                self.keep_original(task, original_size, &destination)
            }
        }
    }

    fn write_artifact(
        &self,
        task: &FileTask,
        result: &PipelineResult,
        destination: &Path,
        was_target_format: bool,
    ) -> Result<OutputReport, OutputError> {
        std::fs::write(destination, &result.produced).map_err(|e| OutputError::WriteArtifact {
            path: destination.to_path_buf(),
            source: e,
        })?;
        debug!(
            "Wrote {} bytes to {}",
            result.produced.len(),
            destination.display()
        );

        if self.rules.delete_original_on_success && task.source_path != destination {
            // The artifact stays in place even when this fails; the caller
            // reports the deletion failure for this file.
            std::fs::remove_file(&task.source_path).map_err(|e| OutputError::DeleteOriginal {
                path: task.source_path.clone(),
                source: e,
            })?;
            debug!("Deleted original {}", task.source_path.display());
        }

        Ok(OutputReport {
            destination: destination.to_path_buf(),
            output_size: result.produced.len() as u64,
            converted: !was_target_format,
            warning: None,
        })
    }

    fn keep_original(
        &self,
        task: &FileTask,
        original_size: u64,
        destination: &Path,
    ) -> Result<OutputReport, OutputError> {
        if destination != task.source_path {
            std::fs::copy(&task.source_path, destination).map_err(|e| {
                OutputError::CopyOriginal {
                    from: task.source_path.clone(),
                    to: destination.to_path_buf(),
                    source: e,
                }
            })?;

            if self.rules.preserve_timestamps {
                let meta = std::fs::metadata(&task.source_path).map_err(|e| {
                    OutputError::PreserveTimestamps {
                        path: task.source_path.clone(),
                        source: e,
                    }
                })?;
                filetime::set_file_times(
                    destination,
                    FileTime::from_last_access_time(&meta),
                    FileTime::from_last_modification_time(&meta),
                )
                .map_err(|e| OutputError::PreserveTimestamps {
                    path: destination.to_path_buf(),
                    source: e,
                })?;
            }
        }

        debug!(
            "Kept original for {} (no win over {} bytes)",
            task.file_name(),
            original_size
        );

        Ok(OutputReport {
            destination: destination.to_path_buf(),
            output_size: original_size,
            converted: false,
            warning: Some(format!(
                "No size reduction achieved for '{}'; original copied unchanged",
                task.file_name()
            )),
        })
    }
}
