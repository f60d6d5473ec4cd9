use serde::{Deserialize, Serialize};

use crate::service::{LoadOptions, RecognizeOptions, TransformOptions};

/// The remote stages a file can pass through, in the order the service
/// expects them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Load,
    Transform,
    Recognize,
    Save,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Transform => "transform",
            Stage::Recognize => "recognize",
            Stage::Save => "save",
        };
        f.write_str(name)
    }
}

/// One configured remote operation with its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OperationSpec {
    Load(LoadOptions),
    Transform(TransformOptions),
    Recognize(RecognizeOptions),
    Save,
}

impl OperationSpec {
    pub fn stage(&self) -> Stage {
        match self {
            OperationSpec::Load(_) => Stage::Load,
            OperationSpec::Transform(_) => Stage::Transform,
            OperationSpec::Recognize(_) => Stage::Recognize,
            OperationSpec::Save => Stage::Save,
        }
    }
}

/// The ordered sequence of remote operations applied to every file in a
/// batch. Fixed for the whole run.
#[derive(Debug, Clone)]
pub struct PipelineSpec {
    pub operations: Vec<OperationSpec>,
    /// Format the batch converts into; drives the destination extension and
    /// the "was already in target format" check.
    pub target_format: String,
}

impl PipelineSpec {
    pub fn new(operations: Vec<OperationSpec>, target_format: impl Into<String>) -> Self {
        Self {
            operations,
            target_format: target_format.into(),
        }
    }

    /// A pipeline with a transform step exists to shrink documents; the
    /// output decision compares sizes for these. Pipelines without one
    /// (e.g. pure format conversion or recognition) always keep the
    /// produced artifact.
    pub fn reduction_oriented(&self) -> bool {
        self.operations
            .iter()
            .any(|op| matches!(op, OperationSpec::Transform(_)))
    }
}
