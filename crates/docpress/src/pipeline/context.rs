use crate::service::DocumentHandle;
use crate::worker::job::FileTask;

/// Mutable state threaded through the steps of one file's pipeline run.
pub struct PipelineContext {
    // Input
    pub task: FileTask,
    pub input_size: u64,

    // Set by the load step — Some for every later step
    pub handle: Option<DocumentHandle>,

    // Transform step results
    pub content_removed: bool,
    pub version_changed: bool,
    pub linearized: bool,

    // Save step result
    pub produced: Option<Vec<u8>>,

    // Non-fatal warnings accumulated across steps
    pub warnings: Vec<String>,
}

impl PipelineContext {
    pub fn new(task: FileTask, input_size: u64) -> Self {
        Self {
            task,
            input_size,
            handle: None,
            content_removed: false,
            version_changed: false,
            linearized: false,
            produced: None,
            warnings: Vec::new(),
        }
    }
}
