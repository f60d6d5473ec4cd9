pub mod batch;
pub mod job;
pub mod pool;

pub use batch::{BatchState, TaskPoll};
pub use job::FileTask;
pub use pool::{BatchController, BatchSettings};

// Re-export crossbeam_channel so embedders can build event receivers
// without pinning the version themselves.
pub use crossbeam_channel;
