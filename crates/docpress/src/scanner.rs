use std::path::{Path, PathBuf};

use log::{debug, info};
use walkdir::WalkDir;

use crate::error::{DocpressError, WorkerError};
use crate::service::{retry, DocumentService, RetryPolicy};
use crate::worker::job::FileTask;

/// Discovers batch work on disk: walks the input directory and turns every
/// file with an accepted extension into a `FileTask`, preserving its
/// position relative to the root.
pub struct DirectoryScanner {
    input_directory: PathBuf,
}

impl DirectoryScanner {
    pub fn new<P: AsRef<Path>>(input_directory: P) -> Self {
        Self {
            input_directory: input_directory.as_ref().to_path_buf(),
        }
    }

    pub fn input_directory(&self) -> &Path {
        &self.input_directory
    }

    pub fn scan(&self, allowed_extensions: &[String]) -> Result<Vec<FileTask>, WorkerError> {
        let mut tasks = Vec::new();

        for entry in WalkDir::new(&self.input_directory).min_depth(1) {
            let entry = entry.map_err(|e| WorkerError::ScanFailed {
                path: self.input_directory.clone(),
                source: e,
            })?;
            let path = entry.path();

            if path.is_dir() {
                continue;
            }

            let accepted = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| {
                    allowed_extensions
                        .iter()
                        .any(|a| a.eq_ignore_ascii_case(ext))
                })
                .unwrap_or(false);
            if !accepted {
                continue;
            }

            if let Some(task) = FileTask::from_root(&self.input_directory, path) {
                debug!("Found document: {}", path.display());
                tasks.push(task);
            }
        }

        info!(
            "Scanned {} documents in {}",
            tasks.len(),
            self.input_directory.display()
        );
        Ok(tasks)
    }

    /// Asks the service which extensions it accepts (through the retry
    /// executor, metadata policy) and scans with that list.
    pub fn scan_with_service(
        &self,
        service: &dyn DocumentService,
        policy: RetryPolicy,
    ) -> Result<Vec<FileTask>, DocpressError> {
        let response = retry::execute("supported_extensions", policy, |_| {}, || {
            service.supported_extensions()
        })?;
        if let Some(fault) = response.error {
            return Err(fault.into());
        }
        Ok(self.scan(&response.extensions)?)
    }
}
