use std::path::{Path, PathBuf};

/// One unit of batch work: a local file plus the relative path it keeps
/// under the destination folder. Immutable once enqueued; consumed exactly
/// once by whichever worker pulls it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub source_path: PathBuf,
    pub relative_path: PathBuf,
}

impl FileTask {
    pub fn new(source_path: impl Into<PathBuf>, relative_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            relative_path: relative_path.into(),
        }
    }

    /// Builds a task for a file discovered under `root`, preserving its
    /// position relative to `root`. Returns `None` when the file does not
    /// live under `root`.
    pub fn from_root(root: &Path, source_path: &Path) -> Option<Self> {
        let relative = source_path.strip_prefix(root).ok()?;
        Some(Self {
            source_path: source_path.to_path_buf(),
            relative_path: relative.to_path_buf(),
        })
    }

    /// Display name used in events and logs.
    pub fn file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }

    pub fn extension(&self) -> Option<String> {
        self.source_path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_root_preserves_relative_position() {
        let task = FileTask::from_root(
            Path::new("/input"),
            Path::new("/input/reports/2024/q3.pdf"),
        )
        .unwrap();

        assert_eq!(task.relative_path, Path::new("reports/2024/q3.pdf"));
        assert_eq!(task.file_name(), "q3.pdf");
    }

    #[test]
    fn test_from_root_rejects_outside_files() {
        assert!(FileTask::from_root(Path::new("/input"), Path::new("/elsewhere/a.pdf")).is_none());
    }

    #[test]
    fn test_extension_is_lowercased() {
        let task = FileTask::new("/input/SCAN.TIFF", "SCAN.TIFF");
        assert_eq!(task.extension().as_deref(), Some("tiff"));
    }
}
