//! Utility functions for error handling
//!
//! Filesystem helpers that turn bare `io::Error`s into errors carrying the
//! path and the reason the path was needed.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Open a file for reading with rich error information
///
/// # Arguments
/// * `path` - The path to the file to open
/// * `purpose` - Why the file is being opened (for error context)
pub fn safe_open_file(path: &Path, purpose: &str) -> Result<fs::File> {
    if !path.exists() {
        return Err(PipelineError::io(
            path,
            io::Error::new(io::ErrorKind::NotFound, format!("file not found (needed for {purpose})")),
        ));
    }

    if !path.is_file() {
        return Err(PipelineError::io(
            path,
            io::Error::new(io::ErrorKind::InvalidInput, format!("expected a file for {purpose}")),
        ));
    }

    fs::File::open(path).map_err(|e| {
        let kind = e.kind();
        let message = match kind {
            io::ErrorKind::PermissionDenied => {
                "permission denied - check file permissions".to_string()
            }
            _ => format!("failed to open file for {purpose}: {e}"),
        };
        PipelineError::io(path, io::Error::new(kind, message))
    })
}

/// Check that a directory exists and is readable
pub fn validate_directory(path: &Path, purpose: &str) -> Result<()> {
    if !path.exists() {
        return Err(PipelineError::io(
            path,
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found (needed for {purpose})"),
            ),
        ));
    }

    if !path.is_dir() {
        return Err(PipelineError::io(
            path,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("expected a directory for {purpose}"),
            ),
        ));
    }

    fs::read_dir(path)
        .map(|_| ())
        .map_err(|e| PipelineError::io(path, e))
}

/// Extension trait attaching a path to `io::Result`s
pub trait IoResultExt<T> {
    /// Convert the IO error into a [`PipelineError::Io`] for `path`
    fn at_path(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at_path(self, path: &Path) -> Result<T> {
        self.map_err(|e| PipelineError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_purpose() {
        let err = safe_open_file(Path::new("/definitely/not/here.csv"), "patient source")
            .expect_err("missing file must fail");
        let msg = err.to_string();
        assert!(msg.contains("/definitely/not/here.csv"));
        assert!(msg.contains("patient source"));
    }

    #[test]
    fn directory_is_not_a_file() {
        let dir = std::env::temp_dir();
        assert!(safe_open_file(&dir, "test").is_err());
        assert!(validate_directory(&dir, "test").is_ok());
    }
}
