//! Result Writer
//!
//! One artifact per captured operation: `<directory>/<operation>.log`, holding
//! the environment header followed by the extracted section. Files are
//! truncate-created, so a rerun replaces the previous capture.

use crate::extract::ExtractedSection;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Artifact file extension
pub const ARTIFACT_EXTENSION: &str = "log";

/// An artifact (or its directory) could not be written
#[derive(Debug, Error)]
#[error("failed to write {}: {source}", path.display())]
pub struct WriteError {
    /// Path being written
    pub path: PathBuf,
    /// Underlying I/O error
    #[source]
    pub source: io::Error,
}

/// Writes artifacts into one output directory
#[derive(Debug, Clone)]
pub struct ResultWriter {
    directory: PathBuf,
}

impl ResultWriter {
    /// Writer targeting `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Output directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Create the output directory (and parents) if missing
    pub fn prepare(&self) -> Result<(), WriteError> {
        std::fs::create_dir_all(&self.directory).map_err(|source| WriteError {
            path: self.directory.clone(),
            source,
        })
    }

    /// Path of `operation`'s artifact
    pub fn artifact_path(&self, operation: &str) -> PathBuf {
        self.directory.join(format!("{operation}.{ARTIFACT_EXTENSION}"))
    }

    /// Write `header` then `section` to `operation`'s artifact.
    ///
    /// A partially written file is removed on failure.
    pub fn write(
        &self,
        operation: &str,
        header: &str,
        section: &ExtractedSection<'_>,
    ) -> Result<PathBuf, WriteError> {
        let path = self.artifact_path(operation);

        let written = File::create(&path).and_then(|file| {
            let mut out = BufWriter::new(file);
            out.write_all(header.as_bytes())?;
            out.write_all(section.as_str().as_bytes())?;
            out.flush()
        });

        match written {
            Ok(()) => Ok(path),
            Err(source) => {
                let _ = std::fs::remove_file(&path);
                Err(WriteError { path, source })
            }
        }
    }
}
